//! In-process relay servers.
//!
//! A [`RelayStore`] holds, per destination, an append-only entry log and an
//! ack cursor per client id. Any number of [`MemoryRelay`] servers can share
//! one store, which is how failover is exercised: stop one server, point the
//! running record at another, and the consumer resumes from its ack cursor.
//!
//! Locks are `std::sync::Mutex` and never held across an `.await`.

use super::{GetRequest, Handshake, RelayDialer, RelayFuture, RelaySession, TransportError};
use crate::entry::{Batch, Entry};
use crate::filter::TableFilter;
use crate::locator::ServerAddress;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Default)]
struct DestinationLog {
    entries: Vec<Entry>,
    /// client id -> index of the first unacked entry
    ack_cursors: HashMap<u16, usize>,
    /// Last issued batch id (ids start at 1)
    last_batch_id: i64,
}

/// Entry logs shared by every server of a cluster.
#[derive(Default)]
pub struct RelayStore {
    destinations: Mutex<HashMap<String, DestinationLog>>,
    appended: Notify,
}

impl RelayStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, DestinationLog>> {
        self.destinations.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append entries to a destination's log and wake waiting `get` calls.
    pub fn publish(&self, destination: &str, entries: impl IntoIterator<Item = Entry>) {
        {
            let mut destinations = self.lock();
            let log = destinations.entry(destination.to_string()).or_default();
            log.entries.extend(entries);
            debug!(destination, total = log.entries.len(), "Entries published");
        }
        self.appended.notify_waiters();
    }

    /// Number of entries ever published for `destination`.
    pub fn len(&self, destination: &str) -> usize {
        self.lock().get(destination).map_or(0, |log| log.entries.len())
    }

    pub fn is_empty(&self, destination: &str) -> bool {
        self.len(destination) == 0
    }

    /// Index of the first entry `client_id` has not acked.
    pub fn ack_cursor(&self, destination: &str, client_id: u16) -> usize {
        self.lock()
            .get(destination)
            .and_then(|log| log.ack_cursors.get(&client_id).copied())
            .unwrap_or(0)
    }
}

struct RelayInner {
    address: ServerAddress,
    store: Arc<RelayStore>,
    username: String,
    password: String,
    running: AtomicBool,
    /// Bumped on stop(); sessions from an older generation are dead
    generation: AtomicU64,
    open_sessions: AtomicUsize,
    handshakes: Mutex<Vec<Handshake>>,
}

/// One in-process relay server. Cloning yields another handle to it.
#[derive(Clone)]
pub struct MemoryRelay {
    inner: Arc<RelayInner>,
}

impl MemoryRelay {
    /// Server accepting the default `canal` / `canal` credentials.
    pub fn new(address: ServerAddress, store: Arc<RelayStore>) -> Self {
        Self::with_credentials(address, store, "canal", "canal")
    }

    pub fn with_credentials(
        address: ServerAddress,
        store: Arc<RelayStore>,
        username: &str,
        password: &str,
    ) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                address,
                store,
                username: username.to_string(),
                password: password.to_string(),
                running: AtomicBool::new(true),
                generation: AtomicU64::new(0),
                open_sessions: AtomicUsize::new(0),
                handshakes: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn address(&self) -> &ServerAddress {
        &self.inner.address
    }

    pub fn store(&self) -> &Arc<RelayStore> {
        &self.inner.store
    }

    /// Simulate a crash: refuse dials and fail every open session.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::Release);
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        self.inner.store.appended.notify_waiters();
        info!(address = %self.inner.address, "Relay stopped");
    }

    /// Accept dials again. Sessions killed by `stop()` stay dead.
    pub fn start(&self) {
        self.inner.running.store(true, Ordering::Release);
        info!(address = %self.inner.address, "Relay started");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Sessions dialed and not yet closed or dropped.
    pub fn open_sessions(&self) -> usize {
        self.inner.open_sessions.load(Ordering::Acquire)
    }

    /// Every handshake received, accepted or not.
    pub fn handshakes(&self) -> Vec<Handshake> {
        self.inner
            .handshakes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn accept(&self, handshake: &Handshake) -> Result<MemorySession, TransportError> {
        if !self.is_running() {
            return Err(TransportError::Disconnected(format!(
                "{}: connection refused",
                self.inner.address
            )));
        }
        self.inner
            .handshakes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handshake.clone());

        if handshake.username != self.inner.username || handshake.password != self.inner.password {
            return Err(TransportError::Rejected(format!(
                "authentication failed for user {}",
                handshake.username
            )));
        }

        let position = self
            .inner
            .store
            .ack_cursor(&handshake.destination, handshake.client_id);
        self.inner.open_sessions.fetch_add(1, Ordering::AcqRel);
        debug!(
            address = %self.inner.address,
            destination = %handshake.destination,
            client_id = handshake.client_id,
            position,
            "Session opened"
        );

        Ok(MemorySession {
            relay: self.clone(),
            generation: self.inner.generation.load(Ordering::Acquire),
            destination: handshake.destination.clone(),
            client_id: handshake.client_id,
            filter: None,
            position,
            in_flight: VecDeque::new(),
            closed: false,
        })
    }
}

struct InFlight {
    id: i64,
    start: usize,
    end: usize,
}

/// A session on a [`MemoryRelay`].
pub struct MemorySession {
    relay: MemoryRelay,
    generation: u64,
    destination: String,
    client_id: u16,
    filter: Option<TableFilter>,
    /// Next log index to deliver
    position: usize,
    in_flight: VecDeque<InFlight>,
    closed: bool,
}

impl MemorySession {
    fn check_alive(&self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Disconnected("session closed".to_string()));
        }
        let inner = &self.relay.inner;
        if !inner.running.load(Ordering::Acquire)
            || inner.generation.load(Ordering::Acquire) != self.generation
        {
            return Err(TransportError::Disconnected(format!(
                "{}: connection reset",
                inner.address
            )));
        }
        Ok(())
    }

    /// Cut the next batch from the log, if any entry passes the filter.
    fn take_batch(&mut self, batch_size: usize) -> Result<Option<Batch>, TransportError> {
        let filter = self
            .filter
            .as_ref()
            .ok_or_else(|| TransportError::Rejected("client is not subscribed".to_string()))?;

        let mut destinations = self.relay.inner.store.lock();
        let log = destinations.entry(self.destination.clone()).or_default();

        let mut entries = Vec::new();
        let mut end = self.position;
        while end < log.entries.len() && entries.len() < batch_size {
            let entry = &log.entries[end];
            end += 1;
            if entry.entry_type.is_transaction_marker()
                || filter.matches(&entry.header.qualified_table())
            {
                entries.push(entry.clone());
            }
        }
        if entries.is_empty() {
            return Ok(None);
        }

        log.last_batch_id += 1;
        let id = log.last_batch_id;
        drop(destinations);

        self.in_flight.push_back(InFlight {
            id,
            start: self.position,
            end,
        });
        self.position = end;
        Ok(Some(Batch { id, entries }))
    }

    fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            self.relay.inner.open_sessions.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl RelaySession for MemorySession {
    fn subscribe(&mut self, filter: &str) -> RelayFuture<'_, ()> {
        let result = self.check_alive().and_then(|_| {
            let parsed = TableFilter::parse(filter).map_err(TransportError::Rejected)?;
            self.filter = Some(parsed);
            Ok(())
        });
        Box::pin(async move { result })
    }

    fn unsubscribe(&mut self) -> RelayFuture<'_, ()> {
        let result = self.check_alive().map(|_| {
            self.filter = None;
        });
        Box::pin(async move { result })
    }

    fn get(&mut self, request: GetRequest) -> RelayFuture<'_, Batch> {
        Box::pin(async move {
            if request.batch_size == 0 {
                return Err(TransportError::Rejected("batch size must be > 0".to_string()));
            }
            // A timeout past the clock's range waits like `None`
            let deadline = request.timeout.and_then(|t| Instant::now().checked_add(t));
            let store = Arc::clone(&self.relay.inner.store);

            loop {
                self.check_alive()?;

                // Register before looking so a publish in between is not missed
                let notified = store.appended.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if let Some(batch) = self.take_batch(request.batch_size)? {
                    return Ok(batch);
                }

                match deadline {
                    Some(deadline) => {
                        if tokio::time::timeout_at(deadline, notified).await.is_err() {
                            self.check_alive()?;
                            return Ok(Batch::empty());
                        }
                    }
                    None => notified.await,
                }
            }
        })
    }

    fn ack(&mut self, batch_id: i64) -> RelayFuture<'_, ()> {
        let result = self.check_alive().and_then(|_| {
            let front = self.in_flight.front().map(|b| b.id);
            if front != Some(batch_id) {
                return Err(TransportError::Rejected(format!(
                    "batch {} is not the first unacked batch {:?}",
                    batch_id, front
                )));
            }
            if let Some(batch) = self.in_flight.pop_front() {
                let mut destinations = self.relay.inner.store.lock();
                let log = destinations.entry(self.destination.clone()).or_default();
                let cursor = log.ack_cursors.entry(self.client_id).or_insert(0);
                *cursor = (*cursor).max(batch.end);
            }
            Ok(())
        });
        Box::pin(async move { result })
    }

    fn rollback(&mut self, batch_id: Option<i64>) -> RelayFuture<'_, ()> {
        let result = self.check_alive().and_then(|_| {
            match batch_id {
                Some(id) => {
                    let index = self
                        .in_flight
                        .iter()
                        .position(|b| b.id == id)
                        .ok_or_else(|| {
                            TransportError::Rejected(format!("batch {} is not in flight", id))
                        })?;
                    self.position = self.in_flight[index].start;
                    self.in_flight.truncate(index);
                }
                None => {
                    self.in_flight.clear();
                    self.position = self
                        .relay
                        .inner
                        .store
                        .ack_cursor(&self.destination, self.client_id);
                }
            }
            Ok(())
        });
        Box::pin(async move { result })
    }

    fn close(&mut self) -> RelayFuture<'_, ()> {
        self.release();
        Box::pin(async move { Ok(()) })
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.release();
    }
}

/// Routes dials to registered [`MemoryRelay`] servers by address.
#[derive(Default)]
pub struct MemoryDialer {
    servers: Mutex<HashMap<ServerAddress, MemoryRelay>>,
    dials: AtomicUsize,
}

impl MemoryDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `relay` reachable at its address.
    pub fn register(&self, relay: &MemoryRelay) {
        self.servers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(relay.address().clone(), relay.clone());
    }

    /// Total dial attempts, successful or not.
    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::Acquire)
    }
}

impl RelayDialer for MemoryDialer {
    type Session = MemorySession;

    fn dial(&self, address: &ServerAddress, handshake: &Handshake) -> RelayFuture<'_, MemorySession> {
        self.dials.fetch_add(1, Ordering::AcqRel);
        let relay = self
            .servers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(address)
            .cloned();
        let result = match relay {
            Some(relay) => relay.accept(handshake),
            None => Err(TransportError::Disconnected(format!(
                "{}: connection refused",
                address
            ))),
        };
        Box::pin(async move { result })
    }
}
