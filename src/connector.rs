// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Batch protocol client for the active relay server.
//!
//! A [`ClusterConnector`] owns at most one relay session. Every `connect()`
//! asks the locator for the *current* running server, so reconnecting after
//! a failure follows failover without any cached state.
//!
//! # Session Lifecycle
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──ok──► Connected ──subscribe()──► Subscribed
//!      ▲                          │                  │                          │
//!      └──────── error ───────────┘                  │                          │
//!      └──────────────── disconnect() / transport failure ─────────────────────┘
//! ```
//!
//! # Delivery
//!
//! At-least-once: every non-sentinel batch returned by [`get()`] must be
//! acked or rolled back before the next `get()`. Anything not acked when the
//! session dies is delivered again to the next session.
//!
//! # Failure Handling
//!
//! The connector never retries. A transport failure drops the session and
//! leaves the connector `Disconnected`; the caller decides when to
//! `connect()` again (see [`ConsumerLoop`](crate::consumer::ConsumerLoop)).
//!
//! [`get()`]: ClusterConnector::get
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> canal_cluster_client::Result<()> {
//! use canal_cluster_client::config::{ConnectorConfig, LocatorConfig};
//! use canal_cluster_client::connector::ClusterConnector;
//! use canal_cluster_client::locator::ClusterNodeLocator;
//! use canal_cluster_client::relay::MemoryDialer;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let locator = Arc::new(
//!     ClusterNodeLocator::connect(&LocatorConfig::new("example", vec!["zk1:2181".into()])).await?,
//! );
//! let mut connector = ClusterConnector::new(locator, MemoryDialer::new(), ConnectorConfig::default())?;
//!
//! connector.connect().await?;
//! connector.subscribe(".*\\..*").await?;
//! let batch = connector.get(100, Some(Duration::from_secs(1))).await?;
//! connector.ack(batch.id).await?;
//! connector.disconnect().await;
//! # Ok(())
//! # }
//! ```

use crate::config::ConnectorConfig;
use crate::coordination::{Coordinator, ZkCoordinator};
use crate::entry::{Batch, EMPTY_BATCH_ID};
use crate::error::{CanalError, Result};
use crate::locator::{ClusterNodeLocator, ServerAddress};
use crate::metrics;
use crate::relay::{GetRequest, Handshake, RelayDialer, RelaySession, TransportError};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

/// State of a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    /// No session (initial state).
    Disconnected,
    /// Resolving the running server and dialing it.
    Connecting,
    /// Session open, no filter registered.
    Connected,
    /// Session open with a filter; `get()` allowed.
    Subscribed,
}

impl ConnectorState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Subscribed => "subscribed",
        }
    }
}

impl fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single-session client for one destination.
///
/// Protocol methods take `&mut self`: one caller, one in-flight call.
/// Run independent connectors for parallelism.
pub struct ClusterConnector<D: RelayDialer, C: Coordinator = ZkCoordinator> {
    locator: Arc<ClusterNodeLocator<C>>,
    dialer: D,
    config: ConnectorConfig,
    connect_timeout: Duration,
    so_timeout: Duration,
    idle_timeout: Duration,
    state: ConnectorState,
    session: Option<D::Session>,
    /// Survives disconnect so a reconnect can re-subscribe
    filter: Option<String>,
    pending_batch: Option<i64>,
    current_server: Option<ServerAddress>,
}

impl<D: RelayDialer, C: Coordinator> ClusterConnector<D, C> {
    /// Create a disconnected connector. Fails only on invalid config.
    pub fn new(locator: Arc<ClusterNodeLocator<C>>, dialer: D, config: ConnectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            connect_timeout: config.connect_timeout_duration()?,
            so_timeout: config.so_timeout_duration()?,
            idle_timeout: config.idle_timeout_duration()?,
            locator,
            dialer,
            config,
            state: ConnectorState::Disconnected,
            session: None,
            filter: None,
            pending_batch: None,
            current_server: None,
        })
    }

    pub fn state(&self) -> ConnectorState {
        self.state
    }

    /// Whether a session is open (`Connected` or `Subscribed`).
    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectorState::Connected | ConnectorState::Subscribed)
    }

    /// Server of the open session.
    pub fn current_server(&self) -> Option<&ServerAddress> {
        self.current_server.as_ref()
    }

    /// Batch returned by `get()` and not yet acked or rolled back.
    pub fn pending_batch(&self) -> Option<i64> {
        self.pending_batch
    }

    /// Last filter passed to `subscribe()`.
    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn destination(&self) -> &str {
        self.locator.destination()
    }

    pub fn locator(&self) -> &Arc<ClusterNodeLocator<C>> {
        &self.locator
    }

    fn set_state(&mut self, state: ConnectorState) {
        if self.state != state {
            trace!(destination = %self.locator.destination(), from = %self.state, to = %state, "Connector state change");
            self.state = state;
            metrics::record_connector_state(self.locator.destination(), state.as_str());
        }
    }

    fn handshake(&self) -> Handshake {
        Handshake {
            username: self.config.username.clone(),
            password: self.config.password.clone(),
            destination: self.locator.destination().to_string(),
            client_id: self.config.client_id,
            so_timeout: self.so_timeout,
            idle_timeout: self.idle_timeout,
        }
    }

    fn require_session(&self, operation: &str) -> Result<()> {
        if self.is_connected() && self.session.is_some() {
            Ok(())
        } else {
            Err(CanalError::invalid_state(
                format!("connected before {}", operation),
                self.state,
            ))
        }
    }

    fn server_label(&self) -> String {
        self.current_server
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "<none>".to_string())
    }

    /// Drop the session without a close round-trip; the transport is gone.
    fn drop_session(&mut self) {
        self.session = None;
        self.pending_batch = None;
        self.current_server = None;
        self.set_state(ConnectorState::Disconnected);
    }

    /// Map a session failure; anything but `Rejected` kills the session.
    fn session_failure(&mut self, operation: &str, err: TransportError) -> CanalError {
        match err {
            TransportError::Rejected(message) => {
                metrics::record_error(self.locator.destination(), "rejected");
                CanalError::Rejected {
                    operation: operation.to_string(),
                    message,
                }
            }
            other => {
                let address = self.server_label();
                warn!(
                    destination = %self.locator.destination(),
                    address = %address,
                    operation,
                    error = %other,
                    "Relay session lost"
                );
                metrics::record_session_lost(self.locator.destination(), operation);
                self.drop_session();
                CanalError::connection(address, format!("{} failed: {}", operation, other))
            }
        }
    }

    /// Resolve the running server, dial it and perform the handshake.
    ///
    /// Valid only from `Disconnected` (or `Connecting`, left behind when a
    /// previous `connect()` future was dropped). Re-applies the last
    /// subscribed filter, closing the new session again if that fails.
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(CanalError::invalid_state("disconnected", self.state));
        }
        self.set_state(ConnectorState::Connecting);
        let destination = self.locator.destination().to_string();

        let address = match self.locator.resolve_address().await {
            Ok(address) => address,
            Err(e) => {
                self.set_state(ConnectorState::Disconnected);
                return Err(e);
            }
        };

        info!(destination = %destination, address = %address, "Connecting to relay");
        let handshake = self.handshake();
        let dialed = timeout(self.connect_timeout, self.dialer.dial(&address, &handshake)).await;

        let mut session = match dialed {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                self.set_state(ConnectorState::Disconnected);
                metrics::record_connection(&destination, &address.to_string(), false);
                warn!(destination = %destination, address = %address, error = %e, "Relay handshake failed");
                return Err(CanalError::connection(address.to_string(), format!("handshake failed: {}", e)));
            }
            Err(_) => {
                self.set_state(ConnectorState::Disconnected);
                metrics::record_connection(&destination, &address.to_string(), false);
                warn!(
                    destination = %destination,
                    address = %address,
                    timeout_ms = self.connect_timeout.as_millis(),
                    "Relay connect timed out"
                );
                return Err(CanalError::connection(
                    address.to_string(),
                    format!("connect timed out after {}ms", self.connect_timeout.as_millis()),
                ));
            }
        };

        if let Some(filter) = self.filter.clone() {
            if let Err(e) = session.subscribe(&filter).await {
                if let Err(close_err) = session.close().await {
                    debug!(address = %address, error = %close_err, "Close after failed re-subscribe");
                }
                drop(session);
                self.set_state(ConnectorState::Disconnected);
                metrics::record_connection(&destination, &address.to_string(), false);
                warn!(destination = %destination, address = %address, filter = %filter, error = %e, "Re-subscribe failed");
                return Err(match e {
                    TransportError::Rejected(message) => CanalError::Rejected {
                        operation: "subscribe".to_string(),
                        message,
                    },
                    other => CanalError::connection(address.to_string(), format!("subscribe failed: {}", other)),
                });
            }
        }

        let resubscribed = self.filter.is_some();
        self.session = Some(session);
        self.current_server = Some(address.clone());
        self.pending_batch = None;
        self.set_state(if resubscribed {
            ConnectorState::Subscribed
        } else {
            ConnectorState::Connected
        });

        metrics::record_connection(&destination, &address.to_string(), true);
        info!(destination = %destination, address = %address, resubscribed, "Connected to relay");
        Ok(())
    }

    /// Register the `schema.table` filter. Replaces any previous filter.
    pub async fn subscribe(&mut self, filter: &str) -> Result<()> {
        self.require_session("subscribe")?;
        let result = match self.session.as_mut() {
            Some(session) => session.subscribe(filter).await,
            None => return Err(CanalError::invalid_state("connected", self.state)),
        };

        match result {
            Ok(()) => {
                self.filter = Some(filter.to_string());
                self.set_state(ConnectorState::Subscribed);
                info!(destination = %self.locator.destination(), filter, "Subscribed");
                Ok(())
            }
            Err(e) => Err(self.session_failure("subscribe", e)),
        }
    }

    /// Remove the filter. Requires `Subscribed` and no pending batch.
    pub async fn unsubscribe(&mut self) -> Result<()> {
        if self.state != ConnectorState::Subscribed {
            return Err(CanalError::invalid_state("subscribed", self.state));
        }
        if let Some(pending) = self.pending_batch {
            return Err(CanalError::invalid_state(
                "no pending batch",
                format!("pending batch {}", pending),
            ));
        }
        let result = match self.session.as_mut() {
            Some(session) => session.unsubscribe().await,
            None => return Err(CanalError::invalid_state("subscribed", self.state)),
        };

        match result {
            Ok(()) => {
                self.filter = None;
                self.set_state(ConnectorState::Connected);
                info!(destination = %self.locator.destination(), "Unsubscribed");
                Ok(())
            }
            Err(e) => Err(self.session_failure("unsubscribe", e)),
        }
    }

    /// Long-poll for up to `batch_size` entries.
    ///
    /// `timeout: None` blocks until data arrives. Nothing arriving in time
    /// yields the sentinel batch (`id == -1`), which is not an error.
    pub async fn get(&mut self, batch_size: usize, timeout: Option<Duration>) -> Result<Batch> {
        if self.state != ConnectorState::Subscribed {
            return Err(CanalError::invalid_state("subscribed", self.state));
        }
        if let Some(pending) = self.pending_batch {
            return Err(CanalError::invalid_state(
                "no pending batch",
                format!("pending batch {}", pending),
            ));
        }
        if batch_size == 0 {
            return Err(CanalError::Config("batch_size must be > 0".to_string()));
        }

        let started = Instant::now();
        let request = GetRequest { batch_size, timeout };
        let result = match self.session.as_mut() {
            Some(session) => session.get(request).await,
            None => return Err(CanalError::invalid_state("subscribed", self.state)),
        };

        match result {
            Ok(batch) => {
                metrics::record_get(self.locator.destination(), batch.entries.len(), started.elapsed());
                if batch.id != EMPTY_BATCH_ID {
                    self.pending_batch = Some(batch.id);
                    debug!(
                        destination = %self.locator.destination(),
                        batch_id = batch.id,
                        entries = batch.entries.len(),
                        "Received batch"
                    );
                }
                Ok(batch)
            }
            Err(e) => Err(self.session_failure("get", e)),
        }
    }

    /// `get()` followed by `ack()` of any non-sentinel batch.
    pub async fn get_and_ack(&mut self, batch_size: usize, timeout: Option<Duration>) -> Result<Batch> {
        let batch = self.get(batch_size, timeout).await?;
        if batch.id != EMPTY_BATCH_ID {
            self.ack(batch.id).await?;
        }
        Ok(batch)
    }

    /// Confirm the pending batch. Acking the sentinel is a no-op.
    pub async fn ack(&mut self, batch_id: i64) -> Result<()> {
        if batch_id == EMPTY_BATCH_ID {
            return Ok(());
        }
        self.require_session("ack")?;
        if self.pending_batch != Some(batch_id) {
            return Err(CanalError::invalid_state(
                format!("pending batch {}", batch_id),
                pending_label(self.pending_batch),
            ));
        }

        let result = match self.session.as_mut() {
            Some(session) => session.ack(batch_id).await,
            None => return Err(CanalError::invalid_state("connected", self.state)),
        };

        match result {
            Ok(()) => {
                self.pending_batch = None;
                metrics::record_ack(self.locator.destination());
                trace!(destination = %self.locator.destination(), batch_id, "Acked batch");
                Ok(())
            }
            Err(e) => Err(self.session_failure("ack", e)),
        }
    }

    /// Ask the server to redeliver.
    ///
    /// `Some(id)` redelivers from batch `id` (which must be the pending
    /// batch); `None` redelivers from the last acked position.
    pub async fn rollback(&mut self, batch_id: Option<i64>) -> Result<()> {
        if batch_id == Some(EMPTY_BATCH_ID) {
            return Ok(());
        }
        self.require_session("rollback")?;
        if let Some(id) = batch_id {
            if self.pending_batch != Some(id) {
                return Err(CanalError::invalid_state(
                    format!("pending batch {}", id),
                    pending_label(self.pending_batch),
                ));
            }
        }

        let result = match self.session.as_mut() {
            Some(session) => session.rollback(batch_id).await,
            None => return Err(CanalError::invalid_state("connected", self.state)),
        };

        match result {
            Ok(()) => {
                self.pending_batch = None;
                metrics::record_rollback(self.locator.destination());
                debug!(destination = %self.locator.destination(), batch_id = ?batch_id, "Rolled back");
                Ok(())
            }
            Err(e) => Err(self.session_failure("rollback", e)),
        }
    }

    /// Close the session, if any. Always ends `Disconnected`; idempotent.
    ///
    /// The subscribed filter is remembered for the next `connect()`.
    pub async fn disconnect(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                debug!(destination = %self.locator.destination(), error = %e, "Session close failed");
            }
            info!(destination = %self.locator.destination(), address = %self.server_label(), "Disconnected from relay");
        }
        self.drop_session();
    }
}

impl<D: RelayDialer, C: Coordinator> Drop for ClusterConnector<D, C> {
    fn drop(&mut self) {
        if self.session.is_some() {
            debug!(destination = %self.locator.destination(), "Dropping connector with open session");
        }
    }
}

fn pending_label(pending: Option<i64>) -> String {
    match pending {
        Some(id) => format!("pending batch {}", id),
        None => "no pending batch".to_string(),
    }
}
