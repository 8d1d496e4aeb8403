// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Batch consumption loop.
//!
//! [`ConsumerLoop`] drives a [`ClusterConnector`] the way a long-running
//! consumer should:
//! 1. Connect and subscribe (re-resolving the running server every time)
//! 2. `get()` a batch; back off briefly on an empty poll
//! 3. Hand the batch to a [`BatchHandler`]
//! 4. Ack on success, roll back on handler failure
//!
//! # Reconnection
//!
//! `Connection` and `Discovery` errors drop the session; the loop reconnects
//! with delays from its [`RetryConfig`](crate::resilience::RetryConfig) and
//! gives up after `max_attempts` consecutive failures, returning the last
//! error. Any other error ends the loop immediately.
//!
//! # Graceful Shutdown
//!
//! The loop watches a `watch::Receiver<bool>` with `tokio::select!`, so an
//! idle long-poll or a backoff sleep is interrupted as soon as shutdown is
//! signaled. A batch already handed to the handler is finished and acked
//! first. On exit the session is closed and the stats are returned.

use crate::config::ConsumerConfig;
use crate::connector::{ClusterConnector, ConnectorState};
use crate::coordination::Coordinator;
use crate::entry::{Batch, Column, CodecError, EventType, JsonRowCodec, RowChangeCodec, EMPTY_BATCH_ID};
use crate::error::{CanalError, Result};
use crate::metrics;
use crate::relay::RelayDialer;
use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};

/// Failure reported by a [`BatchHandler`]; the batch is rolled back.
#[derive(Error, Debug)]
#[error("batch handler failed: {0}")]
pub struct HandlerError(pub String);

impl From<CodecError> for HandlerError {
    fn from(e: CodecError) -> Self {
        HandlerError(e.to_string())
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(e: std::io::Error) -> Self {
        HandlerError(format!("write failed: {}", e))
    }
}

/// Type alias for boxed handler futures.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = std::result::Result<(), HandlerError>> + Send + 'a>>;

/// Processes one batch at a time.
pub trait BatchHandler: Send {
    /// `Ok` acks the batch, `Err` rolls it back for redelivery.
    fn handle_batch<'a>(&'a mut self, batch: &'a Batch) -> HandlerFuture<'a>;
}

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub batches_acked: u64,
    pub batches_rolled_back: u64,
    pub entries_processed: u64,
    pub empty_polls: u64,
    /// Successful connects after the first one
    pub reconnects: u64,
}

/// Pull loop over a connector.
pub struct ConsumerLoop<D: RelayDialer, C: Coordinator, H: BatchHandler> {
    connector: ClusterConnector<D, C>,
    handler: H,
    config: ConsumerConfig,
    get_timeout: Option<Duration>,
    empty_backoff: Duration,
    stats: ConsumerStats,
    connected_once: bool,
}

impl<D: RelayDialer, C: Coordinator, H: BatchHandler> ConsumerLoop<D, C, H> {
    pub fn new(connector: ClusterConnector<D, C>, handler: H, config: ConsumerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            get_timeout: config.get_timeout_duration()?,
            empty_backoff: config.empty_backoff_duration()?,
            connector,
            handler,
            config,
            stats: ConsumerStats::default(),
            connected_once: false,
        })
    }

    pub fn stats(&self) -> &ConsumerStats {
        &self.stats
    }

    pub fn connector(&self) -> &ClusterConnector<D, C> {
        &self.connector
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Give back the connector and handler.
    pub fn into_parts(self) -> (ClusterConnector<D, C>, H) {
        (self.connector, self.handler)
    }

    /// Run until shutdown or an unrecoverable error.
    ///
    /// A dropped shutdown sender counts as shutdown.
    pub async fn run(&mut self, shutdown: watch::Receiver<bool>) -> Result<ConsumerStats> {
        let span = info_span!("consumer", destination = %self.connector.destination());
        self.run_inner(shutdown).instrument(span).await
    }

    async fn run_inner(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<ConsumerStats> {
        info!(filter = %self.config.filter, batch_size = self.config.batch_size, "Starting consumer loop");
        let destination = self.connector.destination().to_string();
        let mut failures = 0usize;

        loop {
            if *shutdown.borrow() {
                info!("Shutdown signal received");
                break;
            }

            if self.connector.state() != ConnectorState::Subscribed
                || self.connector.filter() != Some(self.config.filter.as_str())
            {
                match self.ensure_subscribed().await {
                    Ok(()) => {
                        if failures > 0 {
                            info!(attempts = failures, "Reconnected after failures");
                            metrics::reset_reconnect_failures(&destination);
                        }
                        failures = 0;
                    }
                    Err(e) if e.is_retryable() => {
                        failures += 1;
                        metrics::record_reconnect_attempt(&destination, failures);
                        if !self.config.retry.allows_attempt(failures + 1) {
                            warn!(attempts = failures, error = %e, "Giving up reconnecting");
                            self.connector.disconnect().await;
                            return Err(e);
                        }
                        let delay = self.config.retry.delay_for_attempt(failures);
                        warn!(
                            attempt = failures,
                            delay_ms = delay.as_millis(),
                            error = %e,
                            "Connect failed, retrying"
                        );
                        tokio::select! {
                            _ = wait_for_shutdown(&mut shutdown) => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                        continue;
                    }
                    Err(e) => {
                        warn!(error = %e, "Non-retryable error while connecting");
                        self.connector.disconnect().await;
                        return Err(e);
                    }
                }
            }

            let result = tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                r = self.connector.get(self.config.batch_size, self.get_timeout) => r,
            };

            let outcome = match result {
                Ok(batch) if batch.is_empty() => self.on_empty(batch, &mut shutdown).await,
                Ok(batch) => self.on_batch(batch).await.map(|_| true),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) if e.is_retryable() => {
                    metrics::record_error(&destination, error_kind(&e));
                    warn!(error = %e, "Session lost, reconnecting");
                    self.connector.disconnect().await;
                }
                Err(e) => {
                    metrics::record_error(&destination, error_kind(&e));
                    warn!(error = %e, "Consumer loop stopping on error");
                    self.connector.disconnect().await;
                    return Err(e);
                }
            }
        }

        self.connector.disconnect().await;
        info!(
            acked = self.stats.batches_acked,
            rolled_back = self.stats.batches_rolled_back,
            entries = self.stats.entries_processed,
            "Consumer loop stopped"
        );
        Ok(self.stats.clone())
    }

    /// Connect if needed and make sure the configured filter is active.
    async fn ensure_subscribed(&mut self) -> Result<()> {
        if !self.connector.is_connected() {
            self.connector.connect().await?;
            if self.connected_once {
                self.stats.reconnects += 1;
            }
            self.connected_once = true;
        }
        if self.connector.filter() != Some(self.config.filter.as_str())
            || self.connector.state() != ConnectorState::Subscribed
        {
            self.connector.subscribe(&self.config.filter).await?;
        }
        Ok(())
    }

    /// Empty poll: ack a data-less batch if the server issued one, then back
    /// off. Returns `Ok(false)` when shutdown arrived during the backoff.
    async fn on_empty(&mut self, batch: Batch, shutdown: &mut watch::Receiver<bool>) -> Result<bool> {
        if batch.id != EMPTY_BATCH_ID {
            self.connector.ack(batch.id).await?;
        }
        self.stats.empty_polls += 1;
        tokio::select! {
            _ = wait_for_shutdown(shutdown) => Ok(false),
            _ = tokio::time::sleep(self.empty_backoff) => Ok(true),
        }
    }

    async fn on_batch(&mut self, batch: Batch) -> Result<()> {
        let destination = self.connector.destination().to_string();
        let started = Instant::now();
        let handled = self.handler.handle_batch(&batch).await;
        metrics::record_handler_latency(&destination, started.elapsed());

        match handled {
            Ok(()) => {
                self.connector.ack(batch.id).await?;
                self.stats.batches_acked += 1;
                self.stats.entries_processed += batch.entries.len() as u64;
                debug!(batch_id = batch.id, entries = batch.entries.len(), "Batch processed");
            }
            Err(e) => {
                warn!(batch_id = batch.id, error = %e, "Handler failed, rolling back");
                self.connector.rollback(Some(batch.id)).await?;
                self.stats.batches_rolled_back += 1;
            }
        }
        Ok(())
    }
}

/// Resolves once shutdown is signaled or the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

fn error_kind(e: &CanalError) -> &'static str {
    match e {
        CanalError::Discovery { .. } => "discovery",
        CanalError::Protocol(_) => "protocol",
        CanalError::Connection { .. } => "connection",
        CanalError::Rejected { .. } => "rejected",
        CanalError::InvalidState { .. } => "invalid_state",
        CanalError::Decode(_) => "decode",
        CanalError::Config(_) => "config",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PrintHandler
// ═══════════════════════════════════════════════════════════════════════════════

/// Writes every row change in a human-readable form.
///
/// ```text
/// ================> binlog[mysql-bin.000001 : 4],name[shop,orders], eventType: INSERT
/// id : 42  update= true
/// ```
///
/// DELETE prints the before image, INSERT the after image, everything else
/// both. Transaction markers are skipped.
pub struct PrintHandler<W: Write + Send> {
    out: W,
    codec: Box<dyn RowChangeCodec>,
}

impl<W: Write + Send> PrintHandler<W> {
    /// Printer decoding payloads with [`JsonRowCodec`].
    pub fn new(out: W) -> Self {
        Self::with_codec(out, Box::new(JsonRowCodec))
    }

    pub fn with_codec(out: W, codec: Box<dyn RowChangeCodec>) -> Self {
        Self { out, codec }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_batch(&mut self, batch: &Batch) -> std::result::Result<(), HandlerError> {
        for entry in batch.row_entries() {
            let change = entry.row_change(self.codec.as_ref())?;
            let header = &entry.header;
            let event_type = header.event_type.unwrap_or(change.event_type);
            writeln!(
                self.out,
                "================> binlog[{} : {}],name[{},{}], eventType: {}",
                header.logfile_name, header.logfile_offset, header.schema_name, header.table_name, event_type
            )?;

            for row in &change.rows {
                match change.event_type {
                    EventType::Delete => write_columns(&mut self.out, &row.before_columns)?,
                    EventType::Insert => write_columns(&mut self.out, &row.after_columns)?,
                    _ => {
                        writeln!(self.out, "-------> before")?;
                        write_columns(&mut self.out, &row.before_columns)?;
                        writeln!(self.out, "-------> after")?;
                        write_columns(&mut self.out, &row.after_columns)?;
                    }
                }
            }
        }
        self.out.flush()?;
        Ok(())
    }
}

fn write_columns<W: Write>(out: &mut W, columns: &[Column]) -> std::io::Result<()> {
    for column in columns {
        writeln!(out, "{} : {}  update= {}", column.name, column.value, column.updated)?;
    }
    Ok(())
}

impl<W: Write + Send> BatchHandler for PrintHandler<W> {
    fn handle_batch<'a>(&'a mut self, batch: &'a Batch) -> HandlerFuture<'a> {
        let result = self.write_batch(batch);
        Box::pin(async move { result })
    }
}
