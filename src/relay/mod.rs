// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Relay server session traits.
//!
//! Defines what the connector needs from a relay server: open a session to
//! one address ([`RelayDialer`]) and run the batch protocol over it
//! ([`RelaySession`]). The wire encoding is left to the implementation;
//! [`MemoryRelay`] ships an in-process server with the same delivery
//! semantics for tests and demos.
//!
//! # Delivery Contract
//!
//! - `get` returns at most `batch_size` entries after the session's delivery
//!   position, or the `-1` sentinel when nothing arrived before the timeout.
//! - Batches are acked in the order they were issued.
//! - `rollback(Some(id))` redelivers from batch `id`; `rollback(None)`
//!   redelivers from the last acked position.
//! - A new session for the same client id starts from the last acked
//!   position, so unacked batches are delivered again.
//!
//! # Example
//!
//! ```rust,no_run
//! use canal_cluster_client::relay::{GetRequest, Handshake, RelayDialer, RelayFuture, RelaySession};
//! use canal_cluster_client::entry::Batch;
//! use canal_cluster_client::locator::ServerAddress;
//!
//! struct Idle;
//!
//! impl RelaySession for Idle {
//!     fn subscribe(&mut self, _filter: &str) -> RelayFuture<'_, ()> { Box::pin(async { Ok(()) }) }
//!     fn unsubscribe(&mut self) -> RelayFuture<'_, ()> { Box::pin(async { Ok(()) }) }
//!     fn get(&mut self, _request: GetRequest) -> RelayFuture<'_, Batch> {
//!         Box::pin(async { Ok(Batch::empty()) })
//!     }
//!     fn ack(&mut self, _batch_id: i64) -> RelayFuture<'_, ()> { Box::pin(async { Ok(()) }) }
//!     fn rollback(&mut self, _batch_id: Option<i64>) -> RelayFuture<'_, ()> { Box::pin(async { Ok(()) }) }
//!     fn close(&mut self) -> RelayFuture<'_, ()> { Box::pin(async { Ok(()) }) }
//! }
//!
//! struct IdleDialer;
//!
//! impl RelayDialer for IdleDialer {
//!     type Session = Idle;
//!     fn dial(&self, _address: &ServerAddress, _handshake: &Handshake) -> RelayFuture<'_, Idle> {
//!         Box::pin(async { Ok(Idle) })
//!     }
//! }
//! ```

mod memory;

pub use memory::{MemoryDialer, MemoryRelay, MemorySession, RelayStore};

use crate::entry::Batch;
use crate::locator::ServerAddress;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Type alias for boxed relay futures.
pub type RelayFuture<'a, T> =
    Pin<Box<dyn Future<Output = std::result::Result<T, TransportError>> + Send + 'a>>;

/// Failure reported by a relay session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Socket closed, server gone, or session no longer valid.
    #[error("disconnected: {0}")]
    Disconnected(String),

    /// The server understood the request and refused it.
    #[error("rejected: {0}")]
    Rejected(String),

    /// A transport-level timeout (not the long-poll timeout of `get`).
    #[error("timed out: {0}")]
    Timeout(String),
}

/// Parameters sent when opening a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub username: String,
    pub password: String,
    pub destination: String,
    pub client_id: u16,
    pub so_timeout: Duration,
    pub idle_timeout: Duration,
}

/// One `get` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetRequest {
    pub batch_size: usize,
    /// `None` waits until at least one entry is available.
    pub timeout: Option<Duration>,
}

/// An open session to one relay server.
pub trait RelaySession: Send {
    /// Register (or replace) the `schema.table` filter.
    fn subscribe(&mut self, filter: &str) -> RelayFuture<'_, ()>;

    /// Drop the filter; `get` is refused until the next `subscribe`.
    fn unsubscribe(&mut self) -> RelayFuture<'_, ()>;

    /// Long-poll for the next batch.
    fn get(&mut self, request: GetRequest) -> RelayFuture<'_, Batch>;

    /// Confirm the earliest unacked batch.
    fn ack(&mut self, batch_id: i64) -> RelayFuture<'_, ()>;

    /// Redeliver from `batch_id`, or from the last acked position.
    fn rollback(&mut self, batch_id: Option<i64>) -> RelayFuture<'_, ()>;

    /// End the session. Unacked batches stay unacked on the server.
    fn close(&mut self) -> RelayFuture<'_, ()>;
}

/// Opens sessions to relay servers.
///
/// Implementations must not leak a half-open session when the handshake
/// fails or the returned future is dropped.
pub trait RelayDialer: Send + Sync + 'static {
    type Session: RelaySession + 'static;

    /// Connect to `address` and perform the handshake.
    fn dial(&self, address: &ServerAddress, handshake: &Handshake) -> RelayFuture<'_, Self::Session>;
}

impl<D: RelayDialer> RelayDialer for Arc<D> {
    type Session = D::Session;

    fn dial(&self, address: &ServerAddress, handshake: &Handshake) -> RelayFuture<'_, Self::Session> {
        (**self).dial(address, handshake)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        assert_eq!(
            TransportError::Disconnected("connection refused".to_string()).to_string(),
            "disconnected: connection refused"
        );
        assert!(TransportError::Rejected("bad filter".to_string())
            .to_string()
            .starts_with("rejected"));
        assert!(TransportError::Timeout("read".to_string())
            .to_string()
            .contains("timed out"));
    }
}
