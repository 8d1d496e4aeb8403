// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the cluster client.
//!
//! Errors are categorized by the layer that produced them (coordination
//! service, relay server, local state machine) and carry enough context
//! to tell which destination or server was involved.
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Discovery` | Yes | Coordinator session lost, node missing or unreadable, malformed record |
//! | `Connection` | Yes | Dial failure, handshake rejection, transport dropped mid-call |
//! | `Protocol` | No | Running record address is not `host:port` |
//! | `Rejected` | No | Server refused a request (bad filter, out-of-order ack) |
//! | `InvalidState` | No | Connector operation called in the wrong state |
//! | `Decode` | No | Row-change payload could not be decoded |
//! | `Config` | No | Configuration invalid |
//!
//! # Retry Behavior
//!
//! The connector never retries on its own. Callers use
//! [`CanalError::is_retryable()`] to decide whether to `disconnect()` and
//! `connect()` again (which re-resolves the running server) under their
//! own [`RetryConfig`](crate::resilience::RetryConfig).

use crate::coordination::CoordinatorError;
use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, CanalError>;

/// Errors that can occur while discovering, connecting to or consuming
/// from a relay cluster.
#[derive(Error, Debug)]
pub enum CanalError {
    /// Coordination service failure.
    ///
    /// Session could not be established, a node is absent or unreadable,
    /// or the running record is not valid JSON.
    #[error("Discovery error ({operation}): {message}")]
    Discovery {
        operation: String,
        message: String,
        #[source]
        source: Option<CoordinatorError>,
    },

    /// The running record was read but its address is not `host:port`.
    ///
    /// A data-integrity problem on the coordinator side; never defaulted.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Failure talking to the resolved relay server.
    ///
    /// The connector drops the session and moves to `Disconnected`.
    /// Retryable after `disconnect()` + `connect()`.
    #[error("Connection error ({address}): {message}")]
    Connection { address: String, message: String },

    /// The relay server refused a request on a healthy session.
    #[error("Request rejected ({operation}): {message}")]
    Rejected { operation: String, message: String },

    /// Connector state machine violation.
    ///
    /// E.g. calling `get()` before `subscribe()`, or `get()` while a batch
    /// is still waiting for ack/rollback.
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Row-change payload could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CanalError {
    /// Create a discovery error from a coordinator failure.
    pub fn discovery(operation: impl Into<String>, source: CoordinatorError) -> Self {
        Self::Discovery {
            operation: operation.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a discovery error without source.
    pub fn discovery_msg(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Discovery {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error for a server address.
    pub fn connection(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Create a state violation error.
    pub fn invalid_state(expected: impl Into<String>, actual: impl std::fmt::Display) -> Self {
        Self::InvalidState {
            expected: expected.into(),
            actual: actual.to_string(),
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Discovery { .. } => true,
            Self::Connection { .. } => true,
            Self::Protocol(_) => false, // Bad record, needs operator attention
            Self::Rejected { .. } => false,
            Self::InvalidState { .. } => false,
            Self::Decode(_) => false,
            Self::Config(_) => false,
        }
    }

    /// Check if this is a connection-level failure (session is gone).
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}
