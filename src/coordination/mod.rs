// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Coordination service integration.
//!
//! The locator needs exactly two capabilities from the coordination
//! service: read a node's data and list a node's children. This module
//! defines that seam as the [`Coordinator`] trait so discovery can run
//! against ZooKeeper in production and an in-memory tree in tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use canal_cluster_client::coordination::{Coordinator, CoordinatorFuture};
//!
//! struct StaticTree;
//!
//! impl Coordinator for StaticTree {
//!     fn get_data(&self, _path: &str) -> CoordinatorFuture<'_, Vec<u8>> {
//!         Box::pin(async move {
//!             Ok(br#"{"cid":1,"address":"127.0.0.1:11111","active":true}"#.to_vec())
//!         })
//!     }
//!
//!     fn get_children(&self, _path: &str) -> CoordinatorFuture<'_, Vec<String>> {
//!         Box::pin(async move { Ok(vec!["127.0.0.1:11111".to_string()]) })
//!     }
//! }
//! ```

mod memory;
mod zookeeper;

pub use memory::MemoryCoordinator;
pub use zookeeper::ZkCoordinator;

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Type alias for boxed coordinator futures (keeps trait signatures readable).
pub type CoordinatorFuture<'a, T> =
    Pin<Box<dyn Future<Output = std::result::Result<T, CoordinatorError>> + Send + 'a>>;

/// Failure reported by a coordination backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    /// The requested node does not exist.
    #[error("node does not exist: {0}")]
    NoNode(String),

    /// The session was closed or expired.
    #[error("coordinator session is closed")]
    SessionClosed,

    /// Session could not be established in time.
    #[error("connect to {endpoints} timed out after {timeout_ms}ms")]
    ConnectTimeout { endpoints: String, timeout_ms: u128 },

    /// Any other backend failure.
    #[error("{0}")]
    Backend(String),
}

/// Minimal read-only view of the coordination service.
///
/// Implementations own their session; dropping the value releases it.
pub trait Coordinator: Send + Sync + 'static {
    /// Read the raw value stored at `path`.
    fn get_data(&self, path: &str) -> CoordinatorFuture<'_, Vec<u8>>;

    /// List the child names of `path` (names only, not full paths).
    fn get_children(&self, path: &str) -> CoordinatorFuture<'_, Vec<String>>;
}

impl<C: Coordinator> Coordinator for std::sync::Arc<C> {
    fn get_data(&self, path: &str) -> CoordinatorFuture<'_, Vec<u8>> {
        (**self).get_data(path)
    }

    fn get_children(&self, path: &str) -> CoordinatorFuture<'_, Vec<String>> {
        (**self).get_children(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinator_error_display() {
        let err = CoordinatorError::NoNode("/otter/canal/destinations/x/running".to_string());
        assert_eq!(
            err.to_string(),
            "node does not exist: /otter/canal/destinations/x/running"
        );

        let err = CoordinatorError::ConnectTimeout {
            endpoints: "zk1:2181,zk2:2181".to_string(),
            timeout_ms: 10_000,
        };
        assert!(err.to_string().contains("zk1:2181,zk2:2181"));
        assert!(err.to_string().contains("10000ms"));
    }

    #[tokio::test]
    async fn test_arc_coordinator_delegates() {
        let tree = std::sync::Arc::new(MemoryCoordinator::new());
        tree.set_data("/a", b"value".to_vec());
        let shared = std::sync::Arc::clone(&tree);

        assert_eq!(shared.get_data("/a").await.unwrap(), b"value".to_vec());
        assert_eq!(tree.read_count("/a"), 1);
    }
}
