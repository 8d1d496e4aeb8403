// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! ZooKeeper-backed [`Coordinator`].
//!
//! Wraps a `zookeeper_client::Client` session. The session is opened once
//! (bounded by a connect timeout) and released when the value is dropped.
//! No watches are registered: every call is a plain one-shot read.

use super::{Coordinator, CoordinatorError, CoordinatorFuture};
use std::time::Duration;
use tracing::{debug, info};
use zookeeper_client as zk;

/// A live ZooKeeper session.
pub struct ZkCoordinator {
    client: zk::Client,
    /// Comma-joined endpoint list (for logging)
    endpoints: String,
}

impl ZkCoordinator {
    /// Open a session against `endpoints` (`host:port` each).
    ///
    /// Fails with [`CoordinatorError::ConnectTimeout`] if the session is not
    /// established within `connect_timeout`.
    pub async fn connect(
        endpoints: &[String],
        connect_timeout: Duration,
    ) -> Result<Self, CoordinatorError> {
        if endpoints.is_empty() {
            return Err(CoordinatorError::Backend(
                "no coordinator endpoints configured".to_string(),
            ));
        }
        let cluster = endpoints.join(",");
        info!(endpoints = %cluster, timeout_ms = connect_timeout.as_millis(), "Connecting to ZooKeeper");

        match tokio::time::timeout(connect_timeout, zk::Client::connect(&cluster)).await {
            Ok(Ok(client)) => {
                info!(endpoints = %cluster, "ZooKeeper session established");
                Ok(Self {
                    client,
                    endpoints: cluster,
                })
            }
            Ok(Err(e)) => Err(CoordinatorError::Backend(format!(
                "connect to {} failed: {}",
                cluster, e
            ))),
            Err(_) => Err(CoordinatorError::ConnectTimeout {
                endpoints: cluster,
                timeout_ms: connect_timeout.as_millis(),
            }),
        }
    }

    /// Endpoints this session was opened against.
    pub fn endpoints(&self) -> &str {
        &self.endpoints
    }
}

fn map_zk_error(path: &str, err: zk::Error) -> CoordinatorError {
    match err {
        zk::Error::NoNode => CoordinatorError::NoNode(path.to_string()),
        zk::Error::SessionExpired => CoordinatorError::SessionClosed,
        other => CoordinatorError::Backend(format!("{}: {}", path, other)),
    }
}

impl Coordinator for ZkCoordinator {
    fn get_data(&self, path: &str) -> CoordinatorFuture<'_, Vec<u8>> {
        let path = path.to_string();
        Box::pin(async move {
            let (data, _stat) = self
                .client
                .get_data(&path)
                .await
                .map_err(|e| map_zk_error(&path, e))?;
            debug!(path = %path, bytes = data.len(), "Read ZooKeeper node");
            Ok(data)
        })
    }

    fn get_children(&self, path: &str) -> CoordinatorFuture<'_, Vec<String>> {
        let path = path.to_string();
        Box::pin(async move {
            let children = self
                .client
                .list_children(&path)
                .await
                .map_err(|e| map_zk_error(&path, e))?;
            debug!(path = %path, count = children.len(), "Listed ZooKeeper children");
            Ok(children)
        })
    }
}

impl Drop for ZkCoordinator {
    fn drop(&mut self) {
        debug!(endpoints = %self.endpoints, "Releasing ZooKeeper session");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_no_node() {
        let err = map_zk_error("/x", zk::Error::NoNode);
        assert_eq!(err, CoordinatorError::NoNode("/x".to_string()));
    }

    #[test]
    fn test_map_session_expired() {
        let err = map_zk_error("/x", zk::Error::SessionExpired);
        assert_eq!(err, CoordinatorError::SessionClosed);
    }

    #[tokio::test]
    async fn test_connect_requires_endpoints() {
        let result = ZkCoordinator::connect(&[], Duration::from_millis(10)).await;
        assert!(matches!(result, Err(CoordinatorError::Backend(_))));
    }
}
