// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cluster discovery for one destination.
//!
//! The locator owns a coordination-service session and answers two
//! questions:
//!
//! - which servers are members of the destination's cluster
//!   ([`cluster_nodes()`](ClusterNodeLocator::cluster_nodes), read once at
//!   construction and shuffled)
//! - which server is running the destination right now
//!   ([`resolve_active()`](ClusterNodeLocator::resolve_active), read fresh on
//!   every call)
//!
//! # Coordination Layout
//!
//! ```text
//! {root}/destinations/{destination}/cluster/<host:port>   candidate servers
//! {root}/destinations/{destination}/running               {"cid":1,"address":"host:port","active":true}
//! ```
//!
//! # No Caching
//!
//! The running record is never cached and no watch is registered. A cached
//! pointer goes stale the moment the active server dies; re-reading on each
//! connect means a reconnect after failover always dials the new server.
//! The cost is one coordinator read per connect.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> canal_cluster_client::Result<()> {
//! use canal_cluster_client::config::LocatorConfig;
//! use canal_cluster_client::locator::ClusterNodeLocator;
//!
//! let config = LocatorConfig::new("example", vec!["zk1:2181".into()]);
//! let locator = ClusterNodeLocator::connect(&config).await?;
//!
//! let address = locator.resolve_address().await?;
//! println!("active server: {}", address);
//!
//! locator.close().await;
//! # Ok(())
//! # }
//! ```

use crate::config::LocatorConfig;
use crate::coordination::{Coordinator, CoordinatorError, ZkCoordinator};
use crate::error::{CanalError, Result};
use crate::metrics;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Path listing the cluster members of `destination`.
pub fn cluster_path(root: &str, destination: &str) -> String {
    format!("{}/destinations/{}/cluster", root.trim_end_matches('/'), destination)
}

/// Path of the running record of `destination`.
pub fn running_path(root: &str, destination: &str) -> String {
    format!("{}/destinations/{}/running", root.trim_end_matches('/'), destination)
}

/// The active-server record stored at the running path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRunningData {
    #[serde(default)]
    pub cid: i64,
    pub address: String,
    #[serde(default)]
    pub active: bool,
}

impl ServerRunningData {
    /// Parse the JSON node value.
    pub fn from_json(data: &[u8]) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// Parsed `address`.
    pub fn server_address(&self) -> Result<ServerAddress> {
        ServerAddress::parse(&self.address)
    }
}

/// A relay server endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port`.
    ///
    /// Exactly one `:`, a non-empty host and a port in `1..=65535`.
    /// Anything else is a [`CanalError::Protocol`]; nothing is defaulted.
    pub fn parse(address: &str) -> Result<Self> {
        let invalid = || CanalError::Protocol(format!("error canal cluster server {}", address));

        let mut parts = address.split(':');
        let (host, port) = match (parts.next(), parts.next(), parts.next()) {
            (Some(host), Some(port), None) => (host, port),
            _ => return Err(invalid()),
        };
        if host.is_empty() {
            return Err(invalid());
        }
        let port: u16 = port.parse().map_err(|_| invalid())?;
        if port == 0 {
            return Err(invalid());
        }
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Uniform random permutation using the thread-local RNG.
pub fn shuffled(mut nodes: Vec<String>) -> Vec<String> {
    nodes.shuffle(&mut rand::thread_rng());
    nodes
}

/// Discovery handle for one destination.
///
/// Safe to share behind an `Arc` between independent connectors; every
/// method takes `&self`.
pub struct ClusterNodeLocator<C: Coordinator = ZkCoordinator> {
    destination: String,
    root: String,
    /// Shuffled once at construction; advisory only
    cluster_nodes: Vec<String>,
    /// Coordination session (None once closed)
    session: RwLock<Option<C>>,
}

impl ClusterNodeLocator<ZkCoordinator> {
    /// Open a ZooKeeper session and list the destination's cluster members.
    ///
    /// Both steps failing surface as [`CanalError::Discovery`]; the session is
    /// released before returning an error.
    pub async fn connect(config: &LocatorConfig) -> Result<Self> {
        config.validate()?;
        let timeout = config.connect_timeout_duration()?;

        let coordinator = ZkCoordinator::connect(&config.zk_servers, timeout)
            .await
            .map_err(|e| {
                warn!(destination = %config.destination, error = %e, "Coordinator session failed");
                CanalError::discovery("connect", e)
            })?;

        Self::with_coordinator(&config.destination, &config.root, coordinator).await
    }
}

impl<C: Coordinator> ClusterNodeLocator<C> {
    /// Build a locator over an already-open coordinator session.
    ///
    /// Takes ownership of `coordinator`; it is dropped (released) if the
    /// cluster listing fails.
    pub async fn with_coordinator(destination: &str, root: &str, coordinator: C) -> Result<Self> {
        let path = cluster_path(root, destination);

        let children = match coordinator.get_children(&path).await {
            Ok(children) => children,
            Err(e) => {
                warn!(destination, path = %path, error = %e, "Failed to list cluster members");
                drop(coordinator);
                return Err(CanalError::discovery("list cluster", e));
            }
        };

        let cluster_nodes = shuffled(children);
        info!(
            destination,
            members = cluster_nodes.len(),
            "Cluster membership loaded"
        );
        debug!(destination, nodes = ?cluster_nodes, "Candidate order");

        Ok(Self {
            destination: destination.to_string(),
            root: root.to_string(),
            cluster_nodes,
            session: RwLock::new(Some(coordinator)),
        })
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn cluster_path(&self) -> String {
        cluster_path(&self.root, &self.destination)
    }

    pub fn running_path(&self) -> String {
        running_path(&self.root, &self.destination)
    }

    /// Candidate servers in shuffled order.
    ///
    /// Advisory only: the authoritative choice is the running record.
    pub fn cluster_nodes(&self) -> &[String] {
        &self.cluster_nodes
    }

    /// Whether [`close()`](Self::close) has been called.
    pub async fn is_closed(&self) -> bool {
        self.session.read().await.is_none()
    }

    /// Read and parse the running record.
    ///
    /// Every call goes to the coordinator.
    pub async fn resolve_active(&self) -> Result<ServerRunningData> {
        let path = self.running_path();
        let session = self.session.read().await;
        let coordinator = match session.as_ref() {
            Some(c) => c,
            None => {
                metrics::record_resolution(&self.destination, false);
                return Err(CanalError::discovery(
                    "resolve active",
                    CoordinatorError::SessionClosed,
                ));
            }
        };

        let data = coordinator.get_data(&path).await.map_err(|e| {
            metrics::record_resolution(&self.destination, false);
            warn!(destination = %self.destination, path = %path, error = %e, "Failed to read running record");
            CanalError::discovery("resolve active", e)
        })?;
        drop(session);

        let record = ServerRunningData::from_json(&data).map_err(|e| {
            metrics::record_resolution(&self.destination, false);
            CanalError::discovery_msg(
                "resolve active",
                format!("malformed running record at {}: {}", path, e),
            )
        })?;

        metrics::record_resolution(&self.destination, true);
        debug!(
            destination = %self.destination,
            cid = record.cid,
            address = %record.address,
            active = record.active,
            "Resolved running server"
        );
        Ok(record)
    }

    /// Resolve the running server and parse its address.
    ///
    /// A record flagged inactive is still returned; the server behind it is
    /// usually mid-handover and a dial failure will surface soon enough.
    pub async fn resolve_address(&self) -> Result<ServerAddress> {
        let record = self.resolve_active().await?;
        let address = record.server_address()?;
        if !record.active {
            warn!(
                destination = %self.destination,
                address = %address,
                cid = record.cid,
                "Running record is not flagged active"
            );
        }
        Ok(address)
    }

    /// Release the coordination session. Safe to call repeatedly.
    pub async fn close(&self) {
        if self.session.write().await.take().is_some() {
            info!(destination = %self.destination, "Locator closed");
        }
    }
}
