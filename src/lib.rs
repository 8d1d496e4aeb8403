//! # Canal Cluster Client
//!
//! A cluster-aware client for canal-style binlog relay servers.
//!
//! ## Architecture
//!
//! A relay cluster serves each destination (one replicated database stream)
//! from a single active server. ZooKeeper records which one; this crate
//! finds it, talks the batch protocol to it, and follows failover.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                          canal-cluster-client                             │
//! │                                                                           │
//! │  ┌────────────────────┐    ┌──────────────────┐    ┌───────────────────┐  │
//! │  │ ClusterNodeLocator │───►│ ClusterConnector │───►│ ConsumerLoop      │  │
//! │  │ (cluster, running) │    │ (get/ack/rollback│    │ (BatchHandler,    │  │
//! │  │                    │    │  one session)    │    │  RetryConfig)     │  │
//! │  └────────────────────┘    └──────────────────┘    └───────────────────┘  │
//! │         │                           │                                     │
//! │         ▼                           ▼                                     │
//! │  ┌─────────────┐            ┌───────────────┐                             │
//! │  │ Coordinator │            │ RelayDialer / │                             │
//! │  │ (ZooKeeper) │            │ RelaySession  │                             │
//! │  └─────────────┘            └───────────────┘                             │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Delivery
//!
//! At-least-once: `get` → process → `ack`, or `rollback` to have the batch
//! delivered again. A batch not acked before a crash or failover is
//! redelivered to the next session.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use canal_cluster_client::{ClusterConnector, ClusterNodeLocator, ConsumerLoop, PrintHandler};
//! use canal_cluster_client::config::ClientConfig;
//! use canal_cluster_client::relay::MemoryDialer;
//! use std::sync::Arc;
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> canal_cluster_client::Result<()> {
//!     let config = ClientConfig::for_testing("example");
//!     let locator = Arc::new(ClusterNodeLocator::connect(&config.locator).await?);
//!     let connector = ClusterConnector::new(Arc::clone(&locator), MemoryDialer::new(), config.connector)?;
//!
//!     let (_tx, rx) = watch::channel(false);
//!     let mut consumer = ConsumerLoop::new(connector, PrintHandler::new(std::io::stdout()), config.consumer)?;
//!     consumer.run(rx).await?;
//!
//!     locator.close().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connector;
pub mod consumer;
pub mod coordination;
pub mod entry;
pub mod error;
pub mod filter;
pub mod locator;
pub mod metrics;
pub mod relay;
pub mod resilience;

// Re-exports for convenience
pub use config::{ClientConfig, ConnectorConfig, ConsumerConfig, LocatorConfig};
pub use connector::{ClusterConnector, ConnectorState};
pub use consumer::{BatchHandler, ConsumerLoop, ConsumerStats, HandlerError, PrintHandler};
pub use coordination::{Coordinator, CoordinatorError, MemoryCoordinator, ZkCoordinator};
pub use entry::{Batch, Column, Entry, EntryType, EventType, JsonRowCodec, RowChange, RowChangeCodec, RowData};
pub use error::{CanalError, Result};
pub use locator::{ClusterNodeLocator, ServerAddress, ServerRunningData};
pub use relay::{RelayDialer, RelaySession, TransportError};
pub use resilience::RetryConfig;
