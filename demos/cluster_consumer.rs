// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Consume a two-server relay cluster through a failover.
//!
//! Everything runs in-process: an in-memory coordination tree stands in for
//! ZooKeeper, two relay servers share one binlog, and a publisher task
//! writes a transaction every few hundred milliseconds. Halfway through,
//! the active server is stopped and the running record moves to the other
//! one; the consumer reconnects and carries on from its last ack.
//!
//! ```bash
//! cargo run --example cluster_consumer
//! RUST_LOG=canal_cluster_client=debug cargo run --example cluster_consumer
//! ```
//!
//! Stops after a few seconds, or on Ctrl-C.

use canal_cluster_client::config::{ConnectorConfig, ConsumerConfig, DEFAULT_ROOT};
use canal_cluster_client::entry::{CodecError, Column, Entry, EntryHeader, EventType, JsonRowCodec, RowChange, RowData};
use canal_cluster_client::locator::{cluster_path, running_path, ServerAddress};
use canal_cluster_client::relay::{MemoryDialer, MemoryRelay, RelayStore};
use canal_cluster_client::{
    ClusterConnector, ClusterNodeLocator, ConsumerLoop, MemoryCoordinator, PrintHandler, RetryConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DESTINATION: &str = "example";
const BINLOG: &str = "mysql-bin.000001";
const SERVERS: [&str; 2] = ["127.0.0.1:11111", "127.0.0.1:11112"];
const TRANSACTIONS: i64 = 10;

fn running_record(address: &str) -> String {
    format!(r#"{{"cid":1,"address":"{}","active":true}}"#, address)
}

/// One INSERT into `shop.orders`, wrapped in begin/end markers.
fn order_transaction(id: i64) -> Result<Vec<Entry>, CodecError> {
    let offset = id * 100;
    let header = EntryHeader {
        logfile_name: BINLOG.to_string(),
        logfile_offset: offset,
        schema_name: "shop".to_string(),
        table_name: "orders".to_string(),
        ..Default::default()
    };
    let change = RowChange::new(
        EventType::Insert,
        vec![RowData {
            before_columns: Vec::new(),
            after_columns: vec![
                Column::new("id", id.to_string(), true),
                Column::new("amount", format!("{}.00", id * 10), true),
            ],
        }],
    );
    Ok(vec![
        Entry::transaction_begin(BINLOG, offset),
        Entry::row_data(header, &change, &JsonRowCodec)?,
        Entry::transaction_end(BINLOG, offset + 50),
    ])
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    // Coordination tree + relay servers
    let tree = Arc::new(MemoryCoordinator::new());
    let store = Arc::new(RelayStore::new());
    let dialer = Arc::new(MemoryDialer::new());

    let mut relays = Vec::new();
    for server in SERVERS {
        let relay = MemoryRelay::new(ServerAddress::parse(server)?, Arc::clone(&store));
        dialer.register(&relay);
        tree.add_child(&cluster_path(DEFAULT_ROOT, DESTINATION), server);
        relays.push(relay);
    }
    tree.set_data(&running_path(DEFAULT_ROOT, DESTINATION), running_record(SERVERS[0]));

    // Client side
    let locator = Arc::new(ClusterNodeLocator::with_coordinator(DESTINATION, DEFAULT_ROOT, Arc::clone(&tree)).await?);
    info!(nodes = ?locator.cluster_nodes(), "Cluster discovered");

    let connector = ClusterConnector::new(Arc::clone(&locator), Arc::clone(&dialer), ConnectorConfig::default())?;
    let consumer_config = ConsumerConfig {
        filter: "shop\\..*".to_string(),
        get_timeout: Some("500ms".to_string()),
        retry: RetryConfig::startup(),
        ..Default::default()
    };
    let mut consumer = ConsumerLoop::new(connector, PrintHandler::new(std::io::stdout()), consumer_config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer_task = tokio::spawn(async move { consumer.run(shutdown_rx).await });

    // Publisher, with a failover halfway through
    let publisher = {
        let tree = Arc::clone(&tree);
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            for id in 1..=TRANSACTIONS {
                match order_transaction(id) {
                    Ok(entries) => store.publish(DESTINATION, entries),
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to build transaction");
                        return;
                    }
                }
                if id == TRANSACTIONS / 2 {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    info!(from = SERVERS[0], to = SERVERS[1], "Failing over");
                    relays[0].stop();
                    tree.set_data(&running_path(DEFAULT_ROOT, DESTINATION), running_record(SERVERS[1]));
                }
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
        })
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Ctrl-C received"),
        _ = async {
            let _ = publisher.await;
            tokio::time::sleep(Duration::from_secs(1)).await;
        } => info!("Publisher finished"),
    }

    let _ = shutdown_tx.send(true);
    let stats = consumer_task.await??;
    info!(
        acked = stats.batches_acked,
        entries = stats.entries_processed,
        reconnects = stats.reconnects,
        "Consumer finished"
    );

    locator.close().await;
    Ok(())
}
