// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory relay cluster for tests.
//!
//! One coordination tree, one shared entry log and any number of relay
//! servers, wired the way a real deployment lays them out:
//!
//! ```text
//! /otter/canal/destinations/example/cluster/127.0.0.1:11111
//! /otter/canal/destinations/example/cluster/127.0.0.1:11112
//! /otter/canal/destinations/example/running -> {"cid":1,"address":...,"active":true}
//! ```

#![allow(dead_code)]

use canal_cluster_client::config::ConnectorConfig;
use canal_cluster_client::coordination::MemoryCoordinator;
use canal_cluster_client::entry::{
    Batch, Column, Entry, EntryHeader, EventType, JsonRowCodec, RowChange, RowData,
};
use canal_cluster_client::locator::{cluster_path, running_path, ServerAddress};
use canal_cluster_client::relay::{MemoryDialer, MemoryRelay, RelayStore};
use canal_cluster_client::{ClusterConnector, ClusterNodeLocator};
use std::sync::Arc;

pub const ROOT: &str = "/otter/canal";
pub const DESTINATION: &str = "example";
pub const SERVER_A: &str = "127.0.0.1:11111";
pub const SERVER_B: &str = "127.0.0.1:11112";
pub const BINLOG: &str = "mysql-bin.000001";

pub type TestLocator = ClusterNodeLocator<Arc<MemoryCoordinator>>;
pub type TestConnector = ClusterConnector<Arc<MemoryDialer>, Arc<MemoryCoordinator>>;

/// JSON running record as the relay cluster writes it.
pub fn running_record(address: &str, active: bool) -> String {
    format!(r#"{{"cid":1,"address":"{}","active":{}}}"#, address, active)
}

/// Coordination tree + relay servers sharing one entry log.
pub struct TestCluster {
    pub tree: Arc<MemoryCoordinator>,
    pub store: Arc<RelayStore>,
    pub dialer: Arc<MemoryDialer>,
    relays: Vec<MemoryRelay>,
}

impl TestCluster {
    /// Register `servers` under the cluster node; the first one is running.
    pub fn new(servers: &[&str]) -> Self {
        let tree = Arc::new(MemoryCoordinator::new());
        let store = Arc::new(RelayStore::new());
        let dialer = Arc::new(MemoryDialer::new());
        let cluster = cluster_path(ROOT, DESTINATION);

        let mut relays = Vec::with_capacity(servers.len());
        for server in servers {
            let address = ServerAddress::parse(server).expect("valid test address");
            let relay = MemoryRelay::new(address, Arc::clone(&store));
            dialer.register(&relay);
            tree.add_child(&cluster, server);
            relays.push(relay);
        }

        let cluster = Self {
            tree,
            store,
            dialer,
            relays,
        };
        if let Some(first) = servers.first() {
            cluster.set_running(first);
        }
        cluster
    }

    /// Point the running record at `address`.
    pub fn set_running(&self, address: &str) {
        self.tree
            .set_data(&running_path(ROOT, DESTINATION), running_record(address, true));
    }

    /// How often the running record has been read.
    pub fn running_reads(&self) -> usize {
        self.tree.read_count(&running_path(ROOT, DESTINATION))
    }

    pub fn relay(&self, address: &str) -> &MemoryRelay {
        self.relays
            .iter()
            .find(|r| r.address().to_string() == address)
            .expect("relay registered")
    }

    pub fn publish(&self, entries: Vec<Entry>) {
        self.store.publish(DESTINATION, entries);
    }

    pub async fn locator(&self) -> Arc<TestLocator> {
        let locator = ClusterNodeLocator::with_coordinator(DESTINATION, ROOT, Arc::clone(&self.tree))
            .await
            .expect("locator");
        Arc::new(locator)
    }

    /// Connector over a fresh locator with test timeouts.
    pub async fn connector(&self) -> TestConnector {
        self.connector_with(self.locator().await)
    }

    pub fn connector_with(&self, locator: Arc<TestLocator>) -> TestConnector {
        ClusterConnector::new(locator, Arc::clone(&self.dialer), ConnectorConfig::for_testing())
            .expect("connector")
    }
}

// =============================================================================
// Entry builders
// =============================================================================

pub fn row_header(schema: &str, table: &str, offset: i64) -> EntryHeader {
    EntryHeader {
        logfile_name: BINLOG.to_string(),
        logfile_offset: offset,
        schema_name: schema.to_string(),
        table_name: table.to_string(),
        ..Default::default()
    }
}

fn row_entry(schema: &str, table: &str, offset: i64, change: RowChange) -> Entry {
    Entry::row_data(row_header(schema, table, offset), &change, &JsonRowCodec).expect("encode row change")
}

fn row_columns(id: i64, name: &str, updated: bool) -> Vec<Column> {
    let mut id_column = Column::new("id", id.to_string(), updated);
    id_column.is_key = true;
    vec![id_column, Column::new("name", name, updated)]
}

/// INSERT of row `id` into `schema.table`.
pub fn insert_row(schema: &str, table: &str, id: i64) -> Entry {
    let row = RowData {
        before_columns: Vec::new(),
        after_columns: row_columns(id, &format!("row-{}", id), true),
    };
    row_entry(schema, table, 100 + id, RowChange::new(EventType::Insert, vec![row]))
}

/// UPDATE of row `id`: only `name` changes.
pub fn update_row(schema: &str, table: &str, id: i64, name: &str) -> Entry {
    let mut after = row_columns(id, name, false);
    after[1].updated = true;
    let row = RowData {
        before_columns: row_columns(id, &format!("row-{}", id), false),
        after_columns: after,
    };
    row_entry(schema, table, 100 + id, RowChange::new(EventType::Update, vec![row]))
}

/// DELETE of row `id`.
pub fn delete_row(schema: &str, table: &str, id: i64) -> Entry {
    let row = RowData {
        before_columns: row_columns(id, &format!("row-{}", id), false),
        after_columns: Vec::new(),
    };
    row_entry(schema, table, 100 + id, RowChange::new(EventType::Delete, vec![row]))
}

/// Wrap `rows` in transaction begin/end markers.
pub fn transaction(offset: i64, rows: Vec<Entry>) -> Vec<Entry> {
    let mut entries = Vec::with_capacity(rows.len() + 2);
    entries.push(Entry::transaction_begin(BINLOG, offset));
    entries.extend(rows);
    entries.push(Entry::transaction_end(BINLOG, offset + 1));
    entries
}

/// `shop.orders` inserts for every id in `ids`.
pub fn order_inserts(ids: impl IntoIterator<Item = i64>) -> Vec<Entry> {
    ids.into_iter().map(|id| insert_row("shop", "orders", id)).collect()
}

/// Row ids carried by a batch, markers skipped.
pub fn row_ids(batch: &Batch) -> Vec<i64> {
    entry_ids(&batch.entries)
}

pub fn entry_ids(entries: &[Entry]) -> Vec<i64> {
    entries
        .iter()
        .filter(|e| !e.entry_type.is_transaction_marker())
        .map(|e| {
            let change = e.row_change(&JsonRowCodec).expect("decode row change");
            let row = &change.rows[0];
            let columns = if row.after_columns.is_empty() {
                &row.before_columns
            } else {
                &row.after_columns
            };
            columns
                .iter()
                .find(|c| c.name == "id")
                .and_then(|c| c.value.parse().ok())
                .expect("id column")
        })
        .collect()
}
