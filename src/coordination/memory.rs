//! In-memory coordination tree.
//!
//! Stands in for ZooKeeper in tests and demos. Nodes are stored by full
//! path; parents exist implicitly once any descendant is created. Every
//! read is counted per path so tests can assert that nothing is cached.

use super::{Coordinator, CoordinatorError, CoordinatorFuture};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// In-memory implementation of [`Coordinator`].
#[derive(Default)]
pub struct MemoryCoordinator {
    nodes: Mutex<BTreeMap<String, Vec<u8>>>,
    reads: Mutex<HashMap<String, usize>>,
    /// Simulate a lost session: every call fails with `SessionClosed`.
    session_lost: AtomicBool,
}

impl MemoryCoordinator {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite the node at `path`.
    pub fn set_data(&self, path: &str, data: impl Into<Vec<u8>>) {
        let mut nodes = self.nodes.lock().unwrap_or_else(|e| e.into_inner());
        nodes.insert(path.to_string(), data.into());
    }

    /// Create an empty child node `name` under `parent`.
    pub fn add_child(&self, parent: &str, name: &str) {
        self.set_data(&format!("{}/{}", parent.trim_end_matches('/'), name), Vec::new());
    }

    /// Remove the node at `path` and everything below it.
    pub fn remove(&self, path: &str) {
        let prefix = format!("{}/", path);
        let mut nodes = self.nodes.lock().unwrap_or_else(|e| e.into_inner());
        nodes.retain(|key, _| key != path && !key.starts_with(&prefix));
    }

    /// Toggle simulated session loss.
    pub fn set_session_lost(&self, lost: bool) {
        self.session_lost.store(lost, Ordering::Release);
    }

    /// How many times `get_data` / `get_children` were called for `path`.
    pub fn read_count(&self, path: &str) -> usize {
        let reads = self.reads.lock().unwrap_or_else(|e| e.into_inner());
        reads.get(path).copied().unwrap_or(0)
    }

    fn record_read(&self, path: &str) {
        let mut reads = self.reads.lock().unwrap_or_else(|e| e.into_inner());
        *reads.entry(path.to_string()).or_insert(0) += 1;
    }

    fn read_data(&self, path: &str) -> Result<Vec<u8>, CoordinatorError> {
        self.record_read(path);
        if self.session_lost.load(Ordering::Acquire) {
            return Err(CoordinatorError::SessionClosed);
        }
        let nodes = self.nodes.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(data) = nodes.get(path) {
            return Ok(data.clone());
        }
        // Implicit parent of an existing node
        let prefix = format!("{}/", path);
        if nodes.keys().any(|k| k.starts_with(&prefix)) {
            return Ok(Vec::new());
        }
        Err(CoordinatorError::NoNode(path.to_string()))
    }

    fn read_children(&self, path: &str) -> Result<Vec<String>, CoordinatorError> {
        self.record_read(path);
        if self.session_lost.load(Ordering::Acquire) {
            return Err(CoordinatorError::SessionClosed);
        }
        let nodes = self.nodes.lock().unwrap_or_else(|e| e.into_inner());
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let children: BTreeSet<&str> = nodes
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter_map(|rest| rest.split('/').next())
            .filter(|name| !name.is_empty())
            .collect();
        if children.is_empty() && !nodes.contains_key(path) {
            return Err(CoordinatorError::NoNode(path.to_string()));
        }
        Ok(children.into_iter().map(str::to_string).collect())
    }
}

impl Coordinator for MemoryCoordinator {
    fn get_data(&self, path: &str) -> CoordinatorFuture<'_, Vec<u8>> {
        let result = self.read_data(path);
        Box::pin(async move { result })
    }

    fn get_children(&self, path: &str) -> CoordinatorFuture<'_, Vec<String>> {
        let result = self.read_children(path);
        Box::pin(async move { result })
    }
}
