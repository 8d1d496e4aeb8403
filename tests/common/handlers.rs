// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Recording batch handler.
//!
//! Clones share state, so a test keeps one handle while the consumer loop
//! owns the other. Can be told to fail its first N calls to exercise the
//! rollback path.

#![allow(dead_code)]

use super::entry_ids;
use canal_cluster_client::consumer::{BatchHandler, HandlerError, HandlerFuture};
use canal_cluster_client::entry::Batch;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Recorded {
    /// Every batch offered, including failed attempts
    attempts: Vec<Batch>,
    /// Batches the handler accepted
    handled: Vec<Batch>,
}

#[derive(Clone, Default)]
pub struct RecordingHandler {
    recorded: Arc<Mutex<Recorded>>,
    failures_left: Arc<AtomicUsize>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `times` batches, then accept everything.
    pub fn failing(times: usize) -> Self {
        let handler = Self::default();
        handler.failures_left.store(times, Ordering::SeqCst);
        handler
    }

    pub fn attempts(&self) -> Vec<Batch> {
        self.recorded.lock().unwrap().attempts.clone()
    }

    pub fn handled(&self) -> Vec<Batch> {
        self.recorded.lock().unwrap().handled.clone()
    }

    /// Row ids of accepted batches, in delivery order.
    pub fn handled_ids(&self) -> Vec<i64> {
        self.handled()
            .iter()
            .flat_map(|b| entry_ids(&b.entries))
            .collect()
    }

    /// Poll until `count` rows were accepted or `within` elapses.
    pub async fn wait_for_rows(&self, count: usize, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            if self.handled_ids().len() >= count {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Poll until every id in `expected` was accepted at least once.
    ///
    /// Tolerates duplicates from redelivery.
    pub async fn wait_for_ids(&self, expected: &[i64], within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let seen: BTreeSet<i64> = self.handled_ids().into_iter().collect();
            if expected.iter().all(|id| seen.contains(id)) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl BatchHandler for RecordingHandler {
    fn handle_batch<'a>(&'a mut self, batch: &'a Batch) -> HandlerFuture<'a> {
        let result = {
            let mut recorded = self.recorded.lock().unwrap();
            recorded.attempts.push(batch.clone());

            let fail = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if fail {
                Err(HandlerError(format!("injected failure on batch {}", batch.id)))
            } else {
                recorded.handled.push(batch.clone());
                Ok(())
            }
        };
        Box::pin(async move { result })
    }
}
