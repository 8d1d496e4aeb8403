// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Reconnection policy.
//!
//! The connector never retries on its own. Whoever drives it (usually the
//! [`ConsumerLoop`](crate::consumer::ConsumerLoop)) picks a [`RetryConfig`]
//! and applies it after `Connection` / `Discovery` failures. No preset is
//! unbounded except [`RetryConfig::daemon`], which has to be chosen
//! explicitly.
//!
//! # Example
//!
//! ```rust
//! use canal_cluster_client::resilience::RetryConfig;
//! use std::time::Duration;
//!
//! let retry = RetryConfig::startup();
//! assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(500));
//! assert!(retry.allows_attempt(20));
//! assert!(!retry.allows_attempt(21));
//! ```

use std::time::Duration;

/// Configuration for reconnect behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of consecutive reconnect attempts.
    /// Set to `usize::MAX` for infinite retries (daemon mode).
    pub max_attempts: usize,

    /// Initial delay before first retry.
    pub initial_delay: Duration,

    /// Maximum delay between retries (ceiling for exponential backoff).
    pub max_delay: Duration,

    /// Backoff multiplier (e.g., 2.0 = double delay each retry).
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    /// Fast-fail retry for the first connection of a process.
    ///
    /// 20 attempts with a gentle backoff, so a wrong coordinator address or
    /// destination name surfaces within a minute.
    ///
    /// # Backoff Schedule
    ///
    /// ```text
    /// Attempt  Delay     Cumulative
    /// -------  -----     ----------
    /// 1        500ms     500ms
    /// 2        750ms     1.25s
    /// 3        1.12s     2.37s
    /// ...
    /// 20       30s       ~45s (total)
    /// ```
    pub fn startup() -> Self {
        Self {
            max_attempts: 20,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_factor: 1.5,
        }
    }

    /// Infinite retry for a long-running consumer.
    ///
    /// Retries forever with exponential backoff capped at 5 minutes. Relay
    /// failover normally completes in seconds, the cap covers whole-cluster
    /// outages.
    ///
    /// # Backoff Schedule
    ///
    /// ```text
    /// Attempt  Delay
    /// -------  -----
    /// 1        1s
    /// 2        2s
    /// 3        4s
    /// ...
    /// 9        256s
    /// 10+      300s (cap)
    /// ```
    pub fn daemon() -> Self {
        Self {
            max_attempts: usize::MAX,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            backoff_factor: 2.0,
        }
    }

    /// Fast-fail retry for tests.
    pub fn testing() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
        }
    }

    /// Calculate delay for a given attempt number (1-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay;
        }

        // Clamp the exponent; anything past this is at max_delay anyway
        let exponent = (attempt - 1).min(64) as i32;
        let multiplier = self.backoff_factor.powi(exponent);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }

        std::cmp::min(Duration::from_secs_f64(delay_secs), self.max_delay)
    }

    /// Whether attempt number `attempt` (1-indexed) is still within budget.
    pub fn allows_attempt(&self, attempt: usize) -> bool {
        attempt <= self.max_attempts
    }
}
