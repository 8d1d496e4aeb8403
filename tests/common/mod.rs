//! Shared test utilities for integration and chaos tests.
//!
//! This module provides:
//! - ZooKeeper testcontainer setup
//! - An in-memory relay cluster (coordination tree, servers, shared log)
//! - Entry builders and a recording batch handler

pub mod cluster;
pub mod containers;
pub mod handlers;

pub use cluster::*;
pub use containers::*;
pub use handlers::*;
