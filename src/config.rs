//! Configuration for the cluster client.
//!
//! Configuration can be constructed programmatically or deserialized from
//! YAML/JSON. Durations are human-readable strings (`"10s"`, `"200ms"`)
//! parsed with `humantime`.
//!
//! # Quick Start
//!
//! ```rust
//! use canal_cluster_client::config::ClientConfig;
//!
//! let config = ClientConfig::for_testing("example");
//! assert_eq!(config.locator.destination, "example");
//! config.validate().unwrap();
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! ClientConfig
//! ├── locator: LocatorConfig      # Where to find the relay cluster
//! │   ├── destination
//! │   ├── zk_servers
//! │   ├── connect_timeout
//! │   └── root                    # "/otter/canal"
//! ├── connector: ConnectorConfig  # Relay session handshake
//! │   ├── username / password
//! │   ├── client_id
//! │   ├── connect_timeout
//! │   ├── so_timeout
//! │   └── idle_timeout
//! └── consumer: ConsumerConfig    # Sample consumption loop
//!     ├── filter
//!     ├── batch_size
//!     ├── get_timeout
//!     └── empty_backoff
//! ```
//!
//! # YAML Example
//!
//! ```yaml
//! locator:
//!   destination: "example"
//!   zk_servers: ["zk1:2181", "zk2:2181"]
//!   connect_timeout: "10s"
//!
//! connector:
//!   username: "canal"
//!   password: "canal"
//!   so_timeout: "60s"
//!   idle_timeout: "1h"
//!
//! consumer:
//!   filter: ".*\\..*"
//!   batch_size: 100
//!   empty_backoff: "200ms"
//! ```

use crate::error::{CanalError, Result};
use crate::filter::TableFilter;
use crate::resilience::RetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default coordination root used by canal deployments.
pub const DEFAULT_ROOT: &str = "/otter/canal";

fn parse_duration(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| CanalError::Config(format!("{}: invalid duration {:?}: {}", field, value, e)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Top-level config
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything needed to discover a destination's relay and consume from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub locator: LocatorConfig,

    #[serde(default)]
    pub connector: ConnectorConfig,

    #[serde(default)]
    pub consumer: ConsumerConfig,
}

impl ClientConfig {
    /// Minimal config for tests: one local ZooKeeper, short timeouts.
    pub fn for_testing(destination: &str) -> Self {
        Self {
            locator: LocatorConfig::for_testing(destination, "127.0.0.1:2181"),
            connector: ConnectorConfig::for_testing(),
            consumer: ConsumerConfig::for_testing(),
        }
    }

    /// Check every section; first problem wins.
    pub fn validate(&self) -> Result<()> {
        self.locator.validate()?;
        self.connector.validate()?;
        self.consumer.validate()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LocatorConfig: coordination service access
// ═══════════════════════════════════════════════════════════════════════════════

/// Coordination service settings for one destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocatorConfig {
    /// Logical stream name; every coordination path is templated on it.
    pub destination: String,

    /// ZooKeeper endpoints, `host:port` each.
    pub zk_servers: Vec<String>,

    /// Session establishment timeout (e.g., "10s").
    #[serde(default = "default_zk_connect_timeout")]
    pub connect_timeout: String,

    /// Root of the canal tree.
    #[serde(default = "default_root")]
    pub root: String,
}

fn default_zk_connect_timeout() -> String {
    "10s".to_string()
}

fn default_root() -> String {
    DEFAULT_ROOT.to_string()
}

impl LocatorConfig {
    /// Locator config with defaults for everything but the endpoints.
    pub fn new(destination: &str, zk_servers: Vec<String>) -> Self {
        Self {
            destination: destination.to_string(),
            zk_servers,
            connect_timeout: default_zk_connect_timeout(),
            root: default_root(),
        }
    }

    /// Single endpoint, one second timeout.
    pub fn for_testing(destination: &str, zk_server: &str) -> Self {
        Self {
            connect_timeout: "1s".to_string(),
            ..Self::new(destination, vec![zk_server.to_string()])
        }
    }

    /// Parsed `connect_timeout`.
    pub fn connect_timeout_duration(&self) -> Result<Duration> {
        parse_duration("locator.connect_timeout", &self.connect_timeout)
    }

    pub fn validate(&self) -> Result<()> {
        if self.destination.is_empty() {
            return Err(CanalError::Config("locator.destination is empty".to_string()));
        }
        if self.destination.contains('/') {
            return Err(CanalError::Config(format!(
                "locator.destination {:?} must not contain '/'",
                self.destination
            )));
        }
        if self.zk_servers.is_empty() {
            return Err(CanalError::Config("locator.zk_servers is empty".to_string()));
        }
        if !self.root.starts_with('/') {
            return Err(CanalError::Config(format!(
                "locator.root {:?} must be an absolute path",
                self.root
            )));
        }
        self.connect_timeout_duration()?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ConnectorConfig: relay session handshake
// ═══════════════════════════════════════════════════════════════════════════════

/// Relay session settings sent in the handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    #[serde(default = "default_credential")]
    pub username: String,

    #[serde(default = "default_credential")]
    pub password: String,

    /// Consumer identity; the server keeps one ack cursor per client id.
    #[serde(default = "default_client_id")]
    pub client_id: u16,

    /// Upper bound for dial + handshake (e.g., "5s").
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,

    /// Socket read timeout advertised to the server.
    #[serde(default = "default_so_timeout")]
    pub so_timeout: String,

    /// Server drops the session after this long without traffic.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: String,
}

fn default_credential() -> String {
    "canal".to_string()
}

fn default_client_id() -> u16 {
    1001
}

fn default_connect_timeout() -> String {
    "5s".to_string()
}

fn default_so_timeout() -> String {
    "60s".to_string()
}

fn default_idle_timeout() -> String {
    "1h".to_string()
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            username: default_credential(),
            password: default_credential(),
            client_id: default_client_id(),
            connect_timeout: default_connect_timeout(),
            so_timeout: default_so_timeout(),
            idle_timeout: default_idle_timeout(),
        }
    }
}

impl ConnectorConfig {
    /// Default credentials, short connect timeout.
    pub fn for_testing() -> Self {
        Self {
            connect_timeout: "500ms".to_string(),
            ..Default::default()
        }
    }

    pub fn connect_timeout_duration(&self) -> Result<Duration> {
        parse_duration("connector.connect_timeout", &self.connect_timeout)
    }

    pub fn so_timeout_duration(&self) -> Result<Duration> {
        parse_duration("connector.so_timeout", &self.so_timeout)
    }

    pub fn idle_timeout_duration(&self) -> Result<Duration> {
        parse_duration("connector.idle_timeout", &self.idle_timeout)
    }

    pub fn validate(&self) -> Result<()> {
        if self.username.is_empty() {
            return Err(CanalError::Config("connector.username is empty".to_string()));
        }
        if self.connect_timeout_duration()?.is_zero() {
            return Err(CanalError::Config(
                "connector.connect_timeout must be positive".to_string(),
            ));
        }
        self.so_timeout_duration()?;
        self.idle_timeout_duration()?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ConsumerConfig: sample consumption loop
// ═══════════════════════════════════════════════════════════════════════════════

/// Settings for [`ConsumerLoop`](crate::consumer::ConsumerLoop).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// `schema.table` regex filter, comma-separated alternatives.
    /// Empty matches every table.
    #[serde(default = "default_filter")]
    pub filter: String,

    /// Maximum entries per `get()`.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Long-poll timeout per `get()`. `None` blocks until data arrives.
    #[serde(default = "default_get_timeout")]
    pub get_timeout: Option<String>,

    /// Sleep after an empty poll.
    #[serde(default = "default_empty_backoff")]
    pub empty_backoff: String,

    /// Reconnect policy after connection/discovery failures.
    #[serde(skip)]
    pub retry: RetryConfig,
}

fn default_filter() -> String {
    ".*\\..*".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_get_timeout() -> Option<String> {
    Some("1s".to_string())
}

fn default_empty_backoff() -> String {
    "200ms".to_string()
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            batch_size: default_batch_size(),
            get_timeout: default_get_timeout(),
            empty_backoff: default_empty_backoff(),
            retry: RetryConfig::default(),
        }
    }
}

impl ConsumerConfig {
    /// Short polls and fast-fail retries.
    pub fn for_testing() -> Self {
        Self {
            get_timeout: Some("50ms".to_string()),
            empty_backoff: "10ms".to_string(),
            retry: RetryConfig::testing(),
            ..Default::default()
        }
    }

    pub fn get_timeout_duration(&self) -> Result<Option<Duration>> {
        self.get_timeout
            .as_deref()
            .map(|t| parse_duration("consumer.get_timeout", t))
            .transpose()
    }

    pub fn empty_backoff_duration(&self) -> Result<Duration> {
        parse_duration("consumer.empty_backoff", &self.empty_backoff)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(CanalError::Config("consumer.batch_size must be > 0".to_string()));
        }
        // Empty is allowed and matches every table
        TableFilter::parse(&self.filter).map_err(|e| CanalError::Config(format!("consumer.filter: {}", e)))?;
        self.get_timeout_duration()?;
        self.empty_backoff_duration()?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_defaults() {
        let config = LocatorConfig::new("example", vec!["zk1:2181".to_string()]);
        assert_eq!(config.root, "/otter/canal");
        assert_eq!(config.connect_timeout_duration().unwrap(), Duration::from_secs(10));
        config.validate().unwrap();
    }

    #[test]
    fn test_locator_validation() {
        let mut config = LocatorConfig::for_testing("example", "zk:2181");
        config.zk_servers.clear();
        assert!(matches!(config.validate(), Err(CanalError::Config(_))));

        let config = LocatorConfig::for_testing("", "zk:2181");
        assert!(config.validate().is_err());

        let config = LocatorConfig::for_testing("a/b", "zk:2181");
        assert!(config.validate().is_err());

        let config = LocatorConfig {
            root: "otter".to_string(),
            ..LocatorConfig::for_testing("example", "zk:2181")
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_connector_defaults() {
        let config = ConnectorConfig::default();
        assert_eq!(config.username, "canal");
        assert_eq!(config.password, "canal");
        assert_eq!(config.so_timeout_duration().unwrap(), Duration::from_secs(60));
        assert_eq!(config.idle_timeout_duration().unwrap(), Duration::from_secs(3600));
        config.validate().unwrap();
    }

    #[test]
    fn test_duration_formats() {
        let test_cases = [
            ("5s", Duration::from_secs(5)),
            ("1m", Duration::from_secs(60)),
            ("500ms", Duration::from_millis(500)),
            ("2min", Duration::from_secs(120)),
        ];

        for (input, expected) in test_cases {
            let config = ConnectorConfig {
                so_timeout: input.to_string(),
                ..Default::default()
            };
            assert_eq!(config.so_timeout_duration().unwrap(), expected, "Failed for input: {}", input);
        }
    }

    #[test]
    fn test_invalid_duration_is_config_error() {
        let config = ConnectorConfig {
            idle_timeout: "forever".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("connector.idle_timeout"));
    }

    #[test]
    fn test_zero_connect_timeout_rejected() {
        let config = ConnectorConfig {
            connect_timeout: "0s".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_consumer_defaults() {
        let config = ConsumerConfig::default();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.filter, ".*\\..*");
        assert_eq!(config.empty_backoff_duration().unwrap(), Duration::from_millis(200));
        assert_eq!(config.get_timeout_duration().unwrap(), Some(Duration::from_secs(1)));
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn test_consumer_blocking_get() {
        let config = ConsumerConfig {
            get_timeout: None,
            ..Default::default()
        };
        assert_eq!(config.get_timeout_duration().unwrap(), None);
    }

    #[test]
    fn test_consumer_validation() {
        let config = ConsumerConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_consumer_filter_validation() {
        let empty = ConsumerConfig {
            filter: String::new(),
            ..Default::default()
        };
        empty.validate().unwrap();

        let broken = ConsumerConfig {
            filter: "shop\\.orders,(unclosed".to_string(),
            ..Default::default()
        };
        let err = broken.validate().unwrap_err();
        assert!(matches!(err, CanalError::Config(_)));
        assert!(err.to_string().contains("consumer.filter"));
    }

    #[test]
    fn test_for_testing_config() {
        let config = ClientConfig::for_testing("example");
        assert_eq!(config.locator.destination, "example");
        assert_eq!(config.consumer.retry, RetryConfig::testing());
        config.validate().unwrap();
    }

    #[test]
    fn test_config_json_defaults() {
        let json = r#"{"locator":{"destination":"example","zk_servers":["zk1:2181"]}}"#;
        let config: ClientConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.locator.root, DEFAULT_ROOT);
        assert_eq!(config.locator.connect_timeout, "10s");
        assert_eq!(config.connector.client_id, 1001);
        assert_eq!(config.consumer.batch_size, 100);
        config.validate().unwrap();
    }

    #[test]
    fn test_config_json_roundtrip() {
        let config = ClientConfig::for_testing("roundtrip");
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ClientConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.locator.destination, "roundtrip");
        assert_eq!(parsed.connector.connect_timeout, "500ms");
        assert_eq!(parsed.consumer.get_timeout.as_deref(), Some("50ms"));
    }
}
