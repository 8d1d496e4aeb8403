//! Property-based tests using proptest.
//!
//! These tests verify invariants that should hold for all inputs,
//! helping catch edge cases that unit tests might miss.

use canal_cluster_client::filter::TableFilter;
use canal_cluster_client::locator::{shuffled, ServerAddress, ServerRunningData};
use canal_cluster_client::RetryConfig;
use proptest::prelude::*;
use std::time::Duration;

// =============================================================================
// Server Address Parsing
// =============================================================================

proptest! {
    /// Any non-empty host without ':' plus a port in 1..=65535 parses back
    /// to the same parts.
    #[test]
    fn server_address_valid_roundtrip(
        host in "[a-z0-9][a-z0-9.-]{0,30}",
        port in 1u16..=u16::MAX,
    ) {
        let text = format!("{}:{}", host, port);
        let address = ServerAddress::parse(&text).unwrap();
        prop_assert_eq!(&address.host, &host);
        prop_assert_eq!(address.port, port);
        prop_assert_eq!(address.to_string(), text);
    }

    /// Parsing never panics, and anything accepted is a usable endpoint.
    #[test]
    fn server_address_parse_never_panics(input in ".*") {
        if let Ok(address) = ServerAddress::parse(&input) {
            prop_assert!(!address.host.is_empty());
            prop_assert!(!address.host.contains(':'));
            prop_assert!(address.port != 0);
            prop_assert_eq!(ServerAddress::parse(&address.to_string()).unwrap(), address);
        }
    }

    /// Without a ':' there is no port, so nothing is accepted.
    #[test]
    fn server_address_without_colon_rejected(input in "[^:]*") {
        prop_assert!(ServerAddress::parse(&input).is_err());
    }

    /// More than one ':' is rejected (no IPv6 literals, no defaults).
    #[test]
    fn server_address_extra_colon_rejected(
        host in "[a-z]{1,10}",
        a in 1u16..=u16::MAX,
        b in 1u16..=u16::MAX,
    ) {
        let text = format!("{}:{}:{}", host, a, b);
        prop_assert!(ServerAddress::parse(&text).is_err());
    }

    /// Non-numeric or out-of-range ports are rejected.
    #[test]
    fn server_address_bad_port_rejected(
        host in "[a-z]{1,10}",
        port in prop_oneof![
            "[a-z]{1,6}",
            (65536u32..10_000_000u32).prop_map(|p| p.to_string()),
            Just("0".to_string()),
            Just(String::new()),
        ],
    ) {
        let text = format!("{}:{}", host, port);
        prop_assert!(ServerAddress::parse(&text).is_err());
    }
}

// =============================================================================
// Running Record
// =============================================================================

proptest! {
    /// Arbitrary bytes never panic the running-record parser.
    #[test]
    fn running_record_parse_never_panics(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        let _ = ServerRunningData::from_json(&data);
    }

    /// Missing optional fields default; the address is kept verbatim.
    #[test]
    fn running_record_address_only(address in "[a-z0-9.]{1,20}:[0-9]{1,5}") {
        let json = format!(r#"{{"address":"{}"}}"#, address);
        let record = ServerRunningData::from_json(json.as_bytes()).unwrap();
        prop_assert_eq!(record.address, address);
        prop_assert_eq!(record.cid, 0);
        prop_assert!(!record.active);
    }
}

// =============================================================================
// Cluster Shuffle
// =============================================================================

proptest! {
    /// Shuffling is a permutation: same members, same multiplicity.
    #[test]
    fn shuffle_is_permutation(nodes in proptest::collection::vec("[0-9.]{7,15}:[0-9]{4,5}", 0..32)) {
        let mut original = nodes.clone();
        let mut result = shuffled(nodes);
        original.sort();
        result.sort();
        prop_assert_eq!(original, result);
    }
}

// =============================================================================
// Table Filter
// =============================================================================

proptest! {
    /// Arbitrary filter text never panics; it compiles or reports why.
    #[test]
    fn table_filter_parse_never_panics(filter in ".*", table in ".*") {
        if let Ok(parsed) = TableFilter::parse(&filter) {
            let _ = parsed.matches(&table);
            prop_assert_eq!(parsed.as_str(), filter.as_str());
        }
    }

    /// An escaped `schema.table` matches exactly that table, anchored.
    #[test]
    fn table_filter_exact_name_is_anchored(
        schema in "[a-z_]{1,10}",
        table in "[a-z_]{1,10}",
    ) {
        let filter = TableFilter::parse(&format!("{}\\.{}", schema, table)).unwrap();
        let qualified = format!("{}.{}", schema, table);
        prop_assert!(filter.matches(&qualified));
        let suffixed = format!("{}x", qualified);
        let prefixed = format!("x{}", qualified);
        let underscored = format!("{}_{}", schema, table);
        prop_assert!(!filter.matches(&suffixed));
        prop_assert!(!filter.matches(&prefixed));
        prop_assert!(!filter.matches(&underscored));
    }

    /// Every alternative of a comma-separated list is honored.
    #[test]
    fn table_filter_alternatives(tables in proptest::collection::vec("[a-z]{1,8}\\.[a-z]{1,8}", 1..6)) {
        let escaped: Vec<String> = tables.iter().map(|t| regex::escape(t)).collect();
        let filter = TableFilter::parse(&escaped.join(", ")).unwrap();
        for table in &tables {
            prop_assert!(filter.matches(table));
        }
    }

    /// The default filter accepts any `schema.table`.
    #[test]
    fn table_filter_default_matches_all(schema in "[a-zA-Z0-9_]{1,16}", table in "[a-zA-Z0-9_]{1,16}") {
        let filter = TableFilter::parse(".*\\..*").unwrap();
        let qualified = format!("{}.{}", schema, table);
        prop_assert!(filter.matches(&qualified));
    }
}

// =============================================================================
// Retry Backoff
// =============================================================================

proptest! {
    /// Delays never shrink between attempts and never exceed max_delay.
    #[test]
    fn backoff_monotonic_and_capped(
        initial_ms in 1u64..1_000,
        extra_ms in 0u64..60_000,
        factor in 1.0f64..4.0,
        attempts in 1usize..200,
    ) {
        let config = RetryConfig {
            max_attempts: attempts,
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(initial_ms + extra_ms),
            backoff_factor: factor,
        };
        let mut previous = Duration::ZERO;
        for attempt in 1..=attempts {
            let delay = config.delay_for_attempt(attempt);
            prop_assert!(delay >= previous, "attempt {} shrank: {:?} < {:?}", attempt, delay, previous);
            prop_assert!(delay <= config.max_delay);
            previous = delay;
        }
        prop_assert!(config.allows_attempt(attempts));
        prop_assert!(!config.allows_attempt(attempts + 1));
    }
}
