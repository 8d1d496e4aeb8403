//! Fuzz target for `host:port` parsing of running records.
//!
//! Parsing must never panic, and anything accepted must print back to a
//! string that parses to the same address.

#![no_main]

use canal_cluster_client::locator::ServerAddress;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: &str| {
    if let Ok(address) = ServerAddress::parse(input) {
        assert!(!address.host.is_empty());
        assert!(address.port != 0);

        let reparsed = ServerAddress::parse(&address.to_string()).expect("display output parses");
        assert_eq!(reparsed, address);
    }
});
