//! Fuzz target for the running record read from the coordinator.
//!
//! Arbitrary node data must be rejected cleanly, never panic.

#![no_main]

use canal_cluster_client::locator::ServerRunningData;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(record) = ServerRunningData::from_json(data) {
        // Address validation is separate from JSON decoding
        let _ = record.server_address();
    }
});
