//! Fuzz target for row-change payload decoding.
//!
//! A corrupt `store_value` must surface as a codec error. Anything that
//! decodes must encode again without error.

#![no_main]

use canal_cluster_client::entry::{JsonRowCodec, RowChangeCodec};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let codec = JsonRowCodec;
    if let Ok(change) = codec.decode(data) {
        let encoded = codec.encode(&change).expect("decoded change re-encodes");
        assert_eq!(codec.decode(&encoded).expect("re-encoded change decodes"), change);
    }
});
