//! Feeds arbitrary bytes to the index file loader.
//!
//! Decoding must reject garbage with an error, never panic, and anything
//! it accepts must rebuild into a searchable index.

#![no_main]

use docindex::vector::{HnswIndex, VectorIndex};
use docindex::HnswConfig;
use libfuzzer_sys::fuzz_target;

const DIM: usize = 4;

fuzz_target!(|data: &[u8]| {
    let config = HnswConfig {
        max_elements: 1024,
        ..Default::default()
    };

    if let Ok(index) = HnswIndex::deserialize(data, DIM, &config) {
        let _ = index.search(&[0.0; DIM], 5);
        // Accepted files must survive a second round trip
        let bytes = index.serialize().unwrap();
        assert!(HnswIndex::deserialize(&bytes, DIM, &config).is_ok());
    }
});
