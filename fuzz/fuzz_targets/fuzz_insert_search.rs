//! Inserts and searches arbitrary text through a full IndexManager.

#![no_main]

use std::sync::Arc;

use docindex::cache::MemoryCache;
use docindex::embedding::HashingEmbedding;
use docindex::{Config, DocumentId, IndexManager, PersistMode};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        index_path: dir.path().join("fuzz.hnsw"),
        persist_mode: PersistMode::Deferred,
        ..Default::default()
    };
    let manager = IndexManager::open(
        config,
        Arc::new(HashingEmbedding::new(384)),
        Arc::new(MemoryCache::new()),
    )
    .unwrap();

    // Empty text is rejected; everything else must index and be found
    if manager.insert_document(DocumentId(1), text).is_ok() {
        let result = manager.search(text, 3).unwrap();
        assert_eq!(result.ids, vec![DocumentId(1)]);
    }
});
