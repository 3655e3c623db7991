//! Benchmarks for docindex index operations.
//!
//! Run with: `cargo bench`
//!
//! Performance targets:
//! - `search()` (cache miss) < 5ms at 10K documents
//! - `search()` (cache hit) < 100µs
//! - `initialize()` of a 10K-document index file < 2s

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use docindex::cache::{MemoryCache, NoopCache};
use docindex::embedding::HashingEmbedding;
use docindex::{Config, DocumentId, IndexManager, PersistMode};
use tempfile::tempdir;

fn text(id: i64) -> String {
    format!("document {id} covering topic {} and subject {}", id % 97, id % 13)
}

fn populated(path: &std::path::Path, n: i64, cache: bool) -> IndexManager {
    let config = Config {
        index_path: path.to_path_buf(),
        persist_mode: PersistMode::Deferred,
        ..Default::default()
    };
    let cache: Arc<dyn docindex::cache::CacheClient> = if cache {
        Arc::new(MemoryCache::new())
    } else {
        Arc::new(NoopCache)
    };
    let manager =
        IndexManager::open(config, Arc::new(HashingEmbedding::new(384)), cache).unwrap();

    let texts: Vec<String> = (0..n).map(text).collect();
    let batch: Vec<(DocumentId, &str)> = texts
        .iter()
        .enumerate()
        .map(|(i, t)| (DocumentId(i as i64), t.as_str()))
        .collect();
    manager.insert_documents(&batch).unwrap();
    manager.flush().unwrap();
    manager
}

/// Benchmark a search that misses every cache.
fn bench_search_uncached(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_uncached");
    for n in [1_000i64, 10_000] {
        let dir = tempdir().unwrap();
        let manager = populated(&dir.path().join("idx"), n, false);

        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| manager.search("which topic covers subject 7", 10).unwrap());
        });
    }
    group.finish();
}

/// Benchmark a repeated search served from the result cache.
fn bench_search_cached(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let manager = populated(&dir.path().join("idx"), 1_000, true);
    manager.search("which topic covers subject 7", 10).unwrap();

    c.bench_function("search_cached", |b| {
        b.iter(|| manager.search("which topic covers subject 7", 10).unwrap());
    });
}

/// Benchmark an insert including the full index-file rewrite.
fn bench_insert_immediate(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("idx");
    drop(populated(&path, 1_000, false));

    let manager = IndexManager::open(
        Config::with_index_path(&path),
        Arc::new(HashingEmbedding::new(384)),
        Arc::new(NoopCache),
    )
    .unwrap();

    let mut next = 1_000_000i64;
    c.bench_function("insert_immediate_1k", |b| {
        b.iter(|| {
            next += 1;
            manager.insert_document(DocumentId(next), &text(next)).unwrap();
        });
    });
}

/// Benchmark loading an existing index file.
fn bench_initialize(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("idx");
    drop(populated(&path, 10_000, false));

    c.bench_function("initialize_10k", |b| {
        b.iter_batched(
            || {
                IndexManager::new(
                    Config::with_index_path(&path),
                    Arc::new(HashingEmbedding::new(384)),
                    Arc::new(NoopCache),
                )
                .unwrap()
            },
            |manager| manager.initialize().unwrap(),
            BatchSize::PerIteration,
        );
    });
}

criterion_group!(
    benches,
    bench_search_uncached,
    bench_search_cached,
    bench_insert_immediate,
    bench_initialize
);
criterion_main!(benches);
