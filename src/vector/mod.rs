//! Vector index abstractions for semantic search.
//!
//! This module provides a trait-based abstraction over vector indexes,
//! allowing different ANN (Approximate Nearest Neighbor) backends.
//! The primary implementation uses [`hnsw_rs`] (pure Rust).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │         VectorIndex trait         │
//! └──────────┬───────────────────────┘
//!            │
//!    ┌───────┴────────┐
//!    │   HnswIndex    │  hnsw_rs graph + DocumentId map + tombstones
//!    └───────┬────────┘
//!            │ serialize / deserialize
//!    ┌───────┴────────┐
//!    │ IndexSnapshot  │  versioned binary index file
//!    └────────────────┘
//! ```
//!
//! The snapshot stores ids and raw vectors, not graph edges. Loading
//! rebuilds the graph from those vectors, so the file format is
//! independent of the graph library's internal layout.

mod hnsw;
mod snapshot;

pub use hnsw::{HnswIndex, COMPACT_MIN_RETIRED};
pub use snapshot::{IndexSnapshot, SnapshotEntry, FORMAT_VERSION, INDEX_MAGIC};
pub(crate) use snapshot::codec;

use crate::error::Result;
use crate::types::DocumentId;

/// A single nearest-neighbor match.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbor {
    /// Matched document.
    pub id: DocumentId,

    /// L2 distance from the query (0.0 = identical).
    pub distance: f32,
}

/// Result of inserting a vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The id was new.
    Inserted,

    /// The id was already present; its previous vector was retired.
    Replaced,
}

/// Vector index trait for approximate nearest neighbor search.
///
/// Implementations must be `Send + Sync` for use inside `IndexManager`.
/// Mutating methods take `&mut self`: callers serialize writers with a
/// lock, and readers share `&self`.
pub trait VectorIndex: Send + Sync {
    /// Adds `vector` under `id`, replacing any previous vector for `id`.
    ///
    /// After this call, `search` can find the vector.
    fn insert(&mut self, id: DocumentId, vector: &[f32]) -> Result<InsertOutcome>;

    /// Returns up to `k` nearest neighbors, closest first.
    ///
    /// Returns fewer than `k` results when the index holds fewer entries.
    /// Never pads.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    /// Returns true if `id` has a live entry.
    fn contains(&self, id: DocumentId) -> bool;

    /// Returns the number of live entries.
    fn len(&self) -> usize;

    /// Returns true if the index has no live entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry in place.
    fn reset(&mut self);

    /// Returns the mutation counter. Every `insert` and `reset` advances it.
    fn epoch(&self) -> u64;

    /// Returns the vector dimension this index accepts.
    fn dimension(&self) -> usize;

    /// Encodes the whole index as index-file bytes.
    fn serialize(&self) -> Result<Vec<u8>>;
}
