//! HNSW vector index implementation using hnsw_rs.
//!
//! Wraps `hnsw_rs::Hnsw<f32, DistL2>` with:
//! - `DocumentId` → internal `usize` mapping
//! - Replace-on-duplicate via tombstones + filtered search
//! - Binary snapshot persistence (see [`super::snapshot`])
//!
//! # Thread Safety
//!
//! Mutating methods take `&mut self`. `IndexManager` holds the index
//! behind a `RwLock`, so searches run in parallel and inserts are
//! exclusive.

use std::collections::{HashMap, HashSet};

use anndists::dist::distances::DistL2;
use hnsw_rs::prelude::*;
use tracing::{debug, warn};

use crate::config::HnswConfig;
use crate::error::{Result, ValidationError};
use crate::types::{DocumentId, Embedding};

use super::snapshot::{IndexSnapshot, SnapshotEntry};
use super::{InsertOutcome, Neighbor, VectorIndex};

/// Retired points tolerated before a rebuild is considered.
pub const COMPACT_MIN_RETIRED: usize = 64;

/// HNSW vector index backed by `hnsw_rs`.
///
/// # Replacement
///
/// `hnsw_rs` can't delete points, so replacing an id retires its old point
/// and filters it out of searches. Once retired points reach
/// [`COMPACT_MIN_RETIRED`] and outnumber the live ones, the graph is
/// rebuilt from the live entries, keeping memory proportional to the
/// live set.
///
/// # Persistence Strategy
///
/// The graph itself is never written to disk, because
/// `hnsw_rs::HnswIo::load_hnsw` has lifetime constraints that create
/// self-referential struct issues. Instead the index keeps every live
/// vector and a snapshot stores `(id, vector)` pairs; loading rebuilds the
/// graph from them.
pub struct HnswIndex {
    /// The underlying HNSW graph. Uses `'static` lifetime because
    /// all data is heap-owned (not memory-mapped).
    hnsw: Hnsw<'static, f32, DistL2>,

    config: HnswConfig,

    /// Embedding dimension (must match all inserted vectors).
    dimension: usize,

    /// DocumentId → current internal id.
    id_to_internal: HashMap<DocumentId, usize>,

    /// Internal id → (DocumentId, vector). Indexed by internal id, so it
    /// also holds retired entries until the next rebuild.
    slots: Vec<(DocumentId, Embedding)>,

    /// Internal ids retired by a replace (excluded from search).
    retired: HashSet<usize>,

    /// Mutation counter.
    epoch: u64,
}

impl std::fmt::Debug for HnswIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HnswIndex")
            .field("dimension", &self.dimension)
            .field("live", &self.id_to_internal.len())
            .field("retired", &self.retired.len())
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

impl HnswIndex {
    /// Creates a new empty HNSW index.
    ///
    /// # Arguments
    ///
    /// * `dimension` - Expected embedding dimension (validated on insert)
    /// * `config` - HNSW tuning parameters
    pub fn new(dimension: usize, config: &HnswConfig) -> Self {
        Self {
            hnsw: new_graph(config),
            config: config.clone(),
            dimension,
            id_to_internal: HashMap::new(),
            slots: Vec::new(),
            retired: HashSet::new(),
            epoch: 0,
        }
    }

    /// Rebuilds an index from validated snapshot content.
    ///
    /// Entries keep their snapshot order; the epoch carries over.
    pub fn from_snapshot(snapshot: IndexSnapshot, config: &HnswConfig) -> Self {
        let mut index = Self::new(snapshot.dimension as usize, config);
        index.epoch = snapshot.epoch;

        if snapshot.entries.is_empty() {
            return index;
        }

        for (internal_id, entry) in snapshot.entries.into_iter().enumerate() {
            let id = DocumentId(entry.id);
            index.id_to_internal.insert(id, internal_id);
            index.slots.push((id, entry.vector));
        }

        let batch: Vec<(&Vec<f32>, usize)> = index
            .slots
            .iter()
            .enumerate()
            .map(|(internal_id, (_, vector))| (vector, internal_id))
            .collect();

        // Parallel bulk insert (uses rayon internally)
        index.hnsw.parallel_insert(&batch);

        debug!(entries = index.slots.len(), "Rebuilt HNSW graph from snapshot");
        index
    }

    /// Decodes index-file bytes and rebuilds the graph.
    ///
    /// # Errors
    ///
    /// Returns a persistence error if the bytes are not a valid index file
    /// for `dimension`.
    pub fn deserialize(bytes: &[u8], dimension: usize, config: &HnswConfig) -> Result<Self> {
        let snapshot = IndexSnapshot::decode(bytes, dimension)?;
        Ok(Self::from_snapshot(snapshot, config))
    }

    /// Captures the live entries in insertion order.
    ///
    /// Retired vectors are left out, so a reload compacts the index.
    pub fn snapshot(&self) -> IndexSnapshot {
        let entries = self
            .slots
            .iter()
            .enumerate()
            .filter(|(internal_id, _)| !self.retired.contains(internal_id))
            .map(|(_, (id, vector))| SnapshotEntry {
                id: id.get(),
                vector: vector.clone(),
            })
            .collect();

        IndexSnapshot {
            dimension: self.dimension as u32,
            epoch: self.epoch,
            entries,
        }
    }

    /// Returns the stored vector for `id`, if live.
    pub fn vector(&self, id: DocumentId) -> Option<&[f32]> {
        self.id_to_internal
            .get(&id)
            .and_then(|&internal_id| self.slots.get(internal_id))
            .map(|(_, vector)| vector.as_slice())
    }

    /// Returns the live document ids in insertion order.
    pub fn ids(&self) -> Vec<DocumentId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(internal_id, _)| !self.retired.contains(internal_id))
            .map(|(_, (id, _))| *id)
            .collect()
    }

    /// Returns the total number of vectors in the graph (including retired).
    pub fn total_count(&self) -> usize {
        self.hnsw.get_nb_point()
    }

    /// Returns the graph parameters.
    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    /// Rebuilds the graph from the live entries if retired points dominate.
    fn maybe_compact(&mut self) {
        let retired = self.retired.len();
        if retired < COMPACT_MIN_RETIRED || retired < self.id_to_internal.len() {
            return;
        }

        let config = self.config.clone();
        *self = Self::from_snapshot(self.snapshot(), &config);
        debug!(retired, live = self.len(), "Compacted HNSW graph");
    }

    fn check_vector(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(ValidationError::dimension_mismatch(self.dimension, vector.len()).into());
        }
        if let Some(position) = vector.iter().position(|v| !v.is_finite()) {
            return Err(ValidationError::non_finite(position).into());
        }
        Ok(())
    }
}

fn new_graph(config: &HnswConfig) -> Hnsw<'static, f32, DistL2> {
    Hnsw::new(
        config.max_nb_connection,
        config.max_elements,
        config.max_layer,
        config.ef_construction,
        DistL2,
    )
}

// ==========================================================================
// VectorIndex trait implementation
// ==========================================================================

impl VectorIndex for HnswIndex {
    fn insert(&mut self, id: DocumentId, vector: &[f32]) -> Result<InsertOutcome> {
        self.check_vector(vector)?;

        // Assign next sequential internal ID
        let internal_id = self.slots.len();
        let outcome = match self.id_to_internal.insert(id, internal_id) {
            Some(previous) => {
                warn!(%id, "Document already indexed, replacing its vector");
                self.retired.insert(previous);
                InsertOutcome::Replaced
            }
            None => InsertOutcome::Inserted,
        };

        self.slots.push((id, vector.to_vec()));
        self.hnsw.insert((vector, internal_id));
        self.epoch += 1;

        if outcome == InsertOutcome::Replaced {
            self.maybe_compact();
        }
        Ok(outcome)
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.check_vector(query)?;

        if k == 0 || self.id_to_internal.is_empty() {
            return Ok(Vec::new());
        }

        let ef_search = self.config.ef_search.max(k);

        // Use filtered search to exclude retired entries.
        // We create a concrete closure (not a trait object) so it
        // auto-implements hnsw_rs::FilterT via the blanket impl.
        let retired = &self.retired;
        let filter_fn = |id: &usize| -> bool { !retired.contains(id) };
        let results = if retired.is_empty() {
            self.hnsw.search(query, k, ef_search)
        } else {
            self.hnsw.search_filter(query, k, ef_search, Some(&filter_fn))
        };

        // Map internal IDs back to DocumentIds
        let mut neighbors: Vec<Neighbor> = results
            .into_iter()
            .filter(|n| !retired.contains(&n.d_id))
            .filter_map(|n| {
                self.slots.get(n.d_id).map(|(id, _)| Neighbor {
                    id: *id,
                    distance: n.distance,
                })
            })
            .collect();

        neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        neighbors.truncate(k);
        Ok(neighbors)
    }

    fn contains(&self, id: DocumentId) -> bool {
        self.id_to_internal.contains_key(&id)
    }

    fn len(&self) -> usize {
        self.id_to_internal.len()
    }

    fn reset(&mut self) {
        self.hnsw = new_graph(&self.config);
        self.id_to_internal.clear();
        self.slots.clear();
        self.retired.clear();
        self.epoch += 1;
    }

    fn epoch(&self) -> u64 {
        self.epoch
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn serialize(&self) -> Result<Vec<u8>> {
        self.snapshot().encode()
    }
}

// ==========================================================================
// Tests
// ==========================================================================
