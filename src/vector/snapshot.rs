//! Index file format.
//!
//! ```text
//! ┌───────────────────┬────────────────────┬──────────────────────────────┐
//! │ magic "DOCIDX\0\1"│ format_version u32 │ bincode(IndexSnapshot body)  │
//! │      8 bytes      │   little-endian    │  fixint, little-endian       │
//! └───────────────────┴────────────────────┴──────────────────────────────┘
//! ```
//!
//! Decoding validates, in order: magic, version, body structure, declared
//! dimension, every vector's length and finiteness, and id uniqueness. A
//! file that passes is safe to rebuild an index from.

use std::collections::HashSet;

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::error::{PersistenceError, Result};
use crate::types::DocumentId;

/// Leading bytes of every index file.
pub const INDEX_MAGIC: [u8; 8] = *b"DOCIDX\0\x01";

/// Current index file format version.
///
/// Increment this when making breaking changes to the body layout.
pub const FORMAT_VERSION: u32 = 1;

const HEADER_LEN: usize = INDEX_MAGIC.len() + 4;

/// One live index entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Document identifier.
    pub id: i64,

    /// Raw vector components.
    pub vector: Vec<f32>,
}

/// Decoded content of an index file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// Vector dimension.
    pub dimension: u32,

    /// Mutation counter at the time of the snapshot.
    pub epoch: u64,

    /// Live entries in insertion order.
    pub entries: Vec<SnapshotEntry>,
}

impl IndexSnapshot {
    /// Encodes the snapshot with header.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = codec()
            .serialize(self)
            .map_err(PersistenceError::from)?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
        bytes.extend_from_slice(&INDEX_MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    /// Decodes and validates index file bytes.
    ///
    /// # Errors
    ///
    /// - `Corrupted` for a bad header, malformed body, wrong-length or
    ///   non-finite vectors, or duplicate ids
    /// - `UnsupportedVersion` for a different format version
    /// - `DimensionMismatch` if the file's dimension isn't `expected_dimension`
    pub fn decode(bytes: &[u8], expected_dimension: usize) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(PersistenceError::corrupted(format!(
                "Index file too short: {} bytes",
                bytes.len()
            ))
            .into());
        }

        if bytes[..INDEX_MAGIC.len()] != INDEX_MAGIC {
            return Err(PersistenceError::corrupted("Not an index file (bad magic)").into());
        }

        let mut version = [0u8; 4];
        version.copy_from_slice(&bytes[INDEX_MAGIC.len()..HEADER_LEN]);
        let version = u32::from_le_bytes(version);
        if version != FORMAT_VERSION {
            return Err(PersistenceError::UnsupportedVersion {
                expected: FORMAT_VERSION,
                found: version,
            }
            .into());
        }

        let body = &bytes[HEADER_LEN..];
        let snapshot: IndexSnapshot = codec()
            .with_limit(body.len() as u64)
            .deserialize(body)
            .map_err(|e| PersistenceError::corrupted(format!("Invalid index body: {e}")))?;

        snapshot.validate(expected_dimension)?;
        Ok(snapshot)
    }

    fn validate(&self, expected_dimension: usize) -> Result<()> {
        let dimension = self.dimension as usize;
        if dimension != expected_dimension {
            return Err(PersistenceError::DimensionMismatch {
                expected: expected_dimension,
                found: dimension,
            }
            .into());
        }

        let mut seen = HashSet::with_capacity(self.entries.len());
        for entry in &self.entries {
            if entry.vector.len() != dimension {
                return Err(PersistenceError::corrupted(format!(
                    "Entry {} has {} components, expected {}",
                    entry.id,
                    entry.vector.len(),
                    dimension
                ))
                .into());
            }
            if entry.vector.iter().any(|v| !v.is_finite()) {
                return Err(PersistenceError::corrupted(format!(
                    "Entry {} has non-finite components",
                    entry.id
                ))
                .into());
            }
            if !seen.insert(entry.id) {
                return Err(PersistenceError::corrupted(format!(
                    "Duplicate entry for document {}",
                    entry.id
                ))
                .into());
            }
        }

        Ok(())
    }

    /// Returns the ids of all entries, in order.
    pub fn ids(&self) -> impl Iterator<Item = DocumentId> + '_ {
        self.entries.iter().map(|e| DocumentId(e.id))
    }
}

/// Fixed-width little-endian integers; no trailing bytes allowed.
///
/// Shared by the index file and every cached value.
pub(crate) fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .reject_trailing_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DocIndexError;
    use proptest::prelude::*;

    fn sample(dimension: u32) -> IndexSnapshot {
        IndexSnapshot {
            dimension,
            epoch: 7,
            entries: (0..3)
                .map(|i| SnapshotEntry {
                    id: 100 + i,
                    vector: (0..dimension).map(|d| (i as f32) + d as f32 * 0.5).collect(),
                })
                .collect(),
        }
    }

    fn persistence(err: DocIndexError) -> PersistenceError {
        match err {
            DocIndexError::Persistence(p) => p,
            other => panic!("expected persistence error, got {other:?}"),
        }
    }

    #[test]
    fn test_encode_decode() {
        let snapshot = sample(4);
        let bytes = snapshot.encode().unwrap();
        assert_eq!(&bytes[..8], &INDEX_MAGIC);
        assert_eq!(IndexSnapshot::decode(&bytes, 4).unwrap(), snapshot);
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let mut bytes = sample(4).encode().unwrap();
        bytes[0] = b'X';
        let err = persistence(IndexSnapshot::decode(&bytes, 4).unwrap_err());
        assert!(matches!(err, PersistenceError::Corrupted(_)));
    }

    #[test]
    fn test_decode_rejects_future_version() {
        let mut bytes = sample(4).encode().unwrap();
        bytes[8..12].copy_from_slice(&2u32.to_le_bytes());
        let err = persistence(IndexSnapshot::decode(&bytes, 4).unwrap_err());
        assert!(matches!(
            err,
            PersistenceError::UnsupportedVersion {
                expected: 1,
                found: 2
            }
        ));
    }

    #[test]
    fn test_decode_rejects_dimension_mismatch() {
        let bytes = sample(4).encode().unwrap();
        let err = persistence(IndexSnapshot::decode(&bytes, 384).unwrap_err());
        assert!(matches!(
            err,
            PersistenceError::DimensionMismatch {
                expected: 384,
                found: 4
            }
        ));
    }

    #[test]
    fn test_decode_rejects_truncated_body() {
        let bytes = sample(4).encode().unwrap();
        let err = persistence(IndexSnapshot::decode(&bytes[..bytes.len() - 3], 4).unwrap_err());
        assert!(matches!(err, PersistenceError::Corrupted(_)));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut bytes = sample(4).encode().unwrap();
        bytes.push(0);
        assert!(IndexSnapshot::decode(&bytes, 4).is_err());
    }

    #[test]
    fn test_decode_rejects_nan() {
        let mut snapshot = sample(4);
        snapshot.entries[1].vector[2] = f32::NAN;
        let bytes = snapshot.encode().unwrap();
        let err = persistence(IndexSnapshot::decode(&bytes, 4).unwrap_err());
        assert!(matches!(err, PersistenceError::Corrupted(_)));
    }

    #[test]
    fn test_decode_rejects_duplicate_ids() {
        let mut snapshot = sample(4);
        snapshot.entries[2].id = snapshot.entries[0].id;
        let bytes = snapshot.encode().unwrap();
        assert!(IndexSnapshot::decode(&bytes, 4).is_err());
    }

    #[test]
    fn test_decode_rejects_short_vector() {
        let mut snapshot = sample(4);
        snapshot.entries[0].vector.pop();
        let bytes = snapshot.encode().unwrap();
        assert!(IndexSnapshot::decode(&bytes, 4).is_err());
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = IndexSnapshot {
            dimension: 384,
            epoch: 0,
            entries: vec![],
        };
        let bytes = snapshot.encode().unwrap();
        assert_eq!(IndexSnapshot::decode(&bytes, 384).unwrap(), snapshot);
    }

    proptest! {
        #[test]
        fn prop_decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let _ = IndexSnapshot::decode(&bytes, 4);
        }

        #[test]
        fn prop_decode_never_panics_after_valid_header(
            body in proptest::collection::vec(any::<u8>(), 0..512)
        ) {
            let mut bytes = INDEX_MAGIC.to_vec();
            bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
            bytes.extend_from_slice(&body);
            let _ = IndexSnapshot::decode(&bytes, 4);
        }

        #[test]
        fn prop_vector_bits_preserved(
            values in proptest::collection::vec(-1.0e6f32..1.0e6f32, 4)
        ) {
            let snapshot = IndexSnapshot {
                dimension: 4,
                epoch: 1,
                entries: vec![SnapshotEntry { id: -5, vector: values.clone() }],
            };
            let decoded = IndexSnapshot::decode(&snapshot.encode().unwrap(), 4).unwrap();
            let before: Vec<u32> = values.iter().map(|v| v.to_bits()).collect();
            let after: Vec<u32> = decoded.entries[0].vector.iter().map(|v| v.to_bits()).collect();
            prop_assert_eq!(before, after);
        }
    }
}
