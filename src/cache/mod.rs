//! Cache client abstractions for docindex.
//!
//! The cache memoizes two things, both keyed by SHA-256 digests (see
//! [`crate::hashing`]) and both bounded by a time-to-live:
//! - embedding vectors, keyed by document or query text
//! - search results, keyed by query text
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │        CachedEncoder / IndexManager                          │
//! │                         │                                    │
//! │                         ▼                                    │
//! │          best_effort_get / best_effort_set                   │
//! │                         │                                    │
//! │                         ▼                                    │
//! │              ┌─────────────────────┐                        │
//! │              │    CacheClient      │  ← Trait               │
//! │              └─────────────────────┘                        │
//! │               ▲         ▲          ▲                        │
//! │    ┌──────────┴─┐ ┌─────┴─────┐ ┌──┴────────┐              │
//! │    │MemoryCache │ │ RedbCache │ │ NoopCache │              │
//! │    └────────────┘ └───────────┘ └───────────┘              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Backends may fail. The core never lets a cache failure abort the
//! caller's operation: errors are logged and treated as a miss.

mod memory;
mod redb;

pub use self::memory::MemoryCache;
pub use self::redb::RedbCache;

use std::time::Duration;

use tracing::{debug, warn};

use bincode::Options;

use crate::error::Result;
use crate::vector::codec;

/// Key/value cache with per-entry expiry.
///
/// Implementations must be `Send + Sync`; the index manager shares one
/// client across every request thread.
pub trait CacheClient: Send + Sync {
    /// Returns the value stored under `key`, or `None` if absent or expired.
    ///
    /// Absence is not an error.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores `value` under `key`, expiring after `ttl`.
    ///
    /// Overwrites any existing entry.
    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Removes the entry under `key`. Returns true if one existed.
    fn remove(&self, key: &str) -> Result<bool>;
}

/// Cache that stores nothing. Every lookup is a miss.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopCache;

impl CacheClient for NoopCache {
    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<()> {
        Ok(())
    }

    fn remove(&self, _key: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Looks up `key`, degrading any backend failure to a miss.
pub(crate) fn best_effort_get(cache: &dyn CacheClient, key: &str) -> Option<Vec<u8>> {
    match cache.get(key) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, key, "Cache lookup failed, treating as miss");
            None
        }
    }
}

/// Stores `value`, logging and discarding any backend failure.
pub(crate) fn best_effort_set(cache: &dyn CacheClient, key: &str, value: &[u8], ttl: Duration) {
    if let Err(e) = cache.set(key, value, ttl) {
        warn!(error = %e, key, "Cache write failed, continuing without caching");
    }
}

/// Encodes a vector for caching with the crate's bincode options
/// (u64 length prefix, then little-endian `f32`s).
pub fn encode_vector(vector: &[f32]) -> Result<Vec<u8>> {
    Ok(codec().serialize(vector)?)
}

/// Decodes a cached vector, returning `None` unless it is well formed.
///
/// A cached value is rejected when it doesn't decode, its length isn't
/// `dimension` or any component isn't finite. Rejected values are treated
/// as misses so a damaged entry is recomputed, not served.
pub fn decode_vector(bytes: &[u8], dimension: usize) -> Option<Vec<f32>> {
    let vector: Vec<f32> = match codec().with_limit(bytes.len() as u64).deserialize(bytes) {
        Ok(vector) => vector,
        Err(e) => {
            debug!(error = %e, "Cached vector does not decode");
            return None;
        }
    };

    if vector.len() != dimension {
        debug!(expected = dimension, got = vector.len(), "Cached vector has wrong length");
        return None;
    }
    if vector.iter().any(|v| !v.is_finite()) {
        debug!("Cached vector contains non-finite components");
        return None;
    }

    Some(vector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DocIndexError;

    struct BrokenCache;

    impl CacheClient for BrokenCache {
        fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            Err(DocIndexError::cache("connection refused"))
        }

        fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<()> {
            Err(DocIndexError::cache("connection refused"))
        }

        fn remove(&self, _key: &str) -> Result<bool> {
            Err(DocIndexError::cache("connection refused"))
        }
    }

    #[test]
    fn test_vector_codec_preserves_bits() {
        let vector = vec![0.0, -0.0, 1.5, f32::MIN_POSITIVE, -3.25e-7];
        let decoded = decode_vector(&encode_vector(&vector).unwrap(), vector.len()).unwrap();
        let original_bits: Vec<u32> = vector.iter().map(|v| v.to_bits()).collect();
        let decoded_bits: Vec<u32> = decoded.iter().map(|v| v.to_bits()).collect();
        assert_eq!(original_bits, decoded_bits);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let bytes = encode_vector(&[1.0, 2.0, 3.0]).unwrap();
        assert!(decode_vector(&bytes, 4).is_none());
        assert!(decode_vector(&bytes[..bytes.len() - 1], 3).is_none());

        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(decode_vector(&trailing, 3).is_none());
    }

    #[test]
    fn test_decode_rejects_non_finite() {
        let bytes = encode_vector(&[1.0, f32::NAN]).unwrap();
        assert!(decode_vector(&bytes, 2).is_none());
        let bytes = encode_vector(&[f32::INFINITY, 0.0]).unwrap();
        assert!(decode_vector(&bytes, 2).is_none());
    }

    #[test]
    fn test_encoded_layout_is_length_prefixed_little_endian() {
        let bytes = encode_vector(&[1.0, -2.0]).unwrap();
        assert_eq!(&bytes[..8], &2u64.to_le_bytes());
        assert_eq!(&bytes[8..12], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[12..], &(-2.0f32).to_le_bytes());
    }

    #[test]
    fn test_decode_rejects_huge_length_prefix() {
        // Claims u64::MAX elements; the size limit refuses before allocating
        let mut bytes = u64::MAX.to_le_bytes().to_vec();
        bytes.extend_from_slice(&1.0f32.to_le_bytes());
        assert!(decode_vector(&bytes, 1).is_none());
    }

    #[test]
    fn test_best_effort_degrades_to_miss() {
        let cache = BrokenCache;
        assert!(best_effort_get(&cache, "k").is_none());
        // Must not panic or propagate.
        best_effort_set(&cache, "k", b"v", Duration::from_secs(1));
    }

    #[test]
    fn test_noop_cache_never_hits() {
        let cache = NoopCache;
        cache.set("k", b"v", Duration::from_secs(60)).unwrap();
        assert!(cache.get("k").unwrap().is_none());
        assert!(!cache.remove("k").unwrap());
    }

    #[test]
    fn test_cache_clients_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopCache>();
        assert_send_sync::<MemoryCache>();
        assert_send_sync::<RedbCache>();
    }
}
