//! Disk-backed cache using redb.
//!
//! Survives process restarts, so embeddings computed by a previous run are
//! reused without model inference as long as they haven't expired.
//!
//! # Value Layout
//!
//! ```text
//! ┌──────────────────────────┬──────────────────────────────┐
//! │ expires_at: i64 LE (8 B) │ payload (remaining bytes)    │
//! └──────────────────────────┴──────────────────────────────┘
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use ::redb::{Database, ReadableTable, TableDefinition};
use tracing::{debug, info, instrument};

use crate::error::{DocIndexError, Result};
use crate::types::Timestamp;

use super::CacheClient;

/// Cache entries table.
///
/// Key: full cache key string
/// Value: expiry timestamp followed by the payload
const CACHE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("cache_entries");

/// Size of the expiry header preceding each payload.
const EXPIRY_HEADER_LEN: usize = 8;

/// redb-backed [`CacheClient`].
///
/// # Thread Safety
///
/// `RedbCache` is `Send + Sync`. redb handles internal synchronization
/// using MVCC for readers and exclusive locking for writers.
#[derive(Debug)]
pub struct RedbCache {
    /// The redb database handle.
    db: Database,

    /// Path to the cache file.
    path: PathBuf,
}

impl RedbCache {
    /// Opens or creates a cache file at the given path.
    ///
    /// # Errors
    ///
    /// Returns `DocIndexError::Cache` if the file is locked by another
    /// process or is not a redb database.
    #[instrument(fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let db = Database::builder().create(path).map_err(|e| {
            if e.to_string().contains("locked") {
                DocIndexError::cache(format!("Cache file is locked: {}", path.display()))
            } else {
                DocIndexError::from(e)
            }
        })?;

        // Tables are created lazily; make sure readers never see TableDoesNotExist
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(CACHE_TABLE)?;
        }
        write_txn.commit()?;

        info!("Disk cache opened");
        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    /// Returns the path to the cache file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = Timestamp::now();

        let write_txn = self.db.begin_write()?;
        let removed;
        {
            let mut table = write_txn.open_table(CACHE_TABLE)?;

            let mut expired = Vec::new();
            for result in table.iter()? {
                let (key, value) = result?;
                if is_expired(value.value(), now) {
                    expired.push(key.value().to_string());
                }
            }

            for key in &expired {
                table.remove(key.as_str())?;
            }
            removed = expired.len();
        }
        write_txn.commit()?;

        debug!(removed, "Purged expired cache entries");
        Ok(removed)
    }
}

impl CacheClient for RedbCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CACHE_TABLE)?;

        match table.get(key)? {
            Some(value) => {
                let bytes = value.value();
                if is_expired(bytes, Timestamp::now()) {
                    return Ok(None);
                }
                Ok(Some(bytes[EXPIRY_HEADER_LEN..].to_vec()))
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let expires_at = Timestamp::now().saturating_add(ttl);

        let mut record = Vec::with_capacity(EXPIRY_HEADER_LEN + value.len());
        record.extend_from_slice(&expires_at.to_le_bytes());
        record.extend_from_slice(value);

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(CACHE_TABLE)?;
            table.insert(key, record.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let existed;
        {
            let mut table = write_txn.open_table(CACHE_TABLE)?;
            existed = table.remove(key)?.is_some();
        }
        write_txn.commit()?;
        Ok(existed)
    }
}

/// Returns true if the record is expired or too short to carry an expiry.
fn is_expired(record: &[u8], now: Timestamp) -> bool {
    let Some(header) = record.get(..EXPIRY_HEADER_LEN) else {
        return true;
    };
    let mut bytes = [0u8; EXPIRY_HEADER_LEN];
    bytes.copy_from_slice(header);
    Timestamp::from_le_bytes(bytes) <= now
}

// RedbCache is auto Send + Sync: Database and PathBuf are both Send + Sync.

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.redb");

        let cache = RedbCache::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(cache.path(), path.as_path());
    }

    #[test]
    fn test_set_then_get() {
        let dir = tempdir().unwrap();
        let cache = RedbCache::open(dir.path().join("cache.redb")).unwrap();

        cache.set("k", b"payload", Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(b"payload".to_vec()));
        assert_eq!(cache.get("missing").unwrap(), None);
    }

    #[test]
    fn test_entries_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.redb");

        {
            let cache = RedbCache::open(&path).unwrap();
            cache.set("k", b"persisted", Duration::from_secs(60)).unwrap();
        }

        let cache = RedbCache::open(&path).unwrap();
        assert_eq!(cache.get("k").unwrap(), Some(b"persisted".to_vec()));
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let dir = tempdir().unwrap();
        let cache = RedbCache::open(dir.path().join("cache.redb")).unwrap();

        cache.set("k", b"v", Duration::from_millis(5)).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("k").unwrap(), None);
    }

    #[test]
    fn test_purge_expired() {
        let dir = tempdir().unwrap();
        let cache = RedbCache::open(dir.path().join("cache.redb")).unwrap();

        cache.set("short", b"x", Duration::from_millis(5)).unwrap();
        cache.set("long", b"y", Duration::from_secs(60)).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(cache.purge_expired().unwrap(), 1);
        assert!(!cache.remove("short").unwrap());
        assert!(cache.remove("long").unwrap());
    }

    #[test]
    fn test_empty_payload_roundtrip() {
        let dir = tempdir().unwrap();
        let cache = RedbCache::open(dir.path().join("cache.redb")).unwrap();

        cache.set("empty", b"", Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get("empty").unwrap(), Some(Vec::new()));
    }

    #[test]
    fn test_is_expired_short_record() {
        assert!(is_expired(&[1, 2, 3], Timestamp::from_millis(0)));
    }
}
