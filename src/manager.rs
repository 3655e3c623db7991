//! IndexManager: owner of the vector index lifecycle.
//!
//! The [`IndexManager`] is the primary interface of docindex. It provides:
//!
//! - Load-or-create of the index file
//! - Document insertion (embed, index, persist)
//! - Cached semantic search
//! - Context retrieval through a [`DocumentResolver`]
//!
//! # Quick Start
//!
//! ```rust
//! # fn main() -> docindex::Result<()> {
//! # let dir = tempfile::tempdir().unwrap();
//! use docindex::{Config, DocumentId, IndexManager};
//!
//! let manager = IndexManager::from_config(Config::with_index_path(dir.path().join("docs.hnsw")))?;
//!
//! manager.insert_document(DocumentId(101), "quarterly revenue report")?;
//! manager.insert_document(DocumentId(102), "employee leave policy")?;
//!
//! let result = manager.search("revenue figures this quarter", 1)?;
//! assert_eq!(result.ids, vec![DocumentId(101)]);
//! # Ok(())
//! # }
//! ```
//!
//! # State Machine
//!
//! ```text
//! Uninitialized ──initialize() ok──► Ready   (for the manager's lifetime)
//!       │
//!       └──────initialize() err────► Failed  (every call → IndexUninitialized)
//! ```
//!
//! Calls made before `initialize()` fail with `NotReady`.
//!
//! # Locking
//!
//! Two locks, always taken in this order when nested:
//!
//! 1. `persisted` (mutex): serializes index-file writes
//! 2. `index` (readers-writer lock): searches share, mutations exclude
//!
//! Embedding runs outside both. An exclusive `fs2` lock on
//! `{index_path}.lock` keeps a second manager, in this process or
//! another, off the same file.
//!
//! # Thread Safety
//!
//! `IndexManager` is `Send + Sync` and can be shared across threads using `Arc`.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use fs2::FileExt;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::{best_effort_get, best_effort_set, CacheClient, MemoryCache};
use crate::config::Config;
use crate::embedding::{create_embedding_service, require_text, CachedEncoder, EmbeddingService};
use crate::error::{DocIndexError, PersistenceError, Result};
use crate::hashing::search_cache_key;
use crate::search::{DocumentResolver, RetrievedContext, SearchResult, TenantContext};
use crate::types::DocumentId;
use crate::vector::{HnswIndex, InsertOutcome, VectorIndex};

/// Lifecycle state of an [`IndexManager`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexState {
    /// `initialize()` has not completed yet.
    Uninitialized,

    /// The index is loaded and serving.
    Ready,

    /// Loading failed; the manager is unusable.
    Failed(String),
}

impl IndexState {
    /// Returns true if the manager accepts operations.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

enum Slot {
    Uninitialized,
    Ready(Box<dyn VectorIndex>),
    Failed(String),
}

impl Slot {
    fn index(&self) -> Result<&dyn VectorIndex> {
        match self {
            Slot::Ready(index) => Ok(index.as_ref()),
            Slot::Uninitialized => Err(DocIndexError::NotReady),
            Slot::Failed(reason) => Err(DocIndexError::uninitialized(reason.clone())),
        }
    }

    fn index_mut(&mut self) -> Result<&mut dyn VectorIndex> {
        match self {
            Slot::Ready(index) => Ok(index.as_mut()),
            Slot::Uninitialized => Err(DocIndexError::NotReady),
            Slot::Failed(reason) => Err(DocIndexError::uninitialized(reason.clone())),
        }
    }
}

/// Owner of the document vector index.
///
/// Create one per index file with [`IndexManager::open()`] (or
/// [`IndexManager::new()`] followed by [`IndexManager::initialize()`]) and
/// share it by reference or `Arc`. Never store it in a global.
///
/// # Durability
///
/// With [`PersistMode::Immediate`](crate::PersistMode::Immediate) every
/// confirmed insert is on disk before the call returns. With
/// [`PersistMode::Deferred`](crate::PersistMode::Deferred) the file is
/// rewritten on [`flush()`](IndexManager::flush) and when the manager is
/// dropped; a crash loses inserts since the last flush.
pub struct IndexManager {
    config: Config,

    encoder: CachedEncoder,

    /// Search-result cache (shared with the encoder).
    cache: Arc<dyn CacheClient>,

    index: RwLock<Slot>,

    /// Epoch of the index state last written to disk. Holding this mutex
    /// is what serializes file writes.
    persisted: Mutex<Option<u64>>,

    /// Held for the manager's lifetime once initialized.
    lock_file: Mutex<Option<File>>,
}

impl std::fmt::Debug for IndexManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexManager")
            .field("index_path", &self.config.index_path)
            .field("state", &self.state())
            .field("encoder", &self.encoder)
            .finish_non_exhaustive()
    }
}

impl IndexManager {
    /// Creates an uninitialized manager.
    ///
    /// Nothing touches the disk until [`initialize()`](Self::initialize).
    ///
    /// # Errors
    ///
    /// - `Validation` if the configuration is invalid (see [`Config::validate`])
    /// - `Config` if the service's dimension differs from `config.dimension`
    pub fn new(
        config: Config,
        service: Arc<dyn EmbeddingService>,
        cache: Arc<dyn CacheClient>,
    ) -> Result<Self> {
        config.validate()?;
        let encoder = CachedEncoder::new(service, Arc::clone(&cache), &config)?;

        Ok(Self {
            config,
            encoder,
            cache,
            index: RwLock::new(Slot::Uninitialized),
            persisted: Mutex::new(None),
            lock_file: Mutex::new(None),
        })
    }

    /// Creates and initializes a manager.
    ///
    /// # Errors
    ///
    /// Everything [`new()`](Self::new) and [`initialize()`](Self::initialize)
    /// can return.
    pub fn open(
        config: Config,
        service: Arc<dyn EmbeddingService>,
        cache: Arc<dyn CacheClient>,
    ) -> Result<Self> {
        let manager = Self::new(config, service, cache)?;
        manager.initialize()?;
        Ok(manager)
    }

    /// Opens a manager using the configured embedding provider and an
    /// in-process [`MemoryCache`].
    pub fn from_config(config: Config) -> Result<Self> {
        let service: Arc<dyn EmbeddingService> = Arc::from(create_embedding_service(&config)?);
        Self::open(config, service, Arc::new(MemoryCache::new()))
    }

    /// Loads the index file, or starts an empty index if there is none.
    ///
    /// Blocks concurrent callers until loading finishes. Calling it again
    /// once ready is a no-op.
    ///
    /// # Errors
    ///
    /// - `Persistence` if the file can't be read, is corrupted, was written
    ///   for another dimension, or is locked by another manager. The
    ///   manager moves to [`IndexState::Failed`].
    /// - `IndexUninitialized` if a previous attempt already failed
    #[instrument(skip(self), fields(path = %self.config.index_path.display()))]
    pub fn initialize(&self) -> Result<()> {
        let mut persisted = self.lock_persisted()?;
        let mut slot = self.write_slot()?;

        match &*slot {
            Slot::Ready(_) => return Ok(()),
            Slot::Failed(reason) => return Err(DocIndexError::uninitialized(reason.clone())),
            Slot::Uninitialized => {}
        }

        match self.load_or_create() {
            Ok((index, loaded)) => {
                info!(
                    loaded,
                    entries = index.len(),
                    epoch = index.epoch(),
                    "Index ready"
                );
                *persisted = Some(index.epoch());
                *slot = Slot::Ready(index);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to load index; manager is unusable");
                *slot = Slot::Failed(e.to_string());
                Err(e)
            }
        }
    }

    fn load_or_create(&self) -> Result<(Box<dyn VectorIndex>, bool)> {
        let path = &self.config.index_path;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PersistenceError::write(parent, e))?;
        }

        let lock = acquire_lock(path)?;
        *self
            .lock_file
            .lock()
            .map_err(|_| DocIndexError::vector("Lock file mutex poisoned"))? = Some(lock);

        if !path.exists() {
            debug!("No index file, creating empty index");
            let index = HnswIndex::new(self.config.dimension, &self.config.hnsw);
            return Ok((Box::new(index), false));
        }

        let bytes = fs::read(path).map_err(|e| PersistenceError::read(path, e))?;
        let index = HnswIndex::deserialize(&bytes, self.config.dimension, &self.config.hnsw)?;
        Ok((Box::new(index), true))
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> IndexState {
        match self.index.read() {
            Ok(slot) => match &*slot {
                Slot::Uninitialized => IndexState::Uninitialized,
                Slot::Ready(_) => IndexState::Ready,
                Slot::Failed(reason) => IndexState::Failed(reason.clone()),
            },
            Err(_) => IndexState::Failed("Index lock poisoned".to_string()),
        }
    }

    /// Returns the configuration this manager was created with.
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the cache-aware embedding encoder.
    #[inline]
    pub fn encoder(&self) -> &CachedEncoder {
        &self.encoder
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Embeds `text` and indexes it under `id`.
    ///
    /// An id that is already indexed has its vector replaced.
    ///
    /// # Errors
    ///
    /// - `NotReady` / `IndexUninitialized` outside the `Ready` state
    /// - `Validation` if `text` is empty
    /// - `Encoding` if the model fails
    /// - `Persistence` if the index file write fails. The document is
    ///   searchable in this process, but its durability is unconfirmed.
    #[instrument(skip(self, text), fields(id = %id))]
    pub fn insert_document(&self, id: DocumentId, text: &str) -> Result<()> {
        self.read_slot()?.index()?;
        let vector = self.encoder.embed(text)?;

        let epoch = {
            let mut slot = self.write_slot()?;
            let index = slot.index_mut()?;
            let outcome = index.insert(id, &vector)?;
            debug!(?outcome, entries = index.len(), "Document indexed");
            index.epoch()
        };

        self.persist_after_mutation(epoch)
    }

    /// Indexes `id` only if it isn't indexed yet. Returns true if inserted.
    ///
    /// The membership check is repeated under the write lock, so two
    /// concurrent calls for the same id insert it once.
    #[instrument(skip(self, text), fields(id = %id))]
    pub fn insert_if_absent(&self, id: DocumentId, text: &str) -> Result<bool> {
        if self.contains(id)? {
            debug!("Document already indexed, skipping");
            return Ok(false);
        }

        let vector = self.encoder.embed(text)?;

        let epoch = {
            let mut slot = self.write_slot()?;
            let index = slot.index_mut()?;
            if index.contains(id) {
                return Ok(false);
            }
            index.insert(id, &vector)?;
            index.epoch()
        };

        self.persist_after_mutation(epoch)?;
        Ok(true)
    }

    /// Indexes a batch of documents with one index-file write.
    ///
    /// Texts are embedded before any of them is indexed, so an encoding
    /// failure leaves the index untouched. Later duplicates in the batch
    /// replace earlier ones. Returns the number of ids that were new.
    #[instrument(skip(self, documents), fields(count = documents.len()))]
    pub fn insert_documents(&self, documents: &[(DocumentId, &str)]) -> Result<usize> {
        self.read_slot()?.index()?;
        if documents.is_empty() {
            return Ok(0);
        }

        let texts: Vec<&str> = documents.iter().map(|(_, text)| *text).collect();
        let vectors = self.encoder.embed_batch(&texts)?;

        let (added, epoch) = {
            let mut slot = self.write_slot()?;
            let index = slot.index_mut()?;
            let mut added = 0;
            for ((id, _), vector) in documents.iter().zip(&vectors) {
                if index.insert(*id, vector)? == InsertOutcome::Inserted {
                    added += 1;
                }
            }
            (added, index.epoch())
        };

        info!(added, replaced = documents.len() - added, "Batch indexed");
        self.persist_after_mutation(epoch)?;
        Ok(added)
    }

    /// Removes every document from the index and persists the empty index.
    #[instrument(skip(self))]
    pub fn reset(&self) -> Result<()> {
        let epoch = {
            let mut slot = self.write_slot()?;
            let index = slot.index_mut()?;
            let removed = index.len();
            index.reset();
            info!(removed, "Index reset");
            index.epoch()
        };

        self.persist_after_mutation(epoch)
    }

    /// Writes the index file if it is behind the in-memory index.
    ///
    /// Works in every [`PersistMode`](crate::PersistMode); required to make
    /// `Deferred` inserts durable.
    #[instrument(skip(self))]
    pub fn flush(&self) -> Result<()> {
        let epoch = self.read_slot()?.index()?.epoch();
        let written = self.persist_through(epoch)?;
        if written {
            info!(epoch, "Index flushed");
        }
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Returns the `k` documents nearest to `query`, consulting the search
    /// cache first.
    ///
    /// Results are cached per index epoch, so a cached result never
    /// outlives the index state it was computed from.
    ///
    /// # Errors
    ///
    /// - `NotReady` / `IndexUninitialized` outside the `Ready` state
    /// - `Validation` if `query` is empty
    /// - `Encoding` if the model fails
    #[instrument(skip(self, query), fields(len = query.len()))]
    pub fn search(&self, query: &str, k: usize) -> Result<SearchResult> {
        let epoch = self.read_slot()?.index()?.epoch();
        if k == 0 {
            return Ok(SearchResult::empty());
        }
        require_text(query, "query")?;

        let key = self.search_key(epoch, k, query);
        if let Some(result) =
            best_effort_get(self.cache.as_ref(), &key).and_then(|b| SearchResult::from_bytes(&b))
        {
            debug!(hits = result.len(), "Search served from cache");
            return Ok(result);
        }

        let vector = self.encoder.embed(query)?;

        let (neighbors, searched_epoch) = {
            let slot = self.read_slot()?;
            let index = slot.index()?;
            (index.search(&vector, k)?, index.epoch())
        };
        let result = SearchResult::from(neighbors);

        // Key by the state actually searched; an insert may have landed in between
        let key = if searched_epoch == epoch {
            key
        } else {
            self.search_key(searched_epoch, k, query)
        };
        match result.to_bytes() {
            Ok(bytes) => best_effort_set(self.cache.as_ref(), &key, &bytes, self.config.cache.ttl),
            Err(e) => warn!(error = %e, "Failed to encode search result for caching"),
        }

        debug!(hits = result.len(), epoch = searched_epoch, "Search computed");
        Ok(result)
    }

    /// Searches with [`Config::default_k`].
    pub fn search_default(&self, query: &str) -> Result<SearchResult> {
        self.search(query, self.config.default_k)
    }

    /// Searches, then resolves the matches to text.
    ///
    /// Contents are joined by blank lines, nearest first. Returns
    /// [`RetrievedContext::empty()`] if nothing matched or the resolver
    /// found no readable content.
    #[instrument(skip(self, query, resolver, tenant), fields(user_id = tenant.user_id))]
    pub fn retrieve_context(
        &self,
        query: &str,
        k: usize,
        resolver: &dyn DocumentResolver,
        tenant: &TenantContext,
    ) -> Result<RetrievedContext> {
        let result = self.search(query, k)?;
        if result.is_empty() {
            debug!("No matches, nothing to resolve");
            return Ok(RetrievedContext::empty());
        }

        let contents = resolver.resolve_document_content(&result.ids, tenant)?;
        Ok(RetrievedContext::assemble(result.ids, contents))
    }

    /// Returns true if `id` is indexed.
    pub fn contains(&self, id: DocumentId) -> Result<bool> {
        Ok(self.read_slot()?.index()?.contains(id))
    }

    /// Returns the number of indexed documents.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read_slot()?.index()?.len())
    }

    /// Returns true if no documents are indexed.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    fn persist_after_mutation(&self, epoch: u64) -> Result<()> {
        if !self.config.persist_mode.is_immediate() {
            return Ok(());
        }
        self.persist_through(epoch).map(|_| ()).map_err(|e| {
            warn!(error = %e, "Index updated in memory but not persisted");
            e
        })
    }

    /// Makes sure the file holds a state at least as new as `epoch`.
    ///
    /// Returns false if it already did.
    fn persist_through(&self, epoch: u64) -> Result<bool> {
        let mut persisted = self.lock_persisted()?;
        if persisted.is_some_and(|p| p >= epoch) {
            return Ok(false);
        }

        // Snapshot under the read lock; write without it so searches continue
        let (bytes, snapshot_epoch) = {
            let slot = self.read_slot()?;
            let index = slot.index()?;
            (index.serialize()?, index.epoch())
        };

        write_atomic(&self.config.index_path, &bytes)?;
        debug!(
            epoch = snapshot_epoch,
            bytes = bytes.len(),
            "Index file written"
        );
        *persisted = Some(snapshot_epoch);
        Ok(true)
    }

    fn search_key(&self, epoch: u64, k: usize, query: &str) -> String {
        search_cache_key(
            &self.config.cache.key_prefix,
            &self.config.model_version,
            epoch,
            k,
            query,
        )
    }

    fn read_slot(&self) -> Result<RwLockReadGuard<'_, Slot>> {
        self.index
            .read()
            .map_err(|_| DocIndexError::vector("Index lock poisoned"))
    }

    fn write_slot(&self) -> Result<RwLockWriteGuard<'_, Slot>> {
        self.index
            .write()
            .map_err(|_| DocIndexError::vector("Index lock poisoned"))
    }

    fn lock_persisted(&self) -> Result<MutexGuard<'_, Option<u64>>> {
        self.persisted
            .lock()
            .map_err(|_| DocIndexError::vector("Persistence lock poisoned"))
    }
}

impl Drop for IndexManager {
    fn drop(&mut self) {
        if !self.state().is_ready() {
            return;
        }
        // Covers Deferred mode and any Immediate write that failed earlier
        if let Err(e) = self.flush() {
            error!(error = %e, "Failed to persist index on drop");
        }
    }
}

/// Returns `path` with `suffix` appended to its file name.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Takes the exclusive advisory lock guarding `path`.
fn acquire_lock(path: &Path) -> Result<File> {
    let lock_path = sibling(path, ".lock");
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| PersistenceError::write(&lock_path, e))?;

    FileExt::try_lock_exclusive(&file).map_err(|_| PersistenceError::Locked(path.to_path_buf()))?;
    Ok(file)
}

/// Replaces `path` with `bytes`: write a temp file, fsync, rename.
///
/// Readers see either the old file or the new one, never a partial write.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::result::Result<(), PersistenceError> {
    let tmp = sibling(path, ".tmp");

    let result = File::create(&tmp)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&tmp, path));

    result.map_err(|e| {
        let _ = fs::remove_file(&tmp);
        PersistenceError::write(path, e)
    })
}
