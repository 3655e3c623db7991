//! # docindex
//!
//! Semantic document index for retrieval-augmented chat services.
//!
//! docindex turns documents into 384-dimensional embeddings, keeps them in
//! an HNSW approximate-nearest-neighbor graph persisted to a single index
//! file, and answers "which documents are closest to this question" with
//! a read-through cache in front of both the model and the search.
//!
//! ## Quick Start
//!
//! ```rust
//! # fn main() -> docindex::Result<()> {
//! # let dir = tempfile::tempdir().unwrap();
//! use docindex::{Config, DocumentId, IndexManager};
//!
//! let config = Config::with_index_path(dir.path().join("documents.hnsw"));
//! let manager = IndexManager::from_config(config)?;
//!
//! // Index documents after they are stored elsewhere
//! manager.insert_document(DocumentId(101), "quarterly revenue report")?;
//! manager.insert_document(DocumentId(102), "employee leave policy")?;
//!
//! // Find the closest ones
//! let result = manager.search("revenue figures this quarter", 1)?;
//! assert_eq!(result.ids, vec![DocumentId(101)]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! ### Index File
//!
//! The whole index is one binary file, read fully on startup and rewritten
//! in full after every insert (or on `flush()` in deferred mode). Writes go
//! through a temp file and a rename, so a crash never leaves half a file.
//!
//! ### Caching
//!
//! Embeddings and search results are cached by SHA-256 of their input text,
//! tagged with the model version. Cache backends plug in through
//! [`cache::CacheClient`]; a failing cache degrades to a miss, never to an
//! error.
//!
//! ### Embedding Providers
//!
//! - **Hashing** (default): deterministic feature hashing, no model files
//! - **Builtin**: all-MiniLM-L6-v2 through ONNX Runtime
//!   (requires `builtin-embeddings` feature)
//!
//! ## Features
//!
//! - `builtin-embeddings` - Enable built-in ONNX embedding generation
//!
//! ## Thread Safety
//!
//! `IndexManager` is `Send + Sync` and can be shared across threads using `Arc`.
//! Searches run in parallel; inserts take an exclusive lock.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

// ============================================================================
// Module declarations
// ============================================================================

mod config;
mod error;
mod manager;
mod search;
mod types;

pub mod cache;
pub mod embedding;
pub mod hashing;

/// Vector index module for HNSW-based approximate nearest neighbor search.
pub mod vector;

// ============================================================================
// Public API re-exports
// ============================================================================

// Main index interface
pub use manager::{IndexManager, IndexState};

// Configuration
pub use config::{
    CacheConfig, Config, EmbeddingProvider, HnswConfig, PersistMode, ENV_CACHE_TTL_SECS,
    ENV_INDEX_FILE, ENV_MODEL_PATH, ENV_MODEL_VERSION,
};

// Error handling
pub use error::{DocIndexError, PersistenceError, Result, ValidationError};

// Core types
pub use types::{DocumentId, Embedding, Timestamp, EMBEDDING_DIMENSION};

// Search
pub use search::{
    DocumentResolver, RetrievedContext, SearchHit, SearchResult, TenantContext,
};

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Convenient imports for common docindex usage.
///
/// ```rust
/// use docindex::prelude::*;
/// ```
pub mod prelude {
    pub use crate::cache::CacheClient;
    pub use crate::config::{Config, PersistMode};
    pub use crate::embedding::EmbeddingService;
    pub use crate::error::{DocIndexError, Result};
    pub use crate::manager::IndexManager;
    pub use crate::search::{DocumentResolver, SearchResult, TenantContext};
    pub use crate::types::DocumentId;
}
