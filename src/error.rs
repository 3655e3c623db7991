//! Error types for docindex.
//!
//! docindex uses a hierarchical error system:
//! - `DocIndexError` is the top-level error returned by all public APIs
//! - Specific error types (`PersistenceError`, `ValidationError`) provide detail
//!
//! # Propagation Policy
//!
//! Cache failures never reach callers: the cache layer logs them and falls
//! back to the miss path. Model and index failures always propagate.
//!
//! ```rust,ignore
//! use docindex::{IndexManager, Config, Result};
//!
//! fn example(manager: &IndexManager) -> Result<()> {
//!     match manager.insert_document(101.into(), "quarterly revenue report") {
//!         Err(e) if e.is_persistence() => {
//!             // In-memory insert stands; durability is unconfirmed.
//!         }
//!         other => other?,
//!     }
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for docindex operations.
pub type Result<T> = std::result::Result<T, DocIndexError>;

/// Top-level error enum for all docindex operations.
///
/// This is the only error type returned by public APIs.
/// Use pattern matching or the `is_*` predicates to handle specific cases.
#[derive(Debug, Error)]
pub enum DocIndexError {
    /// The embedding model produced malformed output. Never retried.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The index has not finished initializing. Retry after backoff.
    #[error("Index is not ready: initialization has not completed")]
    NotReady,

    /// The index file could not be read or written.
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// The index failed to load and the manager is permanently unusable.
    #[error("Index uninitialized: {reason}")]
    IndexUninitialized {
        /// Why the initial load failed.
        reason: String,
    },

    /// Input validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration error.
    #[error("Configuration error: {reason}")]
    Config {
        /// Description of what's wrong with the configuration.
        reason: String,
    },

    /// Vector index error (HNSW operations, lock poisoning).
    #[error("Vector index error: {0}")]
    Vector(String),

    /// Cache backend error. Swallowed by the core; only backends return it.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Document resolver error (external content lookup).
    #[error("Resolver error: {0}")]
    Resolver(String),
}

impl DocIndexError {
    /// Creates an encoding error with the given message.
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    /// Creates a configuration error with the given reason.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Creates a vector index error with the given message.
    pub fn vector(msg: impl Into<String>) -> Self {
        Self::Vector(msg.into())
    }

    /// Creates a cache backend error with the given message.
    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Creates a resolver error with the given message.
    pub fn resolver(msg: impl Into<String>) -> Self {
        Self::Resolver(msg.into())
    }

    /// Creates an uninitialized-index error with the given reason.
    pub fn uninitialized(reason: impl Into<String>) -> Self {
        Self::IndexUninitialized {
            reason: reason.into(),
        }
    }

    /// Returns true if this is an encoding error.
    pub fn is_encoding(&self) -> bool {
        matches!(self, Self::Encoding(_))
    }

    /// Returns true if the index was not ready yet.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady)
    }

    /// Returns true if this is a persistence error.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }

    /// Returns true if the manager is in the failed state.
    pub fn is_uninitialized(&self) -> bool {
        matches!(self, Self::IndexUninitialized { .. })
    }

    /// Returns true if this is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a vector index error.
    pub fn is_vector(&self) -> bool {
        matches!(self, Self::Vector(_))
    }

    /// Returns true if the caller may retry the same operation later.
    ///
    /// Only `NotReady` qualifies; every other error is either permanent or
    /// requires a change of input.
    pub fn is_retryable(&self) -> bool {
        self.is_not_ready()
    }
}

/// Index file errors.
///
/// Load failures at startup are fatal for the manager. Write failures after
/// an insert leave the in-memory entry in place.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The index file exists but could not be read.
    #[error("Failed to read index file {path}: {reason}")]
    Read {
        /// Path of the index file.
        path: PathBuf,
        /// Underlying I/O failure.
        reason: String,
    },

    /// The index file could not be written or replaced.
    #[error("Failed to write index file {path}: {reason}")]
    Write {
        /// Path of the index file.
        path: PathBuf,
        /// Underlying I/O failure.
        reason: String,
    },

    /// Index file content is structurally invalid.
    #[error("Index file corrupted: {0}")]
    Corrupted(String),

    /// Index file was written by an incompatible format version.
    #[error("Unsupported index format version: expected {expected}, found {found}")]
    UnsupportedVersion {
        /// Format version this build writes.
        expected: u32,
        /// Format version found in the file.
        found: u32,
    },

    /// Index file dimension doesn't match the configured dimension.
    #[error("Index dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Configured dimension.
        expected: usize,
        /// Dimension recorded in the file.
        found: usize,
    },

    /// Another process holds the index file lock.
    #[error("Index file is locked by another process: {0}")]
    Locked(PathBuf),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PersistenceError {
    /// Creates a read error for the given path.
    pub fn read(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Read {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a write error for the given path.
    pub fn write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Write {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a corruption error with the given message.
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::Corrupted(msg.into())
    }

    /// Creates a serialization error with the given message.
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}

// Convert bincode errors to PersistenceError
impl From<bincode::Error> for PersistenceError {
    fn from(err: bincode::Error) -> Self {
        PersistenceError::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for DocIndexError {
    fn from(err: bincode::Error) -> Self {
        DocIndexError::Persistence(PersistenceError::from(err))
    }
}

// redb only backs the disk cache, so its errors surface as cache errors
impl From<redb::Error> for DocIndexError {
    fn from(err: redb::Error) -> Self {
        DocIndexError::Cache(err.to_string())
    }
}

impl From<redb::DatabaseError> for DocIndexError {
    fn from(err: redb::DatabaseError) -> Self {
        DocIndexError::Cache(err.to_string())
    }
}

impl From<redb::TransactionError> for DocIndexError {
    fn from(err: redb::TransactionError) -> Self {
        DocIndexError::Cache(format!("Transaction failed: {}", err))
    }
}

impl From<redb::CommitError> for DocIndexError {
    fn from(err: redb::CommitError) -> Self {
        DocIndexError::Cache(format!("Commit failed: {}", err))
    }
}

impl From<redb::TableError> for DocIndexError {
    fn from(err: redb::TableError) -> Self {
        DocIndexError::Cache(format!("Table error: {}", err))
    }
}

impl From<redb::StorageError> for DocIndexError {
    fn from(err: redb::StorageError) -> Self {
        DocIndexError::Cache(format!("Storage error: {}", err))
    }
}

/// Validation errors for input data.
///
/// These errors indicate problems with data provided by the caller.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Embedding dimension doesn't match the index dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected dimension from configuration.
        expected: usize,
        /// Actual dimension provided.
        got: usize,
    },

    /// A vector component is NaN or infinite.
    #[error("Non-finite embedding component at position {position}")]
    NonFinite {
        /// Index of the first offending component.
        position: usize,
    },

    /// A field has an invalid value.
    #[error("Invalid field '{field}': {reason}")]
    InvalidField {
        /// Name of the invalid field.
        field: String,
        /// Why the value is invalid.
        reason: String,
    },

    /// A required field is missing or empty.
    #[error("Required field missing: {field}")]
    RequiredField {
        /// Name of the missing field.
        field: String,
    },
}

impl ValidationError {
    /// Creates a dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, got: usize) -> Self {
        Self::DimensionMismatch { expected, got }
    }

    /// Creates a non-finite component error.
    pub fn non_finite(position: usize) -> Self {
        Self::NonFinite { position }
    }

    /// Creates an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a required field error.
    pub fn required_field(field: impl Into<String>) -> Self {
        Self::RequiredField {
            field: field.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DocIndexError::config("Invalid dimension");
        assert_eq!(err.to_string(), "Configuration error: Invalid dimension");
    }

    #[test]
    fn test_persistence_error_display() {
        let err = PersistenceError::UnsupportedVersion {
            expected: 2,
            found: 1,
        };
        assert_eq!(
            err.to_string(),
            "Unsupported index format version: expected 2, found 1"
        );
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::dimension_mismatch(384, 768);
        assert_eq!(
            err.to_string(),
            "Embedding dimension mismatch: expected 384, got 768"
        );
    }

    #[test]
    fn test_not_ready_is_retryable() {
        assert!(DocIndexError::NotReady.is_retryable());
        assert!(!DocIndexError::uninitialized("bad file").is_retryable());
        assert!(!DocIndexError::encoding("wrong length").is_retryable());
    }

    #[test]
    fn test_predicates() {
        let err: DocIndexError = ValidationError::required_field("text").into();
        assert!(err.is_validation());
        assert!(!err.is_persistence());

        let err: DocIndexError = PersistenceError::corrupted("bad magic").into();
        assert!(err.is_persistence());
        assert!(!err.is_validation());

        assert!(DocIndexError::uninitialized("x").is_uninitialized());
        assert!(DocIndexError::encoding("x").is_encoding());
    }

    #[test]
    fn test_vector_error_display() {
        let err = DocIndexError::vector("HNSW insert failed");
        assert_eq!(err.to_string(), "Vector index error: HNSW insert failed");
        assert!(err.is_vector());
        assert!(!err.is_persistence());
    }

    #[test]
    fn test_error_conversion_chain() {
        fn inner() -> Result<()> {
            Err(PersistenceError::corrupted("test corruption"))?
        }

        let result = inner();
        assert!(result.unwrap_err().is_persistence());
    }
}
