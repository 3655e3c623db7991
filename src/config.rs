//! Configuration types for docindex.
//!
//! The [`Config`] struct controls index behavior including:
//! - Index file location and durability mode
//! - HNSW graph parameters
//! - Embedding provider and model version tag
//! - Cache time-to-live
//!
//! # Example
//! ```rust
//! use docindex::{Config, PersistMode};
//!
//! // Use defaults (384 dimensions, fan-out 32, 1 hour cache TTL)
//! let config = Config::default();
//!
//! // Customize for a bulk import
//! let config = Config {
//!     index_path: "./data/documents.hnsw".into(),
//!     persist_mode: PersistMode::Deferred,
//!     ..Default::default()
//! };
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::types::EMBEDDING_DIMENSION;

/// Environment variable overriding [`Config::index_path`].
pub const ENV_INDEX_FILE: &str = "DOCINDEX_INDEX_FILE";

/// Environment variable selecting the builtin model directory.
pub const ENV_MODEL_PATH: &str = "DOCINDEX_MODEL_PATH";

/// Environment variable overriding [`Config::model_version`].
pub const ENV_MODEL_VERSION: &str = "DOCINDEX_MODEL_VERSION";

/// Environment variable overriding the cache TTL, in seconds.
pub const ENV_CACHE_TTL_SECS: &str = "DOCINDEX_CACHE_TTL_SECS";

/// Index configuration options.
///
/// All fields have sensible defaults. Use struct update syntax to override
/// specific settings:
///
/// ```rust
/// use docindex::Config;
///
/// let config = Config {
///     default_k: 5,
///     ..Default::default()
/// };
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    /// Location of the index file. Must not be hand-edited.
    pub index_path: PathBuf,

    /// Embedding vector dimension (must match provider output).
    pub dimension: usize,

    /// HNSW graph parameters.
    pub hnsw: HnswConfig,

    /// Cache behavior for embeddings and search results.
    pub cache: CacheConfig,

    /// How embeddings are generated.
    pub embedding_provider: EmbeddingProvider,

    /// Model version tag mixed into every cache key.
    ///
    /// Changing the model or its parameters must change this tag, which
    /// invalidates every cached vector and search result at once.
    pub model_version: String,

    /// When the index file is rewritten.
    pub persist_mode: PersistMode,

    /// Number of neighbors returned when the caller doesn't specify one.
    pub default_k: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from("./docindex.hnsw"),
            dimension: EMBEDDING_DIMENSION,
            hnsw: HnswConfig::default(),
            cache: CacheConfig::default(),
            embedding_provider: EmbeddingProvider::Hashing,
            model_version: "hashing-v1".to_string(),
            persist_mode: PersistMode::Immediate,
            default_k: 10,
        }
    }
}

impl Config {
    /// Creates a new Config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a Config for the builtin ONNX model.
    ///
    /// This requires the `builtin-embeddings` feature to be enabled.
    ///
    /// # Example
    /// ```rust
    /// use docindex::Config;
    ///
    /// let config = Config::with_builtin_embeddings(None);
    /// assert!(config.embedding_provider.is_builtin());
    /// ```
    pub fn with_builtin_embeddings(model_path: Option<PathBuf>) -> Self {
        Self {
            embedding_provider: EmbeddingProvider::Builtin { model_path },
            model_version: "all-MiniLM-L6-v2".to_string(),
            ..Default::default()
        }
    }

    /// Creates a Config with the given index file path.
    pub fn with_index_path(path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: path.into(),
            ..Default::default()
        }
    }

    /// Creates a Config from defaults overlaid with `DOCINDEX_*` environment variables.
    ///
    /// Unset variables keep their defaults. A set but unparseable
    /// `DOCINDEX_CACHE_TTL_SECS` is a validation error.
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a Config from an arbitrary key lookup.
    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ValidationError> {
        let mut config = Self::default();

        if let Some(path) = lookup(ENV_MODEL_PATH) {
            config = Self::with_builtin_embeddings(Some(PathBuf::from(path)));
        }
        if let Some(path) = lookup(ENV_INDEX_FILE) {
            config.index_path = PathBuf::from(path);
        }
        if let Some(version) = lookup(ENV_MODEL_VERSION) {
            config.model_version = version;
        }
        if let Some(raw) = lookup(ENV_CACHE_TTL_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                ValidationError::invalid_field(ENV_CACHE_TTL_SECS, "must be an integer")
            })?;
            config.cache.ttl = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// Called automatically by `IndexManager::new()`.
    ///
    /// # Errors
    /// Returns `ValidationError` if:
    /// - `dimension` is 0 or > 4096
    /// - `index_path` or `model_version` is empty
    /// - any HNSW parameter is 0
    /// - the cache TTL is 0
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.dimension == 0 {
            return Err(ValidationError::invalid_field(
                "dimension",
                "must be greater than 0",
            ));
        }
        if self.dimension > 4096 {
            return Err(ValidationError::invalid_field(
                "dimension",
                "must not exceed 4096",
            ));
        }

        if self.index_path.as_os_str().is_empty() {
            return Err(ValidationError::required_field("index_path"));
        }

        if self.model_version.trim().is_empty() {
            return Err(ValidationError::required_field("model_version"));
        }

        self.hnsw.validate()?;

        if self.cache.ttl.is_zero() {
            return Err(ValidationError::invalid_field(
                "cache.ttl",
                "must be greater than 0",
            ));
        }

        if self.default_k == 0 {
            return Err(ValidationError::invalid_field(
                "default_k",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

/// HNSW graph parameters.
///
/// Defaults suit 384-dimension sentence embeddings: fan-out 32.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Maximum connections per node on upper layers (layer 0 gets twice this).
    pub max_nb_connection: usize,

    /// Candidate list size while building the graph.
    pub ef_construction: usize,

    /// Candidate list size while searching. Raised to `k` when smaller.
    pub ef_search: usize,

    /// Maximum number of graph layers.
    pub max_layer: usize,

    /// Capacity hint for the graph.
    pub max_elements: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            max_nb_connection: 32,
            ef_construction: 200,
            ef_search: 64,
            max_layer: 16,
            max_elements: 100_000,
        }
    }
}

impl HnswConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        let fields = [
            ("hnsw.max_nb_connection", self.max_nb_connection),
            ("hnsw.ef_construction", self.ef_construction),
            ("hnsw.ef_search", self.ef_search),
            ("hnsw.max_layer", self.max_layer),
            ("hnsw.max_elements", self.max_elements),
        ];
        for (field, value) in fields {
            if value == 0 {
                return Err(ValidationError::invalid_field(
                    field,
                    "must be greater than 0",
                ));
            }
        }
        // hnsw_rs supports at most 16 layers
        if self.max_layer > 16 {
            return Err(ValidationError::invalid_field(
                "hnsw.max_layer",
                "must not exceed 16",
            ));
        }
        Ok(())
    }
}

/// Cache behavior for embeddings and search results.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// Time-to-live applied to every cache entry.
    pub ttl: Duration,

    /// Namespace prefix for every cache key.
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            key_prefix: "docindex".to_string(),
        }
    }
}

/// Embedding provider configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Deterministic feature-hashing encoder. No model files required.
    Hashing,

    /// all-MiniLM-L6-v2 through ONNX Runtime.
    ///
    /// Requires the `builtin-embeddings` feature.
    Builtin {
        /// Model directory. If `None`, uses the default cache directory.
        model_path: Option<PathBuf>,
    },
}

impl EmbeddingProvider {
    /// Returns true if this is the builtin ONNX provider.
    pub fn is_builtin(&self) -> bool {
        matches!(self, Self::Builtin { .. })
    }

    /// Returns true if this is the hashing provider.
    pub fn is_hashing(&self) -> bool {
        matches!(self, Self::Hashing)
    }
}

/// Durability mode for index mutations.
///
/// Controls the trade-off between insert throughput and crash safety.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersistMode {
    /// Rewrite the index file after every mutation.
    ///
    /// Every confirmed insert survives a crash. Costs a full rewrite per insert.
    #[default]
    Immediate,

    /// Rewrite only on `IndexManager::flush()` and when the manager is dropped.
    ///
    /// Inserts since the last flush are lost on a crash.
    Deferred,
}

impl PersistMode {
    /// Returns true if every mutation is persisted before returning.
    pub fn is_immediate(&self) -> bool {
        matches!(self, Self::Immediate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.embedding_provider.is_hashing());
        assert_eq!(config.dimension, 384);
        assert_eq!(config.hnsw.max_nb_connection, 32);
        assert_eq!(config.cache.ttl, Duration::from_secs(3600));
        assert_eq!(config.persist_mode, PersistMode::Immediate);
        assert_eq!(config.default_k, 10);
    }

    #[test]
    fn test_with_builtin_embeddings() {
        let config = Config::with_builtin_embeddings(None);
        assert!(config.embedding_provider.is_builtin());
        assert_eq!(config.model_version, "all-MiniLM-L6-v2");
    }

    #[test]
    fn test_validate_success() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_dimension_zero() {
        let config = Config {
            dimension: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ValidationError::InvalidField { field, .. } if field == "dimension"));
    }

    #[test]
    fn test_validate_dimension_too_large() {
        let config = Config {
            dimension: 5000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_model_version() {
        let config = Config {
            model_version: "  ".into(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ValidationError::RequiredField { field } if field == "model_version"));
    }

    #[test]
    fn test_validate_zero_ef_search() {
        let mut config = Config::default();
        config.hnsw.ef_search = 0;
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, ValidationError::InvalidField { field, .. } if field == "hnsw.ef_search")
        );
    }

    #[test]
    fn test_validate_zero_ttl() {
        let mut config = Config::default();
        config.cache.ttl = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_INDEX_FILE, "/var/lib/docindex/main.hnsw"),
            (ENV_MODEL_VERSION, "minilm-2024-06"),
            (ENV_CACHE_TTL_SECS, "120"),
        ]
        .into_iter()
        .collect();

        let config = Config::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.index_path, PathBuf::from("/var/lib/docindex/main.hnsw"));
        assert_eq!(config.model_version, "minilm-2024-06");
        assert_eq!(config.cache.ttl, Duration::from_secs(120));
        assert!(config.embedding_provider.is_hashing());
    }

    #[test]
    fn test_from_lookup_model_path_selects_builtin() {
        let config = Config::from_lookup(|k| {
            (k == ENV_MODEL_PATH).then(|| "/models/minilm".to_string())
        })
        .unwrap();
        assert_eq!(
            config.embedding_provider,
            EmbeddingProvider::Builtin {
                model_path: Some(PathBuf::from("/models/minilm"))
            }
        );
    }

    #[test]
    fn test_from_lookup_bad_ttl() {
        let result = Config::from_lookup(|k| (k == ENV_CACHE_TTL_SECS).then(|| "soon".into()));
        assert!(result.is_err());
    }

    #[test]
    fn test_persist_mode_checks() {
        assert!(PersistMode::Immediate.is_immediate());
        assert!(!PersistMode::Deferred.is_immediate());
    }

    #[test]
    fn test_hnsw_config_serialization() {
        let hnsw = HnswConfig::default();
        let bytes = bincode::serialize(&hnsw).unwrap();
        let restored: HnswConfig = bincode::deserialize(&bytes).unwrap();
        assert_eq!(hnsw, restored);
    }
}
