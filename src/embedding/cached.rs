//! Cache-aware embedding encoder.
//!
//! ```text
//! text → sha256 key → cache hit? ── yes ──► cached vector (no inference)
//!                          │
//!                          no
//!                          ▼
//!                   model.embed(text) → check 384 finite floats
//!                          → cache.set(key, vector, ttl) → vector
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::cache::{best_effort_get, best_effort_set, decode_vector, encode_vector, CacheClient};
use crate::config::Config;
use crate::embedding::{check_model_output, require_text, EmbeddingService};
use crate::error::{DocIndexError, Result};
use crate::hashing::embedding_cache_key;
use crate::types::Embedding;

/// Embedding encoder with a read-through cache in front of the model.
///
/// A cache hit skips model inference entirely. Cache keys carry the
/// configured model version, so changing models never serves vectors from
/// the previous one.
pub struct CachedEncoder {
    service: Arc<dyn EmbeddingService>,
    cache: Arc<dyn CacheClient>,
    dimension: usize,
    model_version: String,
    key_prefix: String,
    ttl: Duration,
}

impl std::fmt::Debug for CachedEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedEncoder")
            .field("dimension", &self.dimension)
            .field("model_version", &self.model_version)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl CachedEncoder {
    /// Creates an encoder over `service`, caching into `cache`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the service's dimension differs
    /// from `config.dimension`.
    pub fn new(
        service: Arc<dyn EmbeddingService>,
        cache: Arc<dyn CacheClient>,
        config: &Config,
    ) -> Result<Self> {
        if service.dimension() != config.dimension {
            return Err(DocIndexError::config(format!(
                "Embedding service produces {} dimensions but the index is configured for {}",
                service.dimension(),
                config.dimension
            )));
        }

        Ok(Self {
            service,
            cache,
            dimension: config.dimension,
            model_version: config.model_version.clone(),
            key_prefix: config.cache.key_prefix.clone(),
            ttl: config.cache.ttl,
        })
    }

    /// Returns the dimension of every vector this encoder produces.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Returns the model version tag used in cache keys.
    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    /// Embeds `text`, consulting the cache first.
    ///
    /// # Errors
    ///
    /// - `Validation` if `text` is empty or whitespace
    /// - `Encoding` if the model fails or returns a malformed vector
    ///
    /// Cache failures are never returned.
    #[instrument(skip(self, text), fields(len = text.len()))]
    pub fn embed(&self, text: &str) -> Result<Embedding> {
        require_text(text, "text")?;

        let key = self.cache_key(text);
        if let Some(vector) = self.lookup(&key) {
            debug!("Embedding served from cache");
            return Ok(vector);
        }

        let vector = self.embed_uncached(text)?;
        self.store(&key, &vector);
        debug!("Embedding computed and cached");
        Ok(vector)
    }

    /// Embeds `text` with the model, bypassing the cache in both directions.
    pub fn embed_uncached(&self, text: &str) -> Result<Embedding> {
        require_text(text, "text")?;
        let vector = self.service.embed(text)?;
        check_model_output(&vector, self.dimension)?;
        Ok(vector)
    }

    /// Embeds several texts, running the model once over all cache misses.
    ///
    /// Output order matches input order.
    pub fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        for text in texts {
            require_text(text, "text")?;
        }

        let keys: Vec<String> = texts.iter().map(|t| self.cache_key(t)).collect();
        let mut results: Vec<Option<Embedding>> = keys.iter().map(|k| self.lookup(k)).collect();

        let missing: Vec<usize> = results
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.is_none().then_some(i))
            .collect();

        debug!(
            total = texts.len(),
            misses = missing.len(),
            "Batch embedding cache lookup"
        );

        if !missing.is_empty() {
            let miss_texts: Vec<&str> = missing.iter().map(|&i| texts[i]).collect();
            let computed = self.service.embed_batch(&miss_texts)?;
            if computed.len() != miss_texts.len() {
                return Err(DocIndexError::encoding(format!(
                    "Model returned {} embeddings for {} texts",
                    computed.len(),
                    miss_texts.len()
                )));
            }

            for (&i, vector) in missing.iter().zip(computed) {
                check_model_output(&vector, self.dimension)?;
                self.store(&keys[i], &vector);
                results[i] = Some(vector);
            }
        }

        results
            .into_iter()
            .map(|r| r.ok_or_else(|| DocIndexError::encoding("Missing embedding in batch result")))
            .collect()
    }

    fn cache_key(&self, text: &str) -> String {
        embedding_cache_key(&self.key_prefix, &self.model_version, self.dimension, text)
    }

    fn store(&self, key: &str, vector: &[f32]) {
        match encode_vector(vector) {
            Ok(bytes) => best_effort_set(self.cache.as_ref(), key, &bytes, self.ttl),
            Err(e) => warn!(error = %e, "Failed to encode embedding for caching"),
        }
    }

    fn lookup(&self, key: &str) -> Option<Embedding> {
        best_effort_get(self.cache.as_ref(), key)
            .and_then(|bytes| decode_vector(&bytes, self.dimension))
    }
}
