//! Embedding generation for docindex.
//!
//! Embeddings are dense vector representations of text used for semantic
//! search. This module provides the model-facing trait, two providers, and
//! the cache-aware [`CachedEncoder`] that the index manager calls.
//!
//! # Providers
//!
//! - [`HashingEmbedding`] - Deterministic feature hashing, no model files
//! - `OnnxEmbedding` - all-MiniLM-L6-v2 via ONNX Runtime (requires `builtin-embeddings` feature)
//!
//! # Example
//!
//! ```rust
//! use docindex::embedding::{EmbeddingService, HashingEmbedding};
//!
//! let service = HashingEmbedding::new(384);
//! let embedding = service.embed("quarterly revenue report").unwrap();
//! assert_eq!(embedding.len(), 384);
//! ```

mod cached;
mod feature_hash;
#[cfg(feature = "builtin-embeddings")]
pub mod onnx;

pub use cached::CachedEncoder;
pub use feature_hash::HashingEmbedding;

use crate::error::{DocIndexError, Result, ValidationError};
use crate::types::Embedding;

/// Embedding service trait for generating vector representations of text.
///
/// This trait defines the contract for any embedding provider. Implementations
/// must be thread-safe (`Send + Sync`) to allow concurrent embedding operations,
/// and deterministic: the same text always yields the same vector.
///
/// # Implementing a Custom Provider
///
/// ```rust,ignore
/// use docindex::embedding::EmbeddingService;
/// use docindex::{Embedding, Result};
///
/// struct RemoteModel {
///     client: MyApiClient,
/// }
///
/// impl EmbeddingService for RemoteModel {
///     fn embed(&self, text: &str) -> Result<Embedding> {
///         Ok(self.client.get_embedding(text)?)
///     }
///
///     fn dimension(&self) -> usize {
///         384
///     }
/// }
/// ```
pub trait EmbeddingService: Send + Sync {
    /// Generates an embedding for a single text.
    ///
    /// # Errors
    ///
    /// Returns `DocIndexError::Encoding` if the model fails.
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// Generates embeddings for multiple texts, in input order.
    ///
    /// The default implementation embeds one text at a time. Providers
    /// with real batched inference should override it.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    /// Returns the dimension of embeddings produced by this service.
    fn dimension(&self) -> usize;
}

/// Checks that a model output has the expected shape and numeric content.
///
/// Model outputs of the wrong length or with NaN/infinite components are
/// encoding errors, never silently stored.
pub(crate) fn check_model_output(embedding: &[f32], expected: usize) -> Result<()> {
    if embedding.len() != expected {
        return Err(DocIndexError::encoding(format!(
            "Model produced {} dimensions, expected {}",
            embedding.len(),
            expected
        )));
    }
    if let Some(position) = embedding.iter().position(|v| !v.is_finite()) {
        return Err(DocIndexError::encoding(format!(
            "Model produced a non-finite value at position {position}"
        )));
    }
    Ok(())
}

/// Rejects empty or whitespace-only text before it reaches a model.
pub(crate) fn require_text(text: &str, field: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(ValidationError::required_field(field).into());
    }
    Ok(())
}

/// Creates an embedding service based on the configuration.
///
/// # Errors
///
/// Returns an error if:
/// - Builtin embeddings requested but feature not enabled
/// - ONNX model loading fails (for builtin provider)
pub fn create_embedding_service(
    config: &crate::config::Config,
) -> Result<Box<dyn EmbeddingService>> {
    use crate::config::EmbeddingProvider;

    match &config.embedding_provider {
        EmbeddingProvider::Hashing => Ok(Box::new(HashingEmbedding::new(config.dimension))),

        #[cfg(feature = "builtin-embeddings")]
        EmbeddingProvider::Builtin { model_path } => Ok(Box::new(
            onnx::OnnxEmbedding::with_dimension(model_path.clone(), config.dimension)?,
        )),

        #[cfg(not(feature = "builtin-embeddings"))]
        EmbeddingProvider::Builtin { .. } => Err(DocIndexError::config(
            "Builtin embeddings require the 'builtin-embeddings' feature",
        )),
    }
}
