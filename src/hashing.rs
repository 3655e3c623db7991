//! Cache-key hashing.
//!
//! Every cache key is built from a SHA-256 hex digest of the raw text plus
//! the tags that decide whether a cached value is still meaningful: the
//! model version and dimension for embeddings, and additionally the index
//! epoch and `k` for search results.

use sha2::{Digest, Sha256};

/// Computes the SHA-256 digest of `text`, hex-encoded (64 characters).
pub fn content_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let result = hasher.finalize();
    format!("{result:x}")
}

/// Builds the cache key for an embedding vector.
///
/// Format: `{prefix}:emb:{model_version}:{dimension}:{sha256(text)}`
pub fn embedding_cache_key(
    prefix: &str,
    model_version: &str,
    dimension: usize,
    text: &str,
) -> String {
    format!(
        "{prefix}:emb:{model_version}:{dimension}:{}",
        content_digest(text)
    )
}

/// Builds the cache key for a search result.
///
/// Format: `{prefix}:search:{model_version}:{epoch}:{k}:{sha256(query)}`
///
/// `epoch` is the index mutation counter, so a result cached before an
/// insert can never be served after it.
pub fn search_cache_key(
    prefix: &str,
    model_version: &str,
    epoch: u64,
    k: usize,
    query: &str,
) -> String {
    format!(
        "{prefix}:search:{model_version}:{epoch}:{k}:{}",
        content_digest(query)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_deterministic() {
        assert_eq!(content_digest("test content"), content_digest("test content"));
    }

    #[test]
    fn test_digest_differs_for_different_content() {
        assert_ne!(content_digest("content A"), content_digest("content B"));
    }

    #[test]
    fn test_digest_known_vector() {
        assert_eq!(
            content_digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_digest_hex_is_64_chars() {
        let hash = content_digest("any content");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_embedding_key_changes_with_model_version() {
        let a = embedding_cache_key("docindex", "v1", 384, "hello");
        let b = embedding_cache_key("docindex", "v2", 384, "hello");
        assert_ne!(a, b);
        assert!(a.starts_with("docindex:emb:v1:384:"));
    }

    #[test]
    fn test_search_key_changes_with_epoch_and_k() {
        let base = search_cache_key("docindex", "v1", 3, 10, "revenue");
        assert_ne!(base, search_cache_key("docindex", "v1", 4, 10, "revenue"));
        assert_ne!(base, search_cache_key("docindex", "v1", 3, 5, "revenue"));
        assert_eq!(base, search_cache_key("docindex", "v1", 3, 10, "revenue"));
    }

    #[test]
    fn test_embedding_and_search_keys_never_collide() {
        let emb = embedding_cache_key("docindex", "v1", 384, "same text");
        let search = search_cache_key("docindex", "v1", 0, 384, "same text");
        assert_ne!(emb, search);
    }
}
