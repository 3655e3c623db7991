//! Deterministic feature-hashing embeddings.
//!
//! Maps text to a fixed-length vector without a trained model: each word
//! and each character trigram of each word is hashed into one of
//! `dimension` buckets with a hashed sign, then the vector is L2
//! normalized. Texts sharing words or word fragments land close together
//! under L2 distance, which is enough for lexical retrieval and for tests
//! that need a pure, reproducible encoder.
//!
//! ```text
//! "Quarterly revenue" → [quarterly, revenue]
//!                     → w:quarterly, #qu, qua, uar, ..., w:revenue, #re, rev, ...
//!                     → FNV-1a → bucket ± weight → L2 normalize
//! ```

use crate::embedding::EmbeddingService;
use crate::error::Result;
use crate::types::Embedding;

/// Weight of a whole-word feature.
const WORD_WEIGHT: f32 = 1.0;

/// Weight of a character trigram feature.
const TRIGRAM_WEIGHT: f32 = 0.5;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Feature-hashing embedding service.
///
/// Pure function of the input text: no state, no randomness, identical
/// output on every platform.
#[derive(Clone, Debug)]
pub struct HashingEmbedding {
    dimension: usize,
}

impl HashingEmbedding {
    /// Creates a hashing encoder producing `dimension`-length vectors.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn add_feature(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let hash = fnv1a(feature);
        let bucket = (hash % self.dimension as u64) as usize;
        // Top bit picks the sign so unrelated collisions tend to cancel out
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl EmbeddingService for HashingEmbedding {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let mut vector = vec![0.0f32; self.dimension];
        if self.dimension == 0 {
            return Ok(vector);
        }

        let lowered = text.to_lowercase();
        let mut words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        if words.is_empty() {
            // Punctuation-only text still gets a stable, non-zero vector
            words.push(lowered.trim());
        }

        for word in words {
            let mut feature = Vec::with_capacity(word.len() + 2);
            feature.extend_from_slice(b"w:");
            feature.extend_from_slice(word.as_bytes());
            self.add_feature(&mut vector, &feature, WORD_WEIGHT);

            let padded: Vec<char> = std::iter::once('#')
                .chain(word.chars())
                .chain(std::iter::once('#'))
                .collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                self.add_feature(&mut vector, trigram.as_bytes(), TRIGRAM_WEIGHT);
            }
        }

        l2_normalize(&mut vector);
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// 64-bit FNV-1a hash.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, &byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Scales a vector to unit length in place. Zero vectors are left untouched.
fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l2(a: &[f32], b: &[f32]) -> f32 {
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt()
    }

    #[test]
    fn test_output_dimension() {
        let service = HashingEmbedding::new(384);
        assert_eq!(service.embed("hello world").unwrap().len(), 384);
        assert_eq!(service.dimension(), 384);
    }

    #[test]
    fn test_deterministic() {
        let service = HashingEmbedding::new(384);
        let a = service.embed("employee leave policy").unwrap();
        let b = service.embed("employee leave policy").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unit_length() {
        let service = HashingEmbedding::new(384);
        let v = service.embed("some text to embed").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_case_insensitive() {
        let service = HashingEmbedding::new(384);
        assert_eq!(
            service.embed("Revenue Report").unwrap(),
            service.embed("revenue report").unwrap()
        );
    }

    #[test]
    fn test_related_text_is_closer() {
        let service = HashingEmbedding::new(384);
        let query = service.embed("revenue figures this quarter").unwrap();
        let revenue = service.embed("quarterly revenue report").unwrap();
        let leave = service.embed("employee leave policy").unwrap();
        assert!(l2(&query, &revenue) < l2(&query, &leave));
    }

    #[test]
    fn test_punctuation_only_text_is_not_zero() {
        let service = HashingEmbedding::new(64);
        let v = service.embed("?!").unwrap();
        assert!(v.iter().any(|x| *x != 0.0));
    }

    #[test]
    fn test_fnv1a_known_values() {
        assert_eq!(fnv1a(b""), FNV_OFFSET);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }
}
