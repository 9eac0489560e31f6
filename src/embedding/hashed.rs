//! Hash-based pseudo-embeddings.
//!
//! Each normalized word is hashed and spread over a handful of dimensions, so
//! texts sharing most of their vocabulary land close together. This is NOT a
//! semantic model: "joy" and "happiness" share nothing here. It exists for
//! offline operation, demos, and benchmarks.

use super::Embedder;
use crate::{Error, Result};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Deterministic hash-based embedder.
#[derive(Debug, Clone)]
pub struct HashedEmbedder {
    dimensions: usize,
}

impl HashedEmbedder {
    /// Default embedding dimensions.
    pub const DEFAULT_DIMENSIONS: usize = 384;

    /// Upper bound on words considered per text.
    const MAX_WORDS: usize = 1000;

    /// Creates an embedder with [`Self::DEFAULT_DIMENSIONS`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            dimensions: Self::DEFAULT_DIMENSIONS,
        }
    }

    /// Creates an embedder with custom dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `dimensions` is zero.
    pub fn with_dimensions(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::Configuration(
                "embedding dimensions must be > 0".to_string(),
            ));
        }
        Ok(Self { dimensions })
    }

    fn pseudo_embed(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];

        let words = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .take(Self::MAX_WORDS);

        for word in words {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            Self::distribute_hash(&mut embedding, hasher.finish());
        }

        Self::normalize(&mut embedding);
        embedding
    }

    /// Adds eight signed contributions of `hash` to the vector.
    fn distribute_hash(embedding: &mut [f32], hash: u64) {
        let dimensions = embedding.len();
        for j in 0..8 {
            let idx = (hash.rotate_left(j * 8) as usize) % dimensions;
            let value = ((hash >> (j * 4)) & 0xFF) as f32 / 255.0 - 0.5;
            embedding[idx] += value;
        }
    }

    fn normalize(embedding: &mut [f32]) {
        let norm_sq: f32 = embedding.iter().map(|x| x * x).sum();
        if norm_sq <= 0.0 {
            return;
        }
        let inv_norm = norm_sq.sqrt().recip();
        for v in embedding.iter_mut() {
            *v *= inv_norm;
        }
    }
}

impl Default for HashedEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for HashedEmbedder {
    fn name(&self) -> &'static str {
        "hashed"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("cannot embed empty text".to_string()));
        }
        Ok(self.pseudo_embed(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn test_embed_dimensions() {
        let embedder = HashedEmbedder::new();
        let embedding = embedder.embed("Keep going").unwrap();
        assert_eq!(embedding.len(), HashedEmbedder::DEFAULT_DIMENSIONS);
    }

    #[test]
    fn test_embed_is_deterministic_and_case_insensitive() {
        let embedder = HashedEmbedder::new();
        let a = embedder.embed("Believe in yourself").unwrap();
        let b = embedder.embed("believe in YOURSELF!").unwrap();
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_embed_unit_length() {
        let embedder = HashedEmbedder::new();
        let v = embedder.embed("Every sunrise is a new start").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_embed_empty_text_fails() {
        assert!(HashedEmbedder::new().embed("   ").is_err());
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        assert!(matches!(
            HashedEmbedder::with_dimensions(0),
            Err(Error::Configuration(_))
        ));
    }
}
