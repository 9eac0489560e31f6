//! Embedding generation.
//!
//! The semantic layer consumes embeddings through the [`Embedder`] trait.
//! Providers:
//!
//! | Embedder | Use |
//! |----------|-----|
//! | [`OpenAiEmbedder`] | OpenAI-compatible `/embeddings` HTTP endpoint |
//! | [`HashedEmbedder`] | Offline, deterministic pseudo-embeddings |
//! | [`BulkheadEmbedder`] | Concurrency limit around another embedder |
//! | [`FixtureEmbedder`] | Precomputed vectors for tests |
//!
//! All vectors compared against each other must come from the same model;
//! the store enforces a single dimensionality.

// Hash-to-float conversions in the pseudo embedder.
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]

mod bulkhead;
mod fixture;
mod hashed;
mod openai;

pub use bulkhead::{BulkheadEmbedder, EmbeddingBulkheadConfig};
pub use fixture::FixtureEmbedder;
pub use hashed::HashedEmbedder;
pub use openai::{EmbeddingHttpConfig, OpenAiEmbedder};

use crate::Result;

/// Trait for embedding generators.
pub trait Embedder: Send + Sync {
    /// Short provider name used in errors and metrics.
    fn name(&self) -> &'static str;

    /// Returns the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Generates an embedding for the given text.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::EmbeddingProvider`] if generation fails.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generates embeddings for multiple texts.
    ///
    /// # Errors
    ///
    /// Returns an error if any embedding fails.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

impl<E: Embedder + ?Sized> Embedder for std::sync::Arc<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts)
    }
}

/// Computes cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or 0.0 when the vectors differ in length,
/// are empty, or have zero magnitude.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Cosine distance (`1 - cosine similarity`), in `[0.0, 2.0]`.
///
/// Smaller is more similar.
#[must_use]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}
