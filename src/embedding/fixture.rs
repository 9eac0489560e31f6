//! Deterministic test double for the embedding provider.

use super::Embedder;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Embedder that returns precomputed vectors for known inputs.
///
/// Unknown inputs get a fallback vector (or an error when no fallback is set).
/// Every call is counted, which lets tests assert that the semantic layer was
/// or was not consulted. [`FixtureEmbedder::fail_with`] scripts provider
/// failures.
///
/// # Example
///
/// ```rust
/// use echoless::Embedder;
/// use echoless::embedding::FixtureEmbedder;
///
/// let embedder = FixtureEmbedder::new(2)
///     .with_vector("sunrise", vec![1.0, 0.0])
///     .with_fallback(vec![0.0, 1.0]);
///
/// assert_eq!(embedder.embed("sunrise")?, vec![1.0, 0.0]);
/// assert_eq!(embedder.embed("other")?, vec![0.0, 1.0]);
/// assert_eq!(embedder.calls(), 2);
/// # Ok::<(), echoless::Error>(())
/// ```
#[derive(Debug)]
pub struct FixtureEmbedder {
    dimensions: usize,
    vectors: RwLock<HashMap<String, Vec<f32>>>,
    fallback: Option<Vec<f32>>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl FixtureEmbedder {
    /// Creates an empty fixture producing `dimensions`-long vectors.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            vectors: RwLock::new(HashMap::new()),
            fallback: None,
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Registers the vector returned for `text`.
    #[must_use]
    pub fn with_vector(self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.insert(text, vector);
        self
    }

    /// Sets the vector returned for unknown inputs.
    #[must_use]
    pub fn with_fallback(mut self, vector: Vec<f32>) -> Self {
        self.fallback = Some(vector);
        self
    }

    /// Registers (or replaces) the vector returned for `text`.
    pub fn insert(&self, text: impl Into<String>, vector: Vec<f32>) {
        let mut vectors = self
            .vectors
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        vectors.insert(text.into(), vector);
    }

    /// Makes every subsequent call fail (or succeed again with `false`).
    pub fn fail_with(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `embed` calls made so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Embedder for FixtureEmbedder {
    fn name(&self) -> &'static str {
        "fixture"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::EmbeddingProvider {
                provider: self.name().to_string(),
                cause: "scripted failure".to_string(),
            });
        }

        let vectors = self
            .vectors
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        vectors
            .get(text)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| Error::EmbeddingProvider {
                provider: self.name().to_string(),
                cause: format!("no fixture vector for {text:?}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_text_without_fallback_fails() {
        let embedder = FixtureEmbedder::new(3);
        let err = embedder.embed("missing").unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(embedder.calls(), 1);
    }

    #[test]
    fn test_scripted_failure_and_recovery() {
        let embedder = FixtureEmbedder::new(1).with_vector("a", vec![1.0]);
        embedder.fail_with(true);
        assert!(matches!(
            embedder.embed("a"),
            Err(Error::EmbeddingProvider { .. })
        ));
        embedder.fail_with(false);
        assert_eq!(embedder.embed("a").unwrap(), vec![1.0]);
        assert_eq!(embedder.calls(), 2);
    }
}
