//! Semantic similarity deduplication.
//!
//! Compares embedding vectors by cosine distance against the owner's stored
//! embeddings inside the retention window.

use crate::Result;
use crate::clock::Clock;
use crate::models::{Category, ContentId, ContentItem, OwnerId, SimilarMatch};
use crate::storage::traits::ensure_dimensions;
use crate::storage::{EmbeddingStore, NeighborFilter, StoreCounts};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::instrument;

use super::config::DeduplicationConfig;
use super::recover_lock;

/// Engine for embedding similarity against stored history.
///
/// # How it works
///
/// 1. Rejects a query whose dimensionality differs from the store's
/// 2. Asks the store for the owner's nearest neighbors created inside the
///    retention window (and in the same category, when one is given)
/// 3. Keeps neighbors with `distance <= semantic_distance_threshold`
///
/// The engine reads the configuration it shares with the orchestrator on
/// every call, so threshold changes apply to the next check.
pub struct SemanticEngine {
    store: Arc<dyn EmbeddingStore>,
    config: Arc<RwLock<DeduplicationConfig>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SemanticEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticEngine")
            .field("store", &self.store.name())
            .field("dimensions", &self.store.dimensions())
            .finish_non_exhaustive()
    }
}

impl SemanticEngine {
    /// Creates an engine over `store`.
    #[must_use]
    pub fn new(
        store: Arc<dyn EmbeddingStore>,
        config: Arc<RwLock<DeduplicationConfig>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn EmbeddingStore> {
        &self.store
    }

    fn snapshot(&self) -> DeduplicationConfig {
        self.config
            .read()
            .unwrap_or_else(recover_lock("dedup_config"))
            .clone()
    }

    /// Returns the owner's stored items within the distance threshold,
    /// most similar first, capped at `max_results`.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::InvariantViolation`] if the embedding has the wrong
    ///   dimensionality
    /// - [`crate::Error::Store`] if the store query fails
    #[instrument(
        skip(self, embedding),
        fields(
            operation = "semantic_similarity_check",
            owner = %owner,
            category = category.map(Category::as_str)
        )
    )]
    pub fn check_similarity(
        &self,
        owner: &OwnerId,
        embedding: &[f32],
        category: Option<&Category>,
    ) -> Result<Vec<SimilarMatch>> {
        let start = Instant::now();
        ensure_dimensions(self.store.dimensions(), embedding)?;

        let config = self.snapshot();
        let threshold = config.semantic_distance_threshold;
        let since = self.clock.now().saturating_sub(config.retention_secs());

        let mut filter = NeighborFilter::new(owner.clone())
            .created_after(since)
            .with_max_distance(threshold);
        if let Some(category) = category {
            filter = filter.with_category(category.clone());
        }

        let matches: Vec<SimilarMatch> = self
            .store
            .nearest(embedding, &filter, config.max_results)?
            .into_iter()
            .filter(|neighbor| neighbor.distance <= threshold)
            .take(config.max_results)
            .map(|neighbor| SimilarMatch {
                id: neighbor.id,
                text: neighbor.text,
                similarity: (1.0 - neighbor.distance).clamp(0.0, 1.0),
                created_at: neighbor.created_at,
            })
            .collect();

        let duration_ms = start.elapsed().as_millis();
        tracing::debug!(
            threshold,
            matches = matches.len(),
            duration_ms = %duration_ms,
            "Semantic similarity check complete"
        );
        metrics::histogram!(
            "deduplication_check_duration_ms",
            "checker" => "semantic",
            "found" => if matches.is_empty() { "false" } else { "true" }
        )
        .record(duration_ms as f64);

        Ok(matches)
    }

    /// Returns true if [`Self::check_similarity`] finds any match.
    ///
    /// # Errors
    ///
    /// Same as [`Self::check_similarity`].
    pub fn is_duplicate(
        &self,
        owner: &OwnerId,
        embedding: &[f32],
        category: Option<&Category>,
    ) -> Result<bool> {
        Ok(!self.check_similarity(owner, embedding, category)?.is_empty())
    }

    /// Stores a content row, with its embedding when one is given.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::InvariantViolation`] on a dimensionality mismatch
    /// - [`crate::Error::Store`] if the write fails
    #[instrument(skip(self, text, embedding), fields(content_id = %content_id, owner = %owner))]
    pub fn store_embedding(
        &self,
        content_id: &ContentId,
        owner: &OwnerId,
        text: &str,
        embedding: Option<&[f32]>,
        category: Option<&Category>,
    ) -> Result<()> {
        if let Some(embedding) = embedding {
            ensure_dimensions(self.store.dimensions(), embedding)?;
        }

        let item = ContentItem {
            id: content_id.clone(),
            owner_id: owner.clone(),
            category: category.cloned(),
            text: text.to_string(),
            embedding: embedding.map(<[f32]>::to_vec),
            created_at: self.clock.now(),
        };
        self.store.insert(&item)
    }

    /// Nulls embeddings older than the retention window plus grace period.
    ///
    /// Rows are kept. Returns the number of embeddings removed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Store`] if the update fails.
    #[instrument(skip(self))]
    pub fn cleanup_old_embeddings(&self) -> Result<usize> {
        let cutoff = self
            .clock
            .now()
            .saturating_sub(self.snapshot().cleanup_age_secs());
        let cleaned = self.store.clear_embeddings_before(cutoff)?;

        tracing::info!(cleaned, cutoff, "Cleaned up old embeddings");
        metrics::counter!("deduplication_embeddings_cleaned_total").increment(cleaned as u64);
        Ok(cleaned)
    }

    /// Stored row counts for one owner, or the whole store with `None`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Store`] if the count fails.
    pub fn storage_counts(&self, owner: Option<&OwnerId>) -> Result<StoreCounts> {
        self.store.count(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::clock::{ManualClock, SECS_PER_DAY};
    use crate::storage::InMemoryEmbeddingStore;

    const NOW: u64 = 1_700_000_000;

    fn engine_with(config: DeduplicationConfig) -> (SemanticEngine, Arc<InMemoryEmbeddingStore>, Arc<ManualClock>) {
        let store = Arc::new(InMemoryEmbeddingStore::new(3));
        let clock = Arc::new(ManualClock::new(NOW));
        let engine = SemanticEngine::new(
            store.clone(),
            Arc::new(RwLock::new(config)),
            clock.clone(),
        );
        (engine, store, clock)
    }

    fn engine() -> (SemanticEngine, Arc<InMemoryEmbeddingStore>, Arc<ManualClock>) {
        engine_with(DeduplicationConfig::default())
    }

    #[test]
    fn test_round_trip_identical_embedding() {
        let (engine, _, _) = engine();
        let owner = OwnerId::new("u1");
        let v = [1.0, 0.0, 0.0];
        engine
            .store_embedding(&ContentId::new("a"), &owner, "hello", Some(&v), None)
            .unwrap();

        let matches = engine.check_similarity(&owner, &v, None).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, ContentId::new("a"));
        assert!((matches[0].similarity - 1.0).abs() < 1e-5);
        assert!(engine.is_duplicate(&owner, &v, None).unwrap());
    }

    #[test]
    fn test_orthogonal_is_not_duplicate() {
        let (engine, _, _) = engine();
        let owner = OwnerId::new("u1");
        engine
            .store_embedding(&ContentId::new("a"), &owner, "x", Some(&[1.0, 0.0, 0.0]), None)
            .unwrap();
        assert!(!engine.is_duplicate(&owner, &[0.0, 1.0, 0.0], None).unwrap());
    }

    #[test]
    fn test_threshold_is_inclusive() {
        // cos = 0.8 => distance = 0.2
        let config = DeduplicationConfig::default().with_semantic_distance_threshold(0.2);
        let (engine, _, _) = engine_with(config);
        let owner = OwnerId::new("u1");
        engine
            .store_embedding(&ContentId::new("a"), &owner, "x", Some(&[1.0, 0.0, 0.0]), None)
            .unwrap();
        let query = [0.8, 0.6, 0.0];
        let matches = engine.check_similarity(&owner, &query, None).unwrap();
        assert_eq!(matches.len(), 1);
        assert!((matches[0].similarity - 0.8).abs() < 1e-4);
    }

    #[test]
    fn test_retention_window_and_category() {
        let (engine, _, clock) = engine();
        let owner = OwnerId::new("u1");
        let v = [0.0, 0.0, 1.0];
        let motivation = Category::new("motivation");
        engine
            .store_embedding(&ContentId::new("a"), &owner, "x", Some(&v), Some(&motivation))
            .unwrap();

        assert!(engine.is_duplicate(&owner, &v, Some(&motivation)).unwrap());
        assert!(!engine.is_duplicate(&owner, &v, Some(&Category::new("calm"))).unwrap());
        assert!(!engine.is_duplicate(&OwnerId::new("u2"), &v, None).unwrap());

        clock.advance_secs(31 * SECS_PER_DAY);
        assert!(!engine.is_duplicate(&owner, &v, None).unwrap());
    }

    #[test]
    fn test_max_results_cap() {
        let config = DeduplicationConfig::default().with_max_results(2);
        let (engine, _, _) = engine_with(config);
        let owner = OwnerId::new("u1");
        for i in 0..5 {
            engine
                .store_embedding(&ContentId::new(format!("c{i}")), &owner, "x", Some(&[1.0, 0.0, 0.0]), None)
                .unwrap();
        }
        assert_eq!(engine.check_similarity(&owner, &[1.0, 0.0, 0.0], None).unwrap().len(), 2);
    }

    #[test]
    fn test_dimension_mismatch() {
        let (engine, _, _) = engine();
        let owner = OwnerId::new("u1");
        assert!(matches!(
            engine.check_similarity(&owner, &[1.0, 0.0], None),
            Err(Error::InvariantViolation(_))
        ));
        assert!(matches!(
            engine.store_embedding(&ContentId::new("a"), &owner, "x", Some(&[1.0]), None),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_cleanup_respects_grace_period() {
        let (engine, store, clock) = engine();
        let owner = OwnerId::new("u1");
        engine
            .store_embedding(&ContentId::new("old"), &owner, "x", Some(&[1.0, 0.0, 0.0]), None)
            .unwrap();

        clock.advance_secs(36 * SECS_PER_DAY);
        assert_eq!(engine.cleanup_old_embeddings().unwrap(), 0);

        clock.advance_secs(2 * SECS_PER_DAY);
        assert_eq!(engine.cleanup_old_embeddings().unwrap(), 1);
        assert!(store.get(&ContentId::new("old")).unwrap().embedding.is_none());

        let counts = engine.storage_counts(Some(&owner)).unwrap();
        assert_eq!(counts.rows, 1);
        assert_eq!(counts.with_embedding, 0);
    }
}
