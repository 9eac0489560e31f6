//! Deduplication orchestrator.
//!
//! Coordinates the two-layer check:
//! 1. **Lexical**: per-owner Bloom filter over trigram shingles, confirmed
//!    against the owner's recent raw texts
//! 2. **Semantic**: embedding cosine distance against the owner's stored
//!    history inside the retention window
//!
//! The lexical layer is local and cheap; the semantic layer needs an
//! embedding and a store round trip, so it only runs when the lexical layer
//! did not already decide (unless `short_circuit_lexical` is off).

use crate::clock::{Clock, SystemClock};
use crate::embedding::Embedder;
use crate::models::{Category, ContentId, OwnerId, SimilarMatch};
use crate::storage::{EmbeddingStore, RecentText};
use crate::{Error, Result};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Instant;
use tracing::instrument;

use super::bloom::FilterState;
use super::config::{DeduplicationConfig, DeduplicationConfigPatch, merge};
use super::lexical::LexicalService;
use super::recover_lock;
use super::semantic::SemanticEngine;
use super::shingles::ShingleEngine;
use super::types::{DeduplicationStats, FailurePolicy, SimilarityVerdict, VerdictDetails};

/// Service for duplicate-content checks.
///
/// Shared via `Arc`; every operation takes `&self`. No lock is held across an
/// embedding or store call.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use echoless::embedding::FixtureEmbedder;
/// use echoless::models::{ContentId, OwnerId};
/// use echoless::services::deduplication::{DeduplicationConfig, DeduplicationService, VerdictReason};
/// use echoless::storage::InMemoryEmbeddingStore;
///
/// let embedder = Arc::new(FixtureEmbedder::new(2).with_fallback(vec![1.0, 0.0]));
/// let store = Arc::new(InMemoryEmbeddingStore::new(2));
/// let service = DeduplicationService::new(embedder, store, DeduplicationConfig::default())?;
///
/// let owner = OwnerId::new("user-1");
/// service.add_content(&ContentId::new("m1"), &owner, "Keep moving forward", None, None)?;
///
/// // Different words, same meaning (the fixture maps both to one vector).
/// let verdict = service.check_for_duplicates(&owner, "Never stop progressing", None, None)?;
/// assert_eq!(verdict.reason, VerdictReason::Semantic);
/// # Ok::<(), echoless::Error>(())
/// ```
pub struct DeduplicationService {
    config: Arc<RwLock<DeduplicationConfig>>,
    shingles: Arc<ShingleEngine>,
    lexical: LexicalService,
    semantic: SemanticEngine,
    embedder: Option<Arc<dyn Embedder>>,
    clock: Arc<dyn Clock>,
    /// Owners whose lexical state was cleared and must not be reloaded lazily.
    cleared: Mutex<HashSet<OwnerId>>,
}

impl std::fmt::Debug for DeduplicationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeduplicationService")
            .field("config", &self.config())
            .field("lexical", &self.lexical)
            .field("semantic", &self.semantic)
            .field("embedder", &self.embedder.as_ref().map(|e| e.name()))
            .finish_non_exhaustive()
    }
}

impl DeduplicationService {
    /// Creates a service with both layers available.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `config` is invalid or the
    /// embedder and store disagree on dimensionality.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn EmbeddingStore>,
        config: DeduplicationConfig,
    ) -> Result<Self> {
        if embedder.dimensions() != store.dimensions() {
            return Err(Error::Configuration(format!(
                "embedder '{}' produces {} dimensions but store '{}' holds {}",
                embedder.name(),
                embedder.dimensions(),
                store.name(),
                store.dimensions()
            )));
        }
        Self::build(Some(embedder), store, config)
    }

    /// Creates a service without an embedder.
    ///
    /// Semantic checks then need a caller-supplied embedding; see
    /// [`Self::check_for_duplicates`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `config` is invalid.
    pub fn without_embedder(
        store: Arc<dyn EmbeddingStore>,
        config: DeduplicationConfig,
    ) -> Result<Self> {
        Self::build(None, store, config)
    }

    fn build(
        embedder: Option<Arc<dyn Embedder>>,
        store: Arc<dyn EmbeddingStore>,
        config: DeduplicationConfig,
    ) -> Result<Self> {
        config.validate()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let shingles = Arc::new(ShingleEngine::new(config.shingle_cache_capacity));
        let lexical = LexicalService::new(&config, Arc::clone(&shingles), Arc::clone(&clock))?;
        let config = Arc::new(RwLock::new(config));
        let semantic = SemanticEngine::new(store, Arc::clone(&config), Arc::clone(&clock));

        Ok(Self {
            config,
            shingles,
            lexical,
            semantic,
            embedder,
            clock,
            cleared: Mutex::new(HashSet::new()),
        })
    }

    /// Replaces the clock used for retention and confirmation windows.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.lexical = self.lexical.with_clock(Arc::clone(&clock));
        self.semantic = self.semantic.with_clock(Arc::clone(&clock));
        self.clock = clock;
        self
    }

    /// Snapshot of the current configuration.
    #[must_use]
    pub fn config(&self) -> DeduplicationConfig {
        self.config
            .read()
            .unwrap_or_else(recover_lock("dedup_config"))
            .clone()
    }

    /// Returns true if an embedder is configured.
    #[must_use]
    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    /// Checks a candidate, propagating every error.
    ///
    /// Equivalent to [`Self::check_with_policy`] with
    /// [`FailurePolicy::FailClosed`].
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] if the semantic layer is enabled, no
    ///   embedding is supplied and no embedder is configured
    /// - [`Error::EmbeddingProvider`] / [`Error::Store`] on upstream failures
    /// - [`Error::InvariantViolation`] on a dimensionality mismatch
    pub fn check_for_duplicates(
        &self,
        owner: &OwnerId,
        text: &str,
        embedding: Option<&[f32]>,
        category: Option<&Category>,
    ) -> Result<SimilarityVerdict> {
        self.check_with_policy(owner, text, embedding, category, FailurePolicy::FailClosed)
    }

    /// Checks a candidate under an explicit failure policy.
    ///
    /// With [`FailurePolicy::FailOpen`], recoverable semantic-layer failures
    /// yield a verdict without a semantic match whose details carry the
    /// error. Configuration errors and invariant violations always propagate.
    ///
    /// # Errors
    ///
    /// Same as [`Self::check_for_duplicates`], minus recoverable errors under
    /// `FailOpen`.
    #[allow(clippy::cast_possible_truncation)]
    #[instrument(
        skip(self, text, embedding),
        fields(
            operation = "dedup_check",
            owner = %owner,
            text_length = text.len(),
            policy = ?policy
        )
    )]
    pub fn check_with_policy(
        &self,
        owner: &OwnerId,
        text: &str,
        embedding: Option<&[f32]>,
        category: Option<&Category>,
        policy: FailurePolicy,
    ) -> Result<SimilarityVerdict> {
        let start = Instant::now();
        let config = self.config();
        let mut details = VerdictDetails::default();

        if !config.enable_lexical && !config.enable_semantic {
            tracing::debug!("Both layers disabled, skipping check");
            return Ok(Self::finish(SimilarityVerdict::not_duplicate(details), start));
        }

        let mut lexical_similarity = None;
        if config.enable_lexical {
            self.ensure_rehydrated(owner, &config);
            let lexical_start = Instant::now();
            let outcome = self.lexical.check(owner, text, &config.lexical_settings());
            metrics::histogram!("deduplication_check_duration_ms", "checker" => "lexical")
                .record(lexical_start.elapsed().as_millis() as f64);

            details.lexical_score = Some(outcome.filter_score);
            details.confirmed_similarity = outcome.confirmed_similarity;

            if outcome.is_duplicate {
                let similarity = outcome.similarity();
                if config.short_circuit_lexical || !config.enable_semantic {
                    tracing::debug!(similarity, "Lexical duplicate");
                    return Ok(Self::finish(
                        SimilarityVerdict::lexical(similarity, details),
                        start,
                    ));
                }
                lexical_similarity = Some(similarity);
            }
        }

        let mut semantic_similarity = None;
        if config.enable_semantic {
            match self.semantic_matches(owner, text, embedding, category) {
                Ok(matches) => {
                    semantic_similarity = matches.first().map(|m| m.similarity);
                    details.semantic_matches = matches;
                },
                Err(err) => {
                    metrics::counter!(
                        "deduplication_semantic_errors_total",
                        "kind" => err.kind()
                    )
                    .increment(1);
                    if policy == FailurePolicy::FailOpen && err.is_recoverable() {
                        tracing::warn!(error = %err, "Semantic check failed, failing open");
                        details.error = Some(err.to_string());
                    } else {
                        return Err(err);
                    }
                },
            }
        }

        let verdict = match (lexical_similarity, semantic_similarity) {
            (Some(lexical), Some(semantic)) if semantic > lexical => {
                SimilarityVerdict::semantic(semantic, details)
            },
            (Some(lexical), _) => SimilarityVerdict::lexical(lexical, details),
            (None, Some(semantic)) => SimilarityVerdict::semantic(semantic, details),
            (None, None) => SimilarityVerdict::not_duplicate(details),
        };
        Ok(Self::finish(verdict, start))
    }

    fn semantic_matches(
        &self,
        owner: &OwnerId,
        text: &str,
        embedding: Option<&[f32]>,
        category: Option<&Category>,
    ) -> Result<Vec<SimilarMatch>> {
        let generated;
        let embedding = match embedding {
            Some(embedding) => embedding,
            None => {
                let embedder = self.embedder.as_ref().ok_or_else(|| {
                    Error::Configuration(
                        "semantic layer enabled but no embedding supplied and no embedder configured"
                            .to_string(),
                    )
                })?;
                generated = embedder.embed(text)?;
                generated.as_slice()
            },
        };
        self.semantic.check_similarity(owner, embedding, category)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn finish(mut verdict: SimilarityVerdict, start: Instant) -> SimilarityVerdict {
        let duration_ms = start.elapsed().as_millis() as u64;
        verdict.details.check_duration_ms = duration_ms;

        metrics::counter!(
            "deduplication_checks_total",
            "result" => if verdict.is_duplicate { "duplicate" } else { "unique" }
        )
        .increment(1);
        if verdict.is_duplicate {
            metrics::counter!(
                "deduplication_duplicates_total",
                "reason" => verdict.reason.as_str()
            )
            .increment(1);
        }
        metrics::histogram!("deduplication_check_duration_ms", "checker" => "total")
            .record(duration_ms as f64);

        tracing::debug!(
            is_duplicate = verdict.is_duplicate,
            reason = %verdict.reason,
            confidence = verdict.confidence,
            duration_ms,
            "Duplicate check complete"
        );
        verdict
    }

    /// Ingests accepted content into both layers.
    ///
    /// The lexical layer is updated first, whether or not it is enabled for
    /// checks, and cannot fail. The store write
    /// follows, with an embedding when one is supplied or the semantic layer
    /// is enabled and an embedder is configured. A failure there leaves the
    /// lexical layer ahead of the store and is returned.
    ///
    /// # Errors
    ///
    /// - [`Error::EmbeddingProvider`] if generating the embedding fails
    /// - [`Error::Store`] if the write fails
    /// - [`Error::InvariantViolation`] on a dimensionality mismatch
    #[instrument(
        skip(self, text, embedding),
        fields(operation = "add_content", content_id = %content_id, owner = %owner)
    )]
    pub fn add_content(
        &self,
        content_id: &ContentId,
        owner: &OwnerId,
        text: &str,
        embedding: Option<&[f32]>,
        category: Option<&Category>,
    ) -> Result<()> {
        let config = self.config();

        self.ensure_rehydrated(owner, &config);
        self.lexical.add_text(owner, text);

        let generated;
        let embedding = match (embedding, &self.embedder) {
            (Some(embedding), _) => Some(embedding),
            (None, Some(embedder)) if config.enable_semantic => {
                generated = embedder.embed(text)?;
                Some(generated.as_slice())
            },
            (None, None) if config.enable_semantic => {
                tracing::warn!("No embedder configured, storing content without embedding");
                None
            },
            (None, _) => None,
        };

        self.semantic
            .store_embedding(content_id, owner, text, embedding, category)?;
        tracing::debug!(has_embedding = embedding.is_some(), "Content added");
        Ok(())
    }

    /// Statistics for one owner, or global ones with `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the store cannot be counted.
    pub fn get_stats(&self, owner: Option<&OwnerId>) -> Result<DeduplicationStats> {
        let config = self.config();
        let counts = self.semantic.storage_counts(owner)?;

        Ok(DeduplicationStats {
            owner: owner.cloned(),
            tracked_owners: self.lexical.owner_count(),
            lexical: owner.and_then(|owner| self.lexical.stats(owner)),
            stored_items: counts.rows,
            stored_embeddings: counts.with_embedding,
            shingle_cache_entries: self.shingles.cached_entries(),
            lexical_enabled: config.enable_lexical,
            semantic_enabled: config.enable_semantic,
        })
    }

    /// Applies a partial configuration update to subsequent operations.
    ///
    /// Filter sizing and shingle cache capacity apply to structures created
    /// after the update.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the merged configuration is
    /// invalid; the current configuration is then left unchanged.
    #[instrument(skip(self, patch))]
    pub fn update_config(&self, patch: &DeduplicationConfigPatch) -> Result<()> {
        let mut config = self
            .config
            .write()
            .unwrap_or_else(recover_lock("dedup_config"));
        let merged = merge(&config, patch)?;
        self.lexical.apply_config(&merged)?;
        *config = merged;
        drop(config);

        tracing::info!("Deduplication configuration updated");
        Ok(())
    }

    /// Drops in-memory lexical state for one owner, or every owner.
    ///
    /// Stored history is untouched, and cleared owners are not reloaded from
    /// it automatically; use [`Self::rehydrate`] for that. Idempotent.
    #[instrument(skip(self))]
    pub fn clear(&self, owner: Option<&OwnerId>) {
        let dropped = self.lexical.clear(owner);
        let mut cleared = self.lock_cleared();
        match owner {
            Some(owner) => {
                cleared.insert(owner.clone());
            },
            None => {
                cleared.extend(dropped.iter().cloned());
                self.shingles.clear_cache();
            },
        }
        drop(cleared);

        tracing::info!(owners = dropped.len(), "Cleared lexical state");
    }

    /// Nulls embeddings older than the retention window plus grace period.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the update fails.
    pub fn cleanup_old_embeddings(&self) -> Result<usize> {
        self.semantic.cleanup_old_embeddings()
    }

    /// Rebuilds the owner's lexical state from stored texts inside the
    /// retention window, replacing any in-memory state.
    ///
    /// Returns the number of texts loaded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the texts cannot be read.
    #[instrument(skip(self), fields(owner = %owner))]
    pub fn rehydrate(&self, owner: &OwnerId) -> Result<usize> {
        let texts = self.load_recent(owner, &self.config())?;
        let loaded = self.lexical.rehydrate(owner, &texts);
        self.lock_cleared().remove(owner);

        tracing::info!(loaded, "Rehydrated lexical state");
        Ok(loaded)
    }

    /// Exports the owner's lexical filter, if tracked.
    #[must_use]
    pub fn export_filter(&self, owner: &OwnerId) -> Option<FilterState> {
        self.lexical.export(owner)
    }

    /// Installs a previously exported filter for the owner.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] if the state is inconsistent.
    pub fn import_filter(&self, owner: &OwnerId, state: FilterState) -> Result<()> {
        self.lexical.import(owner, state)?;
        self.lock_cleared().remove(owner);
        Ok(())
    }

    fn load_recent(&self, owner: &OwnerId, config: &DeduplicationConfig) -> Result<Vec<RecentText>> {
        let since = self.clock.now().saturating_sub(config.retention_secs());
        self.semantic
            .store()
            .recent_texts(owner, since, config.rehydrate_max_texts)
    }

    /// Lazily loads an untracked owner's history when enabled.
    ///
    /// A store failure only costs lexical recall, so it is logged and the
    /// check continues.
    fn ensure_rehydrated(&self, owner: &OwnerId, config: &DeduplicationConfig) {
        if !config.rehydrate_on_first_use
            || self.lexical.contains_owner(owner)
            || self.lock_cleared().contains(owner)
        {
            return;
        }

        match self.load_recent(owner, config) {
            Ok(texts) => {
                if self.lexical.seed_if_absent(owner, &texts) {
                    tracing::debug!(owner = %owner, loaded = texts.len(), "Lazily rehydrated owner");
                }
            },
            Err(err) => {
                tracing::warn!(owner = %owner, error = %err, "Lazy rehydration failed");
            },
        }
    }

    fn lock_cleared(&self) -> MutexGuard<'_, HashSet<OwnerId>> {
        self.cleared.lock().unwrap_or_else(recover_lock("cleared_owners"))
    }
}
