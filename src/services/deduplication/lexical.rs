//! Per-owner lexical duplicate detection.
//!
//! Each owner gets a [`MembershipFilter`] holding the trigram shingles of
//! every text they were shown, plus a bounded window of the raw texts
//! themselves. A candidate scores the fraction of its shingles the filter
//! reports present. Scores at or above the lexical threshold are then
//! confirmed against the raw window with a true Jaccard comparison, which
//! weeds out filter false positives and texts that merely reuse vocabulary
//! spread across many messages.
//!
//! The confirmation pass may only overturn a filter hit while the raw window
//! still holds every text ingested into the filter. Once a text has been
//! truncated from the window, aged past the confirmation window or arrived
//! through an imported filter, a hit without a confirming match keeps the
//! filter verdict.
//!
//! Owners live in an LRU registry capped at `max_tracked_owners`. The
//! registry mutex is held only to look up or insert an owner; filter work
//! happens under the owner's own `RwLock`.

use super::bloom::{FilterState, MembershipFilter};
use super::config::{DeduplicationConfig, LexicalSettings};
use super::shingles::{ShingleEngine, ShingleSet};
use super::recover_lock;
use super::types::{LexicalOutcome, OwnerLexicalStats};
use crate::Result;
use crate::clock::Clock;
use crate::models::OwnerId;
use crate::storage::RecentText;
use lru::LruCache;
use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::instrument;

/// Lexical state of one owner.
#[derive(Debug, Clone)]
struct OwnerLexicalState {
    filter: MembershipFilter,
    /// Newest first.
    recent: VecDeque<RecentText>,
    /// False once the filter holds a text that `recent` does not.
    window_complete: bool,
}

impl OwnerLexicalState {
    const fn new(filter: MembershipFilter, window_complete: bool) -> Self {
        Self {
            filter,
            recent: VecDeque::new(),
            window_complete,
        }
    }

    /// True when every ingested text is in `recent` and none is older than
    /// `since`.
    fn window_covers_filter(&self, since: u64) -> bool {
        self.window_complete && self.recent.iter().all(|recent| recent.created_at >= since)
    }
}

type SharedState = Arc<RwLock<OwnerLexicalState>>;

/// Sizing applied to owners created from now on.
#[derive(Debug, Clone)]
struct Limits {
    template: MembershipFilter,
    max_recent: usize,
}

impl Limits {
    fn from_config(config: &DeduplicationConfig) -> Result<Self> {
        Ok(Self {
            template: MembershipFilter::new(
                config.filter_expected_elements,
                config.filter_false_positive_rate,
            )?,
            max_recent: config.confirmation_max_texts,
        })
    }
}

/// Lexical deduplication over per-owner Bloom filters.
///
/// Never fails once constructed: unknown owners are simply never duplicates.
pub struct LexicalService {
    owners: Mutex<LruCache<OwnerId, SharedState>>,
    limits: RwLock<Limits>,
    shingles: Arc<ShingleEngine>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for LexicalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LexicalService")
            .field("owners", &self.owner_count())
            .finish_non_exhaustive()
    }
}

fn owner_capacity(config: &DeduplicationConfig) -> NonZeroUsize {
    NonZeroUsize::new(config.max_tracked_owners).unwrap_or(NonZeroUsize::MIN)
}

fn read_state(state: &SharedState) -> RwLockReadGuard<'_, OwnerLexicalState> {
    state.read().unwrap_or_else(recover_lock("owner_state"))
}

fn write_state(state: &SharedState) -> RwLockWriteGuard<'_, OwnerLexicalState> {
    state.write().unwrap_or_else(recover_lock("owner_state"))
}

#[allow(clippy::cast_precision_loss)]
fn filter_score(filter: &MembershipFilter, shingles: &ShingleSet) -> f32 {
    if shingles.is_empty() {
        return 0.0;
    }
    let present = shingles.iter().filter(|s| filter.contains(s)).count();
    present as f32 / shingles.len() as f32
}

impl LexicalService {
    /// Creates an empty service sized from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] if the filter sizing is invalid.
    pub fn new(
        config: &DeduplicationConfig,
        shingles: Arc<ShingleEngine>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Ok(Self {
            owners: Mutex::new(LruCache::new(owner_capacity(config))),
            limits: RwLock::new(Limits::from_config(config)?),
            shingles,
            clock,
        })
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Applies new sizing.
    ///
    /// Filter sizing and the raw-text window apply to owners created after
    /// the call; the owner capacity applies immediately (evicting the least
    /// recently used owners if it shrank).
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] if the filter sizing is invalid.
    pub fn apply_config(&self, config: &DeduplicationConfig) -> Result<()> {
        let limits = Limits::from_config(config)?;
        *self.limits.write().unwrap_or_else(recover_lock("lexical_limits")) = limits;

        let mut owners = self.lock_owners();
        owners.resize(owner_capacity(config));
        metrics::gauge!("deduplication_tracked_owners").set(owners.len() as f64);
        Ok(())
    }

    /// Records `text` as shown to `owner` now.
    pub fn add_text(&self, owner: &OwnerId, text: &str) {
        self.add_text_at(owner, text, self.clock.now());
    }

    /// Records `text` as shown to `owner` at `created_at`.
    pub fn add_text_at(&self, owner: &OwnerId, text: &str, created_at: u64) {
        let max_recent = self.read_limits().max_recent;
        let state = self.get_or_create(owner);
        let mut state = write_state(&state);
        self.ingest(&mut state, text, created_at, max_recent);
    }

    /// Fraction of `text`'s shingles present in the owner's filter, or
    /// `None` for an unknown owner.
    pub fn filter_score(&self, owner: &OwnerId, text: &str) -> Option<f32> {
        let state = self.lookup(owner)?;
        let shingles = self.shingles.shingles(text);
        let state = read_state(&state);
        Some(filter_score(&state.filter, &shingles))
    }

    /// Filter-only check: true when at least `threshold` of the candidate's
    /// shingles are present. Unknown owners are never duplicates.
    pub fn is_potential_duplicate(&self, owner: &OwnerId, text: &str, threshold: f32) -> bool {
        self.filter_score(owner, text)
            .is_some_and(|score| score >= threshold)
    }

    /// Filter check followed by the trigram confirmation pass.
    #[instrument(skip(self, text, settings), fields(owner = %owner, text_len = text.len()))]
    pub fn check(&self, owner: &OwnerId, text: &str, settings: &LexicalSettings) -> LexicalOutcome {
        let Some(state) = self.lookup(owner) else {
            return LexicalOutcome::unknown_owner();
        };

        let shingles = self.shingles.shingles(text);
        let since = self
            .clock
            .now()
            .saturating_sub(settings.confirmation_window_secs);
        let state = read_state(&state);

        let score = filter_score(&state.filter, &shingles);
        if score < settings.threshold {
            return LexicalOutcome {
                is_duplicate: false,
                filter_score: score,
                confirmed_similarity: None,
            };
        }

        let covered = state.window_covers_filter(since);
        let best = state
            .recent
            .iter()
            .filter(|recent| recent.created_at >= since)
            .map(|recent| self.shingles.similarity(text, &recent.text))
            .reduce(f32::max);
        drop(state);

        let Some(best) = best else {
            tracing::debug!(score, "Lexical hit with no recent text to confirm against");
            return LexicalOutcome {
                is_duplicate: true,
                filter_score: score,
                confirmed_similarity: None,
            };
        };

        let confirmed = best >= settings.confirmation_similarity;
        if !confirmed && !covered {
            metrics::counter!("deduplication_lexical_confirmations_total", "result" => "uncovered")
                .increment(1);
            tracing::debug!(score, best, "Raw window misses part of the filter, hit stands");
            return LexicalOutcome {
                is_duplicate: true,
                filter_score: score,
                confirmed_similarity: None,
            };
        }

        metrics::counter!(
            "deduplication_lexical_confirmations_total",
            "result" => if confirmed { "confirmed" } else { "rejected" }
        )
        .increment(1);
        tracing::debug!(score, best, confirmed, "Lexical confirmation pass");

        LexicalOutcome {
            is_duplicate: confirmed,
            filter_score: score,
            confirmed_similarity: Some(best),
        }
    }

    /// Replaces the owner's state with one rebuilt from `texts`.
    ///
    /// Returns the number of texts loaded.
    pub fn rehydrate(&self, owner: &OwnerId, texts: &[RecentText]) -> usize {
        let state = self.build_state(texts);
        let mut owners = self.lock_owners();
        self.insert_owner(&mut owners, owner, Arc::new(RwLock::new(state)));
        texts.len()
    }

    /// Like [`Self::rehydrate`], but leaves an already tracked owner alone.
    ///
    /// Returns true if the state was installed.
    pub fn seed_if_absent(&self, owner: &OwnerId, texts: &[RecentText]) -> bool {
        let state = self.build_state(texts);
        let mut owners = self.lock_owners();
        if owners.contains(owner) {
            return false;
        }
        self.insert_owner(&mut owners, owner, Arc::new(RwLock::new(state)));
        true
    }

    /// Exports the owner's filter.
    pub fn export(&self, owner: &OwnerId) -> Option<FilterState> {
        let state = self.lookup(owner)?;
        let state = read_state(&state);
        Some(state.filter.export())
    }

    /// Installs an exported filter for the owner, dropping its raw-text window.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvariantViolation`] if the state is inconsistent.
    pub fn import(&self, owner: &OwnerId, state: FilterState) -> Result<()> {
        let filter = MembershipFilter::import(state)?;
        let state = OwnerLexicalState::new(filter, false);
        let mut owners = self.lock_owners();
        self.insert_owner(&mut owners, owner, Arc::new(RwLock::new(state)));
        Ok(())
    }

    /// Diagnostics for one owner.
    pub fn stats(&self, owner: &OwnerId) -> Option<OwnerLexicalStats> {
        let state = self.lookup(owner)?;
        let state = read_state(&state);
        Some(OwnerLexicalStats {
            filter: state.filter.stats(),
            recent_texts: state.recent.len(),
        })
    }

    /// Drops the owner's state, or every owner's with `None`.
    ///
    /// Returns the owners that were tracked and are now gone. Clearing an
    /// untracked owner is a no-op.
    pub fn clear(&self, owner: Option<&OwnerId>) -> Vec<OwnerId> {
        let mut owners = self.lock_owners();
        let cleared = match owner {
            Some(owner) => owners
                .pop_entry(owner)
                .map(|(owner, _)| vec![owner])
                .unwrap_or_default(),
            None => {
                let all = owners.iter().map(|(owner, _)| owner.clone()).collect();
                owners.clear();
                all
            },
        };
        metrics::gauge!("deduplication_tracked_owners").set(owners.len() as f64);
        cleared
    }

    /// Number of owners with in-memory state.
    pub fn owner_count(&self) -> usize {
        self.lock_owners().len()
    }

    /// Returns true if the owner has in-memory state.
    pub fn contains_owner(&self, owner: &OwnerId) -> bool {
        self.lock_owners().contains(owner)
    }

    fn ingest(&self, state: &mut OwnerLexicalState, text: &str, created_at: u64, max_recent: usize) {
        for shingle in self.shingles.shingles(text).iter() {
            state.filter.add(shingle);
        }
        state.recent.push_front(RecentText {
            text: text.to_string(),
            created_at,
        });
        if state.recent.len() > max_recent {
            state.recent.truncate(max_recent);
            state.window_complete = false;
        }
    }

    /// Builds a fresh state from texts given newest first.
    fn build_state(&self, texts: &[RecentText]) -> OwnerLexicalState {
        let limits = self.read_limits();
        let (template, max_recent) = (limits.template.clone(), limits.max_recent);
        drop(limits);

        let mut state = OwnerLexicalState::new(template, true);
        for recent in texts.iter().rev() {
            self.ingest(&mut state, &recent.text, recent.created_at, max_recent);
        }
        state
    }

    fn lookup(&self, owner: &OwnerId) -> Option<SharedState> {
        self.lock_owners().get(owner).map(Arc::clone)
    }

    fn get_or_create(&self, owner: &OwnerId) -> SharedState {
        if let Some(state) = self.lookup(owner) {
            return state;
        }

        // Built outside the registry lock; a concurrent creator wins.
        let fresh = Arc::new(RwLock::new(self.build_state(&[])));
        let mut owners = self.lock_owners();
        if let Some(existing) = owners.get(owner) {
            return Arc::clone(existing);
        }
        self.insert_owner(&mut owners, owner, Arc::clone(&fresh));
        fresh
    }

    fn insert_owner(
        &self,
        owners: &mut LruCache<OwnerId, SharedState>,
        owner: &OwnerId,
        state: SharedState,
    ) {
        if let Some((evicted, _)) = owners.push(owner.clone(), state)
            && &evicted != owner
        {
            tracing::debug!(evicted = %evicted, "Evicted least recently used owner");
            metrics::counter!("deduplication_owner_evictions_total").increment(1);
        }
        metrics::gauge!("deduplication_tracked_owners").set(owners.len() as f64);
    }

    fn lock_owners(&self) -> MutexGuard<'_, LruCache<OwnerId, SharedState>> {
        self.owners.lock().unwrap_or_else(recover_lock("owner_registry"))
    }

    fn read_limits(&self) -> RwLockReadGuard<'_, Limits> {
        self.limits.read().unwrap_or_else(recover_lock("lexical_limits"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SECS_PER_DAY};

    const NOW: u64 = 1_700_000_000;

    fn service_with(config: &DeduplicationConfig) -> (LexicalService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(NOW));
        let service = LexicalService::new(
            config,
            Arc::new(ShingleEngine::new(config.shingle_cache_capacity)),
            clock.clone(),
        )
        .unwrap();
        (service, clock)
    }

    fn service() -> (LexicalService, Arc<ManualClock>) {
        service_with(&DeduplicationConfig::default())
    }

    fn settings() -> LexicalSettings {
        DeduplicationConfig::default().lexical_settings()
    }

    #[test]
    fn test_unknown_owner_is_never_duplicate() {
        let (lexical, _) = service();
        let owner = OwnerId::new("nobody");
        assert!(!lexical.is_potential_duplicate(&owner, "anything", 0.0));
        assert!(lexical.filter_score(&owner, "anything").is_none());
        assert_eq!(lexical.check(&owner, "anything", &settings()), LexicalOutcome::unknown_owner());
    }

    #[test]
    fn test_detects_exact_and_near_exact_repeats() {
        let (lexical, _) = service();
        let owner = OwnerId::new("u1");
        lexical.add_text(&owner, "Believe you can and you're halfway there.");

        assert!(lexical.is_potential_duplicate(&owner, "Believe you can and you're halfway there.", 0.8));
        assert!(lexical.is_potential_duplicate(&owner, "believe you can, and youre halfway there!", 0.8));
        assert!(!lexical.is_potential_duplicate(&owner, "Quiet mornings bring clarity to busy minds.", 0.8));

        let outcome = lexical.check(&owner, "BELIEVE you can and you're halfway there", &settings());
        assert!(outcome.is_duplicate);
        assert!(outcome.confirmed_similarity.is_some_and(|s| s > 0.99));
    }

    #[test]
    fn test_owners_are_isolated() {
        let (lexical, _) = service();
        lexical.add_text(&OwnerId::new("a"), "Shared wisdom for one owner only");
        assert!(!lexical.is_potential_duplicate(&OwnerId::new("b"), "Shared wisdom for one owner only", 0.5));
    }

    #[test]
    fn test_threshold_sensitivity() {
        let (lexical, _) = service();
        let owner = OwnerId::new("u1");
        lexical.add_text(&owner, "The sun will rise again tomorrow morning");
        let candidate = "The sun will rise again tomorrow evening";

        let score = lexical.filter_score(&owner, candidate).unwrap();
        assert!(score > 0.5 && score < 1.0, "score {score}");
        assert!(lexical.is_potential_duplicate(&owner, candidate, score));
        assert!(!lexical.is_potential_duplicate(&owner, candidate, (score + 1.0) / 2.0));
    }

    #[test]
    fn test_detects_repeat_and_ignores_unrelated() {
        let (lexical, _) = service();
        let owner = OwnerId::new("u1");
        lexical.add_text(&owner, "This is a test message");

        assert!(lexical.is_potential_duplicate(&owner, "This is a test message", 0.8));
        assert!(!lexical.is_potential_duplicate(&owner, "Completely unrelated content", 0.8));
    }

    #[test]
    fn test_prefix_candidate_threshold_sensitivity() {
        let (lexical, _) = service();
        let owner = OwnerId::new("u1");
        lexical.add_text(
            &owner,
            "Every journey worth taking begins with a single brave step, and every \
             step after it is a choice to keep walking forward.",
        );

        // Ten of the prefix's twelve padded shingles occur in the long text.
        let prefix = "Every jour";
        assert!(!lexical.is_potential_duplicate(&owner, prefix, 0.9));
        assert!(lexical.is_potential_duplicate(&owner, prefix, 0.3));
    }

    #[test]
    fn test_confirmation_rejects_partial_overlap() {
        let (lexical, _) = service();
        let owner = OwnerId::new("u1");
        lexical.add_text(&owner, "The sun will rise again tomorrow morning");

        let strict = LexicalSettings {
            threshold: 0.5,
            confirmation_similarity: 0.99,
            ..settings()
        };
        let outcome = lexical.check(&owner, "The sun will rise again tomorrow evening", &strict);
        assert!(outcome.filter_score >= 0.5);
        assert!(!outcome.is_duplicate);
        assert!(outcome.confirmed_similarity.is_some_and(|s| s < 0.99));
    }

    #[test]
    fn test_filter_verdict_stands_without_recent_texts() {
        let config = DeduplicationConfig::default().with_confirmation_max_texts(0);
        let (lexical, _) = service_with(&config);
        let owner = OwnerId::new("u1");
        lexical.add_text(&owner, "Stay curious and kind");

        let outcome = lexical.check(&owner, "Stay curious and kind", &config.lexical_settings());
        assert!(outcome.is_duplicate);
        assert!(outcome.confirmed_similarity.is_none());
        assert_eq!(lexical.stats(&owner).unwrap().recent_texts, 0);
    }

    #[test]
    fn test_confirmation_window_expires() {
        let (lexical, clock) = service();
        let owner = OwnerId::new("u1");
        lexical.add_text(&owner, "Stay curious and kind");
        clock.advance_secs(8 * SECS_PER_DAY);

        // Outside the window the filter estimate stands.
        let outcome = lexical.check(&owner, "Stay curious and kind", &settings());
        assert!(outcome.is_duplicate);
        assert!(outcome.confirmed_similarity.is_none());
    }

    #[test]
    fn test_aged_out_source_keeps_filter_verdict() {
        let (lexical, clock) = service();
        let owner = OwnerId::new("u1");
        lexical.add_text(&owner, "Stay curious and kind");
        clock.advance_secs(8 * SECS_PER_DAY);
        lexical.add_text(&owner, "Rivers carve canyons with patience");

        let outcome = lexical.check(&owner, "Stay curious and kind", &settings());
        assert!(outcome.is_duplicate);
        assert!(outcome.confirmed_similarity.is_none());
        assert!((outcome.similarity() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_truncated_source_keeps_filter_verdict() {
        let (lexical, _) = service();
        let owner = OwnerId::new("u1");
        lexical.add_text(&owner, "Stay curious and kind");
        for i in 0..DeduplicationConfig::default().confirmation_max_texts {
            lexical.add_text(&owner, &format!("tide table entry {i} for the harbour"));
        }

        let outcome = lexical.check(&owner, "Stay curious and kind", &settings());
        assert!(outcome.is_duplicate);
        assert!(outcome.confirmed_similarity.is_none());
    }

    #[test]
    fn test_imported_filter_keeps_filter_verdict() {
        let (source, _) = service();
        let owner = OwnerId::new("u1");
        source.add_text(&owner, "Carry this filter elsewhere");

        let (lexical, _) = service();
        lexical.import(&owner, source.export(&owner).unwrap()).unwrap();
        lexical.add_text(&owner, "Rivers carve canyons with patience");

        let outcome = lexical.check(&owner, "Carry this filter elsewhere", &settings());
        assert!(outcome.is_duplicate);
    }

    #[test]
    fn test_complete_window_still_rejects_after_rehydrate() {
        let (lexical, _) = service();
        let owner = OwnerId::new("u1");
        lexical.rehydrate(
            &owner,
            &[RecentText {
                text: "The sun will rise again tomorrow morning".to_string(),
                created_at: NOW - 10,
            }],
        );

        let strict = LexicalSettings {
            threshold: 0.5,
            confirmation_similarity: 0.99,
            ..settings()
        };
        let outcome = lexical.check(&owner, "The sun will rise again tomorrow evening", &strict);
        assert!(!outcome.is_duplicate);
        assert!(outcome.confirmed_similarity.is_some());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (lexical, _) = service();
        let owner = OwnerId::new("u1");
        lexical.add_text(&owner, "Small steps matter");

        assert_eq!(lexical.clear(Some(&owner)), vec![owner.clone()]);
        assert!(!lexical.is_potential_duplicate(&owner, "Small steps matter", 0.8));
        assert!(lexical.clear(Some(&owner)).is_empty());
        assert!(!lexical.is_potential_duplicate(&owner, "Small steps matter", 0.8));
    }

    #[test]
    fn test_clear_all() {
        let (lexical, _) = service();
        lexical.add_text(&OwnerId::new("a"), "one");
        lexical.add_text(&OwnerId::new("b"), "two");
        let mut cleared = lexical.clear(None);
        cleared.sort();
        assert_eq!(cleared, vec![OwnerId::new("a"), OwnerId::new("b")]);
        assert_eq!(lexical.owner_count(), 0);
    }

    #[test]
    fn test_lru_owner_eviction() {
        let config = DeduplicationConfig::default().with_max_tracked_owners(2);
        let (lexical, _) = service_with(&config);
        lexical.add_text(&OwnerId::new("a"), "first owner text");
        lexical.add_text(&OwnerId::new("b"), "second owner text");
        // Touch "a" so "b" is the least recently used.
        let _ = lexical.filter_score(&OwnerId::new("a"), "x");
        lexical.add_text(&OwnerId::new("c"), "third owner text");

        assert_eq!(lexical.owner_count(), 2);
        assert!(lexical.contains_owner(&OwnerId::new("a")));
        assert!(!lexical.contains_owner(&OwnerId::new("b")));
    }

    #[test]
    fn test_rehydrate_and_seed() {
        let (lexical, _) = service();
        let owner = OwnerId::new("u1");
        let texts = vec![
            RecentText { text: "newest message here".to_string(), created_at: NOW - 10 },
            RecentText { text: "older message there".to_string(), created_at: NOW - 100 },
        ];

        assert!(lexical.seed_if_absent(&owner, &texts));
        assert!(!lexical.seed_if_absent(&owner, &[]));
        assert!(lexical.is_potential_duplicate(&owner, "older message there", 0.8));
        assert_eq!(lexical.stats(&owner).unwrap().recent_texts, 2);

        assert_eq!(lexical.rehydrate(&owner, &texts[..1]), 1);
        assert!(!lexical.is_potential_duplicate(&owner, "older message there", 0.95));
    }

    #[test]
    fn test_export_import() {
        let (lexical, _) = service();
        let owner = OwnerId::new("u1");
        lexical.add_text(&owner, "Carry this filter elsewhere");
        let state = lexical.export(&owner).unwrap();

        let (other, _) = service();
        other.import(&owner, state).unwrap();
        assert!(other.is_potential_duplicate(&owner, "Carry this filter elsewhere", 0.9));
        assert_eq!(other.stats(&owner).unwrap().recent_texts, 0);
    }

    #[test]
    fn test_apply_config_affects_new_owners() {
        let (lexical, _) = service();
        let owner = OwnerId::new("old");
        lexical.add_text(&owner, "before");
        let old_size = lexical.stats(&owner).unwrap().filter.size;

        let config = DeduplicationConfig::default().with_filter_sizing(100, 0.05);
        lexical.apply_config(&config).unwrap();
        lexical.add_text(&OwnerId::new("new"), "after");

        assert_eq!(lexical.stats(&owner).unwrap().filter.size, old_size);
        assert!(lexical.stats(&OwnerId::new("new")).unwrap().filter.size < old_size);
    }
}
