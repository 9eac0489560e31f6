//! Character trigram shingling and Jaccard similarity.
//!
//! Text is normalized (lowercased, punctuation stripped, whitespace
//! collapsed) and padded with two spaces on each side before taking every
//! 3-character window, so word boundaries contribute their own shingles.
//! Normalized text shorter than three characters is its own single shingle.

use lru::LruCache;
use regex::Regex;
use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

/// Shingle width in characters.
pub const SHINGLE_SIZE: usize = 3;

const CACHE_SHARDS: usize = 16;

#[allow(clippy::expect_used)] // Literal pattern, checked by tests.
static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("static regex: non-word characters"));

/// Set of trigram shingles for one text.
pub type ShingleSet = HashSet<String>;

/// Lowercases, strips characters outside word characters and whitespace,
/// collapses whitespace runs and trims.
///
/// ```rust
/// use echoless::services::deduplication::normalize;
///
/// assert_eq!(normalize("  Keep   GOING!! "), "keep going");
/// ```
#[must_use]
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = NON_WORD.replace_all(&lowered, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Builds the shingle set of `text` without caching.
#[must_use]
pub fn shingle_set(text: &str) -> ShingleSet {
    shingles_of_normalized(normalize(text))
}

fn shingles_of_normalized(normalized: String) -> ShingleSet {
    let chars: Vec<char> = normalized.chars().collect();
    if chars.len() < SHINGLE_SIZE {
        return HashSet::from([normalized]);
    }

    let padded: Vec<char> = ['\u{20}'; 2]
        .into_iter()
        .chain(chars)
        .chain(['\u{20}'; 2])
        .collect();

    padded
        .windows(SHINGLE_SIZE)
        .map(|window| window.iter().collect())
        .collect()
}

/// Jaccard index `|a ∩ b| / |a ∪ b|`; 0.0 when both sets are empty.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn jaccard(a: &ShingleSet, b: &ShingleSet) -> f32 {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let intersection = small.iter().filter(|s| large.contains(*s)).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    intersection as f32 / union as f32
}

fn is_blank(set: &ShingleSet) -> bool {
    set.len() == 1 && set.contains("")
}

/// Shingle engine with a bounded cache shared across owners.
///
/// The cache is keyed by normalized text, so texts differing only in case,
/// punctuation or spacing share one entry. It is split into 16
/// mutex-guarded shards by key hash. Each shard evicts its oldest-inserted
/// entry first: lookups do not refresh an entry's position.
///
/// # Example
///
/// ```rust
/// use echoless::services::deduplication::ShingleEngine;
///
/// let engine = ShingleEngine::new(1_000);
/// assert!((engine.similarity("Keep going!", "keep going") - 1.0).abs() < f32::EPSILON);
/// assert_eq!(engine.similarity("", ""), 0.0);
/// ```
pub struct ShingleEngine {
    shards: Vec<Mutex<LruCache<String, Arc<ShingleSet>>>>,
}

impl std::fmt::Debug for ShingleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShingleEngine")
            .field("shards", &self.shards.len())
            .field("cached", &self.cached_entries())
            .finish()
    }
}

impl ShingleEngine {
    /// Creates an engine caching up to roughly `capacity` distinct texts.
    ///
    /// Capacity is split evenly across shards (at least one entry each).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let per_shard =
            NonZeroUsize::new(capacity.div_ceil(CACHE_SHARDS)).unwrap_or(NonZeroUsize::MIN);
        let shards = (0..CACHE_SHARDS)
            .map(|_| Mutex::new(LruCache::new(per_shard)))
            .collect();
        Self { shards }
    }

    /// Returns the shingle set of `text`, computing and caching it on a miss.
    pub fn shingles(&self, text: &str) -> Arc<ShingleSet> {
        let key = normalize(text);
        let shard = self.shard(&key);

        if let Some(hit) = lock_shard(shard).peek(&key) {
            metrics::counter!("shingle_cache_lookups_total", "result" => "hit").increment(1);
            return Arc::clone(hit);
        }
        metrics::counter!("shingle_cache_lookups_total", "result" => "miss").increment(1);

        // Computed outside the lock; a concurrent miss on the same text just
        // stores an equal set twice.
        let set = Arc::new(shingles_of_normalized(key.clone()));
        lock_shard(shard).put(key, Arc::clone(&set));
        set
    }

    /// Jaccard similarity of the two texts' shingle sets, in `[0, 1]`.
    ///
    /// Two texts that both normalize to the empty string score 0.0.
    pub fn similarity(&self, a: &str, b: &str) -> f32 {
        let sa = self.shingles(a);
        let sb = self.shingles(b);
        if is_blank(&sa) && is_blank(&sb) {
            return 0.0;
        }
        jaccard(&sa, &sb)
    }

    /// Number of cached texts across all shards.
    pub fn cached_entries(&self) -> usize {
        self.shards.iter().map(|s| lock_shard(s).len()).sum()
    }

    /// Drops every cached entry.
    pub fn clear_cache(&self) {
        for shard in &self.shards {
            lock_shard(shard).clear();
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn shard(&self, text: &str) -> &Mutex<LruCache<String, Arc<ShingleSet>>> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        &self.shards[hasher.finish() as usize % self.shards.len()]
    }
}

fn lock_shard<T>(shard: &Mutex<T>) -> MutexGuard<'_, T> {
    shard.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("Shingle cache shard was poisoned, recovering");
        metrics::counter!("store_lock_poison_recovery_total", "lock" => "shingle_cache")
            .increment(1);
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test_case("Hello, World!", "hello world" ; "punctuation and case")]
    #[test_case("  a \t b\n\nc  ", "a b c" ; "whitespace runs")]
    #[test_case("!!!", "" ; "only punctuation")]
    #[test_case("Café déjà-vu", "café déjàvu" ; "unicode word characters")]
    fn test_normalize(input: &str, expected: &str) {
        assert_eq!(normalize(input), expected);
    }

    #[test]
    fn test_shingles_padded_windows() {
        let set = shingle_set("abc");
        let expected: ShingleSet = ["  a", " ab", "abc", "bc ", "c  "]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(set, expected);
    }

    #[test]
    fn test_short_text_is_single_shingle() {
        assert_eq!(shingle_set("Hi!"), HashSet::from(["hi".to_string()]));
        assert_eq!(shingle_set("?"), HashSet::from([String::new()]));
    }

    #[test]
    fn test_similarity_edge_cases() {
        let engine = ShingleEngine::new(100);
        assert!(approx_eq(engine.similarity("", ""), 0.0));
        assert!(approx_eq(engine.similarity("!!", "??"), 0.0));
        assert!(approx_eq(engine.similarity("a", "a"), 1.0));
        assert!(approx_eq(engine.similarity("a", "b"), 0.0));
        assert!(approx_eq(engine.similarity("", "abc"), 0.0));
    }

    #[test]
    fn test_similarity_identity_and_insensitivity() {
        let engine = ShingleEngine::new(100);
        let text = "Every day is a fresh start.";
        assert!(approx_eq(engine.similarity(text, text), 1.0));
        assert!(approx_eq(
            engine.similarity(text, "EVERY day, is a fresh start"),
            1.0
        ));
    }

    #[test]
    fn test_similarity_partial_overlap() {
        let engine = ShingleEngine::new(100);
        let s = engine.similarity("Keep going strong", "Keep going steady");
        assert!(s > 0.3 && s < 1.0, "similarity {s}");
        assert!(approx_eq(s, engine.similarity("Keep going steady", "Keep going strong")));
    }

    #[test]
    fn test_cache_reuses_sets() {
        let engine = ShingleEngine::new(100);
        let first = engine.shingles("same text");
        let second = engine.shingles("same text");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(engine.cached_entries(), 1);
        engine.clear_cache();
        assert_eq!(engine.cached_entries(), 0);
    }

    #[test]
    fn test_cache_keyed_by_normalized_text() {
        let engine = ShingleEngine::new(100);
        let first = engine.shingles("Hello!");
        let second = engine.shingles("  hello ");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(engine.cached_entries(), 1);
        assert_eq!(*first, shingle_set("hello"));
    }

    #[test]
    fn test_cache_is_bounded() {
        let engine = ShingleEngine::new(16);
        for i in 0..500 {
            let _ = engine.shingles(&format!("text number {i}"));
        }
        // One entry per shard at most.
        assert!(engine.cached_entries() <= 16);
    }

    #[test]
    fn test_cache_evicts_oldest_inserted() {
        let mut shard: LruCache<String, u8> = LruCache::new(NonZeroUsize::MIN.saturating_add(1));
        shard.put("a".to_string(), 1);
        shard.put("b".to_string(), 2);
        // peek does not refresh recency
        assert_eq!(shard.peek("a"), Some(&1));
        shard.put("c".to_string(), 3);
        assert!(!shard.contains("a"));
        assert!(shard.contains("b"));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_similarity_symmetric_and_bounded(a in ".{0,40}", b in ".{0,40}") {
                let engine = ShingleEngine::new(64);
                let ab = engine.similarity(&a, &b);
                let ba = engine.similarity(&b, &a);
                prop_assert!((0.0..=1.0).contains(&ab));
                prop_assert!((ab - ba).abs() < 1e-6);
            }

            #[test]
            fn prop_identity(text in "[a-zA-Z ]{1,40}") {
                let engine = ShingleEngine::new(64);
                prop_assume!(!normalize(&text).is_empty());
                prop_assert!((engine.similarity(&text, &text) - 1.0).abs() < 1e-6);
            }
        }
    }
}
