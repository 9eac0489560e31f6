//! Deduplication configuration.
//!
//! [`DeduplicationConfig`] is a typed, validated snapshot. Partial updates
//! arrive as a [`DeduplicationConfigPatch`] (unknown keys are rejected) and are
//! applied with the pure [`merge`] function, which validates the result.

use crate::clock::SECS_PER_DAY;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Configuration for the deduplication service.
///
/// # Environment Variables
///
/// | Variable | Type | Default |
/// |----------|------|---------|
/// | `ECHOLESS_DEDUP_ENABLE_LEXICAL` | bool | `true` |
/// | `ECHOLESS_DEDUP_ENABLE_SEMANTIC` | bool | `true` |
/// | `ECHOLESS_DEDUP_LEXICAL_THRESHOLD` | f32 | `0.8` |
/// | `ECHOLESS_DEDUP_CONFIRMATION_SIMILARITY` | f32 | `0.7` |
/// | `ECHOLESS_DEDUP_CONFIRMATION_WINDOW_DAYS` | u32 | `7` |
/// | `ECHOLESS_DEDUP_CONFIRMATION_MAX_TEXTS` | usize | `50` |
/// | `ECHOLESS_DEDUP_SEMANTIC_DISTANCE_THRESHOLD` | f32 | `0.15` |
/// | `ECHOLESS_DEDUP_RETENTION_DAYS` | u32 | `30` |
/// | `ECHOLESS_DEDUP_GRACE_PERIOD_DAYS` | u32 | `7` |
/// | `ECHOLESS_DEDUP_FILTER_EXPECTED_ELEMENTS` | usize | `10000` |
/// | `ECHOLESS_DEDUP_FILTER_FALSE_POSITIVE_RATE` | f64 | `0.01` |
/// | `ECHOLESS_DEDUP_MAX_RESULTS` | usize | `5` |
/// | `ECHOLESS_DEDUP_SHINGLE_CACHE_CAPACITY` | usize | `1000` |
/// | `ECHOLESS_DEDUP_MAX_TRACKED_OWNERS` | usize | `10000` |
/// | `ECHOLESS_DEDUP_REHYDRATE_ON_FIRST_USE` | bool | `false` |
/// | `ECHOLESS_DEDUP_SHORT_CIRCUIT_LEXICAL` | bool | `true` |
///
/// # Example
///
/// ```rust
/// use echoless::services::deduplication::DeduplicationConfig;
///
/// let config = DeduplicationConfig::default()
///     .with_semantic_distance_threshold(0.1)
///     .with_retention_days(14);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.retention_secs(), 14 * 86_400);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeduplicationConfig {
    /// Run the lexical (Bloom filter) layer.
    pub enable_lexical: bool,
    /// Run the semantic (embedding) layer.
    pub enable_semantic: bool,
    /// Fraction of a candidate's shingles that must be present in the
    /// owner's filter for a lexical hit, in `(0, 1]`.
    pub lexical_threshold: f32,
    /// Minimum Jaccard similarity against a recent raw text to confirm a
    /// lexical hit, in `[0, 1]`.
    pub confirmation_similarity: f32,
    /// Age limit of raw texts used for confirmation, in days.
    pub confirmation_window_days: u32,
    /// Raw texts kept per owner for confirmation (0 disables confirmation).
    pub confirmation_max_texts: usize,
    /// Maximum cosine distance counted as a semantic duplicate, in `[0, 1]`.
    pub semantic_distance_threshold: f32,
    /// Semantic comparisons only consider content this recent, in days.
    pub retention_days: u32,
    /// Extra days before cleanup nulls old embeddings.
    pub grace_period_days: u32,
    /// Per-owner filter capacity.
    pub filter_expected_elements: usize,
    /// Per-owner filter target false-positive rate, in `(0, 1)`.
    pub filter_false_positive_rate: f64,
    /// Maximum semantic matches reported.
    pub max_results: usize,
    /// Distinct texts kept in the shared shingle cache.
    pub shingle_cache_capacity: usize,
    /// Owners kept in memory before the least recently used is evicted.
    pub max_tracked_owners: usize,
    /// Load an owner's recent history from the store the first time the
    /// owner is seen.
    pub rehydrate_on_first_use: bool,
    /// Most recent texts loaded into an owner's filter on rehydration.
    pub rehydrate_max_texts: usize,
    /// Skip the semantic layer when the lexical layer already fired.
    pub short_circuit_lexical: bool,
}

impl Default for DeduplicationConfig {
    fn default() -> Self {
        Self {
            enable_lexical: true,
            enable_semantic: true,
            lexical_threshold: 0.8,
            confirmation_similarity: 0.7,
            confirmation_window_days: 7,
            confirmation_max_texts: 50,
            semantic_distance_threshold: 0.15,
            retention_days: 30,
            grace_period_days: 7,
            filter_expected_elements: 10_000,
            filter_false_positive_rate: 0.01,
            max_results: 5,
            shingle_cache_capacity: 1000,
            max_tracked_owners: 10_000,
            rehydrate_on_first_use: false,
            rehydrate_max_texts: 250,
            short_circuit_lexical: true,
        }
    }
}

/// Settings the lexical layer needs for one check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LexicalSettings {
    /// Filter score needed for a hit.
    pub threshold: f32,
    /// Jaccard similarity needed to confirm a hit.
    pub confirmation_similarity: f32,
    /// Age limit of raw texts used for confirmation, in seconds.
    pub confirmation_window_secs: u64,
}

impl DeduplicationConfig {
    /// Loads defaults overridden by `ECHOLESS_DEDUP_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a variable does not parse or the
    /// resulting configuration is invalid.
    pub fn from_env() -> Result<Self> {
        merge(&Self::default(), &DeduplicationConfigPatch::from_env()?)
    }

    /// Checks every field against its allowed range.
    ///
    /// Values are never clamped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        fn fail(message: String) -> Result<()> {
            Err(Error::Configuration(message))
        }

        if !(self.lexical_threshold > 0.0 && self.lexical_threshold <= 1.0) {
            return fail(format!(
                "lexical_threshold must be in (0, 1], got {}",
                self.lexical_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.confirmation_similarity) {
            return fail(format!(
                "confirmation_similarity must be in [0, 1], got {}",
                self.confirmation_similarity
            ));
        }
        if self.confirmation_window_days == 0 {
            return fail("confirmation_window_days must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.semantic_distance_threshold) {
            return fail(format!(
                "semantic_distance_threshold must be in [0, 1], got {}",
                self.semantic_distance_threshold
            ));
        }
        if self.retention_days == 0 {
            return fail("retention_days must be > 0".to_string());
        }
        if self.filter_expected_elements == 0 {
            return fail("filter_expected_elements must be > 0".to_string());
        }
        if !(self.filter_false_positive_rate > 0.0 && self.filter_false_positive_rate < 1.0) {
            return fail(format!(
                "filter_false_positive_rate must be in (0, 1), got {}",
                self.filter_false_positive_rate
            ));
        }
        if self.max_results == 0 {
            return fail("max_results must be > 0".to_string());
        }
        if self.shingle_cache_capacity == 0 {
            return fail("shingle_cache_capacity must be > 0".to_string());
        }
        if self.max_tracked_owners == 0 {
            return fail("max_tracked_owners must be > 0".to_string());
        }
        if self.rehydrate_max_texts == 0 {
            return fail("rehydrate_max_texts must be > 0".to_string());
        }
        Ok(())
    }

    /// Retention window in seconds.
    #[must_use]
    pub const fn retention_secs(&self) -> u64 {
        self.retention_days as u64 * SECS_PER_DAY
    }

    /// Age at which cleanup nulls an embedding, in seconds.
    #[must_use]
    pub const fn cleanup_age_secs(&self) -> u64 {
        (self.retention_days as u64 + self.grace_period_days as u64) * SECS_PER_DAY
    }

    /// Settings for the lexical layer.
    #[must_use]
    pub const fn lexical_settings(&self) -> LexicalSettings {
        LexicalSettings {
            threshold: self.lexical_threshold,
            confirmation_similarity: self.confirmation_similarity,
            confirmation_window_secs: self.confirmation_window_days as u64 * SECS_PER_DAY,
        }
    }

    /// Builder method to toggle the lexical layer.
    #[must_use]
    pub const fn with_lexical(mut self, enabled: bool) -> Self {
        self.enable_lexical = enabled;
        self
    }

    /// Builder method to toggle the semantic layer.
    #[must_use]
    pub const fn with_semantic(mut self, enabled: bool) -> Self {
        self.enable_semantic = enabled;
        self
    }

    /// Builder method to set the lexical threshold.
    #[must_use]
    pub const fn with_lexical_threshold(mut self, threshold: f32) -> Self {
        self.lexical_threshold = threshold;
        self
    }

    /// Builder method to set the confirmation similarity.
    #[must_use]
    pub const fn with_confirmation_similarity(mut self, similarity: f32) -> Self {
        self.confirmation_similarity = similarity;
        self
    }

    /// Builder method to set the confirmation window.
    #[must_use]
    pub const fn with_confirmation_window_days(mut self, days: u32) -> Self {
        self.confirmation_window_days = days;
        self
    }

    /// Builder method to set the number of raw texts kept for confirmation.
    #[must_use]
    pub const fn with_confirmation_max_texts(mut self, max: usize) -> Self {
        self.confirmation_max_texts = max;
        self
    }

    /// Builder method to set the semantic distance threshold.
    #[must_use]
    pub const fn with_semantic_distance_threshold(mut self, threshold: f32) -> Self {
        self.semantic_distance_threshold = threshold;
        self
    }

    /// Builder method to set the retention window.
    #[must_use]
    pub const fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    /// Builder method to set the cleanup grace period.
    #[must_use]
    pub const fn with_grace_period_days(mut self, days: u32) -> Self {
        self.grace_period_days = days;
        self
    }

    /// Builder method to size per-owner filters.
    #[must_use]
    pub const fn with_filter_sizing(mut self, expected_elements: usize, fp_rate: f64) -> Self {
        self.filter_expected_elements = expected_elements;
        self.filter_false_positive_rate = fp_rate;
        self
    }

    /// Builder method to set the maximum number of semantic matches.
    #[must_use]
    pub const fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    /// Builder method to set the shingle cache capacity.
    #[must_use]
    pub const fn with_shingle_cache_capacity(mut self, capacity: usize) -> Self {
        self.shingle_cache_capacity = capacity;
        self
    }

    /// Builder method to set the tracked-owner capacity.
    #[must_use]
    pub const fn with_max_tracked_owners(mut self, max: usize) -> Self {
        self.max_tracked_owners = max;
        self
    }

    /// Builder method to toggle lazy rehydration.
    #[must_use]
    pub const fn with_rehydrate_on_first_use(mut self, enabled: bool) -> Self {
        self.rehydrate_on_first_use = enabled;
        self
    }

    /// Builder method to set the rehydration limit.
    #[must_use]
    pub const fn with_rehydrate_max_texts(mut self, max: usize) -> Self {
        self.rehydrate_max_texts = max;
        self
    }

    /// Builder method to toggle the lexical short circuit.
    #[must_use]
    pub const fn with_short_circuit_lexical(mut self, enabled: bool) -> Self {
        self.short_circuit_lexical = enabled;
        self
    }
}

/// Partial configuration update.
///
/// Every field is optional; `None` keeps the base value. Unknown keys are
/// rejected when deserializing.
///
/// ```rust
/// use echoless::services::deduplication::{DeduplicationConfig, DeduplicationConfigPatch, merge};
///
/// let patch: DeduplicationConfigPatch = toml::from_str("retention_days = 10").unwrap();
/// let merged = merge(&DeduplicationConfig::default(), &patch)?;
/// assert_eq!(merged.retention_days, 10);
///
/// assert!(toml::from_str::<DeduplicationConfigPatch>("retention = 10").is_err());
/// # Ok::<(), echoless::Error>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeduplicationConfigPatch {
    /// See [`DeduplicationConfig::enable_lexical`].
    pub enable_lexical: Option<bool>,
    /// See [`DeduplicationConfig::enable_semantic`].
    pub enable_semantic: Option<bool>,
    /// See [`DeduplicationConfig::lexical_threshold`].
    pub lexical_threshold: Option<f32>,
    /// See [`DeduplicationConfig::confirmation_similarity`].
    pub confirmation_similarity: Option<f32>,
    /// See [`DeduplicationConfig::confirmation_window_days`].
    pub confirmation_window_days: Option<u32>,
    /// See [`DeduplicationConfig::confirmation_max_texts`].
    pub confirmation_max_texts: Option<usize>,
    /// See [`DeduplicationConfig::semantic_distance_threshold`].
    pub semantic_distance_threshold: Option<f32>,
    /// See [`DeduplicationConfig::retention_days`].
    pub retention_days: Option<u32>,
    /// See [`DeduplicationConfig::grace_period_days`].
    pub grace_period_days: Option<u32>,
    /// See [`DeduplicationConfig::filter_expected_elements`].
    pub filter_expected_elements: Option<usize>,
    /// See [`DeduplicationConfig::filter_false_positive_rate`].
    pub filter_false_positive_rate: Option<f64>,
    /// See [`DeduplicationConfig::max_results`].
    pub max_results: Option<usize>,
    /// See [`DeduplicationConfig::shingle_cache_capacity`].
    pub shingle_cache_capacity: Option<usize>,
    /// See [`DeduplicationConfig::max_tracked_owners`].
    pub max_tracked_owners: Option<usize>,
    /// See [`DeduplicationConfig::rehydrate_on_first_use`].
    pub rehydrate_on_first_use: Option<bool>,
    /// See [`DeduplicationConfig::rehydrate_max_texts`].
    pub rehydrate_max_texts: Option<usize>,
    /// See [`DeduplicationConfig::short_circuit_lexical`].
    pub short_circuit_lexical: Option<bool>,
}

fn env_value<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Configuration(format!("{name}: cannot parse '{raw}'"))),
        Err(_) => Ok(None),
    }
}

fn env_flag(name: &str) -> Result<Option<bool>> {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(Error::Configuration(format!(
                "{name}: expected a boolean, got '{raw}'"
            ))),
        },
        Err(_) => Ok(None),
    }
}

impl DeduplicationConfigPatch {
    /// Reads every `ECHOLESS_DEDUP_*` variable that is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a set variable does not parse.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            enable_lexical: env_flag("ECHOLESS_DEDUP_ENABLE_LEXICAL")?,
            enable_semantic: env_flag("ECHOLESS_DEDUP_ENABLE_SEMANTIC")?,
            lexical_threshold: env_value("ECHOLESS_DEDUP_LEXICAL_THRESHOLD")?,
            confirmation_similarity: env_value("ECHOLESS_DEDUP_CONFIRMATION_SIMILARITY")?,
            confirmation_window_days: env_value("ECHOLESS_DEDUP_CONFIRMATION_WINDOW_DAYS")?,
            confirmation_max_texts: env_value("ECHOLESS_DEDUP_CONFIRMATION_MAX_TEXTS")?,
            semantic_distance_threshold: env_value("ECHOLESS_DEDUP_SEMANTIC_DISTANCE_THRESHOLD")?,
            retention_days: env_value("ECHOLESS_DEDUP_RETENTION_DAYS")?,
            grace_period_days: env_value("ECHOLESS_DEDUP_GRACE_PERIOD_DAYS")?,
            filter_expected_elements: env_value("ECHOLESS_DEDUP_FILTER_EXPECTED_ELEMENTS")?,
            filter_false_positive_rate: env_value("ECHOLESS_DEDUP_FILTER_FALSE_POSITIVE_RATE")?,
            max_results: env_value("ECHOLESS_DEDUP_MAX_RESULTS")?,
            shingle_cache_capacity: env_value("ECHOLESS_DEDUP_SHINGLE_CACHE_CAPACITY")?,
            max_tracked_owners: env_value("ECHOLESS_DEDUP_MAX_TRACKED_OWNERS")?,
            rehydrate_on_first_use: env_flag("ECHOLESS_DEDUP_REHYDRATE_ON_FIRST_USE")?,
            rehydrate_max_texts: env_value("ECHOLESS_DEDUP_REHYDRATE_MAX_TEXTS")?,
            short_circuit_lexical: env_flag("ECHOLESS_DEDUP_SHORT_CIRCUIT_LEXICAL")?,
        })
    }

    /// Returns true if the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Applies `patch` over `base` and validates the result.
///
/// `base` is left untouched.
///
/// # Errors
///
/// Returns [`Error::Configuration`] if the merged configuration is invalid.
pub fn merge(
    base: &DeduplicationConfig,
    patch: &DeduplicationConfigPatch,
) -> Result<DeduplicationConfig> {
    let merged = DeduplicationConfig {
        enable_lexical: patch.enable_lexical.unwrap_or(base.enable_lexical),
        enable_semantic: patch.enable_semantic.unwrap_or(base.enable_semantic),
        lexical_threshold: patch.lexical_threshold.unwrap_or(base.lexical_threshold),
        confirmation_similarity: patch
            .confirmation_similarity
            .unwrap_or(base.confirmation_similarity),
        confirmation_window_days: patch
            .confirmation_window_days
            .unwrap_or(base.confirmation_window_days),
        confirmation_max_texts: patch
            .confirmation_max_texts
            .unwrap_or(base.confirmation_max_texts),
        semantic_distance_threshold: patch
            .semantic_distance_threshold
            .unwrap_or(base.semantic_distance_threshold),
        retention_days: patch.retention_days.unwrap_or(base.retention_days),
        grace_period_days: patch.grace_period_days.unwrap_or(base.grace_period_days),
        filter_expected_elements: patch
            .filter_expected_elements
            .unwrap_or(base.filter_expected_elements),
        filter_false_positive_rate: patch
            .filter_false_positive_rate
            .unwrap_or(base.filter_false_positive_rate),
        max_results: patch.max_results.unwrap_or(base.max_results),
        shingle_cache_capacity: patch
            .shingle_cache_capacity
            .unwrap_or(base.shingle_cache_capacity),
        max_tracked_owners: patch.max_tracked_owners.unwrap_or(base.max_tracked_owners),
        rehydrate_on_first_use: patch
            .rehydrate_on_first_use
            .unwrap_or(base.rehydrate_on_first_use),
        rehydrate_max_texts: patch.rehydrate_max_texts.unwrap_or(base.rehydrate_max_texts),
        short_circuit_lexical: patch
            .short_circuit_lexical
            .unwrap_or(base.short_circuit_lexical),
    };
    merged.validate()?;
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_defaults_are_valid() {
        let config = DeduplicationConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.enable_lexical && config.enable_semantic);
        assert!((config.semantic_distance_threshold - 0.15).abs() < f32::EPSILON);
        assert!((config.lexical_threshold - 0.8).abs() < f32::EPSILON);
        assert_eq!(config.retention_days, 30);
        assert_eq!(config.grace_period_days, 7);
        assert_eq!(config.cleanup_age_secs(), 37 * SECS_PER_DAY);
    }

    #[test_case(DeduplicationConfig::default().with_semantic_distance_threshold(1.5) ; "distance above one")]
    #[test_case(DeduplicationConfig::default().with_semantic_distance_threshold(-0.1) ; "negative distance")]
    #[test_case(DeduplicationConfig::default().with_lexical_threshold(0.0) ; "zero lexical threshold")]
    #[test_case(DeduplicationConfig::default().with_confirmation_similarity(1.1) ; "confirmation above one")]
    #[test_case(DeduplicationConfig::default().with_retention_days(0) ; "zero retention")]
    #[test_case(DeduplicationConfig::default().with_filter_sizing(0, 0.01) ; "empty filter")]
    #[test_case(DeduplicationConfig::default().with_filter_sizing(10, 1.0) ; "fp rate of one")]
    #[test_case(DeduplicationConfig::default().with_max_results(0) ; "zero results")]
    #[test_case(DeduplicationConfig::default().with_max_tracked_owners(0) ; "zero owners")]
    #[test_case(DeduplicationConfig::default().with_rehydrate_max_texts(0) ; "zero rehydrate texts")]
    #[test_case(DeduplicationConfig::default().with_shingle_cache_capacity(0) ; "zero cache")]
    fn test_invalid_config_rejected(config: DeduplicationConfig) {
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_boundary_values_accepted() {
        let config = DeduplicationConfig::default()
            .with_semantic_distance_threshold(0.0)
            .with_lexical_threshold(1.0)
            .with_confirmation_similarity(0.0)
            .with_confirmation_max_texts(0)
            .with_grace_period_days(0);
        assert!(config.validate().is_ok());

        let config = DeduplicationConfig::default().with_semantic_distance_threshold(1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_merge_is_pure_and_partial() {
        let base = DeduplicationConfig::default();
        let patch = DeduplicationConfigPatch {
            semantic_distance_threshold: Some(0.2),
            enable_lexical: Some(false),
            ..DeduplicationConfigPatch::default()
        };

        let merged = merge(&base, &patch).unwrap();
        assert!((merged.semantic_distance_threshold - 0.2).abs() < f32::EPSILON);
        assert!(!merged.enable_lexical);
        assert_eq!(merged.retention_days, base.retention_days);
        assert_eq!(base, DeduplicationConfig::default());
    }

    #[test]
    fn test_merge_rejects_invalid_result() {
        let patch = DeduplicationConfigPatch {
            retention_days: Some(0),
            ..DeduplicationConfigPatch::default()
        };
        assert!(matches!(
            merge(&DeduplicationConfig::default(), &patch),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_patch() {
        assert!(DeduplicationConfigPatch::default().is_empty());
        let merged = merge(
            &DeduplicationConfig::default(),
            &DeduplicationConfigPatch::default(),
        )
        .unwrap();
        assert_eq!(merged, DeduplicationConfig::default());
    }

    #[test]
    fn test_patch_rejects_unknown_keys() {
        let err = serde_json::from_str::<DeduplicationConfigPatch>(r#"{"treshold": 0.5}"#);
        assert!(err.is_err());
        let ok: DeduplicationConfigPatch =
            serde_json::from_str(r#"{"max_results": 3}"#).unwrap();
        assert_eq!(ok.max_results, Some(3));
    }

    #[test]
    fn test_lexical_settings() {
        let settings = DeduplicationConfig::default()
            .with_confirmation_window_days(2)
            .lexical_settings();
        assert_eq!(settings.confirmation_window_secs, 2 * SECS_PER_DAY);
        assert!((settings.threshold - 0.8).abs() < f32::EPSILON);
    }
}
