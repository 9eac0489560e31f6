//! Deduplication result types.

use super::bloom::FilterStats;
use crate::models::{OwnerId, SimilarMatch};
use serde::{Deserialize, Serialize};

/// Verdict of a duplicate check.
///
/// # Example
///
/// ```rust
/// use echoless::services::deduplication::{SimilarityVerdict, VerdictDetails, VerdictReason};
///
/// let verdict = SimilarityVerdict::lexical(0.92, VerdictDetails::default());
/// assert!(verdict.is_duplicate);
/// assert_eq!(verdict.reason, VerdictReason::Lexical);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityVerdict {
    /// Whether the candidate duplicates content the owner already saw.
    pub is_duplicate: bool,
    /// Which layer decided.
    pub reason: VerdictReason,
    /// Similarity reported by the deciding layer, in `[0, 1]`.
    pub confidence: f32,
    /// Diagnostics.
    pub details: VerdictDetails,
}

impl SimilarityVerdict {
    /// Not a duplicate.
    #[must_use]
    pub const fn not_duplicate(details: VerdictDetails) -> Self {
        Self {
            is_duplicate: false,
            reason: VerdictReason::None,
            confidence: 0.0,
            details,
        }
    }

    /// Duplicate found by the lexical layer.
    #[must_use]
    pub fn lexical(similarity: f32, details: VerdictDetails) -> Self {
        Self {
            is_duplicate: true,
            reason: VerdictReason::Lexical,
            confidence: similarity.clamp(0.0, 1.0),
            details,
        }
    }

    /// Duplicate found by the semantic layer.
    #[must_use]
    pub fn semantic(similarity: f32, details: VerdictDetails) -> Self {
        Self {
            is_duplicate: true,
            reason: VerdictReason::Semantic,
            confidence: similarity.clamp(0.0, 1.0),
            details,
        }
    }
}

/// Layer that produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictReason {
    /// Shingle filter (confirmed against recent texts when available).
    Lexical,
    /// Embedding similarity.
    Semantic,
    /// No layer fired.
    None,
}

impl VerdictReason {
    /// Returns the reason as a static label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lexical => "lexical",
            Self::Semantic => "semantic",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for VerdictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostics attached to a verdict.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerdictDetails {
    /// Fraction of the candidate's shingles found in the owner's filter.
    pub lexical_score: Option<f32>,
    /// Best Jaccard similarity against recent raw texts, when computed.
    pub confirmed_similarity: Option<f32>,
    /// Semantic matches, most similar first.
    pub semantic_matches: Vec<SimilarMatch>,
    /// Wall time of the check in milliseconds.
    pub check_duration_ms: u64,
    /// Error swallowed under [`FailurePolicy::FailOpen`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What a check does with recoverable upstream failures.
///
/// Configuration errors and invariant violations always propagate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Return the error to the caller.
    #[default]
    FailClosed,
    /// Treat the failing layer as "no duplicate" and record the error in the
    /// verdict details.
    FailOpen,
}

/// Result of the lexical layer for one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LexicalOutcome {
    /// Whether the lexical layer considers the candidate a duplicate.
    pub is_duplicate: bool,
    /// Fraction of the candidate's shingles present in the filter.
    pub filter_score: f32,
    /// Best Jaccard similarity against recent raw texts, when computed.
    pub confirmed_similarity: Option<f32>,
}

impl LexicalOutcome {
    /// Outcome for an owner with no lexical state.
    #[must_use]
    pub const fn unknown_owner() -> Self {
        Self {
            is_duplicate: false,
            filter_score: 0.0,
            confirmed_similarity: None,
        }
    }

    /// The confirmed similarity, or the filter score when confirmation did
    /// not run.
    #[must_use]
    pub fn similarity(&self) -> f32 {
        self.confirmed_similarity.unwrap_or(self.filter_score)
    }
}

/// Lexical state of one owner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OwnerLexicalStats {
    /// Filter diagnostics.
    pub filter: FilterStats,
    /// Raw texts held for confirmation.
    pub recent_texts: usize,
}

/// Service statistics, for one owner or globally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeduplicationStats {
    /// Owner the stats are scoped to (`None` for global).
    pub owner: Option<OwnerId>,
    /// Owners with in-memory lexical state.
    pub tracked_owners: usize,
    /// Lexical state of the owner, if tracked.
    pub lexical: Option<OwnerLexicalStats>,
    /// Rows in the store.
    pub stored_items: usize,
    /// Rows in the store that still carry an embedding.
    pub stored_embeddings: usize,
    /// Texts in the shared shingle cache.
    pub shingle_cache_entries: usize,
    /// Whether the lexical layer is enabled.
    pub lexical_enabled: bool,
    /// Whether the semantic layer is enabled.
    pub semantic_enabled: bool,
}
