//! Duplicate-content detection.
//!
//! Two layers, cheapest first:
//! 1. **Lexical**: trigram shingles checked against a per-owner Bloom filter,
//!    then confirmed against the owner's recent raw texts
//! 2. **Semantic**: embedding cosine distance against stored history inside
//!    the retention window
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    DeduplicationService                      │
//! │  ┌────────────────────────────┐  ┌────────────────────────┐  │
//! │  │ LexicalService             │  │ SemanticEngine         │  │
//! │  │                            │  │                        │  │
//! │  │ owner -> MembershipFilter  │  │ Embedder               │  │
//! │  │        + recent texts      │  │ EmbeddingStore         │  │
//! │  │ ShingleEngine (shared LRU) │  │ cosine distance        │  │
//! │  └────────────────────────────┘  └────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use echoless::services::deduplication::{MembershipFilter, ShingleEngine, normalize};
//!
//! assert_eq!(normalize("  Hello,   WORLD! "), "hello world");
//!
//! let engine = ShingleEngine::new(100);
//! let mut filter = MembershipFilter::new(1_000, 0.01)?;
//! for shingle in engine.shingles("hello world").iter() {
//!     filter.add(shingle);
//! }
//! assert!(filter.contains("hel"));
//! assert!((engine.similarity("Hello world", "hello, world!") - 1.0).abs() < f32::EPSILON);
//! # Ok::<(), echoless::Error>(())
//! ```

mod bloom;
mod config;
mod lexical;
mod semantic;
mod service;
mod shingles;
mod types;

pub use bloom::{FilterState, FilterStats, MembershipFilter, optimal_hash_count, optimal_size};
pub use config::{DeduplicationConfig, DeduplicationConfigPatch, LexicalSettings, merge};
pub use lexical::LexicalService;
pub use semantic::SemanticEngine;
pub use service::DeduplicationService;
pub use shingles::{SHINGLE_SIZE, ShingleEngine, ShingleSet, jaccard, normalize, shingle_set};
pub use types::{
    DeduplicationStats, FailurePolicy, LexicalOutcome, OwnerLexicalStats, SimilarityVerdict,
    VerdictDetails, VerdictReason,
};

/// Recovers a poisoned lock guard, logging and counting the recovery.
pub(crate) fn recover_lock<G>(lock: &'static str) -> impl FnOnce(std::sync::PoisonError<G>) -> G {
    move |poisoned| {
        tracing::warn!(lock, "Lock was poisoned, recovering");
        metrics::counter!("store_lock_poison_recovery_total", "lock" => lock).increment(1);
        poisoned.into_inner()
    }
}
