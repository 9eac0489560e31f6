//! # Echoless
//!
//! Duplicate-content detection for generated messages.
//!
//! Echoless keeps a user from seeing the same message twice, even when the new
//! text is a paraphrase rather than an exact repeat. Checks run in two layers:
//!
//! - **Lexical**: a per-owner Bloom filter over character trigrams rejects
//!   near-identical text without touching storage
//! - **Semantic**: embedding vectors are compared against the owner's recent
//!   history inside a retention window
//!
//! The semantic layer only runs when the lexical layer lets the candidate
//! through.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use echoless::embedding::HashedEmbedder;
//! use echoless::models::{ContentId, OwnerId};
//! use echoless::services::deduplication::{DeduplicationConfig, DeduplicationService};
//! use echoless::storage::InMemoryEmbeddingStore;
//!
//! let embedder = Arc::new(HashedEmbedder::new());
//! let store = Arc::new(InMemoryEmbeddingStore::new(HashedEmbedder::DEFAULT_DIMENSIONS));
//! let service = DeduplicationService::new(embedder, store, DeduplicationConfig::default())?;
//!
//! let owner = OwnerId::new("user-42");
//! let text = "Small steps every day add up to big change.";
//!
//! let verdict = service.check_for_duplicates(&owner, text, None, None)?;
//! assert!(!verdict.is_duplicate);
//!
//! service.add_content(&ContentId::new("msg-1"), &owner, text, None, None)?;
//! let verdict = service.check_for_duplicates(&owner, text, None, None)?;
//! assert!(verdict.is_duplicate);
//! # Ok::<(), echoless::Error>(())
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod clock;
pub mod config;
pub mod embedding;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EcholessConfig;
pub use embedding::Embedder;
pub use models::{Category, ContentId, ContentItem, OwnerId, SimilarMatch};
pub use services::deduplication::{
    DeduplicationConfig, DeduplicationService, DeduplicationStats, FailurePolicy,
    SimilarityVerdict, VerdictReason,
};
pub use storage::EmbeddingStore;

/// Error type for echoless operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When | Recoverable |
/// |---------|-------------|-------------|
/// | `EmbeddingProvider` | Embedding call fails (network, auth, quota, timeout) | yes |
/// | `Store` | Vector store insert/query fails (connectivity, SQL, lock timeout) | yes |
/// | `Configuration` | Threshold, window or capacity out of range | no |
/// | `InvariantViolation` | Mixed embedding dimensionality, corrupt filter state | no |
/// | `InvalidInput` | Empty text passed to an embedder, malformed CLI arguments | no |
/// | `OperationFailed` | File I/O, observability setup | no |
#[derive(Debug, ThisError)]
pub enum Error {
    /// The embedding provider failed to produce a vector.
    ///
    /// Raised when:
    /// - The HTTP request fails or times out
    /// - The provider answers with a non-success status (auth, quota)
    /// - The bulkhead cannot hand out a permit in time
    #[error("embedding provider '{provider}' failed: {cause}")]
    EmbeddingProvider {
        /// Name of the provider.
        provider: String,
        /// The underlying cause.
        cause: String,
    },

    /// The embedding store failed.
    ///
    /// Raised when:
    /// - `SQLite` statements fail or the database is busy past its timeout
    /// - A stored vector blob cannot be decoded
    #[error("store operation '{operation}' failed: {cause}")]
    Store {
        /// The store operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Configuration is invalid.
    ///
    /// Raised at construction or on `update_config`; values are never clamped.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// An internal invariant was violated by the caller.
    ///
    /// Raised when:
    /// - An embedding does not match the store's dimensionality
    /// - An imported filter state is internally inconsistent
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

impl Error {
    /// Returns true for upstream failures a caller may retry or fail open on.
    ///
    /// Configuration errors and invariant violations are never recoverable.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::EmbeddingProvider { .. } | Self::Store { .. })
    }

    /// Short machine-readable label used in metrics and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::EmbeddingProvider { .. } => "embedding_provider",
            Self::Store { .. } => "store",
            Self::Configuration(_) => "configuration",
            Self::InvariantViolation(_) => "invariant_violation",
            Self::InvalidInput(_) => "invalid_input",
            Self::OperationFailed { .. } => "operation_failed",
        }
    }
}

/// Result type alias for echoless operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch.
///
/// # Examples
///
/// ```rust
/// use echoless::current_timestamp;
///
/// assert!(current_timestamp() > 0);
/// ```
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("test error".to_string());
        assert_eq!(err.to_string(), "invalid input: test error");

        let err = Error::EmbeddingProvider {
            provider: "openai".to_string(),
            cause: "quota exceeded".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "embedding provider 'openai' failed: quota exceeded"
        );

        let err = Error::Store {
            operation: "nearest".to_string(),
            cause: "database is locked".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "store operation 'nearest' failed: database is locked"
        );

        let err = Error::Configuration("retention_days must be > 0".to_string());
        assert_eq!(
            err.to_string(),
            "invalid configuration: retention_days must be > 0"
        );
    }

    #[test]
    fn test_error_recoverability() {
        assert!(
            Error::EmbeddingProvider {
                provider: "p".to_string(),
                cause: "c".to_string(),
            }
            .is_recoverable()
        );
        assert!(
            Error::Store {
                operation: "o".to_string(),
                cause: "c".to_string(),
            }
            .is_recoverable()
        );
        assert!(!Error::Configuration("bad".to_string()).is_recoverable());
        assert!(!Error::InvariantViolation("dims".to_string()).is_recoverable());
    }

    #[test]
    fn test_error_kind_labels() {
        assert_eq!(Error::Configuration(String::new()).kind(), "configuration");
        assert_eq!(
            Error::InvariantViolation(String::new()).kind(),
            "invariant_violation"
        );
    }
}
