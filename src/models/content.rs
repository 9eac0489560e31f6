//! Content records.

use super::{Category, ContentId, OwnerId};
use serde::{Deserialize, Serialize};

/// One piece of generated text being checked or ingested.
///
/// Immutable once stored. Retention cleanup nulls the embedding but keeps the
/// row for analytics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Unique identifier.
    pub id: ContentId,
    /// Owner the content was shown to.
    pub owner_id: OwnerId,
    /// Optional content category.
    pub category: Option<Category>,
    /// The generated text.
    pub text: String,
    /// Embedding vector, if one was produced.
    pub embedding: Option<Vec<f32>>,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: u64,
}

/// A stored item that is semantically close to a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarMatch {
    /// ID of the stored content.
    pub id: ContentId,
    /// Text of the stored content.
    pub text: String,
    /// Similarity (`1 - cosine distance`).
    pub similarity: f32,
    /// Creation timestamp of the stored content (Unix epoch seconds).
    pub created_at: u64,
}
