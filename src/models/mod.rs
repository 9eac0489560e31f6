//! Data models for echoless.
//!
//! Identifiers and the content records that flow between the deduplication
//! layers and the embedding store.

mod content;
mod ids;

pub use content::{ContentItem, SimilarMatch};
pub use ids::{Category, ContentId, OwnerId};
