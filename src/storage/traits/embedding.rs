//! Embedding store trait.
//!
//! The semantic layer reads and writes content through [`EmbeddingStore`].
//! A store holds one row per [`ContentItem`]; retention cleanup nulls a row's
//! embedding but keeps the row so the text stays available for rehydrating
//! the lexical layer.
//!
//! # Available Implementations
//!
//! | Store | Use Case |
//! |-------|----------|
//! | [`InMemoryEmbeddingStore`](crate::storage::InMemoryEmbeddingStore) | Tests, single-process demos |
//! | [`SqliteEmbeddingStore`](crate::storage::SqliteEmbeddingStore) | Persistent local store |

use crate::Result;
use crate::models::{Category, ContentId, ContentItem, OwnerId};

/// Filter criteria for nearest-neighbor queries.
///
/// ```rust
/// use echoless::models::{Category, OwnerId};
/// use echoless::storage::NeighborFilter;
///
/// let filter = NeighborFilter::new(OwnerId::new("user-1"))
///     .with_category(Category::new("motivation"))
///     .created_after(1_700_000_000)
///     .with_max_distance(0.15);
/// assert_eq!(filter.max_distance, Some(0.15));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborFilter {
    /// Only rows owned by this owner.
    pub owner: OwnerId,
    /// Only rows in this category, when set.
    pub category: Option<Category>,
    /// Only rows with `created_at >= created_after`.
    pub created_after: u64,
    /// Only neighbors with `distance <= max_distance`, when set.
    pub max_distance: Option<f32>,
}

impl NeighborFilter {
    /// Matches every embedded row of `owner`.
    #[must_use]
    pub const fn new(owner: OwnerId) -> Self {
        Self {
            owner,
            category: None,
            created_after: 0,
            max_distance: None,
        }
    }

    /// Restricts to a category.
    #[must_use]
    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    /// Sets the inclusive lower bound on `created_at`.
    #[must_use]
    pub const fn created_after(mut self, timestamp: u64) -> Self {
        self.created_after = timestamp;
        self
    }

    /// Sets the inclusive upper bound on cosine distance.
    #[must_use]
    pub const fn with_max_distance(mut self, distance: f32) -> Self {
        self.max_distance = Some(distance);
        self
    }

    /// Returns true if a row with these attributes passes the filter
    /// (distance excluded).
    #[must_use]
    pub fn admits(&self, owner: &OwnerId, category: Option<&Category>, created_at: u64) -> bool {
        &self.owner == owner
            && created_at >= self.created_after
            && self
                .category
                .as_ref()
                .is_none_or(|wanted| category == Some(wanted))
    }

    /// Returns true if `distance` is inside the configured bound.
    #[must_use]
    pub fn within_distance(&self, distance: f32) -> bool {
        self.max_distance.is_none_or(|max| distance <= max)
    }
}

/// A stored row returned by a nearest-neighbor query.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    /// Content identifier.
    pub id: ContentId,
    /// Stored text.
    pub text: String,
    /// Creation timestamp (Unix seconds).
    pub created_at: u64,
    /// Cosine distance to the query, in `[0, 2]`.
    pub distance: f32,
}

/// A previously stored text, used to rehydrate the lexical layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentText {
    /// Stored text.
    pub text: String,
    /// Creation timestamp (Unix seconds).
    pub created_at: u64,
}

/// Row counts for an owner (or the whole store).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    /// Rows stored.
    pub rows: usize,
    /// Rows that still carry an embedding.
    pub with_embedding: usize,
}

/// Trait for embedding stores.
///
/// # Implementor Notes
///
/// - Methods take `&self`; use interior mutability
/// - Inserting an existing id replaces the row
/// - Every embedding written or queried must have [`dimensions()`](Self::dimensions)
///   entries, otherwise [`crate::Error::InvariantViolation`] is returned
/// - Backend failures surface as [`crate::Error::Store`], never as an empty result
pub trait EmbeddingStore: Send + Sync {
    /// Short backend name used in metrics.
    fn name(&self) -> &'static str;

    /// Dimensionality of stored embeddings.
    fn dimensions(&self) -> usize;

    /// Inserts or replaces a content row.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or the embedding has the wrong length.
    fn insert(&self, item: &ContentItem) -> Result<()>;

    /// Returns up to `limit` embedded rows closest to `query`, ordered by
    /// ascending cosine distance.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or `query` has the wrong length.
    fn nearest(&self, query: &[f32], filter: &NeighborFilter, limit: usize)
    -> Result<Vec<Neighbor>>;

    /// Nulls the embedding of every row created before `cutoff`.
    ///
    /// Returns the number of embeddings cleared.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    fn clear_embeddings_before(&self, cutoff: u64) -> Result<usize>;

    /// Returns up to `limit` texts of `owner` created at or after `since`,
    /// newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn recent_texts(&self, owner: &OwnerId, since: u64, limit: usize) -> Result<Vec<RecentText>>;

    /// Counts rows for `owner`, or for the whole store when `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn count(&self, owner: Option<&OwnerId>) -> Result<StoreCounts>;
}

impl<S: EmbeddingStore + ?Sized> EmbeddingStore for std::sync::Arc<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    fn insert(&self, item: &ContentItem) -> Result<()> {
        (**self).insert(item)
    }

    fn nearest(
        &self,
        query: &[f32],
        filter: &NeighborFilter,
        limit: usize,
    ) -> Result<Vec<Neighbor>> {
        (**self).nearest(query, filter, limit)
    }

    fn clear_embeddings_before(&self, cutoff: u64) -> Result<usize> {
        (**self).clear_embeddings_before(cutoff)
    }

    fn recent_texts(&self, owner: &OwnerId, since: u64, limit: usize) -> Result<Vec<RecentText>> {
        (**self).recent_texts(owner, since, limit)
    }

    fn count(&self, owner: Option<&OwnerId>) -> Result<StoreCounts> {
        (**self).count(owner)
    }
}

/// Checks an embedding against the store's dimensionality.
///
/// # Errors
///
/// Returns [`crate::Error::InvariantViolation`] on mismatch.
pub fn ensure_dimensions(expected: usize, embedding: &[f32]) -> Result<()> {
    if embedding.len() == expected {
        Ok(())
    } else {
        Err(crate::Error::InvariantViolation(format!(
            "embedding has {} dimensions, store expects {expected}",
            embedding.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_admits() {
        let owner = OwnerId::new("a");
        let filter = NeighborFilter::new(owner.clone())
            .with_category(Category::new("calm"))
            .created_after(100);

        assert!(filter.admits(&owner, Some(&Category::new("calm")), 100));
        assert!(!filter.admits(&owner, Some(&Category::new("calm")), 99));
        assert!(!filter.admits(&owner, None, 200));
        assert!(!filter.admits(&OwnerId::new("b"), Some(&Category::new("calm")), 200));
    }

    #[test]
    fn test_filter_without_category_admits_any() {
        let owner = OwnerId::new("a");
        let filter = NeighborFilter::new(owner.clone());
        assert!(filter.admits(&owner, None, 0));
        assert!(filter.admits(&owner, Some(&Category::new("x")), 0));
        assert!(filter.within_distance(2.0));
    }

    #[test]
    fn test_within_distance_is_inclusive() {
        let filter = NeighborFilter::new(OwnerId::new("a")).with_max_distance(0.15);
        assert!(filter.within_distance(0.15));
        assert!(!filter.within_distance(0.150_01));
    }

    #[test]
    fn test_ensure_dimensions() {
        assert!(ensure_dimensions(2, &[0.0, 1.0]).is_ok());
        assert!(matches!(
            ensure_dimensions(3, &[0.0]),
            Err(crate::Error::InvariantViolation(_))
        ));
    }
}
