//! In-process embedding store.

use super::traits::{
    EmbeddingStore, Neighbor, NeighborFilter, RecentText, StoreCounts, ensure_dimensions,
};
use crate::Result;
use crate::embedding::cosine_distance;
use crate::models::{ContentId, ContentItem, OwnerId};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Embedding store kept in a `HashMap`, searched by brute force.
///
/// Contents are lost when the process exits.
#[derive(Debug)]
pub struct InMemoryEmbeddingStore {
    dimensions: usize,
    rows: RwLock<HashMap<ContentId, ContentItem>>,
}

impl InMemoryEmbeddingStore {
    /// Creates an empty store for `dimensions`-long embeddings.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            rows: RwLock::new(HashMap::new()),
        }
    }

    /// Returns a copy of a stored row.
    #[must_use]
    pub fn get(&self, id: &ContentId) -> Option<ContentItem> {
        self.read().get(id).cloned()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ContentId, ContentItem>> {
        self.rows.read().unwrap_or_else(|poisoned| {
            tracing::warn!("In-memory store lock was poisoned, recovering");
            metrics::counter!("store_lock_poison_recovery_total", "lock" => "memory_store")
                .increment(1);
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ContentId, ContentItem>> {
        self.rows.write().unwrap_or_else(|poisoned| {
            tracing::warn!("In-memory store lock was poisoned, recovering");
            metrics::counter!("store_lock_poison_recovery_total", "lock" => "memory_store")
                .increment(1);
            poisoned.into_inner()
        })
    }
}

impl EmbeddingStore for InMemoryEmbeddingStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn insert(&self, item: &ContentItem) -> Result<()> {
        if let Some(embedding) = &item.embedding {
            ensure_dimensions(self.dimensions, embedding)?;
        }
        self.write().insert(item.id.clone(), item.clone());
        Ok(())
    }

    fn nearest(
        &self,
        query: &[f32],
        filter: &NeighborFilter,
        limit: usize,
    ) -> Result<Vec<Neighbor>> {
        ensure_dimensions(self.dimensions, query)?;

        let rows = self.read();
        let mut neighbors: Vec<Neighbor> = rows
            .values()
            .filter(|row| filter.admits(&row.owner_id, row.category.as_ref(), row.created_at))
            .filter_map(|row| {
                let embedding = row.embedding.as_ref()?;
                let distance = cosine_distance(query, embedding);
                filter.within_distance(distance).then(|| Neighbor {
                    id: row.id.clone(),
                    text: row.text.clone(),
                    created_at: row.created_at,
                    distance,
                })
            })
            .collect();
        drop(rows);

        sort_neighbors(&mut neighbors);
        neighbors.truncate(limit);
        Ok(neighbors)
    }

    fn clear_embeddings_before(&self, cutoff: u64) -> Result<usize> {
        let mut rows = self.write();
        let mut cleared = 0;
        for row in rows.values_mut() {
            if row.created_at < cutoff && row.embedding.take().is_some() {
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    fn recent_texts(&self, owner: &OwnerId, since: u64, limit: usize) -> Result<Vec<RecentText>> {
        let rows = self.read();
        let mut texts: Vec<RecentText> = rows
            .values()
            .filter(|row| &row.owner_id == owner && row.created_at >= since)
            .map(|row| RecentText {
                text: row.text.clone(),
                created_at: row.created_at,
            })
            .collect();
        drop(rows);

        texts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        texts.truncate(limit);
        Ok(texts)
    }

    fn count(&self, owner: Option<&OwnerId>) -> Result<StoreCounts> {
        let rows = self.read();
        let mut counts = StoreCounts::default();
        for row in rows
            .values()
            .filter(|row| owner.is_none_or(|o| &row.owner_id == o))
        {
            counts.rows += 1;
            if row.embedding.is_some() {
                counts.with_embedding += 1;
            }
        }
        Ok(counts)
    }
}

/// Orders neighbors by ascending distance, newest first on ties.
pub(crate) fn sort_neighbors(neighbors: &mut [Neighbor]) {
    neighbors.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::models::Category;

    fn item(id: &str, owner: &str, embedding: Option<Vec<f32>>, created_at: u64) -> ContentItem {
        ContentItem {
            id: ContentId::new(id),
            owner_id: OwnerId::new(owner),
            category: None,
            text: format!("text {id}"),
            embedding,
            created_at,
        }
    }

    #[test]
    fn test_nearest_orders_by_distance() {
        let store = InMemoryEmbeddingStore::new(2);
        store.insert(&item("far", "u", Some(vec![0.0, 1.0]), 10)).unwrap();
        store.insert(&item("near", "u", Some(vec![1.0, 0.1]), 10)).unwrap();
        store.insert(&item("exact", "u", Some(vec![1.0, 0.0]), 10)).unwrap();

        let neighbors = store
            .nearest(&[1.0, 0.0], &NeighborFilter::new(OwnerId::new("u")), 2)
            .unwrap();

        let ids: Vec<_> = neighbors.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "near"]);
        assert!(neighbors[0].distance.abs() < 1e-6);
    }

    #[test]
    fn test_nearest_scopes_owner_time_and_category() {
        let store = InMemoryEmbeddingStore::new(2);
        store.insert(&item("other-owner", "v", Some(vec![1.0, 0.0]), 50)).unwrap();
        store.insert(&item("too-old", "u", Some(vec![1.0, 0.0]), 5)).unwrap();
        let mut categorized = item("calm", "u", Some(vec![1.0, 0.0]), 50);
        categorized.category = Some(Category::new("calm"));
        store.insert(&categorized).unwrap();
        store.insert(&item("plain", "u", Some(vec![1.0, 0.0]), 50)).unwrap();

        let filter = NeighborFilter::new(OwnerId::new("u")).created_after(10);
        assert_eq!(store.nearest(&[1.0, 0.0], &filter, 10).unwrap().len(), 2);

        let filter = filter.with_category(Category::new("calm"));
        let neighbors = store.nearest(&[1.0, 0.0], &filter, 10).unwrap();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].id.as_str(), "calm");
    }

    #[test]
    fn test_dimension_mismatch_is_invariant_violation() {
        let store = InMemoryEmbeddingStore::new(3);
        let err = store.insert(&item("a", "u", Some(vec![1.0]), 0)).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));

        let err = store
            .nearest(&[1.0], &NeighborFilter::new(OwnerId::new("u")), 1)
            .unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
    }

    #[test]
    fn test_cleanup_nulls_embeddings_keeps_rows() {
        let store = InMemoryEmbeddingStore::new(2);
        store.insert(&item("old", "u", Some(vec![1.0, 0.0]), 10)).unwrap();
        store.insert(&item("new", "u", Some(vec![1.0, 0.0]), 100)).unwrap();
        store.insert(&item("bare", "u", None, 1)).unwrap();

        assert_eq!(store.clear_embeddings_before(50).unwrap(), 1);
        assert_eq!(store.clear_embeddings_before(50).unwrap(), 0);

        let counts = store.count(Some(&OwnerId::new("u"))).unwrap();
        assert_eq!(counts, StoreCounts { rows: 3, with_embedding: 1 });
        assert!(store.get(&ContentId::new("old")).unwrap().embedding.is_none());
    }

    #[test]
    fn test_recent_texts_newest_first() {
        let store = InMemoryEmbeddingStore::new(2);
        for (id, ts) in [("a", 10), ("b", 30), ("c", 20), ("d", 5)] {
            store.insert(&item(id, "u", None, ts)).unwrap();
        }
        let texts = store.recent_texts(&OwnerId::new("u"), 10, 2).unwrap();
        let stamps: Vec<_> = texts.iter().map(|t| t.created_at).collect();
        assert_eq!(stamps, vec![30, 20]);
    }
}
