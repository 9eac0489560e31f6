//! `SQLite`-backed embedding store.

use super::connection::{acquire_lock, configure_connection};
use super::metrics::record_operation_metrics;
use crate::embedding::cosine_distance;
use crate::models::{Category, ContentId, ContentItem, OwnerId};
use crate::storage::memory::sort_neighbors;
use crate::storage::traits::{
    EmbeddingStore, Neighbor, NeighborFilter, RecentText, StoreCounts, ensure_dimensions,
};
use crate::{Error, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS content_items (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    category TEXT,
    text TEXT NOT NULL,
    embedding BLOB,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_content_items_owner_created
    ON content_items (owner_id, created_at);
CREATE TABLE IF NOT EXISTS store_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// Persistent embedding store on a single `SQLite` file.
///
/// Embeddings are stored as little-endian `f32` blobs and compared by brute
/// force over the owner's rows in the requested window, which the
/// `(owner_id, created_at)` index keeps small.
///
/// The database remembers the dimensionality it was created with; reopening
/// it with a different one fails with [`Error::InvariantViolation`].
pub struct SqliteEmbeddingStore {
    conn: Mutex<Connection>,
    dimensions: usize,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SqliteEmbeddingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteEmbeddingStore")
            .field("dimensions", &self.dimensions)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn store_error(operation: &str) -> impl FnOnce(rusqlite::Error) -> Error + '_ {
    move |e| Error::Store {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

fn to_sql_timestamp(ts: u64) -> i64 {
    i64::try_from(ts).unwrap_or(i64::MAX)
}

fn from_sql_timestamp(ts: i64) -> u64 {
    u64::try_from(ts).unwrap_or(0)
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(Error::Store {
            operation: "decode_embedding".to_string(),
            cause: format!("blob length {} is not a multiple of 4", blob.len()),
        });
    }
    Ok(blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

impl SqliteEmbeddingStore {
    /// Opens (or creates) a store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the database cannot be opened or migrated,
    /// or [`Error::InvariantViolation`] if it was created with a different
    /// dimensionality.
    pub fn open(path: impl AsRef<Path>, dimensions: usize) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::Store {
                operation: "open".to_string(),
                cause: format!("cannot create {}: {e}", parent.display()),
            })?;
        }
        let conn = Connection::open(path).map_err(store_error("open"))?;
        Self::initialize(conn, dimensions, Some(path.to_path_buf()))
    }

    /// Creates a store in memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if the schema cannot be created.
    pub fn in_memory(dimensions: usize) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(store_error("open"))?;
        Self::initialize(conn, dimensions, None)
    }

    /// Path of the database file (`None` for in-memory stores).
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn initialize(conn: Connection, dimensions: usize, path: Option<PathBuf>) -> Result<Self> {
        if dimensions == 0 {
            return Err(Error::Configuration(
                "store dimensions must be > 0".to_string(),
            ));
        }

        configure_connection(&conn)?;
        conn.execute_batch(SCHEMA).map_err(store_error("migrate"))?;

        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM store_meta WHERE key = 'dimensions'",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_error("migrate"))?;

        match stored {
            Some(value) if value != dimensions.to_string() => {
                return Err(Error::InvariantViolation(format!(
                    "store was created with {value} dimensions, opened with {dimensions}"
                )));
            },
            Some(_) => {},
            None => {
                conn.execute(
                    "INSERT INTO store_meta (key, value) VALUES ('dimensions', ?1)",
                    params![dimensions.to_string()],
                )
                .map_err(store_error("migrate"))?;
            },
        }

        tracing::debug!(dimensions, path = ?path, "Opened SQLite embedding store");

        Ok(Self {
            conn: Mutex::new(conn),
            dimensions,
            path,
        })
    }

    fn with_connection<T>(
        &self,
        operation: &'static str,
        call: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        let start = Instant::now();
        let result = {
            let conn = acquire_lock(&self.conn);
            call(&conn)
        };
        record_operation_metrics("sqlite", operation, start, result.is_ok());
        result
    }
}

impl EmbeddingStore for SqliteEmbeddingStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn insert(&self, item: &ContentItem) -> Result<()> {
        if let Some(embedding) = &item.embedding {
            ensure_dimensions(self.dimensions, embedding)?;
        }
        let blob = item.embedding.as_deref().map(encode_embedding);

        self.with_connection("insert", |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO content_items
                    (id, owner_id, category, text, embedding, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    item.id.as_str(),
                    item.owner_id.as_str(),
                    item.category.as_ref().map(Category::as_str),
                    item.text,
                    blob,
                    to_sql_timestamp(item.created_at),
                ],
            )
            .map(|_| ())
            .map_err(store_error("insert"))
        })
    }

    fn nearest(
        &self,
        query: &[f32],
        filter: &NeighborFilter,
        limit: usize,
    ) -> Result<Vec<Neighbor>> {
        ensure_dimensions(self.dimensions, query)?;

        let rows = self.with_connection("nearest", |conn| {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT id, text, created_at, embedding FROM content_items
                     WHERE owner_id = ?1
                       AND embedding IS NOT NULL
                       AND created_at >= ?2
                       AND (?3 IS NULL OR category = ?3)",
                )
                .map_err(store_error("nearest"))?;

            let rows = stmt
                .query_map(
                    params![
                        filter.owner.as_str(),
                        to_sql_timestamp(filter.created_after),
                        filter.category.as_ref().map(Category::as_str),
                    ],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, Vec<u8>>(3)?,
                        ))
                    },
                )
                .map_err(store_error("nearest"))?;

            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(store_error("nearest"))
        })?;

        let mut neighbors = Vec::new();
        for (id, text, created_at, blob) in rows {
            let embedding = decode_embedding(&blob)?;
            if embedding.len() != self.dimensions {
                return Err(Error::Store {
                    operation: "nearest".to_string(),
                    cause: format!(
                        "row {id} holds {} dimensions, expected {}",
                        embedding.len(),
                        self.dimensions
                    ),
                });
            }
            let distance = cosine_distance(query, &embedding);
            if filter.within_distance(distance) {
                neighbors.push(Neighbor {
                    id: ContentId::new(id),
                    text,
                    created_at: from_sql_timestamp(created_at),
                    distance,
                });
            }
        }

        sort_neighbors(&mut neighbors);
        neighbors.truncate(limit);
        Ok(neighbors)
    }

    fn clear_embeddings_before(&self, cutoff: u64) -> Result<usize> {
        self.with_connection("clear_embeddings", |conn| {
            conn.execute(
                "UPDATE content_items SET embedding = NULL
                 WHERE embedding IS NOT NULL AND created_at < ?1",
                params![to_sql_timestamp(cutoff)],
            )
            .map_err(store_error("clear_embeddings"))
        })
    }

    fn recent_texts(&self, owner: &OwnerId, since: u64, limit: usize) -> Result<Vec<RecentText>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_connection("recent_texts", |conn| {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT text, created_at FROM content_items
                     WHERE owner_id = ?1 AND created_at >= ?2
                     ORDER BY created_at DESC
                     LIMIT ?3",
                )
                .map_err(store_error("recent_texts"))?;

            let rows = stmt
                .query_map(
                    params![owner.as_str(), to_sql_timestamp(since), limit],
                    |row| {
                        Ok(RecentText {
                            text: row.get(0)?,
                            created_at: from_sql_timestamp(row.get(1)?),
                        })
                    },
                )
                .map_err(store_error("recent_texts"))?;

            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(store_error("recent_texts"))
        })
    }

    fn count(&self, owner: Option<&OwnerId>) -> Result<StoreCounts> {
        self.with_connection("count", |conn| {
            conn.query_row(
                "SELECT COUNT(*), COUNT(embedding) FROM content_items
                 WHERE (?1 IS NULL OR owner_id = ?1)",
                params![owner.map(OwnerId::as_str)],
                |row| {
                    let rows: i64 = row.get(0)?;
                    let with_embedding: i64 = row.get(1)?;
                    Ok(StoreCounts {
                        rows: usize::try_from(rows).unwrap_or(0),
                        with_embedding: usize::try_from(with_embedding).unwrap_or(0),
                    })
                },
            )
            .map_err(store_error("count"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

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
    fn test_embedding_blob_encoding() {
        let v = vec![0.25, -1.5, 3.0];
        assert_eq!(decode_embedding(&encode_embedding(&v)).unwrap(), v);
        assert!(matches!(
            decode_embedding(&[0, 1, 2]),
            Err(Error::Store { .. })
        ));
    }

    #[test]
    fn test_nearest_filters_and_orders() {
        let store = SqliteEmbeddingStore::in_memory(2).unwrap();
        store.insert(&item("far", "u", Some(vec![0.0, 1.0]), 100)).unwrap();
        store.insert(&item("near", "u", Some(vec![1.0, 0.0]), 100)).unwrap();
        store.insert(&item("old", "u", Some(vec![1.0, 0.0]), 1)).unwrap();
        store.insert(&item("other", "v", Some(vec![1.0, 0.0]), 100)).unwrap();
        store.insert(&item("bare", "u", None, 100)).unwrap();

        let filter = NeighborFilter::new(OwnerId::new("u"))
            .created_after(50)
            .with_max_distance(0.5);
        let neighbors = store.nearest(&[1.0, 0.0], &filter, 10).unwrap();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].id.as_str(), "near");
        assert_eq!(neighbors[0].created_at, 100);
    }

    #[test]
    fn test_category_filter() {
        let store = SqliteEmbeddingStore::in_memory(2).unwrap();
        let mut calm = item("calm", "u", Some(vec![1.0, 0.0]), 10);
        calm.category = Some(Category::new("calm"));
        store.insert(&calm).unwrap();
        store.insert(&item("plain", "u", Some(vec![1.0, 0.0]), 10)).unwrap();

        let filter = NeighborFilter::new(OwnerId::new("u")).with_category(Category::new("Calm"));
        let neighbors = store.nearest(&[1.0, 0.0], &filter, 10).unwrap();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].id.as_str(), "calm");
    }

    #[test]
    fn test_cleanup_and_counts() {
        let store = SqliteEmbeddingStore::in_memory(2).unwrap();
        store.insert(&item("old", "u", Some(vec![1.0, 0.0]), 10)).unwrap();
        store.insert(&item("new", "u", Some(vec![1.0, 0.0]), 100)).unwrap();
        store.insert(&item("other", "v", Some(vec![1.0, 0.0]), 10)).unwrap();

        assert_eq!(store.clear_embeddings_before(50).unwrap(), 2);
        assert_eq!(
            store.count(Some(&OwnerId::new("u"))).unwrap(),
            StoreCounts { rows: 2, with_embedding: 1 }
        );
        assert_eq!(
            store.count(None).unwrap(),
            StoreCounts { rows: 3, with_embedding: 1 }
        );
    }

    #[test]
    fn test_recent_texts() {
        let store = SqliteEmbeddingStore::in_memory(2).unwrap();
        for (id, ts) in [("a", 10), ("b", 30), ("c", 20)] {
            store.insert(&item(id, "u", None, ts)).unwrap();
        }
        let texts = store.recent_texts(&OwnerId::new("u"), 15, 10).unwrap();
        let names: Vec<_> = texts.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(names, vec!["text b", "text c"]);
    }

    #[test]
    fn test_reopen_persists_and_checks_dimensions() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("echoless.db");

        {
            let store = SqliteEmbeddingStore::open(&path, 2).unwrap();
            store.insert(&item("a", "u", Some(vec![1.0, 0.0]), 10)).unwrap();
        }

        let store = SqliteEmbeddingStore::open(&path, 2).unwrap();
        assert_eq!(store.count(None).unwrap().rows, 1);
        drop(store);

        assert!(matches!(
            SqliteEmbeddingStore::open(&path, 3),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_wrong_dimension_insert() {
        let store = SqliteEmbeddingStore::in_memory(2).unwrap();
        assert!(matches!(
            store.insert(&item("a", "u", Some(vec![1.0]), 0)),
            Err(Error::InvariantViolation(_))
        ));
    }
}
