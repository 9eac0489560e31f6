//! Embedding storage.
//!
//! The semantic layer persists content rows and queries nearest neighbors
//! through [`EmbeddingStore`]. Two implementations ship with the crate:
//!
//! | Store | Persistence |
//! |-------|-------------|
//! | [`InMemoryEmbeddingStore`] | None (process lifetime) |
//! | [`SqliteEmbeddingStore`] | `SQLite` file with WAL journaling |

mod memory;
pub mod sqlite;
pub mod traits;

pub use memory::InMemoryEmbeddingStore;
pub use sqlite::SqliteEmbeddingStore;
pub use traits::{EmbeddingStore, Neighbor, NeighborFilter, RecentText, StoreCounts};
