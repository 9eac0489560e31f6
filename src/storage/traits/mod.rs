//! Storage traits.

mod embedding;

pub use embedding::{
    EmbeddingStore, Neighbor, NeighborFilter, RecentText, StoreCounts, ensure_dimensions,
};
