//! Vector search
//!
//! HNSW approximate nearest-neighbor search over turn embeddings (C10).

mod vector;

pub use vector::{
    VectorIndex, VectorIndexConfig, VectorIndexStats, VectorSearchError, DEFAULT_CONNECTIVITY,
    DEFAULT_DIMENSIONS, DEFAULT_EXPANSION_ADD, DEFAULT_EXPANSION_SEARCH,
};
