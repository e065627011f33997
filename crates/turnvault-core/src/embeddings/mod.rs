//! Semantic embeddings (C1 — Embedding Model Gateway)
//!
//! Local embedding generation via `fastembed` (ONNX-based). No external API
//! calls; model weights are downloaded once and cached on disk. All callers
//! share a single model instance regardless of how many turns are enriched
//! concurrently.

mod local;

pub use local::{
    construction_count, cosine_similarity, dot_product, euclidean_distance, matryoshka_truncate,
    record_update_check_attempt, update_check_attempts, Embedding, EmbeddingError,
    EmbeddingService, BATCH_SIZE, EMBEDDING_DIMENSIONS, MAX_TEXT_LENGTH,
};
