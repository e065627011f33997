//! # Turnvault Core
//!
//! Enrichment, storage and retrieval engine for AI-conversation transcripts.
//! A conversation transcript is broken into [`turn::Turn`]s; each turn is
//! run through a pipeline of lightweight analyzers (topic scoring, pattern
//! and semantic feedback classification, technical-domain detection, hybrid
//! entity extraction) whose outputs are fused into a single enriched record,
//! persisted into a local SQLite-backed store with an HNSW vector index, and
//! served back out through a boosted query engine.
//!
//! ## Pipeline
//!
//! - [`turn`] — the `Turn`/`RawTurn` data model and its invariants.
//! - [`embeddings`] — the process-wide local text-embedding gateway (feature `embeddings`).
//! - [`enrichment`] — the per-turn analyzer pipeline and fusion (`enrichment::EnrichmentProcessor`).
//! - [`chain`] — per-session adjacency linking and solution/feedback pairing.
//! - [`store`] — SQLite metadata storage plus the HNSW vector index (feature `vector-search`).
//! - [`search`] — the standalone vector index wrapper used by `store`.
//! - [`query`] — the boosted query engine.
//! - [`validation`] — incremental validation-feedback application.
//! - [`maintenance`] — scan/fix/snapshot/rollback/health-report passes over stored metadata.
//! - [`config`] — data-directory resolution and file permission hardening.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use turnvault_core::store::{EnrichedTurn, Store};
//! use turnvault_core::enrichment::{EnrichmentContext, EnrichmentProcessor, EnrichmentSource};
//! use turnvault_core::turn::RawTurn;
//!
//! let store = Store::open(None)?;
//! let processor = EnrichmentProcessor::new();
//! let raw = RawTurn { content: "it works now, thanks!".into(), ..Default::default() };
//! let ctx = EnrichmentContext { source: Some(EnrichmentSource::Hook), ..Default::default() };
//! let turn = processor.enrich(raw, &ctx);
//! store.add_one(&EnrichedTurn { turn, embedding: None })?;
//! ```
//!
//! ## Feature flags
//!
//! - `embeddings` (default): local text embedding generation via `fastembed`.
//! - `vector-search` (default): HNSW vector search via `usearch`.
//! - `bundled-sqlite` (default): statically link SQLite through `rusqlite`'s `bundled` feature.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod chain;
pub mod config;
pub mod enrichment;
pub mod maintenance;
pub mod query;
pub mod store;
pub mod turn;
pub mod validation;

#[cfg(feature = "embeddings")]
#[cfg_attr(docsrs, doc(cfg(feature = "embeddings")))]
pub mod embeddings;

#[cfg(feature = "vector-search")]
#[cfg_attr(docsrs, doc(cfg(feature = "vector-search")))]
pub mod search;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use turn::{
    bounds, content_hash, empty_content_placeholder, AnalysisMethod, RawTurn, Role,
    Sentiment, SolutionCategory, TechnicalDomain, TopicScores, Turn,
};

pub use enrichment::{EnrichmentContext, EnrichmentProcessor, EnrichmentSource, ProcessorStats};

pub use chain::backfill_session;

pub use store::{EnrichedTurn, Store, StoreError};

pub use query::{
    BoostBreakdown, PreferenceNudge, QueryError, QueryFilter, QueryFlags, QueryRequest,
    ScoredTurn, ValidationPreference,
};

pub use validation::{ValidationLearner, ValidationOutcome};

pub use maintenance::{health_report, scan, HealthReport, Issue, IssueKind, Snapshot};

#[cfg(feature = "embeddings")]
pub use embeddings::{
    cosine_similarity, euclidean_distance, Embedding, EmbeddingError, EmbeddingService,
    EMBEDDING_DIMENSIONS,
};

#[cfg(feature = "vector-search")]
pub use search::{
    VectorIndex, VectorIndexConfig, VectorIndexStats, VectorSearchError, DEFAULT_DIMENSIONS,
};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::{
        EnrichedTurn, EnrichmentContext, EnrichmentProcessor, EnrichmentSource, RawTurn, Role,
        Store, StoreError, Turn,
    };

    #[cfg(feature = "embeddings")]
    pub use crate::{Embedding, EmbeddingService};

    #[cfg(feature = "vector-search")]
    pub use crate::VectorIndex;

    pub use crate::{QueryFilter, QueryFlags, QueryRequest, ScoredTurn, ValidationPreference};
    pub use crate::{HealthReport, IssueKind, ValidationLearner};
}
