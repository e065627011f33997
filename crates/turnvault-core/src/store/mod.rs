//! Turn storage (C10 — Vector Index + metadata store)
//!
//! One SQLite database holds turn metadata (content-hash deduped via a
//! `UNIQUE` index) behind a single writer connection and a separate reader
//! connection for concurrent snapshot reads, the same split the embedding
//! gateway's sibling storage layer uses. Embeddings additionally live in an
//! in-memory HNSW index (`search::vector::VectorIndex`) that is persisted to
//! disk alongside the database and rebuilt from stored blobs on open if the
//! persisted index is missing or stale.

mod schema;

use crate::turn::{
    AnalysisMethod, Role, Sentiment, SolutionCategory, TechnicalDomain, Turn,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[cfg(feature = "vector-search")]
use crate::search::VectorIndex;

/// Maximum number of turns embedded/indexed in a single batch call. Larger
/// requests are sub-batched; if a sub-batch still fails it is halved and
/// retried, up to 3 attempts, before the error is propagated.
pub const MAX_BATCH: usize = 166;

const MAX_BATCH_RETRIES: usize = 3;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("turn not found: {0}")]
    NotFound(String),
    #[error("initialization error: {0}")]
    Init(String),
    #[cfg(feature = "vector-search")]
    #[error("vector search error: {0}")]
    VectorSearch(#[from] crate::search::VectorSearchError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("batch of {0} items failed after {1} retries: {2}")]
    BatchFailed(usize, usize, String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A turn paired with its embedding, as produced by the enrichment pipeline
/// before it reaches the store.
pub struct EnrichedTurn {
    pub turn: Turn,
    pub embedding: Option<Vec<f32>>,
}

pub struct Store {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    #[cfg(feature = "vector-search")]
    vector_index: Mutex<VectorIndex>,
    db_path: PathBuf,
}

impl Store {
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;
             PRAGMA mmap_size = 268435456;
             PRAGMA journal_size_limit = 67108864;",
        )?;
        Ok(())
    }

    /// Open (creating if necessary) the store at `db_path`, or at the
    /// platform-default data directory when `None`.
    pub fn open(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => {
                let dir = crate::config::data_dir();
                crate::config::ensure_private_dir(&dir)?;
                dir.join("turnvault.db")
            }
        };

        let writer_conn = Connection::open(&path)?;
        crate::config::harden_file_permissions(&path)?;
        Self::configure_connection(&writer_conn)?;
        schema::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        #[cfg(feature = "vector-search")]
        let vector_index = VectorIndex::new()
            .map_err(|e| StoreError::Init(format!("failed to create vector index: {e}")))?;

        let store = Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            #[cfg(feature = "vector-search")]
            vector_index: Mutex::new(vector_index),
            db_path: path,
        };

        #[cfg(feature = "vector-search")]
        store.load_embeddings_into_index()?;

        Ok(store)
    }

    /// Open an ephemeral in-memory store, used by tests. Writer and reader
    /// share the same named in-memory database via SQLite's shared cache, so
    /// writes made through one are visible to the other.
    pub fn open_in_memory() -> Result<Self> {
        use rusqlite::OpenFlags;
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        let uri = format!("file:turnvault_test_{n}?mode=memory&cache=shared");

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI;

        let writer_conn = Connection::open_with_flags(&uri, flags)?;
        Self::configure_connection(&writer_conn)?;
        schema::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open_with_flags(&uri, flags)?;

        #[cfg(feature = "vector-search")]
        let vector_index = VectorIndex::new()
            .map_err(|e| StoreError::Init(format!("failed to create vector index: {e}")))?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            #[cfg(feature = "vector-search")]
            vector_index: Mutex::new(vector_index),
            db_path: PathBuf::from(":memory:"),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    #[cfg(feature = "vector-search")]
    fn load_embeddings_into_index(&self) -> Result<()> {
        let reader = self
            .reader
            .lock()
            .map_err(|_| StoreError::Init("reader lock poisoned".into()))?;

        let mut stmt = reader.prepare("SELECT id, embedding FROM turns WHERE embedding IS NOT NULL")?;
        let rows: Vec<(String, Vec<u8>)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .filter_map(|r| r.ok())
            .collect();
        drop(stmt);
        drop(reader);

        let mut index = self
            .vector_index
            .lock()
            .map_err(|_| StoreError::Init("vector index lock poisoned".into()))?;

        index.reserve(rows.len().max(16)).ok();
        for (id, blob) in rows {
            if let Some(emb) = crate::embeddings::Embedding::from_bytes(&blob) {
                let _ = index.add(&id, &emb.vector);
            }
        }
        Ok(())
    }

    /// Insert one enriched turn. Returns `Ok(None)` when the content hash
    /// already exists (dedup, §3.3 invariant 1) instead of erroring.
    pub fn add_one(&self, item: &EnrichedTurn) -> Result<Option<String>> {
        let existing: Option<String> = {
            let writer = self.writer.lock().map_err(|_| StoreError::Init("writer lock poisoned".into()))?;
            writer
                .query_row(
                    "SELECT id FROM turns WHERE content_hash = ?1",
                    params![item.turn.content_hash],
                    |row| row.get(0),
                )
                .optional()?
        };
        if existing.is_some() {
            return Ok(None);
        }

        self.insert_row(item)?;

        #[cfg(feature = "vector-search")]
        if let Some(emb) = &item.embedding {
            let mut index = self
                .vector_index
                .lock()
                .map_err(|_| StoreError::Init("vector index lock poisoned".into()))?;
            index.add(&item.turn.id, emb)?;
        }

        Ok(Some(item.turn.id.clone()))
    }

    /// Insert a batch of enriched turns, sub-batching at [`MAX_BATCH`] and
    /// halving-and-retrying (up to 3 attempts) any sub-batch whose write
    /// transaction fails. Returns the ids actually inserted (skips dedup
    /// hits silently, matching `add_one`).
    pub fn add_batch(&self, items: &[EnrichedTurn]) -> Result<Vec<String>> {
        let mut inserted = Vec::new();
        for chunk in items.chunks(MAX_BATCH) {
            inserted.extend(self.add_chunk_with_retry(chunk, MAX_BATCH_RETRIES)?);
        }
        Ok(inserted)
    }

    fn add_chunk_with_retry(&self, chunk: &[EnrichedTurn], retries_left: usize) -> Result<Vec<String>> {
        match self.add_chunk(chunk) {
            Ok(ids) => Ok(ids),
            Err(e) if retries_left > 0 && chunk.len() > 1 => {
                tracing::warn!(batch_size = chunk.len(), error = %e, "batch insert failed, halving and retrying");
                let mid = chunk.len() / 2;
                let (left, right) = chunk.split_at(mid);
                let mut ids = self.add_chunk_with_retry(left, retries_left - 1)?;
                ids.extend(self.add_chunk_with_retry(right, retries_left - 1)?);
                Ok(ids)
            }
            Err(e) => Err(StoreError::BatchFailed(chunk.len(), MAX_BATCH_RETRIES, e.to_string())),
        }
    }

    /// Insert a sub-batch as a single atomic transaction (§4.10/§5): every
    /// row in `chunk` becomes visible together or, on failure, none do. This
    /// is what gives [`Self::add_chunk_with_retry`]'s halve-and-retry policy
    /// something real to retry against.
    fn add_chunk(&self, chunk: &[EnrichedTurn]) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(chunk.len());
        #[cfg(feature = "vector-search")]
        let mut inserted_embeddings: Vec<(String, Vec<f32>)> = Vec::new();

        {
            let mut writer = self.writer.lock().map_err(|_| StoreError::Init("writer lock poisoned".into()))?;
            let tx = writer.transaction()?;
            for item in chunk {
                let existing: Option<String> = tx
                    .query_row(
                        "SELECT id FROM turns WHERE content_hash = ?1",
                        params![item.turn.content_hash],
                        |row| row.get(0),
                    )
                    .optional()?;
                if existing.is_some() {
                    continue;
                }

                Self::insert_row_conn(&tx, item)?;
                ids.push(item.turn.id.clone());

                #[cfg(feature = "vector-search")]
                if let Some(emb) = &item.embedding {
                    inserted_embeddings.push((item.turn.id.clone(), emb.clone()));
                }
            }
            tx.commit()?;
        }

        #[cfg(feature = "vector-search")]
        {
            let mut index = self
                .vector_index
                .lock()
                .map_err(|_| StoreError::Init("vector index lock poisoned".into()))?;
            for (id, emb) in &inserted_embeddings {
                index.add(id, emb)?;
            }
        }

        Ok(ids)
    }

    fn insert_row(&self, item: &EnrichedTurn) -> Result<()> {
        let writer = self.writer.lock().map_err(|_| StoreError::Init("writer lock poisoned".into()))?;
        Self::insert_row_conn(&writer, item)
    }

    fn insert_row_conn(conn: &Connection, item: &EnrichedTurn) -> Result<()> {
        let t = &item.turn;
        let embedding_blob = item
            .embedding
            .as_ref()
            .map(|v| crate::embeddings::Embedding::new(v.clone()).to_bytes());

        conn.execute(
            "INSERT INTO turns (
                id, content, content_hash, role, project_key, project_display_name,
                session_key, source_file, sequence_position, timestamp_iso, timestamp_unix,
                has_code, tools_used, content_length,
                topic_scores, primary_topic, topic_confidence,
                solution_quality_score, has_success_markers, has_quality_indicators,
                is_solution_attempt, solution_category,
                previous_turn_id, next_turn_id, related_solution_id, feedback_turn_id,
                feedback_sentiment, validation_strength, is_validated_solution,
                is_refuted_attempt, outcome_certainty,
                troubleshooting_context_score, realtime_learning_boost,
                semantic_sentiment, semantic_confidence, positive_similarity,
                negative_similarity, partial_similarity, technical_domain,
                technical_confidence, complex_outcome_detected, pattern_vs_semantic_agreement,
                primary_analysis_method, requires_manual_review, best_matching_patterns,
                semantic_analysis_details,
                entities, technical_tools, framework_mentions, solution_similarity_score,
                feedback_similarity_score, error_similarity_score, best_pattern_match,
                hybrid_confidence, embedding
            ) VALUES (
                ?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,
                ?23,?24,?25,?26,?27,?28,?29,?30,?31,?32,?33,?34,?35,?36,?37,?38,?39,?40,?41,?42,
                ?43,?44,?45,?46,?47,?48,?49,?50,?51,?52,?53,?54,?55
            )",
            params![
                t.id,
                t.content,
                t.content_hash,
                role_to_str(t.role),
                t.project_key,
                t.project_display_name,
                t.session_key,
                t.source_file,
                t.sequence_position,
                t.timestamp_iso,
                t.timestamp_unix,
                t.has_code as i64,
                serde_json::to_string(&t.tools_used)?,
                t.content_length as i64,
                serde_json::to_string(&t.topic_scores)?,
                t.primary_topic,
                t.topic_confidence,
                t.solution_quality_score,
                t.has_success_markers as i64,
                t.has_quality_indicators as i64,
                t.is_solution_attempt as i64,
                solution_category_to_str(t.solution_category),
                t.previous_turn_id,
                t.next_turn_id,
                t.related_solution_id,
                t.feedback_turn_id,
                t.feedback_sentiment.map(sentiment_to_str),
                t.validation_strength,
                t.is_validated_solution as i64,
                t.is_refuted_attempt as i64,
                t.outcome_certainty,
                t.troubleshooting_context_score,
                t.realtime_learning_boost,
                t.semantic_sentiment.map(sentiment_to_str),
                t.semantic_confidence,
                t.positive_similarity,
                t.negative_similarity,
                t.partial_similarity,
                t.technical_domain.map(domain_to_str),
                t.technical_confidence,
                t.complex_outcome_detected as i64,
                t.pattern_vs_semantic_agreement,
                t.primary_analysis_method.map(method_to_str),
                t.requires_manual_review as i64,
                serde_json::to_string(&t.best_matching_patterns)?,
                serde_json::to_string(&t.semantic_analysis_details)?,
                serde_json::to_string(&t.entities)?,
                serde_json::to_string(&t.technical_tools)?,
                serde_json::to_string(&t.framework_mentions)?,
                t.solution_similarity_score,
                t.feedback_similarity_score,
                t.error_similarity_score,
                t.best_pattern_match,
                t.hybrid_confidence,
                embedding_blob,
            ],
        )?;
        Ok(())
    }

    /// Replace a turn's enrichment fields (used by C2 re-enrichment and C13
    /// maintenance apply). Content/identity fields are left untouched.
    pub fn update_metadata(&self, turn: &Turn) -> Result<()> {
        let writer = self.writer.lock().map_err(|_| StoreError::Init("writer lock poisoned".into()))?;
        let changed = writer.execute(
            "UPDATE turns SET
                topic_scores = ?2, primary_topic = ?3, topic_confidence = ?4,
                solution_quality_score = ?5, has_success_markers = ?6, has_quality_indicators = ?7,
                is_solution_attempt = ?8, solution_category = ?9,
                previous_turn_id = ?10, next_turn_id = ?11, related_solution_id = ?12, feedback_turn_id = ?13,
                feedback_sentiment = ?14, validation_strength = ?15, is_validated_solution = ?16,
                is_refuted_attempt = ?17, outcome_certainty = ?18,
                troubleshooting_context_score = ?19, realtime_learning_boost = ?20,
                semantic_sentiment = ?21, semantic_confidence = ?22, positive_similarity = ?23,
                negative_similarity = ?24, partial_similarity = ?25, technical_domain = ?26,
                technical_confidence = ?27, complex_outcome_detected = ?28, pattern_vs_semantic_agreement = ?29,
                primary_analysis_method = ?30, requires_manual_review = ?31, best_matching_patterns = ?32,
                semantic_analysis_details = ?33,
                entities = ?34, technical_tools = ?35, framework_mentions = ?36,
                solution_similarity_score = ?37, feedback_similarity_score = ?38, error_similarity_score = ?39,
                best_pattern_match = ?40, hybrid_confidence = ?41
             WHERE id = ?1",
            params![
                turn.id,
                serde_json::to_string(&turn.topic_scores)?,
                turn.primary_topic,
                turn.topic_confidence,
                turn.solution_quality_score,
                turn.has_success_markers as i64,
                turn.has_quality_indicators as i64,
                turn.is_solution_attempt as i64,
                solution_category_to_str(turn.solution_category),
                turn.previous_turn_id,
                turn.next_turn_id,
                turn.related_solution_id,
                turn.feedback_turn_id,
                turn.feedback_sentiment.map(sentiment_to_str),
                turn.validation_strength,
                turn.is_validated_solution as i64,
                turn.is_refuted_attempt as i64,
                turn.outcome_certainty,
                turn.troubleshooting_context_score,
                turn.realtime_learning_boost,
                turn.semantic_sentiment.map(sentiment_to_str),
                turn.semantic_confidence,
                turn.positive_similarity,
                turn.negative_similarity,
                turn.partial_similarity,
                turn.technical_domain.map(domain_to_str),
                turn.technical_confidence,
                turn.complex_outcome_detected as i64,
                turn.pattern_vs_semantic_agreement,
                turn.primary_analysis_method.map(method_to_str),
                turn.requires_manual_review as i64,
                serde_json::to_string(&turn.best_matching_patterns)?,
                serde_json::to_string(&turn.semantic_analysis_details)?,
                serde_json::to_string(&turn.entities)?,
                serde_json::to_string(&turn.technical_tools)?,
                serde_json::to_string(&turn.framework_mentions)?,
                turn.solution_similarity_score,
                turn.feedback_similarity_score,
                turn.error_similarity_score,
                turn.best_pattern_match,
                turn.hybrid_confidence,
            ],
        )?;

        if changed == 0 {
            return Err(StoreError::NotFound(turn.id.clone()));
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<Turn>> {
        let reader = self.reader.lock().map_err(|_| StoreError::Init("reader lock poisoned".into()))?;
        let mut stmt = reader.prepare("SELECT * FROM turns WHERE id = ?1")?;
        let turn = stmt.query_row(params![id], row_to_turn).optional()?;
        Ok(turn)
    }

    pub fn count(&self) -> Result<u64> {
        let reader = self.reader.lock().map_err(|_| StoreError::Init("reader lock poisoned".into()))?;
        let count: i64 = reader.query_row("SELECT COUNT(*) FROM turns", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Iterate every stored turn, applying `f` to each. Used by C13's
    /// maintenance scans, which need a full-table walk rather than a ranked
    /// query.
    pub fn iterate(&self, mut f: impl FnMut(&Turn) -> Result<()>) -> Result<()> {
        let reader = self.reader.lock().map_err(|_| StoreError::Init("reader lock poisoned".into()))?;
        let mut stmt = reader.prepare("SELECT * FROM turns ORDER BY rowid")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let turn = row_to_turn(row)?;
            f(&turn)?;
        }
        Ok(())
    }

    /// Turns belonging to a session, in source order, used by C9 chain
    /// back-fill.
    pub fn turns_for_session(&self, session_key: &str) -> Result<Vec<Turn>> {
        let reader = self.reader.lock().map_err(|_| StoreError::Init("reader lock poisoned".into()))?;
        let mut stmt = reader.prepare(
            "SELECT * FROM turns WHERE session_key = ?1 ORDER BY sequence_position ASC, rowid ASC",
        )?;
        let turns = stmt
            .query_map(params![session_key], row_to_turn)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(turns)
    }

    #[cfg(feature = "vector-search")]
    pub fn vector_search(&self, query: &[f32], limit: usize) -> Result<Vec<(String, f32)>> {
        let index = self.vector_index.lock().map_err(|_| StoreError::Init("vector index lock poisoned".into()))?;
        Ok(index.search(query, limit)?)
    }

    #[cfg(feature = "vector-search")]
    pub fn vector_index_len(&self) -> Result<usize> {
        let index = self.vector_index.lock().map_err(|_| StoreError::Init("vector index lock poisoned".into()))?;
        Ok(index.len())
    }
}

fn role_to_str(r: Role) -> &'static str {
    match r {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Unknown => "unknown",
    }
}

fn sentiment_to_str(s: Sentiment) -> &'static str {
    match s {
        Sentiment::Positive => "positive",
        Sentiment::Negative => "negative",
        Sentiment::Partial => "partial",
        Sentiment::Neutral => "neutral",
    }
}

fn sentiment_from_str(s: &str) -> Option<Sentiment> {
    match s {
        "positive" => Some(Sentiment::Positive),
        "negative" => Some(Sentiment::Negative),
        "partial" => Some(Sentiment::Partial),
        "neutral" => Some(Sentiment::Neutral),
        _ => None,
    }
}

fn solution_category_to_str(c: SolutionCategory) -> &'static str {
    match c {
        SolutionCategory::CodeFix => "code_fix",
        SolutionCategory::ConfigChange => "config_change",
        SolutionCategory::DebuggingHelp => "debugging_help",
        SolutionCategory::ApproachSuggestion => "approach_suggestion",
        SolutionCategory::CommandSolution => "command_solution",
        SolutionCategory::FileOperation => "file_operation",
        SolutionCategory::GeneralGuidance => "general_guidance",
        SolutionCategory::None => "none",
    }
}

fn solution_category_from_str(s: &str) -> SolutionCategory {
    match s {
        "code_fix" => SolutionCategory::CodeFix,
        "config_change" => SolutionCategory::ConfigChange,
        "debugging_help" => SolutionCategory::DebuggingHelp,
        "approach_suggestion" => SolutionCategory::ApproachSuggestion,
        "command_solution" => SolutionCategory::CommandSolution,
        "file_operation" => SolutionCategory::FileOperation,
        "general_guidance" => SolutionCategory::GeneralGuidance,
        _ => SolutionCategory::None,
    }
}

fn domain_to_str(d: TechnicalDomain) -> &'static str {
    match d {
        TechnicalDomain::BuildSystem => "build_system",
        TechnicalDomain::Testing => "testing",
        TechnicalDomain::Runtime => "runtime",
        TechnicalDomain::Deployment => "deployment",
    }
}

fn domain_from_str(s: &str) -> Option<TechnicalDomain> {
    match s {
        "build_system" => Some(TechnicalDomain::BuildSystem),
        "testing" => Some(TechnicalDomain::Testing),
        "runtime" => Some(TechnicalDomain::Runtime),
        "deployment" => Some(TechnicalDomain::Deployment),
        _ => None,
    }
}

fn method_to_str(m: AnalysisMethod) -> &'static str {
    match m {
        AnalysisMethod::Pattern => "pattern",
        AnalysisMethod::Semantic => "semantic",
        AnalysisMethod::Fused => "fused",
    }
}

fn method_from_str(s: &str) -> Option<AnalysisMethod> {
    match s {
        "pattern" => Some(AnalysisMethod::Pattern),
        "semantic" => Some(AnalysisMethod::Semantic),
        "fused" => Some(AnalysisMethod::Fused),
        _ => None,
    }
}

fn row_to_turn(row: &rusqlite::Row) -> rusqlite::Result<Turn> {
    let tools_used: String = row.get("tools_used")?;
    let topic_scores: String = row.get("topic_scores")?;
    let best_matching_patterns: String = row.get("best_matching_patterns")?;
    let semantic_analysis_details: String = row.get("semantic_analysis_details")?;
    let entities: String = row.get("entities")?;
    let technical_tools: String = row.get("technical_tools")?;
    let framework_mentions: String = row.get("framework_mentions")?;
    let role: String = row.get("role")?;
    let solution_category: String = row.get("solution_category")?;
    let feedback_sentiment: Option<String> = row.get("feedback_sentiment")?;
    let semantic_sentiment: Option<String> = row.get("semantic_sentiment")?;
    let technical_domain: Option<String> = row.get("technical_domain")?;
    let primary_analysis_method: Option<String> = row.get("primary_analysis_method")?;

    Ok(Turn {
        id: row.get("id")?,
        content: row.get("content")?,
        content_hash: row.get("content_hash")?,
        role: match role.as_str() {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            _ => Role::Unknown,
        },
        project_key: row.get("project_key")?,
        project_display_name: row.get("project_display_name")?,
        session_key: row.get("session_key")?,
        source_file: row.get("source_file")?,
        sequence_position: row.get::<_, Option<i64>>("sequence_position")?.map(|v| v as u64),
        timestamp_iso: row.get("timestamp_iso")?,
        timestamp_unix: row.get("timestamp_unix")?,
        has_code: row.get::<_, i64>("has_code")? != 0,
        tools_used: serde_json::from_str(&tools_used).unwrap_or_default(),
        content_length: row.get::<_, i64>("content_length")? as usize,
        topic_scores: serde_json::from_str(&topic_scores).unwrap_or_default(),
        primary_topic: row.get("primary_topic")?,
        topic_confidence: row.get("topic_confidence")?,
        solution_quality_score: row.get("solution_quality_score")?,
        has_success_markers: row.get::<_, i64>("has_success_markers")? != 0,
        has_quality_indicators: row.get::<_, i64>("has_quality_indicators")? != 0,
        is_solution_attempt: row.get::<_, i64>("is_solution_attempt")? != 0,
        solution_category: solution_category_from_str(&solution_category),
        previous_turn_id: row.get("previous_turn_id")?,
        next_turn_id: row.get("next_turn_id")?,
        related_solution_id: row.get("related_solution_id")?,
        feedback_turn_id: row.get("feedback_turn_id")?,
        feedback_sentiment: feedback_sentiment.as_deref().and_then(sentiment_from_str),
        validation_strength: row.get("validation_strength")?,
        is_validated_solution: row.get::<_, i64>("is_validated_solution")? != 0,
        is_refuted_attempt: row.get::<_, i64>("is_refuted_attempt")? != 0,
        outcome_certainty: row.get("outcome_certainty")?,
        troubleshooting_context_score: row.get("troubleshooting_context_score")?,
        realtime_learning_boost: row.get("realtime_learning_boost")?,
        semantic_sentiment: semantic_sentiment.as_deref().and_then(sentiment_from_str),
        semantic_confidence: row.get("semantic_confidence")?,
        positive_similarity: row.get("positive_similarity")?,
        negative_similarity: row.get("negative_similarity")?,
        partial_similarity: row.get("partial_similarity")?,
        technical_domain: technical_domain.as_deref().and_then(domain_from_str),
        technical_confidence: row.get("technical_confidence")?,
        complex_outcome_detected: row.get::<_, i64>("complex_outcome_detected")? != 0,
        pattern_vs_semantic_agreement: row.get("pattern_vs_semantic_agreement")?,
        primary_analysis_method: primary_analysis_method.as_deref().and_then(method_from_str),
        requires_manual_review: row.get::<_, i64>("requires_manual_review")? != 0,
        best_matching_patterns: serde_json::from_str(&best_matching_patterns).unwrap_or_default(),
        semantic_analysis_details: serde_json::from_str(&semantic_analysis_details)
            .unwrap_or_else(|_| serde_json::json!({})),
        entities: serde_json::from_str(&entities).unwrap_or_default(),
        technical_tools: serde_json::from_str(&technical_tools).unwrap_or_default(),
        framework_mentions: serde_json::from_str(&framework_mentions).unwrap_or_default(),
        solution_similarity_score: row.get("solution_similarity_score")?,
        feedback_similarity_score: row.get("feedback_similarity_score")?,
        error_similarity_score: row.get("error_similarity_score")?,
        best_pattern_match: row.get("best_pattern_match")?,
        hybrid_confidence: row.get("hybrid_confidence")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turn::{content_hash, Turn};

    fn sample_turn(id: &str, content: &str, session: &str, seq: u64) -> EnrichedTurn {
        let mut turn = crate::turn::tests_support::blank(id, content, session, seq);
        turn.clamp_fields();
        EnrichedTurn { turn, embedding: None }
    }

    #[test]
    fn add_one_dedups_by_content_hash() {
        let store = Store::open_in_memory().unwrap();
        let a = sample_turn("a", "same content", "s1", 0);
        let mut b = sample_turn("b", "same content", "s1", 1);
        b.turn.content_hash = content_hash("same content");

        assert!(store.add_one(&a).unwrap().is_some());
        assert!(store.add_one(&b).unwrap().is_none());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn update_metadata_round_trips_enrichment_fields() {
        let store = Store::open_in_memory().unwrap();
        let item = sample_turn("a", "hello", "s1", 0);
        store.add_one(&item).unwrap();

        let mut turn = store.get("a").unwrap().unwrap();
        turn.solution_quality_score = 2.5;
        turn.is_validated_solution = true;
        turn.topic_scores.insert("debugging".into(), 1.2);
        store.update_metadata(&turn).unwrap();

        let reloaded = store.get("a").unwrap().unwrap();
        assert_eq!(reloaded.solution_quality_score, 2.5);
        assert!(reloaded.is_validated_solution);
        assert_eq!(reloaded.topic_scores.get("debugging"), Some(&1.2));
    }

    #[test]
    fn add_batch_over_max_batch_sub_batches_correctly() {
        let store = Store::open_in_memory().unwrap();
        let items: Vec<EnrichedTurn> = (0..(MAX_BATCH * 2 + 5))
            .map(|i| sample_turn(&format!("id-{i}"), &format!("content {i}"), "s1", i as u64))
            .collect();

        let ids = store.add_batch(&items).unwrap();
        assert_eq!(ids.len(), items.len());
        assert_eq!(store.count().unwrap(), items.len() as u64);
    }

    #[test]
    fn turns_for_session_orders_by_sequence_position() {
        let store = Store::open_in_memory().unwrap();
        store.add_one(&sample_turn("b", "second", "s1", 1)).unwrap();
        store.add_one(&sample_turn("a", "first", "s1", 0)).unwrap();

        let turns = store.turns_for_session("s1").unwrap();
        assert_eq!(turns.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
