//! Database schema.

/// A database migration.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "initial turn schema",
    up: MIGRATION_V1_UP,
}];

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS turns (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    role TEXT NOT NULL DEFAULT 'unknown',
    project_key TEXT,
    project_display_name TEXT,
    session_key TEXT,
    source_file TEXT,
    sequence_position INTEGER,
    timestamp_iso TEXT,
    timestamp_unix REAL,
    has_code INTEGER NOT NULL DEFAULT 0,
    tools_used TEXT NOT NULL DEFAULT '[]',
    content_length INTEGER NOT NULL DEFAULT 0,

    topic_scores TEXT NOT NULL DEFAULT '{}',
    primary_topic TEXT,
    topic_confidence REAL NOT NULL DEFAULT 0.0,

    solution_quality_score REAL NOT NULL DEFAULT 0.1,
    has_success_markers INTEGER NOT NULL DEFAULT 0,
    has_quality_indicators INTEGER NOT NULL DEFAULT 0,
    is_solution_attempt INTEGER NOT NULL DEFAULT 0,
    solution_category TEXT NOT NULL DEFAULT 'none',

    previous_turn_id TEXT,
    next_turn_id TEXT,
    related_solution_id TEXT,
    feedback_turn_id TEXT,

    feedback_sentiment TEXT,
    validation_strength REAL NOT NULL DEFAULT 0.0,
    is_validated_solution INTEGER NOT NULL DEFAULT 0,
    is_refuted_attempt INTEGER NOT NULL DEFAULT 0,
    outcome_certainty REAL NOT NULL DEFAULT 0.0,

    troubleshooting_context_score REAL NOT NULL DEFAULT 1.0,
    realtime_learning_boost REAL NOT NULL DEFAULT 1.0,

    semantic_sentiment TEXT,
    semantic_confidence REAL NOT NULL DEFAULT 0.0,
    positive_similarity REAL NOT NULL DEFAULT 0.0,
    negative_similarity REAL NOT NULL DEFAULT 0.0,
    partial_similarity REAL NOT NULL DEFAULT 0.0,
    technical_domain TEXT,
    technical_confidence REAL NOT NULL DEFAULT 0.0,
    complex_outcome_detected INTEGER NOT NULL DEFAULT 0,
    pattern_vs_semantic_agreement REAL NOT NULL DEFAULT 0.0,
    primary_analysis_method TEXT,
    requires_manual_review INTEGER NOT NULL DEFAULT 0,
    best_matching_patterns TEXT NOT NULL DEFAULT '[]',
    semantic_analysis_details TEXT NOT NULL DEFAULT '{}',

    entities TEXT NOT NULL DEFAULT '[]',
    technical_tools TEXT NOT NULL DEFAULT '[]',
    framework_mentions TEXT NOT NULL DEFAULT '[]',
    solution_similarity_score REAL NOT NULL DEFAULT 0.0,
    feedback_similarity_score REAL NOT NULL DEFAULT 0.0,
    error_similarity_score REAL NOT NULL DEFAULT 0.0,
    best_pattern_match TEXT,
    hybrid_confidence REAL NOT NULL DEFAULT 0.0,

    embedding BLOB
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_turns_content_hash ON turns(content_hash);
CREATE INDEX IF NOT EXISTS idx_turns_session_key ON turns(session_key);
CREATE INDEX IF NOT EXISTS idx_turns_project_key ON turns(project_key);
CREATE INDEX IF NOT EXISTS idx_turns_timestamp_unix ON turns(timestamp_unix);
CREATE INDEX IF NOT EXISTS idx_turns_is_validated ON turns(is_validated_solution);

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;

    let current: u32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| row.get(0))
        .unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current {
            conn.execute_batch(migration.up)?;
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                rusqlite::params![migration.version],
            )?;
            tracing::debug!(
                version = migration.version,
                description = migration.description,
                "applied migration"
            );
        }
    }

    Ok(())
}
