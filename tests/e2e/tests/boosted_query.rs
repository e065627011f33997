//! End-to-end: the boosted query engine ranks a validated, recent,
//! topic-matching turn above a plain unrelated one, and the overall boost
//! product never exceeds its documented cap.
//!
//! Requires the local embedding model to be available (downloaded into the
//! fastembed cache on first run); this mirrors how the gateway is exercised
//! in production rather than mocking it out.

#![cfg(all(feature = "embeddings", feature = "vector-search"))]

use turnvault_core::enrichment::{EnrichmentContext, EnrichmentProcessor};
use turnvault_core::query::{query, QueryFilter, QueryFlags, QueryRequest, ValidationPreference};
use turnvault_core::{backfill_session, EmbeddingService, EnrichedTurn, RawTurn, Role, Store};

fn raw(id: &str, seq: u64, role: Role, content: &str) -> RawTurn {
    RawTurn {
        id: Some(id.to_string()),
        content: content.to_string(),
        role,
        project_key: Some("/proj".to_string()),
        project_display_name: Some("/proj".to_string()),
        session_key: Some("session-q".to_string()),
        source_file: None,
        sequence_position: Some(seq),
        timestamp_iso: None,
        timestamp_unix: Some(seq as f64),
        tools_used: vec![],
    }
}

#[test]
fn validated_solution_outranks_an_unrelated_turn() {
    let store = Store::open_in_memory().expect("open store");
    let processor = EnrichmentProcessor::new();
    let embedding_service = EmbeddingService::new();
    let ctx = EnrichmentContext::default();

    let solution_content =
        "Run `cargo build --release` and add `opt-level = 3` to Cargo.toml to fix the slow build.";
    let solution = processor.enrich(raw("solution-1", 0, Role::Assistant, solution_content), &ctx);
    let feedback = processor.enrich(raw("feedback-1", 1, Role::User, "That fixed it, builds are fast now."), &ctx);
    let unrelated = processor.enrich(raw("unrelated-1", 2, Role::Assistant, "The weather today is sunny and mild."), &ctx);

    for turn in [solution, feedback, unrelated] {
        let embedding = embedding_service.embed(&turn.content).expect("embed");
        store.add_one(&EnrichedTurn { turn, embedding: Some(embedding.vector) }).expect("insert");
    }

    let semantic = turnvault_core::enrichment::semantic_feedback::SemanticFeedbackAnalyzer::new();
    backfill_session(&store, "session-q", &semantic).expect("backfill");

    let request = QueryRequest {
        text: "how do I make cargo builds faster".to_string(),
        project_context: Some("/proj".to_string()),
        n: 5,
        flags: QueryFlags {
            validation_preference: ValidationPreference::ValidatedOnly,
            prefer_solutions: true,
            ..Default::default()
        },
        filter: QueryFilter::default(),
    };

    let results = query(&store, &embedding_service, &request, 10.0).expect("query");
    assert!(!results.is_empty());
    assert_eq!(results[0].turn.id, "solution-1");
    assert!(results.iter().all(|r| r.boosts.project_boost * r.boosts.topic_boost * r.boosts.quality_boost
        * r.boosts.validation_boost * r.boosts.troubleshooting_boost * r.boosts.recency_boost
        <= 8.0 + f32::EPSILON));
}

#[test]
fn role_filter_excludes_non_matching_turns() {
    let store = Store::open_in_memory().expect("open store");
    let processor = EnrichmentProcessor::new();
    let embedding_service = EmbeddingService::new();
    let ctx = EnrichmentContext::default();

    let user_turn = processor.enrich(raw("u-1", 0, Role::User, "why is my server crashing"), &ctx);
    let assistant_turn = processor.enrich(raw("a-1", 1, Role::Assistant, "Check your server logs for crash details."), &ctx);

    for turn in [user_turn, assistant_turn] {
        let embedding = embedding_service.embed(&turn.content).expect("embed");
        store.add_one(&EnrichedTurn { turn, embedding: Some(embedding.vector) }).expect("insert");
    }

    let request = QueryRequest {
        text: "server crash logs".to_string(),
        project_context: None,
        n: 5,
        flags: QueryFlags::default(),
        filter: QueryFilter { role: Some(Role::Assistant), ..Default::default() },
    };

    let results = query(&store, &embedding_service, &request, 0.0).expect("query");
    assert!(results.iter().all(|r| r.turn.role == Role::Assistant));
}
