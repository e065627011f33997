//! End-to-end: backfilling a session links adjacency and propagates
//! feedback sentiment back onto the solution turn it responds to.

use turnvault_core::enrichment::semantic_feedback::SemanticFeedbackAnalyzer;
use turnvault_core::enrichment::{EnrichmentContext, EnrichmentProcessor};
use turnvault_core::{backfill_session, EnrichedTurn, RawTurn, Role, Store};

fn raw(id: &str, seq: u64, role: Role, content: &str) -> RawTurn {
    RawTurn {
        id: Some(id.to_string()),
        content: content.to_string(),
        role,
        project_key: Some("/proj".to_string()),
        project_display_name: Some("/proj".to_string()),
        session_key: Some("session-chain".to_string()),
        source_file: None,
        sequence_position: Some(seq),
        timestamp_iso: None,
        timestamp_unix: Some(seq as f64),
        tools_used: vec![],
    }
}

fn seed(store: &Store, processor: &EnrichmentProcessor) {
    let ctx = EnrichmentContext::default();
    let solution = processor.enrich(
        raw(
            "solution-1",
            0,
            Role::Assistant,
            "Try adding `#[derive(Debug)]` to the struct, that should fix the compile error.",
        ),
        &ctx,
    );
    let feedback = processor.enrich(
        raw("feedback-1", 1, Role::User, "That worked, thanks! It compiles now."),
        &ctx,
    );

    store.add_one(&EnrichedTurn { turn: solution, embedding: None }).unwrap();
    store.add_one(&EnrichedTurn { turn: feedback, embedding: None }).unwrap();
}

#[test]
fn backfill_links_adjacency_and_validates_solution() {
    let store = Store::open_in_memory().expect("open store");
    let processor = EnrichmentProcessor::new();
    seed(&store, &processor);

    let semantic = SemanticFeedbackAnalyzer::new();
    let changed = backfill_session(&store, "session-chain", &semantic).expect("backfill");
    assert!(!changed.is_empty());

    let turns = store.turns_for_session("session-chain").expect("session turns");
    assert_eq!(turns.len(), 2);

    let solution = turns.iter().find(|t| t.id == "solution-1").unwrap();
    assert_eq!(solution.next_turn_id.as_deref(), Some("feedback-1"));
    assert_eq!(solution.feedback_turn_id.as_deref(), Some("feedback-1"));

    let feedback = turns.iter().find(|t| t.id == "feedback-1").unwrap();
    assert_eq!(feedback.previous_turn_id.as_deref(), Some("solution-1"));
    assert_eq!(feedback.related_solution_id.as_deref(), Some("solution-1"));
}

#[test]
fn backfill_is_idempotent() {
    let store = Store::open_in_memory().expect("open store");
    let processor = EnrichmentProcessor::new();
    seed(&store, &processor);

    let semantic = SemanticFeedbackAnalyzer::new();
    backfill_session(&store, "session-chain", &semantic).unwrap();
    let first_pass = store.turns_for_session("session-chain").unwrap();

    backfill_session(&store, "session-chain", &semantic).unwrap();
    let second_pass = store.turns_for_session("session-chain").unwrap();

    let sol_1 = first_pass.iter().find(|t| t.id == "solution-1").unwrap();
    let sol_2 = second_pass.iter().find(|t| t.id == "solution-1").unwrap();
    assert_eq!(sol_1.validation_strength, sol_2.validation_strength);
    assert_eq!(sol_1.is_validated_solution, sol_2.is_validated_solution);
}

#[test]
fn empty_session_returns_no_changes() {
    let store = Store::open_in_memory().expect("open store");
    let semantic = SemanticFeedbackAnalyzer::new();
    let changed = backfill_session(&store, "no-such-session", &semantic).expect("backfill");
    assert!(changed.is_empty());
}
