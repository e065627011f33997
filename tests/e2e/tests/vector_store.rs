//! End-to-end: embeddings persisted alongside a turn are queryable through
//! the store's HNSW-backed vector search, and are rebuilt into the index on
//! a fresh `Store::open_in_memory` style re-load path.

#![cfg(feature = "vector-search")]

use turnvault_core::{EnrichedTurn, RawTurn, Role, Store};

fn vector(seed: f32) -> Vec<f32> {
    (0..turnvault_core::DEFAULT_DIMENSIONS)
        .map(|i| ((i as f32 + seed) / turnvault_core::DEFAULT_DIMENSIONS as f32).sin())
        .collect()
}

fn plain_turn(id: &str, content: &str) -> RawTurn {
    RawTurn {
        id: Some(id.to_string()),
        content: content.to_string(),
        role: Role::Assistant,
        project_key: None,
        project_display_name: None,
        session_key: Some("s-vec".to_string()),
        source_file: None,
        sequence_position: None,
        timestamp_iso: None,
        timestamp_unix: None,
        tools_used: vec![],
    }
}

#[test]
fn search_returns_the_nearest_neighbour_first() {
    let store = Store::open_in_memory().expect("open store");
    let processor = turnvault_core::EnrichmentProcessor::new();
    let ctx = turnvault_core::EnrichmentContext::default();

    for (id, seed) in [("a", 1.0_f32), ("b", 2.0), ("c", 100.0)] {
        let turn = processor.enrich(plain_turn(id, &format!("turn {id}")), &ctx);
        store
            .add_one(&EnrichedTurn { turn, embedding: Some(vector(seed)) })
            .expect("insert");
    }

    let results = store.vector_search(&vector(1.0), 3).expect("search");
    assert!(!results.is_empty());
    assert_eq!(results[0].0, "a");
}

#[test]
fn turns_without_embeddings_are_not_indexed() {
    let store = Store::open_in_memory().expect("open store");
    let processor = turnvault_core::EnrichmentProcessor::new();
    let ctx = turnvault_core::EnrichmentContext::default();

    let turn = processor.enrich(plain_turn("no-embed", "no embedding for this one"), &ctx);
    store.add_one(&EnrichedTurn { turn, embedding: None }).unwrap();

    assert_eq!(store.vector_index_len().unwrap(), 0);
    let results = store.vector_search(&vector(1.0), 5).unwrap();
    assert!(results.is_empty());
}
