//! Adjacency & chain builder (C9)
//!
//! Runs once per session after ingestion, linking each solution-attempt
//! Turn to the feedback Turn that follows it and propagating the feedback's
//! sentiment back onto the solution's outcome fields. Idempotent: running it
//! twice over the same session produces identical stored metadata.

use crate::enrichment::{fusion, pattern_feedback, semantic_feedback::SemanticFeedbackAnalyzer, technical_context};
use crate::store::Store;
use crate::turn::{Role, Turn};

/// Back-fill adjacency and validation-outcome fields for one session.
/// Returns the ids of turns whose metadata changed.
pub fn backfill_session(store: &Store, session_key: &str, semantic: &SemanticFeedbackAnalyzer) -> crate::store::Result<Vec<String>> {
    let mut turns = store.turns_for_session(session_key)?;
    if turns.is_empty() {
        return Ok(vec![]);
    }

    // Step 1: sequence links.
    for i in 0..turns.len() {
        turns[i].sequence_position = Some(i as u64);
        turns[i].previous_turn_id = if i > 0 { Some(turns[i - 1].id.clone()) } else { None };
        turns[i].next_turn_id = turns.get(i + 1).map(|t| t.id.clone());
    }

    // Step 2: pair each assistant solution attempt with the next user turn.
    for i in 0..turns.len() {
        if turns[i].role == Role::Assistant && turns[i].is_solution_attempt {
            if let Some(next) = turns.get(i + 1) {
                if next.role == Role::User {
                    let next_id = next.id.clone();
                    let solution_id = turns[i].id.clone();
                    turns[i].feedback_turn_id = Some(next_id.clone());
                    if let Some(user_turn) = turns.iter_mut().find(|t| t.id == next_id) {
                        user_turn.related_solution_id = Some(solution_id);
                    }
                }
            }
        }
    }

    // Step 3: analyse each feedback turn and propagate outcome onto its
    // related solution turn.
    let feedback_updates: Vec<(String, String, f32, crate::turn::Sentiment)> = turns
        .iter()
        .filter_map(|t| {
            let solution_id = t.related_solution_id.as_ref()?;
            let (pattern, _) = pattern_feedback::analyze(&t.content);
            let semantic_result = semantic.analyze(&t.content);
            let technical_result = technical_context::analyze(&t.content, &[]);
            let fused = fusion::fuse(&pattern, &semantic_result, Some(&technical_result));

            let validation_strength = match fused.sentiment {
                crate::turn::Sentiment::Positive => pattern.strength * fused.confidence,
                crate::turn::Sentiment::Negative => -pattern.strength * fused.confidence,
                crate::turn::Sentiment::Partial => pattern.strength * fused.confidence * 0.5,
                crate::turn::Sentiment::Neutral => 0.0,
            };
            Some((solution_id.clone(), t.id.clone(), validation_strength, fused.sentiment))
        })
        .collect();

    let mut changed_ids = Vec::new();
    for turn in turns.iter_mut() {
        changed_ids.push(turn.id.clone());
    }

    for (solution_id, feedback_id, strength, sentiment) in feedback_updates {
        if let Some(solution) = turns.iter_mut().find(|t| t.id == solution_id) {
            solution.validation_strength = strength;
            solution.is_validated_solution = sentiment == crate::turn::Sentiment::Positive;
            solution.is_refuted_attempt = sentiment == crate::turn::Sentiment::Negative;
            solution.feedback_turn_id = Some(feedback_id);
            solution.clamp_fields();
        }
    }

    write_back(store, &turns)?;
    Ok(changed_ids)
}

fn write_back(store: &Store, turns: &[Turn]) -> crate::store::Result<()> {
    for turn in turns {
        store.update_metadata(turn)?;
    }
    Ok(())
}
