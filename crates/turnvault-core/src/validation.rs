//! Validation learner (C12)
//!
//! Applies feedback analysis to a single solution/feedback pair outside of
//! the bulk chain backfill (C9), for callers that want to record validation
//! incrementally as feedback turns arrive (e.g. a hook producer).

use std::sync::Mutex;

use crate::enrichment::{fusion, pattern_feedback, semantic_feedback::SemanticFeedbackAnalyzer, technical_context};
use crate::store::Store;
use crate::turn::Sentiment;

#[derive(Debug, Default)]
struct Counters {
    validated: u64,
    refuted: u64,
    strength_sum: f32,
    observations: u64,
}

/// In-process aggregate of validation outcomes, used by the neutral
/// preference mode of the query engine and by health reporting.
#[derive(Debug, Default)]
pub struct ValidationLearner {
    counters: Mutex<Counters>,
}

#[derive(Debug, Clone, Copy)]
pub struct ValidationOutcome {
    pub validation_strength: f32,
    pub is_validated_solution: bool,
    pub is_refuted_attempt: bool,
}

impl ValidationLearner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyse `feedback_content` against the solution it responds to and
    /// persist the resulting outcome onto the solution turn in `store`.
    pub fn process_feedback(
        &self,
        store: &Store,
        solution_id: &str,
        feedback_id: &str,
        feedback_content: &str,
        semantic: &SemanticFeedbackAnalyzer,
    ) -> crate::store::Result<Option<ValidationOutcome>> {
        let Some(mut solution) = store.get(solution_id)? else { return Ok(None) };

        let (pattern, _) = pattern_feedback::analyze(feedback_content);
        let semantic_result = semantic.analyze(feedback_content);
        let technical_result = technical_context::analyze(feedback_content, &[]);
        let fused = fusion::fuse(&pattern, &semantic_result, Some(&technical_result));

        let validation_strength = match fused.sentiment {
            Sentiment::Positive => pattern.strength * fused.confidence,
            Sentiment::Negative => -pattern.strength * fused.confidence,
            Sentiment::Partial => pattern.strength * fused.confidence * 0.5,
            Sentiment::Neutral => 0.0,
        };

        solution.validation_strength = validation_strength;
        solution.is_validated_solution = fused.sentiment == Sentiment::Positive;
        solution.is_refuted_attempt = fused.sentiment == Sentiment::Negative;
        solution.feedback_turn_id = Some(feedback_id.to_string());
        solution.clamp_fields();

        store.update_metadata(&solution)?;
        self.record(validation_strength);

        Ok(Some(ValidationOutcome {
            validation_strength: solution.validation_strength,
            is_validated_solution: solution.is_validated_solution,
            is_refuted_attempt: solution.is_refuted_attempt,
        }))
    }

    fn record(&self, strength: f32) {
        let mut counters = self.counters.lock().expect("counters mutex poisoned");
        counters.observations += 1;
        counters.strength_sum += strength;
        if strength > 0.0 {
            counters.validated += 1;
        } else if strength < 0.0 {
            counters.refuted += 1;
        }
    }

    pub fn validated_count(&self) -> u64 {
        self.counters.lock().expect("counters mutex poisoned").validated
    }

    pub fn refuted_count(&self) -> u64 {
        self.counters.lock().expect("counters mutex poisoned").refuted
    }

    pub fn mean_validation_strength(&self) -> f32 {
        let counters = self.counters.lock().expect("counters mutex poisoned");
        if counters.observations == 0 {
            0.0
        } else {
            counters.strength_sum / counters.observations as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EnrichedTurn, Store};
    use crate::turn::tests_support::blank;
    use crate::turn::Role;

    #[test]
    fn process_feedback_marks_solution_validated_and_updates_counters() {
        let store = Store::open_in_memory().unwrap();
        let mut solution = blank("a1", "here's the fix: apply the patch", "s1", 1);
        solution.role = Role::Assistant;
        solution.is_solution_attempt = true;
        store.add_one(&EnrichedTurn { turn: solution, embedding: None }).unwrap();

        let learner = ValidationLearner::new();
        let semantic = SemanticFeedbackAnalyzer::new();
        let outcome = learner
            .process_feedback(&store, "a1", "f1", "that works perfectly now, thank you", &semantic)
            .unwrap()
            .unwrap();

        assert!(outcome.is_validated_solution);
        assert_eq!(learner.validated_count(), 1);
        assert_eq!(learner.refuted_count(), 0);
        assert!(learner.mean_validation_strength() > 0.0);

        let persisted = store.get("a1").unwrap().unwrap();
        assert!(persisted.is_validated_solution);
        assert_eq!(persisted.feedback_turn_id.as_deref(), Some("f1"));
    }

    #[test]
    fn process_feedback_does_not_validate_partial_feedback() {
        let store = Store::open_in_memory().unwrap();
        let mut solution = blank("a1", "here's the fix: apply the patch", "s1", 1);
        solution.role = Role::Assistant;
        solution.is_solution_attempt = true;
        store.add_one(&EnrichedTurn { turn: solution, embedding: None }).unwrap();

        let learner = ValidationLearner::new();
        let semantic = SemanticFeedbackAnalyzer::new();
        let outcome = learner
            .process_feedback(&store, "a1", "f1", "partially works, somewhat better, almost there", &semantic)
            .unwrap()
            .unwrap();

        assert!(!outcome.is_validated_solution);
        assert!(!outcome.is_refuted_attempt);
    }

    #[test]
    fn process_feedback_returns_none_for_missing_solution() {
        let store = Store::open_in_memory().unwrap();
        let learner = ValidationLearner::new();
        let semantic = SemanticFeedbackAnalyzer::new();
        let result = learner
            .process_feedback(&store, "missing", "f1", "still broken", &semantic)
            .unwrap();
        assert!(result.is_none());
    }
}
