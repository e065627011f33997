//! Enrichment pipeline (C2-C8)
//!
//! [`EnrichmentProcessor`] is constructed once per producer (bulk importer or
//! hook listener) and reused across every turn it enriches; creating one per
//! turn would re-construct the semantic analyzer's prototype centroids and
//! defeats the embedding gateway's single-construction contract (C1).

pub mod fusion;
pub mod hybrid_extractor;
pub mod pattern_feedback;
pub mod semantic_feedback;
pub mod technical_context;
pub mod topic;

use crate::turn::{content_hash, empty_content_placeholder, AnalysisMethod, RawTurn, Role, Turn};
use hybrid_extractor::HybridExtractor;
use semantic_feedback::SemanticFeedbackAnalyzer;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;
use uuid::Uuid;

/// Where a raw turn originated, per §6.1/§6.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichmentSource {
    Hook,
    Bulk,
}

/// Per-call context threaded alongside a raw turn (§4.2).
#[derive(Debug, Clone, Default)]
pub struct EnrichmentContext {
    pub previous_turn_id: Option<String>,
    pub next_turn_id: Option<String>,
    pub source: Option<EnrichmentSource>,
    pub troubleshooting_mode: bool,
    /// Tools used by the solution this turn is feedback on, when known;
    /// feeds C6's solution-context boost.
    pub solution_tools: Vec<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ProcessorStats {
    pub count: u64,
    pub mean_latency_ms: f64,
    pub analyzer_success: HashMap<&'static str, u64>,
    pub analyzer_errors: HashMap<&'static str, u64>,
}

impl ProcessorStats {
    fn record_latency(&mut self, elapsed_ms: f64) {
        self.count += 1;
        self.mean_latency_ms += (elapsed_ms - self.mean_latency_ms) / self.count as f64;
    }

    fn record_success(&mut self, analyzer: &'static str) {
        *self.analyzer_success.entry(analyzer).or_insert(0) += 1;
    }

    fn record_error(&mut self, analyzer: &'static str) {
        *self.analyzer_errors.entry(analyzer).or_insert(0) += 1;
    }
}

/// The enrichment pipeline: one instance shared by every turn a producer
/// ingests (§4.2, §8 performance contract).
pub struct EnrichmentProcessor {
    semantic: SemanticFeedbackAnalyzer,
    hybrid: HybridExtractor,
    stats: Mutex<ProcessorStats>,
}

impl EnrichmentProcessor {
    pub fn new() -> Self {
        Self {
            semantic: SemanticFeedbackAnalyzer::new(),
            hybrid: HybridExtractor::new(),
            stats: Mutex::new(ProcessorStats::default()),
        }
    }

    pub fn stats(&self) -> ProcessorStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn guarded<T>(&self, analyzer: &'static str, f: impl FnOnce() -> T + std::panic::UnwindSafe) -> Option<T> {
        match std::panic::catch_unwind(f) {
            Ok(value) => {
                if let Ok(mut stats) = self.stats.lock() {
                    stats.record_success(analyzer);
                }
                Some(value)
            }
            Err(_) => {
                tracing::warn!(analyzer, "enrichment analyzer panicked, using defaults");
                if let Ok(mut stats) = self.stats.lock() {
                    stats.record_error(analyzer);
                }
                None
            }
        }
    }

    /// Enrich one raw turn. Never fails: any analyzer failure degrades only
    /// that analyzer's fields to documented defaults (§4.2 error policy).
    pub fn enrich(&self, raw: RawTurn, ctx: &EnrichmentContext) -> Turn {
        let start = Instant::now();

        let content = if raw.content.trim().is_empty() {
            empty_content_placeholder(raw.id.as_deref().unwrap_or("unknown"))
        } else {
            raw.content.clone()
        };

        let id = raw.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let has_code = content.contains("```");

        let mut turn = Turn {
            id,
            content_hash: content_hash(&content),
            content,
            role: raw.role,
            project_key: raw.project_key,
            project_display_name: raw.project_display_name,
            session_key: raw.session_key,
            source_file: raw.source_file,
            sequence_position: raw.sequence_position,
            timestamp_iso: raw.timestamp_iso,
            timestamp_unix: raw.timestamp_unix,
            has_code,
            tools_used: raw.tools_used,
            content_length: 0,
            topic_scores: Default::default(),
            primary_topic: None,
            topic_confidence: 0.0,
            solution_quality_score: 0.1,
            has_success_markers: false,
            has_quality_indicators: false,
            is_solution_attempt: false,
            solution_category: crate::turn::SolutionCategory::None,
            previous_turn_id: ctx.previous_turn_id.clone(),
            next_turn_id: ctx.next_turn_id.clone(),
            related_solution_id: None,
            feedback_turn_id: None,
            feedback_sentiment: None,
            validation_strength: 0.0,
            is_validated_solution: false,
            is_refuted_attempt: false,
            outcome_certainty: 0.0,
            troubleshooting_context_score: 1.0,
            realtime_learning_boost: 1.0,
            semantic_sentiment: None,
            semantic_confidence: 0.0,
            positive_similarity: 0.0,
            negative_similarity: 0.0,
            partial_similarity: 0.0,
            technical_domain: None,
            technical_confidence: 0.0,
            complex_outcome_detected: false,
            pattern_vs_semantic_agreement: 0.0,
            primary_analysis_method: None,
            requires_manual_review: false,
            best_matching_patterns: vec![],
            semantic_analysis_details: serde_json::json!({}),
            entities: vec![],
            technical_tools: vec![],
            framework_mentions: vec![],
            solution_similarity_score: 0.0,
            feedback_similarity_score: 0.0,
            error_similarity_score: 0.0,
            best_pattern_match: None,
            hybrid_confidence: 0.0,
        };
        turn.content_length = turn.content.len();

        // C3: topic, quality, troubleshooting.
        let content = turn.content.clone();
        let has_code = turn.has_code;
        let has_tools = !turn.tools_used.is_empty();
        if let Some(scores) = self.guarded("topic", move || topic::score_topics(&content)) {
            turn.topic_scores = scores;
            turn.recompute_primary_topic();
        }

        let content = turn.content.clone();
        if let Some((score, has_success_markers)) =
            self.guarded("quality", move || topic::quality_score(&content, has_code, has_tools))
        {
            turn.solution_quality_score = score;
            turn.has_quality_indicators = score > 0.5;
            turn.has_success_markers = has_success_markers;
        }

        let content = turn.content.clone();
        if turn.role == Role::Assistant {
            if let Some(is_attempt) = self.guarded("solution_attempt", move || topic::is_solution_attempt(&content, has_code)) {
                turn.is_solution_attempt = is_attempt;
            }
        }

        let content = turn.content.clone();
        if let Some(category) = self.guarded("solution_category", move || topic::solution_category(&content, has_code)) {
            turn.solution_category = category;
        }

        let content = turn.content.clone();
        let troubleshooting_mode = ctx.troubleshooting_mode;
        if let Some(boost) = self.guarded("troubleshooting", move || topic::troubleshooting_boost(&content, troubleshooting_mode)) {
            turn.troubleshooting_context_score = boost;
        }

        // C4 + C5 (+C6) feedback analysis, fused via C7, only meaningful for
        // turns that read as feedback (user turns responding to a solution).
        if turn.role == Role::User {
            let content = turn.content.clone();
            let pattern_result = self.guarded("pattern_feedback", move || pattern_feedback::analyze(&content));

            let content = turn.content.clone();
            let semantic_result = self.guarded("semantic_feedback", move || self.semantic.analyze(&content));

            let content = turn.content.clone();
            let solution_tools = ctx.solution_tools.clone();
            let technical_result =
                self.guarded("technical_context", move || technical_context::analyze(&content, &solution_tools));

            if let (Some((pattern, _breakdown)), Some(semantic)) = (&pattern_result, &semantic_result) {
                turn.feedback_sentiment = Some(pattern.sentiment);
                turn.semantic_sentiment = Some(semantic.sentiment);
                turn.semantic_confidence = semantic.confidence;
                turn.positive_similarity = semantic.positive_similarity;
                turn.negative_similarity = semantic.negative_similarity;
                turn.partial_similarity = semantic.partial_similarity;

                if let Some(tech) = &technical_result {
                    turn.technical_domain = tech.domain;
                    turn.technical_confidence = tech.confidence;
                    turn.complex_outcome_detected = tech.complex_outcome_detected;
                }

                let fused = fusion::fuse(pattern, semantic, technical_result.as_ref());
                turn.validation_strength = fused.confidence * sentiment_sign(fused.sentiment);
                turn.outcome_certainty = pattern.certainty;
                turn.requires_manual_review = fused.requires_manual_review;
                turn.pattern_vs_semantic_agreement = fused.consistency;
                turn.primary_analysis_method = Some(if fused.fallback_used {
                    AnalysisMethod::Pattern
                } else {
                    AnalysisMethod::Fused
                });
                turn.semantic_analysis_details = serde_json::json!({
                    "fusion_branch": fused.fusion_branch,
                    "weights_used": {
                        "pattern": fused.weights_used.0,
                        "semantic": fused.weights_used.1,
                        "technical": fused.weights_used.2,
                    },
                    "fallback_used": fused.fallback_used,
                });
            }
        }

        // C8: hybrid entity/tool/pattern extraction.
        let content = turn.content.clone();
        if let Some(result) = self.guarded("hybrid_extractor", move || self.hybrid.extract(&content)) {
            turn.entities = result.entities;
            turn.technical_tools = result.technical_tools;
            turn.framework_mentions = result.framework_mentions;
            turn.solution_similarity_score = result.solution_similarity_score;
            turn.feedback_similarity_score = result.feedback_similarity_score;
            turn.error_similarity_score = result.error_similarity_score;
            turn.best_pattern_match = result.best_pattern_match;
            turn.hybrid_confidence = result.hybrid_confidence;
        }

        turn.clamp_fields();

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        if let Ok(mut stats) = self.stats.lock() {
            stats.record_latency(elapsed_ms);
        }

        turn
    }
}

impl Default for EnrichmentProcessor {
    fn default() -> Self {
        Self::new()
    }
}

fn sentiment_sign(s: crate::turn::Sentiment) -> f32 {
    use crate::turn::Sentiment::*;
    match s {
        Positive => 1.0,
        Negative => -1.0,
        Partial => 0.5,
        Neutral => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turn::Role;

    fn raw(content: &str, role: Role) -> RawTurn {
        RawTurn {
            id: None,
            content: content.to_string(),
            role,
            project_key: None,
            project_display_name: None,
            session_key: Some("s1".into()),
            source_file: None,
            sequence_position: Some(0),
            timestamp_iso: None,
            timestamp_unix: None,
            tools_used: vec![],
        }
    }

    #[test]
    fn enrich_assigns_an_id_when_missing() {
        let processor = EnrichmentProcessor::new();
        let turn = processor.enrich(raw("hello world", Role::User), &EnrichmentContext::default());
        assert!(!turn.id.is_empty());
    }

    #[test]
    fn enrich_replaces_empty_content_with_placeholder() {
        let processor = EnrichmentProcessor::new();
        let mut r = raw("", Role::User);
        r.id = Some("turn-7".into());
        let turn = processor.enrich(r, &EnrichmentContext::default());
        assert!(turn.content.contains("turn-7"));
    }

    #[test]
    fn enrich_sets_solution_category_for_code_assistant_turns() {
        let processor = EnrichmentProcessor::new();
        let turn = processor.enrich(
            raw("```rust\nfn main() {}\n```", Role::Assistant),
            &EnrichmentContext::default(),
        );
        assert!(turn.has_code);
        assert_eq!(turn.solution_category, crate::turn::SolutionCategory::CodeFix);
    }

    #[test]
    fn enrich_clamps_all_numeric_fields() {
        let processor = EnrichmentProcessor::new();
        let turn = processor.enrich(
            raw("perfect, that works perfectly, exactly what i needed", Role::User),
            &EnrichmentContext::default(),
        );
        assert!(turn.solution_quality_score >= 0.1 && turn.solution_quality_score <= 3.0);
        assert!(turn.validation_strength >= -1.0 && turn.validation_strength <= 1.0);
    }

    #[test]
    fn processor_tracks_running_stats_across_many_turns() {
        let processor = EnrichmentProcessor::new();
        for i in 0..10 {
            processor.enrich(raw(&format!("turn {i}"), Role::User), &EnrichmentContext::default());
        }
        let stats = processor.stats();
        assert_eq!(stats.count, 10);
    }
}
