//! The Turn data model
//!
//! A [`Turn`] is one utterance (user or assistant) pulled from a conversation
//! transcript, together with every attribute the enrichment pipeline (C2-C9)
//! derives for it. Turns are immutable once enriched; later components only
//! ever replace the enrichment fields wholesale via [`crate::store::Store::update_metadata`],
//! never mutate a `Turn` in place.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Closed numeric intervals enrichment fields are clamped to (§3.3 invariant 2).
pub mod bounds {
    pub const SOLUTION_QUALITY: (f32, f32) = (0.1, 3.0);
    pub const VALIDATION_STRENGTH: (f32, f32) = (-1.0, 1.0);
    pub const TOPIC_CONFIDENCE: (f32, f32) = (0.0, 2.0);
    pub const OUTCOME_CERTAINTY: (f32, f32) = (0.0, 1.0);
    pub const REALTIME_LEARNING_BOOST: (f32, f32) = (0.1, 3.0);
    pub const TROUBLESHOOTING_CONTEXT: (f32, f32) = (1.0, 2.5);
}

#[inline]
pub fn clamp(value: f32, bounds: (f32, f32)) -> f32 {
    value.clamp(bounds.0, bounds.1)
}

/// The role that produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Unknown,
}

impl Default for Role {
    fn default() -> Self {
        Role::Unknown
    }
}

impl Role {
    pub fn from_raw(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "user" | "human" => Role::User,
            "assistant" | "ai" | "model" => Role::Assistant,
            _ => Role::Unknown,
        }
    }
}

/// Sentiment classes produced by the pattern (C4), semantic (C5), and fused
/// (C7) feedback analyzers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Partial,
    Neutral,
}

/// `solution_category` per §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionCategory {
    CodeFix,
    ConfigChange,
    DebuggingHelp,
    ApproachSuggestion,
    CommandSolution,
    FileOperation,
    GeneralGuidance,
    None,
}

impl Default for SolutionCategory {
    fn default() -> Self {
        SolutionCategory::None
    }
}

/// The four technical domains C6 classifies against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechnicalDomain {
    BuildSystem,
    Testing,
    Runtime,
    Deployment,
}

/// Which analysis method ultimately decided the stored sentiment (C7 §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMethod {
    Pattern,
    Semantic,
    Fused,
}

/// Topic scores keyed by topic name, per §3.2.
pub type TopicScores = HashMap<String, f32>;

/// A fully enriched conversation turn as stored in the index (§3.1-3.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    // ---- identity (§3.1) ----
    pub id: String,
    pub content: String,
    pub content_hash: String,
    pub role: Role,
    pub project_key: Option<String>,
    pub project_display_name: Option<String>,
    pub session_key: Option<String>,
    pub source_file: Option<String>,
    pub sequence_position: Option<u64>,
    pub timestamp_iso: Option<String>,
    pub timestamp_unix: Option<f64>,
    pub has_code: bool,
    pub tools_used: Vec<String>,
    pub content_length: usize,

    // ---- topic (§3.2) ----
    pub topic_scores: TopicScores,
    pub primary_topic: Option<String>,
    pub topic_confidence: f32,

    // ---- quality (§3.2) ----
    pub solution_quality_score: f32,
    pub has_success_markers: bool,
    pub has_quality_indicators: bool,
    pub is_solution_attempt: bool,
    pub solution_category: SolutionCategory,

    // ---- adjacency (§3.2) ----
    pub previous_turn_id: Option<String>,
    pub next_turn_id: Option<String>,
    pub related_solution_id: Option<String>,
    pub feedback_turn_id: Option<String>,

    // ---- feedback outcome (§3.2) ----
    pub feedback_sentiment: Option<Sentiment>,
    pub validation_strength: f32,
    pub is_validated_solution: bool,
    pub is_refuted_attempt: bool,
    pub outcome_certainty: f32,

    // ---- troubleshooting / realtime learning (§3.2) ----
    pub troubleshooting_context_score: f32,
    pub realtime_learning_boost: f32,

    // ---- semantic validation fields (§3.2) ----
    pub semantic_sentiment: Option<Sentiment>,
    pub semantic_confidence: f32,
    pub positive_similarity: f32,
    pub negative_similarity: f32,
    pub partial_similarity: f32,
    pub technical_domain: Option<TechnicalDomain>,
    pub technical_confidence: f32,
    pub complex_outcome_detected: bool,
    pub pattern_vs_semantic_agreement: f32,
    pub primary_analysis_method: Option<AnalysisMethod>,
    pub requires_manual_review: bool,
    pub best_matching_patterns: Vec<String>,
    pub semantic_analysis_details: serde_json::Value,

    // ---- hybrid extraction (§3.2) ----
    pub entities: Vec<String>,
    pub technical_tools: Vec<String>,
    pub framework_mentions: Vec<String>,
    pub solution_similarity_score: f32,
    pub feedback_similarity_score: f32,
    pub error_similarity_score: f32,
    pub best_pattern_match: Option<String>,
    pub hybrid_confidence: f32,
}

/// Placeholder substituted for genuinely empty content (§3.1, §8.3).
pub fn empty_content_placeholder(id: &str) -> String {
    format!("[Empty content from entry {id}]")
}

impl Turn {
    /// Enforce every closed-interval invariant from §3.3 invariant 2. Called
    /// at write time by the store and again by C13 maintenance scans.
    pub fn clamp_fields(&mut self) {
        self.solution_quality_score = clamp(self.solution_quality_score, bounds::SOLUTION_QUALITY);
        self.validation_strength = clamp(self.validation_strength, bounds::VALIDATION_STRENGTH);
        self.topic_confidence = clamp(self.topic_confidence, bounds::TOPIC_CONFIDENCE);
        self.outcome_certainty = clamp(self.outcome_certainty, bounds::OUTCOME_CERTAINTY);
        self.realtime_learning_boost =
            clamp(self.realtime_learning_boost, bounds::REALTIME_LEARNING_BOOST);
        self.troubleshooting_context_score = clamp(
            self.troubleshooting_context_score,
            bounds::TROUBLESHOOTING_CONTEXT,
        );
        // Invariant 4: validated and refuted are mutually exclusive.
        if self.is_validated_solution && self.is_refuted_attempt {
            self.is_refuted_attempt = false;
        }
    }

    /// Invariant 5: `primary_topic` is either empty or the argmax key.
    pub fn recompute_primary_topic(&mut self) {
        let argmax = self
            .topic_scores
            .iter()
            .filter(|(_, &score)| score >= 0.1)
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal));

        match argmax {
            Some((topic, &score)) => {
                self.primary_topic = Some(topic.clone());
                self.topic_confidence = score;
            }
            None => {
                self.primary_topic = None;
                self.topic_confidence = 0.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_from_raw_recognises_aliases() {
        assert_eq!(Role::from_raw("human"), Role::User);
        assert_eq!(Role::from_raw("AI"), Role::Assistant);
        assert_eq!(Role::from_raw("tool"), Role::Unknown);
    }

    #[test]
    fn clamp_fields_enforces_all_intervals() {
        let mut t = sample_turn();
        t.solution_quality_score = 10.0;
        t.validation_strength = -1.7;
        t.topic_confidence = 5.0;
        t.outcome_certainty = 2.0;
        t.realtime_learning_boost = -3.0;
        t.troubleshooting_context_score = 0.0;
        t.is_validated_solution = true;
        t.is_refuted_attempt = true;

        t.clamp_fields();

        assert_eq!(t.solution_quality_score, 3.0);
        assert_eq!(t.validation_strength, -1.0);
        assert_eq!(t.topic_confidence, 2.0);
        assert_eq!(t.outcome_certainty, 1.0);
        assert_eq!(t.realtime_learning_boost, 0.1);
        assert_eq!(t.troubleshooting_context_score, 1.0);
        assert!(t.is_validated_solution);
        assert!(!t.is_refuted_attempt);
    }

    #[test]
    fn primary_topic_is_argmax_or_empty() {
        let mut t = sample_turn();
        t.topic_scores.insert("debugging".into(), 1.5);
        t.topic_scores.insert("testing".into(), 0.4);
        t.recompute_primary_topic();
        assert_eq!(t.primary_topic.as_deref(), Some("debugging"));
        assert_eq!(t.topic_confidence, 1.5);

        t.topic_scores.clear();
        t.recompute_primary_topic();
        assert!(t.primary_topic.is_none());
    }

    pub(crate) fn sample_turn() -> Turn {
        Turn {
            id: "t-1".into(),
            content: "hello world".into(),
            content_hash: "hash-1".into(),
            role: Role::User,
            project_key: None,
            project_display_name: None,
            session_key: Some("s-1".into()),
            source_file: None,
            sequence_position: Some(0),
            timestamp_iso: None,
            timestamp_unix: None,
            has_code: false,
            tools_used: vec![],
            content_length: 11,
            topic_scores: TopicScores::new(),
            primary_topic: None,
            topic_confidence: 0.0,
            solution_quality_score: 0.1,
            has_success_markers: false,
            has_quality_indicators: false,
            is_solution_attempt: false,
            solution_category: SolutionCategory::None,
            previous_turn_id: None,
            next_turn_id: None,
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
        }
    }
}

/// A raw, not-yet-enriched turn as delivered by a producer (§6.1, §6.2).
#[derive(Debug, Clone, Default)]
pub struct RawTurn {
    pub id: Option<String>,
    pub content: String,
    pub role: Role,
    pub project_key: Option<String>,
    pub project_display_name: Option<String>,
    pub session_key: Option<String>,
    pub source_file: Option<String>,
    pub sequence_position: Option<u64>,
    pub timestamp_iso: Option<String>,
    pub timestamp_unix: Option<f64>,
    pub tools_used: Vec<String>,
}

/// Stable content hash used as the dedup key (§3.1, §3.3 invariant 1).
///
/// Uses a simple FNV-1a 64-bit hash over normalised (trimmed, lowercased)
/// content; the index only needs stability and a vanishingly small collision
/// rate, not cryptographic strength.
pub fn content_hash(content: &str) -> String {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let normalised = content.trim().to_lowercase();
    let mut hash = FNV_OFFSET;
    for byte in normalised.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    format!("{hash:016x}")
}


/// Minimal `Turn` construction shared by other modules' unit tests.
#[cfg(test)]
pub mod tests_support {
    use super::*;

    pub fn blank(id: &str, content: &str, session: &str, seq: u64) -> Turn {
        Turn {
            id: id.to_string(),
            content: content.to_string(),
            content_hash: content_hash(content),
            role: Role::User,
            project_key: None,
            project_display_name: None,
            session_key: Some(session.to_string()),
            source_file: None,
            sequence_position: Some(seq),
            timestamp_iso: None,
            timestamp_unix: Some(seq as f64),
            has_code: false,
            tools_used: vec![],
            content_length: content.len(),
            topic_scores: TopicScores::new(),
            primary_topic: None,
            topic_confidence: 0.0,
            solution_quality_score: 0.1,
            has_success_markers: false,
            has_quality_indicators: false,
            is_solution_attempt: false,
            solution_category: SolutionCategory::None,
            previous_turn_id: None,
            next_turn_id: None,
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
        }
    }
}
