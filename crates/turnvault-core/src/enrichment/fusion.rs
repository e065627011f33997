//! Multi-modal feedback fusion (C7)
//!
//! Combines C4 (pattern), C5 (semantic), and optionally C6 (technical
//! context) into a single fused sentiment judgement, with dynamic
//! re-weighting and a fallback to pattern-only when the fused result is
//! weak or inconsistent.

use crate::enrichment::pattern_feedback::PatternFeedbackResult;
use crate::enrichment::semantic_feedback::SemanticFeedbackResult;
use crate::enrichment::technical_context::TechnicalContextResult;
use crate::turn::Sentiment;

const BASE_PATTERN_WEIGHT: f32 = 0.4;
const BASE_SEMANTIC_WEIGHT: f32 = 0.35;
const BASE_TECHNICAL_WEIGHT: f32 = 0.25;

const FALLBACK_CONFIDENCE_THRESHOLD: f32 = 0.3;
const FALLBACK_CONSISTENCY_THRESHOLD: f32 = 0.5;
const MANUAL_REVIEW_CONFIDENCE_THRESHOLD: f32 = 0.4;

#[derive(Debug, Clone)]
pub struct FusionResult {
    pub sentiment: Sentiment,
    pub confidence: f32,
    pub consistency: f32,
    pub fallback_used: bool,
    pub requires_manual_review: bool,
    pub fusion_branch: &'static str,
    pub weights_used: (f32, f32, f32),
}

fn sentiment_value(s: Sentiment) -> f32 {
    match s {
        Sentiment::Positive => 1.0,
        Sentiment::Partial => 0.5,
        Sentiment::Neutral => 0.0,
        Sentiment::Negative => -1.0,
    }
}

fn dynamic_weights(
    pattern: &PatternFeedbackResult,
    semantic: &SemanticFeedbackResult,
    technical: Option<&TechnicalContextResult>,
) -> (f32, f32, f32) {
    let mut pattern_w = BASE_PATTERN_WEIGHT;
    let mut semantic_w = BASE_SEMANTIC_WEIGHT;
    let mut technical_w = BASE_TECHNICAL_WEIGHT;

    if semantic.confidence > 0.8 {
        semantic_w *= 1.2;
        pattern_w *= 0.9;
    }
    if let Some(tech) = technical {
        if tech.confidence > 0.6 {
            technical_w *= 1.3;
        }
    }
    if pattern.confidence > 0.8 {
        pattern_w *= 1.1;
    }

    let mean = (pattern_w + semantic_w + technical_w) / 3.0;
    let consistency_preview = consistency_score(pattern, semantic, technical, pattern_w, semantic_w);
    if consistency_preview > 0.9 {
        pattern_w = pattern_w * 0.7 + mean * 0.3;
        semantic_w = semantic_w * 0.7 + mean * 0.3;
        technical_w = technical_w * 0.7 + mean * 0.3;
    }

    let total = pattern_w + semantic_w + technical_w;
    (pattern_w / total, semantic_w / total, technical_w / total)
}

fn consistency_score(
    pattern: &PatternFeedbackResult,
    semantic: &SemanticFeedbackResult,
    technical: Option<&TechnicalContextResult>,
    _pattern_w: f32,
    _semantic_w: f32,
) -> f32 {
    let pattern_value = sentiment_value(pattern.sentiment);
    let semantic_value = sentiment_value(semantic.sentiment);
    let mut consistency = 1.0 - (pattern_value - semantic_value).abs() / 2.0;

    if let Some(tech) = technical {
        if tech.complex_outcome_detected {
            consistency = (consistency + 0.1).min(1.0);
        }
    }
    consistency.clamp(0.0, 1.0)
}

/// Fuse the three analyzer outputs per §4.7.
pub fn fuse(
    pattern: &PatternFeedbackResult,
    semantic: &SemanticFeedbackResult,
    technical: Option<&TechnicalContextResult>,
) -> FusionResult {
    let (pattern_w, semantic_w, technical_w) = dynamic_weights(pattern, semantic, technical);

    let pattern_value = sentiment_value(pattern.sentiment);
    let semantic_value = sentiment_value(semantic.sentiment);
    let weighted_value = pattern_w * pattern_value + semantic_w * semantic_value;

    let (sentiment, branch) = if weighted_value >= 0.7 {
        (Sentiment::Positive, "positive")
    } else if weighted_value <= -0.7 {
        (Sentiment::Negative, "negative")
    } else if weighted_value.abs() < 0.1 {
        (Sentiment::Neutral, "neutral")
    } else if pattern.sentiment == Sentiment::Partial || semantic.sentiment == Sentiment::Partial {
        (Sentiment::Partial, "partial_explicit")
    } else {
        (Sentiment::Partial, "partial_mixed_sign")
    };

    let technical_confidence = technical.map(|t| t.confidence).unwrap_or(0.0);
    let mut confidence = pattern_w * pattern.confidence + semantic_w * semantic.confidence + technical_w * technical_confidence;
    confidence += 0.05 * technical_confidence;
    confidence = confidence.clamp(0.0, 1.0);

    let consistency = consistency_score(pattern, semantic, technical, pattern_w, semantic_w);

    if confidence < FALLBACK_CONFIDENCE_THRESHOLD || consistency < FALLBACK_CONSISTENCY_THRESHOLD {
        let requires_manual_review = pattern.confidence < MANUAL_REVIEW_CONFIDENCE_THRESHOLD;
        return FusionResult {
            sentiment: pattern.sentiment,
            confidence: pattern.confidence,
            consistency,
            fallback_used: true,
            requires_manual_review,
            fusion_branch: "fallback_pattern_only",
            weights_used: (1.0, 0.0, 0.0),
        };
    }

    FusionResult {
        sentiment,
        confidence,
        consistency,
        fallback_used: false,
        requires_manual_review: confidence < MANUAL_REVIEW_CONFIDENCE_THRESHOLD,
        fusion_branch: branch,
        weights_used: (pattern_w, semantic_w, technical_w),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(sentiment: Sentiment, strength: f32, confidence: f32, certainty: f32) -> PatternFeedbackResult {
        PatternFeedbackResult { sentiment, strength, confidence, certainty }
    }

    fn semantic(sentiment: Sentiment, confidence: f32) -> SemanticFeedbackResult {
        SemanticFeedbackResult {
            sentiment,
            confidence,
            positive_similarity: 0.0,
            negative_similarity: 0.0,
            partial_similarity: 0.0,
            fallback_used: false,
        }
    }

    #[test]
    fn agreement_on_positive_yields_positive_fused_sentiment() {
        let p = pattern(Sentiment::Positive, 0.9, 0.9, 0.9);
        let s = semantic(Sentiment::Positive, 0.9);
        let result = fuse(&p, &s, None);
        assert_eq!(result.sentiment, Sentiment::Positive);
        assert!(!result.fallback_used);
    }

    #[test]
    fn agreement_on_negative_yields_negative_fused_sentiment() {
        let p = pattern(Sentiment::Negative, 0.9, 0.9, 0.9);
        let s = semantic(Sentiment::Negative, 0.9);
        let result = fuse(&p, &s, None);
        assert_eq!(result.sentiment, Sentiment::Negative);
    }

    #[test]
    fn weak_confidence_falls_back_to_pattern_only() {
        let p = pattern(Sentiment::Positive, 0.2, 0.1, 0.1);
        let s = semantic(Sentiment::Neutral, 0.0);
        let result = fuse(&p, &s, None);
        assert!(result.fallback_used);
        assert_eq!(result.fusion_branch, "fallback_pattern_only");
        assert_eq!(result.sentiment, p.sentiment);
    }

    #[test]
    fn disagreement_lowers_consistency_and_may_fall_back() {
        let p = pattern(Sentiment::Positive, 0.9, 0.9, 0.9);
        let s = semantic(Sentiment::Negative, 0.9);
        let result = fuse(&p, &s, None);
        assert!(result.consistency < 0.5);
        assert!(result.fallback_used);
    }

    #[test]
    fn explicit_partial_component_is_recorded_in_branch() {
        let p = pattern(Sentiment::Partial, 0.5, 0.6, 0.5);
        let s = semantic(Sentiment::Partial, 0.6);
        let result = fuse(&p, &s, None);
        if !result.fallback_used {
            assert_eq!(result.fusion_branch, "partial_explicit");
            assert_eq!(result.sentiment, Sentiment::Partial);
        }
    }
}
