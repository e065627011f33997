//! Pattern-based feedback sentiment analyzer (C4)

use crate::turn::Sentiment;
use regex::Regex;
use std::sync::OnceLock;

const POSITIVE_STRONG: &[&str] = &["perfect", "exactly what i needed", "works perfectly", "brilliant"];
const POSITIVE_MODERATE: &[&str] = &["that works", "works now", "good", "nice one"];
const POSITIVE_SUBTLE: &[&str] = &["ok", "alright", "fine", "that'll do"];

const NEGATIVE_STRONG: &[&str] = &["completely broken", "doesn't work at all", "terrible", "useless"];
const NEGATIVE_MODERATE: &[&str] = &["still broken", "not working", "same error", "still failing"];
const NEGATIVE_SUBTLE: &[&str] = &["hmm", "not quite", "close but", "still off"];

const PARTIAL: &[&str] = &["partially works", "somewhat", "almost there", "getting closer", "mostly works"];
const NEUTRAL: &[&str] = &["let me check", "i see", "understood", "noted", "ok, looking"];

const CONFIDENCE_MARKERS: &[&str] = &["definitely", "certainly", "absolutely", "clearly", "for sure"];
const HEDGE_MARKERS: &[&str] = &["maybe", "perhaps", "i think", "not sure", "possibly"];

fn compile_set(words: &[&str]) -> Vec<Regex> {
    words
        .iter()
        .map(|w| {
            let escaped = regex::escape(w);
            let pattern = if w.contains(' ') {
                escaped
            } else {
                format!(r"\b{escaped}\b")
            };
            Regex::new(&format!("(?i){pattern}")).expect("static lexicon pattern")
        })
        .collect()
}

struct FeedbackPatterns {
    positive_strong: Vec<Regex>,
    positive_moderate: Vec<Regex>,
    positive_subtle: Vec<Regex>,
    negative_strong: Vec<Regex>,
    negative_moderate: Vec<Regex>,
    negative_subtle: Vec<Regex>,
    partial: Vec<Regex>,
    neutral: Vec<Regex>,
    confidence_markers: Vec<Regex>,
    hedge_markers: Vec<Regex>,
}

static PATTERNS: OnceLock<FeedbackPatterns> = OnceLock::new();

fn patterns() -> &'static FeedbackPatterns {
    PATTERNS.get_or_init(|| FeedbackPatterns {
        positive_strong: compile_set(POSITIVE_STRONG),
        positive_moderate: compile_set(POSITIVE_MODERATE),
        positive_subtle: compile_set(POSITIVE_SUBTLE),
        negative_strong: compile_set(NEGATIVE_STRONG),
        negative_moderate: compile_set(NEGATIVE_MODERATE),
        negative_subtle: compile_set(NEGATIVE_SUBTLE),
        partial: compile_set(PARTIAL),
        neutral: compile_set(NEUTRAL),
        confidence_markers: compile_set(CONFIDENCE_MARKERS),
        hedge_markers: compile_set(HEDGE_MARKERS),
    })
}

fn count(patterns: &[Regex], content: &str) -> usize {
    patterns.iter().filter(|re| re.is_match(content)).count()
}

fn weighted_tier_total(content: &str, strong: &[Regex], moderate: &[Regex], subtle: &[Regex]) -> f32 {
    3.0 * count(strong, content) as f32 + 2.0 * count(moderate, content) as f32 + count(subtle, content) as f32
}

/// Per-tier match counts, exposed for the caller's breakdown reporting.
#[derive(Debug, Clone, Copy, Default)]
pub struct TierBreakdown {
    pub positive: (usize, usize, usize),
    pub negative: (usize, usize, usize),
    pub partial: usize,
    pub neutral: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct PatternFeedbackResult {
    pub sentiment: Sentiment,
    pub strength: f32,
    pub confidence: f32,
    pub certainty: f32,
}

/// Classify a feedback turn's sentiment from lexicon matches (§4.4).
pub fn analyze(content: &str) -> (PatternFeedbackResult, TierBreakdown) {
    let p = patterns();

    let breakdown = TierBreakdown {
        positive: (
            count(&p.positive_strong, content),
            count(&p.positive_moderate, content),
            count(&p.positive_subtle, content),
        ),
        negative: (
            count(&p.negative_strong, content),
            count(&p.negative_moderate, content),
            count(&p.negative_subtle, content),
        ),
        partial: count(&p.partial, content),
        neutral: count(&p.neutral, content),
    };

    let positive_total = weighted_tier_total(content, &p.positive_strong, &p.positive_moderate, &p.positive_subtle);
    let negative_total = weighted_tier_total(content, &p.negative_strong, &p.negative_moderate, &p.negative_subtle);
    let partial_total = breakdown.partial as f32;
    let neutral_total = breakdown.neutral as f32;

    let totals = [
        (Sentiment::Positive, positive_total),
        (Sentiment::Negative, negative_total),
        (Sentiment::Partial, partial_total),
        (Sentiment::Neutral, neutral_total),
    ];

    let (sentiment, dominant_count) = totals
        .iter()
        .copied()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .unwrap_or((Sentiment::Neutral, 0.0));

    let all_counts: f32 = totals.iter().map(|(_, v)| v).sum();

    let strength = match sentiment {
        Sentiment::Positive | Sentiment::Negative => (dominant_count / 5.0).min(1.0),
        Sentiment::Partial => (dominant_count / 3.0).min(1.0),
        Sentiment::Neutral => 0.0,
    };

    let confidence_raw =
        count(&p.confidence_markers, content) as f32 - 0.5 * count(&p.hedge_markers, content) as f32;
    let confidence = ((confidence_raw / 3.0) + 0.5).clamp(0.0, 1.0);

    let certainty = if all_counts > 0.0 {
        (dominant_count / all_counts) * confidence
    } else {
        0.0
    };

    (
        PatternFeedbackResult {
            sentiment,
            strength,
            confidence,
            certainty,
        },
        breakdown,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strongly_positive_content_wins_positive_sentiment() {
        let (result, _) = analyze("perfect, that works perfectly, exactly what i needed");
        assert_eq!(result.sentiment, Sentiment::Positive);
        assert!(result.strength > 0.5);
    }

    #[test]
    fn strongly_negative_content_wins_negative_sentiment() {
        let (result, _) = analyze("completely broken, doesn't work at all, terrible");
        assert_eq!(result.sentiment, Sentiment::Negative);
    }

    #[test]
    fn partial_content_wins_partial_sentiment() {
        let (result, _) = analyze("partially works, somewhat better, almost there");
        assert_eq!(result.sentiment, Sentiment::Partial);
    }

    #[test]
    fn no_matches_yields_neutral_with_zero_certainty() {
        let (result, _) = analyze("the weather today is mild");
        assert_eq!(result.sentiment, Sentiment::Neutral);
        assert_eq!(result.certainty, 0.0);
    }

    #[test]
    fn confidence_markers_raise_confidence_and_hedges_lower_it() {
        let (confident, _) = analyze("definitely works now, certainly fixed");
        let (hedged, _) = analyze("maybe works now, i think it's fixed, perhaps not sure");
        assert!(confident.confidence > hedged.confidence);
    }

    #[test]
    fn strength_and_confidence_stay_in_bounds() {
        let many = "perfect works perfectly brilliant exactly what i needed ".repeat(5);
        let (result, _) = analyze(&many);
        assert!(result.strength <= 1.0);
        assert!(result.confidence <= 1.0);
        assert!(result.certainty <= 1.0);
    }
}
