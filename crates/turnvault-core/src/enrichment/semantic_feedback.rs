//! Semantic feedback analyzer (C5)
//!
//! Classifies feedback sentiment by cosine similarity to curated prototype
//! sentences instead of lexicon matching, using the shared embedding gateway
//! (C1). Falls back to neutral when embeddings are unavailable or disabled.

use crate::turn::Sentiment;

#[cfg(feature = "embeddings")]
use crate::embeddings::{cosine_similarity, EmbeddingService};
#[cfg(feature = "embeddings")]
use lru::LruCache;
#[cfg(feature = "embeddings")]
use std::num::NonZeroUsize;
#[cfg(feature = "embeddings")]
use std::sync::Mutex;

#[cfg(feature = "embeddings")]
const POSITIVE_PROTOTYPES: &[&str] = &[
    "That works perfectly, thank you.",
    "This fixed the issue completely.",
    "Exactly what I needed, it runs now.",
];

#[cfg(feature = "embeddings")]
const NEGATIVE_PROTOTYPES: &[&str] = &[
    "This still doesn't work at all.",
    "Same error as before, nothing changed.",
    "That broke everything further.",
];

#[cfg(feature = "embeddings")]
const PARTIAL_PROTOTYPES: &[&str] = &[
    "It's partially working now, but there's still an issue.",
    "That got us closer but it's not fully fixed.",
    "Some parts work, others still fail.",
];

#[derive(Debug, Clone, Copy)]
pub struct SemanticFeedbackResult {
    pub sentiment: Sentiment,
    pub confidence: f32,
    pub positive_similarity: f32,
    pub negative_similarity: f32,
    pub partial_similarity: f32,
    pub fallback_used: bool,
}

impl SemanticFeedbackResult {
    fn fallback() -> Self {
        Self {
            sentiment: Sentiment::Neutral,
            confidence: 0.0,
            positive_similarity: 0.0,
            negative_similarity: 0.0,
            partial_similarity: 0.0,
            fallback_used: true,
        }
    }
}

#[cfg(feature = "embeddings")]
pub struct SemanticFeedbackAnalyzer {
    service: EmbeddingService,
    positive_centroid: Option<Vec<f32>>,
    negative_centroid: Option<Vec<f32>>,
    partial_centroid: Option<Vec<f32>>,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

#[cfg(feature = "embeddings")]
fn mean_vector(service: &EmbeddingService, sentences: &[&str]) -> Option<Vec<f32>> {
    let embeddings = service.embed_batch(sentences).ok()?;
    if embeddings.is_empty() {
        return None;
    }
    let dims = embeddings[0].dimensions;
    let mut sum = vec![0.0f32; dims];
    for emb in &embeddings {
        for (i, v) in emb.vector.iter().enumerate() {
            sum[i] += v;
        }
    }
    let n = embeddings.len() as f32;
    for v in &mut sum {
        *v /= n;
    }
    Some(sum)
}

#[cfg(feature = "embeddings")]
impl SemanticFeedbackAnalyzer {
    /// Construct the analyzer, encoding prototype sentences once. If the
    /// embedding gateway is unavailable, the analyzer still constructs but
    /// every call to [`Self::analyze`] returns the fallback result.
    pub fn new() -> Self {
        let service = EmbeddingService::new();
        let (positive_centroid, negative_centroid, partial_centroid) = if service.is_ready() {
            (
                mean_vector(&service, POSITIVE_PROTOTYPES),
                mean_vector(&service, NEGATIVE_PROTOTYPES),
                mean_vector(&service, PARTIAL_PROTOTYPES),
            )
        } else {
            (None, None, None)
        };

        Self {
            service,
            positive_centroid,
            negative_centroid,
            partial_centroid,
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(256).expect("256 is non-zero"))),
        }
    }

    fn encode_cached(&self, content: &str) -> Option<Vec<f32>> {
        if let Some(cached) = self.cache.lock().ok().and_then(|mut c| c.get(content).cloned()) {
            return Some(cached);
        }
        let embedding = self.service.embed(content).ok()?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(content.to_string(), embedding.vector.clone());
        }
        Some(embedding.vector)
    }

    pub fn analyze(&self, content: &str) -> SemanticFeedbackResult {
        let (Some(pos), Some(neg), Some(partial)) =
            (&self.positive_centroid, &self.negative_centroid, &self.partial_centroid)
        else {
            return SemanticFeedbackResult::fallback();
        };

        let Some(vector) = self.encode_cached(content) else {
            return SemanticFeedbackResult::fallback();
        };

        let positive_similarity = cosine_similarity(&vector, pos);
        let negative_similarity = cosine_similarity(&vector, neg);
        let partial_similarity = cosine_similarity(&vector, partial);

        let mut ranked = [
            (Sentiment::Positive, positive_similarity),
            (Sentiment::Negative, negative_similarity),
            (Sentiment::Partial, partial_similarity),
        ];
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let (sentiment, winner) = ranked[0];
        let runner_up = ranked[1].1;
        let confidence = (winner - runner_up).clamp(0.0, 1.0);

        SemanticFeedbackResult {
            sentiment,
            confidence,
            positive_similarity,
            negative_similarity,
            partial_similarity,
            fallback_used: false,
        }
    }
}

#[cfg(feature = "embeddings")]
impl Default for SemanticFeedbackAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Stub used when the `embeddings` feature is disabled: always falls back.
#[cfg(not(feature = "embeddings"))]
#[derive(Default)]
pub struct SemanticFeedbackAnalyzer;

#[cfg(not(feature = "embeddings"))]
impl SemanticFeedbackAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, _content: &str) -> SemanticFeedbackResult {
        SemanticFeedbackResult::fallback()
    }
}

#[cfg(all(test, feature = "embeddings"))]
mod tests {
    use super::*;

    #[test]
    fn fallback_when_embedding_gateway_not_ready() {
        // In CI/test environments fastembed model files are typically not
        // pre-downloaded, so construction falls back to the neutral path.
        let analyzer = SemanticFeedbackAnalyzer::new();
        let result = analyzer.analyze("That works perfectly, thank you.");
        if result.fallback_used {
            assert_eq!(result.sentiment, Sentiment::Neutral);
            assert_eq!(result.confidence, 0.0);
        }
    }
}
