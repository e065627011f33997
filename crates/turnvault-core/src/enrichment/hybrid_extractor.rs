//! Hybrid extractor (C8)
//!
//! Lightweight regex/heuristic named-entity tagging plus tool/framework
//! vocabulary matching, combined with template-centroid similarity over the
//! shared embedding gateway (C1) when available.

use regex::Regex;
use std::sync::OnceLock;

const MIN_CONTENT_LENGTH: usize = 20;

const KNOWN_TOOLS: &[&str] = &[
    "bash", "python", "cargo", "npm", "pytest", "docker", "kubectl", "git", "make", "curl",
];

const KNOWN_FRAMEWORKS: &[&str] = &[
    "react", "vue", "angular", "django", "rails", "express", "next.js", "spring", "flask", "fastapi",
];

#[cfg(feature = "embeddings")]
const SOLUTION_TEMPLATES: &[&str] = &[
    "Here's the fix, I changed the configuration and it now compiles.",
    "You can resolve this by updating the dependency version.",
];

#[cfg(feature = "embeddings")]
const FEEDBACK_TEMPLATES: &[&str] = &[
    "That works now, thanks for the help.",
    "Still seeing the same error after applying the change.",
];

#[cfg(feature = "embeddings")]
const ERROR_TEMPLATES: &[&str] = &[
    "The process crashed with a stack trace pointing to the parser.",
    "An unhandled exception was thrown during startup.",
];

struct HybridPatterns {
    capitalized_sequence: Regex,
    camel_case: Regex,
    snake_case: Regex,
    path_like: Regex,
    tools: Vec<Regex>,
    frameworks: Vec<Regex>,
}

static PATTERNS: OnceLock<HybridPatterns> = OnceLock::new();

fn patterns() -> &'static HybridPatterns {
    PATTERNS.get_or_init(|| HybridPatterns {
        capitalized_sequence: Regex::new(r"\b([A-Z][a-zA-Z0-9]+(?:\s[A-Z][a-zA-Z0-9]+){0,3})\b")
            .expect("static pattern"),
        camel_case: Regex::new(r"\b[a-z]+(?:[A-Z][a-z0-9]+)+\b").expect("static pattern"),
        snake_case: Regex::new(r"\b[a-z][a-z0-9]*(?:_[a-z0-9]+)+\b").expect("static pattern"),
        path_like: Regex::new(r"(?:\.?/)?[\w\-]+(?:/[\w\-.]+)+\.[a-zA-Z0-9]+").expect("static pattern"),
        tools: KNOWN_TOOLS
            .iter()
            .map(|t| Regex::new(&format!(r"(?i)\b{}\b", regex::escape(t))).expect("static pattern"))
            .collect(),
        frameworks: KNOWN_FRAMEWORKS
            .iter()
            .map(|t| Regex::new(&format!(r"(?i)\b{}\b", regex::escape(t))).expect("static pattern"))
            .collect(),
    })
}

#[derive(Debug, Clone, Default)]
pub struct HybridExtractionResult {
    pub entities: Vec<String>,
    pub technical_tools: Vec<String>,
    pub framework_mentions: Vec<String>,
    pub solution_similarity_score: f32,
    pub feedback_similarity_score: f32,
    pub error_similarity_score: f32,
    pub best_pattern_match: Option<String>,
    pub hybrid_confidence: f32,
}

fn extract_entities(content: &str, p: &HybridPatterns) -> Vec<String> {
    let mut entities: Vec<String> = Vec::new();

    for m in p.capitalized_sequence.find_iter(content) {
        entities.push(m.as_str().to_string());
    }
    for m in p.camel_case.find_iter(content) {
        entities.push(m.as_str().to_string());
    }
    for m in p.snake_case.find_iter(content) {
        entities.push(m.as_str().to_string());
    }
    for m in p.path_like.find_iter(content) {
        entities.push(m.as_str().to_string());
    }

    entities.sort();
    entities.dedup();
    entities
}

fn extract_vocabulary(content: &str, patterns: &[Regex], vocab: &[&str]) -> Vec<String> {
    patterns
        .iter()
        .zip(vocab.iter())
        .filter(|(re, _)| re.is_match(content))
        .map(|(_, name)| name.to_string())
        .collect()
}

#[cfg(feature = "embeddings")]
pub struct HybridExtractor {
    service: crate::embeddings::EmbeddingService,
    solution_centroid: Option<Vec<f32>>,
    feedback_centroid: Option<Vec<f32>>,
    error_centroid: Option<Vec<f32>>,
}

#[cfg(feature = "embeddings")]
fn mean_vector(service: &crate::embeddings::EmbeddingService, sentences: &[&str]) -> Option<Vec<f32>> {
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
impl HybridExtractor {
    pub fn new() -> Self {
        let service = crate::embeddings::EmbeddingService::new();
        let (solution_centroid, feedback_centroid, error_centroid) = if service.is_ready() {
            (
                mean_vector(&service, SOLUTION_TEMPLATES),
                mean_vector(&service, FEEDBACK_TEMPLATES),
                mean_vector(&service, ERROR_TEMPLATES),
            )
        } else {
            (None, None, None)
        };
        Self { service, solution_centroid, feedback_centroid, error_centroid }
    }

    pub fn extract(&self, content: &str) -> HybridExtractionResult {
        if content.len() < MIN_CONTENT_LENGTH {
            return HybridExtractionResult::default();
        }

        let p = patterns();
        let entities = extract_entities(content, p);
        let technical_tools = extract_vocabulary(content, &p.tools, KNOWN_TOOLS);
        let framework_mentions = extract_vocabulary(content, &p.frameworks, KNOWN_FRAMEWORKS);

        let (solution_sim, feedback_sim, error_sim) =
            match (&self.solution_centroid, &self.feedback_centroid, &self.error_centroid) {
                (Some(sol), Some(fb), Some(err)) => match self.service.embed(content) {
                    Ok(embedding) => (
                        crate::embeddings::cosine_similarity(&embedding.vector, sol),
                        crate::embeddings::cosine_similarity(&embedding.vector, fb),
                        crate::embeddings::cosine_similarity(&embedding.vector, err),
                    ),
                    Err(_) => (0.0, 0.0, 0.0),
                },
                _ => (0.0, 0.0, 0.0),
            };

        let best = [
            ("solution", solution_sim),
            ("feedback", feedback_sim),
            ("error", error_sim),
        ]
        .into_iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        let (best_pattern_match, best_similarity) = match best {
            Some((name, score)) if score > 0.0 => (Some(name.to_string()), score),
            _ => (None, 0.0),
        };

        let entity_density = (entities.len() as f32 / 5.0).min(1.0);
        let tool_density = (technical_tools.len() as f32 / 3.0).min(1.0);
        let hybrid_confidence = (entity_density + best_similarity + tool_density) / 3.0;

        HybridExtractionResult {
            entities,
            technical_tools,
            framework_mentions,
            solution_similarity_score: solution_sim,
            feedback_similarity_score: feedback_sim,
            error_similarity_score: error_sim,
            best_pattern_match,
            hybrid_confidence,
        }
    }
}

#[cfg(feature = "embeddings")]
impl Default for HybridExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(feature = "embeddings"))]
#[derive(Default)]
pub struct HybridExtractor;

#[cfg(not(feature = "embeddings"))]
impl HybridExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, content: &str) -> HybridExtractionResult {
        if content.len() < MIN_CONTENT_LENGTH {
            return HybridExtractionResult::default();
        }
        let p = patterns();
        let entities = extract_entities(content, p);
        let technical_tools = extract_vocabulary(content, &p.tools, KNOWN_TOOLS);
        let framework_mentions = extract_vocabulary(content, &p.frameworks, KNOWN_FRAMEWORKS);
        let entity_density = (entities.len() as f32 / 5.0).min(1.0);
        let tool_density = (technical_tools.len() as f32 / 3.0).min(1.0);
        HybridExtractionResult {
            entities,
            technical_tools,
            framework_mentions,
            hybrid_confidence: (entity_density + tool_density) / 3.0,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_content_returns_empty_result() {
        let extractor = HybridExtractor::new();
        let result = extractor.extract("too short");
        assert!(result.entities.is_empty());
        assert_eq!(result.hybrid_confidence, 0.0);
    }

    #[test]
    fn extracts_known_tools_and_frameworks() {
        let extractor = HybridExtractor::new();
        let result = extractor.extract("I ran cargo test after updating the React component tree");
        assert!(result.technical_tools.contains(&"cargo".to_string()));
        assert!(result.framework_mentions.contains(&"react".to_string()));
    }

    #[test]
    fn extracts_snake_case_and_camel_case_identifiers() {
        let extractor = HybridExtractor::new();
        let result = extractor.extract("The function parse_input_stream calls parseInputStream internally");
        assert!(result.entities.iter().any(|e| e == "parse_input_stream"));
        assert!(result.entities.iter().any(|e| e == "parseInputStream"));
    }
}
