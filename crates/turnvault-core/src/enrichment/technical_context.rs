//! Technical-context analyzer (C6)

use crate::turn::TechnicalDomain;
use regex::Regex;
use std::sync::OnceLock;

struct DomainLexicon {
    domain: TechnicalDomain,
    success: &'static [&'static str],
    failure: &'static [&'static str],
    tools: &'static [&'static str],
}

const DOMAINS: &[DomainLexicon] = &[
    DomainLexicon {
        domain: TechnicalDomain::BuildSystem,
        success: &["build pass", "build ok", "compiled successfully", "build succeeded"],
        failure: &["build fail", "build error", "compilation error", "linker error"],
        tools: &["cargo", "make", "cmake", "webpack", "gradle", "maven"],
    },
    DomainLexicon {
        domain: TechnicalDomain::Testing,
        success: &["test pass", "all tests pass", "tests succeeded"],
        failure: &["test fail", "test error", "assertion failed", "tests failing"],
        tools: &["pytest", "jest", "cargo test", "junit", "mocha"],
    },
    DomainLexicon {
        domain: TechnicalDomain::Runtime,
        success: &["runs fine", "no crashes", "runtime ok"],
        failure: &["runtime error", "segfault", "panic", "null pointer", "crashed at runtime"],
        tools: &["node", "python", "jvm", "valgrind"],
    },
    DomainLexicon {
        domain: TechnicalDomain::Deployment,
        success: &["deploy succeeded", "deployment ok", "rolled out successfully"],
        failure: &["deploy failed", "deployment error", "rollback needed", "pipeline failed"],
        tools: &["docker", "kubernetes", "terraform", "github actions", "jenkins"],
    },
];

const CONTRADICTORY_PAIRS: &[(&[&str], &[&str])] = &[
    (&["build pass", "build ok"], &["test fail", "test error", "tests failing", "test failing", "tests are failing"]),
    (&["tests pass", "all tests pass"], &["build fail", "build error"]),
    (&["deploy succeeded"], &["runtime error", "crashed"]),
];

const CONTRASTIVE_CONNECTIVES: &[&str] = &["but", "however", "although"];
const SUCCESS_TOKENS: &[&str] =
    &["pass", "passes", "passing", "passed", "ok", "succeed", "succeeds", "succeeded", "works", "worked", "fixed"];
const FAILURE_TOKENS: &[&str] =
    &["fail", "fails", "failing", "failed", "error", "errors", "crash", "crashes", "crashed", "broken"];

fn compile_set(words: &[&str]) -> Vec<Regex> {
    words
        .iter()
        .map(|w| {
            let escaped = regex::escape(w);
            let pattern = if w.contains(' ') { escaped } else { format!(r"\b{escaped}\b") };
            Regex::new(&format!("(?i){pattern}")).expect("static lexicon pattern")
        })
        .collect()
}

struct CompiledDomain {
    domain: TechnicalDomain,
    success: Vec<Regex>,
    failure: Vec<Regex>,
    tools: Vec<Regex>,
}

struct TechnicalPatterns {
    domains: Vec<CompiledDomain>,
    contradictory_pairs: Vec<(Vec<Regex>, Vec<Regex>)>,
    success_tokens: Vec<Regex>,
    failure_tokens: Vec<Regex>,
    connectives: Regex,
}

static PATTERNS: OnceLock<TechnicalPatterns> = OnceLock::new();

fn patterns() -> &'static TechnicalPatterns {
    PATTERNS.get_or_init(|| TechnicalPatterns {
        domains: DOMAINS
            .iter()
            .map(|d| CompiledDomain {
                domain: d.domain,
                success: compile_set(d.success),
                failure: compile_set(d.failure),
                tools: compile_set(d.tools),
            })
            .collect(),
        contradictory_pairs: CONTRADICTORY_PAIRS
            .iter()
            .map(|(a, b)| (compile_set(a), compile_set(b)))
            .collect(),
        success_tokens: compile_set(SUCCESS_TOKENS),
        failure_tokens: compile_set(FAILURE_TOKENS),
        connectives: Regex::new(&format!(
            "(?i)\\b({})\\b",
            CONTRASTIVE_CONNECTIVES.join("|")
        ))
        .expect("static connective pattern"),
    })
}

fn count(patterns: &[Regex], content: &str) -> usize {
    patterns.iter().filter(|re| re.is_match(content)).count()
}

#[derive(Debug, Clone, Default)]
pub struct TechnicalContextResult {
    pub domain: Option<TechnicalDomain>,
    pub confidence: f32,
    pub complex_outcome_detected: bool,
}

/// Classify the technical domain and detect contradictory outcomes (§4.6).
/// `solution_tools` are tool names used by the solution under evaluation;
/// each recognised tool applies a small multiplicative boost to its domain.
pub fn analyze(content: &str, solution_tools: &[String]) -> TechnicalContextResult {
    let p = patterns();

    let mut best: Option<(TechnicalDomain, f32)> = None;
    for d in &p.domains {
        let mut score = 2.0 * count(&d.success, content) as f32
            + 1.5 * count(&d.failure, content) as f32
            + count(&d.tools, content) as f32;

        let tool_hits = solution_tools
            .iter()
            .filter(|t| d.tools.iter().any(|re| re.is_match(t)))
            .count();
        if tool_hits > 0 {
            score *= 1.0 + 0.1 * tool_hits as f32;
        }

        if best.as_ref().map(|(_, s)| score > *s).unwrap_or(true) {
            best = Some((d.domain, score));
        }
    }

    let (domain, confidence) = match best {
        Some((domain, score)) => {
            let normalised = (score / 5.0).min(1.0);
            if normalised >= 0.4 {
                (Some(domain), normalised)
            } else {
                (None, normalised)
            }
        }
        None => (None, 0.0),
    };

    let complex_outcome_detected =
        p.contradictory_pairs.iter().any(|(a, b)| {
            a.iter().any(|re| re.is_match(content)) && b.iter().any(|re| re.is_match(content))
        }) || has_contrastive_success_failure(content, p);

    TechnicalContextResult {
        domain,
        confidence,
        complex_outcome_detected,
    }
}

fn has_contrastive_success_failure(content: &str, p: &TechnicalPatterns) -> bool {
    if p.connectives.find(content).is_none() {
        return false;
    }
    let has_success = p.success_tokens.iter().any(|re| re.is_match(content));
    let has_failure = p.failure_tokens.iter().any(|re| re.is_match(content));
    has_success && has_failure
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_dominant_build_domain() {
        let result = analyze("the build failed with a compilation error in the linker", &[]);
        assert_eq!(result.domain, Some(TechnicalDomain::BuildSystem));
    }

    #[test]
    fn low_signal_content_yields_no_domain() {
        let result = analyze("just a general comment about the weather", &[]);
        assert_eq!(result.domain, None);
    }

    #[test]
    fn detects_contradictory_build_vs_test_outcome() {
        let result = analyze("the build passed but the test failed with an assertion error", &[]);
        assert!(result.complex_outcome_detected);
    }

    #[test]
    fn detects_contrastive_connective_with_mixed_tokens() {
        let result = analyze("it works now, however there was a crash later on", &[]);
        assert!(result.complex_outcome_detected);
    }

    #[test]
    fn solution_tools_boost_matching_domain_score() {
        let without = analyze("ran the pipeline", &[]);
        let with_tool = analyze("ran the pipeline", &["docker".to_string()]);
        assert!(with_tool.confidence >= without.confidence);
    }
}
