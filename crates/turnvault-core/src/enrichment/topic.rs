//! Topic, quality, and troubleshooting classifiers (C3)

use crate::turn::{SolutionCategory, TopicScores};
use regex::Regex;
use std::sync::OnceLock;

/// One of the roughly dozen topics tracked across the corpus.
const TOPICS: &[(&str, &[&str])] = &[
    ("debugging", &["bug", "debug", "error", "exception", "stack trace", "traceback", "crash", "fix"]),
    ("performance", &["slow", "performance", "latency", "optimi", "bottleneck", "profil", "cache", "throughput"]),
    ("authentication", &["auth", "login", "token", "session", "oauth", "jwt", "password", "permission"]),
    ("deployment", &["deploy", "ci/cd", "pipeline", "docker", "kubernetes", "release", "rollout", "production"]),
    ("testing", &["test", "assert", "mock", "unit test", "integration test", "coverage", "fixture"]),
    ("styling", &["css", "style", "layout", "color", "font", "responsive", "theme"]),
    ("database", &["sql", "database", "query", "migration", "schema", "index", "transaction", "table"]),
    ("api", &["api", "endpoint", "rest", "graphql", "request", "response", "http", "route"]),
    ("state-management", &["state", "redux", "store", "reducer", "context provider", "signal"]),
    ("configuration", &["config", "environment variable", "settings", "yaml", "toml", "dotenv"]),
    ("architecture", &["architecture", "design pattern", "module", "service", "microservice", "interface"]),
    ("framework", &["react", "vue", "angular", "django", "rails", "express", "next.js", "spring"]),
];

const SUCCESS_MARKERS_TIER1: &[&str] = &["works now", "fixed it", "all tests pass", "resolved"];
const SUCCESS_MARKERS_TIER2: &[&str] = &["that worked", "fixed", "solved", "passes now"];
const SUCCESS_MARKERS_TIER3: &[&str] = &["thanks", "looks good", "makes sense", "great"];

const FAILURE_MARKERS: &[&str] = &["still failing", "doesn't work", "not working", "same error", "still broken"];

const CODE_INDICATORS: &[&str] = &["```", "fn ", "def ", "function ", "class ", "const ", "import "];
const TOOL_USAGE_MARKERS: &[&str] = &["ran `", "executed", "applied the patch", "edited the file", "used the tool"];

const SOLUTION_PHRASES: &[&str] = &[
    "here's the fix",
    "try this",
    "you can fix this by",
    "the solution is",
    "this should resolve",
    "i've updated",
    "i changed",
];

const CONFIG_KEYWORDS: &[&str] = &["config", "environment variable", "yaml", "toml", ".env", "settings file"];
const COMMAND_KEYWORDS: &[&str] = &["run `", "execute", "command line", "terminal", "shell"];
const DEBUG_KEYWORDS: &[&str] = &["stack trace", "debugger", "breakpoint", "root cause", "traceback"];
const ARCHITECTURE_KEYWORDS: &[&str] = &["refactor", "design pattern", "architecture", "module boundary"];
const FILE_KEYWORDS: &[&str] = &["create a file", "edit the file", "new file", "delete the file"];

const ERROR_LEXICON: &[&str] = &["error", "exception", "failure", "crash", "traceback"];
const DIAGNOSIS_LEXICON: &[&str] = &["root cause", "diagnos", "investigat", "reproduc", "narrowed down"];
const RESOLUTION_LEXICON: &[&str] = &["fixed", "resolved", "patched", "workaround", "mitigat"];

fn word_boundary_pattern(phrase: &str) -> String {
    let escaped = regex::escape(phrase);
    if phrase.contains(' ') || phrase.contains('.') || phrase.contains('`') || phrase.contains('\'') {
        escaped
    } else {
        format!(r"\b{escaped}\b")
    }
}

fn compile_set(words: &[&str]) -> Vec<Regex> {
    words
        .iter()
        .map(|w| Regex::new(&format!("(?i){}", word_boundary_pattern(w))).expect("static lexicon pattern"))
        .collect()
}

struct TopicPatterns {
    topics: Vec<(&'static str, Vec<Regex>)>,
    success_tier1: Vec<Regex>,
    success_tier2: Vec<Regex>,
    success_tier3: Vec<Regex>,
    failure: Vec<Regex>,
    code_indicators: Vec<Regex>,
    tool_usage: Vec<Regex>,
    solution_phrases: Vec<Regex>,
    config_keywords: Vec<Regex>,
    command_keywords: Vec<Regex>,
    debug_keywords: Vec<Regex>,
    architecture_keywords: Vec<Regex>,
    file_keywords: Vec<Regex>,
    error_lexicon: Vec<Regex>,
    diagnosis_lexicon: Vec<Regex>,
    resolution_lexicon: Vec<Regex>,
}

static PATTERNS: OnceLock<TopicPatterns> = OnceLock::new();

fn patterns() -> &'static TopicPatterns {
    PATTERNS.get_or_init(|| TopicPatterns {
        topics: TOPICS.iter().map(|(name, words)| (*name, compile_set(words))).collect(),
        success_tier1: compile_set(SUCCESS_MARKERS_TIER1),
        success_tier2: compile_set(SUCCESS_MARKERS_TIER2),
        success_tier3: compile_set(SUCCESS_MARKERS_TIER3),
        failure: compile_set(FAILURE_MARKERS),
        code_indicators: compile_set(CODE_INDICATORS),
        tool_usage: compile_set(TOOL_USAGE_MARKERS),
        solution_phrases: compile_set(SOLUTION_PHRASES),
        config_keywords: compile_set(CONFIG_KEYWORDS),
        command_keywords: compile_set(COMMAND_KEYWORDS),
        debug_keywords: compile_set(DEBUG_KEYWORDS),
        architecture_keywords: compile_set(ARCHITECTURE_KEYWORDS),
        file_keywords: compile_set(FILE_KEYWORDS),
        error_lexicon: compile_set(ERROR_LEXICON),
        diagnosis_lexicon: compile_set(DIAGNOSIS_LEXICON),
        resolution_lexicon: compile_set(RESOLUTION_LEXICON),
    })
}

fn count_matches(patterns: &[Regex], content: &str) -> usize {
    patterns.iter().filter(|re| re.is_match(content)).count()
}

/// Per-topic normalised scores (§4.3). Values below 0.1 are dropped.
pub fn score_topics(content: &str) -> TopicScores {
    let word_count = content.split_whitespace().count().max(1);
    let mut scores = TopicScores::new();

    for (name, patterns) in &patterns().topics {
        let raw = count_matches(patterns, content) as f32;
        let normalised = (raw / (word_count as f32 * 0.01)).min(2.0);
        if normalised >= 0.1 {
            scores.insert((*name).to_string(), normalised);
        }
    }
    scores
}

/// `solution_quality_score` (clamped to [0.1, 3.0] by the caller) and
/// whether any success marker fired at all (`has_success_markers`, §4.3).
pub fn quality_score(content: &str, has_code: bool, tools_used_present: bool) -> (f32, bool) {
    let p = patterns();
    let tier1 = count_matches(&p.success_tier1, content);
    let tier2 = count_matches(&p.success_tier2, content);
    let tier3 = count_matches(&p.success_tier3, content);
    let has_success_markers = tier1 + tier2 + tier3 > 0;

    let mut score = 0.3 * tier1 as f32 + 0.4 * tier2 as f32 + 0.5 * tier3 as f32;

    if has_code || count_matches(&p.code_indicators, content) > 0 {
        score += 0.2;
    }
    if tools_used_present || count_matches(&p.tool_usage, content) > 0 {
        score += 0.3;
    }
    if content.len() > 500 {
        score += 0.1;
    }
    if content.len() > 1500 {
        score += 0.1;
    }
    score -= 0.4 * count_matches(&p.failure, content) as f32;

    (score.clamp(0.1, 3.0), has_success_markers)
}

/// Whether an assistant turn reads as an attempted solution (§4.3, threshold 3).
pub fn is_solution_attempt(content: &str, has_code: bool) -> bool {
    let p = patterns();
    let mut weighted = 2.0 * count_matches(&p.solution_phrases, content) as f32;
    if has_code {
        weighted += 2.0;
    }
    weighted += count_matches(&p.tool_usage, content) as f32;
    weighted >= 3.0
}

/// Priority-ordered category classification (§4.3).
pub fn solution_category(content: &str, has_code: bool) -> SolutionCategory {
    let p = patterns();
    if has_code || count_matches(&p.code_indicators, content) > 0 {
        SolutionCategory::CodeFix
    } else if count_matches(&p.config_keywords, content) > 0 {
        SolutionCategory::ConfigChange
    } else if count_matches(&p.command_keywords, content) > 0 {
        SolutionCategory::CommandSolution
    } else if count_matches(&p.debug_keywords, content) > 0 {
        SolutionCategory::DebuggingHelp
    } else if count_matches(&p.architecture_keywords, content) > 0 {
        SolutionCategory::ApproachSuggestion
    } else if count_matches(&p.file_keywords, content) > 0 {
        SolutionCategory::FileOperation
    } else if count_matches(&p.solution_phrases, content) > 0 {
        SolutionCategory::GeneralGuidance
    } else {
        SolutionCategory::None
    }
}

/// Troubleshooting boost, clamped to [1.0, 2.5] by the caller (§4.3).
pub fn troubleshooting_boost(content: &str, troubleshooting_mode: bool) -> f32 {
    if !troubleshooting_mode {
        return 1.0;
    }
    let p = patterns();
    let boost = 1.0
        + 0.15 * count_matches(&p.error_lexicon, content) as f32
        + 0.2 * count_matches(&p.diagnosis_lexicon, content) as f32
        + 0.25 * count_matches(&p.resolution_lexicon, content) as f32;
    boost.clamp(1.0, 2.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_topics_drops_sub_threshold_scores() {
        let scores = score_topics("a perfectly ordinary sentence with nothing special in it at all");
        assert!(scores.values().all(|&v| v >= 0.1));
    }

    #[test]
    fn score_topics_flags_debugging_content() {
        let scores = score_topics("we hit a crash with a stack trace, here is the traceback and bug");
        assert!(scores.get("debugging").copied().unwrap_or(0.0) > 0.0);
    }

    #[test]
    fn quality_score_rewards_success_markers_and_penalizes_failures() {
        let (good, good_markers) = quality_score("that worked, all tests pass now", false, false);
        let (bad, bad_markers) = quality_score("still failing, same error as before", false, false);
        assert!(good > bad);
        assert!(good_markers);
        assert!(!bad_markers);
    }

    #[test]
    fn quality_score_stays_in_bounds() {
        let huge = "thanks ".repeat(200);
        assert!(quality_score(&huge, true, true).0 <= 3.0);
        assert!(quality_score("nothing", false, false).0 >= 0.1);
    }

    #[test]
    fn is_solution_attempt_requires_threshold() {
        assert!(!is_solution_attempt("just chatting", false));
        assert!(is_solution_attempt("here's the fix: use the updated config", true));
    }

    #[test]
    fn solution_category_prefers_code_fix_over_other_signals() {
        let content = "```rust\nfn main() {}\n``` also run `cargo test`";
        assert_eq!(solution_category(content, true), SolutionCategory::CodeFix);
    }

    #[test]
    fn troubleshooting_boost_is_neutral_when_mode_disabled() {
        assert_eq!(troubleshooting_boost("error exception crash", false), 1.0);
    }

    #[test]
    fn troubleshooting_boost_clamped_to_upper_bound() {
        let many = "error exception failure crash traceback ".repeat(20);
        assert!(troubleshooting_boost(&many, true) <= 2.5);
    }
}
