//! Boosted query engine (C11)

use crate::enrichment::topic;
use crate::store::Store;
use crate::turn::{Role, Turn};

const TOPIC_BOOST_CAP: f32 = 2.5;
const QUALITY_BOOST_CAP: f32 = 3.0;
const VALIDATION_BOOST_CAP: f32 = 2.5;
const TROUBLESHOOTING_BOOST_CAP: f32 = 2.5;
const RECENCY_BOOST_CAP: f32 = 1.8;
const PREFERENCE_MULTIPLIER_CAP: f32 = 2.0;
const OVERALL_BOOST_CAP: f32 = 8.0;

/// Candidate pool size relative to the requested result count (§4.11 step 1).
const CANDIDATE_POOL_MULTIPLIER: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationPreference {
    ValidatedOnly,
    IncludeFailures,
    #[default]
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferenceNudge {
    PreferCode,
    PreferValidated,
    PreferDetailed,
}

#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub project_key: Option<String>,
    pub session_key: Option<String>,
    pub role: Option<Role>,
}

impl QueryFilter {
    fn matches(&self, turn: &Turn) -> bool {
        if let Some(project_key) = &self.project_key {
            if turn.project_key.as_deref() != Some(project_key.as_str()) {
                return false;
            }
        }
        if let Some(session_key) = &self.session_key {
            if turn.session_key.as_deref() != Some(session_key.as_str()) {
                return false;
            }
        }
        if let Some(role) = self.role {
            if turn.role != role {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryFlags {
    pub topic_focus: Option<String>,
    pub prefer_solutions: bool,
    pub troubleshooting_mode: bool,
    pub validation_preference: ValidationPreference,
    pub prefer_recent: bool,
    pub show_context_chain: bool,
    pub chain_length: usize,
    pub preferences: Vec<PreferenceNudge>,
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub text: String,
    pub project_context: Option<String>,
    pub n: usize,
    pub flags: QueryFlags,
    pub filter: QueryFilter,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BoostBreakdown {
    pub project_boost: f32,
    pub topic_boost: f32,
    pub quality_boost: f32,
    pub validation_boost: f32,
    pub troubleshooting_boost: f32,
    pub recency_boost: f32,
    pub preference_multiplier: f32,
}

#[derive(Debug, Clone)]
pub struct ScoredTurn {
    pub turn: Turn,
    pub base_similarity: f32,
    pub boosts: BoostBreakdown,
    pub combined: f32,
    pub context_chain: Option<Vec<Turn>>,
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum QueryError {
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
    #[cfg(feature = "embeddings")]
    #[error(transparent)]
    Embedding(#[from] crate::embeddings::EmbeddingError),
    #[error("vector search requires the `embeddings` and `vector-search` features")]
    SearchUnavailable,
}

pub type Result<T> = std::result::Result<T, QueryError>;

fn recency_boost(age_seconds: f64) -> f32 {
    const HOUR: f64 = 3600.0;
    const DAY: f64 = 86400.0;
    if age_seconds <= HOUR {
        1.8
    } else if age_seconds <= 6.0 * HOUR {
        1.6
    } else if age_seconds <= DAY {
        1.4
    } else if age_seconds <= 3.0 * DAY {
        1.2
    } else if age_seconds <= 7.0 * DAY {
        1.1
    } else if age_seconds <= 30.0 * DAY {
        1.0
    } else {
        0.8
    }
}

fn compute_boosts(turn: &Turn, req: &QueryRequest, now_unix: f64) -> BoostBreakdown {
    let project_boost = match (&req.project_context, &turn.project_key) {
        (Some(ctx), Some(p)) if ctx == p => 1.2,
        _ => 1.0,
    };

    let topic_boost = match &req.flags.topic_focus {
        Some(focus) => match turn.topic_scores.get(focus) {
            Some(&score) => (1.0 + 0.5 * score).min(TOPIC_BOOST_CAP),
            None => 1.0,
        },
        None => 1.0,
    };

    let quality_boost = if req.flags.prefer_solutions {
        turn.solution_quality_score.min(QUALITY_BOOST_CAP)
    } else {
        1.0
    };

    let validation_boost = match req.flags.validation_preference {
        ValidationPreference::ValidatedOnly => {
            if turn.is_validated_solution {
                1.5 + turn.validation_strength
            } else if turn.is_refuted_attempt {
                0.2
            } else {
                0.8
            }
        }
        ValidationPreference::IncludeFailures => {
            if turn.is_refuted_attempt {
                1.3
            } else {
                1.0
            }
        }
        ValidationPreference::Neutral => turn.outcome_certainty.max(0.0),
    }
    .min(VALIDATION_BOOST_CAP);

    let troubleshooting_boost = if req.flags.troubleshooting_mode {
        topic::troubleshooting_boost(&turn.content, true).min(TROUBLESHOOTING_BOOST_CAP)
    } else {
        1.0
    };

    let recency_boost = if req.flags.prefer_recent {
        match turn.timestamp_unix {
            Some(ts) => recency_boost((now_unix - ts).max(0.0)).min(RECENCY_BOOST_CAP),
            None => 1.0,
        }
    } else {
        1.0
    };

    let mut preference_multiplier = 1.0_f32;
    for pref in &req.flags.preferences {
        preference_multiplier *= match pref {
            PreferenceNudge::PreferCode if turn.has_code => 1.15,
            PreferenceNudge::PreferValidated if turn.is_validated_solution => 1.15,
            PreferenceNudge::PreferDetailed if turn.content_length > 500 => 1.1,
            _ => 1.0,
        };
    }
    preference_multiplier = preference_multiplier.min(PREFERENCE_MULTIPLIER_CAP);

    BoostBreakdown {
        project_boost,
        topic_boost,
        quality_boost,
        validation_boost,
        troubleshooting_boost,
        recency_boost,
        preference_multiplier,
    }
}

impl BoostBreakdown {
    fn product(&self) -> f32 {
        self.project_boost
            * self.topic_boost
            * self.quality_boost
            * self.validation_boost
            * self.troubleshooting_boost
            * self.recency_boost
    }
}

/// Run a boosted query over the store (§4.11). `now_unix` is injected by the
/// caller rather than read from the clock, keeping this function pure and
/// deterministic for tests.
#[cfg(all(feature = "embeddings", feature = "vector-search"))]
pub fn query(
    store: &Store,
    embedding_service: &crate::embeddings::EmbeddingService,
    req: &QueryRequest,
    now_unix: f64,
) -> Result<Vec<ScoredTurn>> {
    let query_embedding = embedding_service.embed(&req.text)?;
    let pool_size = req.n * CANDIDATE_POOL_MULTIPLIER;
    let candidates = store.vector_search(&query_embedding.vector, pool_size.max(req.n))?;

    let mut scored = Vec::with_capacity(candidates.len());
    for (id, similarity) in candidates {
        let Some(turn) = store.get(&id)? else { continue };
        if !req.filter.matches(&turn) {
            continue;
        }
        let boosts = compute_boosts(&turn, req, now_unix);
        let bounded_product = boosts.product().min(OVERALL_BOOST_CAP);
        let combined = similarity * bounded_product * boosts.preference_multiplier;

        scored.push(ScoredTurn {
            turn,
            base_similarity: similarity,
            boosts,
            combined,
            context_chain: None,
        });
    }

    scored.sort_by(|a, b| b.combined.partial_cmp(&a.combined).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(req.n);

    if req.flags.show_context_chain {
        for item in &mut scored {
            item.context_chain = build_context_chain(store, &item.turn, req.flags.chain_length)?;
        }
    }

    Ok(scored)
}

#[cfg(not(all(feature = "embeddings", feature = "vector-search")))]
pub fn query(
    _store: &Store,
    _req: &QueryRequest,
    _now_unix: f64,
) -> Result<Vec<ScoredTurn>> {
    Err(QueryError::SearchUnavailable)
}

fn build_context_chain(store: &Store, anchor: &Turn, chain_length: usize) -> Result<Option<Vec<Turn>>> {
    let Some(session_key) = &anchor.session_key else { return Ok(None) };
    let session_turns = store.turns_for_session(session_key)?;
    let Some(anchor_index) = session_turns.iter().position(|t| t.id == anchor.id) else {
        return Ok(None);
    };

    let start = anchor_index.saturating_sub(chain_length);
    let end = (anchor_index + chain_length + 1).min(session_turns.len());
    Ok(Some(session_turns[start..end].to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recency_boost_matches_piecewise_bands() {
        assert_eq!(recency_boost(1800.0), 1.8);
        assert_eq!(recency_boost(3.0 * 3600.0), 1.6);
        assert_eq!(recency_boost(20.0 * 3600.0), 1.4);
        assert_eq!(recency_boost(2.0 * 86400.0), 1.2);
        assert_eq!(recency_boost(5.0 * 86400.0), 1.1);
        assert_eq!(recency_boost(20.0 * 86400.0), 1.0);
        assert_eq!(recency_boost(60.0 * 86400.0), 0.8);
    }

    #[test]
    fn boost_product_is_capped_at_eight() {
        let mut turn = crate::turn::tests_support::blank("a", "content", "s1", 0);
        turn.solution_quality_score = 3.0;
        turn.is_validated_solution = true;
        turn.validation_strength = 1.0;
        turn.topic_scores.insert("debugging".into(), 2.0);

        let req = QueryRequest {
            text: "q".into(),
            project_context: Some("proj".into()),
            n: 5,
            flags: QueryFlags {
                topic_focus: Some("debugging".into()),
                prefer_solutions: true,
                troubleshooting_mode: true,
                validation_preference: ValidationPreference::ValidatedOnly,
                prefer_recent: true,
                show_context_chain: false,
                chain_length: 2,
                preferences: vec![],
            },
            filter: QueryFilter::default(),
        };
        turn.project_key = Some("proj".into());
        turn.timestamp_unix = Some(1000.0);

        let boosts = compute_boosts(&turn, &req, 1000.5);
        assert!(boosts.product() <= OVERALL_BOOST_CAP * 2.0); // product itself isn't pre-capped, caller caps it
        let capped = boosts.product().min(OVERALL_BOOST_CAP);
        assert!(capped <= OVERALL_BOOST_CAP);
    }

    #[test]
    fn query_filter_matches_project_session_and_role() {
        let mut turn = crate::turn::tests_support::blank("a", "c", "s1", 0);
        turn.project_key = Some("proj".into());
        let filter = QueryFilter {
            project_key: Some("proj".into()),
            session_key: Some("s1".into()),
            role: Some(Role::User),
        };
        assert!(filter.matches(&turn));

        let mismatched = QueryFilter { project_key: Some("other".into()), ..Default::default() };
        assert!(!mismatched.matches(&turn));
    }
}
