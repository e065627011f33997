//! Incremental maintenance (C13)
//!
//! Scan-and-fix passes over stored metadata without rebuilding the index:
//! range-bound repairs, missing-field backfill, and snapshot/rollback for
//! undoing a batch of repairs.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::store::Store;
use crate::turn::{bounds, clamp, Turn};

/// Which predicate a scan checks records against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    SolutionQualityOutOfRange,
    ValidationStrengthOutOfRange,
    TopicConfidenceOutOfRange,
    OutcomeCertaintyOutOfRange,
    RealtimeLearningBoostOutOfRange,
    TroubleshootingContextOutOfRange,
    MissingPrimaryTopicWithScores,
    ValidatedAndRefutedBothSet,
}

/// One detected discrepancy between a field's stored value and its expected
/// (clamped / repaired) value.
#[derive(Debug, Clone)]
pub struct Issue {
    pub id: String,
    pub field: &'static str,
    pub current: String,
    pub expected: String,
}

fn field_bounds(kind: IssueKind) -> Option<(f32, f32)> {
    match kind {
        IssueKind::SolutionQualityOutOfRange => Some(bounds::SOLUTION_QUALITY),
        IssueKind::ValidationStrengthOutOfRange => Some(bounds::VALIDATION_STRENGTH),
        IssueKind::TopicConfidenceOutOfRange => Some(bounds::TOPIC_CONFIDENCE),
        IssueKind::OutcomeCertaintyOutOfRange => Some(bounds::OUTCOME_CERTAINTY),
        IssueKind::RealtimeLearningBoostOutOfRange => Some(bounds::REALTIME_LEARNING_BOOST),
        IssueKind::TroubleshootingContextOutOfRange => Some(bounds::TROUBLESHOOTING_CONTEXT),
        IssueKind::MissingPrimaryTopicWithScores | IssueKind::ValidatedAndRefutedBothSet => None,
    }
}

fn field_name(kind: IssueKind) -> &'static str {
    match kind {
        IssueKind::SolutionQualityOutOfRange => "solution_quality_score",
        IssueKind::ValidationStrengthOutOfRange => "validation_strength",
        IssueKind::TopicConfidenceOutOfRange => "topic_confidence",
        IssueKind::OutcomeCertaintyOutOfRange => "outcome_certainty",
        IssueKind::RealtimeLearningBoostOutOfRange => "realtime_learning_boost",
        IssueKind::TroubleshootingContextOutOfRange => "troubleshooting_context_score",
        IssueKind::MissingPrimaryTopicWithScores => "primary_topic",
        IssueKind::ValidatedAndRefutedBothSet => "is_refuted_attempt",
    }
}

fn numeric_field(turn: &Turn, kind: IssueKind) -> Option<f32> {
    match kind {
        IssueKind::SolutionQualityOutOfRange => Some(turn.solution_quality_score),
        IssueKind::ValidationStrengthOutOfRange => Some(turn.validation_strength),
        IssueKind::TopicConfidenceOutOfRange => Some(turn.topic_confidence),
        IssueKind::OutcomeCertaintyOutOfRange => Some(turn.outcome_certainty),
        IssueKind::RealtimeLearningBoostOutOfRange => Some(turn.realtime_learning_boost),
        IssueKind::TroubleshootingContextOutOfRange => Some(turn.troubleshooting_context_score),
        _ => None,
    }
}

fn detect(turn: &Turn, kind: IssueKind) -> Option<Issue> {
    if let Some(b) = field_bounds(kind) {
        let current = numeric_field(turn, kind)?;
        let expected = clamp(current, b);
        if (current - expected).abs() > f32::EPSILON {
            return Some(Issue {
                id: turn.id.clone(),
                field: field_name(kind),
                current: current.to_string(),
                expected: expected.to_string(),
            });
        }
        return None;
    }

    match kind {
        IssueKind::MissingPrimaryTopicWithScores => {
            let has_scores = turn.topic_scores.values().any(|&s| s >= 0.1);
            if has_scores && turn.primary_topic.is_none() {
                Some(Issue {
                    id: turn.id.clone(),
                    field: "primary_topic",
                    current: "none".to_string(),
                    expected: "recomputed".to_string(),
                })
            } else {
                None
            }
        }
        IssueKind::ValidatedAndRefutedBothSet => {
            if turn.is_validated_solution && turn.is_refuted_attempt {
                Some(Issue {
                    id: turn.id.clone(),
                    field: "is_refuted_attempt",
                    current: "true".to_string(),
                    expected: "false".to_string(),
                })
            } else {
                None
            }
        }
        _ => unreachable!("numeric kinds handled above"),
    }
}

fn repair(turn: &mut Turn, kind: IssueKind) {
    match kind {
        IssueKind::MissingPrimaryTopicWithScores => turn.recompute_primary_topic(),
        _ => turn.clamp_fields(),
    }
}

/// Scan every stored turn and return issues matching `kind`.
pub fn scan(store: &Store, kind: IssueKind) -> crate::store::Result<Vec<Issue>> {
    let mut issues = Vec::new();
    store.iterate(|turn| {
        if let Some(issue) = detect(turn, kind) {
            issues.push(issue);
        }
        Ok(())
    })?;
    Ok(issues)
}

/// Apply repairs for the given issues. When `dry_run` is true, no writes
/// happen; the count of records that would be touched is still returned.
pub fn apply(store: &Store, kind: IssueKind, issues: &[Issue], dry_run: bool) -> crate::store::Result<usize> {
    let mut applied = 0;
    for issue in issues {
        let Some(mut turn) = store.get(&issue.id)? else { continue };
        repair(&mut turn, kind);
        if !dry_run {
            store.update_metadata(&turn)?;
        }
        applied += 1;
    }
    Ok(applied)
}

/// A persisted copy of the prior metadata for a set of ids, for undoing a
/// batch of repairs.
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub turns: Vec<Turn>,
}

/// Write the current metadata for `ids` to `path` and return the path as the
/// snapshot handle.
pub fn snapshot(store: &Store, ids: &[String], path: &Path) -> crate::store::Result<PathBuf> {
    let mut turns = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(turn) = store.get(id)? {
            turns.push(turn);
        }
    }
    let snapshot = Snapshot { turns };
    let json = serde_json::to_vec_pretty(&snapshot)?;
    fs::write(path, json)?;
    Ok(path.to_path_buf())
}

/// Restore every turn recorded in the snapshot at `handle`.
pub fn rollback(store: &Store, handle: &Path) -> crate::store::Result<usize> {
    let bytes = fs::read(handle)?;
    let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
    let count = snapshot.turns.len();
    for turn in &snapshot.turns {
        store.update_metadata(turn)?;
    }
    Ok(count)
}

/// Per-field population and range-violation percentages, plus a composite
/// health score, sampled over up to `sample_limit` records.
#[derive(Debug, Clone, Default)]
pub struct HealthReport {
    pub sampled: u64,
    pub population_pct: HashMap<&'static str, f32>,
    pub violation_pct: HashMap<&'static str, f32>,
    pub health_score: f32,
}

const NUMERIC_KINDS: &[IssueKind] = &[
    IssueKind::SolutionQualityOutOfRange,
    IssueKind::ValidationStrengthOutOfRange,
    IssueKind::TopicConfidenceOutOfRange,
    IssueKind::OutcomeCertaintyOutOfRange,
    IssueKind::RealtimeLearningBoostOutOfRange,
    IssueKind::TroubleshootingContextOutOfRange,
];

pub fn health_report(store: &Store, sample_limit: u64) -> crate::store::Result<HealthReport> {
    let mut sampled = 0u64;
    let mut violations: HashMap<&'static str, u64> = HashMap::new();
    let mut populated: HashMap<&'static str, u64> = HashMap::new();

    store.iterate(|turn| {
        if sampled >= sample_limit {
            return Ok(());
        }
        sampled += 1;

        for &kind in NUMERIC_KINDS {
            let name = field_name(kind);
            *populated.entry(name).or_insert(0) += 1;
            if detect(turn, kind).is_some() {
                *violations.entry(name).or_insert(0) += 1;
            }
        }
        if turn.primary_topic.is_some() {
            *populated.entry("primary_topic").or_insert(0) += 1;
        }
        Ok(())
    })?;

    let mut population_pct = HashMap::new();
    let mut violation_pct = HashMap::new();
    if sampled > 0 {
        for &kind in NUMERIC_KINDS {
            let name = field_name(kind);
            let pop = *populated.get(name).unwrap_or(&0) as f32 / sampled as f32 * 100.0;
            let viol = *violations.get(name).unwrap_or(&0) as f32 / sampled as f32 * 100.0;
            population_pct.insert(name, pop);
            violation_pct.insert(name, viol);
        }
        let topic_pop = *populated.get("primary_topic").unwrap_or(&0) as f32 / sampled as f32 * 100.0;
        population_pct.insert("primary_topic", topic_pop);
    }

    let mean_violation = if violation_pct.is_empty() {
        0.0
    } else {
        violation_pct.values().sum::<f32>() / violation_pct.len() as f32
    };
    let health_score = (100.0 - mean_violation).max(0.0) / 100.0;

    Ok(HealthReport { sampled, population_pct, violation_pct, health_score })
}
