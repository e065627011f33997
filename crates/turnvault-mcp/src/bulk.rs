//! Bulk transcript ingestion (§6.1)
//!
//! Parses JSONL transcript files: one JSON object per line, each carrying an
//! id, a timestamp, a session/project identifier, and a `message` object with
//! a role and content. Lines that don't parse are skipped and counted rather
//! than aborting the whole file.

use serde::Deserialize;
use serde_json::Value;
use turnvault_core::{Role, RawTurn};

#[derive(Debug, Deserialize)]
struct TranscriptLine {
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(rename = "sessionId", default)]
    session_id: Option<String>,
    #[serde(default)]
    cwd: Option<String>,
    message: MessageBody,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    #[serde(default)]
    role: Option<String>,
    content: Value,
}

/// Counts of parse outcomes over a bulk file, for `force_sync`-style reporting.
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkParseStats {
    pub parsed: u64,
    pub skipped: u64,
}

fn content_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .map(part_text)
            .collect::<Vec<_>>()
            .join(""),
        other => other.to_string(),
    }
}

fn part_text(part: &Value) -> String {
    match part {
        Value::String(s) => s.clone(),
        Value::Object(obj) => {
            let is_text = obj.get("type").and_then(Value::as_str) == Some("text");
            if is_text {
                obj.get("text").and_then(Value::as_str).unwrap_or_default().to_string()
            } else {
                part.to_string()
            }
        }
        other => other.to_string(),
    }
}

/// Parse one JSONL line into a [`RawTurn`]. Returns `None` if the line is not
/// valid JSON or lacks a usable `message` object.
pub fn parse_line(line: &str) -> Option<RawTurn> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed: TranscriptLine = serde_json::from_str(trimmed).ok()?;

    let id = parsed.uuid.or(parsed.id);
    let role = parsed.message.role.as_deref().map(Role::from_raw).unwrap_or(Role::Unknown);
    let content = content_text(&parsed.message.content);

    Some(RawTurn {
        id,
        content,
        role,
        project_key: parsed.cwd.clone(),
        project_display_name: parsed.cwd,
        session_key: parsed.session_id,
        source_file: None,
        sequence_position: None,
        timestamp_iso: parsed.timestamp,
        timestamp_unix: None,
        tools_used: vec![],
    })
}

/// Parse a whole JSONL file's contents, skipping unparseable lines.
pub fn parse_file(contents: &str) -> (Vec<RawTurn>, BulkParseStats) {
    let mut turns = Vec::new();
    let mut stats = BulkParseStats::default();

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line) {
            Some(turn) => {
                turns.push(turn);
                stats.parsed += 1;
            }
            None => stats.skipped += 1,
        }
    }

    (turns, stats)
}
