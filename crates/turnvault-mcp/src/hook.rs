//! Hook producer contract (§6.2)
//!
//! A hook call delivers one raw turn: at least a `type` (role) and `content`,
//! optionally a `timestamp`, plus ambient `session_id`/`cwd` supplied by the
//! caller rather than carried in the payload itself. Normalised the same way
//! as bulk turns before being routed into enrichment.

use serde::Deserialize;
use serde_json::Value;
use turnvault_core::{Role, RawTurn};

#[derive(Debug, Deserialize)]
struct HookPayload {
    #[serde(rename = "type", default)]
    turn_type: Option<String>,
    content: Value,
    #[serde(default)]
    timestamp: Option<String>,
}

fn content_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Normalise a hook payload into a [`RawTurn`], attaching the ambient
/// session/project context the hook caller supplied out-of-band.
pub fn normalize(
    payload_json: &str,
    session_id: Option<String>,
    cwd: Option<String>,
) -> Result<RawTurn, serde_json::Error> {
    let payload: HookPayload = serde_json::from_str(payload_json)?;
    let role = payload.turn_type.as_deref().map(Role::from_raw).unwrap_or(Role::Unknown);

    Ok(RawTurn {
        id: None,
        content: content_text(&payload.content),
        role,
        project_key: cwd.clone(),
        project_display_name: cwd,
        session_key: session_id,
        source_file: None,
        sequence_position: None,
        timestamp_iso: payload.timestamp,
        timestamp_unix: None,
        tools_used: vec![],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_hook_payload_with_ambient_context() {
        let payload = r#"{"type":"human","content":"still broken"}"#;
        let turn = normalize(payload, Some("s1".into()), Some("/proj".into())).unwrap();
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.content, "still broken");
        assert_eq!(turn.session_key.as_deref(), Some("s1"));
        assert_eq!(turn.project_key.as_deref(), Some("/proj"));
    }

    #[test]
    fn rejects_malformed_payload() {
        assert!(normalize("not json", None, None).is_err());
    }
}
