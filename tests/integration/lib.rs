//! Shared fixtures for the AgentWatch integration tests.

use agentwatch_core::types::{HookEvent, HookEventType};
use serde_json::json;

/// A minimal successful session: init, one Bash call and its result, final result.
pub fn four_line_session() -> Vec<String> {
    vec![
        json!({
            "type": "system", "subtype": "init",
            "session_id": "abc", "model": "claude-sonnet-4"
        })
        .to_string(),
        json!({
            "type": "assistant",
            "message": {"content": [
                {"type": "tool_use", "id": "toolu_1", "name": "Bash", "input": {"command": "ls"}}
            ]}
        })
        .to_string(),
        json!({
            "type": "user",
            "message": {"content": [
                {
                    "type": "tool_result", "tool_use_id": "toolu_1",
                    "content": "README.md", "is_error": false
                }
            ]}
        })
        .to_string(),
        json!({
            "type": "result", "subtype": "success", "is_error": false,
            "duration_ms": 1234, "num_turns": 1, "total_cost_usd": 0.002
        })
        .to_string(),
    ]
}

/// Wrap each line in an asciicast v2 output frame, one second apart, after a header.
pub fn as_recording(lines: &[String]) -> Vec<String> {
    let mut out = vec![json!({"version": 2, "width": 120, "height": 40}).to_string()];
    out.extend(
        lines
            .iter()
            .enumerate()
            .map(|(i, line)| json!([i as f64, "o", format!("{}\r\n", line)]).to_string()),
    );
    out
}

/// `n` distinct hook events for one session.
pub fn hook_events(session_id: &str, n: usize) -> Vec<HookEvent> {
    (0..n)
        .map(|i| {
            HookEvent::new(HookEventType::PostToolUse, session_id)
                .with_data("seq", json!(i))
        })
        .collect()
}
