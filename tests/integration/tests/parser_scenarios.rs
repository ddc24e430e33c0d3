//! End-to-end parsing scenarios over whole sessions.

use agentwatch_core::types::EventKind;
use agentwatch_integration_tests::{as_recording, four_line_session};
use agentwatch_telemetry::EventStreamParser;
use serde_json::json;

#[test]
fn test_four_line_session_events_and_summary() {
    let mut parser = EventStreamParser::new("abc");
    let events = parser.parse_lines(four_line_session());

    let types: Vec<_> = events.iter().map(|e| e.event_type()).collect();
    assert_eq!(
        types,
        [
            "session_started",
            "tool_execution_started",
            "tool_execution_completed",
            "session_completed"
        ]
    );

    let summary = parser.get_summary().unwrap();
    assert_eq!(summary.tool_calls().get("Bash"), Some(&1));
    assert_eq!(summary.total_tool_calls(), 1);
    assert_eq!(summary.duration_ms(), Some(1234));
    assert_eq!(summary.total_cost_usd(), Some(0.002));
    assert!(summary.success());
}

#[test]
fn test_recording_matches_plain_stream() {
    let mut plain = EventStreamParser::new("abc");
    let plain_events = plain.parse_lines(four_line_session());

    let mut recorded = EventStreamParser::new("abc");
    let recorded_events = recorded.parse_lines(as_recording(&four_line_session()));

    let plain_types: Vec<_> = plain_events.iter().map(|e| e.event_type()).collect();
    let recorded_types: Vec<_> = recorded_events.iter().map(|e| e.event_type()).collect();
    assert_eq!(plain_types, recorded_types);
    assert_eq!(
        plain.get_summary().unwrap().tool_calls(),
        recorded.get_summary().unwrap().tool_calls()
    );
}

#[test]
fn test_completion_before_start_uses_unknown() {
    let mut parser = EventStreamParser::new("s");
    let events = parser.parse_line(
        &json!({
            "type": "user",
            "message": {"content": [{"type": "tool_result", "tool_use_id": "ghost"}]}
        })
        .to_string(),
    );
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].tool_name(), Some("unknown"));
    assert_eq!(events[0].tool_use_id(), Some("ghost"));
}

#[test]
fn test_nested_subagents_are_attributed() {
    let dispatch = |id: &str, kind: &str, parent: Option<&str>| {
        json!({
            "type": "assistant",
            "parent_tool_use_id": parent,
            "message": {"content": [{"type": "tool_use", "id": id, "name": "Task",
                "input": {"subagent_type": kind}}]}
        })
        .to_string()
    };
    let call = |id: &str, name: &str, parent: &str| {
        json!({
            "type": "assistant",
            "parent_tool_use_id": parent,
            "message": {"content": [{"type": "tool_use", "id": id, "name": name, "input": {}}]}
        })
        .to_string()
    };
    let done = |id: &str, parent: Option<&str>| {
        json!({
            "type": "user",
            "parent_tool_use_id": parent,
            "message": {"content": [{"type": "tool_result", "tool_use_id": id}]}
        })
        .to_string()
    };

    let mut parser = EventStreamParser::new("s");
    let events = parser.parse_lines([
        dispatch("outer", "planner", None),
        call("p1", "Read", "outer"),
        dispatch("inner", "coder", Some("outer")),
        call("c1", "Edit", "inner"),
        call("c2", "Edit", "inner"),
        done("c1", Some("inner")),
        done("c2", Some("inner")),
        done("inner", Some("outer")),
        done("p1", Some("outer")),
        done("outer", None),
    ]);

    let stops: Vec<_> = events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::SubagentStopped { subagent_name, .. } => Some(subagent_name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(stops, ["coder", "planner"]);

    let summary = parser.get_summary().unwrap();
    assert_eq!(summary.subagent_count(), 2);
    let usage = summary.subagent_tool_usage();
    assert_eq!(usage["planner"].get("Read"), Some(&1));
    assert_eq!(usage["planner"].get("Task"), Some(&1));
    assert_eq!(usage["coder"].get("Edit"), Some(&2));
    assert_eq!(summary.turns(), 1);
    assert_eq!(parser.pending_calls(), 0);
}

#[test]
fn test_garbage_interleaved_with_valid_records() {
    let mut lines = four_line_session();
    lines.insert(1, "\u{1b}[2K spinner".to_string());
    lines.insert(3, "{\"type\": 7}".to_string());
    lines.insert(0, String::new());

    let mut parser = EventStreamParser::new("abc");
    let events = parser.parse_lines(&lines);
    assert_eq!(events.len(), 4);
    assert_eq!(parser.lines_processed(), 7);
}
