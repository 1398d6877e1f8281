//! Finding the tool call in agent output.
//!
//! Structured output comes in several provider shapes; free text may carry a
//! call in a `<tool_call>` tag, a fenced block or a bare object. The first
//! call found wins.

use serde_json::{Map, Value};

use super::repair::ParseFailure;

/// Keys a flat `{name, ...}` call may keep its arguments under.
const ARGUMENT_KEYS: [&str; 5] = ["arguments", "input", "parameters", "args", "params"];

/// Keys that describe a call rather than being one of its arguments.
const ENVELOPE_KEYS: [&str; 3] = ["name", "type", "id"];

/// A tool call as the agent wrote it, before its arguments are normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCall {
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("no tool call found in the agent output")]
    NotFound,
    #[error("tool call is not valid JSON: {0}")]
    Syntax(ParseFailure),
}

/// The first tool call in `text`. Extra calls are ignored with a warning.
pub fn extract_call(text: &str) -> Result<RawCall, ExtractError> {
    let mut calls = extract_calls(text)?.into_iter();
    let first = calls.next().ok_or(ExtractError::NotFound)?;
    let ignored = calls.count();
    if ignored > 0 {
        log::warn!("agent output held {} tool calls; dispatching only '{}'", ignored + 1, first.name);
    }
    Ok(first)
}

/// Every tool call from the first source in `text` that holds any.
pub fn extract_calls(text: &str) -> Result<Vec<RawCall>, ExtractError> {
    let trimmed = text.trim();
    let mut failure = None;

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => {
            let calls = calls_in_value(&value);
            if !calls.is_empty() {
                return Ok(calls);
            }
        }
        Err(err) => {
            if trimmed.starts_with('{') && trimmed.contains("\"name\"") {
                failure = Some(ParseFailure::from_json(&err));
            }
        }
    }

    for candidate in candidates(trimmed) {
        match serde_json::from_str::<Value>(candidate) {
            Ok(value) => {
                let calls = calls_in_value(&value);
                if !calls.is_empty() {
                    return Ok(calls);
                }
            }
            Err(err) if candidate.contains("\"name\"") => {
                failure.get_or_insert_with(|| ParseFailure::from_json(&err));
            }
            Err(_) => {}
        }
    }

    Err(failure.map_or(ExtractError::NotFound, ExtractError::Syntax))
}

/// Tool calls in an already-parsed value, in any of the provider shapes.
pub fn calls_in_value(value: &Value) -> Vec<RawCall> {
    match value {
        Value::Array(items) => items.iter().flat_map(calls_in_value).collect(),
        Value::Object(object) => {
            if let Some(call) = call_from_object(object) {
                return vec![call];
            }
            let mut calls = Vec::new();
            for key in ["tool_calls", "content", "choices"] {
                if let Some(Value::Array(items)) = object.get(key) {
                    calls.extend(items.iter().flat_map(calls_in_value));
                }
            }
            if let Some(message @ Value::Object(_)) = object.get("message") {
                calls.extend(calls_in_value(message));
            }
            calls
        }
        _ => Vec::new(),
    }
}

fn call_from_object(object: &Map<String, Value>) -> Option<RawCall> {
    if object.get("type").and_then(Value::as_str) == Some("text") {
        return None;
    }

    // OpenAI: {"type": "function", "function": {"name", "arguments": "<json>"}}
    if let Some(Value::Object(function)) = object.get("function") {
        let name = function.get("name").and_then(Value::as_str)?;
        return Some(RawCall {
            name: name.to_string(),
            arguments: function.get("arguments").cloned().unwrap_or(Value::Null),
        });
    }

    let name = object.get("name").and_then(Value::as_str).filter(|n| !n.is_empty())?;
    let arguments = ARGUMENT_KEYS
        .iter()
        .find_map(|key| object.get(*key).cloned())
        .unwrap_or_else(|| {
            // Flat form: {"name": "clear_timeline", "timelineIndex": 0}
            let rest: Map<String, Value> = object
                .iter()
                .filter(|(k, _)| !ENVELOPE_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Value::Object(rest)
        });
    Some(RawCall {
        name: name.to_string(),
        arguments,
    })
}

/// Embedded JSON in priority order: tagged, fenced, then balanced objects.
fn candidates(text: &str) -> Vec<&str> {
    let mut found = delimited(text, "<tool_call>", "</tool_call>");
    found.extend(fenced(text));
    found.extend(balanced_objects(text));
    found
}

fn delimited<'a>(text: &'a str, open: &str, close: &str) -> Vec<&'a str> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(open) {
        let Some(after) = rest.get(start + open.len()..) else {
            break;
        };
        let Some(end) = after.find(close) else {
            break;
        };
        if let Some(inner) = after.get(..end) {
            found.push(inner.trim());
        }
        rest = after.get(end + close.len()..).unwrap_or_default();
    }
    found
}

/// Contents of ``` fences, with any language tag dropped.
fn fenced(text: &str) -> Vec<&str> {
    delimited(text, "```", "```")
        .into_iter()
        .map(|block| {
            let first_line = block.split_once('\n').map_or(block, |(head, _)| head).trim();
            if first_line.chars().all(|c| c.is_ascii_alphanumeric()) && !first_line.is_empty() {
                block.get(first_line.len()..).unwrap_or_default().trim()
            } else {
                block
            }
        })
        .collect()
}

/// Top-level `{...}` spans, matched with awareness of JSON strings.
fn balanced_objects(text: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(span) = text.get(start..=i) {
                        found.push(span);
                    }
                }
            }
            _ => {}
        }
    }
    found
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_name_and_arguments() {
        let call = extract_call(r#"{"name": "clear_timeline", "arguments": {"timelineIndex": 1}}"#).unwrap();
        assert_eq!(call.name, "clear_timeline");
        assert_eq!(call.arguments, json!({"timelineIndex": 1}));
    }

    #[test]
    fn anthropic_content_blocks() {
        let text = json!({
            "content": [
                {"type": "text", "text": "Clearing ball 2."},
                {"type": "tool_use", "id": "toolu_1", "name": "clear_timeline", "input": {"timelineIndex": 2}}
            ],
            "stop_reason": "tool_use"
        })
        .to_string();
        let call = extract_call(&text).unwrap();
        assert_eq!(call.name, "clear_timeline");
        assert_eq!(call.arguments, json!({"timelineIndex": 2}));
    }

    #[test]
    fn openai_choices_keep_string_arguments() {
        let text = json!({
            "choices": [{
                "message": {
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "run_script", "arguments": "{\"code\": \"x = 1\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        })
        .to_string();
        let call = extract_call(&text).unwrap();
        assert_eq!(call.name, "run_script");
        assert_eq!(call.arguments, json!("{\"code\": \"x = 1\"}"));
    }

    #[test]
    fn flat_object_uses_remaining_keys() {
        let call = extract_call(r#"{"name": "delete_segment", "timelineIndex": 0, "segmentIndex": 3}"#).unwrap();
        assert_eq!(call.arguments, json!({"timelineIndex": 0, "segmentIndex": 3}));
    }

    #[test]
    fn tagged_call_in_prose() {
        let text = "Sure.\n<tool_call>\n{\"name\": \"list_segments\", \"arguments\": {\"timelineIndex\": 0}}\n</tool_call>";
        assert_eq!(extract_call(text).unwrap().name, "list_segments");
    }

    #[test]
    fn fenced_block_in_prose() {
        let text = "I'll clear it:\n```json\n{\"name\": \"clear_all_timelines\"}\n```\nDone.";
        let call = extract_call(text).unwrap();
        assert_eq!(call.name, "clear_all_timelines");
        assert_eq!(call.arguments, json!({}));
    }

    #[test]
    fn first_balanced_object_with_a_name_wins() {
        let text = r#"Options {a} then {"name": "clear_timeline", "arguments": {"timelineIndex": 0}} and {"name": "clear_all_timelines"}"#;
        let calls = extract_calls(text).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "clear_timeline");
    }

    #[test]
    fn braces_inside_strings_do_not_break_matching() {
        let text = r#"call: {"name": "run_script", "arguments": {"code": "m = {\"a\": 1}"}}"#;
        let call = extract_call(text).unwrap();
        assert_eq!(call.arguments["code"], "m = {\"a\": 1}");
    }

    #[test]
    fn prose_without_a_call() {
        assert_eq!(extract_call("I think the show looks great."), Err(ExtractError::NotFound));
        assert_eq!(extract_call(""), Err(ExtractError::NotFound));
    }

    #[test]
    fn broken_call_reports_the_parse_position() {
        let err = extract_call(r#"{"name": "clear_timeline", "arguments": {"timelineIndex": 0,}}"#).unwrap_err();
        let ExtractError::Syntax(failure) = err else {
            panic!("expected a syntax error");
        };
        assert_eq!(failure.line, 1);
        assert!(failure.column > 50);
    }
}
