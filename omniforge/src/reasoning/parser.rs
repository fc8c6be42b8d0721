//! ReAct response parsing.
//!
//! The model answers each loop iteration with a single JSON object:
//!
//! ```json
//! {
//!   "thought": "...",
//!   "action": "tool_name",
//!   "action_input": { },
//!   "is_final": false,
//!   "final_answer": "...",
//!   "clarification_question": "..."
//! }
//! ```
//!
//! The parser tolerates markdown code fences and explanatory prose before
//! the object, normalizes `action_input` shapes, and never fails: a
//! malformed response becomes a [`ParsedResponse`] carrying the diagnostic
//! in `thought` so the loop can record it and move on.

use serde_json::Value;

use crate::tool::JsonObject;

/// A parsed model response for one loop iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedResponse {
    /// The model's reasoning for this step.
    pub thought: Option<String>,
    /// Tool to invoke next, when the response is an action.
    pub action: Option<String>,
    /// Arguments for the action, normalized to an object.
    pub action_input: Option<JsonObject>,
    /// Whether the model declared the task finished.
    pub is_final: bool,
    /// The final answer, when `is_final` is set.
    pub final_answer: Option<String>,
    /// Whether the model asked the user a clarifying question.
    pub is_clarification: bool,
    /// The clarifying question, when present.
    pub clarification_question: Option<String>,
}

/// Parser for the ReAct JSON wire format.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReActParser;

impl ReActParser {
    /// Parse a raw model response.
    #[must_use]
    pub fn parse(response: &str) -> ParsedResponse {
        let trimmed = response.trim();
        if trimmed.is_empty() {
            return ParsedResponse::default();
        }

        let Some(json_text) = extract_json_object(trimmed) else {
            return parse_failure(trimmed, "no JSON object found");
        };
        let value: Value = match serde_json::from_str(&json_text) {
            Ok(value) => value,
            Err(error) => return parse_failure(trimmed, &error.to_string()),
        };
        let Value::Object(fields) = value else {
            return parse_failure(trimmed, "response is not a JSON object");
        };

        let mut parsed = ParsedResponse {
            thought: non_empty_string(fields.get("thought")),
            is_final: fields
                .get("is_final")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            final_answer: non_empty_string(fields.get("final_answer")),
            ..ParsedResponse::default()
        };

        if parsed.is_final {
            // Terminal responses ignore any action the model also emitted.
            return parsed;
        }

        if let Some(question) = non_empty_string(fields.get("clarification_question")) {
            parsed.is_clarification = true;
            parsed.clarification_question = Some(question);
            parsed.final_answer = None;
            return parsed;
        }

        parsed.final_answer = None;
        parsed.action = non_empty_string(fields.get("action"));
        parsed.action_input = fields.get("action_input").and_then(normalize_action_input);
        parsed
    }
}

fn parse_failure(response: &str, reason: &str) -> ParsedResponse {
    let preview: String = response.chars().take(200).collect();
    ParsedResponse {
        thought: Some(format!("Parse error: {reason}. Response: {preview}")),
        ..ParsedResponse::default()
    }
}

/// Trimmed string, with empty treated as absent.
fn non_empty_string(value: Option<&Value>) -> Option<String> {
    let text = value?.as_str()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Normalize `action_input` to an object: arrays become `{items: [...]}`,
/// primitives become `{value: ...}`, null is absent.
fn normalize_action_input(value: &Value) -> Option<JsonObject> {
    match value {
        Value::Null => None,
        Value::Object(map) => Some(map.clone()),
        Value::Array(items) => {
            let mut map = JsonObject::new();
            map.insert("items".to_string(), Value::Array(items.clone()));
            Some(map)
        }
        primitive => {
            let mut map = JsonObject::new();
            map.insert("value".to_string(), primitive.clone());
            Some(map)
        }
    }
}

/// Extract the first balanced JSON object from text that may carry code
/// fences or prose around it.
fn extract_json_object(text: &str) -> Option<String> {
    let stripped = strip_code_fence(text);
    let bytes = stripped.as_bytes();
    let start = stripped.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(stripped[start..=start + offset].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Peel a ```json ... ``` (or plain ```) fence off the response, if any.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches(['\r', '\n']);
    rest.strip_suffix("```").map_or(rest, str::trim_end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_standard_action_response() {
        let parsed = ReActParser::parse(
            r#"{
              "thought": "I need to search for information about Python",
              "action": "search",
              "action_input": {"query": "Python programming"},
              "is_final": false
            }"#,
        );
        assert_eq!(
            parsed.thought.as_deref(),
            Some("I need to search for information about Python")
        );
        assert_eq!(parsed.action.as_deref(), Some("search"));
        assert_eq!(
            parsed.action_input,
            Some(
                serde_json::json!({"query": "Python programming"})
                    .as_object()
                    .cloned()
                    .expect("object")
            )
        );
        assert!(!parsed.is_final);
        assert!(parsed.final_answer.is_none());
    }

    #[test]
    fn parses_final_answer() {
        let parsed = ReActParser::parse(
            r#"{"thought": "Done", "final_answer": "Python is a language", "is_final": true}"#,
        );
        assert!(parsed.is_final);
        assert_eq!(parsed.final_answer.as_deref(), Some("Python is a language"));
        assert!(parsed.action.is_none());
        assert!(parsed.action_input.is_none());
    }

    #[test]
    fn final_takes_precedence_over_action() {
        let parsed = ReActParser::parse(
            r#"{
              "thought": "This is the final step",
              "action": "search",
              "action_input": {"query": "ignored"},
              "final_answer": "The actual answer",
              "is_final": true
            }"#,
        );
        assert!(parsed.is_final);
        assert_eq!(parsed.final_answer.as_deref(), Some("The actual answer"));
        assert!(parsed.action.is_none());
        assert!(parsed.action_input.is_none());
    }

    #[test]
    fn array_input_is_wrapped_as_items() {
        let parsed = ReActParser::parse(
            r#"{"action": "batch", "action_input": ["a", "b", "c"], "is_final": false}"#,
        );
        assert_eq!(
            serde_json::Value::Object(parsed.action_input.expect("input")),
            serde_json::json!({"items": ["a", "b", "c"]})
        );
    }

    #[test]
    fn primitive_input_is_wrapped_as_value() {
        let parsed =
            ReActParser::parse(r#"{"action": "t", "action_input": "just a string"}"#);
        assert_eq!(
            serde_json::Value::Object(parsed.action_input.expect("input")),
            serde_json::json!({"value": "just a string"})
        );

        let parsed = ReActParser::parse(r#"{"action": "t", "action_input": 42}"#);
        assert_eq!(
            serde_json::Value::Object(parsed.action_input.expect("input")),
            serde_json::json!({"value": 42})
        );
    }

    #[test]
    fn null_input_is_absent() {
        let parsed = ReActParser::parse(r#"{"action": "t", "action_input": null}"#);
        assert_eq!(parsed.action.as_deref(), Some("t"));
        assert!(parsed.action_input.is_none());
    }

    #[test]
    fn malformed_json_stores_diagnostic_in_thought() {
        let parsed = ReActParser::parse("{invalid json here}");
        let thought = parsed.thought.expect("diagnostic");
        assert!(thought.contains("Parse error"));
        assert!(parsed.action.is_none());
        assert!(!parsed.is_final);
    }

    #[test]
    fn empty_and_whitespace_responses_are_empty() {
        assert_eq!(ReActParser::parse(""), ParsedResponse::default());
        assert_eq!(ReActParser::parse("   \n\n  \t  "), ParsedResponse::default());
    }

    #[test]
    fn markdown_code_fence_is_stripped() {
        let parsed = ReActParser::parse(
            "```json\n{\"thought\": \"fenced\", \"action\": \"search\", \"action_input\": {\"query\": \"x\"}}\n```",
        );
        assert_eq!(parsed.thought.as_deref(), Some("fenced"));
        assert_eq!(parsed.action.as_deref(), Some("search"));
    }

    #[test]
    fn prose_before_json_is_tolerated() {
        let parsed = ReActParser::parse(
            "Let me call the calculator tool to solve this.\n\n{\"thought\": \"calc\", \"action\": \"calculator\", \"action_input\": {\"expression\": \"5 + 3\"}}",
        );
        assert_eq!(parsed.action.as_deref(), Some("calculator"));
        assert_eq!(parsed.thought.as_deref(), Some("calc"));
    }

    #[test]
    fn nested_objects_survive_extraction() {
        let parsed = ReActParser::parse(
            r#"{"thought": "t", "action": "a", "action_input": {"outer": {"inner": "value"}, "list": [1, 2, 3]}}"#,
        );
        assert_eq!(
            serde_json::Value::Object(parsed.action_input.expect("input")),
            serde_json::json!({"outer": {"inner": "value"}, "list": [1, 2, 3]})
        );
    }

    #[test]
    fn braces_inside_strings_do_not_break_extraction() {
        let parsed = ReActParser::parse(
            r#"{"thought": "use {curly} braces", "action": "t", "action_input": {"text": "a } b"}}"#,
        );
        assert_eq!(parsed.thought.as_deref(), Some("use {curly} braces"));
        assert!(parsed.action_input.is_some());
    }

    #[test]
    fn whitespace_is_trimmed_from_fields() {
        let parsed = ReActParser::parse(
            r#"{"thought": "   padded   ", "action": "  search  ", "action_input": {}}"#,
        );
        assert_eq!(parsed.thought.as_deref(), Some("padded"));
        assert_eq!(parsed.action.as_deref(), Some("search"));
        assert!(parsed.action_input.expect("input").is_empty());
    }

    #[test]
    fn empty_strings_are_treated_as_absent() {
        let parsed = ReActParser::parse(r#"{"thought": "", "action": "search"}"#);
        assert!(parsed.thought.is_none());

        let parsed =
            ReActParser::parse(r#"{"thought": "done", "final_answer": "", "is_final": true}"#);
        assert!(parsed.is_final);
        assert!(parsed.final_answer.is_none());
    }

    #[test]
    fn is_final_defaults_to_false() {
        let parsed = ReActParser::parse(r#"{"thought": "x", "action": "search"}"#);
        assert!(!parsed.is_final);
    }

    #[test]
    fn clarification_question_sets_flag() {
        let parsed = ReActParser::parse(
            r#"{"thought": "need the directory", "clarification_question": "Which directory should I search in?"}"#,
        );
        assert!(parsed.is_clarification);
        assert_eq!(
            parsed.clarification_question.as_deref(),
            Some("Which directory should I search in?")
        );
        assert!(!parsed.is_final);
        assert!(parsed.action.is_none());
    }

    #[test]
    fn action_response_is_not_clarification() {
        let parsed = ReActParser::parse(
            r#"{"thought": "run it", "action": "bash", "action_input": {"command": "ls"}}"#,
        );
        assert!(!parsed.is_clarification);
        assert!(parsed.clarification_question.is_none());
    }

    #[test]
    fn minified_json_parses() {
        let parsed = ReActParser::parse(
            r#"{"thought":"Minified","action":"search","action_input":{"query":"test"},"is_final":false}"#,
        );
        assert_eq!(parsed.thought.as_deref(), Some("Minified"));
        assert_eq!(parsed.action.as_deref(), Some("search"));
    }

    #[test]
    fn round_trips_well_formed_actions() {
        let original = serde_json::json!({
            "thought": "check the docs",
            "action": "read",
            "action_input": {"file_path": "/docs/a.md"},
            "is_final": false
        });
        let parsed = ReActParser::parse(&format!(
            "Some leading prose.\n{}",
            serde_json::to_string_pretty(&original).expect("serialize")
        ));
        assert_eq!(parsed.thought.as_deref(), Some("check the docs"));
        assert_eq!(parsed.action.as_deref(), Some("read"));
        assert_eq!(
            serde_json::Value::Object(parsed.action_input.expect("input")),
            original["action_input"]
        );
    }
}
