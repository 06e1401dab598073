//! Response-shape normalization: decides whether a finished turn renders as
//! a table, a bullet list, or plain text.
//!
//! Everything here is a pure function of its input. No branch can fail; every
//! degenerate shape lands on a descriptive text payload.

use crate::application::agent::TurnMessage;
use crate::domain::types::Payload;
use serde_json::Value;

pub const NO_RESULT_FALLBACK: &str = "No result returned.";

/// Classifies the most recent tool result in the transcript, falling back to
/// the final assistant message when no tool ran.
pub fn normalize(messages: &[TurnMessage]) -> Payload {
    for message in messages.iter().rev() {
        if let TurnMessage::ToolResult { content, .. } = message {
            return classify(content);
        }
    }

    for message in messages.iter().rev() {
        if let TurnMessage::Assistant { content } = message {
            let trimmed = content.trim();
            if trimmed.is_empty() {
                return Payload::Text(NO_RESULT_FALLBACK.to_string());
            }
            return Payload::Text(trimmed.to_string());
        }
    }

    Payload::Text(NO_RESULT_FALLBACK.to_string())
}

/// Shape rules, in order: a non-empty sequence of mappings is a table; any
/// other non-empty sequence is a bullet list; everything else is text.
pub fn classify(content: &Value) -> Payload {
    match content {
        Value::Array(items) if items.is_empty() => {
            Payload::Text(NO_RESULT_FALLBACK.to_string())
        }
        Value::Array(items) => {
            if items.iter().all(Value::is_object) {
                let rows = items
                    .iter()
                    .filter_map(Value::as_object)
                    .cloned()
                    .collect();
                Payload::Table(rows)
            } else {
                Payload::Bullet(items.iter().map(bullet_entry).collect())
            }
        }
        Value::Null => Payload::Text(NO_RESULT_FALLBACK.to_string()),
        Value::String(text) => Payload::Text(text.clone()),
        other => Payload::Text(other.to_string()),
    }
}

fn bullet_entry(item: &Value) -> String {
    if let Some(text) = item.get("text").and_then(Value::as_str) {
        return text.to_string();
    }
    match item {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Extracts the display-oriented value from a raw MCP `tools/call` result.
/// Structured content wins over the content-part array; a lone text part
/// collapses to a bare string so short answers normalize as text.
pub fn tool_display_content(result: &Value) -> Value {
    if let Some(structured) = result.get("structuredContent") {
        if let Some(inner) = structured.get("result") {
            return inner.clone();
        }
        return structured.clone();
    }

    if let Some(parts) = result.get("content").and_then(Value::as_array) {
        if parts.len() == 1 {
            if let Some(text) = parts[0].get("text").and_then(Value::as_str) {
                return Value::String(text.to_string());
            }
        }
        return Value::Array(parts.clone());
    }

    result.clone()
}
