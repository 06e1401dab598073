use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "system" => Some(MessageRole::System),
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            _ => None,
        }
    }
}

/// One message on the model wire. Distinct from [`ChatEntry`], which is the
/// display-side history item carrying an already-normalized payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Display-ready shape of an agent answer. Exactly one variant is active;
/// consumers must match on the tag before reading the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum Payload {
    Text(String),
    Table(Vec<Map<String, Value>>),
    Bullet(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryRole {
    User,
    Assistant,
}

/// One bubble of UI chat history. Appended once per turn, never mutated,
/// dropped with the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub role: EntryRole,
    pub content: Payload,
}

impl ChatEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: EntryRole::User,
            content: Payload::Text(text.into()),
        }
    }

    pub fn assistant(content: Payload) -> Self {
        Self {
            role: EntryRole::Assistant,
            content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_serializes_with_kind_tag() {
        let encoded = serde_json::to_value(Payload::Bullet(vec!["a".into(), "b".into()]))
            .expect("serialize payload");
        assert_eq!(encoded, json!({"kind": "bullet", "data": ["a", "b"]}));
    }

    #[test]
    fn payload_table_round_trips() {
        let row = json!({"answer": 4})
            .as_object()
            .cloned()
            .expect("object literal");
        let payload = Payload::Table(vec![row]);
        let encoded = serde_json::to_string(&payload).expect("serialize");
        let decoded: Payload = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(decoded, payload);
    }

    #[test]
    fn role_strings_map_both_ways() {
        for role in [MessageRole::System, MessageRole::User, MessageRole::Assistant] {
            assert_eq!(MessageRole::from_str(role.as_str()), Some(role));
        }
        assert_eq!(MessageRole::from_str("tool"), None);
    }
}
