use std::fmt;

use serde::{Deserialize, Serialize};

/// Message identifier. The backend hands out UUID strings or integers;
/// the client mints `local-…` / `stream-…` strings for messages it creates.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Int(i64),
    Text(String),
}

impl MessageId {
    /// Id for an optimistically appended user message.
    pub fn local() -> Self {
        MessageId::Text(format!("local-{}", uuid::Uuid::new_v4()))
    }

    /// Id for an assistant message finalized without a server-provided id.
    pub fn fallback() -> Self {
        MessageId::Text(format!("stream-{}", uuid::Uuid::new_v4()))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Int(id) => write!(f, "{}", id),
            MessageId::Text(id) => f.write_str(id),
        }
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        MessageId::Int(id)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        MessageId::Text(id.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Only ever seen in history loaded from the backend.
    System,
}

/// One entry of the append-only conversation history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_text: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl Message {
    pub fn user(content: impl Into<String>, selected_text: Option<String>) -> Self {
        Self {
            id: MessageId::local(),
            role: Role::User,
            content: content.into(),
            selected_text,
            sources: Vec::new(),
        }
    }

    pub fn assistant(id: MessageId, content: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: content.into(),
            selected_text: None,
            sources,
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_accepts_int_and_string() {
        let id: MessageId = serde_json::from_str("42").unwrap();
        assert_eq!(id, MessageId::Int(42));

        let id: MessageId = serde_json::from_str("\"7f0c\"").unwrap();
        assert_eq!(id, MessageId::Text("7f0c".to_string()));
        assert_eq!(id.to_string(), "7f0c");
    }

    #[test]
    fn test_history_entry_ignores_server_fields() {
        let json = r#"{
            "id": "b3c1",
            "session_id": "s1",
            "role": "user",
            "content": "What is ROS 2?",
            "selected_text": "ROS 2 is a middleware",
            "metadata": {},
            "created_at": "2025-01-01T00:00:00Z"
        }"#;

        let message: Message = serde_json::from_str(json).unwrap();
        assert!(message.is_user());
        assert_eq!(message.selected_text.as_deref(), Some("ROS 2 is a middleware"));
        assert!(message.sources.is_empty());
    }

    #[test]
    fn test_client_ids_are_prefixed() {
        assert!(MessageId::local().to_string().starts_with("local-"));
        assert!(MessageId::fallback().to_string().starts_with("stream-"));
        assert_ne!(MessageId::local(), MessageId::local());
    }
}
