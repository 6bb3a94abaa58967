use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{Message, MessageId, Session, SessionWithMessages};

#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionRequest {
    pub metadata: BTreeMap<String, String>,
}

/// Body of both `POST /api/chat` and `POST /api/chat/stream`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_text: Option<String>,
}

impl ChatRequest {
    pub fn new(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            message: message.into(),
            selected_text: None,
        }
    }

    pub fn selected_text(mut self, selected_text: Option<String>) -> Self {
        self.selected_text = selected_text;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatResponse {
    pub message_id: MessageId,
    pub response: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub dependencies: serde_json::Map<String, serde_json::Value>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self.status.as_str(), "healthy" | "ok")
    }
}

/// Error body. FastAPI sends `{detail}`, the API's own handlers `{error, detail?, retry}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
    #[serde(default)]
    pub retry: bool,
}

impl ApiErrorResponse {
    /// `detail` when it is a string, else `error`.
    pub fn message(&self) -> Option<String> {
        match &self.detail {
            Some(serde_json::Value::String(detail)) => Some(detail.clone()),
            _ => self.error.clone(),
        }
    }
}

/// `GET /api/sessions/{id}` has been served both nested and flat.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum SessionPayload {
    Nested {
        session: Session,
        #[serde(default)]
        messages: Vec<Message>,
    },
    Flat {
        #[serde(flatten)]
        session: Session,
        #[serde(default)]
        messages: Vec<Message>,
    },
}

impl From<SessionPayload> for SessionWithMessages {
    fn from(payload: SessionPayload) -> Self {
        let (session, messages) = match payload {
            SessionPayload::Nested { session, messages } => (session, messages),
            SessionPayload::Flat { session, messages } => (session, messages),
        };
        SessionWithMessages { session, messages }
    }
}
