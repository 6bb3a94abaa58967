use serde::Deserialize;

use crate::models::MessageId;

fn default_error_message() -> String {
    "An error occurred during streaming. Please try again.".to_string()
}

/// One protocol event of the streaming chat endpoint.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// A fragment of assistant text.
    Token { content: String },
    /// The response is complete and persisted server-side.
    Done {
        #[serde(default)]
        message_id: Option<MessageId>,
        #[serde(default)]
        sources: Vec<String>,
        #[serde(default)]
        latency_ms: Option<u64>,
    },
    /// The server gave up on this response.
    Error {
        #[serde(alias = "error", default = "default_error_message")]
        message: String,
    },
}

impl StreamEvent {
    /// `done` and `error` end the stream; nothing after them is read.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Token { .. })
    }
}
