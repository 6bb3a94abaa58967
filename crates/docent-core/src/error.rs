use reqwest::StatusCode;
use thiserror::Error;

/// Message shown when the backend cannot be reached at all.
pub const CONNECTION_MESSAGE: &str =
    "Cannot connect to chat server. Please check your internet connection.";

/// Errors surfaced by the chat client.
#[derive(Debug, Clone, Error)]
pub enum ChatError {
    /// The transport could not reach the backend.
    #[error("Failed to connect to {url}: {message}")]
    Connection { url: String, message: String },

    /// The backend answered with a non-success status.
    #[error("Backend error ({status}): {message}")]
    Backend { status: u16, message: String },

    /// The server emitted an explicit error event, or the stream could not be decoded.
    #[error("Stream error: {0}")]
    Stream(String),

    /// Input rejected before any network call.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The HTTP client could not be constructed.
    #[error("HTTP client configuration failed: {0}")]
    Client(String),
}

pub type ChatResult<T> = Result<T, ChatError>;

impl ChatError {
    pub fn connection(url: impl Into<String>, err: &reqwest::Error) -> Self {
        ChatError::Connection {
            url: url.into(),
            message: err.to_string(),
        }
    }

    pub fn backend(status: StatusCode, message: impl Into<String>) -> Self {
        ChatError::Backend {
            status: status.as_u16(),
            message: message.into(),
        }
    }

    /// True for a backend 404, which callers treat as a stale session.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ChatError::Backend { status: 404, .. })
    }

    /// Human-readable text for the presentation layer.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Connection { .. } => CONNECTION_MESSAGE.to_string(),
            ChatError::Backend { message, .. } => message.clone(),
            ChatError::Stream(message) => message.clone(),
            ChatError::Validation(message) => message.clone(),
            ChatError::Client(_) => "Chat client is misconfigured.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        let err = ChatError::backend(StatusCode::NOT_FOUND, "Session not found");
        assert!(err.is_not_found());

        let err = ChatError::backend(StatusCode::SERVICE_UNAVAILABLE, "busy");
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_user_message_hides_transport_details() {
        let err = ChatError::Connection {
            url: "http://localhost:1/api/chat".to_string(),
            message: "tcp connect error".to_string(),
        };
        assert_eq!(err.user_message(), CONNECTION_MESSAGE);
    }
}
