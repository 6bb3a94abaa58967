use tracing::debug;

use crate::error::{ChatError, ChatResult};
use crate::models::{Message, MessageId};

/// Shown when no session could be obtained for a send.
pub const SESSION_FAILED_MESSAGE: &str = "Could not connect to chat service. Please try again.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamPhase {
    WaitingFirstToken,
    Receiving,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConversationState {
    Idle,
    AwaitingSession,
    Streaming(StreamPhase),
    /// Human-readable reason, shown until dismissed or retried.
    Error(String),
}

impl ConversationState {
    pub fn is_idle(&self) -> bool {
        matches!(self, ConversationState::Idle)
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, ConversationState::Streaming(_))
    }
}

/// Everything that can happen to a conversation.
#[derive(Debug)]
pub enum ChatEvent {
    SendRequested {
        text: String,
        selected_text: Option<String>,
    },
    SessionResolved,
    SessionFailed(ChatError),
    TokenReceived(String),
    StreamDone {
        message_id: Option<MessageId>,
        sources: Vec<String>,
    },
    /// The body closed without `done` or `error`.
    StreamEnded,
    StreamFailed(ChatError),
    /// Teardown while a send was in flight.
    Cancelled,
    Dismissed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// The event moved the conversation.
    Applied,
    /// The event does not apply in the current state; nothing changed.
    Ignored,
}

/// History plus send state. Every change goes through [`Conversation::apply`].
#[derive(Clone, Debug)]
pub struct Conversation {
    state: ConversationState,
    messages: Vec<Message>,
    streaming_text: String,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            state: ConversationState::Idle,
            messages: Vec::new(),
            streaming_text: String::new(),
        }
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Tokens received for the response in flight (or for the one that just failed).
    pub fn streaming_text(&self) -> &str {
        &self.streaming_text
    }

    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_user())
    }

    /// Seed an empty conversation with history loaded from the backend.
    pub fn load_history(&mut self, messages: Vec<Message>) -> Transition {
        if !self.state.is_idle() || !self.messages.is_empty() {
            return Transition::Ignored;
        }
        self.messages = messages;
        Transition::Applied
    }

    /// Apply one event. The only error is rejecting empty input.
    pub fn apply(&mut self, event: ChatEvent) -> ChatResult<Transition> {
        use ConversationState::*;

        let next = match (&self.state, event) {
            (Idle, ChatEvent::SendRequested { text, selected_text }) => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(ChatError::Validation("Message cannot be empty".to_string()));
                }
                self.streaming_text.clear();
                self.messages.push(Message::user(text, selected_text));
                AwaitingSession
            }

            (AwaitingSession, ChatEvent::SessionResolved) => {
                Streaming(StreamPhase::WaitingFirstToken)
            }
            (AwaitingSession, ChatEvent::SessionFailed(e)) => {
                debug!(error = %e, "Session unavailable");
                Error(SESSION_FAILED_MESSAGE.to_string())
            }

            (Streaming(_), ChatEvent::TokenReceived(content)) => {
                self.streaming_text.push_str(&content);
                Streaming(StreamPhase::Receiving)
            }
            (Streaming(_), ChatEvent::StreamDone { message_id, sources }) => {
                let content = std::mem::take(&mut self.streaming_text);
                let id = message_id.unwrap_or_else(MessageId::fallback);
                self.messages.push(Message::assistant(id, content, sources));
                Idle
            }
            (Streaming(_), ChatEvent::StreamEnded) => {
                let content = std::mem::take(&mut self.streaming_text);
                if !content.is_empty() {
                    debug!(bytes = content.len(), "Stream closed without done, keeping content");
                    self.messages
                        .push(Message::assistant(MessageId::fallback(), content, Vec::new()));
                }
                Idle
            }
            (Streaming(_), ChatEvent::StreamFailed(e)) => Error(e.user_message()),

            (AwaitingSession | Streaming(_), ChatEvent::Cancelled) => {
                self.streaming_text.clear();
                Idle
            }

            (Error(_), ChatEvent::Dismissed) => {
                self.streaming_text.clear();
                Idle
            }

            (state, event) => {
                debug!(state = ?state, event = ?event, "Ignoring event");
                return Ok(Transition::Ignored);
            }
        };

        debug!(from = ?self.state, to = ?next, "Conversation transition");
        self.state = next;
        Ok(Transition::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn send(conversation: &mut Conversation, text: &str) -> ChatResult<Transition> {
        conversation.apply(ChatEvent::SendRequested {
            text: text.to_string(),
            selected_text: None,
        })
    }

    fn streaming(text: &str) -> Conversation {
        let mut conversation = Conversation::new();
        send(&mut conversation, text).unwrap();
        conversation.apply(ChatEvent::SessionResolved).unwrap();
        conversation
    }

    fn token(conversation: &mut Conversation, content: &str) {
        conversation
            .apply(ChatEvent::TokenReceived(content.to_string()))
            .unwrap();
    }

    #[test]
    fn test_physical_ai_exchange() {
        let mut conversation = streaming("What is Physical AI?");
        assert_eq!(
            conversation.state(),
            &ConversationState::Streaming(StreamPhase::WaitingFirstToken)
        );

        token(&mut conversation, "Physical");
        assert_eq!(
            conversation.state(),
            &ConversationState::Streaming(StreamPhase::Receiving)
        );
        token(&mut conversation, " AI");
        assert_eq!(conversation.streaming_text(), "Physical AI");

        conversation
            .apply(ChatEvent::StreamDone {
                message_id: Some(MessageId::Int(42)),
                sources: vec![],
            })
            .unwrap();

        assert_eq!(conversation.state(), &ConversationState::Idle);
        assert_eq!(conversation.streaming_text(), "");
        let last = conversation.messages().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, "Physical AI");
        assert_eq!(last.id, MessageId::Int(42));
    }

    #[test]
    fn test_whitespace_input_is_rejected() {
        let mut conversation = Conversation::new();
        let result = send(&mut conversation, "  \n\t ");
        assert!(matches!(result, Err(ChatError::Validation(_))));
        assert_eq!(conversation.state(), &ConversationState::Idle);
        assert!(conversation.messages().is_empty());
    }

    #[test]
    fn test_user_message_is_trimmed_and_carries_selection() {
        let mut conversation = Conversation::new();
        conversation
            .apply(ChatEvent::SendRequested {
                text: "  Explain this  ".to_string(),
                selected_text: Some("Bipedal locomotion requires balance control".to_string()),
            })
            .unwrap();

        let user = &conversation.messages()[0];
        assert_eq!(user.content, "Explain this");
        assert_eq!(
            user.selected_text.as_deref(),
            Some("Bipedal locomotion requires balance control")
        );
        assert_eq!(conversation.state(), &ConversationState::AwaitingSession);
    }

    #[test]
    fn test_send_while_busy_is_ignored() {
        let mut conversation = streaming("first");
        assert_eq!(send(&mut conversation, "second").unwrap(), Transition::Ignored);
        assert_eq!(conversation.messages().len(), 1);
    }

    #[test]
    fn test_fallback_commits_partial_content() {
        let mut conversation = streaming("Tell me about ROS 2");
        token(&mut conversation, "ROS 2 is ");
        token(&mut conversation, "a middleware");
        conversation.apply(ChatEvent::StreamEnded).unwrap();

        assert_eq!(conversation.state(), &ConversationState::Idle);
        let last = conversation.messages().last().unwrap();
        assert_eq!(last.content, "ROS 2 is a middleware");
        assert!(last.id.to_string().starts_with("stream-"));
    }

    #[test]
    fn test_fallback_without_content_appends_nothing() {
        let mut conversation = streaming("hello");
        conversation.apply(ChatEvent::StreamEnded).unwrap();
        assert_eq!(conversation.state(), &ConversationState::Idle);
        assert_eq!(conversation.messages().len(), 1);
    }

    #[test]
    fn test_done_before_any_token_commits_empty_message() {
        let mut conversation = streaming("hello");
        conversation
            .apply(ChatEvent::StreamDone {
                message_id: None,
                sources: vec![],
            })
            .unwrap();
        let last = conversation.messages().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, "");
    }

    #[test]
    fn test_stream_error_discards_partial_until_dismissed() {
        let mut conversation = streaming("hello");
        token(&mut conversation, "partial");
        conversation
            .apply(ChatEvent::StreamFailed(ChatError::Stream(
                "Model overloaded".to_string(),
            )))
            .unwrap();

        assert_eq!(
            conversation.state(),
            &ConversationState::Error("Model overloaded".to_string())
        );
        assert_eq!(conversation.messages().len(), 1);
        assert_eq!(conversation.streaming_text(), "partial");

        // Late tokens after the failure do nothing
        let late = conversation
            .apply(ChatEvent::TokenReceived("more".to_string()))
            .unwrap();
        assert_eq!(late, Transition::Ignored);

        conversation.apply(ChatEvent::Dismissed).unwrap();
        assert_eq!(conversation.state(), &ConversationState::Idle);
        assert_eq!(conversation.streaming_text(), "");
    }

    #[test]
    fn test_session_failure_message() {
        let mut conversation = Conversation::new();
        send(&mut conversation, "hello").unwrap();
        conversation
            .apply(ChatEvent::SessionFailed(ChatError::Connection {
                url: "http://localhost/api/sessions".to_string(),
                message: "refused".to_string(),
            }))
            .unwrap();
        assert_eq!(
            conversation.state(),
            &ConversationState::Error(SESSION_FAILED_MESSAGE.to_string())
        );
        // Optimistic user message stays in history
        assert_eq!(conversation.messages().len(), 1);
    }

    #[test]
    fn test_cancel_drops_partial_content() {
        let mut conversation = streaming("hello");
        token(&mut conversation, "partial");
        conversation.apply(ChatEvent::Cancelled).unwrap();
        assert_eq!(conversation.state(), &ConversationState::Idle);
        assert_eq!(conversation.messages().len(), 1);
        assert_eq!(conversation.streaming_text(), "");
    }

    #[test]
    fn test_history_only_seeds_empty_conversation() {
        let mut conversation = Conversation::new();
        let history = vec![
            Message::user("What is ROS 2?", None),
            Message::assistant(MessageId::from("m2"), "A middleware", vec![]),
        ];
        assert_eq!(conversation.load_history(history.clone()), Transition::Applied);
        assert_eq!(conversation.messages().len(), 2);
        assert_eq!(conversation.load_history(history), Transition::Ignored);
    }
}
