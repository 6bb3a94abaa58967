use super::conversation::{Conversation, ConversationState, StreamPhase};
use crate::models::Message;
use crate::selection::SelectionContext;

/// What a presentation layer needs to render the widget.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatView {
    pub state: ConversationState,
    pub messages: Vec<Message>,
    /// Assistant text received so far for the response in flight.
    pub streaming_text: String,
    pub error: Option<String>,
    /// Passage that will be attached to the next question.
    pub selection: Option<SelectionContext>,
}

impl Default for ChatView {
    fn default() -> Self {
        Self {
            state: ConversationState::Idle,
            messages: Vec::new(),
            streaming_text: String::new(),
            error: None,
            selection: None,
        }
    }
}

impl ChatView {
    pub(crate) fn snapshot(
        conversation: &Conversation,
        selection: Option<&SelectionContext>,
    ) -> Self {
        let error = match conversation.state() {
            ConversationState::Error(message) => Some(message.clone()),
            _ => None,
        };

        Self {
            state: conversation.state().clone(),
            messages: conversation.messages().to_vec(),
            streaming_text: conversation.streaming_text().to_string(),
            error,
            selection: selection.cloned(),
        }
    }

    /// Show the "typing" indicator: streaming but nothing received yet.
    pub fn is_waiting(&self) -> bool {
        matches!(
            self.state,
            ConversationState::AwaitingSession
                | ConversationState::Streaming(StreamPhase::WaitingFirstToken)
        )
    }

    /// The input box accepts a new question.
    pub fn can_send(&self) -> bool {
        self.state.is_idle()
    }
}
