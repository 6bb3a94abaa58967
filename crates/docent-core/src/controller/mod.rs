//! Conversation state machine and its async driver.

mod chat_controller;
mod conversation;
mod view;

pub use chat_controller::{ChatController, SendOutcome};
pub use conversation::{
    ChatEvent, Conversation, ConversationState, SESSION_FAILED_MESSAGE, StreamPhase, Transition,
};
pub use view::ChatView;
