//! Client core for an embeddable documentation chat assistant: passage
//! selection, session lifecycle, streamed response decoding and the
//! conversation state machine.

pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod models;
pub mod selection;
pub mod session_store;
pub mod storage;
pub mod stream;

pub use api::{ApiClient, ChatBackend};
pub use config::{ChatMode, ClientConfig};
pub use controller::{ChatController, ChatView, ConversationState, SendOutcome};
pub use error::{ChatError, ChatResult};
pub use models::{Message, MessageId, Role, Session};
pub use selection::{SelectionContext, SelectionUpdate, SelectionWatcher};
pub use session_store::SessionStore;
pub use storage::{InMemoryStorage, JsonFileStorage, LocalStorage};
