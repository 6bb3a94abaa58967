//! Typed access to the chat backend's HTTP contract.

mod backend;
mod client;
mod types;

pub use backend::ChatBackend;
pub use client::ApiClient;
pub use types::{ApiErrorResponse, ChatRequest, ChatResponse, CreateSessionRequest, HealthStatus};
