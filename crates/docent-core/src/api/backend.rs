use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::types::{ChatRequest, ChatResponse, HealthStatus};
use crate::error::ChatResult;
use crate::models::{Session, SessionWithMessages};
use crate::stream::EventStream;

/// The backend operations the client depends on.
///
/// `ApiClient` is the HTTP implementation; tests substitute fakes.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// `POST /api/sessions`
    async fn create_session(&self, metadata: BTreeMap<String, String>) -> ChatResult<Session>;

    /// `GET /api/sessions/{id}`. `Ok(None)` when the backend does not know the session.
    async fn get_session(&self, id: &str) -> ChatResult<Option<SessionWithMessages>>;

    /// `POST /api/chat`
    async fn send_message(&self, request: &ChatRequest) -> ChatResult<ChatResponse>;

    /// `POST /api/chat/stream`. Fails before streaming on a non-success status;
    /// afterwards failures arrive through the returned stream.
    async fn stream_message(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> ChatResult<EventStream>;

    /// `GET /api/health`
    async fn health(&self) -> ChatResult<HealthStatus>;
}
