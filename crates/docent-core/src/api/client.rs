use std::collections::BTreeMap;

use async_trait::async_trait;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::backend::ChatBackend;
use super::types::{
    ApiErrorResponse, ChatRequest, ChatResponse, CreateSessionRequest, HealthStatus,
    SessionPayload,
};
use crate::config::ClientConfig;
use crate::error::{ChatError, ChatResult};
use crate::models::{Session, SessionWithMessages};
use crate::stream::{EventStream, decode_stream};

/// Characters escaped when a session id is placed in a path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'?')
    .add(b'<')
    .add(b'>');

/// HTTP client for the chat backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    /// Client for request/response calls, with an overall timeout.
    client: Client,
    /// Client for the streaming endpoint; only connecting is time-limited.
    stream_client: Client,
    /// Base URL without trailing slash (e.g., "http://localhost:8000").
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> ChatResult<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ChatError::Client(e.to_string()))?;

        let stream_client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| ChatError::Client(e.to_string()))?;

        Ok(Self {
            client,
            stream_client,
            base_url: config.api_url(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> ChatResult<Response> {
        request.send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Backend unreachable");
            ChatError::connection(url, &e)
        })
    }

    /// Parse a JSON success body or turn the status into a `Backend` error.
    async fn handle_response<T: DeserializeOwned>(response: Response) -> ChatResult<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(Self::error_from(response).await);
        }

        response.json().await.map_err(|e| {
            ChatError::backend(status, format!("Failed to parse response: {}", e))
        })
    }

    async fn error_from(response: Response) -> ChatError {
        let status = response.status();
        let body: ApiErrorResponse = response.json().await.unwrap_or_default();
        let message = body.message().unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        });
        debug!(status = %status, message = %message, "Backend returned error");
        ChatError::backend(status, message)
    }
}

#[async_trait]
impl ChatBackend for ApiClient {
    async fn create_session(&self, metadata: BTreeMap<String, String>) -> ChatResult<Session> {
        let url = self.url("/api/sessions");
        let request = self
            .client
            .post(&url)
            .json(&CreateSessionRequest { metadata });

        let response = self.send(request, &url).await?;
        Self::handle_response(response).await
    }

    async fn get_session(&self, id: &str) -> ChatResult<Option<SessionWithMessages>> {
        let url = self.url(&format!(
            "/api/sessions/{}",
            utf8_percent_encode(id, PATH_SEGMENT)
        ));
        let response = self.send(self.client.get(&url), &url).await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(session_id = %id, "Session not found on backend");
            return Ok(None);
        }

        let payload: SessionPayload = Self::handle_response(response).await?;
        Ok(Some(payload.into()))
    }

    async fn send_message(&self, request: &ChatRequest) -> ChatResult<ChatResponse> {
        let url = self.url("/api/chat");
        let response = self
            .send(self.client.post(&url).json(request), &url)
            .await?;
        Self::handle_response(response).await
    }

    async fn stream_message(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> ChatResult<EventStream> {
        let url = self.url("/api/chat/stream");
        let builder = self
            .stream_client
            .post(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request);

        let response = self.send(builder, &url).await?;
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        debug!(url = %url, session_id = %request.session_id, "Streaming response started");
        Ok(decode_stream(url, response.bytes_stream(), cancel))
    }

    async fn health(&self) -> ChatResult<HealthStatus> {
        let url = self.url("/api/health");
        let response = self.send(self.client.get(&url), &url).await?;
        Self::handle_response(response).await
    }
}
