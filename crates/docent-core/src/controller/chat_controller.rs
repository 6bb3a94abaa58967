use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::conversation::{ChatEvent, Conversation, ConversationState, Transition};
use super::view::ChatView;
use crate::api::{ApiClient, ChatBackend, ChatRequest};
use crate::config::{ChatMode, ClientConfig};
use crate::error::{ChatError, ChatResult};
use crate::models::Message;
use crate::selection::{SelectionContext, SelectionUpdate};
use crate::session_store::SessionStore;
use crate::storage::LocalStorage;
use crate::stream::StreamEvent;

/// How a send attempt ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// The assistant response was appended and the conversation is idle again.
    Completed,
    /// The conversation is in the error state with this message.
    Failed(String),
    /// The controller was shut down mid-send; partial content was dropped.
    Cancelled,
    /// Nothing happened because another send was in progress or had failed.
    Ignored,
}

/// Drives one conversation against the backend and publishes a [`ChatView`]
/// after every change.
pub struct ChatController {
    backend: Arc<dyn ChatBackend>,
    sessions: Arc<SessionStore>,
    mode: ChatMode,
    conversation: Conversation,
    selection: Option<SelectionContext>,
    cancel: CancellationToken,
    view_tx: watch::Sender<ChatView>,
}

impl ChatController {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        sessions: Arc<SessionStore>,
        mode: ChatMode,
    ) -> Self {
        let (view_tx, _) = watch::channel(ChatView::default());
        Self {
            backend,
            sessions,
            mode,
            conversation: Conversation::new(),
            selection: None,
            cancel: CancellationToken::new(),
            view_tx,
        }
    }

    /// Wire up the HTTP client and session store from configuration.
    pub fn from_config(
        config: &ClientConfig,
        storage: Arc<dyn LocalStorage>,
    ) -> ChatResult<Self> {
        let backend: Arc<dyn ChatBackend> = Arc::new(ApiClient::new(config)?);
        let sessions = Arc::new(SessionStore::new(backend.clone(), storage, config));
        Ok(Self::new(backend, sessions, config.mode))
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatView> {
        self.view_tx.subscribe()
    }

    pub fn view(&self) -> ChatView {
        ChatView::snapshot(&self.conversation, self.selection.as_ref())
    }

    pub fn state(&self) -> &ConversationState {
        self.conversation.state()
    }

    pub fn messages(&self) -> &[Message] {
        self.conversation.messages()
    }

    pub fn mode(&self) -> ChatMode {
        self.mode
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn selection(&self) -> Option<&SelectionContext> {
        self.selection.as_ref()
    }

    /// Attach a passage to the next question.
    pub fn set_selection(&mut self, context: SelectionContext) {
        self.selection = Some(context);
        self.publish();
    }

    pub fn clear_selection(&mut self) {
        if self.selection.take().is_some() {
            self.publish();
        }
    }

    /// Follow the watcher directly, for hosts that attach every qualifying
    /// selection without an explicit "ask" click.
    pub fn apply_selection(&mut self, update: SelectionUpdate) {
        match update {
            SelectionUpdate::Selected(context) => self.set_selection(context),
            SelectionUpdate::Cleared => self.clear_selection(),
        }
    }

    /// Token shared with the read loop. Cancelling it from another task has
    /// the same effect as [`ChatController::shutdown`], and also wakes a read
    /// that is waiting on a stalled backend.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop any in-flight read immediately. Events not yet applied are
    /// dropped and later sends are ignored.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        debug!("Chat controller shut down");
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Seed the history from the persisted session. Returns how many
    /// messages were loaded.
    pub async fn load_history(&mut self) -> ChatResult<usize> {
        if !self.conversation.state().is_idle() {
            return Ok(0);
        }

        let Some(found) = self.sessions.resume().await? else {
            return Ok(0);
        };

        let count = found.messages.len();
        if self.conversation.load_history(found.messages) == Transition::Applied {
            self.publish();
            Ok(count)
        } else {
            Ok(0)
        }
    }

    /// Send a question, attaching the pending selection if there is one.
    ///
    /// Empty input is rejected with `ChatError::Validation`. Session and
    /// stream failures do not fail the call; they leave the conversation in
    /// the error state and come back as [`SendOutcome::Failed`].
    pub async fn send(&mut self, text: &str) -> ChatResult<SendOutcome> {
        let selected_text = self.selection.as_ref().map(|s| s.text.clone());
        self.submit(text, selected_text).await
    }

    /// Re-send the last question after a failure.
    pub async fn retry(&mut self) -> ChatResult<SendOutcome> {
        if !matches!(self.conversation.state(), ConversationState::Error(_)) {
            return Ok(SendOutcome::Ignored);
        }

        let last = self.conversation.last_user_message().cloned();
        self.dismiss();

        match last {
            Some(message) => self.submit(&message.content, message.selected_text).await,
            None => Ok(SendOutcome::Ignored),
        }
    }

    /// Leave the error state. Returns false when there was nothing to dismiss.
    pub fn dismiss(&mut self) -> bool {
        matches!(
            self.dispatch(ChatEvent::Dismissed),
            Ok(Transition::Applied)
        )
    }

    async fn submit(
        &mut self,
        text: &str,
        selected_text: Option<String>,
    ) -> ChatResult<SendOutcome> {
        if self.is_cancelled() {
            debug!("Send after shutdown ignored");
            return Ok(SendOutcome::Ignored);
        }

        let requested = ChatEvent::SendRequested {
            text: text.to_string(),
            selected_text: selected_text.clone(),
        };
        if self.dispatch(requested)? == Transition::Ignored {
            return Ok(SendOutcome::Ignored);
        }

        // The context belongs to this attempt, whatever its outcome
        if self.selection.take().is_some() {
            self.publish();
        }

        let session_id = match self.sessions.ensure_session().await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "No session available, aborting send");
                self.dispatch(ChatEvent::SessionFailed(e))?;
                return Ok(self.outcome());
            }
        };

        if self.is_cancelled() {
            self.dispatch(ChatEvent::Cancelled)?;
            return Ok(SendOutcome::Cancelled);
        }
        self.dispatch(ChatEvent::SessionResolved)?;

        let request = ChatRequest::new(session_id, text.trim()).selected_text(selected_text);
        debug!(
            session_id = %request.session_id,
            mode = ?self.mode,
            has_context = request.selected_text.is_some(),
            "Sending chat message"
        );

        match self.mode {
            ChatMode::Streaming => self.stream_response(&request).await,
            ChatMode::Blocking => self.fetch_response(&request).await,
        }
    }

    async fn stream_response(&mut self, request: &ChatRequest) -> ChatResult<SendOutcome> {
        let mut events = match self
            .backend
            .stream_message(request, self.cancel.clone())
            .await
        {
            Ok(events) => events,
            Err(e) => return self.fail(e).await,
        };

        while let Some(item) = events.next().await {
            if self.is_cancelled() {
                break;
            }
            let event = match item {
                Ok(StreamEvent::Token { content }) => ChatEvent::TokenReceived(content),
                Ok(StreamEvent::Done {
                    message_id,
                    sources,
                    latency_ms,
                }) => {
                    debug!(message_id = ?message_id, latency_ms = ?latency_ms, "Response complete");
                    ChatEvent::StreamDone {
                        message_id,
                        sources,
                    }
                }
                Ok(StreamEvent::Error { message }) => {
                    warn!(error = %message, "Backend reported stream error");
                    ChatEvent::StreamFailed(ChatError::Stream(message))
                }
                Err(e) => return self.fail(e).await,
            };
            self.dispatch(event)?;
        }

        if self.conversation.state().is_streaming() {
            if self.is_cancelled() {
                self.dispatch(ChatEvent::Cancelled)?;
                return Ok(SendOutcome::Cancelled);
            }
            self.dispatch(ChatEvent::StreamEnded)?;
        }

        Ok(self.outcome())
    }

    /// Blocking mode: the whole response arrives as one token plus `done`.
    async fn fetch_response(&mut self, request: &ChatRequest) -> ChatResult<SendOutcome> {
        let response = match self.backend.send_message(request).await {
            Ok(response) => response,
            Err(e) => return self.fail(e).await,
        };

        if self.is_cancelled() {
            self.dispatch(ChatEvent::Cancelled)?;
            return Ok(SendOutcome::Cancelled);
        }

        self.dispatch(ChatEvent::TokenReceived(response.response))?;
        self.dispatch(ChatEvent::StreamDone {
            message_id: Some(response.message_id),
            sources: response.sources,
        })?;
        Ok(self.outcome())
    }

    async fn fail(&mut self, error: ChatError) -> ChatResult<SendOutcome> {
        if error.is_not_found() {
            info!("Backend no longer knows the session, starting fresh next time");
            self.sessions.clear().await;
        }
        warn!(error = %error, "Chat request failed");
        self.dispatch(ChatEvent::StreamFailed(error))?;
        Ok(self.outcome())
    }

    fn outcome(&self) -> SendOutcome {
        match self.conversation.state() {
            ConversationState::Idle => SendOutcome::Completed,
            ConversationState::Error(message) => SendOutcome::Failed(message.clone()),
            _ => SendOutcome::Ignored,
        }
    }

    fn dispatch(&mut self, event: ChatEvent) -> ChatResult<Transition> {
        let transition = self.conversation.apply(event)?;
        if transition == Transition::Applied {
            self.publish();
        }
        Ok(transition)
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.view());
    }
}
