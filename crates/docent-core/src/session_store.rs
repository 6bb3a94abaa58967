use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::ChatBackend;
use crate::config::ClientConfig;
use crate::error::ChatResult;
use crate::models::SessionWithMessages;
use crate::storage::LocalStorage;

/// Local storage key holding the session id.
pub const SESSION_STORAGE_KEY: &str = "ai_book_chat_session";

/// Owns the session id: creates it against the backend, persists it, and
/// restores it on the next start.
pub struct SessionStore {
    backend: Arc<dyn ChatBackend>,
    storage: Arc<dyn LocalStorage>,
    metadata: BTreeMap<String, String>,
    /// Held across the creation request so concurrent callers share one POST.
    current: Mutex<Option<String>>,
}

impl SessionStore {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        storage: Arc<dyn LocalStorage>,
        config: &ClientConfig,
    ) -> Self {
        let metadata = BTreeMap::from([
            ("source".to_string(), config.source_path.clone()),
            ("user_agent".to_string(), config.user_agent.clone()),
        ]);

        Self {
            backend,
            storage,
            metadata,
            current: Mutex::new(None),
        }
    }

    /// Return the session id, creating a session on the backend if neither
    /// memory nor storage has one.
    pub async fn ensure_session(&self) -> ChatResult<String> {
        let mut current = self.current.lock().await;
        if let Some(id) = current.as_ref() {
            return Ok(id.clone());
        }

        if let Some(id) = self.load_persisted().await {
            debug!(session_id = %id, "Restored session from storage");
            *current = Some(id.clone());
            return Ok(id);
        }

        let session = self.backend.create_session(self.metadata.clone()).await?;
        info!(session_id = %session.id, "Created chat session");

        if let Err(e) = self
            .storage
            .set(SESSION_STORAGE_KEY, session.id.clone())
            .await
        {
            warn!(error = ?e, session_id = %session.id, "Failed to persist session id");
        }

        *current = Some(session.id.clone());
        Ok(session.id)
    }

    /// Fetch a session and its history. `None` when the backend returns 404.
    pub async fn get_session(&self, id: &str) -> ChatResult<Option<SessionWithMessages>> {
        self.backend.get_session(id).await
    }

    /// Reload the persisted session's history. A session the backend no
    /// longer knows is forgotten so the next send starts a new one.
    pub async fn resume(&self) -> ChatResult<Option<SessionWithMessages>> {
        let Some(id) = self.current_or_persisted().await else {
            return Ok(None);
        };

        match self.backend.get_session(&id).await? {
            Some(found) => {
                debug!(session_id = %id, messages = found.messages.len(), "Resumed session");
                Ok(Some(found))
            }
            None => {
                info!(session_id = %id, "Stored session no longer exists, discarding");
                self.clear().await;
                Ok(None)
            }
        }
    }

    /// Forget the session id, in memory and in storage.
    pub async fn clear(&self) {
        let mut current = self.current.lock().await;
        *current = None;

        if let Err(e) = self.storage.remove(SESSION_STORAGE_KEY).await {
            warn!(error = ?e, "Failed to remove persisted session id");
        }
        debug!("Session cleared");
    }

    /// The id held in memory, without touching storage or the backend.
    pub async fn current(&self) -> Option<String> {
        self.current.lock().await.clone()
    }

    async fn current_or_persisted(&self) -> Option<String> {
        let mut current = self.current.lock().await;
        if current.is_none() {
            *current = self.load_persisted().await;
        }
        current.clone()
    }

    async fn load_persisted(&self) -> Option<String> {
        match self.storage.get(SESSION_STORAGE_KEY).await {
            Ok(value) => value.filter(|id| !id.trim().is_empty()),
            Err(e) => {
                warn!(error = ?e, "Failed to read persisted session id");
                None
            }
        }
    }
}
