use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::storage::{StorageError, StorageResult};

/// Backend used when neither an override nor a build-time URL is present.
pub const DEFAULT_API_URL: &str = "https://habibullahio-ai-native-book-api.hf.space";

/// Backend URL baked in at compile time, if any.
const BUILD_API_URL: Option<&str> = option_env!("DOCENT_API_URL");

/// Which chat endpoint the controller talks to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// `POST /api/chat/stream`, token by token.
    #[default]
    Streaming,
    /// `POST /api/chat`, one response body.
    Blocking,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub debounce_ms: u64,
    pub min_length: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            min_length: 20,
        }
    }
}

impl SelectionConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Client configuration, injected into the session store and API client at construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Explicit backend override. Wins over the build-time URL and the default.
    pub api_url: Option<String>,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub mode: ChatMode,
    pub selection: SelectionConfig,
    /// Originating page path, sent as session metadata.
    pub source_path: String,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            mode: ChatMode::default(),
            selection: SelectionConfig::default(),
            source_path: "/".to_string(),
            user_agent: format!("docent/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Default location: `<config_dir>/docent/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("docent").join("config.json"))
    }

    /// Load configuration from a JSON file. A missing file yields the defaults.
    pub async fn load(path: &Path) -> StorageResult<Self> {
        if !tokio::fs::try_exists(path).await.map_err(StorageError::Io)? {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(StorageError::Io)?;
        let config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    pub fn with_mode(mut self, mode: ChatMode) -> Self {
        self.mode = mode;
        self
    }

    /// The backend base URL after applying override > build-time > default.
    pub fn api_url(&self) -> String {
        resolve_api_url(self.api_url.as_deref(), BUILD_API_URL)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn resolve_api_url(explicit: Option<&str>, build_time: Option<&str>) -> String {
    [explicit, build_time]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|url| !url.is_empty())
        .unwrap_or(DEFAULT_API_URL)
        .trim_end_matches('/')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_override_wins() {
        let url = resolve_api_url(Some("http://localhost:8000/"), Some("https://build.example"));
        assert_eq!(url, "http://localhost:8000");
    }

    #[test]
    fn test_build_time_beats_default() {
        let url = resolve_api_url(None, Some("https://build.example"));
        assert_eq!(url, "https://build.example");

        let url = resolve_api_url(Some("   "), Some("https://build.example"));
        assert_eq!(url, "https://build.example");
    }

    #[test]
    fn test_default_when_nothing_configured() {
        assert_eq!(resolve_api_url(None, None), DEFAULT_API_URL);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"mode": "blocking", "selection": {"min_length": 5}}"#)
                .unwrap();
        assert_eq!(config.mode, ChatMode::Blocking);
        assert_eq!(config.selection.min_length, 5);
        assert_eq!(config.selection.debounce_ms, 300);
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[tokio::test]
    async fn test_load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::load(&dir.path().join("config.json"))
            .await
            .unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"api_url": "http://127.0.0.1:9000"}"#).unwrap();

        let config = ClientConfig::load(&path).await.unwrap();
        assert_eq!(config.api_url(), "http://127.0.0.1:9000");
    }
}
