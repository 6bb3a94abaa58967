use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::error::{StorageError, StorageResult};
use super::local_storage::{BoxFuture, LocalStorage};

type Entries = BTreeMap<String, String>;

/// JSON file-backed storage
/// Stores all entries as one string map in ~/.config/docent/storage.json
pub struct JsonFileStorage {
    file_path: PathBuf,
}

impl JsonFileStorage {
    /// Create storage at the XDG-compliant default path
    pub fn new() -> StorageResult<Self> {
        let config_dir = dirs::config_dir().ok_or_else(|| StorageError::Path {
            message: "Cannot determine config directory".to_string(),
        })?;

        Ok(Self {
            file_path: config_dir.join("docent").join("storage.json"),
        })
    }

    /// Create storage with a custom path (for testing)
    pub fn with_path(file_path: PathBuf) -> Self {
        Self { file_path }
    }

    pub fn storage_path(&self) -> &Path {
        &self.file_path
    }
}

async fn read_entries(path: &Path) -> StorageResult<Entries> {
    // First run: nothing persisted yet
    if !tokio::fs::try_exists(path).await? {
        return Ok(Entries::new());
    }

    let contents = tokio::fs::read_to_string(path).await?;
    if contents.trim().is_empty() {
        return Ok(Entries::new());
    }
    Ok(serde_json::from_str(&contents)?)
}

async fn write_entries(path: &Path, entries: &Entries) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_string_pretty(entries)?;

    // Write atomically using temp file + rename
    let temp_path = path.with_extension("json.tmp");
    tokio::fs::write(&temp_path, json).await?;
    tokio::fs::rename(&temp_path, path).await?;

    Ok(())
}

impl LocalStorage for JsonFileStorage {
    fn get(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<String>>> {
        let path = self.file_path.clone();
        let key = key.to_string();

        Box::pin(async move {
            let mut entries = read_entries(&path).await?;
            Ok(entries.remove(&key))
        })
    }

    fn set(&self, key: &str, value: String) -> BoxFuture<'static, StorageResult<()>> {
        let path = self.file_path.clone();
        let key = key.to_string();

        Box::pin(async move {
            let mut entries = read_entries(&path).await?;
            entries.insert(key, value);
            write_entries(&path, &entries).await
        })
    }

    fn remove(&self, key: &str) -> BoxFuture<'static, StorageResult<()>> {
        let path = self.file_path.clone();
        let key = key.to_string();

        Box::pin(async move {
            let mut entries = read_entries(&path).await?;
            if entries.remove(&key).is_some() {
                write_entries(&path, &entries).await?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::with_path(dir.path().join("storage.json"));

        assert_eq!(storage.get("ai_book_chat_session").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("storage.json");

        JsonFileStorage::with_path(path.clone())
            .set("ai_book_chat_session", "s1".to_string())
            .await
            .unwrap();

        let reopened = JsonFileStorage::with_path(path.clone());
        assert_eq!(
            reopened.get("ai_book_chat_session").await.unwrap(),
            Some("s1".to_string())
        );
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_remove_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonFileStorage::with_path(dir.path().join("storage.json"));

        storage.set("a", "1".to_string()).await.unwrap();
        storage.set("b", "2".to_string()).await.unwrap();
        storage.remove("a").await.unwrap();

        assert_eq!(storage.get("a").await.unwrap(), None);
        assert_eq!(storage.get("b").await.unwrap(), Some("2".to_string()));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "{not json").unwrap();

        let storage = JsonFileStorage::with_path(path);
        assert!(matches!(
            storage.get("a").await,
            Err(StorageError::Serialization(_))
        ));
    }
}
