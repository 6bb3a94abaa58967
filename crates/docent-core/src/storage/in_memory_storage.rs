use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::error::StorageResult;
use super::local_storage::{BoxFuture, LocalStorage};

/// In-memory storage
/// Useful for testing and for hosts without a writable profile
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-populated with one entry.
    pub fn with_entry(key: &str, value: &str) -> Self {
        let storage = Self::new();
        storage
            .entries
            .lock()
            .insert(key.to_string(), value.to_string());
        storage
    }

    /// Synchronous peek, for assertions.
    pub fn snapshot(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }
}

impl LocalStorage for InMemoryStorage {
    fn get(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<String>>> {
        let value = self.entries.lock().get(key).cloned();
        Box::pin(async move { Ok(value) })
    }

    fn set(&self, key: &str, value: String) -> BoxFuture<'static, StorageResult<()>> {
        let entries = self.entries.clone();
        let key = key.to_string();

        Box::pin(async move {
            entries.lock().insert(key, value);
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> BoxFuture<'static, StorageResult<()>> {
        let entries = self.entries.clone();
        let key = key.to_string();

        Box::pin(async move {
            entries.lock().remove(&key);
            Ok(())
        })
    }
}
