use std::future::Future;
use std::pin::Pin;

use super::error::StorageResult;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// String key/value storage that outlives the process, the equivalent of a
/// browser profile's local storage.
pub trait LocalStorage: Send + Sync + 'static {
    /// Read a value, `None` when the key was never written or was removed.
    fn get(&self, key: &str) -> BoxFuture<'static, StorageResult<Option<String>>>;

    /// Write a value, replacing any previous one (last writer wins).
    fn set(&self, key: &str, value: String) -> BoxFuture<'static, StorageResult<()>>;

    /// Remove a value. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> BoxFuture<'static, StorageResult<()>>;
}
