pub mod error;
pub mod in_memory_storage;
pub mod json_file_storage;
pub mod local_storage;

pub use error::{StorageError, StorageResult};
pub use in_memory_storage::InMemoryStorage;
pub use json_file_storage::JsonFileStorage;
pub use local_storage::{BoxFuture, LocalStorage};
