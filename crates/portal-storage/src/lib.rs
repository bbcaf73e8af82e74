//! Persistent key-value storage for the Member Portal session layer.
//!
//! The store is synchronous and string-keyed. Two backends ship here:
//! - [`MemoryStore`]: process-local, used in tests and for ephemeral sessions
//! - [`FileStore`]: a JSON object on disk, rewritten atomically on every change

mod file;
mod keys;
mod memory;
mod traits;

pub use file::FileStore;
pub use keys::StorageKeys;
pub use memory::MemoryStore;
pub use traits::KeyValueStore;

use std::path::Path;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Open the file-backed store at `path`, boxed for use behind the trait.
pub fn create_file_store(path: &Path) -> StorageResult<Box<dyn KeyValueStore>> {
    Ok(Box::new(FileStore::open(path)?))
}
