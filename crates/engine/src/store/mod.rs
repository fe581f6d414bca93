mod file;
mod memory;

pub use file::FileRuleStore;
pub use memory::MemoryRuleStore;

use std::fmt;

#[derive(Debug)]
pub enum StorageError {
    Io(std::io::Error),
    Corrupt(String),
    /// Injected by test stores to exercise rollback paths.
    Unavailable,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Corrupt(msg) => write!(f, "corrupt entry: {msg}"),
            Self::Unavailable => write!(f, "store unavailable"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Durable shadow of the rule set. `put` and `delete` are durable on
/// return; `put` is atomic from a reader's perspective (a concurrent `get`
/// sees the old bytes or the new bytes, never a mix).
pub trait RuleStore: Send + Sync {
    fn put(&self, id: &str, bytes: &[u8]) -> Result<(), StorageError>;
    fn delete(&self, id: &str) -> Result<(), StorageError>;
    fn get(&self, id: &str) -> Result<Option<Vec<u8>>, StorageError>;
    fn list(&self) -> Result<Vec<(String, Vec<u8>)>, StorageError>;
}
