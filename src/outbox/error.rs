//! Error types for outbox operations

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while appending to or draining an outbox.
///
/// None of these mean an already committed entry was lost; callers may retry.
#[derive(Error, Debug)]
pub enum OutboxError {
    /// Another writer held the key's lock for the whole retry window
    #[error("Failed to acquire lock on {path} after {retries} retries")]
    LockTimeout { path: PathBuf, retries: u32 },

    /// File I/O error
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An entry could not be encoded
    #[error("Failed to serialize entry for '{key}': {source}")]
    Serialize {
        key: String,
        source: serde_json::Error,
    },

    /// Rejected buffer name
    #[error("Invalid outbox key '{0}'")]
    InvalidKey(String),

    /// The in-memory store's mutex was poisoned by a panicking writer
    #[error("Outbox state poisoned for '{0}'")]
    Poisoned(String),
}

impl OutboxError {
    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OutboxError::LockTimeout { .. } | OutboxError::Io { .. })
    }
}
