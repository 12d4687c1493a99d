//! In-process outbox store.
//!
//! Useful when producer and consumer share one process, and in tests.
//! Nothing survives a restart.

use crate::outbox::error::OutboxError;
use crate::outbox::key::OutboxKey;
use crate::outbox::store::OutboxStore;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// Outbox buffers held in memory behind a single lock.
#[derive(Debug, Default)]
pub struct MemoryOutbox {
    buffers: Mutex<HashMap<OutboxKey, Vec<Value>>>,
}

impl MemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_buffers<R>(
        &self,
        key: &OutboxKey,
        f: impl FnOnce(&mut HashMap<OutboxKey, Vec<Value>>) -> R,
    ) -> Result<R, OutboxError> {
        let mut buffers = self
            .buffers
            .lock()
            .map_err(|_| OutboxError::Poisoned(key.to_string()))?;
        Ok(f(&mut buffers))
    }
}

impl OutboxStore for MemoryOutbox {
    fn append_all(&self, key: &OutboxKey, entries: Vec<Value>) -> Result<usize, OutboxError> {
        self.with_buffers(key, |buffers| {
            let buffer = buffers.entry(key.clone()).or_default();
            buffer.extend(entries);
            buffer.len()
        })
    }

    fn drain_all(&self, key: &OutboxKey) -> Result<Vec<Value>, OutboxError> {
        self.with_buffers(key, |buffers| buffers.remove(key).unwrap_or_default())
    }

    fn peek(&self, key: &OutboxKey) -> Result<Vec<Value>, OutboxError> {
        self.with_buffers(key, |buffers| buffers.get(key).cloned().unwrap_or_default())
    }

    fn pending(&self, key: &OutboxKey) -> Result<usize, OutboxError> {
        self.with_buffers(key, |buffers| buffers.get(key).map_or(0, Vec::len))
    }
}

/// A store whose every call fails with an I/O error.
#[cfg(test)]
pub(crate) struct UnavailableOutbox;

#[cfg(test)]
impl UnavailableOutbox {
    fn error() -> OutboxError {
        OutboxError::Io {
            path: std::path::PathBuf::from("unavailable"),
            source: std::io::Error::other("storage unavailable"),
        }
    }
}

#[cfg(test)]
impl OutboxStore for UnavailableOutbox {
    fn append_all(&self, _key: &OutboxKey, _entries: Vec<Value>) -> Result<usize, OutboxError> {
        Err(Self::error())
    }

    fn drain_all(&self, _key: &OutboxKey) -> Result<Vec<Value>, OutboxError> {
        Err(Self::error())
    }

    fn peek(&self, _key: &OutboxKey) -> Result<Vec<Value>, OutboxError> {
        Err(Self::error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_are_independent() {
        let store = MemoryOutbox::new();
        let a = OutboxKey::new("a").unwrap();
        let b = OutboxKey::new("b").unwrap();

        store.append(&a, json!(1)).unwrap();
        store.append(&b, json!(2)).unwrap();

        assert_eq!(store.drain_all(&a).unwrap(), vec![json!(1)]);
        assert_eq!(store.pending(&b).unwrap(), 1);
        assert_eq!(store.pending(&a).unwrap(), 0);
    }

    #[test]
    fn test_drain_unknown_key_is_empty() {
        let store = MemoryOutbox::new();
        let key = OutboxKey::new("never-written").unwrap();
        assert!(store.drain_all(&key).unwrap().is_empty());
    }
}
