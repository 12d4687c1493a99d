//! The outbox store abstraction and its typed handle.

use crate::outbox::error::OutboxError;
use crate::outbox::key::OutboxKey;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// Durable mapping from a buffer key to an ordered sequence of entries.
///
/// Implementations must make `append_all` and `drain_all` mutually exclusive
/// per key: a drain returns every entry whose append committed before it and
/// leaves the buffer empty, and an append that returns `Ok` is visible to
/// every later read until drained. A failed call leaves the buffer as it was.
///
/// Unreadable persisted state is not an error: it reads as an empty buffer
/// and is logged.
pub trait OutboxStore: Send + Sync {
    /// Append `entries`, in order, as one commit. Returns the number of
    /// entries pending under `key` after the commit.
    fn append_all(&self, key: &OutboxKey, entries: Vec<Value>) -> Result<usize, OutboxError>;

    /// Return everything pending under `key` and empty the buffer.
    fn drain_all(&self, key: &OutboxKey) -> Result<Vec<Value>, OutboxError>;

    /// Return everything pending under `key` without removing it.
    fn peek(&self, key: &OutboxKey) -> Result<Vec<Value>, OutboxError>;

    /// Append a single entry.
    fn append(&self, key: &OutboxKey, entry: Value) -> Result<usize, OutboxError> {
        self.append_all(key, vec![entry])
    }

    /// Number of entries pending under `key`.
    fn pending(&self, key: &OutboxKey) -> Result<usize, OutboxError> {
        Ok(self.peek(key)?.len())
    }
}

impl<S: OutboxStore + ?Sized> OutboxStore for Arc<S> {
    fn append_all(&self, key: &OutboxKey, entries: Vec<Value>) -> Result<usize, OutboxError> {
        (**self).append_all(key, entries)
    }

    fn drain_all(&self, key: &OutboxKey) -> Result<Vec<Value>, OutboxError> {
        (**self).drain_all(key)
    }

    fn peek(&self, key: &OutboxKey) -> Result<Vec<Value>, OutboxError> {
        (**self).peek(key)
    }
}

/// A buffer key bound to its entry type.
pub struct Outbox<'s, T> {
    store: &'s dyn OutboxStore,
    key: OutboxKey,
    _entry: PhantomData<fn() -> T>,
}

impl<'s, T> Outbox<'s, T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(store: &'s dyn OutboxStore, key: OutboxKey) -> Self {
        Self {
            store,
            key,
            _entry: PhantomData,
        }
    }

    pub fn key(&self) -> &OutboxKey {
        &self.key
    }

    /// Append one entry.
    pub fn append(&self, entry: &T) -> Result<usize, OutboxError> {
        let value = self.encode(entry)?;
        self.store.append(&self.key, value)
    }

    /// Append a batch as one commit; nothing is stored if any entry fails to encode.
    pub fn append_batch(&self, entries: &[T]) -> Result<usize, OutboxError> {
        let values = entries
            .iter()
            .map(|e| self.encode(e))
            .collect::<Result<Vec<_>, _>>()?;
        self.store.append_all(&self.key, values)
    }

    /// Drain and decode everything pending.
    ///
    /// Entries that no longer decode as `T` are dropped with a warning; they
    /// are removed from the store with the rest of the drain.
    pub fn drain_all(&self) -> Result<Vec<T>, OutboxError> {
        let raw = self.store.drain_all(&self.key)?;
        Ok(self.decode_all(raw))
    }

    /// Decode everything pending without draining.
    pub fn peek(&self) -> Result<Vec<T>, OutboxError> {
        let raw = self.store.peek(&self.key)?;
        Ok(self.decode_all(raw))
    }

    pub fn pending(&self) -> Result<usize, OutboxError> {
        self.store.pending(&self.key)
    }

    fn encode(&self, entry: &T) -> Result<Value, OutboxError> {
        serde_json::to_value(entry).map_err(|e| OutboxError::Serialize {
            key: self.key.to_string(),
            source: e,
        })
    }

    fn decode_all(&self, raw: Vec<Value>) -> Vec<T> {
        raw.into_iter()
            .enumerate()
            .filter_map(|(index, value)| match serde_json::from_value(value) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(
                        key = %self.key,
                        index,
                        error = %e,
                        "Dropping outbox entry with unexpected shape"
                    );
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::memory::MemoryOutbox;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Tick {
        n: u32,
    }

    #[test]
    fn test_typed_append_and_drain() {
        let store = MemoryOutbox::new();
        let outbox: Outbox<Tick> = Outbox::new(&store, OutboxKey::new("ticks").unwrap());

        assert_eq!(outbox.append(&Tick { n: 1 }).unwrap(), 1);
        assert_eq!(
            outbox.append_batch(&[Tick { n: 2 }, Tick { n: 3 }]).unwrap(),
            3
        );
        assert_eq!(outbox.pending().unwrap(), 3);

        let drained = outbox.drain_all().unwrap();
        assert_eq!(drained, vec![Tick { n: 1 }, Tick { n: 2 }, Tick { n: 3 }]);
        assert!(outbox.drain_all().unwrap().is_empty());
    }

    #[test]
    fn test_mismatched_entries_are_skipped() {
        let store = MemoryOutbox::new();
        let key = OutboxKey::new("ticks").unwrap();
        store
            .append_all(
                &key,
                vec![
                    serde_json::json!({"n": 7}),
                    serde_json::json!("not a tick"),
                    serde_json::json!({"n": 8}),
                ],
            )
            .unwrap();

        let outbox: Outbox<Tick> = Outbox::new(&store, key);
        assert_eq!(outbox.peek().unwrap().len(), 2);
        assert_eq!(outbox.drain_all().unwrap(), vec![Tick { n: 7 }, Tick { n: 8 }]);
        assert_eq!(outbox.pending().unwrap(), 0);
    }
}
