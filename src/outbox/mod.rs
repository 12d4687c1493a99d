//! Durable outbox: append from producers, drain from the consumer.
//!
//! Each named buffer ([`OutboxKey`]) holds an ordered sequence of JSON
//! entries. Appends and drains on the same key are mutually exclusive, also
//! across processes when the store is file-backed.

pub mod error;
pub mod file;
pub mod key;
pub mod memory;
pub mod store;

pub use error::OutboxError;
pub use file::FileOutbox;
pub use key::{OutboxKey, ENV_SAMPLES_KEY, SLEEP_SESSIONS_KEY};
pub use memory::MemoryOutbox;
pub use store::{Outbox, OutboxStore};
