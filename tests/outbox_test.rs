//! Integration tests for the file-backed outbox under concurrent use.

use serde::{Deserialize, Serialize};
use sleep_outbox::outbox::{FileOutbox, Outbox, OutboxError, OutboxKey, OutboxStore};
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
struct Entry {
    writer: u32,
    seq: u32,
}

fn key() -> OutboxKey {
    OutboxKey::new("concurrent_entries").unwrap()
}

/// Retry a contended call until it goes through.
fn with_retry<T>(mut op: impl FnMut() -> Result<T, OutboxError>) -> T {
    loop {
        match op() {
            Ok(v) => return v,
            Err(e) if e.is_retryable() => thread::yield_now(),
            Err(e) => panic!("non-retryable outbox error: {e}"),
        }
    }
}

#[test]
fn test_fresh_store_drains_empty() {
    let dir = TempDir::new().unwrap();
    let store = FileOutbox::open(dir.path()).unwrap();
    let outbox: Outbox<Entry> = Outbox::new(&store, key());

    assert!(outbox.drain_all().unwrap().is_empty());
    assert!(outbox.drain_all().unwrap().is_empty());
    assert_eq!(outbox.pending().unwrap(), 0);
}

#[test]
fn test_concurrent_appends_drain_exactly_once_in_commit_order() {
    const WRITERS: u32 = 4;
    const PER_WRITER: u32 = 25;

    let dir = TempDir::new().unwrap();
    let barrier = Arc::new(Barrier::new(WRITERS as usize));

    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            // Each writer gets its own handle, as separate processes would.
            let path = dir.path().to_path_buf();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let store = FileOutbox::open(path).unwrap().with_lock_retries(64);
                let outbox: Outbox<Entry> = Outbox::new(&store, key());
                barrier.wait();
                for seq in 0..PER_WRITER {
                    with_retry(|| outbox.append(&Entry { writer, seq }));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let store = FileOutbox::open(dir.path()).unwrap();
    let outbox: Outbox<Entry> = Outbox::new(&store, key());
    let drained = outbox.drain_all().unwrap();

    assert_eq!(drained.len(), (WRITERS * PER_WRITER) as usize);
    let unique: HashSet<_> = drained.iter().copied().collect();
    assert_eq!(unique.len(), drained.len());

    // A writer's appends commit one after another, so they drain in its order.
    for writer in 0..WRITERS {
        let seqs: Vec<u32> = drained
            .iter()
            .filter(|e| e.writer == writer)
            .map(|e| e.seq)
            .collect();
        assert_eq!(seqs, (0..PER_WRITER).collect::<Vec<_>>());
    }

    assert!(outbox.drain_all().unwrap().is_empty());
}

#[test]
fn test_drains_racing_appends_never_lose_or_duplicate() {
    const TOTAL: u32 = 60;

    let dir = TempDir::new().unwrap();
    let path = dir.path().to_path_buf();

    let producer = thread::spawn(move || {
        let store = FileOutbox::open(path).unwrap().with_lock_retries(64);
        let outbox: Outbox<Entry> = Outbox::new(&store, key());
        for seq in 0..TOTAL {
            with_retry(|| outbox.append(&Entry { writer: 0, seq }));
        }
    });

    let store = FileOutbox::open(dir.path()).unwrap().with_lock_retries(64);
    let outbox: Outbox<Entry> = Outbox::new(&store, key());
    let mut seen = Vec::new();
    while !producer.is_finished() {
        seen.extend(with_retry(|| outbox.drain_all()));
    }
    producer.join().unwrap();
    seen.extend(with_retry(|| outbox.drain_all()));

    let seqs: Vec<u32> = seen.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, (0..TOTAL).collect::<Vec<_>>());
}

#[test]
fn test_corrupt_document_reads_empty_and_recovers() {
    let dir = TempDir::new().unwrap();
    let store = FileOutbox::open(dir.path()).unwrap();
    let outbox: Outbox<Entry> = Outbox::new(&store, key());

    outbox.append(&Entry { writer: 1, seq: 1 }).unwrap();
    std::fs::write(store.document_path(&key()), "{ not json at all").unwrap();

    assert!(outbox.drain_all().unwrap().is_empty());
    assert_eq!(store.corrupt_resets(), 1);

    // The store keeps working after the reset.
    outbox.append(&Entry { writer: 1, seq: 2 }).unwrap();
    assert_eq!(
        outbox.drain_all().unwrap(),
        vec![Entry { writer: 1, seq: 2 }]
    );
}

#[test]
fn test_undecodable_entries_are_skipped() {
    let dir = TempDir::new().unwrap();
    let store = FileOutbox::open(dir.path()).unwrap();

    store
        .append_all(
            &key(),
            vec![
                serde_json::json!({"writer": 1, "seq": 1}),
                serde_json::json!("stray"),
                serde_json::json!({"writer": 1, "seq": 2}),
            ],
        )
        .unwrap();

    let outbox: Outbox<Entry> = Outbox::new(&store, key());
    assert_eq!(
        outbox.drain_all().unwrap(),
        vec![Entry { writer: 1, seq: 1 }, Entry { writer: 1, seq: 2 }]
    );
    assert_eq!(store.pending(&key()).unwrap(), 0);
}
