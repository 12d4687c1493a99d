//! Host-triggered sleep segment producer.
//!
//! Each invocation is self-contained: it receives the delivered batch and a
//! store handle, commits, and returns. Nothing is cached between calls, so
//! the host may run every delivery in a fresh process.

use crate::outbox::{Outbox, OutboxError, OutboxKey, OutboxStore};
use crate::sleep::types::{SegmentStatus, SleepSegment, SleepSession};
use crate::time::{NormalizeError, Normalizer};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors returned to the host from a producer invocation.
#[derive(Error, Debug)]
pub enum ProducerError {
    /// A segment boundary could not be rendered; nothing from the batch was stored
    #[error("Segment {index} has an unrepresentable timestamp: {source}")]
    Normalize {
        index: usize,
        source: NormalizeError,
    },

    /// The outbox rejected the commit; nothing from the batch was stored
    #[error("Failed to store sleep sessions: {0}")]
    Store(#[from] OutboxError),
}

impl ProducerError {
    /// Whether the host should redeliver the batch.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProducerError::Store(e) => e.is_retryable(),
            ProducerError::Normalize { .. } => false,
        }
    }
}

/// Normalize a delivered batch and append it to the sleep-sessions outbox.
///
/// Sessions are committed in delivery order as a single append, so the batch
/// is either stored whole or not at all. Returns the number of sessions
/// recorded; an empty batch records nothing and touches no storage.
pub fn record_sleep_segments(
    batch: &[SleepSegment],
    store: &dyn OutboxStore,
    normalizer: &Normalizer,
) -> Result<usize, ProducerError> {
    if batch.is_empty() {
        return Ok(0);
    }

    info!(count = batch.len(), "Sleep events received");

    let sessions = batch
        .iter()
        .enumerate()
        .map(|(index, segment)| to_session(index, segment, normalizer))
        .collect::<Result<Vec<_>, _>>()?;

    let outbox: Outbox<SleepSession> = Outbox::new(store, OutboxKey::sleep_sessions());
    let pending = outbox.append_batch(&sessions)?;

    info!(
        recorded = sessions.len(),
        pending, "Sleep sessions saved to outbox"
    );
    Ok(sessions.len())
}

fn to_session(
    index: usize,
    segment: &SleepSegment,
    normalizer: &Normalizer,
) -> Result<SleepSession, ProducerError> {
    let normalize = |millis: i64| {
        normalizer
            .normalize(millis)
            .map_err(|source| ProducerError::Normalize { index, source })
    };

    let sleep_time = normalize(segment.start_time_millis)?;
    let wake_time = normalize(segment.end_time_millis)?;

    if segment.duration_millis() < 0 {
        warn!(
            index,
            start = segment.start_time_millis,
            end = segment.end_time_millis,
            "Sleep segment ends before it starts; recording as delivered"
        );
    }
    if segment.status != SegmentStatus::Successful {
        debug!(index, status = ?segment.status, "Sleep segment has degraded status");
    }

    debug!(
        start_millis = segment.start_time_millis,
        end_millis = segment.end_time_millis,
        zone = %normalizer.rule(),
        "Saved session: {sleep_time} ~ {wake_time}"
    );

    Ok(SleepSession {
        sleep_time,
        wake_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::memory::UnavailableOutbox;
    use crate::outbox::MemoryOutbox;

    fn kst() -> Normalizer {
        Normalizer::fixed(9 * 3600).unwrap()
    }

    fn drain(store: &MemoryOutbox) -> Vec<SleepSession> {
        Outbox::<SleepSession>::new(store, OutboxKey::sleep_sessions())
            .drain_all()
            .unwrap()
    }

    #[test]
    fn test_batch_recorded_in_delivery_order() {
        let store = MemoryOutbox::new();
        let batch = vec![
            SleepSegment::new(1_700_003_600_000, 1_700_007_200_000),
            SleepSegment::new(1_700_000_000_000, 1_700_003_600_000),
        ];

        assert_eq!(record_sleep_segments(&batch, &store, &kst()).unwrap(), 2);

        let sessions = drain(&store);
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].sleep_time, "2023-11-15T08:13:20.000+09:00");
        assert_eq!(sessions[1].sleep_time, "2023-11-15T07:13:20.000+09:00");
        assert_eq!(sessions[1].wake_time, "2023-11-15T08:13:20.000+09:00");
    }

    #[test]
    fn test_invocations_accumulate() {
        let store = MemoryOutbox::new();
        let normalizer = kst();

        record_sleep_segments(&[SleepSegment::new(0, 1_000)], &store, &normalizer).unwrap();
        record_sleep_segments(&[SleepSegment::new(2_000, 3_000)], &store, &normalizer).unwrap();

        assert_eq!(drain(&store).len(), 2);
        assert!(drain(&store).is_empty());
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let store = MemoryOutbox::new();
        assert_eq!(record_sleep_segments(&[], &store, &kst()).unwrap(), 0);
        assert!(drain(&store).is_empty());
    }

    #[test]
    fn test_unrepresentable_segment_stores_nothing() {
        let store = MemoryOutbox::new();
        let batch = vec![
            SleepSegment::new(0, 1_000),
            SleepSegment::new(0, i64::MAX),
        ];

        let err = record_sleep_segments(&batch, &store, &kst()).unwrap_err();
        assert!(matches!(err, ProducerError::Normalize { index: 1, .. }));
        assert!(!err.is_retryable());
        assert!(drain(&store).is_empty());
    }

    #[test]
    fn test_degraded_segments_are_still_recorded() {
        let store = MemoryOutbox::new();
        let batch = vec![
            SleepSegment::new(5_000, 1_000),
            SleepSegment::new(6_000, 7_000).with_status(SegmentStatus::NotDetected),
        ];

        assert_eq!(record_sleep_segments(&batch, &store, &kst()).unwrap(), 2);
        assert_eq!(drain(&store).len(), 2);
    }

    #[test]
    fn test_store_failure_is_retryable() {
        let batch = [SleepSegment::new(1_700_000_000_000, 1_700_003_600_000)];

        let err = record_sleep_segments(&batch, &UnavailableOutbox, &kst()).unwrap_err();
        assert!(matches!(err, ProducerError::Store(OutboxError::Io { .. })));
        assert!(err.is_retryable());
    }
}
