//! In-memory sample buffer with atomic snapshot-and-clear.

use crate::environment::types::EnvironmentSample;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Ordered samples shared by one sampling loop and one consumer.
///
/// `record` and `snapshot_and_clear` take the same lock, so every recorded
/// sample lands in exactly one snapshot.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    samples: Mutex<Vec<EnvironmentSample>>,
}

/// Thread-safe shared sample buffer.
pub type SharedSampleBuffer = Arc<SampleBuffer>;

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedSampleBuffer {
        Arc::new(Self::new())
    }

    // A panicking holder cannot leave the Vec half-written, so a poisoned
    // lock still guards consistent data.
    fn guard(&self) -> MutexGuard<'_, Vec<EnvironmentSample>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a sample.
    pub fn record(&self, sample: EnvironmentSample) {
        self.guard().push(sample);
    }

    /// Take every buffered sample and leave the buffer empty.
    pub fn snapshot_and_clear(&self) -> Vec<EnvironmentSample> {
        std::mem::take(&mut *self.guard())
    }

    /// Put samples back ahead of anything recorded since they were taken.
    pub fn restore_front(&self, samples: Vec<EnvironmentSample>) {
        if samples.is_empty() {
            return;
        }
        let mut guard = self.guard();
        guard.splice(0..0, samples);
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }
}
