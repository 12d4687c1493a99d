//! Background light/noise monitoring loop.
//!
//! The loop owns a sensor and appends one [`EnvironmentSample`] per tick to
//! a shared [`SampleBuffer`]. Stopping the service joins the thread and
//! then applies the [`ShutdownPolicy`] to whatever is still buffered.

use crate::environment::buffer::SharedSampleBuffer;
use crate::environment::sensor::AmbientSensor;
use crate::environment::types::EnvironmentSample;
use crate::outbox::{Outbox, OutboxError, OutboxKey, OutboxStore};
use crate::transparency::SharedTransparencyLog;
use chrono::Utc;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// What happens to buffered samples when the service stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPolicy {
    /// Move them into the durable environment-samples outbox
    Flush,
    /// Drop them
    Discard,
}

/// Errors from starting or stopping the monitoring service.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Light monitor is already running")]
    AlreadyRunning,

    #[error("Failed to spawn sampling thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Sampling thread panicked")]
    WorkerPanicked,

    #[error("Sampling interval must be positive")]
    ZeroInterval,

    /// Buffered samples could not be persisted; they remain in the buffer
    #[error("Failed to flush {count} buffered samples: {source}")]
    Flush {
        count: usize,
        #[source]
        source: OutboxError,
    },
}

/// Periodic ambient sampler writing into a shared buffer.
pub struct LightMonitorService {
    buffer: SharedSampleBuffer,
    sensor: Arc<Mutex<Box<dyn AmbientSensor>>>,
    interval: Duration,
    policy: ShutdownPolicy,
    store: Option<Arc<dyn OutboxStore>>,
    transparency: Option<SharedTransparencyLog>,
    running: Arc<AtomicBool>,
    stop_tx: Option<Sender<()>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl LightMonitorService {
    /// Create a stopped service sampling `sensor` every `interval`.
    ///
    /// Without a store, the flush policy degrades to keeping samples in the
    /// buffer for the next in-process drain.
    pub fn new(
        sensor: Box<dyn AmbientSensor>,
        buffer: SharedSampleBuffer,
        interval: Duration,
    ) -> Self {
        Self {
            buffer,
            sensor: Arc::new(Mutex::new(sensor)),
            interval,
            policy: ShutdownPolicy::Flush,
            store: None,
            transparency: None,
            running: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            thread_handle: None,
        }
    }

    /// Persist leftovers to `store` on shutdown.
    pub fn with_store(mut self, store: Arc<dyn OutboxStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_transparency(mut self, log: SharedTransparencyLog) -> Self {
        self.transparency = Some(log);
        self
    }

    pub fn buffer(&self) -> &SharedSampleBuffer {
        &self.buffer
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start sampling on a background thread.
    ///
    /// The first sample is taken immediately, then one per interval.
    pub fn start(&mut self) -> Result<(), ServiceError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(ServiceError::AlreadyRunning);
        }
        if self.interval.is_zero() {
            return Err(ServiceError::ZeroInterval);
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let buffer = self.buffer.clone();
        let sensor = self.sensor.clone();
        let running = self.running.clone();
        let transparency = self.transparency.clone();
        let interval = self.interval;

        self.running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("light-monitor".to_string())
            .spawn(move || {
                loop {
                    take_sample(&sensor, &buffer, transparency.as_ref());

                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                ServiceError::Spawn(e)
            })?;

        self.stop_tx = Some(stop_tx);
        self.thread_handle = Some(handle);
        info!(interval_ms = interval.as_millis() as u64, "Light monitor started");
        Ok(())
    }

    /// Stop sampling, join the thread, and apply the shutdown policy.
    ///
    /// Stopping a stopped service only re-applies the policy to the buffer.
    pub fn stop(&mut self) -> Result<(), ServiceError> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        let joined = match self.thread_handle.take() {
            Some(handle) => handle.join().map_err(|_| ServiceError::WorkerPanicked),
            None => Ok(()),
        };
        self.running.store(false, Ordering::SeqCst);

        let settled = self.settle_buffer();
        joined.and(settled)
    }

    fn settle_buffer(&self) -> Result<(), ServiceError> {
        match (self.policy, &self.store) {
            (ShutdownPolicy::Flush, Some(store)) => {
                let leftover = self.buffer.snapshot_and_clear();
                if leftover.is_empty() {
                    return Ok(());
                }

                let count = leftover.len();
                let outbox: Outbox<EnvironmentSample> =
                    Outbox::new(store.as_ref(), OutboxKey::env_samples());
                match outbox.append_batch(&leftover) {
                    Ok(pending) => {
                        info!(flushed = count, pending, "Flushed buffered samples on shutdown");
                        Ok(())
                    }
                    Err(source) => {
                        self.buffer.restore_front(leftover);
                        Err(ServiceError::Flush { count, source })
                    }
                }
            }
            (ShutdownPolicy::Flush, None) => {
                debug!(
                    buffered = self.buffer.len(),
                    "No outbox configured; samples stay buffered"
                );
                Ok(())
            }
            (ShutdownPolicy::Discard, _) => {
                let dropped = self.buffer.snapshot_and_clear().len();
                if dropped > 0 {
                    info!(dropped, "Discarded buffered samples on shutdown");
                }
                Ok(())
            }
        }
    }
}

impl Drop for LightMonitorService {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            if let Err(e) = self.stop() {
                warn!(error = %e, "Light monitor did not shut down cleanly");
            }
        }
    }
}

fn take_sample(
    sensor: &Mutex<Box<dyn AmbientSensor>>,
    buffer: &SharedSampleBuffer,
    transparency: Option<&SharedTransparencyLog>,
) {
    let reading = sensor
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .read();

    match reading {
        Ok(reading) if !reading.is_finite() => {
            warn!(
                lux = reading.lux,
                noise_db = reading.noise_db,
                "Skipping non-finite ambient sample"
            );
        }
        Ok(reading) => {
            let sample = EnvironmentSample::new(
                Utc::now().timestamp_millis(),
                reading.lux,
                reading.noise_db,
            );
            debug!(lux = sample.lux, noise_db = sample.noise_db, "Ambient sample");
            buffer.record(sample);
            if let Some(log) = transparency {
                log.record_env_sample();
            }
        }
        Err(e) => warn!(error = %e, "Skipping ambient sample"),
    }
}
