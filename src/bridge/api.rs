//! The foreground app's view of the background producers.

use crate::bridge::error::BridgeError;
use crate::environment::{EnvironmentSample, LightMonitorService, ServiceError, SharedSampleBuffer};
use crate::outbox::{Outbox, OutboxError, OutboxKey, OutboxStore};
use crate::sleep::{
    record_sleep_segments, AlwaysGranted, PermissionProbe, ProducerError, SleepSegment,
    SleepSegmentSource, SleepSession, Subscription, SubscriptionError,
};
use crate::time::Normalizer;
use crate::transparency::{create_shared_log, SharedTransparencyLog};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Reply to `start_service`.
pub const SERVICE_STARTED: &str = "Service started";
/// Reply to `stop_service`.
pub const SERVICE_STOPPED: &str = "Service stopped";

const PERMISSION_MESSAGE: &str = "Activity Recognition permission needed";

/// Request handlers for the foreground app.
///
/// Holds the injected outbox store and the running light monitor. There is
/// exactly one consumer per buffer; concurrent drains from two bridges over
/// the same store still never return an entry twice.
pub struct SensorBridge {
    store: Arc<dyn OutboxStore>,
    light: Mutex<LightMonitorService>,
    samples: SharedSampleBuffer,
    permissions: Arc<dyn PermissionProbe>,
    sleep_source: Option<Arc<dyn SleepSegmentSource>>,
    auto_reply: AtomicBool,
    transparency: SharedTransparencyLog,
}

impl SensorBridge {
    pub fn new(store: Arc<dyn OutboxStore>, light: LightMonitorService) -> Self {
        let samples = light.buffer().clone();
        Self {
            store,
            light: Mutex::new(light),
            samples,
            permissions: Arc::new(AlwaysGranted),
            sleep_source: None,
            auto_reply: AtomicBool::new(false),
            transparency: create_shared_log(),
        }
    }

    pub fn with_permissions(mut self, probe: Arc<dyn PermissionProbe>) -> Self {
        self.permissions = probe;
        self
    }

    pub fn with_sleep_source(mut self, source: Arc<dyn SleepSegmentSource>) -> Self {
        self.sleep_source = Some(source);
        self
    }

    pub fn with_transparency(mut self, log: SharedTransparencyLog) -> Self {
        self.transparency = log;
        self
    }

    pub fn transparency(&self) -> &SharedTransparencyLog {
        &self.transparency
    }

    pub fn store(&self) -> &Arc<dyn OutboxStore> {
        &self.store
    }

    // ---- sleep ----

    /// Subscribe to sleep segment delivery.
    ///
    /// `Ok` means the request was handed to the detector; the returned
    /// [`Subscription`] later resolves with the detector's answer.
    pub fn request_sleep_updates(&self) -> Result<Subscription, BridgeError> {
        if !self.permissions.activity_recognition_granted() {
            warn!("Sleep updates requested without activity recognition permission");
            return Err(BridgeError::PermissionDenied(PERMISSION_MESSAGE.to_string()));
        }

        match &self.sleep_source {
            Some(source) => {
                debug!("Requesting sleep segment updates");
                Ok(source.request_segment_updates())
            }
            None => Ok(Subscription::resolved(Err(SubscriptionError::ApiNotAvailable(
                "no sleep detector attached".to_string(),
            )))),
        }
    }

    /// Producer entry point for hosts that deliver segments in-process.
    pub fn record_sleep_segments(
        &self,
        batch: &[SleepSegment],
        normalizer: &Normalizer,
    ) -> Result<usize, ProducerError> {
        let recorded = record_sleep_segments(batch, self.store.as_ref(), normalizer)?;
        self.transparency.record_sleep_sessions(recorded as u64);
        Ok(recorded)
    }

    /// Take every pending sleep session; empty when nothing is pending.
    pub fn drain_sleep_sessions(&self) -> Result<Vec<SleepSession>, BridgeError> {
        let outbox: Outbox<SleepSession> =
            Outbox::new(self.store.as_ref(), OutboxKey::sleep_sessions());
        let sessions = outbox.drain_all().map_err(data_error)?;

        if !sessions.is_empty() {
            info!(count = sessions.len(), "Drained sleep sessions");
            self.transparency
                .record_sleep_sessions_drained(sessions.len() as u64);
        }
        Ok(sessions)
    }

    // ---- environment ----

    /// Start the light monitor; a running monitor is left as is.
    pub fn start_light_service(&self) -> Result<(), BridgeError> {
        match self.light_guard()?.start() {
            Ok(()) | Err(ServiceError::AlreadyRunning) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Failed to start light monitor");
                Err(BridgeError::ServiceError(e.to_string()))
            }
        }
    }

    /// Stop the light monitor and settle its buffer.
    pub fn stop_light_service(&self) -> Result<(), BridgeError> {
        self.light_guard()?
            .stop()
            .map_err(|e| BridgeError::ServiceError(e.to_string()))
    }

    pub fn light_service_running(&self) -> bool {
        self.light_guard().map(|l| l.is_running()).unwrap_or(false)
    }

    /// Take every environment sample not yet handed out.
    ///
    /// Samples flushed to the outbox by an earlier shutdown come first,
    /// followed by the live buffer.
    pub fn drain_environment_samples(&self) -> Result<Vec<EnvironmentSample>, OutboxError> {
        let outbox: Outbox<EnvironmentSample> =
            Outbox::new(self.store.as_ref(), OutboxKey::env_samples());
        let mut samples = outbox.drain_all()?;
        samples.extend(self.samples.snapshot_and_clear());

        if !samples.is_empty() {
            debug!(count = samples.len(), "Drained environment samples");
            self.transparency
                .record_env_samples_drained(samples.len() as u64);
        }
        Ok(samples)
    }

    /// `getEnvSamples`: drain, reporting failures as `DATA_ERROR`.
    pub fn get_env_samples(&self) -> Result<Vec<EnvironmentSample>, BridgeError> {
        self.drain_environment_samples().map_err(data_error)
    }

    // ---- auto reply ----

    pub fn start_service(&self) -> String {
        self.auto_reply.store(true, Ordering::SeqCst);
        info!("Auto-reply service started");
        SERVICE_STARTED.to_string()
    }

    pub fn stop_service(&self) -> String {
        self.auto_reply.store(false, Ordering::SeqCst);
        info!("Auto-reply service stopped");
        SERVICE_STOPPED.to_string()
    }

    pub fn auto_reply_enabled(&self) -> bool {
        self.auto_reply.load(Ordering::SeqCst)
    }

    fn light_guard(&self) -> Result<MutexGuard<'_, LightMonitorService>, BridgeError> {
        self.light
            .lock()
            .map_err(|_| BridgeError::ServiceError("light monitor state poisoned".to_string()))
    }
}

fn data_error(e: OutboxError) -> BridgeError {
    warn!(error = %e, "Drain failed");
    BridgeError::DataError(e.to_string())
}
