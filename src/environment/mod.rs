//! Ambient light and noise sampling.
//!
//! A [`LightMonitorService`] runs a sampling loop on its own thread and
//! appends to a [`SampleBuffer`]; the consumer takes everything buffered
//! with [`SampleBuffer::snapshot_and_clear`].

pub mod buffer;
pub mod sensor;
pub mod service;
pub mod types;

pub use buffer::{SampleBuffer, SharedSampleBuffer};
pub use sensor::{amplitude_to_db, AmbientReading, AmbientSensor, SensorError, SimulatedSensor};
pub use service::{LightMonitorService, ServiceError, ShutdownPolicy};
pub use types::EnvironmentSample;
