//! Ambient sensor boundary.
//!
//! Real hosts wire a light sensor and a microphone level meter behind
//! [`AmbientSensor`]. [`SimulatedSensor`] produces a deterministic day-like
//! curve so the service can run where no hardware is present.

use thiserror::Error;

/// One combined light and noise reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientReading {
    pub lux: f64,
    pub noise_db: f64,
}

impl AmbientReading {
    /// Whether both values can be stored as JSON numbers.
    pub fn is_finite(&self) -> bool {
        self.lux.is_finite() && self.noise_db.is_finite()
    }
}

/// Errors reported by a sensor read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    #[error("Sensor unavailable: {0}")]
    Unavailable(String),
}

/// Source of ambient readings for the sampling loop.
pub trait AmbientSensor: Send {
    fn read(&mut self) -> Result<AmbientReading, SensorError>;
}

/// Convert a recorder's peak amplitude (0..=32767) to decibels.
///
/// Non-positive amplitudes mean silence or no data and map to `0.0`.
pub fn amplitude_to_db(max_amplitude: i32) -> f64 {
    if max_amplitude <= 0 {
        return 0.0;
    }
    20.0 * f64::from(max_amplitude).log10()
}

/// A sensor that replays a smooth synthetic light/noise cycle.
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    step: u64,
    period: u64,
    peak_lux: f64,
    peak_amplitude: i32,
}

impl SimulatedSensor {
    /// A cycle of `period` readings peaking at `peak_lux`.
    pub fn new(period: u64, peak_lux: f64) -> Self {
        Self {
            step: 0,
            period: period.max(1),
            peak_lux,
            peak_amplitude: 3_000,
        }
    }
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::new(60, 400.0)
    }
}

impl AmbientSensor for SimulatedSensor {
    fn read(&mut self) -> Result<AmbientReading, SensorError> {
        let phase = (self.step % self.period) as f64 / self.period as f64;
        self.step += 1;

        // 0 at the start of the cycle, 1 at its midpoint.
        let level = (1.0 - (phase * std::f64::consts::TAU).cos()) / 2.0;
        let amplitude = (f64::from(self.peak_amplitude) * level).round() as i32;

        Ok(AmbientReading {
            lux: self.peak_lux * level,
            noise_db: amplitude_to_db(amplitude),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amplitude_to_db() {
        assert_eq!(amplitude_to_db(0), 0.0);
        assert_eq!(amplitude_to_db(-5), 0.0);
        assert!((amplitude_to_db(1) - 0.0).abs() < 1e-9);
        assert!((amplitude_to_db(1_000) - 60.0).abs() < 1e-9);
        assert!((amplitude_to_db(32_767) - 90.3).abs() < 0.01);
    }

    #[test]
    fn test_simulated_cycle() {
        let mut sensor = SimulatedSensor::new(4, 100.0);
        let readings: Vec<AmbientReading> = (0..5).map(|_| sensor.read().unwrap()).collect();

        assert!(readings[0].lux.abs() < 1e-9);
        assert_eq!(readings[0].noise_db, 0.0);
        assert!((readings[2].lux - 100.0).abs() < 1e-9);
        assert!(readings[2].noise_db > readings[1].noise_db);
        // Period 4: the fifth reading repeats the first.
        assert_eq!(readings[4], readings[0]);
    }
}
