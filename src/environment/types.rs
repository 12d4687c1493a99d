//! Environment sample type.

use serde::{Deserialize, Serialize};

/// One ambient reading taken by the sampling loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSample {
    /// When the reading was taken, epoch milliseconds (UTC)
    pub timestamp_millis: i64,
    /// Illuminance in lux
    pub lux: f64,
    /// Sound level in decibels
    pub noise_db: f64,
}

impl EnvironmentSample {
    pub fn new(timestamp_millis: i64, lux: f64, noise_db: f64) -> Self {
        Self {
            timestamp_millis,
            lux,
            noise_db,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_wire_shape() {
        let value = serde_json::to_value(EnvironmentSample::new(1_700_000_000_000, 12.5, 41.0)).unwrap();
        assert_eq!(value["timestampMillis"], 1_700_000_000_000_i64);
        assert_eq!(value["lux"], 12.5);
        assert_eq!(value["noiseDb"], 41.0);
    }
}
