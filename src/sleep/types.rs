//! Sleep segment and session types.

use serde::{Deserialize, Serialize};

/// Detection quality reported with a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SegmentStatus {
    /// Segment detected with full sensor coverage
    #[default]
    Successful,
    /// Segment detected but some sensor data was missing
    MissingData,
    /// The detector could not find sleep in this span
    NotDetected,
}

/// One sleep segment as delivered by the detector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepSegment {
    /// Segment start, epoch milliseconds (UTC)
    pub start_time_millis: i64,
    /// Segment end, epoch milliseconds (UTC)
    pub end_time_millis: i64,
    #[serde(default)]
    pub status: SegmentStatus,
}

impl SleepSegment {
    pub fn new(start_time_millis: i64, end_time_millis: i64) -> Self {
        Self {
            start_time_millis,
            end_time_millis,
            status: SegmentStatus::Successful,
        }
    }

    pub fn with_status(mut self, status: SegmentStatus) -> Self {
        self.status = status;
        self
    }

    /// Length of the segment in milliseconds; negative if end precedes start.
    pub fn duration_millis(&self) -> i64 {
        self.end_time_millis.saturating_sub(self.start_time_millis)
    }
}

/// A recorded sleep session, timestamps offset-qualified.
///
/// Serialized as `{"sleepTime": "...", "wakeTime": "..."}`, the shape the
/// foreground consumer reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepSession {
    pub sleep_time: String,
    pub wake_time: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_wire_shape() {
        let session = SleepSession {
            sleep_time: "2023-11-15T07:13:20.000+09:00".to_string(),
            wake_time: "2023-11-15T08:13:20.000+09:00".to_string(),
        };
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["sleepTime"], "2023-11-15T07:13:20.000+09:00");
        assert_eq!(value["wakeTime"], "2023-11-15T08:13:20.000+09:00");
        assert_eq!(value.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_segment_status_defaults_when_absent() {
        let segment: SleepSegment =
            serde_json::from_str(r#"{"startTimeMillis": 10, "endTimeMillis": 25}"#).unwrap();
        assert_eq!(segment.status, SegmentStatus::Successful);
        assert_eq!(segment.duration_millis(), 15);

        let segment: SleepSegment = serde_json::from_str(
            r#"{"startTimeMillis": 10, "endTimeMillis": 25, "status": "MISSING_DATA"}"#,
        )
        .unwrap();
        assert_eq!(segment.status, SegmentStatus::MissingData);
    }
}
