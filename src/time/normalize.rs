//! Offset-qualified local timestamps.
//!
//! The offset attached to a timestamp is always the one in effect at the
//! represented instant, never the offset in effect when formatting happens.
//! An event recorded before a daylight-saving transition keeps its
//! pre-transition offset even when it is normalized afterwards.

use chrono::{DateTime, FixedOffset, Local, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Output layout: `YYYY-MM-DDTHH:mm:ss.sss±HH:MM`.
pub const NORMALIZED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";

/// Errors produced while normalizing or parsing timestamps.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    /// The instant cannot be represented as a calendar date.
    #[error("epoch millis {0} is outside the representable range")]
    OutOfRange(i64),

    /// A zone rule string could not be understood.
    #[error("unknown timezone '{0}'")]
    UnknownZone(String),

    /// A normalized string could not be parsed back.
    #[error("malformed timestamp '{input}': {reason}")]
    Malformed { input: String, reason: String },
}

/// The timezone rule set used to render local time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ZoneRule {
    /// The host's current default zone (`TZ` / system localtime).
    #[default]
    System,
    /// An IANA zone from the bundled tz database.
    Named(Tz),
    /// A fixed offset with no transitions.
    Fixed(FixedOffset),
}

impl fmt::Display for ZoneRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneRule::System => write!(f, "system"),
            ZoneRule::Named(tz) => write!(f, "{}", tz.name()),
            ZoneRule::Fixed(offset) => write!(f, "{offset}"),
        }
    }
}

impl FromStr for ZoneRule {
    type Err = NormalizeError;

    /// Accepts `system`/`local`, an IANA name such as `Asia/Seoul`, or a
    /// fixed offset such as `+09:00`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("system") || trimmed.eq_ignore_ascii_case("local") {
            return Ok(ZoneRule::System);
        }

        if trimmed.starts_with('+') || trimmed.starts_with('-') {
            return parse_fixed_offset(trimmed)
                .map(ZoneRule::Fixed)
                .ok_or_else(|| NormalizeError::UnknownZone(s.to_string()));
        }

        trimmed
            .parse::<Tz>()
            .map(ZoneRule::Named)
            .map_err(|_| NormalizeError::UnknownZone(s.to_string()))
    }
}

/// Parse `±HH:MM` (or `±HHMM`) into a fixed offset.
fn parse_fixed_offset(s: &str) -> Option<FixedOffset> {
    let (sign, rest) = match s.split_at(1) {
        ("+", rest) => (1, rest),
        ("-", rest) => (-1, rest),
        _ => return None,
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    if minutes >= 60 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Converts epoch milliseconds into offset-qualified local timestamps.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    rule: ZoneRule,
}

impl Normalizer {
    /// Create a normalizer for the given zone rule.
    pub fn new(rule: ZoneRule) -> Self {
        Self { rule }
    }

    /// A normalizer that follows the host's default timezone.
    pub fn system() -> Self {
        Self::new(ZoneRule::System)
    }

    /// A normalizer pinned to a fixed UTC offset, in seconds east of UTC.
    pub fn fixed(offset_secs: i32) -> Option<Self> {
        FixedOffset::east_opt(offset_secs).map(|o| Self::new(ZoneRule::Fixed(o)))
    }

    /// The zone rule in use.
    pub fn rule(&self) -> ZoneRule {
        self.rule
    }

    /// Render `epoch_millis` as `YYYY-MM-DDTHH:mm:ss.sss±HH:MM`.
    pub fn normalize(&self, epoch_millis: i64) -> Result<String, NormalizeError> {
        let instant = DateTime::<Utc>::from_timestamp_millis(epoch_millis)
            .ok_or(NormalizeError::OutOfRange(epoch_millis))?;

        let rendered = match self.rule {
            ZoneRule::System => render(instant, &Local),
            ZoneRule::Named(tz) => render(instant, &tz),
            ZoneRule::Fixed(offset) => render(instant, &offset),
        };

        Ok(rendered)
    }

    /// The UTC offset, in seconds east, in force at `epoch_millis`.
    pub fn offset_at(&self, epoch_millis: i64) -> Result<i32, NormalizeError> {
        let instant = DateTime::<Utc>::from_timestamp_millis(epoch_millis)
            .ok_or(NormalizeError::OutOfRange(epoch_millis))?;

        Ok(match self.rule {
            ZoneRule::System => instant.with_timezone(&Local).offset().local_minus_utc(),
            ZoneRule::Named(tz) => instant.with_timezone(&tz).offset().fix().local_minus_utc(),
            ZoneRule::Fixed(offset) => offset.local_minus_utc(),
        })
    }
}

// The offset is resolved from the instant itself, so DST-straddling events
// each carry their own offset.
fn render<Z: TimeZone>(instant: DateTime<Utc>, zone: &Z) -> String
where
    Z::Offset: fmt::Display,
{
    instant
        .with_timezone(zone)
        .format(NORMALIZED_FORMAT)
        .to_string()
}

/// Parse a normalized timestamp back into an offset-aware instant.
pub fn parse_normalized(s: &str) -> Result<DateTime<FixedOffset>, NormalizeError> {
    DateTime::parse_from_str(s, NORMALIZED_FORMAT).map_err(|e| NormalizeError::Malformed {
        input: s.to_string(),
        reason: e.to_string(),
    })
}
