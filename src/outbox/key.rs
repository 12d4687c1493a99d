//! Validated outbox buffer names.

use crate::outbox::error::OutboxError;
use std::fmt;
use std::str::FromStr;

/// Key under which sleep sessions wait for the consumer.
///
/// The name matches the key the foreground app already reads.
pub const SLEEP_SESSIONS_KEY: &str = "native_pending_sleep_data";

/// Key that receives samples still buffered when the light monitor stops.
pub const ENV_SAMPLES_KEY: &str = "native_pending_env_samples";

/// Name of one outbox buffer.
///
/// Keys double as file stems for [`crate::outbox::FileOutbox`], so only
/// ASCII alphanumerics, `_`, `-` and `.` are accepted, and a key may not
/// start with a dot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutboxKey(String);

impl OutboxKey {
    /// Validate and wrap a key.
    pub fn new(key: impl Into<String>) -> Result<Self, OutboxError> {
        let key = key.into();
        let valid_chars = key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

        if key.is_empty() || key.starts_with('.') || !valid_chars {
            return Err(OutboxError::InvalidKey(key));
        }
        Ok(Self(key))
    }

    /// The sleep-sessions buffer.
    pub fn sleep_sessions() -> Self {
        Self(SLEEP_SESSIONS_KEY.to_string())
    }

    /// The flushed environment-samples buffer.
    pub fn env_samples() -> Self {
        Self(ENV_SAMPLES_KEY.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OutboxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OutboxKey {
    type Err = OutboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for OutboxKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
