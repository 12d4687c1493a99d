//! Error codes returned across the app boundary.

use serde::Serialize;
use thiserror::Error;

/// A typed failure for one app request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// A required OS capability is not granted; not retried here
    #[error("{0}")]
    PermissionDenied(String),

    /// A background worker failed to start or stop
    #[error("{0}")]
    ServiceError(String),

    /// Draining or reading collected data failed
    #[error("{0}")]
    DataError(String),
}

/// Wire form of a [`BridgeError`].
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReply {
    pub code: &'static str,
    pub message: String,
}

impl BridgeError {
    /// The code the app matches on.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::PermissionDenied(_) => "PERMISSION_DENIED",
            BridgeError::ServiceError(_) => "SERVICE_ERROR",
            BridgeError::DataError(_) => "DATA_ERROR",
        }
    }

    pub fn reply(&self) -> ErrorReply {
        ErrorReply {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(
            BridgeError::PermissionDenied("x".into()).code(),
            "PERMISSION_DENIED"
        );
        assert_eq!(BridgeError::ServiceError("x".into()).code(), "SERVICE_ERROR");

        let reply = serde_json::to_value(BridgeError::DataError("disk full".into()).reply()).unwrap();
        assert_eq!(reply["code"], "DATA_ERROR");
        assert_eq!(reply["message"], "disk full");
    }
}
