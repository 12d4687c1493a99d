//! Request surface used by the foreground app.
//!
//! [`SensorBridge`] answers the app's named requests: subscribing to sleep
//! updates, controlling the light monitor, and draining what the background
//! producers collected. Failures come back as [`BridgeError`] values whose
//! [`BridgeError::code`] is the code the app matches on.

pub mod api;
pub mod error;

pub use api::{SensorBridge, SERVICE_STARTED, SERVICE_STOPPED};
pub use error::{BridgeError, ErrorReply};
