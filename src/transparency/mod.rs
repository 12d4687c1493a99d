//! Transparency module for the outbox agent.
//!
//! Tracks how much data producers committed and the consumer drained, so a
//! user can audit what was captured without reading the data itself.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, SharedTransparencyLog, TransparencyLog,
    TransparencyStats,
};
