//! Sleep Outbox - durable hand-off from background sensors to a polling app.
//!
//! Background producers run whenever the platform wakes them: a sleep
//! detector delivering segment batches (often to a fresh process), and a
//! light/noise sampling loop. The foreground app polls on its own schedule.
//! This crate sits between the two and guarantees every committed entry is
//! handed to the app exactly once.
//!
//! # Guarantees
//!
//! - **No silent loss**: an append that returns `Ok` survives until drained
//! - **No duplicates**: a drain empties what it returns, atomically
//! - **Correct offsets**: timestamps carry the UTC offset in force at the
//!   event, across DST transitions and restarts
//! - **Corruption tolerant**: an unreadable outbox reads as empty and is logged
//!
//! # Architecture
//!
//! ```text
//!  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐
//!  │   Sleep     │──▶│ Normalizer  │──▶│   Outbox    │──────┐
//!  │  Producer   │   │ (tz-aware)  │   │ (file lock) │      │
//!  └─────────────┘   └─────────────┘   └─────────────┘      │
//!                                             ▲ flush       ▼
//!  ┌─────────────┐   ┌─────────────┐          │      ┌─────────────┐
//!  │   Light     │──▶│   Sample    │──────────┴─────▶│   Bridge    │
//!  │  Monitor    │   │   Buffer    │                 │  (drain)    │
//!  └─────────────┘   └─────────────┘                 └─────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use sleep_outbox::{record_sleep_segments, FileOutbox, Normalizer, Outbox, OutboxKey};
//! use sleep_outbox::{SleepSegment, SleepSession};
//!
//! // Producer side: one call per delivered batch.
//! let store = FileOutbox::open("/tmp/sleep-outbox").expect("open outbox");
//! let batch = [SleepSegment::new(1_700_000_000_000, 1_700_028_800_000)];
//! record_sleep_segments(&batch, &store, &Normalizer::system()).expect("record");
//!
//! // Consumer side: drain on its own schedule.
//! let outbox: Outbox<SleepSession> = Outbox::new(&store, OutboxKey::sleep_sessions());
//! for session in outbox.drain_all().expect("drain") {
//!     println!("{} ~ {}", session.sleep_time, session.wake_time);
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod environment;
pub mod logging;
pub mod outbox;
pub mod sleep;
pub mod time;
pub mod transparency;

// Re-export key types at crate root for convenience
pub use bridge::{BridgeError, SensorBridge};
pub use config::{Config, ConfigError};
pub use environment::{
    EnvironmentSample, LightMonitorService, SampleBuffer, ShutdownPolicy, SimulatedSensor,
};
pub use outbox::{FileOutbox, MemoryOutbox, Outbox, OutboxError, OutboxKey, OutboxStore};
pub use sleep::{record_sleep_segments, ProducerError, SleepSegment, SleepSession};
pub use time::{Normalizer, ZoneRule};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
