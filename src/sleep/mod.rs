//! Sleep segment intake.
//!
//! The host delivers batches of detected sleep segments, possibly to a fresh
//! process each time. [`record_sleep_segments`] turns each batch into
//! [`SleepSession`] records in the durable outbox.

pub mod producer;
pub mod subscription;
pub mod types;

pub use producer::{record_sleep_segments, ProducerError};
pub use subscription::{
    AlwaysGranted, PermissionProbe, SleepSegmentSource, Subscription, SubscriptionError,
    SubscriptionFailure, SubscriptionResolver,
};
pub use types::{SegmentStatus, SleepSegment, SleepSession};
