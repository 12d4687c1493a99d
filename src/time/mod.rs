//! Timestamp normalization for events recorded by background producers.
//!
//! Producers hand over absolute instants (epoch milliseconds); consumers get
//! local wall-clock strings that carry the UTC offset in force at the instant.

pub mod normalize;

pub use normalize::{parse_normalized, NormalizeError, Normalizer, ZoneRule, NORMALIZED_FORMAT};
