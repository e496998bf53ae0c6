//! # Streams Module
//!
//! Home of the cancellable periodic stream primitive used by the ticker servers.
//! A producer emits the current wall-clock time once per interval, starting
//! immediately, and stops as soon as its cancellation token fires.
//!
//! ## Contained Modules:
//!
//! - **`clock`**: The `Clock` abstraction the producer reads time from, with the
//!   default `SystemClock`.
//! - **`periodic`**: `PeriodicStreamProducer`, the emit-then-wait state machine
//!   that yields an unbounded, lazy sequence of timestamps.
//! - **`subscription`**: `Subscription`, one consumer's attachment to a fresh
//!   sequence, bound to a child cancellation token.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::time::Duration;

/// Time sources for the producer.
pub mod clock;
/// The cadence/cancellation state machine.
pub mod periodic;
/// Per-consumer subscriptions.
pub mod subscription;

// --- Public API Re-exports ---
pub use clock::{Clock, SystemClock};
pub use periodic::{start, PeriodicStreamProducer, ProducerState, TimestampStream, DEFAULT_INTERVAL};
pub use subscription::Subscription;

/// Errors raised while setting up a periodic stream.
///
/// A running stream never fails; cancellation ends it normally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The interval between emissions must be strictly positive.
    #[error("stream interval must be positive, got {0:?}")]
    InvalidInterval(Duration),
}
