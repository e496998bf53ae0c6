use chrono::{DateTime, Local};

/// A source of wall-clock timestamps.
///
/// The producer reads the clock at the moment of each emission, never ahead of
/// time. Implementations must be cheap to clone since every started sequence
/// owns its own copy.
pub trait Clock: Clone + Send + Sync + 'static {
    /// Returns the current wall-clock time.
    fn now(&self) -> DateTime<Local>;
}

/// The local system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}
