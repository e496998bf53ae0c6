//! # Periodic Timestamp Producer
//!
//! `PeriodicStreamProducer` turns an interval and a `CancellationToken` into an
//! unbounded, lazily evaluated stream of wall-clock timestamps.
//!
//! ## Behaviour:
//!
//! - **Emit, then wait**: the first value is produced as soon as the stream is
//!   polled, with no initial delay. Every later value follows one full interval
//!   after the consumer pulled the previous one.
//! - **Cooperative cancellation**: the token is checked before every emission and
//!   raced against every wait. Once it fires, the stream ends (`None`) without
//!   another value and the pending timer is dropped.
//! - **Single use**: every call to `start` builds an independent sequence with its
//!   own state. Nothing is shared between sequences.
//! - **Ordered values**: timestamps never decrease within one sequence, even if the
//!   wall clock is stepped backwards between two emissions.

use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Local};
use futures_util::Stream;
use tokio_util::sync::CancellationToken;

use super::clock::{Clock, SystemClock};
use super::StreamError;

/// Interval used by `PeriodicStreamProducer::default()`.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(5000);

/// The lazy sequence handed to the transport layer.
pub type TimestampStream = Pin<Box<dyn Stream<Item = DateTime<Local>> + Send>>;

/// States of a running sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    /// About to read the clock and hand a value to the consumer.
    Emitting,
    /// Suspended until the interval elapses or cancellation fires.
    Waiting,
    /// Terminal. The sequence yields nothing more.
    Stopped,
}

/// Produces one timestamp per interval until cancelled.
#[derive(Debug, Clone)]
pub struct PeriodicStreamProducer<C = SystemClock> {
    interval: Duration,
    clock: C,
    name: Option<String>,
}

impl PeriodicStreamProducer<SystemClock> {
    /// Creates a producer reading the system clock.
    ///
    /// # Errors
    /// Returns `StreamError::InvalidInterval` when `interval` is zero.
    pub fn new(interval: Duration) -> Result<Self, StreamError> {
        if interval.is_zero() {
            return Err(StreamError::InvalidInterval(interval));
        }
        Ok(Self {
            interval,
            clock: SystemClock,
            name: None,
        })
    }
}

impl Default for PeriodicStreamProducer<SystemClock> {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            clock: SystemClock,
            name: None,
        }
    }
}

impl<C: Clock> PeriodicStreamProducer<C> {
    /// Swaps the time source, keeping interval and name.
    pub fn with_clock<D: Clock>(self, clock: D) -> PeriodicStreamProducer<D> {
        PeriodicStreamProducer {
            interval: self.interval,
            clock,
            name: self.name,
        }
    }

    /// Sets the name used in log lines.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The configured spacing between emissions.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// The producer's name, or a generic one when unset.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("periodic_stream_producer")
    }

    /// # Start
    ///
    /// Builds a new sequence bound to `cancellation`.
    ///
    /// The returned stream does nothing until polled. Each poll runs the state
    /// machine up to the next emission: `Emitting` reads the clock and yields,
    /// `Waiting` sleeps for the interval unless the token fires first, and
    /// `Stopped` ends the stream. A token that is already cancelled yields no
    /// value at all.
    pub fn start(&self, cancellation: CancellationToken) -> TimestampStream {
        let interval = self.interval;
        let clock = self.clock.clone();
        let name = self.name().to_string();

        Box::pin(async_stream::stream! {
            let mut state = ProducerState::Emitting;
            let mut last: Option<DateTime<Local>> = None;
            let mut emitted: u64 = 0;

            log::debug!("{} started with interval {:?}", name, interval);

            loop {
                match state {
                    ProducerState::Emitting => {
                        if cancellation.is_cancelled() {
                            state = ProducerState::Stopped;
                            continue;
                        }

                        let now = clock.now();
                        // A clock stepped backwards repeats the previous value.
                        let value = match last {
                            Some(previous) if now < previous => previous,
                            _ => now,
                        };
                        last = Some(value);
                        emitted += 1;

                        yield value;
                        state = ProducerState::Waiting;
                    }
                    ProducerState::Waiting => {
                        state = tokio::select! {
                            biased;
                            _ = cancellation.cancelled() => ProducerState::Stopped,
                            _ = tokio::time::sleep(interval) => ProducerState::Emitting,
                        };
                    }
                    ProducerState::Stopped => {
                        log::debug!("{} stopped after {} value(s)", name, emitted);
                        break;
                    }
                }
            }
        })
    }
}

/// Starts a system-clock sequence emitting every `interval` until `cancellation`
/// fires.
///
/// # Errors
/// Returns `StreamError::InvalidInterval` when `interval` is zero.
pub fn start(interval: Duration, cancellation: CancellationToken) -> Result<TimestampStream, StreamError> {
    Ok(PeriodicStreamProducer::new(interval)?.start(cancellation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[derive(Clone)]
    struct ScriptedClock {
        readings: Arc<Mutex<VecDeque<DateTime<Local>>>>,
    }

    impl ScriptedClock {
        fn new(readings: Vec<DateTime<Local>>) -> Self {
            Self {
                readings: Arc::new(Mutex::new(readings.into())),
            }
        }
    }

    impl Clock for ScriptedClock {
        fn now(&self) -> DateTime<Local> {
            self.readings
                .lock()
                .unwrap()
                .pop_front()
                .expect("scripted clock ran out of readings")
        }
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let err = PeriodicStreamProducer::new(Duration::ZERO).unwrap_err();
        assert_eq!(err, StreamError::InvalidInterval(Duration::ZERO));
        assert!(start(Duration::ZERO, CancellationToken::new()).is_err());
    }

    #[test]
    fn test_default_interval_is_five_seconds() {
        let producer = PeriodicStreamProducer::default();
        assert_eq!(producer.interval(), Duration::from_secs(5));
        assert_eq!(producer.name(), "periodic_stream_producer");
        assert_eq!(producer.with_name("ticker").name(), "ticker");
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_value_has_no_initial_delay() {
        let mut ticks = start(Duration::from_secs(5), CancellationToken::new()).unwrap();
        let started = Instant::now();

        assert!(ticks.next().await.is_some());
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_values_are_spaced_by_the_interval() {
        let interval = Duration::from_millis(250);
        let mut ticks = start(interval, CancellationToken::new()).unwrap();

        ticks.next().await.unwrap();
        let after_first = Instant::now();
        ticks.next().await.unwrap();
        let gap = after_first.elapsed();

        assert!(gap >= interval, "gap {:?} shorter than interval", gap);
        assert!(gap < interval + Duration::from_millis(5), "gap {:?} too long", gap);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_waiting_ends_stream_without_value() {
        let token = CancellationToken::new();
        let mut ticks = start(Duration::from_secs(5), token.clone()).unwrap();
        ticks.next().await.unwrap();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let waited = Instant::now();
        assert_eq!(ticks.next().await, None);
        assert!(waited.elapsed() < Duration::from_secs(5));
        // Stopped is terminal.
        assert_eq!(ticks.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_precancelled_token_yields_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let mut ticks = start(Duration::from_secs(5), token).unwrap();

        assert_eq!(ticks.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backward_clock_step_never_decreases_values() {
        let base = Local::now();
        let clock = ScriptedClock::new(vec![
            base,
            base - chrono::Duration::seconds(30),
            base + chrono::Duration::seconds(1),
        ]);
        let producer = PeriodicStreamProducer::new(Duration::from_secs(1))
            .unwrap()
            .with_clock(clock);
        let token = CancellationToken::new();
        let mut ticks = producer.start(token.clone());

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(ticks.next().await.unwrap());
        }
        token.cancel();

        assert_eq!(seen, vec![base, base, base + chrono::Duration::seconds(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_is_read_at_emission_time() {
        let base = Local::now();
        let clock = ScriptedClock::new(vec![base]);
        let producer = PeriodicStreamProducer::default().with_clock(clock.clone());
        let _ticks = producer.start(CancellationToken::new());

        // Nothing is read until the stream is polled.
        assert_eq!(clock.readings.lock().unwrap().len(), 1);
    }
}
