use chrono::{DateTime, Local};
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use super::clock::Clock;
use super::periodic::{PeriodicStreamProducer, TimestampStream};

/// # Subscription
///
/// One consumer's attachment to a freshly started timestamp sequence.
///
/// The subscription owns a child of the caller's token, so cancelling the parent
/// (server shutdown) stops every subscription, while cancelling one
/// subscription leaves its siblings and the parent untouched. Dropping a
/// subscription cancels it.
pub struct Subscription {
    id: usize,
    cancellation: CancellationToken,
    ticks: TimestampStream,
}

impl Subscription {
    /// Starts a new sequence from `producer` for consumer `id`.
    pub fn open<C: Clock>(id: usize, producer: &PeriodicStreamProducer<C>, parent: &CancellationToken) -> Self {
        let cancellation = parent.child_token();
        let ticks = producer.start(cancellation.clone());
        log::debug!("Subscription {} opened on {}", id, producer.name());
        Self {
            id,
            cancellation,
            ticks,
        }
    }

    /// The consumer id this subscription was opened for.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Requests termination. The sequence ends at its next checkpoint.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Whether cancellation has been requested, directly or through the parent.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Pulls the next timestamp, or `None` once the sequence has stopped.
    pub async fn next_tick(&mut self) -> Option<DateTime<Local>> {
        self.ticks.next().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.cancellation.is_cancelled() {
            self.cancellation.cancel();
            log::debug!("Subscription {} dropped", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn producer() -> PeriodicStreamProducer {
        PeriodicStreamProducer::new(Duration::from_millis(100)).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_only_that_subscription() {
        let parent = CancellationToken::new();
        let producer = producer();
        let mut first = Subscription::open(1, &producer, &parent);
        let mut second = Subscription::open(2, &producer, &parent);

        assert!(first.next_tick().await.is_some());
        assert!(second.next_tick().await.is_some());

        first.cancel();
        assert_eq!(first.next_tick().await, None);
        assert!(!parent.is_cancelled());
        assert!(second.next_tick().await.is_some());
        assert_eq!(second.id(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_reaches_every_subscription() {
        let parent = CancellationToken::new();
        let producer = producer();
        let mut first = Subscription::open(1, &producer, &parent);
        let mut second = Subscription::open(2, &producer, &parent);
        first.next_tick().await.unwrap();
        second.next_tick().await.unwrap();

        parent.cancel();

        assert!(first.is_cancelled() && second.is_cancelled());
        assert_eq!(first.next_tick().await, None);
        assert_eq!(second.next_tick().await, None);
    }

    #[test]
    fn test_drop_cancels_child_token_only() {
        let parent = CancellationToken::new();
        let subscription = Subscription::open(7, &producer(), &parent);
        let token = subscription.cancellation.clone();

        drop(subscription);

        assert!(token.is_cancelled());
        assert!(!parent.is_cancelled());
    }
}
