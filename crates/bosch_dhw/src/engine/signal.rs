//! Publish/subscribe signal bus.
//!
//! Integrations own a bus for their own signal type and hand out
//! [`Subscription`]s to the entities they create. A subscription runs its
//! handler on a background task until it is dropped.

use std::future::Future;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::warn;

/// Default channel capacity for signal subscriptions
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Fan-out channel delivering every signal to every live subscriber.
#[derive(Debug, Clone)]
pub struct SignalBus<S> {
    tx: broadcast::Sender<S>,
}

impl<S: Clone + Send + std::fmt::Debug + 'static> SignalBus<S> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Send a signal to all subscribers, returning how many received it.
    pub fn send(&self, signal: S) -> usize {
        debug!(?signal, "Sending signal");
        // No receivers is not an error: nothing has subscribed yet.
        self.tx.send(signal).unwrap_or(0)
    }

    /// Raw receiver for callers that drive their own loop.
    pub fn subscribe(&self) -> broadcast::Receiver<S> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Run `handler` for every signal until the returned subscription is dropped.
    pub fn connect<F, Fut>(&self, mut handler: F) -> Subscription
    where
        F: FnMut(S) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut rx = self.tx.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(signal) => handler(signal).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Signal subscriber lagged, skipped {} signals", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Subscription { handle }
    }
}

impl<S: Clone + Send + std::fmt::Debug + 'static> Default for SignalBus<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Live connection to a [`SignalBus`]. Dropping it disconnects the handler.
#[derive(Debug)]
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }

    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum TestSignal {
        Refresh,
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_send_without_subscribers() {
        let bus = SignalBus::new();
        assert_eq!(bus.send(TestSignal::Refresh), 0);
    }

    #[tokio::test]
    async fn test_fan_out_to_every_subscriber() {
        let bus = SignalBus::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        let _a = bus.connect(move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        let counter = second.clone();
        let _b = bus.connect(move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert_eq!(bus.send(TestSignal::Refresh), 2);
        settle().await;

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drop_disconnects() {
        let bus = SignalBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let subscription = bus.connect(move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert!(subscription.is_active());
        assert_eq!(bus.subscriber_count(), 1);

        subscription.unsubscribe();
        settle().await;

        assert_eq!(bus.subscriber_count(), 0);
        bus.send(TestSignal::Refresh);
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_raw_subscribe() {
        let bus = SignalBus::new();
        let mut rx = bus.subscribe();
        bus.send(TestSignal::Refresh);
        assert_eq!(rx.recv().await.unwrap(), TestSignal::Refresh);
    }
}
