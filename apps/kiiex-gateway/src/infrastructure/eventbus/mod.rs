//! In-Process Event Bus
//!
//! Typed publish/subscribe over [`DomainEvent`]. Subscribers register for
//! one [`EventKind`]; every publish of that kind reaches each of them once.
//!
//! # Dispatch
//!
//! Each subscriber owns a bounded queue drained by a single dispatcher task,
//! so a slow subscriber applies backpressure instead of spawning unbounded
//! work:
//!
//! - `publish`: async, waits for queue capacity
//! - `try_publish`: for synchronous callers; drops the event for a
//!   subscriber whose queue is full
//! - `publish_sync`: runs every handler inline and returns after the last
//!   one finished
//!
//! A panicking handler is logged and never affects other subscribers or its
//! own dispatcher.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::domain::events::{DomainEvent, EventKind};
use crate::infrastructure::metrics;

/// Default per-subscriber queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Subscriber callback.
pub type EventHandler = Arc<dyn Fn(&DomainEvent) + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Event bus configuration.
#[derive(Debug, Clone, Copy)]
pub struct EventBusConfig {
    /// Capacity of each subscriber queue.
    pub queue_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

struct Subscriber {
    id: SubscriptionId,
    handler: EventHandler,
    queue: mpsc::Sender<DomainEvent>,
}

/// Shared event bus.
pub type SharedEventBus = Arc<EventBus>;

/// Typed publish/subscribe hub.
pub struct EventBus {
    config: EventBusConfig,
    subscribers: RwLock<HashMap<EventKind, Vec<Subscriber>>>,
    next_id: AtomicU64,
    cancel: CancellationToken,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("config", &self.config)
            .field("subscribers", &self.total_subscribers())
            .finish_non_exhaustive()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

impl EventBus {
    /// Create an event bus.
    #[must_use]
    pub fn new(config: EventBusConfig) -> Self {
        Self {
            config: EventBusConfig {
                queue_capacity: config.queue_capacity.max(1),
            },
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Register a handler for one event kind.
    ///
    /// Spawns the subscriber's dispatcher task, so this must be called from
    /// within a Tokio runtime.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&DomainEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handler: EventHandler = Arc::new(handler);
        let (queue, mut rx) = mpsc::channel::<DomainEvent>(self.config.queue_capacity);

        let dispatch_handler = Arc::clone(&handler);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    event = rx.recv() => match event {
                        Some(event) => invoke(&dispatch_handler, &event, id),
                        None => break,
                    },
                }
            }
            tracing::trace!(subscription = id.0, "Event dispatcher stopped");
        });

        self.subscribers
            .write()
            .entry(kind)
            .or_default()
            .push(Subscriber { id, handler, queue });

        tracing::debug!(event = kind.as_str(), subscription = id.0, "Subscribed");
        id
    }

    /// Remove a subscription. Events already queued are still delivered.
    ///
    /// Returns `false` if the id was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        for list in subscribers.values_mut() {
            if let Some(position) = list.iter().position(|s| s.id == id) {
                list.remove(position);
                return true;
            }
        }
        false
    }

    /// Queue an event for every subscriber of its kind, waiting for
    /// capacity.
    ///
    /// Returns the number of subscribers reached. Zero subscribers is not an
    /// error.
    pub async fn publish(&self, event: DomainEvent) -> usize {
        let kind = event.kind();
        let queues = self.queues(kind);

        let mut delivered = 0;
        for (id, queue) in queues {
            if queue.send(event.clone()).await.is_ok() {
                delivered += 1;
            } else {
                tracing::warn!(
                    event = kind.as_str(),
                    subscription = id.0,
                    "Subscriber dispatcher gone, event not delivered"
                );
            }
        }

        metrics::record_event_published(kind, delivered);
        delivered
    }

    /// Queue an event without waiting.
    ///
    /// A subscriber whose queue is full misses this event; the drop is
    /// logged and counted.
    pub fn try_publish(&self, event: DomainEvent) -> usize {
        let kind = event.kind();
        let queues = self.queues(kind);

        let mut delivered = 0;
        for (id, queue) in queues {
            match queue.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        event = kind.as_str(),
                        subscription = id.0,
                        capacity = self.config.queue_capacity,
                        "Subscriber queue full, event dropped"
                    );
                    metrics::record_event_dropped(kind);
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::warn!(
                        event = kind.as_str(),
                        subscription = id.0,
                        "Subscriber dispatcher gone, event not delivered"
                    );
                }
            }
        }

        metrics::record_event_published(kind, delivered);
        delivered
    }

    /// Run every handler for the event inline, in subscription order.
    ///
    /// Returns once all handlers have completed.
    pub fn publish_sync(&self, event: &DomainEvent) -> usize {
        let kind = event.kind();
        let handlers: Vec<(SubscriptionId, EventHandler)> = self
            .subscribers
            .read()
            .get(&kind)
            .map(|list| {
                list.iter()
                    .map(|s| (s.id, Arc::clone(&s.handler)))
                    .collect()
            })
            .unwrap_or_default();

        for (id, handler) in &handlers {
            invoke(handler, event, *id);
        }

        metrics::record_event_published(kind, handlers.len());
        handlers.len()
    }

    /// Number of subscribers for a kind.
    #[must_use]
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers.read().get(&kind).map_or(0, Vec::len)
    }

    /// Whether a kind has any subscriber.
    #[must_use]
    pub fn has_subscribers(&self, kind: EventKind) -> bool {
        self.subscriber_count(kind) > 0
    }

    /// Total subscribers across all kinds.
    #[must_use]
    pub fn total_subscribers(&self) -> usize {
        self.subscribers.read().values().map(Vec::len).sum()
    }

    /// Stop all dispatchers and drop every subscription.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.subscribers.write().clear();
        tracing::debug!("Event bus shut down");
    }

    fn queues(&self, kind: EventKind) -> Vec<(SubscriptionId, mpsc::Sender<DomainEvent>)> {
        self.subscribers
            .read()
            .get(&kind)
            .map(|list| list.iter().map(|s| (s.id, s.queue.clone())).collect())
            .unwrap_or_default()
    }
}

fn invoke(handler: &EventHandler, event: &DomainEvent, id: SubscriptionId) {
    if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
        tracing::error!(
            event = event.kind().as_str(),
            subscription = id.0,
            "Event handler panicked"
        );
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::time::Duration;

    use super::*;
    use crate::domain::events::{AttemptedCancel, OrderCanceled};

    fn cancel_event(order_id: i64) -> DomainEvent {
        AttemptedCancel { order_id }.into()
    }

    async fn wait_for(counter: &AtomicUsize, expected: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while counter.load(Ordering::SeqCst) < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscriber was not invoked in time");
    }

    #[tokio::test]
    async fn every_subscriber_receives_each_publish_once() {
        let bus = EventBus::default();
        let counters: Vec<Arc<AtomicUsize>> =
            (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();

        for counter in &counters {
            let counter = Arc::clone(counter);
            bus.subscribe(EventKind::AttemptedCancel, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(bus.publish(cancel_event(1)).await, 3);

        for counter in &counters {
            wait_for(counter, 1).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        for counter in &counters {
            assert_eq!(counter.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(cancel_event(1)).await, 0);
        assert_eq!(bus.try_publish(cancel_event(1)), 0);
        assert_eq!(bus.publish_sync(&cancel_event(1)), 0);
        assert!(!bus.has_subscribers(EventKind::AttemptedCancel));
    }

    #[tokio::test]
    async fn publish_sync_returns_after_handlers_complete() {
        let bus = EventBus::default();
        let done = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&done);
        bus.subscribe(EventKind::AttemptedCancel, move |_| {
            std::thread::sleep(Duration::from_millis(20));
            flag.store(true, Ordering::SeqCst);
        });

        assert_eq!(bus.publish_sync(&cancel_event(1)), 1);
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn panicking_handler_does_not_stop_others() {
        let bus = EventBus::default();
        let counter = Arc::new(AtomicUsize::new(0));

        bus.subscribe(EventKind::AttemptedCancel, |_| panic!("handler failure"));
        let seen = Arc::clone(&counter);
        bus.subscribe(EventKind::AttemptedCancel, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish_sync(&cancel_event(1));
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        bus.publish(cancel_event(2)).await;
        bus.publish(cancel_event(3)).await;
        wait_for(&counter, 3).await;
    }

    #[tokio::test]
    async fn subscribers_only_see_their_kind() {
        let bus = EventBus::default();
        let counter = Arc::new(AtomicUsize::new(0));

        let seen = Arc::clone(&counter);
        bus.subscribe(EventKind::OrderCanceled, move |event| {
            assert!(matches!(event, DomainEvent::OrderCanceled(_)));
            seen.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(cancel_event(1)).await;
        bus.publish(
            OrderCanceled {
                order_id: "a".to_string(),
            }
            .into(),
        )
        .await;

        wait_for(&counter, 1).await;
        assert_eq!(bus.subscriber_count(EventKind::OrderCanceled), 1);
        assert_eq!(bus.subscriber_count(EventKind::AttemptedCancel), 0);
    }

    #[tokio::test]
    async fn try_publish_drops_when_queue_is_full() {
        // Current-thread runtime: the dispatcher cannot drain until we yield.
        let bus = EventBus::new(EventBusConfig { queue_capacity: 1 });
        bus.subscribe(EventKind::AttemptedCancel, |_| {});

        assert_eq!(bus.try_publish(cancel_event(1)), 1);
        assert_eq!(bus.try_publish(cancel_event(2)), 0);
    }

    #[tokio::test]
    async fn unsubscribe_removes_handler() {
        let bus = EventBus::default();
        let id = bus.subscribe(EventKind::FillArrived, |_| {});
        bus.subscribe(EventKind::FillArrived, |_| {});

        assert_eq!(bus.subscriber_count(EventKind::FillArrived), 2);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count(EventKind::FillArrived), 1);
    }

    #[tokio::test]
    async fn shutdown_clears_subscriptions() {
        let bus = EventBus::default();
        bus.subscribe(EventKind::FillArrived, |_| {});
        bus.shutdown();
        assert_eq!(bus.total_subscribers(), 0);
        assert_eq!(bus.publish(cancel_event(1)).await, 0);
    }
}
