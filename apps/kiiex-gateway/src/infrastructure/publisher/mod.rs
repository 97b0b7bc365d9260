//! Outbound Event Publication
//!
//! Forwards fills and cancels from the event bus to the platform through an
//! [`OutboundSink`]. Bus handlers only enqueue; a single delivery task
//! drains the queue, so messages reach the sink in the order they were
//! enqueued.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{OutboundMessage, OutboundSink, SinkError};
use crate::domain::events::{DomainEvent, EventKind};
use crate::infrastructure::eventbus::EventBus;

/// Routing key for fills.
pub const ROUTING_FILLS_CREATED: &str = "inbound.fills.creates";

/// Routing key for terminal cancels.
pub const ROUTING_ORDERS_CANCELED: &str = "returned.orders.canceled";

/// Priority attached to cancel messages.
pub const CANCELED_PRIORITY: u8 = 10;

/// Default bound on messages awaiting delivery.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 1024;

/// Build the outbound message for an event, if it is one the platform
/// receives.
///
/// Fills and cancels without an order id are dropped.
#[must_use]
pub fn outbound_message(event: &DomainEvent) -> Option<OutboundMessage> {
    let (routing_key, priority, order_id, body) = match event {
        DomainEvent::FillArrived(fill) => (
            ROUTING_FILLS_CREATED,
            None,
            &fill.order_id,
            serde_json::to_string(fill.as_ref()),
        ),
        DomainEvent::OrderCanceled(canceled) => (
            ROUTING_ORDERS_CANCELED,
            Some(CANCELED_PRIORITY),
            &canceled.order_id,
            serde_json::to_string(canceled),
        ),
        DomainEvent::OrderSubmitted(_) | DomainEvent::AttemptedCancel(_) => return None,
    };

    if order_id.is_empty() {
        tracing::error!(event = event.kind().as_str(), "Event without an order id, not published");
        return None;
    }

    match body {
        Ok(body) => Some(OutboundMessage {
            routing_key,
            body,
            priority,
        }),
        Err(e) => {
            tracing::error!(event = event.kind().as_str(), error = %e, "Failed to encode event");
            None
        }
    }
}

/// Bridges the event bus to an outbound sink.
pub struct EventPublisher {
    queue: mpsc::Sender<OutboundMessage>,
    delivered: AtomicU64,
    failed: AtomicU64,
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("delivered", &self.delivered())
            .field("failed", &self.failed())
            .finish_non_exhaustive()
    }
}

impl EventPublisher {
    /// Subscribe to fills and cancels and start the delivery task.
    ///
    /// On cancellation the task delivers whatever is already queued, then
    /// exits. Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start(
        events: &EventBus,
        sink: Arc<dyn OutboundSink>,
        capacity: usize,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let (queue, rx) = mpsc::channel(capacity.max(1));
        let publisher = Arc::new(Self {
            queue,
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        });

        for kind in [EventKind::FillArrived, EventKind::OrderCanceled] {
            let weak = Arc::downgrade(&publisher);
            events.subscribe(kind, move |event| {
                if let Some(publisher) = weak.upgrade() {
                    publisher.enqueue(event);
                }
            });
        }

        tokio::spawn(Arc::clone(&publisher).deliver_loop(rx, sink, cancel));
        publisher
    }

    fn enqueue(&self, event: &DomainEvent) {
        let Some(message) = outbound_message(event) else {
            return;
        };

        match self.queue.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    routing_key = message.routing_key,
                    "Outbound queue full, message dropped"
                );
            }
            Err(TrySendError::Closed(message)) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    routing_key = message.routing_key,
                    "Publisher stopped, message dropped"
                );
            }
        }
    }

    async fn deliver_loop(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<OutboundMessage>,
        sink: Arc<dyn OutboundSink>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                message = rx.recv() => match message {
                    Some(message) => self.deliver(sink.as_ref(), message).await,
                    None => break,
                },
                () = cancel.cancelled() => {
                    rx.close();
                    while let Some(message) = rx.recv().await {
                        self.deliver(sink.as_ref(), message).await;
                    }
                    break;
                }
            }
        }
        tracing::info!(
            delivered = self.delivered(),
            failed = self.failed(),
            "Event publisher stopped"
        );
    }

    async fn deliver(&self, sink: &dyn OutboundSink, message: OutboundMessage) {
        let routing_key = message.routing_key;
        match sink.deliver(message).await {
            Ok(()) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(routing_key, "Event published");
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(routing_key, error = %e, "Failed to publish event");
            }
        }
    }

    /// Messages accepted by the sink.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Messages dropped or refused.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Sink that writes each message to the log.
///
/// Stands in for a broker transport when none is wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl OutboundSink for TracingSink {
    async fn deliver(&self, message: OutboundMessage) -> Result<(), SinkError> {
        tracing::info!(
            routing_key = message.routing_key,
            priority = message.priority,
            body = %message.body,
            "Outbound event"
        );
        Ok(())
    }
}
