//! Reconciliation Tracker
//!
//! Keeps the set of orders that have been submitted but not yet seen in a
//! terminal state, keyed by the internal tracking key, and periodically asks
//! the venue for the status of each one. Status replies come back through
//! the order processor as `AttemptedCancel` and `FillArrived` events, which
//! remove entries here.
//!
//! All mutations take the write lock; polling copies the set under the read
//! lock and issues queries without holding it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use crate::application::ports::OrderStatusQuery;
use crate::domain::events::{
    AttemptedCancel, DomainEvent, EventKind, FillArrived, OrderCanceled, OrderSubmitted,
};
use crate::domain::order::TradeInfo;
use crate::infrastructure::eventbus::SharedEventBus;
use crate::infrastructure::metrics::{self, QueryOutcome};

/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);

/// Result of one polling pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    /// Queries issued.
    pub queried: usize,
    /// Queries that failed to send.
    pub failed: usize,
    /// When the pass finished.
    pub completed_at: DateTime<Utc>,
}

/// In-flight order set with periodic venue reconciliation.
pub struct ReconciliationTracker {
    trades: RwLock<HashMap<String, TradeInfo>>,
    status: Arc<dyn OrderStatusQuery>,
    events: SharedEventBus,
    poll_interval: Duration,
    last_poll: RwLock<Option<PollSummary>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ReconciliationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationTracker")
            .field("tracked", &self.trade_count())
            .field("poll_interval", &self.poll_interval)
            .field("stopped", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ReconciliationTracker {
    /// Create a tracker and subscribe it to order events.
    ///
    /// A zero `poll_interval` is replaced by [`DEFAULT_POLL_INTERVAL`].
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(
        status: Arc<dyn OrderStatusQuery>,
        events: SharedEventBus,
        poll_interval: Duration,
    ) -> Arc<Self> {
        let poll_interval = if poll_interval.is_zero() {
            tracing::warn!("Zero poll interval, using the default");
            DEFAULT_POLL_INTERVAL
        } else {
            poll_interval
        };

        let tracker = Arc::new(Self {
            trades: RwLock::new(HashMap::new()),
            status,
            events: Arc::clone(&events),
            poll_interval,
            last_poll: RwLock::new(None),
            cancel: CancellationToken::new(),
        });

        for kind in [
            EventKind::OrderSubmitted,
            EventKind::AttemptedCancel,
            EventKind::FillArrived,
        ] {
            let weak = Arc::downgrade(&tracker);
            events.subscribe(kind, move |event| {
                if let Some(tracker) = weak.upgrade() {
                    tracker.handle_event(event);
                }
            });
        }

        tracker
    }

    /// Apply one event to the tracked set.
    pub fn handle_event(&self, event: &DomainEvent) {
        match event {
            DomainEvent::OrderSubmitted(submitted) => self.on_submitted(submitted),
            DomainEvent::AttemptedCancel(cancel) => self.on_attempted_cancel(*cancel),
            DomainEvent::FillArrived(fill) => self.on_fill(fill),
            DomainEvent::OrderCanceled(_) => {}
        }
    }

    fn on_submitted(&self, event: &OrderSubmitted) {
        tracing::info!(key = %event.order_id, trade_info = ?event.trade_info, "Tracking order");

        let count = {
            let mut trades = self.trades.write();
            trades.insert(event.order_id.clone(), event.trade_info);
            trades.len()
        };
        metrics::set_tracked_orders(count);
    }

    fn on_attempted_cancel(&self, event: AttemptedCancel) {
        tracing::info!(order_id = event.order_id, "Attempted cancel");

        if event.order_id == 0 {
            return;
        }

        let Some(key) = self.remove_where(|trade| trade.order_id == event.order_id) else {
            return;
        };

        self.events
            .try_publish(OrderCanceled { order_id: key }.into());
    }

    fn on_fill(&self, event: &FillArrived) {
        tracing::info!(
            order_id = %event.order_id,
            fill_id = %event.fill_id,
            leaves = %event.quantity_leaves,
            "Fill arrived"
        );

        let leaves = match event.quantity_leaves.trim().parse::<Decimal>() {
            Ok(leaves) => leaves,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    value = %event.quantity_leaves,
                    "Failed to parse quantity leaves"
                );
                return;
            }
        };

        if !leaves.is_zero() {
            return;
        }

        if !event.order_id.is_empty() {
            let remaining = {
                let mut trades = self.trades.write();
                trades.remove(&event.order_id).map(|_| trades.len())
            };
            if let Some(remaining) = remaining {
                metrics::set_tracked_orders(remaining);
                tracing::info!(key = %event.order_id, "Order fully filled");
                return;
            }
        }

        // Venue echoes the internal id as ClientOrderId.
        let candidates: Vec<i64> = [&event.client_order_id, &event.fill_id]
            .into_iter()
            .filter_map(|id| id.trim().parse().ok())
            .filter(|&id| id != 0)
            .collect();
        if candidates.is_empty() {
            return;
        }

        if let Some(key) = self.remove_where(|trade| candidates.contains(&trade.order_id)) {
            tracing::info!(key = %key, "Order fully filled");
        }
    }

    /// Remove the first entry matching `predicate`, returning its key.
    fn remove_where<P>(&self, predicate: P) -> Option<String>
    where
        P: Fn(&TradeInfo) -> bool,
    {
        let (key, count) = {
            let mut trades = self.trades.write();
            let key = trades
                .iter()
                .find(|(_, trade)| predicate(trade))
                .map(|(key, _)| key.clone())?;
            trades.remove(&key);
            (key, trades.len())
        };

        metrics::set_tracked_orders(count);
        tracing::debug!(key = %key, remaining = count, "Order no longer tracked");
        Some(key)
    }

    // =========================================================================
    // Polling
    // =========================================================================

    /// Issue one status query per tracked order.
    ///
    /// A failed query is logged and counted; it neither stops the pass nor
    /// removes the entry.
    pub async fn poll_once(&self) -> PollSummary {
        let snapshot: Vec<(String, TradeInfo)> = self
            .trades
            .read()
            .iter()
            .map(|(key, trade)| (key.clone(), *trade))
            .collect();

        let mut failed = 0;
        for (key, trade) in &snapshot {
            tracing::debug!(key = %key, ?trade, "Requesting status of trade");
            match self.status.get_trade_status(trade).await {
                Ok(()) => metrics::record_status_query(QueryOutcome::Sent),
                Err(e) => {
                    failed += 1;
                    metrics::record_status_query(QueryOutcome::Failed);
                    tracing::error!(key = %key, error = %e, "Failed to get trade status");
                }
            }
        }

        let summary = PollSummary {
            queried: snapshot.len(),
            failed,
            completed_at: Utc::now(),
        };
        *self.last_poll.write() = Some(summary);
        summary
    }

    /// Poll on a fixed interval until [`stop`](Self::stop) is called.
    ///
    /// The first poll happens one interval after start. Returns immediately
    /// if the tracker was already stopped.
    pub async fn run(self: Arc<Self>) {
        if self.cancel.is_cancelled() {
            return;
        }

        tracing::info!(interval = ?self.poll_interval, "Starting trade status polling");

        let start = tokio::time::Instant::now() + self.poll_interval;
        let mut ticker = tokio::time::interval_at(start, self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let summary = self.poll_once().await;
                    if summary.queried > 0 {
                        tracing::info!(
                            queried = summary.queried,
                            failed = summary.failed,
                            "Trade status poll complete"
                        );
                    }
                }
            }
        }

        tracing::info!("Trade status polling stopped");
    }

    /// Stop polling. Idempotent and safe before [`run`](Self::run).
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Copy of the tracked set.
    #[must_use]
    pub fn tracked_trades(&self) -> HashMap<String, TradeInfo> {
        self.trades.read().clone()
    }

    /// Number of tracked orders.
    #[must_use]
    pub fn trade_count(&self) -> usize {
        self.trades.read().len()
    }

    /// Summary of the most recent poll.
    #[must_use]
    pub fn last_poll(&self) -> Option<PollSummary> {
        *self.last_poll.read()
    }

    /// Configured poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}
