//! Domain Events
//!
//! A closed set of immutable event records. Subscribers register against an
//! [`EventKind`], the compile-time discriminant of [`DomainEvent`].
//!
//! Events are published optimistically: `OrderSubmitted` fires at the moment
//! of intent and `OrderCanceled` may be emitted more than once for the same
//! order. Consumers must be idempotent.

use serde::{Deserialize, Serialize};

use crate::domain::order::TradeInfo;

/// Execution type carried by every fill.
pub const EXECUTION_TYPE_TRADE: &str = "trade";

// =============================================================================
// Event Records
// =============================================================================

/// An order was handed to the venue (not yet confirmed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSubmitted {
    /// Correlation record.
    pub trade_info: TradeInfo,
    /// Internal key the order is tracked under.
    pub order_id: String,
}

/// The venue reported an order as canceled or rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptedCancel {
    /// Order id reported by the venue. Zero when the venue gave none.
    pub order_id: i64,
}

/// An order reached a terminal cancel at the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCanceled {
    /// Internal order key.
    pub order_id: String,
}

/// Execution report translated from a venue order.
///
/// Numeric fields are carried as strings in the format downstream
/// consumers expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillArrived {
    /// Internal order id.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub order_id: String,
    /// Fill id (venue order id).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fill_id: String,
    /// Venue-side order id.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub external_order_id: String,
    /// Instrument symbol; empty when the venue id could not be resolved.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instrument_pair: String,
    /// Executed quantity.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub quantity_filled: String,
    /// Cumulative executed quantity.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub quantity_cumulative: String,
    /// Quantity still open.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub quantity_leaves: String,
    /// Execution price.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub price: String,
    /// Side, lower-cased.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub side: String,
    /// Order state, lower-cased.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    /// Order type, lower-cased.
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub order_type: String,
    /// Venue account.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_id: String,
    /// Venue receive time.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub date: String,
    /// Client order id echoed by the venue.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_order_id: String,
    /// Request-for-quote id.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub request_for_quote_id: String,
    /// Venue request-for-quote id.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub external_request_for_quote_id: String,
    /// Counterparty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provider: String,
    /// Venue OMS.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    /// Source classification.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_type: String,
    /// Always [`EXECUTION_TYPE_TRADE`].
    pub execution_type: String,
}

impl Default for FillArrived {
    fn default() -> Self {
        Self {
            order_id: String::new(),
            fill_id: String::new(),
            external_order_id: String::new(),
            instrument_pair: String::new(),
            quantity_filled: String::new(),
            quantity_cumulative: String::new(),
            quantity_leaves: String::new(),
            price: String::new(),
            side: String::new(),
            status: String::new(),
            order_type: String::new(),
            client_id: String::new(),
            date: String::new(),
            client_order_id: String::new(),
            request_for_quote_id: String::new(),
            external_request_for_quote_id: String::new(),
            provider: String::new(),
            source: String::new(),
            source_type: String::new(),
            execution_type: EXECUTION_TYPE_TRADE.to_string(),
        }
    }
}

// =============================================================================
// Event Union
// =============================================================================

/// Every event the gateway publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    /// See [`OrderSubmitted`].
    OrderSubmitted(OrderSubmitted),
    /// See [`AttemptedCancel`].
    AttemptedCancel(AttemptedCancel),
    /// See [`FillArrived`].
    FillArrived(Box<FillArrived>),
    /// See [`OrderCanceled`].
    OrderCanceled(OrderCanceled),
}

/// Discriminant used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`DomainEvent::OrderSubmitted`].
    OrderSubmitted,
    /// [`DomainEvent::AttemptedCancel`].
    AttemptedCancel,
    /// [`DomainEvent::FillArrived`].
    FillArrived,
    /// [`DomainEvent::OrderCanceled`].
    OrderCanceled,
}

impl EventKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrderSubmitted => "order_submitted",
            Self::AttemptedCancel => "attempted_cancel",
            Self::FillArrived => "fill_arrived",
            Self::OrderCanceled => "order_canceled",
        }
    }
}

impl DomainEvent {
    /// Discriminant of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::OrderSubmitted(_) => EventKind::OrderSubmitted,
            Self::AttemptedCancel(_) => EventKind::AttemptedCancel,
            Self::FillArrived(_) => EventKind::FillArrived,
            Self::OrderCanceled(_) => EventKind::OrderCanceled,
        }
    }
}

impl From<OrderSubmitted> for DomainEvent {
    fn from(event: OrderSubmitted) -> Self {
        Self::OrderSubmitted(event)
    }
}

impl From<AttemptedCancel> for DomainEvent {
    fn from(event: AttemptedCancel) -> Self {
        Self::AttemptedCancel(event)
    }
}

impl From<FillArrived> for DomainEvent {
    fn from(event: FillArrived) -> Self {
        Self::FillArrived(Box::new(event))
    }
}

impl From<OrderCanceled> for DomainEvent {
    fn from(event: OrderCanceled) -> Self {
        Self::OrderCanceled(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let submitted: DomainEvent = OrderSubmitted {
            trade_info: TradeInfo {
                oms_id: 1,
                account_id: 2,
                order_id: 3,
            },
            order_id: "k".to_string(),
        }
        .into();
        assert_eq!(submitted.kind(), EventKind::OrderSubmitted);

        let cancel: DomainEvent = AttemptedCancel { order_id: 3 }.into();
        assert_eq!(cancel.kind(), EventKind::AttemptedCancel);

        let fill: DomainEvent = FillArrived::default().into();
        assert_eq!(fill.kind(), EventKind::FillArrived);

        let canceled: DomainEvent = OrderCanceled {
            order_id: "k".to_string(),
        }
        .into();
        assert_eq!(canceled.kind(), EventKind::OrderCanceled);
    }

    #[test]
    fn fill_serializes_execution_type_and_omits_empty_fields() {
        let fill = FillArrived {
            order_id: "42".to_string(),
            quantity_leaves: "0.000000".to_string(),
            order_type: "limit".to_string(),
            ..Default::default()
        };

        let value = serde_json::to_value(&fill).unwrap();
        assert_eq!(value["executionType"], "trade");
        assert_eq!(value["orderId"], "42");
        assert_eq!(value["quantityLeaves"], "0.000000");
        assert_eq!(value["type"], "limit");
        assert!(value.get("fillId").is_none());
        assert!(value.get("instrumentPair").is_none());
    }

    #[test]
    fn order_canceled_wire_shape() {
        let event = OrderCanceled {
            order_id: "abc".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"orderId":"abc"}"#
        );
    }
}
