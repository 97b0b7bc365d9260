//! Order Domain Types
//!
//! The vocabulary shared between inbound commands and venue requests.
//! Sides, order types and time-in-force values map to fixed AlphaPoint
//! integer codes.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Venue Order States
// =============================================================================

/// Venue order state reported once the order is completely executed.
pub const ORDER_STATE_FILLED: &str = "filled";

/// Venue order state reported after a successful cancel.
pub const ORDER_STATE_CANCELED: &str = "canceled";

/// Venue order state reported when the venue refuses the order.
pub const ORDER_STATE_REJECTED: &str = "rejected";

// =============================================================================
// Side
// =============================================================================

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Side {
    /// Buy.
    Buy,
    /// Sell.
    Sell,
    /// Short sell.
    Short,
    /// Unrecognized side.
    #[default]
    Unknown,
}

impl Side {
    /// Parse a side name, ignoring case. Unrecognized names map to `Unknown`.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "buy" => Self::Buy,
            "sell" => Self::Sell,
            "short" => Self::Short,
            _ => Self::Unknown,
        }
    }

    /// Venue integer code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Buy => 0,
            Self::Sell => 1,
            Self::Short => 2,
            Self::Unknown => 3,
        }
    }

    /// Venue display name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "Buy",
            Self::Sell => "Sell",
            Self::Short => "Short",
            Self::Unknown => "Unknown",
        }
    }
}

// =============================================================================
// Order Type
// =============================================================================

/// Venue order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OrderType {
    /// Unrecognized order type.
    #[default]
    Unknown,
    /// Market order.
    Market,
    /// Limit order.
    Limit,
    /// Stop market order.
    StopMarket,
    /// Stop limit order.
    StopLimit,
    /// Trailing stop market order.
    TrailingStopMarket,
    /// Trailing stop limit order.
    TrailingStopLimit,
    /// Block trade.
    BlockTrade,
}

impl OrderType {
    /// Parse an order type name, ignoring case.
    ///
    /// Accepts the venue names (`MarketOrder`, `Limit`, `StopMarket`, ...)
    /// and `Market` as a shorthand.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "marketorder" | "market" => Self::Market,
            "limit" => Self::Limit,
            "stopmarket" => Self::StopMarket,
            "stoplimit" => Self::StopLimit,
            "trailingstopmarket" => Self::TrailingStopMarket,
            "trailingstoplimit" => Self::TrailingStopLimit,
            "blocktrade" => Self::BlockTrade,
            _ => Self::Unknown,
        }
    }

    /// Venue integer code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Unknown => 0,
            Self::Market => 1,
            Self::Limit => 2,
            Self::StopMarket => 3,
            Self::StopLimit => 4,
            Self::TrailingStopMarket => 5,
            Self::TrailingStopLimit => 6,
            Self::BlockTrade => 7,
        }
    }

    /// Venue display name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Market => "MarketOrder",
            Self::Limit => "Limit",
            Self::StopMarket => "StopMarket",
            Self::StopLimit => "StopLimit",
            Self::TrailingStopMarket => "TrailingStopMarket",
            Self::TrailingStopLimit => "TrailingStopLimit",
            Self::BlockTrade => "BlockTrade",
        }
    }

    /// Whether the venue expects a limit price for this type.
    #[must_use]
    pub const fn carries_limit_price(self) -> bool {
        matches!(
            self,
            Self::Limit | Self::StopLimit | Self::TrailingStopLimit
        )
    }
}

// =============================================================================
// Time In Force
// =============================================================================

/// Time-in-force instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimeInForce {
    /// Unrecognized value.
    #[default]
    Unknown,
    /// Good till canceled.
    Gtc,
    /// At the opening.
    Opg,
    /// Immediate or cancel.
    Ioc,
    /// Fill or kill.
    Fok,
    /// Good till crossing.
    Gtx,
    /// Good till date.
    Gtd,
}

impl TimeInForce {
    /// Venue integer code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Unknown => 0,
            Self::Gtc => 1,
            Self::Opg => 2,
            Self::Ioc => 3,
            Self::Fok => 4,
            Self::Gtx => 5,
            Self::Gtd => 6,
        }
    }
}

// =============================================================================
// Correlation
// =============================================================================

/// Venue account the gateway trades on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VenueAccount {
    /// Order management system id.
    pub oms_id: i64,
    /// Trading account id.
    pub account_id: i64,
}

/// Correlation record between an internal order and its venue identity.
///
/// Built when the order is submitted, before the venue confirms anything,
/// and never modified afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeInfo {
    /// Venue OMS id.
    pub oms_id: i64,
    /// Venue account id.
    pub account_id: i64,
    /// Internal order id, sent to the venue as the client order id.
    pub order_id: i64,
}

impl TradeInfo {
    /// Create a correlation record for an order on the given account.
    #[must_use]
    pub const fn new(account: VenueAccount, order_id: i64) -> Self {
        Self {
            oms_id: account.oms_id,
            account_id: account.account_id,
            order_id,
        }
    }
}

// =============================================================================
// Commands
// =============================================================================

/// Order submission command received from the internal platform.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmitOrderCommand {
    /// Internal numeric order id.
    pub id: i64,
    /// Internal order reference.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub order_id: String,
    /// Instrument symbol, e.g. `BTCUSD`.
    pub instrument_pair: String,
    /// Order quantity.
    pub quantity: Decimal,
    /// Limit price, when relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    /// Side name (`buy`, `sell`, `short`).
    pub side: String,
    /// Order status at the platform.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub status: String,
    /// Order type name (`MarketOrder`, `Limit`, ...).
    #[serde(rename = "type")]
    pub order_type: String,
    /// Platform client id.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub client_id: String,
    /// Submission date.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub date: String,
    /// Client order id; the key orders are tracked under.
    pub client_order_id: String,
    /// Request-for-quote id.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub request_for_quote_id: String,
    /// Liquidity provider name.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub provider: String,
    /// Free-form notes.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub notes: String,
    /// Settlement chain.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub block_chain: String,
    /// Platform tags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Originating system.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source: String,
}

impl SubmitOrderCommand {
    /// Parsed side.
    #[must_use]
    pub fn side(&self) -> Side {
        Side::from_name(&self.side)
    }

    /// Parsed order type.
    #[must_use]
    pub fn order_type(&self) -> OrderType {
        OrderType::from_name(&self.order_type)
    }

    /// Key the order is tracked under until it reaches a terminal state.
    ///
    /// Falls back to the numeric id when no client order id was supplied.
    #[must_use]
    pub fn tracking_key(&self) -> String {
        if self.client_order_id.is_empty() {
            self.id.to_string()
        } else {
            self.client_order_id.clone()
        }
    }
}

/// Order cancel command received from the internal platform.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderCommand {
    /// Venue order id to cancel.
    pub order_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("buy", Side::Buy, 0 ; "buy lower")]
    #[test_case("Buy", Side::Buy, 0 ; "buy venue case")]
    #[test_case("SELL", Side::Sell, 1 ; "sell upper")]
    #[test_case("short", Side::Short, 2 ; "short")]
    #[test_case("hold", Side::Unknown, 3 ; "unrecognized")]
    fn side_codes(name: &str, side: Side, code: i32) {
        assert_eq!(Side::from_name(name), side);
        assert_eq!(side.code(), code);
    }

    #[test_case("MarketOrder", OrderType::Market, 1)]
    #[test_case("Limit", OrderType::Limit, 2)]
    #[test_case("StopMarket", OrderType::StopMarket, 3)]
    #[test_case("StopLimit", OrderType::StopLimit, 4)]
    #[test_case("TrailingStopMarket", OrderType::TrailingStopMarket, 5)]
    #[test_case("TrailingStopLimit", OrderType::TrailingStopLimit, 6)]
    #[test_case("BlockTrade", OrderType::BlockTrade, 7)]
    #[test_case("Iceberg", OrderType::Unknown, 0)]
    fn order_type_codes(name: &str, order_type: OrderType, code: i32) {
        assert_eq!(OrderType::from_name(name), order_type);
        assert_eq!(order_type.code(), code);
    }

    #[test_case(TimeInForce::Unknown, 0 ; "unknown")]
    #[test_case(TimeInForce::Gtc, 1 ; "gtc")]
    #[test_case(TimeInForce::Opg, 2 ; "opg")]
    #[test_case(TimeInForce::Ioc, 3 ; "ioc")]
    #[test_case(TimeInForce::Fok, 4 ; "fok")]
    #[test_case(TimeInForce::Gtx, 5 ; "gtx")]
    #[test_case(TimeInForce::Gtd, 6 ; "gtd")]
    fn time_in_force_codes(tif: TimeInForce, code: i32) {
        assert_eq!(tif.code(), code);
    }

    #[test]
    fn order_type_round_trips_venue_name() {
        for order_type in [
            OrderType::Market,
            OrderType::Limit,
            OrderType::StopMarket,
            OrderType::StopLimit,
            OrderType::TrailingStopMarket,
            OrderType::TrailingStopLimit,
            OrderType::BlockTrade,
        ] {
            assert_eq!(OrderType::from_name(order_type.as_str()), order_type);
        }
    }

    #[test]
    fn submit_command_decodes_camel_case() {
        let json = r#"{
            "id": 42,
            "instrumentPair": "BTCUSD",
            "quantity": "1.5",
            "price": "100.25",
            "side": "buy",
            "type": "Limit",
            "clientOrderId": "abc-1",
            "provider": "kiiex",
            "tags": ["otc"]
        }"#;

        let cmd: SubmitOrderCommand = serde_json::from_str(json).unwrap();
        assert_eq!(cmd.id, 42);
        assert_eq!(cmd.instrument_pair, "BTCUSD");
        assert_eq!(cmd.quantity, Decimal::new(15, 1));
        assert_eq!(cmd.price, Some(Decimal::new(10025, 2)));
        assert_eq!(cmd.side(), Side::Buy);
        assert_eq!(cmd.order_type(), OrderType::Limit);
        assert_eq!(cmd.tracking_key(), "abc-1");
        assert_eq!(cmd.tags, vec!["otc".to_string()]);
    }

    #[test]
    fn tracking_key_falls_back_to_numeric_id() {
        let cmd = SubmitOrderCommand {
            id: 7,
            ..Default::default()
        };
        assert_eq!(cmd.tracking_key(), "7");
    }

    #[test]
    fn trade_info_copies_account() {
        let account = VenueAccount {
            oms_id: 1,
            account_id: 9,
        };
        let info = TradeInfo::new(account, 55);
        assert_eq!(info.oms_id, 1);
        assert_eq!(info.account_id, 9);
        assert_eq!(info.order_id, 55);
    }
}
