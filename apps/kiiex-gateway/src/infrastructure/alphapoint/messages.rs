//! AlphaPoint Request and Response Payloads
//!
//! Payloads carried inside the frame's `o` field. Field names follow the
//! venue's mixed casing exactly (`OMSId` on some requests, `omsId` on
//! others).
//!
//! Response structs default every missing or `null` field so partial venue
//! payloads still decode.

use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// Operation Names
// =============================================================================

/// `AuthenticateUser`.
pub const AUTHENTICATE_USER: &str = "AuthenticateUser";
/// `LogOut`.
pub const LOG_OUT: &str = "LogOut";
/// `SendOrder`.
pub const SEND_ORDER: &str = "SendOrder";
/// `CancelOrder`.
pub const CANCEL_ORDER: &str = "CancelOrder";
/// `CancelAllOrders`.
pub const CANCEL_ALL_ORDERS: &str = "CancelAllOrders";
/// `GetOrderStatus`.
pub const GET_ORDER_STATUS: &str = "GetOrderStatus";
/// `GetInstruments`.
pub const GET_INSTRUMENTS: &str = "GetInstruments";
/// `GetProducts`.
pub const GET_PRODUCTS: &str = "GetProducts";
/// `GetUserAccounts`.
pub const GET_USER_ACCOUNTS: &str = "GetUserAccounts";

// =============================================================================
// Requests
// =============================================================================

/// `SendOrder` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendOrderRequest {
    /// Venue instrument id.
    #[serde(rename = "InstrumentId")]
    pub instrument_id: i64,
    /// OMS id.
    #[serde(rename = "OMSId")]
    pub oms_id: i64,
    /// Account id.
    #[serde(rename = "AccountId")]
    pub account_id: i64,
    /// Time-in-force code.
    #[serde(rename = "TimeInForce")]
    pub time_in_force: i32,
    /// Client order id.
    #[serde(rename = "ClientOrderId")]
    pub client_order_id: i64,
    /// Linked one-cancels-other order.
    #[serde(rename = "OrderIdOCO")]
    pub order_id_oco: i64,
    /// Whether a display quantity applies.
    #[serde(rename = "UseDisplayQuantity")]
    pub use_display_quantity: bool,
    /// Side code.
    #[serde(rename = "Side")]
    pub side: i32,
    /// Quantity.
    pub quantity: f64,
    /// Order type code.
    #[serde(rename = "OrderType")]
    pub order_type: i32,
    /// Peg price type code.
    #[serde(rename = "PegPriceType")]
    pub peg_price_type: i32,
    /// Limit price (zero for market orders).
    #[serde(rename = "LimitPrice")]
    pub limit_price: f64,
}

/// `CancelOrder` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrderRequest {
    /// OMS id.
    #[serde(rename = "OMSId")]
    pub oms_id: i64,
    /// Account id.
    #[serde(rename = "AccountId")]
    pub account_id: i64,
    /// Client order id.
    #[serde(rename = "ClOrderId")]
    pub client_order_id: i64,
    /// Venue order id.
    #[serde(rename = "OrderId")]
    pub order_id: i64,
}

/// `CancelAllOrders` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelAllOrdersRequest {
    /// OMS id.
    #[serde(rename = "OMSId")]
    pub oms_id: i64,
    /// Account id.
    #[serde(rename = "AccountId")]
    pub account_id: i64,
}

/// `AuthenticateUser` payload.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticateUserRequest {
    /// API key.
    #[serde(rename = "APIKey")]
    pub api_key: String,
    /// Hex HMAC signature.
    #[serde(rename = "Signature")]
    pub signature: String,
    /// Venue user id.
    #[serde(rename = "UserId")]
    pub user_id: i64,
    /// Nonce the signature was computed over.
    #[serde(rename = "Nonce")]
    pub nonce: String,
}

impl std::fmt::Debug for AuthenticateUserRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticateUserRequest")
            .field("api_key", &"[REDACTED]")
            .field("signature", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .field("nonce", &self.nonce)
            .finish()
    }
}

/// `GetOrderStatus` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetOrderStatusRequest {
    /// OMS id.
    pub oms_id: i64,
    /// Account id.
    pub account_id: i64,
    /// Order id.
    pub order_id: i64,
}

/// `GetInstruments` and `GetProducts` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OmsRequest {
    /// OMS id.
    #[serde(rename = "OMSId")]
    pub oms_id: i64,
}

/// `GetUserAccounts` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetUserAccountsRequest {
    /// OMS id.
    pub oms_id: i64,
    /// Venue user id.
    pub user_id: i64,
    /// Venue user name.
    pub username: String,
}

/// `LogOut` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LogOutRequest {}

// =============================================================================
// Responses
// =============================================================================

/// `SendOrder` reply.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct SendOrderResponse {
    /// `Accepted` or `Rejected`.
    #[serde(deserialize_with = "null_as_default")]
    pub status: String,
    /// Venue error text.
    #[serde(rename = "errormsg")]
    #[serde(deserialize_with = "null_as_default")]
    pub error_message: String,
    /// Venue order id.
    #[serde(rename = "OrderId")]
    #[serde(deserialize_with = "null_as_default")]
    pub order_id: i64,
}

/// `CancelOrder` reply.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct CancelOrderResponse {
    /// Whether the cancel was accepted.
    #[serde(deserialize_with = "null_as_default")]
    pub result: bool,
    /// Venue error text.
    #[serde(rename = "errormsg")]
    #[serde(deserialize_with = "null_as_default")]
    pub error_message: String,
    /// Venue error code.
    #[serde(rename = "errorcode")]
    #[serde(deserialize_with = "null_as_default")]
    pub error_code: i64,
    /// Additional detail.
    #[serde(deserialize_with = "null_as_default")]
    pub detail: String,
    /// Venue order id.
    #[serde(rename = "orderId")]
    #[serde(deserialize_with = "null_as_default")]
    pub order_id: i64,
}

/// `CancelAllOrders` reply.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct CancelAllOrdersResponse {
    /// Whether the request was accepted.
    #[serde(deserialize_with = "null_as_default")]
    pub result: bool,
    /// Venue error text.
    #[serde(rename = "errormsg")]
    #[serde(deserialize_with = "null_as_default")]
    pub error_message: String,
    /// Venue error code.
    #[serde(rename = "errorcode")]
    #[serde(deserialize_with = "null_as_default")]
    pub error_code: i64,
    /// Additional detail.
    #[serde(deserialize_with = "null_as_default")]
    pub detail: String,
}

/// Order record returned by status queries.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct VenueOrder {
    /// Side name.
    #[serde(deserialize_with = "null_as_default")]
    pub side: String,
    /// Venue order id.
    #[serde(deserialize_with = "null_as_default")]
    pub order_id: i64,
    /// Order price.
    #[serde(deserialize_with = "null_as_default")]
    pub price: f64,
    /// Remaining quantity.
    #[serde(deserialize_with = "null_as_default")]
    pub quantity: f64,
    /// Displayed quantity.
    #[serde(deserialize_with = "null_as_default")]
    pub display_quantity: f64,
    /// Instrument id.
    #[serde(deserialize_with = "null_as_default")]
    pub instrument: i64,
    /// Account id.
    #[serde(deserialize_with = "null_as_default")]
    pub account: i64,
    /// Order type name.
    #[serde(deserialize_with = "null_as_default")]
    pub order_type: String,
    /// Client order id.
    #[serde(deserialize_with = "null_as_default")]
    pub client_order_id: i64,
    /// Order state name.
    #[serde(deserialize_with = "null_as_default")]
    pub order_state: String,
    /// Venue receive time (epoch millis).
    #[serde(deserialize_with = "null_as_default")]
    pub receive_time: i64,
    /// Venue receive time (ticks).
    #[serde(deserialize_with = "null_as_default")]
    pub receive_time_ticks: i64,
    /// Original quantity.
    #[serde(deserialize_with = "null_as_default")]
    pub orig_quantity: f64,
    /// Executed quantity.
    #[serde(deserialize_with = "null_as_default")]
    pub quantity_executed: f64,
    /// Average execution price.
    #[serde(deserialize_with = "null_as_default")]
    pub avg_price: f64,
    /// Counterparty id.
    #[serde(rename = "CounterPartyId")]
    #[serde(deserialize_with = "null_as_default")]
    pub counter_party_id: i64,
    /// Reason for the last change.
    #[serde(deserialize_with = "null_as_default")]
    pub change_reason: String,
    /// Original order id.
    #[serde(deserialize_with = "null_as_default")]
    pub orig_order_id: i64,
    /// Original client order id.
    #[serde(deserialize_with = "null_as_default")]
    pub orig_cl_ord_id: i64,
    /// Entering user.
    #[serde(deserialize_with = "null_as_default")]
    pub entered_by: i64,
    /// Whether this is a quote.
    #[serde(deserialize_with = "null_as_default")]
    pub is_quote: bool,
    /// Best ask at receive time.
    #[serde(deserialize_with = "null_as_default")]
    pub inside_ask: f64,
    /// Best ask size.
    #[serde(deserialize_with = "null_as_default")]
    pub inside_ask_size: f64,
    /// Best bid at receive time.
    #[serde(deserialize_with = "null_as_default")]
    pub inside_bid: f64,
    /// Best bid size.
    #[serde(deserialize_with = "null_as_default")]
    pub inside_bid_size: f64,
    /// Last traded price.
    #[serde(deserialize_with = "null_as_default")]
    pub last_trade_price: f64,
    /// Rejection reason.
    #[serde(deserialize_with = "null_as_default")]
    pub reject_reason: String,
    /// Whether the order is locked in.
    #[serde(deserialize_with = "null_as_default")]
    pub is_locked_in: bool,
    /// Cancel reason.
    #[serde(deserialize_with = "null_as_default")]
    pub cancel_reason: String,
    /// OMS id.
    #[serde(rename = "OMSId")]
    #[serde(deserialize_with = "null_as_default")]
    pub oms_id: i64,
}

/// `GetOrderStatus` reply.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct GetOrderStatusResponse {
    /// Matching orders.
    #[serde(deserialize_with = "null_as_default")]
    pub orders: Vec<VenueOrder>,
}

/// User record in an authentication reply.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VenueUser {
    /// User id.
    #[serde(deserialize_with = "null_as_default")]
    pub user_id: i64,
    /// User name.
    #[serde(deserialize_with = "null_as_default")]
    pub user_name: String,
    /// Account id.
    #[serde(deserialize_with = "null_as_default")]
    pub account_id: i64,
    /// OMS id.
    #[serde(deserialize_with = "null_as_default")]
    pub oms_id: i64,
}

/// `AuthenticateUser` reply.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct AuthenticateUserResponse {
    /// Whether the credentials were accepted.
    #[serde(deserialize_with = "null_as_default")]
    pub authenticated: bool,
    /// Authenticated user.
    pub user: Option<VenueUser>,
    /// Whether the account is locked.
    #[serde(deserialize_with = "null_as_default")]
    pub locked: bool,
    /// Whether a second factor is required.
    #[serde(rename = "requires2FA")]
    #[serde(deserialize_with = "null_as_default")]
    pub requires_2fa: bool,
    /// Venue error text.
    #[serde(rename = "errormsg")]
    #[serde(deserialize_with = "null_as_default")]
    pub error_message: String,
}

/// Instrument in a `GetInstruments` reply.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct VenueInstrument {
    /// Instrument id.
    #[serde(rename = "InstrumentId")]
    #[serde(deserialize_with = "null_as_default")]
    pub instrument_id: i64,
    /// Symbol.
    #[serde(rename = "Symbol")]
    #[serde(deserialize_with = "null_as_default")]
    pub symbol: String,
    /// Base product.
    #[serde(rename = "Product1")]
    #[serde(deserialize_with = "null_as_default")]
    pub product1: i64,
    /// Quote product.
    #[serde(rename = "Product2")]
    #[serde(deserialize_with = "null_as_default")]
    pub product2: i64,
}

/// `GetInstruments` reply.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct GetInstrumentsResponse {
    /// Instruments.
    #[serde(deserialize_with = "null_as_default")]
    pub instruments: Vec<VenueInstrument>,
}

/// Product in a `GetProducts` reply.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct VenueProduct {
    /// Product id.
    #[serde(rename = "ProductId")]
    #[serde(deserialize_with = "null_as_default")]
    pub product_id: i64,
    /// Name.
    #[serde(rename = "ProductName")]
    #[serde(deserialize_with = "null_as_default")]
    pub product_name: String,
    /// Type.
    #[serde(rename = "ProductType")]
    #[serde(deserialize_with = "null_as_default")]
    pub product_type: String,
}

/// `GetProducts` reply.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct GetProductsResponse {
    /// Products.
    #[serde(deserialize_with = "null_as_default")]
    pub products: Vec<VenueProduct>,
}

/// Decode an explicit JSON `null` as the field's default value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
