//! Order Processor
//!
//! Turns platform commands into venue requests and venue responses into
//! domain events.
//!
//! Submission is optimistic: `OrderSubmitted` is published, and fully
//! handled by in-process subscribers, before the order is written to the
//! venue. A failed send is reported to the caller, but the order is already
//! being tracked; the tracker's polling converges it. Cancels follow the
//! same pattern with `OrderCanceled`.
//!
//! Responses are correlated by operation name only. A rejected submission
//! and any cancel reply are both folded into `AttemptedCancel`, so the
//! tracker has one removal path for terminal non-fills.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;

use crate::application::ports::{OrderError, OrderStatusQuery, TransportError};
use crate::domain::events::{
    AttemptedCancel, DomainEvent, FillArrived, OrderCanceled, OrderSubmitted,
};
use crate::domain::instruments::InstrumentDirectory;
use crate::domain::order::{
    CancelOrderCommand, ORDER_STATE_CANCELED, ORDER_STATE_FILLED, ORDER_STATE_REJECTED,
    SubmitOrderCommand, TimeInForce, TradeInfo, VenueAccount,
};
use crate::domain::venue::Envelope;
use crate::infrastructure::alphapoint::{
    CANCEL_ORDER, CancelAllOrdersRequest, CancelOrderRequest, CancelOrderResponse,
    GET_INSTRUMENTS, GET_ORDER_STATUS, GetInstrumentsResponse, GetOrderStatusRequest,
    GetOrderStatusResponse, SEND_ORDER, SendOrderRequest, SendOrderResponse, Session, VenueOrder,
};
use crate::infrastructure::eventbus::SharedEventBus;
use crate::infrastructure::metrics;

/// Order command handling and venue response translation.
pub struct OrderProcessor {
    session: Arc<Session>,
    instruments: Arc<InstrumentDirectory>,
    events: SharedEventBus,
    account: VenueAccount,
}

impl std::fmt::Debug for OrderProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderProcessor")
            .field("account", &self.account)
            .field("instruments", &self.instruments.len())
            .finish_non_exhaustive()
    }
}

impl OrderProcessor {
    /// Create a processor and register its response handlers with the
    /// session.
    #[must_use]
    pub fn new(
        session: Arc<Session>,
        instruments: Arc<InstrumentDirectory>,
        events: SharedEventBus,
        account: VenueAccount,
    ) -> Arc<Self> {
        let processor = Arc::new(Self {
            session,
            instruments,
            events,
            account,
        });

        processor.route(SEND_ORDER, Self::on_send_order);
        processor.route(CANCEL_ORDER, Self::on_cancel_order);
        processor.route(GET_ORDER_STATUS, Self::on_order_status);
        processor.route(GET_INSTRUMENTS, Self::on_instruments);
        processor
    }

    fn route(self: &Arc<Self>, operation: &str, handler: fn(&Self, &Envelope)) {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.session.register_handler(operation, move |envelope| {
            if let Some(processor) = weak.upgrade() {
                handler(&processor, envelope);
            }
        });
    }

    /// Account orders are placed on.
    #[must_use]
    pub const fn account(&self) -> VenueAccount {
        self.account
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Submit an order.
    ///
    /// `OrderSubmitted` has been delivered to every subscriber before the
    /// request is written. Time-in-force is always fill-or-kill.
    ///
    /// # Errors
    ///
    /// `UnknownInstrument` if the symbol is not mapped (nothing is published
    /// or sent); otherwise any transport error from login or the send.
    #[tracing::instrument(skip_all, fields(id = command.id, instrument = %command.instrument_pair))]
    pub async fn submit(&self, command: &SubmitOrderCommand) -> Result<i64, OrderError> {
        let Some(instrument_id) = self.instruments.lookup_id(&command.instrument_pair) else {
            metrics::record_order_failure("unknown_instrument");
            tracing::warn!("Rejecting order for unknown instrument");
            return Err(OrderError::UnknownInstrument(
                command.instrument_pair.clone(),
            ));
        };

        let order_type = command.order_type();
        let request = SendOrderRequest {
            instrument_id,
            oms_id: self.account.oms_id,
            account_id: self.account.account_id,
            time_in_force: TimeInForce::Fok.code(),
            client_order_id: command.id,
            order_id_oco: 0,
            use_display_quantity: false,
            side: command.side().code(),
            quantity: command.quantity.to_f64().unwrap_or_default(),
            order_type: order_type.code(),
            peg_price_type: 0,
            limit_price: command
                .price
                .filter(|_| order_type.carries_limit_price())
                .and_then(|price| price.to_f64())
                .unwrap_or_default(),
        };

        let submitted = OrderSubmitted {
            trade_info: TradeInfo::new(self.account, command.id),
            order_id: command.tracking_key(),
        };
        self.events.publish_sync(&submitted.into());

        let sequence = self.send_after_login(self.session.execute_order(&request)).await?;

        metrics::record_order_submitted(order_type.as_str());
        tracing::info!(sequence, side = command.side().as_str(), "Order sent to venue");
        Ok(sequence)
    }

    /// Cancel an order by venue order id.
    ///
    /// # Errors
    ///
    /// `InvalidOrderId` if the id is not numeric (nothing is published or
    /// sent); otherwise any transport error from login or the send.
    #[tracing::instrument(skip_all, fields(order_id = %command.order_id))]
    pub async fn cancel(&self, command: &CancelOrderCommand) -> Result<i64, OrderError> {
        let order_id: i64 = command.order_id.trim().parse().map_err(|_| {
            metrics::record_order_failure("invalid_order_id");
            OrderError::InvalidOrderId(command.order_id.clone())
        })?;

        self.events
            .publish(
                OrderCanceled {
                    order_id: command.order_id.clone(),
                }
                .into(),
            )
            .await;

        let request = CancelOrderRequest {
            oms_id: self.account.oms_id,
            account_id: self.account.account_id,
            client_order_id: 0,
            order_id,
        };
        let sequence = self.send_after_login(self.session.cancel_order(&request)).await?;

        metrics::record_order_cancel();
        tracing::info!(sequence, "Cancel sent to venue");
        Ok(sequence)
    }

    /// Cancel every open order on the account.
    ///
    /// Publishes nothing; affected orders converge through polling.
    ///
    /// # Errors
    ///
    /// Any transport error from login or the send.
    pub async fn cancel_all(&self) -> Result<i64, OrderError> {
        let request = CancelAllOrdersRequest {
            oms_id: self.account.oms_id,
            account_id: self.account.account_id,
        };
        let sequence = self
            .send_after_login(self.session.cancel_all_orders(&request))
            .await?;

        tracing::info!(sequence, "Cancel-all sent to venue");
        Ok(sequence)
    }

    /// Request the venue's instrument list; the reply updates the directory.
    ///
    /// # Errors
    ///
    /// Any transport error from the send.
    pub async fn get_instruments(&self) -> Result<i64, OrderError> {
        Ok(self.session.get_instruments(self.account.oms_id).await?)
    }

    async fn send_after_login<F>(&self, send: F) -> Result<i64, OrderError>
    where
        F: Future<Output = Result<i64, TransportError>>,
    {
        if let Err(e) = self.session.login().await {
            metrics::record_order_failure("login");
            tracing::error!(error = %e, "Failed to login");
            return Err(e.into());
        }

        send.await.map_err(|e| {
            metrics::record_order_failure("send");
            tracing::error!(error = %e, "Failed to send venue request");
            e.into()
        })
    }

    // =========================================================================
    // Response Handlers
    // =========================================================================

    fn on_send_order(&self, envelope: &Envelope) {
        tracing::info!(payload = %envelope.payload, "SendOrder response");

        let response: SendOrderResponse = match envelope.parse_payload() {
            Ok(response) => response,
            Err(e) => {
                metrics::record_parse_failure();
                tracing::error!(error = %e, "Failed to parse SendOrder response");
                return;
            }
        };

        if response.status.eq_ignore_ascii_case(ORDER_STATE_REJECTED) {
            tracing::warn!(
                order_id = response.order_id,
                error = %response.error_message,
                "Order rejected by venue"
            );
            self.emit(AttemptedCancel {
                order_id: response.order_id,
            });
        }
    }

    fn on_cancel_order(&self, envelope: &Envelope) {
        tracing::info!(payload = %envelope.payload, "CancelOrder response");

        let response: CancelOrderResponse = match envelope.parse_payload() {
            Ok(response) => response,
            Err(e) => {
                metrics::record_parse_failure();
                tracing::error!(error = %e, "Failed to parse CancelOrder response");
                return;
            }
        };

        if !response.result {
            tracing::warn!(
                order_id = response.order_id,
                error = %response.error_message,
                "Venue did not accept cancel"
            );
        }
        self.emit(AttemptedCancel {
            order_id: response.order_id,
        });
    }

    fn on_order_status(&self, envelope: &Envelope) {
        tracing::debug!(payload = %envelope.payload, "GetOrderStatus response");

        let response: GetOrderStatusResponse = match envelope.parse_payload() {
            Ok(response) => response,
            Err(e) => {
                metrics::record_parse_failure();
                tracing::error!(error = %e, "Failed to parse GetOrderStatus response");
                return;
            }
        };

        for order in &response.orders {
            if order.order_id == 0 {
                tracing::error!(?order, "Venue order without an order id");
                continue;
            }

            let state = order.order_state.to_ascii_lowercase();
            if state == ORDER_STATE_CANCELED || state == ORDER_STATE_REJECTED {
                tracing::warn!(
                    order_id = order.order_id,
                    client_order_id = order.client_order_id,
                    state,
                    "Order canceled or rejected"
                );
                // Tracked entries hold the id sent as ClientOrderId.
                let order_id = if order.client_order_id == 0 {
                    order.order_id
                } else {
                    order.client_order_id
                };
                self.emit(AttemptedCancel { order_id });
            } else if state == ORDER_STATE_FILLED {
                tracing::info!(order_id = order.order_id, "Order filled");
                self.emit(self.fill_from(order));
            }
        }
    }

    fn on_instruments(&self, envelope: &Envelope) {
        let response: GetInstrumentsResponse = match envelope.parse_payload() {
            Ok(response) => response,
            Err(e) => {
                metrics::record_parse_failure();
                tracing::error!(error = %e, "Failed to parse GetInstruments response");
                return;
            }
        };

        for instrument in response.instruments {
            if instrument.symbol.is_empty() {
                continue;
            }
            self.instruments
                .add_mapping(instrument.symbol, instrument.instrument_id);
        }
        tracing::info!(instruments = self.instruments.len(), "Instrument directory updated");
    }

    fn emit(&self, event: impl Into<DomainEvent>) {
        self.events.try_publish(event.into());
    }

    /// Translate a filled venue order.
    fn fill_from(&self, order: &VenueOrder) -> FillArrived {
        let nonzero = |id: i64| if id == 0 { String::new() } else { id.to_string() };

        FillArrived {
            order_id: nonzero(order.client_order_id),
            fill_id: order.order_id.to_string(),
            external_order_id: order.order_id.to_string(),
            instrument_pair: self
                .instruments
                .lookup_symbol(order.instrument)
                .unwrap_or_default(),
            quantity_filled: format!("{:.6}", order.quantity_executed),
            quantity_cumulative: format!("{:.6}", order.quantity_executed),
            quantity_leaves: format!("{:.6}", order.orig_quantity - order.quantity_executed),
            price: format!("{:.6}", order.price),
            side: order.side.to_ascii_lowercase(),
            status: order.order_state.to_ascii_lowercase(),
            order_type: order.order_type.to_ascii_lowercase(),
            client_id: order.account.to_string(),
            date: order.receive_time.to_string(),
            client_order_id: order.client_order_id.to_string(),
            provider: order.counter_party_id.to_string(),
            source: order.oms_id.to_string(),
            ..FillArrived::default()
        }
    }
}

#[async_trait]
impl OrderStatusQuery for OrderProcessor {
    async fn get_trade_status(&self, trade_info: &TradeInfo) -> Result<(), OrderError> {
        tracing::debug!(?trade_info, "Requesting order status");

        let request = GetOrderStatusRequest {
            oms_id: trade_info.oms_id,
            account_id: trade_info.account_id,
            order_id: trade_info.order_id,
        };
        self.session.get_order_status(&request).await?;
        Ok(())
    }
}
