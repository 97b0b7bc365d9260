//! Order Command Intake
//!
//! Decodes platform queue messages into order commands and hands them to
//! the [`OrderProcessor`]. The broker connection itself lives outside this
//! crate; whatever drives it calls [`CommandConsumer::handle`] per message
//! and settles the message according to the returned [`Delivery`].

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::application::ports::OrderError;
use crate::application::services::OrderProcessor;
use crate::domain::order::{CancelOrderCommand, SubmitOrderCommand};

/// Queue carrying new orders for a provider.
#[must_use]
pub fn created_queue(provider: &str) -> String {
    format!("outbound.orders.created.{provider}")
}

/// Queue carrying cancel requests for a provider.
#[must_use]
pub fn canceled_queue(provider: &str) -> String {
    format!("outbound.orders.canceled.{provider}")
}

/// How a consumed message should be settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Processed.
    Ack,
    /// Drop without redelivery.
    Reject,
    /// Redeliver later.
    Requeue,
}

impl Delivery {
    const fn for_error(error: &OrderError) -> Self {
        match error {
            OrderError::UnknownInstrument(_) | OrderError::InvalidOrderId(_) => Self::Reject,
            OrderError::Transport(_) => Self::Requeue,
        }
    }
}

/// Routes queue messages to the order processor.
#[derive(Debug)]
pub struct CommandConsumer {
    processor: Arc<OrderProcessor>,
    created_queue: String,
    canceled_queue: String,
}

impl CommandConsumer {
    /// Create a consumer for a provider's queues.
    #[must_use]
    pub fn new(processor: Arc<OrderProcessor>, provider: &str) -> Self {
        Self {
            processor,
            created_queue: created_queue(provider),
            canceled_queue: canceled_queue(provider),
        }
    }

    /// Queues this consumer reads.
    #[must_use]
    pub fn queues(&self) -> [&str; 2] {
        [&self.created_queue, &self.canceled_queue]
    }

    /// Process one message from `queue`.
    pub async fn handle(&self, queue: &str, body: &[u8]) -> Delivery {
        if queue == self.created_queue {
            self.handle_submit(body).await
        } else if queue == self.canceled_queue {
            self.handle_cancel(body).await
        } else {
            tracing::error!(queue, "Message from unexpected queue");
            Delivery::Reject
        }
    }

    /// Process a new-order message.
    pub async fn handle_submit(&self, body: &[u8]) -> Delivery {
        let Some(command) = decode::<SubmitOrderCommand>(body) else {
            return Delivery::Reject;
        };
        tracing::info!(
            id = command.id,
            instrument = %command.instrument_pair,
            "SubmitOrderCommand received"
        );

        match self.processor.submit(&command).await {
            Ok(_) => Delivery::Ack,
            Err(e) => {
                tracing::error!(id = command.id, error = %e, "Failed to execute order");
                Delivery::for_error(&e)
            }
        }
    }

    /// Process a cancel message.
    pub async fn handle_cancel(&self, body: &[u8]) -> Delivery {
        let Some(command) = decode::<CancelOrderCommand>(body) else {
            return Delivery::Reject;
        };
        tracing::info!(order_id = %command.order_id, "CancelOrderCommand received");

        match self.processor.cancel(&command).await {
            Ok(_) => Delivery::Ack,
            Err(e) => {
                tracing::error!(
                    order_id = %command.order_id,
                    error = %e,
                    "Failed to cancel order"
                );
                Delivery::for_error(&e)
            }
        }
    }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Option<T> {
    serde_json::from_slice(body)
        .map_err(|e| {
            tracing::error!(
                error = %e,
                command = std::any::type_name::<T>(),
                "Failed to decode command"
            );
        })
        .ok()
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::application::ports::testing::RecordingTransport;
    use crate::domain::instruments::InstrumentDirectory;
    use crate::domain::order::VenueAccount;
    use crate::domain::venue::ConnectionState;
    use crate::infrastructure::alphapoint::Session;
    use crate::infrastructure::eventbus::EventBus;

    fn consumer() -> (CommandConsumer, Arc<RecordingTransport>) {
        let transport = RecordingTransport::connected();
        let session = Session::new(transport.clone(), None);
        let instruments = Arc::new(InstrumentDirectory::new());
        instruments.add_mapping("BTCUSD", 1);
        let processor = OrderProcessor::new(
            session,
            instruments,
            Arc::new(EventBus::default()),
            VenueAccount {
                oms_id: 1,
                account_id: 9,
            },
        );
        (CommandConsumer::new(processor, "kiiex"), transport)
    }

    #[test]
    fn queue_names_include_provider() {
        assert_eq!(created_queue("kiiex"), "outbound.orders.created.kiiex");
        assert_eq!(canceled_queue("otc"), "outbound.orders.canceled.otc");
    }

    #[tokio::test]
    async fn submit_message_is_acked() {
        let (consumer, transport) = consumer();
        let body = br#"{"id":42,"instrumentPair":"BTCUSD","quantity":"1.25","side":"buy",
            "type":"MarketOrder","clientOrderId":"cl-42","tags":["otc"]}"#;

        let delivery = consumer
            .handle("outbound.orders.created.kiiex", body)
            .await;

        assert_eq!(delivery, Delivery::Ack);
        let (operation, payload) = transport.sent().pop().unwrap();
        assert_eq!(operation, "SendOrder");
        assert_eq!(payload["ClientOrderId"], 42);
        assert_eq!(payload["quantity"], 1.25);
    }

    #[tokio::test]
    async fn cancel_message_is_acked() {
        let (consumer, transport) = consumer();

        let delivery = consumer
            .handle("outbound.orders.canceled.kiiex", br#"{"orderId":"5001"}"#)
            .await;

        assert_eq!(delivery, Delivery::Ack);
        assert_eq!(transport.sent_operations(), vec!["CancelOrder"]);
    }

    #[test_case("outbound.orders.created.kiiex", b"{not json" ; "malformed submit")]
    #[test_case("outbound.orders.canceled.kiiex", b"[]" ; "malformed cancel")]
    #[test_case(
        "outbound.orders.created.kiiex",
        br#"{"id":1,"instrumentPair":"XRPUSD"}"#
        ; "unknown instrument"
    )]
    #[test_case("outbound.orders.canceled.kiiex", br#"{"orderId":"abc"}"# ; "non numeric id")]
    #[test_case("outbound.orders.created.other", br#"{"id":1}"# ; "foreign queue")]
    #[tokio::test]
    async fn permanent_failures_are_rejected(queue: &str, body: &[u8]) {
        let (consumer, transport) = consumer();

        assert_eq!(consumer.handle(queue, body).await, Delivery::Reject);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn send_failures_are_requeued() {
        let (consumer, transport) = consumer();
        transport.set_state(ConnectionState::Disconnected);

        let submit = consumer
            .handle_submit(br#"{"id":1,"instrumentPair":"BTCUSD","quantity":"1"}"#)
            .await;
        let cancel = consumer.handle_cancel(br#"{"orderId":"7"}"#).await;

        assert_eq!(submit, Delivery::Requeue);
        assert_eq!(cancel, Delivery::Requeue);
    }

    #[test]
    fn consumer_lists_its_queues() {
        let (consumer, _) = consumer();
        assert_eq!(
            consumer.queues(),
            [
                "outbound.orders.created.kiiex",
                "outbound.orders.canceled.kiiex"
            ]
        );
    }
}
