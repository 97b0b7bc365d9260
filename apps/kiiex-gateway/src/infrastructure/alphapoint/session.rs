//! Venue Session
//!
//! Holds the venue credentials and routes inbound frames to one handler per
//! operation name. Lookup ignores case, so `SendOrder`, `sendorder` and
//! `SENDORDER` reach the same handler.
//!
//! The request helpers are thin builders over [`VenueTransport::send`]:
//! they return as soon as the frame is written and never wait for the
//! reply. Replies arrive later through the registered handlers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use super::auth::VenueCredentials;
use super::messages::{
    AUTHENTICATE_USER, AuthenticateUserResponse, CANCEL_ALL_ORDERS, CANCEL_ORDER,
    CancelAllOrdersRequest, CancelOrderRequest, GET_INSTRUMENTS, GET_ORDER_STATUS, GET_PRODUCTS,
    GET_USER_ACCOUNTS, GetOrderStatusRequest, GetUserAccountsRequest, LOG_OUT, LogOutRequest,
    OmsRequest, SEND_ORDER, SendOrderRequest,
};
use crate::application::ports::{TransportError, VenueTransport};
use crate::domain::venue::Envelope;

/// Handler for replies to one operation.
pub type ResponseHandler = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Authentication state and operation routing over a transport.
pub struct Session {
    transport: Arc<dyn VenueTransport>,
    credentials: RwLock<Option<VenueCredentials>>,
    handlers: RwLock<HashMap<String, ResponseHandler>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut operations: Vec<String> = self.handlers.read().keys().cloned().collect();
        operations.sort();
        f.debug_struct("Session")
            .field("authenticated_as", &self.credentials.read().as_ref().map(|c| c.user_id))
            .field("operations", &operations)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session and attach it to the transport's inbound frames.
    #[must_use]
    pub fn new(
        transport: Arc<dyn VenueTransport>,
        credentials: Option<VenueCredentials>,
    ) -> Arc<Self> {
        let session = Arc::new(Self {
            transport: Arc::clone(&transport),
            credentials: RwLock::new(credentials),
            handlers: RwLock::new(HashMap::new()),
        });

        let weak = Arc::downgrade(&session);
        transport.add_listener(Arc::new(move |envelope: &Envelope| {
            if let Some(session) = weak.upgrade() {
                session.handle_envelope(envelope);
            }
        }));

        session.register_handler(AUTHENTICATE_USER, log_authentication);
        session
    }

    /// Replace the credentials.
    pub fn set_credentials(&self, credentials: Option<VenueCredentials>) {
        *self.credentials.write() = credentials;
    }

    /// Current credentials.
    #[must_use]
    pub fn credentials(&self) -> Option<VenueCredentials> {
        self.credentials.read().clone()
    }

    /// Send an authentication request.
    ///
    /// Does nothing (beyond a warning) when no credentials are set. The
    /// outcome arrives asynchronously as an `AuthenticateUser` reply.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the request could not be sent.
    pub async fn login(&self) -> Result<(), TransportError> {
        let Some(request) = self
            .credentials
            .read()
            .as_ref()
            .map(VenueCredentials::to_auth_request)
        else {
            tracing::warn!("No venue credentials configured, skipping login");
            return Ok(());
        };

        self.request(AUTHENTICATE_USER, &request).await?;
        Ok(())
    }

    /// Register the handler for an operation, replacing any existing one.
    pub fn register_handler<F>(&self, operation: &str, handler: F)
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        let key = operation.to_ascii_lowercase();
        if self
            .handlers
            .write()
            .insert(key, Arc::new(handler))
            .is_some()
        {
            tracing::warn!(operation, "Replacing existing response handler");
        }
    }

    /// Whether an operation has a handler.
    #[must_use]
    pub fn has_handler(&self, operation: &str) -> bool {
        self.handlers
            .read()
            .contains_key(&operation.to_ascii_lowercase())
    }

    /// Route an inbound frame to its handler.
    pub fn handle_envelope(&self, envelope: &Envelope) {
        let handler = self.handlers.read().get(&envelope.operation_key()).cloned();

        match handler {
            Some(handler) => handler(envelope),
            None => tracing::trace!(
                operation = %envelope.operation,
                sequence = envelope.sequence,
                "No handler for venue operation"
            ),
        }
    }

    /// Send `SendOrder`.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the request could not be sent.
    pub async fn execute_order(&self, request: &SendOrderRequest) -> Result<i64, TransportError> {
        self.request(SEND_ORDER, request).await
    }

    /// Send `CancelOrder`.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the request could not be sent.
    pub async fn cancel_order(&self, request: &CancelOrderRequest) -> Result<i64, TransportError> {
        self.request(CANCEL_ORDER, request).await
    }

    /// Send `CancelAllOrders`.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the request could not be sent.
    pub async fn cancel_all_orders(
        &self,
        request: &CancelAllOrdersRequest,
    ) -> Result<i64, TransportError> {
        self.request(CANCEL_ALL_ORDERS, request).await
    }

    /// Send `GetOrderStatus`.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the request could not be sent.
    pub async fn get_order_status(
        &self,
        request: &GetOrderStatusRequest,
    ) -> Result<i64, TransportError> {
        self.request(GET_ORDER_STATUS, request).await
    }

    /// Send `GetInstruments`.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the request could not be sent.
    pub async fn get_instruments(&self, oms_id: i64) -> Result<i64, TransportError> {
        self.request(GET_INSTRUMENTS, &OmsRequest { oms_id }).await
    }

    /// Send `GetProducts`.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the request could not be sent.
    pub async fn get_products(&self, oms_id: i64) -> Result<i64, TransportError> {
        self.request(GET_PRODUCTS, &OmsRequest { oms_id }).await
    }

    /// Send `GetUserAccounts`.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the request could not be sent.
    pub async fn get_user_accounts(
        &self,
        request: &GetUserAccountsRequest,
    ) -> Result<i64, TransportError> {
        self.request(GET_USER_ACCOUNTS, request).await
    }

    /// Send `LogOut`.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the request could not be sent.
    pub async fn logout(&self) -> Result<i64, TransportError> {
        self.request(LOG_OUT, &LogOutRequest {}).await
    }

    async fn request<T: Serialize + ?Sized>(
        &self,
        operation: &str,
        payload: &T,
    ) -> Result<i64, TransportError> {
        let payload = serde_json::to_value(payload)?;
        self.transport.send(operation, payload).await
    }
}

fn log_authentication(envelope: &Envelope) {
    match envelope.parse_payload::<AuthenticateUserResponse>() {
        Ok(response) if response.authenticated => {
            tracing::info!(
                user_id = response.user.as_ref().map(|u| u.user_id),
                "Venue authentication accepted"
            );
        }
        Ok(response) => {
            tracing::error!(
                error = %response.error_message,
                locked = response.locked,
                requires_2fa = response.requires_2fa,
                "Venue authentication rejected"
            );
        }
        Err(e) => tracing::error!(error = %e, "Failed to parse AuthenticateUser response"),
    }
}
