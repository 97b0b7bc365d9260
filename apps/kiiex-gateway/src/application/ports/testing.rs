//! In-memory port doubles for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use super::{
    EnvelopeListener, OutboundMessage, OutboundSink, SinkError, TransportError, VenueTransport,
};
use crate::domain::venue::{ConnectionState, Envelope, SEQUENCE_STEP};

/// Transport that records sends instead of writing them.
pub struct RecordingTransport {
    state: RwLock<ConnectionState>,
    sequence: AtomicI64,
    sent: Mutex<Vec<(String, serde_json::Value)>>,
    listeners: RwLock<Vec<EnvelopeListener>>,
    journal: Option<Arc<Mutex<Vec<String>>>>,
}

impl RecordingTransport {
    fn with_state(state: ConnectionState, journal: Option<Arc<Mutex<Vec<String>>>>) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(state),
            sequence: AtomicI64::new(0),
            sent: Mutex::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
            journal,
        })
    }

    pub fn connected() -> Arc<Self> {
        Self::with_state(ConnectionState::Connected, None)
    }

    pub fn disconnected() -> Arc<Self> {
        Self::with_state(ConnectionState::Disconnected, None)
    }

    /// Connected transport that appends `send:<operation>` to `journal`.
    pub fn journaled(journal: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Self::with_state(ConnectionState::Connected, Some(journal))
    }

    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    pub fn sent(&self) -> Vec<(String, serde_json::Value)> {
        self.sent.lock().clone()
    }

    pub fn sent_operations(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(op, _)| op.clone()).collect()
    }

    /// Hand a frame to every listener, as the read loop would.
    pub fn deliver(&self, envelope: &Envelope) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener(envelope);
        }
    }
}

#[async_trait]
impl VenueTransport for RecordingTransport {
    async fn send(
        &self,
        operation: &str,
        payload: serde_json::Value,
    ) -> Result<i64, TransportError> {
        if *self.state.read() != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        if let Some(journal) = &self.journal {
            journal.lock().push(format!("send:{operation}"));
        }
        self.sent.lock().push((operation.to_string(), payload));
        Ok(self.sequence.fetch_add(SEQUENCE_STEP, Ordering::SeqCst) + SEQUENCE_STEP)
    }

    fn add_listener(&self, listener: EnvelopeListener) {
        self.listeners.write().push(listener);
    }

    fn state(&self) -> ConnectionState {
        *self.state.read()
    }
}

/// Sink that keeps every delivered message.
#[derive(Default)]
pub struct CollectingSink {
    pub delivered: Mutex<Vec<OutboundMessage>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl OutboundSink for CollectingSink {
    async fn deliver(&self, message: OutboundMessage) -> Result<(), SinkError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SinkError("sink unavailable".to_string()));
        }
        self.delivered.lock().push(message);
        Ok(())
    }
}
