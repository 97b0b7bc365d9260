//! Venue WebSocket Transport
//!
//! Owns the single persistent connection to the AlphaPoint gateway.
//!
//! # Lifecycle
//!
//! 1. `connect` performs the handshake under a timeout and spawns exactly
//!    one read task for the new connection.
//! 2. The read task decodes each frame and hands it to every registered
//!    listener, in arrival order. A listener that panics is logged; the
//!    others still run.
//! 3. A clean close (normal or going-away) leaves the transport
//!    disconnected. Any other read failure schedules a reconnect.
//! 4. Reconnects retry after a fixed delay until one succeeds.
//! 5. `close` stops everything and is idempotent.
//!
//! Writes go through a single async mutex so concurrent senders never
//! interleave frames. Sequence numbers advance by [`SEQUENCE_STEP`] per send
//! and are never reset, including across reconnects.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use super::codec::EnvelopeCodec;
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{EnvelopeListener, TransportError, VenueTransport};
use crate::domain::venue::{ConnectionState, Envelope, SEQUENCE_STEP};
use crate::infrastructure::metrics;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Production Kiiex gateway endpoint.
pub const DEFAULT_VENUE_URL: &str = "wss://api.kiire.alphaprod.net/WSGateway";

/// Default bound on the connect handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on a single frame write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Configuration
// =============================================================================

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct VenueClientConfig {
    /// WebSocket URL.
    pub url: String,
    /// Connect and handshake timeout.
    pub handshake_timeout: Duration,
    /// Per-frame write timeout.
    pub write_timeout: Duration,
    /// Reconnection policy.
    pub reconnect: ReconnectConfig,
}

impl Default for VenueClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_VENUE_URL)
    }
}

impl VenueClientConfig {
    /// Configuration for a URL with default timeouts.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            reconnect: ReconnectConfig::default(),
        }
    }
}

// =============================================================================
// Client
// =============================================================================

/// AlphaPoint WebSocket transport.
pub struct VenueClient {
    config: VenueClientConfig,
    codec: EnvelopeCodec,
    state: RwLock<ConnectionState>,
    sequence: AtomicI64,
    writer: AsyncMutex<Option<WsSink>>,
    listeners: RwLock<Vec<EnvelopeListener>>,
    connection: Mutex<Option<CancellationToken>>,
    shutdown: CancellationToken,
    reconnecting: AtomicBool,
    closed: AtomicBool,
}

impl std::fmt::Debug for VenueClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VenueClient")
            .field("url", &self.config.url)
            .field("state", &*self.state.read())
            .field("sequence", &self.sequence.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl VenueClient {
    /// Create a disconnected transport.
    #[must_use]
    pub fn new(config: VenueClientConfig) -> Self {
        Self {
            config,
            codec: EnvelopeCodec::new(),
            state: RwLock::new(ConnectionState::Disconnected),
            sequence: AtomicI64::new(0),
            writer: AsyncMutex::new(None),
            listeners: RwLock::new(Vec::new()),
            connection: Mutex::new(None),
            shutdown: CancellationToken::new(),
            reconnecting: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Transport configuration.
    #[must_use]
    pub const fn config(&self) -> &VenueClientConfig {
        &self.config
    }

    /// Sequence number of the most recent request.
    #[must_use]
    pub fn last_sequence(&self) -> i64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Connect to the configured URL and start the read task.
    ///
    /// # Errors
    ///
    /// `Connection` if the handshake fails or exceeds the handshake timeout,
    /// `Closed` if the transport was closed.
    pub async fn connect(self: &Arc<Self>) -> Result<(), TransportError> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }

        self.set_state(ConnectionState::Connecting);
        tracing::info!(url = %self.config.url, "Connecting to venue");

        let handshake = tokio::time::timeout(
            self.config.handshake_timeout,
            connect_async(&self.config.url),
        )
        .await;

        let ws_stream = match handshake {
            Ok(Ok((ws_stream, _response))) => ws_stream,
            Ok(Err(e)) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(TransportError::Connection(e.to_string()));
            }
            Err(_) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(TransportError::Connection(format!(
                    "handshake timed out after {:?}",
                    self.config.handshake_timeout
                )));
            }
        };

        if self.shutdown.is_cancelled() {
            self.set_state(ConnectionState::Disconnected);
            return Err(TransportError::Closed);
        }

        let (sink, source) = ws_stream.split();

        // `close` sets the flag before it takes the writer lock.
        let connection = {
            let mut writer = self.writer.lock().await;
            if self.closed.load(Ordering::SeqCst) {
                drop(writer);
                self.set_state(ConnectionState::Disconnected);
                return Err(TransportError::Closed);
            }
            *writer = Some(sink);

            let connection = self.shutdown.child_token();
            if let Some(previous) = self.connection.lock().replace(connection.clone()) {
                previous.cancel();
            }
            self.set_state(ConnectionState::Connected);
            connection
        };
        tracing::info!(url = %self.config.url, "Connected to venue");

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.read_loop(source, connection).await;
        });

        Ok(())
    }

    /// Stop the read task, release the connection and disable reconnects.
    ///
    /// Safe to call more than once.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shutdown.cancel();

        let sink = {
            let mut writer = self.writer.lock().await;
            self.set_state(ConnectionState::Disconnected);
            writer.take()
        };
        if let Some(mut sink) = sink {
            let _ = tokio::time::timeout(
                self.config.write_timeout,
                sink.send(Message::Close(None)),
            )
            .await;
        }

        tracing::info!("Venue transport closed");
    }

    fn next_sequence(&self) -> i64 {
        self.sequence.fetch_add(SEQUENCE_STEP, Ordering::SeqCst) + SEQUENCE_STEP
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
        metrics::set_connection_state(state);
    }

    async fn read_loop(self: Arc<Self>, mut source: WsSource, connection: CancellationToken) {
        loop {
            let frame = tokio::select! {
                () = connection.cancelled() => {
                    tracing::debug!("Venue read loop stopped");
                    return;
                }
                frame = source.next() => frame,
            };

            match frame {
                Some(Ok(Message::Text(text))) => self.dispatch(text.as_str()),
                Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => self.dispatch(text),
                    Err(_) => {
                        tracing::warn!(len = data.len(), "Received non-UTF8 binary frame");
                        metrics::record_parse_failure();
                    }
                },
                Some(Ok(Message::Ping(data))) => self.write_control(Message::Pong(data)).await,
                Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    self.drop_connection(&connection).await;
                    if is_clean_close(frame.as_ref()) {
                        tracing::info!("Venue closed the connection");
                    } else {
                        tracing::warn!(frame = ?frame, "Venue closed the connection abnormally");
                        self.schedule_reconnect();
                    }
                    return;
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Venue read failed");
                    self.drop_connection(&connection).await;
                    self.schedule_reconnect();
                    return;
                }
                None => {
                    tracing::warn!("Venue stream ended");
                    self.drop_connection(&connection).await;
                    self.schedule_reconnect();
                    return;
                }
            }
        }
    }

    fn dispatch(&self, text: &str) {
        let envelope = match self.codec.decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable venue frame");
                metrics::record_parse_failure();
                return;
            }
        };

        metrics::record_envelope_received(&envelope.operation);
        tracing::trace!(
            operation = %envelope.operation,
            sequence = envelope.sequence,
            "Venue frame received"
        );

        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(&envelope))).is_err() {
                tracing::error!(
                    operation = %envelope.operation,
                    "Envelope listener panicked"
                );
            }
        }
    }

    async fn write_control(&self, message: Message) {
        let mut writer = self.writer.lock().await;
        if let Some(sink) = writer.as_mut()
            && let Err(e) = sink.send(message).await
        {
            tracing::debug!(error = %e, "Failed to write control frame");
        }
    }

    async fn drop_connection(&self, connection: &CancellationToken) {
        connection.cancel();
        self.set_state(ConnectionState::Disconnected);
        self.writer.lock().await.take();
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        if self.shutdown.is_cancelled() || self.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.reconnect_loop().await;
        });
    }

    async fn reconnect_loop(self: Arc<Self>) {
        let mut policy = ReconnectPolicy::new(self.config.reconnect);

        loop {
            let delay = policy.next_delay();
            tracing::info!(
                attempt = policy.attempt_count(),
                delay_ms = delay.as_millis(),
                "Reconnecting to venue"
            );

            tokio::select! {
                () = self.shutdown.cancelled() => {
                    self.reconnecting.store(false, Ordering::SeqCst);
                    return;
                }
                () = tokio::time::sleep(delay) => {}
            }

            metrics::record_reconnect();
            match self.connect().await {
                Ok(()) => break,
                Err(TransportError::Closed) => {
                    self.reconnecting.store(false, Ordering::SeqCst);
                    return;
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        attempt = policy.attempt_count(),
                        "Reconnect attempt failed"
                    );
                }
            }
        }

        self.reconnecting.store(false, Ordering::SeqCst);
        tracing::info!(attempts = policy.attempt_count(), "Reconnected to venue");

        // The new connection may have dropped before the flag was cleared.
        if self.state() != ConnectionState::Connected {
            self.schedule_reconnect();
        }
    }
}

#[async_trait]
impl VenueTransport for VenueClient {
    async fn send(
        &self,
        operation: &str,
        payload: serde_json::Value,
    ) -> Result<i64, TransportError> {
        if self.state() != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }

        let payload = serde_json::to_string(&payload)?;
        let sequence = self.next_sequence();
        let envelope = Envelope::request(sequence, operation, payload);
        let text = self
            .codec
            .encode(&envelope)
            .map_err(|e| TransportError::Send(e.to_string()))?;

        let started = Instant::now();
        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(TransportError::NotConnected)?;

        let written =
            tokio::time::timeout(self.config.write_timeout, sink.send(Message::Text(text.into())))
                .await;
        drop(writer);

        match written {
            Ok(Ok(())) => {
                metrics::record_envelope_sent(operation, started.elapsed());
                tracing::debug!(operation, sequence, "Venue request sent");
                Ok(sequence)
            }
            Ok(Err(e)) => Err(TransportError::Send(e.to_string())),
            Err(_) => Err(TransportError::Timeout(self.config.write_timeout)),
        }
    }

    fn add_listener(&self, listener: EnvelopeListener) {
        self.listeners.write().push(listener);
    }

    fn state(&self) -> ConnectionState {
        *self.state.read()
    }
}

fn is_clean_close(frame: Option<&CloseFrame>) -> bool {
    frame.is_none_or(|f| matches!(f.code, CloseCode::Normal | CloseCode::Away))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_before_connect_is_not_connected() {
        let client = VenueClient::new(VenueClientConfig::new("ws://127.0.0.1:1"));
        let err = client
            .send("GetProducts", serde_json::json!({"OMSId": 1}))
            .await
            .unwrap_err();

        assert!(matches!(err, TransportError::NotConnected));
        assert_eq!(client.last_sequence(), 0);
    }

    #[tokio::test]
    async fn failed_connect_leaves_transport_disconnected() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = Arc::new(VenueClient::new(VenueClientConfig::new(format!(
            "ws://127.0.0.1:{port}"
        ))));
        let err = client.connect().await.unwrap_err();

        assert!(matches!(err, TransportError::Connection(_)));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_connect() {
        let client = Arc::new(VenueClient::new(VenueClientConfig::default()));
        client.close().await;
        client.close().await;

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(matches!(
            client.connect().await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn close_during_handshake_wins() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(ws);
        });

        let client = Arc::new(VenueClient::new(VenueClientConfig::new(url)));
        let connecting = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.connect().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.close().await;

        let result = connecting.await.unwrap();
        assert!(matches!(result, Err(TransportError::Closed)));
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(matches!(
            client.send("LogOut", serde_json::json!({})).await,
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn clean_close_codes() {
        assert!(is_clean_close(None));
        assert!(is_clean_close(Some(&CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        })));
        assert!(is_clean_close(Some(&CloseFrame {
            code: CloseCode::Away,
            reason: "".into(),
        })));
        assert!(!is_clean_close(Some(&CloseFrame {
            code: CloseCode::Error,
            reason: "".into(),
        })));
    }

    #[test]
    fn sequence_advances_by_step() {
        let client = VenueClient::new(VenueClientConfig::default());
        assert_eq!(client.next_sequence(), 2);
        assert_eq!(client.next_sequence(), 4);
        assert_eq!(client.last_sequence(), 4);
    }

    proptest::proptest! {
        #[test]
        fn sequences_are_even_and_strictly_stepped(sends in 1usize..200) {
            let client = VenueClient::new(VenueClientConfig::default());
            let sequences: Vec<i64> = (0..sends).map(|_| client.next_sequence()).collect();

            proptest::prop_assert!(sequences.iter().all(|s| s % SEQUENCE_STEP == 0));
            proptest::prop_assert!(sequences.windows(2).all(|w| w[1] - w[0] == SEQUENCE_STEP));
            let expected_last = SEQUENCE_STEP * i64::try_from(sends).unwrap();
            proptest::prop_assert_eq!(client.last_sequence(), expected_last);
        }
    }
}
