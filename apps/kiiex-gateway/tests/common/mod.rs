//! In-process AlphaPoint venue for integration tests.
//!
//! Accepts WebSocket connections on an ephemeral port, records every frame
//! the gateway sends and lets the test push frames or close the current
//! connection.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// Builds an optional reply for a request frame.
pub type Responder = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

#[derive(Default)]
struct VenueState {
    frames: Mutex<Vec<Value>>,
    connections: AtomicUsize,
    current: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    responder: Option<Responder>,
}

/// Handle to a running mock venue.
pub struct MockVenue {
    pub url: String,
    state: Arc<VenueState>,
}

impl MockVenue {
    /// Start a venue that never replies on its own.
    pub async fn start() -> Self {
        Self::spawn(None).await
    }

    /// Start a venue that answers requests with `responder`.
    pub async fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        Self::spawn(Some(Arc::new(responder))).await
    }

    async fn spawn(responder: Option<Responder>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(VenueState {
            responder,
            ..VenueState::default()
        });

        let accept_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, Arc::clone(&accept_state)));
            }
        });

        Self {
            url: format!("ws://{addr}"),
            state,
        }
    }

    /// Frames received so far, decoded as JSON.
    pub fn frames(&self) -> Vec<Value> {
        self.state.frames.lock().clone()
    }

    /// Operation names of the frames received so far.
    pub fn operations(&self) -> Vec<String> {
        self.frames()
            .iter()
            .map(|frame| frame["n"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Number of accepted WebSocket connections.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Send a frame to the current connection.
    pub fn push(&self, frame: &Value) {
        self.push_raw(frame.to_string());
    }

    /// Send raw text to the current connection.
    pub fn push_raw(&self, text: impl Into<String>) {
        let current = self.state.current.lock();
        let tx = current.as_ref().expect("no venue connection");
        tx.send(Message::Text(text.into().into())).unwrap();
    }

    /// Close the current connection with `code`.
    pub fn close(&self, code: CloseCode) {
        let current = self.state.current.lock();
        let tx = current.as_ref().expect("no venue connection");
        tx.send(Message::Close(Some(CloseFrame {
            code,
            reason: "".into(),
        })))
        .unwrap();
    }

    /// Wait until at least `count` frames have arrived.
    pub async fn wait_for_frames(&self, count: usize) -> Vec<Value> {
        assert!(
            eventually(|| self.state.frames.lock().len() >= count).await,
            "expected {count} frames, got {:?}",
            self.operations()
        );
        self.frames()
    }
}

/// Reply frame for `operation` carrying `payload`.
pub fn reply(operation: &str, sequence: i64, payload: &Value) -> Value {
    json!({
        "m": 1,
        "i": sequence,
        "n": operation,
        "o": payload.to_string(),
    })
}

/// Poll `condition` until it holds or five seconds pass.
pub async fn eventually<F>(condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

async fn serve(stream: TcpStream, state: Arc<VenueState>) {
    let Ok(ws) = accept_async(stream).await else {
        return;
    };
    let (mut sink, mut source) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    *state.current.lock() = Some(tx);
    state.connections.fetch_add(1, Ordering::SeqCst);

    loop {
        tokio::select! {
            outbound = rx.recv() => {
                let Some(message) = outbound else { break };
                let closing = matches!(message, Message::Close(_));
                if sink.send(message).await.is_err() || closing {
                    break;
                }
            }
            inbound = source.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
                        continue;
                    };
                    let answer = state.responder.as_ref().and_then(|respond| respond(&frame));
                    state.frames.lock().push(frame);
                    if let Some(answer) = answer
                        && sink.send(Message::Text(answer.to_string().into())).await.is_err()
                    {
                        break;
                    }
                }
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}
