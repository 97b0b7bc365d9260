//! Venue Transport Integration Tests
//!
//! Runs the WebSocket transport against an in-process venue: framing,
//! sequence numbering across reconnects, listener fan-out and close
//! handling.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use common::{MockVenue, eventually, reply};
use kiiex_gateway::{
    ConnectionState, Envelope, MessageType, ReconnectConfig, TransportError, VenueClient,
    VenueClientConfig, VenueTransport,
};

async fn connected_client(venue: &MockVenue) -> Arc<VenueClient> {
    let mut config = VenueClientConfig::new(venue.url.clone());
    config.reconnect = ReconnectConfig::new(Duration::from_millis(50));
    let client = Arc::new(VenueClient::new(config));
    client.connect().await.unwrap();
    assert!(eventually(|| venue.connections() == 1).await);
    client
}

#[tokio::test]
async fn requests_are_framed_with_double_encoded_payload() {
    let venue = MockVenue::start().await;
    let client = connected_client(&venue).await;

    let sequence = client
        .send("GetProducts", json!({"OMSId": 1}))
        .await
        .unwrap();

    let frames = venue.wait_for_frames(1).await;
    assert_eq!(sequence, 2);
    assert_eq!(frames[0]["m"], 0);
    assert_eq!(frames[0]["i"], 2);
    assert_eq!(frames[0]["n"], "GetProducts");

    let payload: serde_json::Value =
        serde_json::from_str(frames[0]["o"].as_str().unwrap()).unwrap();
    assert_eq!(payload, json!({"OMSId": 1}));

    client.close().await;
}

#[tokio::test]
async fn sequence_keeps_stepping_across_reconnect() {
    let venue = MockVenue::start().await;
    let client = connected_client(&venue).await;

    assert_eq!(client.send("LogOut", json!({})).await.unwrap(), 2);
    assert_eq!(client.send("LogOut", json!({})).await.unwrap(), 4);
    venue.wait_for_frames(2).await;

    venue.close(CloseCode::Error);
    assert!(eventually(|| venue.connections() == 2).await);
    assert!(eventually(|| client.state() == ConnectionState::Connected).await);

    assert_eq!(client.send("LogOut", json!({})).await.unwrap(), 6);
    let frames = venue.wait_for_frames(3).await;
    let sequences: Vec<i64> = frames.iter().map(|f| f["i"].as_i64().unwrap()).collect();
    assert_eq!(sequences, vec![2, 4, 6]);
    assert_eq!(client.last_sequence(), 6);

    client.close().await;
}

#[tokio::test]
async fn every_listener_sees_each_frame_in_order() {
    let venue = MockVenue::start().await;
    let client = connected_client(&venue).await;

    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(AtomicUsize::new(0));
    {
        let first = Arc::clone(&first);
        client.add_listener(Arc::new(move |envelope: &Envelope| {
            first.lock().push((envelope.sequence, envelope.message_type));
        }));
    }
    {
        let second = Arc::clone(&second);
        client.add_listener(Arc::new(move |_: &Envelope| {
            second.fetch_add(1, Ordering::SeqCst);
        }));
    }

    venue.push(&reply("SendOrder", 2, &json!({"status": "Accepted"})));
    venue.push(&reply("CancelOrder", 4, &json!({"result": true})));

    assert!(eventually(|| second.load(Ordering::SeqCst) == 2).await);
    assert_eq!(
        *first.lock(),
        vec![(2, MessageType::Response), (4, MessageType::Response)]
    );

    client.close().await;
}

#[tokio::test]
async fn panicking_listener_does_not_starve_others() {
    let venue = MockVenue::start().await;
    let client = connected_client(&venue).await;

    let seen = Arc::new(AtomicUsize::new(0));
    client.add_listener(Arc::new(|_: &Envelope| panic!("listener failure")));
    {
        let seen = Arc::clone(&seen);
        client.add_listener(Arc::new(move |_: &Envelope| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
    }

    venue.push(&reply("GetProducts", 2, &json!({})));
    venue.push(&reply("GetProducts", 4, &json!({})));

    assert!(eventually(|| seen.load(Ordering::SeqCst) == 2).await);
    assert_eq!(client.state(), ConnectionState::Connected);

    client.close().await;
}

#[tokio::test]
async fn undecodable_frames_are_skipped() {
    let venue = MockVenue::start().await;
    let client = connected_client(&venue).await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        client.add_listener(Arc::new(move |envelope: &Envelope| {
            seen.lock().push(envelope.operation.clone());
        }));
    }

    venue.push_raw("not json");
    venue.push(&json!({"m": 1, "i": 2}));
    venue.push(&reply("GetInstruments", 4, &json!({"instruments": []})));

    assert!(eventually(|| seen.lock().len() == 1).await);
    assert_eq!(*seen.lock(), vec!["GetInstruments".to_string()]);
    assert_eq!(client.state(), ConnectionState::Connected);

    client.close().await;
}

#[tokio::test]
async fn clean_close_is_not_reconnected() {
    let venue = MockVenue::start().await;
    let client = connected_client(&venue).await;

    venue.close(CloseCode::Normal);
    assert!(eventually(|| client.state() == ConnectionState::Disconnected).await);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(venue.connections(), 1);
    assert!(matches!(
        client.send("LogOut", json!({})).await,
        Err(TransportError::NotConnected)
    ));

    client.close().await;
}

#[tokio::test]
async fn close_stops_reconnects() {
    let venue = MockVenue::start().await;
    let client = connected_client(&venue).await;

    client.close().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(venue.connections(), 1);
    assert!(matches!(client.connect().await, Err(TransportError::Closed)));
    assert!(matches!(
        client.send("LogOut", json!({})).await,
        Err(TransportError::NotConnected)
    ));
}
