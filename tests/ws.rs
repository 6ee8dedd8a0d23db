//! Streaming scenarios: subscribe, broadcast fan-out, ack.

mod utils;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use utils::spawn_app;

async fn next_json(
    stream: &mut tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match stream.next().await.expect("stream ended").unwrap() {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                Message::Ping(_) | Message::Pong(_) => continue,
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    })
    .await
    .expect("timed out waiting for a frame")
}

#[tokio::test]
async fn subscribe_and_receive_broadcast() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(app.http_url("/queue/create"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let handle = created["queue_id"].as_str().unwrap().to_string();

    let (mut socket, _) = connect_async(app.ws_url()).await.expect("ws connect failed");
    socket
        .send(Message::Text(
            json!({ "type": "subscribe", "queue_id": handle }).to_string(),
        ))
        .await
        .unwrap();

    // Give the subscribe frame time to attach before the message lands.
    tokio::time::sleep(Duration::from_millis(50)).await;

    client
        .post(app.http_url(&format!("/queue/{handle}/send")))
        .json(&json!({ "payload": [7, 7] }))
        .send()
        .await
        .unwrap();

    let frame = next_json(&mut socket).await;
    assert_eq!(frame["type"], "message");
    assert_eq!(frame["queue_id"], handle);
    assert_eq!(frame["payload"], json!([7, 7]));
}

#[tokio::test]
async fn subscribe_with_wrong_token_is_rejected() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let a: Value = client
        .post(app.http_url("/queue/create"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let b: Value = client
        .post(app.http_url("/queue/create"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let handle = a["queue_id"].as_str().unwrap().to_string();
    let wrong_token = b["access_token"].as_str().unwrap().to_string();

    let (mut socket, _) = connect_async(app.ws_url()).await.expect("ws connect failed");
    socket
        .send(Message::Text(
            json!({
                "type": "subscribe",
                "queue_id": handle,
                "access_token": wrong_token,
            })
            .to_string(),
        ))
        .await
        .unwrap();

    let frame = next_json(&mut socket).await;
    assert_eq!(frame["type"], "error");
}

#[tokio::test]
async fn ping_is_answered_with_pong() {
    let app = spawn_app().await;
    let (mut socket, _) = connect_async(app.ws_url()).await.expect("ws connect failed");

    socket
        .send(Message::Text(json!({ "type": "ping" }).to_string()))
        .await
        .unwrap();

    let frame = next_json(&mut socket).await;
    assert_eq!(frame["type"], "pong");
}

#[tokio::test]
async fn ack_removes_message_from_subsequent_poll() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(app.http_url("/queue/create"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let handle = created["queue_id"].as_str().unwrap().to_string();
    let token = created["access_token"].as_str().unwrap().to_string();

    let sent: Value = client
        .post(app.http_url(&format!("/queue/{handle}/send")))
        .json(&json!({ "payload": [1] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let message_id = sent["message_id"].as_str().unwrap().to_string();

    let (mut socket, _) = connect_async(app.ws_url()).await.expect("ws connect failed");
    socket
        .send(Message::Text(
            json!({
                "type": "ack",
                "queue_id": handle,
                "message_id": message_id,
                "access_token": token,
            })
            .to_string(),
        ))
        .await
        .unwrap();

    // Acks are processed asynchronously; give it a moment.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let received: Value = client
        .get(app.http_url(&format!("/queue/{handle}/receive")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(received["messages"].as_array().unwrap().is_empty());
}
