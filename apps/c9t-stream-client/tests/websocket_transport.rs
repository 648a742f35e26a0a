//! WebSocket Transport Integration Tests
//!
//! Runs the real connector against a local tungstenite server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

use c9t_stream_client::infrastructure::c9t::auth::AUTH_REJECTED_MESSAGE;
use c9t_stream_client::{ClientConfig, ERROR, Handler, spawn_client};

const WAIT: Duration = Duration::from_secs(5);

fn channel_handler() -> (Handler, mpsc::UnboundedReceiver<Vec<Value>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = Handler::new(move |args| {
        let _ = tx.send(args.to_vec());
    });
    (handler, rx)
}

#[tokio::test]
async fn signed_handshake_subscribe_and_push() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (headers_tx, headers_rx) = oneshot::channel();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_hdr_async(stream, move |req: &Request, resp: Response| {
            let header = |name: &str| {
                req.headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            let _ = headers_tx.send((header("x-c9t-key"), header("x-c9t-signature")));
            Ok(resp)
        })
        .await
        .unwrap();

        let first = ws.next().await.unwrap().unwrap();
        assert_eq!(first.into_text().unwrap().as_str(), r#"["subscribe","balances"]"#);

        ws.send(Message::text(r#"["balances",{"USD":5}]"#))
            .await
            .unwrap();

        while let Some(Ok(msg)) = ws.next().await {
            if msg.is_close() {
                return true;
            }
        }
        false
    });

    let mut config = ClientConfig::new("desk-key");
    config.host = format!("ws://{addr}/");
    config.secret = Some("c2VjcmV0".to_string());
    config.ping_interval = None;

    let client = spawn_client(&config).unwrap();
    let (handler, mut pushes) = channel_handler();
    client.subscribe("balances", handler);
    client.start();

    let push = timeout(WAIT, pushes.recv()).await.unwrap().unwrap();
    assert_eq!(push, vec![json!({"USD": 5})]);

    let (key, signature) = headers_rx.await.unwrap();
    assert_eq!(key.as_deref(), Some("desk-key"));
    assert_eq!(signature.map(|s| s.len()), Some(64));

    client.shutdown();
    timeout(WAIT, client.closed()).await.unwrap();
    assert!(client.is_closed());

    let saw_close = timeout(WAIT, server).await.unwrap().unwrap();
    assert!(saw_close, "server never received a close frame");
}

#[tokio::test]
async fn rejected_handshake_reports_authentication_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let rejected = accept_hdr_async(stream, |_: &Request, _: Response| {
            let mut resp = ErrorResponse::new(Some("unauthorized".to_string()));
            *resp.status_mut() = StatusCode::UNAUTHORIZED;
            Err(resp)
        })
        .await;
        assert!(rejected.is_err());
    });

    let mut config = ClientConfig::new("bad-key");
    config.host = format!("ws://{addr}/");
    config.ping_interval = None;

    let client = spawn_client(&config).unwrap();
    let (handler, mut errors) = channel_handler();
    client.on(ERROR, handler);
    client.start();

    let error = timeout(WAIT, errors.recv()).await.unwrap().unwrap();
    assert_eq!(error, vec![Value::from(AUTH_REJECTED_MESSAGE)]);
    assert!(!client.is_connected());

    client.shutdown();
    timeout(WAIT, server).await.unwrap().unwrap();
}
