//! WebSocket Transport
//!
//! [`Connector`] implementation over tokio-tungstenite. Each connection
//! attempt runs in its own task which owns the socket; the returned
//! [`Transport`] only holds the outbound queue and a cancellation token.
//!
//! # Keep-alive
//!
//! When a ping interval is configured the task sends a ping frame on every
//! tick. Server pings are answered with pongs.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    ConnectTarget, Connector, Transport, TransportError, TransportEvents,
};

/// Default keep-alive ping interval.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(20);

// =============================================================================
// Connector
// =============================================================================

/// Opens WebSocket transports.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    ping_interval: Option<Duration>,
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(Some(DEFAULT_PING_INTERVAL))
    }
}

impl WebSocketConnector {
    /// Create a connector. `None` disables keep-alive pings.
    #[must_use]
    pub const fn new(ping_interval: Option<Duration>) -> Self {
        Self { ping_interval }
    }
}

impl Connector for WebSocketConnector {
    fn connect(&self, target: ConnectTarget, events: TransportEvents) -> Box<dyn Transport> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        tokio::spawn(run_socket(
            target,
            events,
            outbound_rx,
            cancel.clone(),
            self.ping_interval,
        ));

        Box::new(WebSocketTransport {
            outbound: outbound_tx,
            cancel,
        })
    }
}

// =============================================================================
// Transport Handle
// =============================================================================

/// Handle to one socket task.
#[derive(Debug)]
pub struct WebSocketTransport {
    outbound: mpsc::UnboundedSender<Message>,
    cancel: CancellationToken,
}

impl Transport for WebSocketTransport {
    fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.outbound
            .send(Message::Text(text.into()))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        self.cancel.cancel();
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// =============================================================================
// Socket Task
// =============================================================================

/// Build the upgrade request with handshake headers.
///
/// # Errors
///
/// Returns an error if the URL or a header is invalid.
pub fn build_request(target: &ConnectTarget) -> Result<Request, TransportError> {
    let mut request = target
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| TransportError::Connect(e.to_string()))?;

    for (name, value) in &target.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::Connect(format!("invalid header name {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::Connect(format!("invalid header value: {e}")))?;
        request.headers_mut().insert(name, value);
    }

    Ok(request)
}

fn map_error(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::Http(response) => TransportError::HttpStatus(response.status().as_u16()),
        tungstenite::Error::Io(e) => TransportError::Connect(e.to_string()),
        tungstenite::Error::Url(e) => TransportError::Connect(e.to_string()),
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Closed
        }
        other => TransportError::Protocol(other.to_string()),
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn run_socket(
    target: ConnectTarget,
    events: TransportEvents,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    cancel: CancellationToken,
    ping_interval: Option<Duration>,
) {
    let generation = events.generation();

    let request = match build_request(&target) {
        Ok(request) => request,
        Err(e) => {
            tracing::error!(generation, error = %e, "Invalid connect target");
            events.error(e);
            events.close();
            return;
        }
    };

    tracing::debug!(generation, url = %target.url, "Opening socket");

    let connected = tokio::select! {
        () = cancel.cancelled() => {
            events.close();
            return;
        }
        result = tokio_tungstenite::connect_async(request) => result,
    };

    let (ws_stream, _response) = match connected {
        Ok(ok) => ok,
        Err(e) => {
            let err = map_error(e);
            tracing::warn!(generation, error = %err, "Socket handshake failed");
            events.error(err);
            events.close();
            return;
        }
    };

    events.open();

    let (mut write, mut read) = ws_stream.split();
    let mut ping = ping_interval.map(|period| tokio::time::interval_at(Instant::now() + period, period));

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            () = tick(&mut ping) => {
                if let Err(e) = write.send(Message::Ping(Vec::new().into())).await {
                    events.error(map_error(e));
                    break;
                }
            }
            out = outbound.recv() => {
                let Some(message) = out else {
                    break;
                };
                if let Err(e) = write.send(message).await {
                    events.error(map_error(e));
                    break;
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        events.message(text.as_str());
                    }
                    Some(Ok(Message::Binary(data))) => {
                        if let Ok(text) = String::from_utf8(data.to_vec()) {
                            events.message(text);
                        } else {
                            tracing::warn!(len = data.len(), "Received non-UTF8 binary message");
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(generation, ?frame, "Server sent close frame");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        events.error(map_error(e));
                        break;
                    }
                    None => {
                        tracing::debug!(generation, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    events.close();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_headers() {
        let target = ConnectTarget::new("wss://sockets.example.test")
            .with_header("x-c9t-key", "abc")
            .with_header("x-c9t-nonce", "1");

        let request = build_request(&target).unwrap();

        assert_eq!(request.uri().host(), Some("sockets.example.test"));
        assert_eq!(request.headers().get("x-c9t-key").unwrap(), "abc");
        assert_eq!(request.headers().get("x-c9t-nonce").unwrap(), "1");
    }

    #[test]
    fn invalid_url_is_connect_error() {
        let target = ConnectTarget::new("not a url");
        assert!(matches!(
            build_request(&target),
            Err(TransportError::Connect(_))
        ));
    }

    #[test]
    fn invalid_header_is_connect_error() {
        let target = ConnectTarget::new("wss://sockets.example.test").with_header("bad header", "x");
        assert!(matches!(
            build_request(&target),
            Err(TransportError::Connect(_))
        ));
    }

    #[test]
    fn closed_errors_map_to_closed() {
        assert_eq!(
            map_error(tungstenite::Error::ConnectionClosed),
            TransportError::Closed
        );
    }
}
