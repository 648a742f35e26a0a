//! Cloud9Trader Socket Adapters
//!
//! Concrete implementations of the transport ports for the Cloud9Trader
//! socket service.
//!
//! - `auth`: credentials, HMAC handshake signing, connect targets
//! - `codec`: JSON-array frame encoding and decoding
//! - `reconnect`: capped exponential backoff
//! - `websocket`: tokio-tungstenite connector with keep-alive pings

use std::sync::Arc;

pub mod auth;
pub mod codec;
pub mod reconnect;
pub mod websocket;

pub use auth::{AuthError, C9tHandshake, Credentials};
pub use codec::{CodecError, JsonCodec};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use websocket::{WebSocketConnector, WebSocketTransport};

use crate::application::services::StreamClient;
use crate::infrastructure::config::ClientConfig;

/// Spawn a client wired to the real socket service.
///
/// The client is idle until [`StreamClient::start`] is called. Must be called
/// from within a tokio runtime.
///
/// # Errors
///
/// Returns an error if the key is empty or the secret is not valid base64.
pub fn spawn_client(config: &ClientConfig) -> Result<StreamClient, AuthError> {
    let handshake = config.handshake()?;
    tracing::debug!(
        host = %handshake.host(),
        private = config.secret.is_some(),
        "Spawning stream client"
    );

    Ok(StreamClient::spawn(
        Arc::new(WebSocketConnector::new(config.ping_interval)),
        Arc::new(handshake),
        config.client_options(),
    ))
}
