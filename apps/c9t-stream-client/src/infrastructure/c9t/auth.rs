//! Socket Authentication
//!
//! Builds the connect target for each connection attempt.
//!
//! # Modes
//!
//! ## Public (key only)
//! The key travels in the query string: `wss://host?key=<key>`.
//!
//! ## Private (key and secret)
//! The handshake carries three headers:
//!
//! - `x-c9t-key`: the API key
//! - `x-c9t-nonce`: current epoch milliseconds
//! - `x-c9t-signature`: hex HMAC-SHA256 keyed with the base64-decoded
//!   secret, over `path + [JSON body] + nonce`
//!
//! A new nonce (and so a new signature) is produced for every attempt.
//!
//! # Error Codes
//!
//! - 401 on the upgrade response: key or secret rejected

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;
use url::form_urlencoded;

use crate::application::ports::{ConnectTarget, HandshakeSigner, TransportError};

type HmacSha256 = Hmac<Sha256>;

// =============================================================================
// Constants
// =============================================================================

/// Default socket endpoint.
pub const DEFAULT_HOST: &str = "wss://sockets.cloud9trader.com";

/// Path covered by the handshake signature.
pub const SIGNED_PATH: &str = "/";

/// API key header.
pub const HEADER_KEY: &str = "x-c9t-key";

/// Nonce header.
pub const HEADER_NONCE: &str = "x-c9t-nonce";

/// Signature header.
pub const HEADER_SIGNATURE: &str = "x-c9t-signature";

/// Message emitted on `error` when the server rejects the handshake with 401.
pub const AUTH_REJECTED_MESSAGE: &str =
    "401 Authentication rejected by server. Check that your key and secret are correct";

// =============================================================================
// Error Types
// =============================================================================

/// Errors building credentials.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The API key is empty.
    #[error("API key cannot be empty")]
    MissingKey,

    /// The secret is not valid base64.
    #[error("API secret is not valid base64: {0}")]
    InvalidSecret(String),
}

// =============================================================================
// Credentials
// =============================================================================

/// API key with an optional signing secret.
#[derive(Clone)]
pub struct Credentials {
    key: String,
    secret: Option<Vec<u8>>,
}

impl Credentials {
    /// Create credentials, decoding the secret up front.
    ///
    /// An empty secret counts as absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty or the secret is not base64.
    pub fn new(key: impl Into<String>, secret: Option<&str>) -> Result<Self, AuthError> {
        let key = key.into();
        if key.is_empty() {
            return Err(AuthError::MissingKey);
        }

        let secret = match secret.filter(|s| !s.is_empty()) {
            Some(encoded) => Some(
                STANDARD
                    .decode(encoded)
                    .map_err(|e| AuthError::InvalidSecret(e.to_string()))?,
            ),
            None => None,
        };

        Ok(Self { key, secret })
    }

    /// Key-only credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty.
    pub fn public(key: impl Into<String>) -> Result<Self, AuthError> {
        Self::new(key, None)
    }

    /// Get the API key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Check whether connections are signed.
    #[must_use]
    pub const fn is_private(&self) -> bool {
        self.secret.is_some()
    }

    /// Compute the signature headers for `path`, optional `body` and `nonce_millis`.
    ///
    /// Returns `None` for public credentials.
    #[must_use]
    pub fn signed_headers(
        &self,
        path: &str,
        body: Option<&Value>,
        nonce_millis: i64,
    ) -> Option<Vec<(String, String)>> {
        let secret = self.secret.as_ref()?;
        let nonce = nonce_millis.to_string();

        // HMAC accepts keys of any length.
        let mut mac = HmacSha256::new_from_slice(secret).ok()?;
        mac.update(path.as_bytes());
        if let Some(body) = body {
            mac.update(body.to_string().as_bytes());
        }
        mac.update(nonce.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Some(vec![
            (HEADER_KEY.to_string(), self.key.clone()),
            (HEADER_NONCE.to_string(), nonce),
            (HEADER_SIGNATURE.to_string(), signature),
        ])
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// =============================================================================
// Handshake
// =============================================================================

/// Builds public or signed connect targets against one host.
#[derive(Debug, Clone)]
pub struct C9tHandshake {
    host: String,
    credentials: Credentials,
}

impl C9tHandshake {
    /// Create a handshake for `host`.
    #[must_use]
    pub fn new(host: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            host: host.into(),
            credentials,
        }
    }

    /// Host the handshake connects to.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Connect target for a given nonce.
    #[must_use]
    pub fn target_at(&self, nonce_millis: i64) -> ConnectTarget {
        match self
            .credentials
            .signed_headers(SIGNED_PATH, None, nonce_millis)
        {
            Some(headers) => ConnectTarget {
                url: self.host.clone(),
                headers,
            },
            None => {
                let query = form_urlencoded::Serializer::new(String::new())
                    .append_pair("key", self.credentials.key())
                    .finish();
                ConnectTarget::new(format!("{}?{query}", self.host))
            }
        }
    }
}

impl HandshakeSigner for C9tHandshake {
    fn connect_target(&self) -> ConnectTarget {
        self.target_at(chrono::Utc::now().timestamp_millis())
    }
}

/// Message emitted on `error` for a transport error.
#[must_use]
pub fn describe_transport_error(err: &TransportError) -> String {
    match err {
        TransportError::HttpStatus(401) => AUTH_REJECTED_MESSAGE.to_string(),
        other => other.to_string(),
    }
}
