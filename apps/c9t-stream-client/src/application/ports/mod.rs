//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `Connector`: opens one message-oriented transport per connection attempt
//! - `Transport`: the open handle used to push text frames and close
//! - `HandshakeSigner`: builds the connect target (URL and headers) for an attempt
//!
//! Transports report back through [`TransportEvents`], a sender tagged with
//! the generation of the attempt that created it. The lifecycle actor drops
//! events whose generation is no longer current, so a transport that outlives
//! its attempt cannot disturb the next one.

use tokio::sync::mpsc;

// =============================================================================
// Connect Target
// =============================================================================

/// Where and how to open a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    /// Full URL including any query string.
    pub url: String,
    /// Extra handshake headers.
    pub headers: Vec<(String, String)>,
}

impl ConnectTarget {
    /// Target with no extra headers.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Add a handshake header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Look up a header value by name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Builds the connect target for each connection attempt.
///
/// Called once per attempt so signed targets get a fresh nonce.
pub trait HandshakeSigner: Send + Sync {
    /// Produce the target for the next attempt.
    fn connect_target(&self) -> ConnectTarget;
}

// =============================================================================
// Transport Errors and Events
// =============================================================================

/// Errors reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The server answered the handshake with a non-upgrade HTTP status.
    #[error("unexpected server response: {0}")]
    HttpStatus(u16),

    /// The connection broke mid-stream.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The transport is already closed.
    #[error("transport closed")]
    Closed,
}

/// Something that happened on a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The handshake completed.
    Open,
    /// A text frame arrived.
    Message(String),
    /// An error occurred. Does not imply close.
    Error(TransportError),
    /// The transport is gone. Always the last event of a generation.
    Close,
}

/// Generation-tagged sender handed to a transport.
#[derive(Debug, Clone)]
pub struct TransportEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
}

impl TransportEvents {
    /// Create a sender for one connection attempt.
    #[must_use]
    pub const fn new(generation: u64, tx: mpsc::UnboundedSender<(u64, TransportEvent)>) -> Self {
        Self { generation, tx }
    }

    /// Generation of the attempt this sender belongs to.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Report an event. Returns `false` once the client is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx.send((self.generation, event)).is_ok()
    }

    /// Report the handshake completing.
    pub fn open(&self) -> bool {
        self.emit(TransportEvent::Open)
    }

    /// Report an inbound text frame.
    pub fn message(&self, text: impl Into<String>) -> bool {
        self.emit(TransportEvent::Message(text.into()))
    }

    /// Report an error.
    pub fn error(&self, err: TransportError) -> bool {
        self.emit(TransportEvent::Error(err))
    }

    /// Report the transport closing.
    pub fn close(&self) -> bool {
        self.emit(TransportEvent::Close)
    }
}

// =============================================================================
// Transport Ports
// =============================================================================

/// An open (or opening) transport.
pub trait Transport: Send {
    /// Queue a text frame for sending.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if the transport is gone.
    fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the transport. A `Close` event follows unless the client is gone.
    fn close(&mut self);
}

/// Opens transports.
pub trait Connector: Send + Sync {
    /// Start opening a transport to `target`.
    ///
    /// Must return immediately; progress is reported through `events`.
    /// Failures are reported as `Error` followed by `Close`.
    fn connect(&self, target: ConnectTarget, events: TransportEvents) -> Box<dyn Transport>;
}
