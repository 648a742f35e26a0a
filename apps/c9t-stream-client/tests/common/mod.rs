//! Shared fixtures: an in-memory transport driven by the test.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use c9t_stream_client::{
    ClientOptions, ConnectTarget, Connector, Handler, HandshakeSigner, ReconnectConfig,
    StreamClient, Transport, TransportError, TransportEvents,
};

/// Fixed request id prefix used by test clients.
pub const PREFIX: &str = "T";

// =============================================================================
// Fake Server
// =============================================================================

struct Attempt {
    target: ConnectTarget,
    events: TransportEvents,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<Mutex<bool>>,
}

/// Records every connection attempt and lets the test play the server.
#[derive(Clone, Default)]
pub struct FakeServer {
    attempts: Arc<Mutex<Vec<Attempt>>>,
    silent_close: Arc<AtomicBool>,
}

impl FakeServer {
    /// Number of connection attempts so far.
    pub fn attempts(&self) -> usize {
        self.attempts.lock().len()
    }

    fn with<R>(&self, attempt: usize, f: impl FnOnce(&Attempt) -> R) -> R {
        let attempts = self.attempts.lock();
        f(attempts.get(attempt).expect("no such attempt"))
    }

    /// Target used by an attempt.
    pub fn target(&self, attempt: usize) -> ConnectTarget {
        self.with(attempt, |a| a.target.clone())
    }

    /// Complete the handshake of an attempt.
    pub fn open(&self, attempt: usize) {
        self.with(attempt, |a| a.events.open());
    }

    /// Push a JSON array to the client.
    pub fn push(&self, attempt: usize, frame: Value) {
        self.with(attempt, |a| a.events.message(frame.to_string()));
    }

    /// Push raw text to the client.
    pub fn push_text(&self, attempt: usize, text: &str) {
        self.with(attempt, |a| a.events.message(text));
    }

    /// Drop the connection from the server side.
    pub fn drop_connection(&self, attempt: usize) {
        self.with(attempt, |a| a.events.close());
    }

    /// Fail an attempt with `err`, then close it.
    pub fn fail(&self, attempt: usize, err: TransportError) {
        self.with(attempt, |a| {
            a.events.error(err);
            a.events.close();
        });
    }

    /// Frames the client sent on an attempt.
    pub fn sent(&self, attempt: usize) -> Vec<Value> {
        self.with(attempt, |a| {
            a.sent
                .lock()
                .iter()
                .map(|text| serde_json::from_str(text).unwrap())
                .collect()
        })
    }

    /// Make later transports swallow `close()` without reporting it.
    pub fn never_report_close(&self) {
        self.silent_close.store(true, Ordering::SeqCst);
    }

    /// Whether the client closed an attempt.
    pub fn closed_by_client(&self, attempt: usize) -> bool {
        self.with(attempt, |a| *a.closed.lock())
    }
}

impl Connector for FakeServer {
    fn connect(&self, target: ConnectTarget, events: TransportEvents) -> Box<dyn Transport> {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(Mutex::new(false));
        self.attempts.lock().push(Attempt {
            target,
            events: events.clone(),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        });
        Box::new(FakeTransport {
            events,
            sent,
            closed,
            silent_close: self.silent_close.load(Ordering::SeqCst),
        })
    }
}

struct FakeTransport {
    events: TransportEvents,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<Mutex<bool>>,
    silent_close: bool,
}

impl Transport for FakeTransport {
    fn send(&mut self, text: String) -> Result<(), TransportError> {
        if *self.closed.lock() {
            return Err(TransportError::Closed);
        }
        self.sent.lock().push(text);
        Ok(())
    }

    fn close(&mut self) {
        let mut closed = self.closed.lock();
        if !*closed {
            *closed = true;
            if !self.silent_close {
                self.events.close();
            }
        }
    }
}

// =============================================================================
// Signer
// =============================================================================

/// Always targets the same URL.
pub struct FixedSigner;

impl HandshakeSigner for FixedSigner {
    fn connect_target(&self) -> ConnectTarget {
        ConnectTarget::new("wss://sockets.test.invalid/?key=test-key")
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Options with a fixed request prefix and no jitter.
pub fn options() -> ClientOptions {
    ClientOptions {
        request_prefix: Some(PREFIX.to_string()),
        reconnect: ReconnectConfig::default(),
        ..ClientOptions::default()
    }
}

/// Spawn a client against a fresh fake server.
pub fn client() -> (StreamClient, FakeServer) {
    client_with(options())
}

/// Spawn a client with explicit options.
pub fn client_with(options: ClientOptions) -> (StreamClient, FakeServer) {
    let server = FakeServer::default();
    let client = StreamClient::spawn(Arc::new(server.clone()), Arc::new(FixedSigner), options);
    (client, server)
}

/// Let the actor drain its queues.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

/// Move paused time forward and let timers fire.
pub async fn advance(by: Duration) {
    tokio::time::advance(by).await;
    settle().await;
}

/// A handler that records every invocation.
pub fn recorder() -> (Handler, Arc<Mutex<Vec<Vec<Value>>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    let handler = Handler::new(move |args| sink.lock().push(args.to_vec()));
    (handler, calls)
}

/// Start the client and open its first attempt.
pub async fn connect(client: &StreamClient, server: &FakeServer) {
    client.start();
    settle().await;
    server.open(server.attempts() - 1);
    settle().await;
}
