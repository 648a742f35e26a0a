//! Client Handle
//!
//! [`StreamClient`] is the public face of the duplex client. It is a cheap
//! `Clone` handle: every call posts a command to the lifecycle actor and
//! returns immediately. Registering calls hand back their [`HandlerId`]
//! synchronously; the token is allocated here and travels with the command.
//!
//! Handlers run on the actor task. A handler that calls back into the
//! client only enqueues work, so it never observes a half-applied change.
//!
//! # Example
//!
//! ```rust,no_run
//! use c9t_stream_client::{ClientConfig, Handler, spawn_client};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = ClientConfig::from_env()?;
//! let client = spawn_client(&config)?;
//!
//! client.on("status", Handler::new(|args| println!("status: {args:?}")));
//! client.subscribe("balances", Handler::new(|args| println!("balances: {args:?}")));
//! client.start();
//!
//! let orders = client.request("orders").await?;
//! println!("{orders}");
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::correlator::{RequestError, RequestIdGenerator};
use super::lifecycle::{ActorParts, ClientActor, Command};
use super::subscriptions::DEFAULT_AUTO_SUBSCRIBED;
use crate::application::ports::{Connector, HandshakeSigner};
use crate::domain::connection::ConnectionState;
use crate::domain::events::{Handler, HandlerId, HandlerIds, Reply};
use crate::domain::frame::Frame;
use crate::infrastructure::c9t::reconnect::{ReconnectConfig, ReconnectPolicy};

/// Default deadline for `request`.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(3000);

/// Default deadline for `submit`.
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_millis(5000);

// =============================================================================
// Options
// =============================================================================

/// Behavior knobs for a client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Deadline for `request`.
    pub request_timeout: Duration,
    /// Deadline for `submit`.
    pub submit_timeout: Duration,
    /// Topics pushed without subscribe frames.
    pub auto_subscribed: Vec<String>,
    /// Reconnect backoff.
    pub reconnect: ReconnectConfig,
    /// Fixed request id prefix. Random when `None`.
    pub request_prefix: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
            auto_subscribed: DEFAULT_AUTO_SUBSCRIBED.iter().map(ToString::to_string).collect(),
            reconnect: ReconnectConfig::default(),
            request_prefix: None,
        }
    }
}

// =============================================================================
// Stream Client
// =============================================================================

/// Handle to a running client.
#[derive(Clone)]
pub struct StreamClient {
    commands: mpsc::UnboundedSender<Command>,
    ids: Arc<HandlerIds>,
    state: Arc<RwLock<ConnectionState>>,
    cancel: CancellationToken,
    stopped: CancellationToken,
    request_timeout: Duration,
    submit_timeout: Duration,
}

impl std::fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClient")
            .field("state", &*self.state.read())
            .field("closed", &self.stopped.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl StreamClient {
    /// Spawn the lifecycle actor and return a handle to it.
    ///
    /// Does not connect; call [`start`](Self::start). Must be called from
    /// within a tokio runtime.
    #[must_use]
    pub fn spawn(
        connector: Arc<dyn Connector>,
        signer: Arc<dyn HandshakeSigner>,
        options: ClientOptions,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let ids = Arc::new(HandlerIds::new());
        let state = Arc::new(RwLock::new(ConnectionState::Disconnected));
        let cancel = CancellationToken::new();
        let stopped = CancellationToken::new();

        let request_ids = options
            .request_prefix
            .map_or_else(RequestIdGenerator::new, RequestIdGenerator::with_prefix);

        let actor = ClientActor::new(
            ActorParts {
                connector,
                signer,
                ids: Arc::clone(&ids),
                state: Arc::clone(&state),
                auto_subscribed: options.auto_subscribed,
                policy: ReconnectPolicy::new(options.reconnect),
                request_ids,
                cancel: cancel.clone(),
                stopped: stopped.clone(),
            },
            rx,
            tx.downgrade(),
        );
        tokio::spawn(actor.run());

        Self {
            commands: tx,
            ids,
            state,
            cancel,
            stopped,
            request_timeout: options.request_timeout,
            submit_timeout: options.submit_timeout,
        }
    }

    fn post(&self, command: Command) {
        if let Err(mpsc::error::SendError(command)) = self.commands.send(command) {
            tracing::debug!(command = command.name(), "Client closed; dropping command");
            command.abandon();
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open the socket. No-op while a socket exists.
    pub fn start(&self) {
        self.post(Command::Start);
    }

    /// Close the socket and stop the actor.
    ///
    /// Every unresolved request or submission resolves to
    /// [`RequestError::Closed`] and pending waiters receive
    /// [`Reply::Closed`]. Returns immediately; await [`closed`](Self::closed)
    /// to know the socket has been released.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Wait until the actor has stopped and the socket is closed.
    pub async fn closed(&self) {
        self.stopped.cancelled().await;
    }

    /// Whether the socket is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.read().is_connected()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Whether the actor has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.stopped.is_cancelled()
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Register a persistent listener.
    pub fn on(&self, event: &str, handler: Handler) -> HandlerId {
        self.register(event, handler, false)
    }

    /// Register a listener that runs at most once.
    pub fn once(&self, event: &str, handler: Handler) -> HandlerId {
        self.register(event, handler, true)
    }

    fn register(&self, event: &str, handler: Handler, once: bool) -> HandlerId {
        let id = self.ids.next_id();
        self.post(Command::On {
            event: event.to_string(),
            id,
            handler,
            once,
        });
        id
    }

    /// Remove a listener or waiter.
    pub fn off(&self, event: &str, id: HandlerId) {
        self.post(Command::Off {
            event: event.to_string(),
            id,
        });
    }

    /// Wait once for `event`, or time out.
    ///
    /// `reply` receives [`Reply::Closed`] if the client shuts down first.
    pub fn wait_for<F>(&self, event: &str, timeout: Duration, reply: F) -> HandlerId
    where
        F: FnOnce(Reply) + Send + 'static,
    {
        let id = self.ids.next_id();
        self.post(Command::WaitFor {
            event: event.to_string(),
            id,
            timeout,
            reply: Box::new(reply),
        });
        id
    }

    /// Emit an event locally.
    pub fn emit(&self, event: &str, args: Vec<Value>) {
        self.post(Command::Emit {
            event: event.to_string(),
            args,
        });
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Listen to a topic. Waits for the socket if it is down and is
    /// re-established after every reconnect under the same token.
    pub fn subscribe(&self, topic: &str, handler: Handler) -> HandlerId {
        let id = self.ids.next_id();
        self.post(Command::Subscribe {
            topic: topic.to_string(),
            id,
            handler,
            replay: false,
        });
        id
    }

    /// Stop listening to a topic.
    pub fn unsubscribe(&self, topic: &str, id: HandlerId) {
        self.post(Command::Unsubscribe {
            topic: topic.to_string(),
            id,
        });
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Request a topic snapshot with a callback.
    pub fn request_with<F>(&self, topic: &str, callback: F)
    where
        F: FnOnce(Result<Value, RequestError>) + Send + 'static,
    {
        self.request_with_timeout(topic, self.request_timeout, callback);
    }

    /// Request a topic snapshot with a callback and explicit deadline.
    pub fn request_with_timeout<F>(&self, topic: &str, timeout: Duration, callback: F)
    where
        F: FnOnce(Result<Value, RequestError>) + Send + 'static,
    {
        self.post(Command::Request {
            topic: topic.to_string(),
            timeout,
            callback: Box::new(callback),
        });
    }

    /// Request a topic snapshot.
    ///
    /// # Errors
    ///
    /// Returns the server's error, a timeout, or `Closed` if the client
    /// stops first.
    pub async fn request(&self, topic: &str) -> Result<Value, RequestError> {
        let (tx, rx) = oneshot::channel();
        self.request_with(topic, move |outcome| {
            let _ = tx.send(outcome);
        });
        rx.await.unwrap_or(Err(RequestError::Closed))
    }

    /// Submit an item with a callback.
    pub fn submit_with<F>(&self, kind: &str, payload: Value, callback: F)
    where
        F: FnOnce(Result<Value, RequestError>) + Send + 'static,
    {
        self.submit_with_timeout(kind, payload, self.submit_timeout, callback);
    }

    /// Submit an item with a callback and explicit deadline.
    pub fn submit_with_timeout<F>(&self, kind: &str, payload: Value, timeout: Duration, callback: F)
    where
        F: FnOnce(Result<Value, RequestError>) + Send + 'static,
    {
        self.post(Command::Submit {
            kind: kind.to_string(),
            payload,
            timeout,
            callback: Box::new(callback),
        });
    }

    /// Submit an item (`order`, ...).
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` immediately when the socket is down, otherwise
    /// the server's error, a timeout, or `Closed`.
    pub async fn submit(&self, kind: &str, payload: Value) -> Result<Value, RequestError> {
        let (tx, rx) = oneshot::channel();
        self.submit_with(kind, payload, move |outcome| {
            let _ = tx.send(outcome);
        });
        rx.await.unwrap_or(Err(RequestError::Closed))
    }

    // =========================================================================
    // Raw Frames
    // =========================================================================

    /// Send a frame, waiting for the socket to open if it is connecting.
    pub fn send(&self, frame: Frame) {
        self.post(Command::Send(frame));
    }

    /// Send a caller-built JSON array.
    pub fn send_raw(&self, values: Vec<Value>) {
        self.send(Frame::Raw(values));
    }
}
