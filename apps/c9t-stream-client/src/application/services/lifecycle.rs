//! Connection Lifecycle Actor
//!
//! The single task that owns all client state: the dispatcher, the
//! subscription registry, the transport link, the reconnect policy and its
//! timer. Client handles talk to it through [`Command`]s.
//!
//! # Lifecycle
//!
//! ```text
//! start() ──► Connecting ──open──► Connected ──close──► Disconnected
//!                 │                                        │
//!                 └────────────close───────────────────────┤
//!                                                          ▼
//!                                   "Waiting for reconnect" ── delay ──► start()
//! ```
//!
//! # Deferred Replay
//!
//! Calls that need a live socket while there is none (`request`,
//! `subscribe`, and `send` on a socket still opening) are parked as one-shot
//! `connected` listeners. When `connected` fires the parked command is posted
//! back onto the actor's own queue and runs after the emission completes.
//!
//! # Shutdown
//!
//! Every callback the actor holds resolves exactly once. On stop, in-flight
//! waiters get [`Reply::Closed`] and parked or queued commands are
//! abandoned, which resolves their callbacks with [`RequestError::Closed`].
//! The actor then waits up to [`CLOSE_GRACE`] for the socket to report its
//! close before marking itself stopped.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;

use super::correlator::{RequestError, RequestIdGenerator, ResponseCallback, reply_handler};
use super::dispatcher::{EventDispatcher, ReplyHandler};
use super::subscriptions::{SubscribeOutcome, SubscriptionManager, UnsubscribeOutcome};
use crate::application::ports::{
    Connector, HandshakeSigner, Transport, TransportError, TransportEvent, TransportEvents,
};
use crate::domain::connection::{ConnectionState, Status};
use crate::domain::events::{self, Handler, HandlerId, HandlerIds, Reply};
use crate::domain::frame::Frame;
use crate::infrastructure::c9t::auth::describe_transport_error;
use crate::infrastructure::c9t::codec::JsonCodec;
use crate::infrastructure::c9t::reconnect::ReconnectPolicy;
use crate::infrastructure::metrics;

/// How long shutdown waits for the socket to finish closing.
pub const CLOSE_GRACE: Duration = Duration::from_secs(2);

// =============================================================================
// Commands
// =============================================================================

/// Work posted to the actor by client handles (and by itself on replay).
pub enum Command {
    /// Open the transport if none exists.
    Start,
    /// Register a listener.
    On {
        /// Event name.
        event: String,
        /// Token handed to the caller.
        id: HandlerId,
        /// Listener.
        handler: Handler,
        /// Remove after the first invocation.
        once: bool,
    },
    /// Remove a registration.
    Off {
        /// Event name.
        event: String,
        /// Token to remove.
        id: HandlerId,
    },
    /// Register a timed one-shot waiter.
    WaitFor {
        /// Event name.
        event: String,
        /// Token handed to the caller.
        id: HandlerId,
        /// Deadline.
        timeout: Duration,
        /// Outcome callback.
        reply: ReplyHandler,
    },
    /// Emit an event locally.
    Emit {
        /// Event name.
        event: String,
        /// Arguments.
        args: Vec<Value>,
    },
    /// Attach a topic listener.
    Subscribe {
        /// Topic.
        topic: String,
        /// Token handed to the caller.
        id: HandlerId,
        /// Listener.
        handler: Handler,
        /// Posted by a deferred replay rather than by a caller.
        replay: bool,
    },
    /// Detach a topic listener.
    Unsubscribe {
        /// Topic.
        topic: String,
        /// Token to remove.
        id: HandlerId,
    },
    /// Correlated snapshot request.
    Request {
        /// Topic to request.
        topic: String,
        /// Deadline.
        timeout: Duration,
        /// Outcome callback.
        callback: ResponseCallback,
    },
    /// Correlated submission.
    Submit {
        /// Submission kind.
        kind: String,
        /// Opaque body.
        payload: Value,
        /// Deadline.
        timeout: Duration,
        /// Outcome callback.
        callback: ResponseCallback,
    },
    /// Send a frame.
    Send(Frame),
}

impl Command {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::On { .. } => "on",
            Self::Off { .. } => "off",
            Self::WaitFor { .. } => "wait_for",
            Self::Emit { .. } => "emit",
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::Request { .. } => "request",
            Self::Submit { .. } => "submit",
            Self::Send(_) => "send",
        }
    }

    /// Resolve any callback carried by a command that will never run.
    pub fn abandon(self) {
        match self {
            Self::Request { callback, .. } | Self::Submit { callback, .. } => {
                callback(Err(RequestError::Closed));
            }
            Self::WaitFor { reply, .. } => reply(Reply::Closed),
            _ => {}
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Command").field(&self.name()).finish()
    }
}

// =============================================================================
// Actor
// =============================================================================

struct Link {
    generation: u64,
    transport: Box<dyn Transport>,
    open: bool,
}

/// Owns and drives one client connection.
pub struct ClientActor {
    connector: Arc<dyn Connector>,
    signer: Arc<dyn HandshakeSigner>,
    codec: JsonCodec,
    ids: Arc<HandlerIds>,
    dispatcher: EventDispatcher,
    subscriptions: SubscriptionManager,
    /// Listener token -> token of the parked `connected` replay.
    pending_subscribes: HashMap<HandlerId, HandlerId>,
    /// Commands parked on `connected`, by listener token.
    parked: HashMap<HandlerId, Arc<Mutex<Option<Command>>>>,
    request_ids: RequestIdGenerator,
    state: Arc<RwLock<ConnectionState>>,
    link: Option<Link>,
    generation: u64,
    policy: ReconnectPolicy,
    reconnect: Option<Pin<Box<Sleep>>>,
    commands: mpsc::UnboundedReceiver<Command>,
    replay: mpsc::WeakUnboundedSender<Command>,
    transport_tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
    transport_rx: mpsc::UnboundedReceiver<(u64, TransportEvent)>,
    cancel: CancellationToken,
    stopped: CancellationToken,
}

/// Everything the actor needs besides its command queue.
pub struct ActorParts {
    /// Opens transports.
    pub connector: Arc<dyn Connector>,
    /// Builds connect targets.
    pub signer: Arc<dyn HandshakeSigner>,
    /// Token allocator shared with handles.
    pub ids: Arc<HandlerIds>,
    /// State mirror shared with handles.
    pub state: Arc<RwLock<ConnectionState>>,
    /// Topics pushed without subscribing.
    pub auto_subscribed: Vec<String>,
    /// Reconnect backoff.
    pub policy: ReconnectPolicy,
    /// Request id generator.
    pub request_ids: RequestIdGenerator,
    /// Stops the actor.
    pub cancel: CancellationToken,
    /// Cancelled by the actor once it has fully stopped.
    pub stopped: CancellationToken,
}

impl ClientActor {
    /// Create an actor reading from `commands`.
    ///
    /// `replay` must feed the same queue; it is held weakly so the actor ends
    /// once every handle is gone.
    #[must_use]
    pub fn new(
        parts: ActorParts,
        commands: mpsc::UnboundedReceiver<Command>,
        replay: mpsc::WeakUnboundedSender<Command>,
    ) -> Self {
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        Self {
            connector: parts.connector,
            signer: parts.signer,
            codec: JsonCodec::new(),
            dispatcher: EventDispatcher::new(Arc::clone(&parts.ids)),
            ids: parts.ids,
            subscriptions: SubscriptionManager::new(parts.auto_subscribed),
            pending_subscribes: HashMap::new(),
            parked: HashMap::new(),
            request_ids: parts.request_ids,
            state: parts.state,
            link: None,
            generation: 0,
            policy: parts.policy,
            reconnect: None,
            commands,
            replay,
            transport_tx,
            transport_rx,
            cancel: parts.cancel,
            stopped: parts.stopped,
        }
    }

    /// Run until cancelled or until every handle is dropped.
    pub async fn run(mut self) {
        tracing::debug!(prefix = %self.request_ids.prefix(), "Client actor started");

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!("Client shut down");
                    break;
                }
                command = self.commands.recv() => {
                    let Some(command) = command else {
                        tracing::debug!("All client handles dropped");
                        break;
                    };
                    self.handle_command(command);
                }
                Some((generation, event)) = self.transport_rx.recv() => {
                    self.handle_transport(generation, event);
                }
                expiry = self.dispatcher.next_expiry() => {
                    self.dispatcher.expire(&expiry);
                }
                () = wait_reconnect(&mut self.reconnect) => {
                    self.reconnect = None;
                    self.policy.record_attempt();
                    self.start();
                }
            }
        }

        self.stop().await;
    }

    // =========================================================================
    // Commands
    // =========================================================================

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start => {
                // An explicit start supersedes a pending reconnect.
                self.reconnect = None;
                self.start();
            }
            Command::On {
                event,
                id,
                handler,
                once,
            } => {
                self.dispatcher.insert(&event, id, handler, once);
            }
            Command::Off { event, id } => {
                self.dispatcher.off(&event, id);
            }
            Command::WaitFor {
                event,
                id,
                timeout,
                reply,
            } => self.dispatcher.insert_waiter(&event, id, timeout, reply),
            Command::Emit { event, args } => {
                self.dispatcher.emit(&event, &args);
            }
            Command::Subscribe {
                topic,
                id,
                handler,
                replay,
            } => self.subscribe(topic, id, handler, replay),
            Command::Unsubscribe { topic, id } => self.unsubscribe(&topic, id),
            Command::Request {
                topic,
                timeout,
                callback,
            } => self.request(topic, timeout, callback),
            Command::Submit {
                kind,
                payload,
                timeout,
                callback,
            } => self.submit(kind, payload, timeout, callback),
            Command::Send(frame) => self.send(frame),
        }
    }

    fn is_connected(&self) -> bool {
        self.state.read().is_connected()
    }

    /// Park a command until the next `connected` emission.
    fn defer(&mut self, command: Command) -> HandlerId {
        tracing::debug!(command = command.name(), "Deferring until connected");

        let slot = Arc::new(Mutex::new(Some(command)));
        let pending = Arc::clone(&slot);
        let replay = self.replay.clone();
        let handler = Handler::new(move |_| {
            let Some(command) = pending.lock().take() else {
                return;
            };
            if let Some(tx) = replay.upgrade()
                && let Err(mpsc::error::SendError(command)) = tx.send(command)
            {
                command.abandon();
            }
        });

        let id = self.ids.next_id();
        self.parked.insert(id, slot);
        self.dispatcher.insert(events::CONNECTED, id, handler, true)
    }

    fn subscribe(&mut self, topic: String, id: HandlerId, handler: Handler, replay: bool) {
        if replay && self.pending_subscribes.remove(&id).is_none() {
            // Unsubscribed while parked.
            return;
        }

        if !self.is_connected() {
            let parked = self.defer(Command::Subscribe {
                topic,
                id,
                handler,
                replay: true,
            });
            self.pending_subscribes.insert(id, parked);
            return;
        }

        match self.subscriptions.add(&topic, id, handler.clone()) {
            SubscribeOutcome::First { frame } => {
                tracing::info!(topic = %topic, "Subscribed");
                if let Some(frame) = frame {
                    self.send(frame);
                }
                self.dispatcher.insert(&topic, id, handler, false);
            }
            SubscribeOutcome::Joined => {
                self.dispatcher.insert(&topic, id, handler, false);
            }
            SubscribeOutcome::Duplicate => {
                tracing::debug!(topic = %topic, listener = %id, "Listener already subscribed");
            }
        }
    }

    fn unsubscribe(&mut self, topic: &str, id: HandlerId) {
        if let Some(parked) = self.pending_subscribes.remove(&id) {
            self.dispatcher.off(events::CONNECTED, parked);
            self.parked.remove(&parked);
            tracing::debug!(topic = %topic, listener = %id, "Cancelled deferred subscribe");
            return;
        }

        match self.subscriptions.remove(topic, id) {
            UnsubscribeOutcome::UnknownTopic => {
                tracing::warn!(topic = %topic, "No existing subscriptions for topic");
            }
            UnsubscribeOutcome::NotSubscribed => {
                tracing::debug!(topic = %topic, listener = %id, "Listener not subscribed");
            }
            UnsubscribeOutcome::Remaining(remaining) => {
                self.dispatcher.off(topic, id);
                tracing::debug!(topic = %topic, remaining, "Listener removed");
            }
            UnsubscribeOutcome::Last { frame } => {
                self.dispatcher.off(topic, id);
                tracing::info!(topic = %topic, "Unsubscribed");
                if let Some(frame) = frame {
                    self.send(frame);
                }
            }
        }
    }

    fn request(&mut self, topic: String, timeout: Duration, callback: ResponseCallback) {
        if !self.is_connected() {
            self.defer(Command::Request {
                topic,
                timeout,
                callback,
            });
            return;
        }

        let request_id = self.request_ids.next_id();
        tracing::debug!(topic = %topic, request_id = %request_id, "Request");
        self.send(Frame::Request {
            topic,
            request_id: request_id.clone(),
        });
        self.dispatcher
            .wait_for(&request_id, timeout, reply_handler(callback));
    }

    fn submit(&mut self, kind: String, payload: Value, timeout: Duration, callback: ResponseCallback) {
        if !self.is_connected() {
            tracing::warn!(kind = %kind, "Submit while disconnected");
            callback(Err(RequestError::NotConnected));
            return;
        }

        let request_id = self.request_ids.next_id();
        tracing::debug!(kind = %kind, request_id = %request_id, "Submit");
        self.send(Frame::Submit {
            kind,
            payload,
            request_id: request_id.clone(),
        });
        self.dispatcher
            .wait_for(&request_id, timeout, reply_handler(callback));
    }

    fn send(&mut self, frame: Frame) {
        let Some(link) = self.link.as_mut() else {
            tracing::warn!(action = frame.action(), "Could not send - socket initializing");
            return;
        };

        if !link.open {
            tracing::warn!(action = frame.action(), "Could not send - socket is connecting");
            self.defer(Command::Send(frame));
            return;
        }

        let action = frame.action();
        let text = match self.codec.encode(frame) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(action, error = %e, "Could not encode frame");
                return;
            }
        };

        match link.transport.send(text) {
            Ok(()) => metrics::record_frame_sent(action),
            Err(e) => tracing::warn!(action, error = %e, "Socket send failed"),
        }
    }

    // =========================================================================
    // Connection
    // =========================================================================

    fn start(&mut self) {
        if self.link.is_some() {
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        let target = self.signer.connect_target();

        tracing::info!(
            generation,
            attempt = self.policy.attempt_count(),
            signed = !target.headers.is_empty(),
            "Connecting to event socket"
        );

        let events = TransportEvents::new(generation, self.transport_tx.clone());
        let transport = self.connector.connect(target, events);
        self.link = Some(Link {
            generation,
            transport,
            open: false,
        });
        *self.state.write() = ConnectionState::Connecting;
    }

    fn handle_transport(&mut self, generation: u64, event: TransportEvent) {
        if self.link.as_ref().map(|l| l.generation) != Some(generation) {
            tracing::trace!(generation, "Ignoring event from stale transport");
            return;
        }

        match event {
            TransportEvent::Open => self.on_open(),
            TransportEvent::Message(text) => self.on_message(&text),
            TransportEvent::Error(err) => self.on_error(&err),
            TransportEvent::Close => self.on_close(),
        }
    }

    fn on_open(&mut self) {
        if let Some(link) = self.link.as_mut() {
            link.open = true;
        }
        tracing::info!("Event socket connected");

        self.emit_status(Status::Connected);
        self.set_connected(true);
        self.policy.reset();
    }

    fn on_message(&mut self, text: &str) {
        metrics::record_frame_received();

        match self.codec.decode(text) {
            Ok(frame) => {
                tracing::trace!(event = %frame.event, args = frame.args.len(), "Frame received");
                self.dispatcher.emit(&frame.event, &frame.args);
            }
            Err(e) => {
                metrics::record_malformed_frame();
                tracing::error!(error = %e, data = %text, "Could not parse incoming message");
            }
        }
    }

    fn on_error(&mut self, err: &TransportError) {
        let message = describe_transport_error(err);
        tracing::error!(error = %message, "Event socket error");

        self.emit_status(Status::Error);
        self.dispatcher
            .emit(events::ERROR, &[Value::from(message)]);
    }

    fn on_close(&mut self) {
        tracing::info!("Event socket disconnected");

        self.emit_status(Status::Disconnected);
        self.set_connected(false);
        self.link = None;
        self.schedule_reconnect();
    }

    fn set_connected(&mut self, connected: bool) {
        let was_connected = self.is_connected();
        *self.state.write() = if connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };

        if !was_connected && connected {
            self.dispatcher.emit(events::CONNECTED, &[]);
            self.parked.retain(|_, slot| slot.lock().is_some());
        } else if was_connected && !connected {
            self.dispatcher.emit(events::DISCONNECTED, &[]);
            self.reset_subscriptions();
        }
    }

    /// Move every active subscription back onto the deferred path.
    fn reset_subscriptions(&mut self) {
        let drained = self.subscriptions.drain();
        if !drained.is_empty() {
            tracing::info!(listeners = drained.len(), "Re-subscribing after reconnect");
        }

        for sub in drained {
            self.dispatcher.off(&sub.topic, sub.id);
            self.subscribe(sub.topic, sub.id, sub.handler, false);
        }
    }

    fn schedule_reconnect(&mut self) {
        let delay = self.policy.delay();
        tracing::info!(
            attempt = self.policy.attempt_count(),
            delay_secs = delay.as_secs_f64(),
            "Attempting reconnect"
        );

        self.emit_status(Status::WaitingForReconnect);
        metrics::record_reconnect();
        self.reconnect = Some(Box::pin(tokio::time::sleep(delay)));
    }

    fn emit_status(&mut self, status: Status) {
        self.dispatcher
            .emit(events::STATUS, &[Value::from(status.as_str())]);
    }

    async fn stop(&mut self) {
        let closing = self.link.take().map(|mut link| {
            link.transport.close();
            link.generation
        });
        self.reconnect = None;
        self.commands.close();

        self.dispatcher.close();
        self.pending_subscribes.clear();
        let parked: Vec<_> = self.parked.drain().map(|(_, slot)| slot).collect();
        for slot in parked {
            let command = slot.lock().take();
            if let Some(command) = command {
                command.abandon();
            }
        }
        while let Ok(command) = self.commands.try_recv() {
            command.abandon();
        }

        if let Some(generation) = closing {
            self.await_close(generation).await;
        }
        *self.state.write() = ConnectionState::Disconnected;
        self.stopped.cancel();
    }

    async fn await_close(&mut self, generation: u64) {
        let transport_rx = &mut self.transport_rx;
        let closed = async {
            while let Some((from, event)) = transport_rx.recv().await {
                if from == generation && matches!(event, TransportEvent::Close) {
                    return;
                }
            }
        };

        if tokio::time::timeout(CLOSE_GRACE, closed).await.is_err() {
            tracing::warn!(generation, "Socket did not close within grace period");
        }
    }
}

async fn wait_reconnect(sleep: &mut Option<Pin<Box<Sleep>>>) {
    match sleep {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
