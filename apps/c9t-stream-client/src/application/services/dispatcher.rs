//! Event Dispatcher
//!
//! Maps event names to ordered handler lists. Supports persistent,
//! one-shot and timed one-shot (`wait_for`) registrations.
//!
//! # Timers
//!
//! Each `wait_for` spawns a tokio timer guarded by a `CancellationToken`.
//! The timer never touches the dispatcher directly: it posts an [`Expiry`]
//! on a channel the owner drains with [`EventDispatcher::next_expiry`] and
//! hands back through [`EventDispatcher::expire`]. Whichever of the event,
//! the expiry or [`EventDispatcher::close`] reaches the waiter first removes
//! it, so the reply runs exactly once.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::events::{Handler, HandlerId, HandlerIds, Reply};

/// Callback receiving the outcome of a timed one-shot waiter.
pub type ReplyHandler = Box<dyn FnOnce(Reply) + Send>;

// =============================================================================
// Entries
// =============================================================================

enum Entry {
    Listener { handler: Handler, once: bool },
    Waiter {
        reply: ReplyHandler,
        timer: CancellationToken,
    },
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listener { handler, once } => f
                .debug_struct("Listener")
                .field("handler", handler)
                .field("once", once)
                .finish(),
            Self::Waiter { timer, .. } => f
                .debug_struct("Waiter")
                .field("cancelled", &timer.is_cancelled())
                .finish_non_exhaustive(),
        }
    }
}

/// A waiter whose timer elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expiry {
    /// Event the waiter was registered on.
    pub event: String,
    /// Token of the waiter.
    pub id: HandlerId,
}

// =============================================================================
// Event Dispatcher
// =============================================================================

/// Event name to ordered handlers.
///
/// Unknown events behave as empty lists; nothing here errors.
pub struct EventDispatcher {
    ids: Arc<HandlerIds>,
    events: HashMap<String, Vec<(HandlerId, Entry)>>,
    expiry_tx: mpsc::UnboundedSender<Expiry>,
    expiry_rx: mpsc::UnboundedReceiver<Expiry>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(Arc::new(HandlerIds::new()))
    }
}

impl EventDispatcher {
    /// Create a dispatcher allocating tokens from `ids`.
    #[must_use]
    pub fn new(ids: Arc<HandlerIds>) -> Self {
        let (expiry_tx, expiry_rx) = mpsc::unbounded_channel();
        Self {
            ids,
            events: HashMap::new(),
            expiry_tx,
            expiry_rx,
        }
    }

    /// Register a persistent handler.
    ///
    /// Registering the same handler instance twice on one event returns the
    /// existing token.
    pub fn on(&mut self, event: &str, handler: Handler) -> HandlerId {
        let id = self.ids.next_id();
        self.insert(event, id, handler, false)
    }

    /// Register a handler that runs at most once.
    pub fn once(&mut self, event: &str, handler: Handler) -> HandlerId {
        let id = self.ids.next_id();
        self.insert(event, id, handler, true)
    }

    /// Register a handler under a token allocated elsewhere.
    ///
    /// Returns the token that ends up owning the registration: `id`, or the
    /// existing token when the handler instance is already persistently
    /// registered on `event`.
    pub fn insert(&mut self, event: &str, id: HandlerId, handler: Handler, once: bool) -> HandlerId {
        let list = self.events.entry(event.to_string()).or_default();

        if !once
            && let Some((existing, _)) = list.iter().find(|(_, entry)| {
                matches!(entry, Entry::Listener { handler: h, once: false } if h.same_as(&handler))
            })
        {
            return *existing;
        }

        list.push((id, Entry::Listener { handler, once }));
        id
    }

    /// Register a timed one-shot waiter.
    ///
    /// Exactly one of `Reply::Event(args)` or `Reply::TimedOut` is delivered.
    /// Must be called from within a tokio runtime.
    pub fn wait_for(&mut self, event: &str, timeout: Duration, reply: ReplyHandler) -> HandlerId {
        let id = self.ids.next_id();
        self.insert_waiter(event, id, timeout, reply);
        id
    }

    /// Register a timed one-shot waiter under a token allocated elsewhere.
    pub fn insert_waiter(&mut self, event: &str, id: HandlerId, timeout: Duration, reply: ReplyHandler) {
        let timer = CancellationToken::new();

        let guard = timer.clone();
        let tx = self.expiry_tx.clone();
        let expiry = Expiry {
            event: event.to_string(),
            id,
        };
        tokio::spawn(async move {
            tokio::select! {
                () = guard.cancelled() => {}
                () = tokio::time::sleep(timeout) => {
                    let _ = tx.send(expiry);
                }
            }
        });

        self.events
            .entry(event.to_string())
            .or_default()
            .push((id, Entry::Waiter { reply, timer }));
    }

    /// Remove a registration. Returns `false` if it was not present.
    ///
    /// Removing a waiter cancels its timer without calling its reply.
    pub fn off(&mut self, event: &str, id: HandlerId) -> bool {
        match self.take(event, id) {
            Some(Entry::Waiter { timer, .. }) => {
                timer.cancel();
                true
            }
            Some(Entry::Listener { .. }) => true,
            None => false,
        }
    }

    /// Invoke every handler registered on `event` at the time of the call.
    ///
    /// Handlers run in registration order. One-shot entries are removed
    /// before they run. Returns the number of handlers invoked.
    pub fn emit(&mut self, event: &str, args: &[Value]) -> usize {
        let snapshot: Vec<HandlerId> = match self.events.get(event) {
            Some(list) => list.iter().map(|(id, _)| *id).collect(),
            None => return 0,
        };

        let mut invoked = 0;
        for id in snapshot {
            let Some(list) = self.events.get(event) else {
                break;
            };
            let Some((_, entry)) = list.iter().find(|(existing, _)| *existing == id) else {
                continue;
            };

            if let Entry::Listener {
                handler,
                once: false,
            } = entry
            {
                let handler = handler.clone();
                handler.call(args);
                invoked += 1;
                continue;
            }

            match self.take(event, id) {
                Some(Entry::Listener { handler, .. }) => handler.call(args),
                Some(Entry::Waiter { reply, timer }) => {
                    timer.cancel();
                    reply(Reply::Event(args.to_vec()));
                }
                None => continue,
            }
            invoked += 1;
        }
        invoked
    }

    /// Wait for the next elapsed waiter timer.
    pub async fn next_expiry(&mut self) -> Expiry {
        match self.expiry_rx.recv().await {
            Some(expiry) => expiry,
            None => std::future::pending().await,
        }
    }

    /// Deliver the timeout to an elapsed waiter.
    ///
    /// Returns `false` if the waiter already resolved.
    pub fn expire(&mut self, expiry: &Expiry) -> bool {
        match self.take(&expiry.event, expiry.id) {
            Some(Entry::Waiter { reply, .. }) => {
                reply(Reply::TimedOut);
                true
            }
            Some(entry) => {
                // Token belongs to a listener; put it back untouched.
                self.events
                    .entry(expiry.event.clone())
                    .or_default()
                    .push((expiry.id, entry));
                false
            }
            None => false,
        }
    }

    /// Number of registrations on `event`.
    #[must_use]
    pub fn handler_count(&self, event: &str) -> usize {
        self.events.get(event).map_or(0, Vec::len)
    }

    /// Check if a token is registered on `event`.
    #[must_use]
    pub fn contains(&self, event: &str, id: HandlerId) -> bool {
        self.events
            .get(event)
            .is_some_and(|list| list.iter().any(|(existing, _)| *existing == id))
    }

    /// Remove every registration. Pending waiters receive [`Reply::Closed`].
    pub fn close(&mut self) {
        let drained: Vec<_> = self.events.drain().flat_map(|(_, list)| list).collect();
        for (_, entry) in drained {
            if let Entry::Waiter { reply, timer } = entry {
                timer.cancel();
                reply(Reply::Closed);
            }
        }
    }

    fn take(&mut self, event: &str, id: HandlerId) -> Option<Entry> {
        let list = self.events.get_mut(event)?;
        let pos = list.iter().position(|(existing, _)| *existing == id)?;
        let (_, entry) = list.remove(pos);
        if list.is_empty() {
            self.events.remove(event);
        }
        Some(entry)
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        self.close();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use proptest::prelude::*;

    use super::*;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &str) -> Handler {
        let log = Arc::clone(log);
        let name = name.to_string();
        Handler::new(move |_| log.lock().push(name.clone()))
    }

    fn counter() -> (Arc<AtomicUsize>, Handler) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        let handler = Handler::new(move |_| {
            inner.fetch_add(1, Ordering::SeqCst);
        });
        (count, handler)
    }

    fn reply_slot() -> (Arc<Mutex<Vec<Reply>>>, ReplyHandler) {
        let slot = Arc::new(Mutex::new(Vec::new()));
        let inner = Arc::clone(&slot);
        (slot, Box::new(move |reply| inner.lock().push(reply)))
    }

    #[test]
    fn emit_runs_handlers_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = EventDispatcher::default();

        dispatcher.on("balances", recorder(&log, "a"));
        dispatcher.on("balances", recorder(&log, "b"));
        dispatcher.on("balances", recorder(&log, "c"));

        assert_eq!(dispatcher.emit("balances", &[]), 3);
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn same_handler_twice_is_noop() {
        let (count, handler) = counter();
        let mut dispatcher = EventDispatcher::default();

        let first = dispatcher.on("orders", handler.clone());
        let second = dispatcher.on("orders", handler);

        assert_eq!(first, second);
        assert_eq!(dispatcher.handler_count("orders"), 1);

        dispatcher.emit("orders", &[]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn once_fires_at_most_once() {
        let (count, handler) = counter();
        let mut dispatcher = EventDispatcher::default();

        dispatcher.once("connected", handler);
        dispatcher.emit("connected", &[]);
        dispatcher.emit("connected", &[]);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.handler_count("connected"), 0);
    }

    #[test]
    fn off_removes_by_token() {
        let (count, handler) = counter();
        let mut dispatcher = EventDispatcher::default();

        let id = dispatcher.on("status", handler);
        assert!(dispatcher.off("status", id));
        assert!(!dispatcher.off("status", id));

        dispatcher.emit("status", &[Value::from("Connected")]);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unknown_event_is_empty() {
        let mut dispatcher = EventDispatcher::default();
        assert_eq!(dispatcher.emit("nothing", &[]), 0);
        assert!(!dispatcher.off("nothing", HandlerIds::new().next_id()));
    }

    #[test]
    fn handler_receives_args() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let inner = Arc::clone(&seen);
        let mut dispatcher = EventDispatcher::default();

        dispatcher.on(
            "balances",
            Handler::new(move |args| inner.lock().extend_from_slice(args)),
        );
        dispatcher.emit("balances", &[Value::from(1), Value::from("x")]);

        assert_eq!(*seen.lock(), vec![Value::from(1), Value::from("x")]);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_event_before_timeout() {
        let (slot, reply) = reply_slot();
        let mut dispatcher = EventDispatcher::default();

        dispatcher.wait_for("abcde/0", Duration::from_secs(3), reply);
        dispatcher.emit("abcde/0", &[Value::Null, Value::from(42)]);

        assert_eq!(
            *slot.lock(),
            vec![Reply::Event(vec![Value::Null, Value::from(42)])]
        );

        // Timer was cancelled: nothing arrives even well past the deadline.
        let expired = tokio::time::timeout(Duration::from_secs(10), dispatcher.next_expiry()).await;
        assert!(expired.is_err());
        assert_eq!(slot.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_timeout_fires_once() {
        let (slot, reply) = reply_slot();
        let mut dispatcher = EventDispatcher::default();

        let id = dispatcher.wait_for("abcde/1", Duration::from_secs(3), reply);

        let expiry = dispatcher.next_expiry().await;
        assert_eq!(expiry.id, id);
        assert!(dispatcher.expire(&expiry));
        assert!(!dispatcher.expire(&expiry));

        dispatcher.emit("abcde/1", &[Value::from("late")]);
        assert_eq!(*slot.lock(), vec![Reply::TimedOut]);
    }

    #[tokio::test(start_paused = true)]
    async fn off_waiter_cancels_timer_without_reply() {
        let (slot, reply) = reply_slot();
        let mut dispatcher = EventDispatcher::default();

        let id = dispatcher.wait_for("abcde/2", Duration::from_secs(1), reply);
        assert!(dispatcher.off("abcde/2", id));

        let expired = tokio::time::timeout(Duration::from_secs(5), dispatcher.next_expiry()).await;
        assert!(expired.is_err());
        assert!(slot.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn close_resolves_waiters_once() {
        let (slot, reply) = reply_slot();
        let (count, handler) = counter();
        let mut dispatcher = EventDispatcher::default();

        dispatcher.on("abcde/3", handler);
        dispatcher.wait_for("abcde/3", Duration::from_secs(1), reply);
        dispatcher.close();

        assert_eq!(dispatcher.handler_count("abcde/3"), 0);
        assert_eq!(*slot.lock(), vec![Reply::Closed]);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        // Timer was cancelled and the dispatcher is empty.
        let expired = tokio::time::timeout(Duration::from_secs(5), dispatcher.next_expiry()).await;
        assert!(expired.is_err());
        dispatcher.close();
        assert_eq!(slot.lock().len(), 1);
    }

    proptest! {
        #[test]
        fn emit_invokes_each_live_handler_once_in_order(
            ops in proptest::collection::vec((any::<bool>(), any::<bool>()), 1..24)
        ) {
            let log = Arc::new(Mutex::new(Vec::new()));
            let mut dispatcher = EventDispatcher::default();
            let mut expected = Vec::new();

            for (i, (once, removed)) in ops.iter().enumerate() {
                let name = i.to_string();
                let handler = recorder(&log, &name);
                let id = if *once {
                    dispatcher.once("topic", handler)
                } else {
                    dispatcher.on("topic", handler)
                };
                if *removed {
                    dispatcher.off("topic", id);
                } else {
                    expected.push(name);
                }
            }

            dispatcher.emit("topic", &[]);
            prop_assert_eq!(&*log.lock(), &expected);

            // One-shot entries are gone after the first emission.
            log.lock().clear();
            dispatcher.emit("topic", &[]);
            let persistent: Vec<String> = ops
                .iter()
                .enumerate()
                .filter(|(_, (once, removed))| !once && !removed)
                .map(|(i, _)| i.to_string())
                .collect();
            prop_assert_eq!(&*log.lock(), &persistent);
        }
    }
}
