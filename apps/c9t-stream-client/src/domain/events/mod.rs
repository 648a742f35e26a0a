//! Event Types
//!
//! Event names, handler tokens and the callable wrapper shared by the
//! dispatcher, the subscription book and the client API.
//!
//! # Namespace
//!
//! Event names are plain strings in one flat namespace. System events
//! (`connected`, `status`, `error`, `disconnected`), topics pushed by the
//! server (`balances`, `orders`, ...) and per-request correlation ids all
//! live side by side; nothing here enumerates them.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

// =============================================================================
// System Events
// =============================================================================

/// Emitted on the transition from not connected to connected.
pub const CONNECTED: &str = "connected";

/// Emitted on the transition from connected to not connected.
pub const DISCONNECTED: &str = "disconnected";

/// Emitted with a single status string on every lifecycle change.
pub const STATUS: &str = "status";

/// Emitted with a human-readable message on transport errors.
pub const ERROR: &str = "error";

// =============================================================================
// Handler Tokens
// =============================================================================

/// Token identifying one handler registration.
///
/// Returned by every registering call and passed back to deregister.
/// Tokens are never reused within a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    /// Raw numeric value of the token.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Allocator for [`HandlerId`] tokens.
///
/// Shared between client handles (which hand tokens out synchronously) and
/// the actor that stores the registrations.
#[derive(Debug)]
pub struct HandlerIds {
    next: AtomicU64,
}

impl Default for HandlerIds {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerIds {
    /// Create an allocator starting at token 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next token.
    pub fn next_id(&self) -> HandlerId {
        HandlerId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

// =============================================================================
// Handler
// =============================================================================

/// A callable invoked with the arguments of an event.
///
/// Cloning a `Handler` yields the same instance; registering the same
/// instance twice on one event is a no-op.
#[derive(Clone)]
pub struct Handler(Arc<dyn Fn(&[Value]) + Send + Sync>);

impl Handler {
    /// Wrap a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Invoke the handler.
    pub fn call(&self, args: &[Value]) {
        (self.0)(args);
    }

    /// Whether both values wrap the same underlying closure.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

// =============================================================================
// Timed Replies
// =============================================================================

/// Outcome delivered to a timed one-shot waiter.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The awaited event fired with these arguments.
    Event(Vec<Value>),
    /// The timer elapsed first.
    TimedOut,
    /// The client shut down first.
    Closed,
}

impl Reply {
    /// Check whether this is the timeout sentinel.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn handler_ids_are_unique_and_increasing() {
        let ids = HandlerIds::new();
        let a = ids.next_id();
        let b = ids.next_id();
        assert!(b > a);
        assert_ne!(a, b);
    }

    #[test]
    fn cloned_handler_is_same_instance() {
        let h = Handler::new(|_| {});
        let clone = h.clone();
        assert!(h.same_as(&clone));
    }

    #[test]
    fn identical_closures_are_distinct_instances() {
        let a = Handler::new(|_| {});
        let b = Handler::new(|_| {});
        assert!(!a.same_as(&b));
    }

    #[test]
    fn handler_call_passes_args() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let h = Handler::new(move |args| {
            counter.fetch_add(args.len(), Ordering::SeqCst);
        });

        h.call(&[Value::from(1), Value::from("two")]);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn reply_timeout_sentinel() {
        assert!(Reply::TimedOut.is_timeout());
        assert!(!Reply::Event(vec![]).is_timeout());
    }
}
