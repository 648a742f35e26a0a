//! Subscription Book
//!
//! Domain type tracking which listeners are attached to which topics.
//!
//! # Design
//!
//! The book tracks:
//! - An insertion-ordered list of `(HandlerId, Handler)` per topic
//! - Presence of a topic entry iff at least one listener is attached
//!
//! Every change reports whether it crossed the zero boundary so callers
//! know when the server has to hear a `subscribe` or `unsubscribe` frame.
//! The book itself never talks to the wire.

use std::collections::HashMap;

use crate::domain::events::{Handler, HandlerId};

// =============================================================================
// Types
// =============================================================================

/// A topic name (`balances`, `orders`, ...).
pub type Topic = String;

/// One listener attached to one topic.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Topic the listener is attached to.
    pub topic: Topic,
    /// Token identifying the listener.
    pub id: HandlerId,
    /// The listener itself.
    pub handler: Handler,
}

/// Result of attaching a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Added {
    /// The topic had no listeners before this one.
    First,
    /// The topic already had listeners.
    Joined,
    /// The token, or the same handler instance, is already attached.
    Duplicate,
}

/// Result of detaching a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removed {
    /// No entry exists for the topic.
    UnknownTopic,
    /// The topic exists but the token is not attached to it.
    NotSubscribed,
    /// The listener was removed; this many remain.
    Remaining(usize),
    /// The listener was the last one; the topic entry is gone.
    Last,
}

// =============================================================================
// Subscription Book
// =============================================================================

/// Topic to ordered listeners.
///
/// # Example
///
/// ```rust
/// use c9t_stream_client::domain::events::{Handler, HandlerIds};
/// use c9t_stream_client::domain::subscription::{Added, Removed, SubscriptionBook};
///
/// let ids = HandlerIds::new();
/// let mut book = SubscriptionBook::new();
///
/// let first = ids.next_id();
/// assert_eq!(book.add("balances", first, Handler::new(|_| {})), Added::First);
///
/// let second = ids.next_id();
/// assert_eq!(book.add("balances", second, Handler::new(|_| {})), Added::Joined);
///
/// assert_eq!(book.remove("balances", first), Removed::Remaining(1));
/// assert_eq!(book.remove("balances", second), Removed::Last);
/// assert!(!book.contains("balances"));
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionBook {
    topics: HashMap<Topic, Vec<(HandlerId, Handler)>>,
}

impl SubscriptionBook {
    /// Create an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a listener to a topic.
    pub fn add(&mut self, topic: &str, id: HandlerId, handler: Handler) -> Added {
        match self.topics.get_mut(topic) {
            Some(listeners) => {
                if listeners
                    .iter()
                    .any(|(existing, h)| *existing == id || h.same_as(&handler))
                {
                    return Added::Duplicate;
                }
                listeners.push((id, handler));
                Added::Joined
            }
            None => {
                self.topics.insert(topic.to_string(), vec![(id, handler)]);
                Added::First
            }
        }
    }

    /// Detach a listener from a topic.
    pub fn remove(&mut self, topic: &str, id: HandlerId) -> Removed {
        let Some(listeners) = self.topics.get_mut(topic) else {
            return Removed::UnknownTopic;
        };

        let Some(pos) = listeners.iter().position(|(existing, _)| *existing == id) else {
            return Removed::NotSubscribed;
        };
        listeners.remove(pos);

        if listeners.is_empty() {
            self.topics.remove(topic);
            Removed::Last
        } else {
            Removed::Remaining(listeners.len())
        }
    }

    /// Take every listener out of the book, leaving it empty.
    ///
    /// Listeners of one topic keep their insertion order.
    pub fn drain(&mut self) -> Vec<Subscription> {
        let mut out = Vec::new();
        for (topic, listeners) in self.topics.drain() {
            for (id, handler) in listeners {
                out.push(Subscription {
                    topic: topic.clone(),
                    id,
                    handler,
                });
            }
        }
        out
    }

    /// Check whether a topic has listeners.
    #[must_use]
    pub fn contains(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    /// Tokens attached to a topic, in insertion order.
    #[must_use]
    pub fn listeners(&self, topic: &str) -> Vec<HandlerId> {
        self.topics
            .get(topic)
            .map(|l| l.iter().map(|(id, _)| *id).collect())
            .unwrap_or_default()
    }

    /// Topics with at least one listener.
    #[must_use]
    pub fn topics(&self) -> Vec<Topic> {
        self.topics.keys().cloned().collect()
    }

    /// Number of topics with listeners.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Total number of listeners across topics.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.topics.values().map(Vec::len).sum()
    }

    /// Check if no topic has listeners.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
