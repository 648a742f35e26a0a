//! Subscription Manager
//!
//! Wraps the [`SubscriptionBook`] with the auto-subscribed topic set and
//! decides which frames a change puts on the wire.
//!
//! Auto-subscribed topics are pushed by the server unconditionally, so
//! they never produce `subscribe` or `unsubscribe` frames.

use std::collections::HashSet;

use crate::domain::events::{Handler, HandlerId};
use crate::domain::frame::Frame;
use crate::domain::subscription::{Added, Removed, Subscription, SubscriptionBook};

/// Topics the server pushes without an explicit subscribe.
pub const DEFAULT_AUTO_SUBSCRIBED: [&str; 2] = ["messages", "logs"];

/// Outcome of attaching a listener.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscribeOutcome {
    /// First listener on the topic; send `frame` if present.
    First {
        /// `subscribe` frame, absent for auto-subscribed topics.
        frame: Option<Frame>,
    },
    /// Topic already had listeners.
    Joined,
    /// Token already attached.
    Duplicate,
}

/// Outcome of detaching a listener.
#[derive(Debug, Clone, PartialEq)]
pub enum UnsubscribeOutcome {
    /// No subscriptions exist for the topic.
    UnknownTopic,
    /// Topic exists, token not attached.
    NotSubscribed,
    /// Listener removed, others remain.
    Remaining(usize),
    /// Last listener removed; send `frame` if present.
    Last {
        /// `unsubscribe` frame, absent for auto-subscribed topics.
        frame: Option<Frame>,
    },
}

/// Topic registry plus wire decisions.
#[derive(Debug)]
pub struct SubscriptionManager {
    book: SubscriptionBook,
    auto_subscribed: HashSet<String>,
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new(DEFAULT_AUTO_SUBSCRIBED)
    }
}

impl SubscriptionManager {
    /// Create a manager with the given auto-subscribed topics.
    pub fn new<I, S>(auto_subscribed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            book: SubscriptionBook::new(),
            auto_subscribed: auto_subscribed.into_iter().map(Into::into).collect(),
        }
    }

    /// Check if a topic is pushed without subscribing.
    #[must_use]
    pub fn is_auto_subscribed(&self, topic: &str) -> bool {
        self.auto_subscribed.contains(topic)
    }

    /// Attach a listener.
    pub fn add(&mut self, topic: &str, id: HandlerId, handler: Handler) -> SubscribeOutcome {
        match self.book.add(topic, id, handler) {
            Added::First => SubscribeOutcome::First {
                frame: (!self.is_auto_subscribed(topic)).then(|| Frame::Subscribe {
                    topic: topic.to_string(),
                }),
            },
            Added::Joined => SubscribeOutcome::Joined,
            Added::Duplicate => SubscribeOutcome::Duplicate,
        }
    }

    /// Detach a listener.
    pub fn remove(&mut self, topic: &str, id: HandlerId) -> UnsubscribeOutcome {
        match self.book.remove(topic, id) {
            Removed::UnknownTopic => UnsubscribeOutcome::UnknownTopic,
            Removed::NotSubscribed => UnsubscribeOutcome::NotSubscribed,
            Removed::Remaining(n) => UnsubscribeOutcome::Remaining(n),
            Removed::Last => UnsubscribeOutcome::Last {
                frame: (!self.is_auto_subscribed(topic)).then(|| Frame::Unsubscribe {
                    topic: topic.to_string(),
                }),
            },
        }
    }

    /// Take every active subscription out, leaving the registry empty.
    pub fn drain(&mut self) -> Vec<Subscription> {
        self.book.drain()
    }

    /// Read access to the registry.
    #[must_use]
    pub const fn book(&self) -> &SubscriptionBook {
        &self.book
    }
}
