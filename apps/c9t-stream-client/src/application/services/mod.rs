//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `EventDispatcher`: event name to ordered handlers, timed waiters
//! - `RequestIdGenerator` and response mapping for correlated calls
//! - `SubscriptionManager`: topic registry and subscribe/unsubscribe frames
//! - `ClientActor`: the task owning the connection lifecycle
//! - `StreamClient`: the cloneable handle posting work to the actor

pub mod client;
pub mod correlator;
pub mod dispatcher;
pub mod lifecycle;
pub mod subscriptions;

pub use client::{ClientOptions, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SUBMIT_TIMEOUT, StreamClient};
pub use correlator::{RequestError, RequestIdGenerator, ResponseCallback};
pub use dispatcher::{EventDispatcher, Expiry, ReplyHandler};
pub use lifecycle::{ClientActor, Command};
pub use subscriptions::{
    DEFAULT_AUTO_SUBSCRIBED, SubscribeOutcome, SubscriptionManager, UnsubscribeOutcome,
};
