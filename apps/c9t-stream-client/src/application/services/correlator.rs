//! Request Correlation
//!
//! Request id generation and the mapping from a waiter's [`Reply`] to the
//! caller-facing request outcome.
//!
//! A response frame arrives as `[requestId, error, payload]`, which the
//! dispatcher emits on the event named by the request id with arguments
//! `[error, payload]`.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use rand::distr::Alphanumeric;
use serde_json::Value;

use super::dispatcher::ReplyHandler;
use crate::domain::events::Reply;

/// Length of the random per-client request id prefix.
pub const PREFIX_LEN: usize = 5;

// =============================================================================
// Error Type
// =============================================================================

/// Ways a request or submission can fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// No response arrived before the deadline.
    #[error("timeout")]
    Timeout,

    /// Submission attempted while the socket was down.
    #[error("Socket is not connected")]
    NotConnected,

    /// The server answered with an error.
    #[error("{0}")]
    Rejected(String),

    /// The client shut down before the request resolved.
    #[error("client closed")]
    Closed,
}

impl RequestError {
    /// Check whether this is a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// Callback receiving the outcome of one request or submission.
pub type ResponseCallback = Box<dyn FnOnce(Result<Value, RequestError>) + Send>;

// =============================================================================
// Request Ids
// =============================================================================

/// Generates `<prefix>/<counter>` request ids.
///
/// The prefix is random per client so ids from two clients sharing one
/// account do not collide; the counter is owned by the instance.
#[derive(Debug)]
pub struct RequestIdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestIdGenerator {
    /// Create a generator with a random alphanumeric prefix.
    #[must_use]
    pub fn new() -> Self {
        let prefix: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(PREFIX_LEN)
            .map(char::from)
            .collect();
        Self::with_prefix(prefix)
    }

    /// Create a generator with a fixed prefix.
    #[must_use]
    pub const fn with_prefix(prefix: String) -> Self {
        Self {
            prefix,
            counter: AtomicU64::new(0),
        }
    }

    /// The per-client prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Produce the next id.
    pub fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}/{n}", self.prefix)
    }
}

// =============================================================================
// Response Mapping
// =============================================================================

/// Map a waiter outcome to a request outcome.
///
/// A null or absent error resolves to the payload (null when absent).
#[must_use]
pub fn resolve(reply: Reply) -> Result<Value, RequestError> {
    let args = match reply {
        Reply::TimedOut => return Err(RequestError::Timeout),
        Reply::Closed => return Err(RequestError::Closed),
        Reply::Event(args) => args,
    };

    let mut args = args.into_iter();
    match args.next() {
        None | Some(Value::Null) => Ok(args.next().unwrap_or(Value::Null)),
        Some(Value::String(message)) => Err(RequestError::Rejected(message)),
        Some(other) => Err(RequestError::Rejected(other.to_string())),
    }
}

/// Adapt a response callback into a dispatcher reply handler.
#[must_use]
pub fn reply_handler(callback: ResponseCallback) -> ReplyHandler {
    Box::new(move |reply| {
        let outcome = resolve(reply);
        if matches!(outcome, Err(RequestError::Timeout)) {
            crate::infrastructure::metrics::record_request_timeout();
        }
        callback(outcome);
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn ids_share_prefix_and_count_up() {
        let ids = RequestIdGenerator::with_prefix("AbC12".to_string());
        assert_eq!(ids.next_id(), "AbC12/0");
        assert_eq!(ids.next_id(), "AbC12/1");
        assert_eq!(ids.next_id(), "AbC12/2");
    }

    #[test]
    fn random_prefix_is_alphanumeric() {
        let ids = RequestIdGenerator::new();
        assert_eq!(ids.prefix().len(), PREFIX_LEN);
        assert!(ids.prefix().chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(ids.next_id().starts_with(&format!("{}/", ids.prefix())));
    }

    #[test]
    fn null_error_resolves_payload() {
        let reply = Reply::Event(vec![Value::Null, json!([{"currency": "USD"}])]);
        assert_eq!(resolve(reply), Ok(json!([{"currency": "USD"}])));
    }

    #[test]
    fn missing_payload_resolves_null() {
        assert_eq!(resolve(Reply::Event(vec![])), Ok(Value::Null));
        assert_eq!(resolve(Reply::Event(vec![Value::Null])), Ok(Value::Null));
    }

    #[test]
    fn string_error_rejects() {
        let reply = Reply::Event(vec![json!("Insufficient margin"), Value::Null]);
        assert_eq!(
            resolve(reply),
            Err(RequestError::Rejected("Insufficient margin".to_string()))
        );
    }

    #[test]
    fn structured_error_rejects_with_json_text() {
        let reply = Reply::Event(vec![json!({"code": 7})]);
        assert_eq!(
            resolve(reply),
            Err(RequestError::Rejected("{\"code\":7}".to_string()))
        );
    }

    #[test]
    fn timeout_maps_to_timeout() {
        let outcome = resolve(Reply::TimedOut);
        assert!(outcome.is_err_and(|e| e.is_timeout()));
    }

    #[test]
    fn closed_maps_to_closed() {
        assert_eq!(resolve(Reply::Closed), Err(RequestError::Closed));
    }

    #[test]
    fn not_connected_message() {
        assert_eq!(
            RequestError::NotConnected.to_string(),
            "Socket is not connected"
        );
    }
}
