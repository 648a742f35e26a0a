//! Wire Frames
//!
//! Every frame on the socket is a JSON array. Outbound frames start with an
//! action (`request`, `subscribe`, `unsubscribe`, `submit`); inbound frames
//! start with the event name the rest of the array is emitted under.

use serde_json::Value;

/// Frame sent to the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `["request", topic, requestId]`
    Request {
        /// Topic to fetch a snapshot of.
        topic: String,
        /// Correlation id the response is emitted under.
        request_id: String,
    },
    /// `["subscribe", topic]`
    Subscribe {
        /// Topic to start pushing.
        topic: String,
    },
    /// `["unsubscribe", topic]`
    Unsubscribe {
        /// Topic to stop pushing.
        topic: String,
    },
    /// `["submit", kind, payload, requestId]`
    Submit {
        /// Submission kind (`order`, ...).
        kind: String,
        /// Opaque submission body.
        payload: Value,
        /// Correlation id the response is emitted under.
        request_id: String,
    },
    /// Caller-provided array, sent as is.
    Raw(Vec<Value>),
}

impl Frame {
    /// Action name, used for logs and metric labels.
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::Request { .. } => "request",
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::Submit { .. } => "submit",
            Self::Raw(_) => "raw",
        }
    }

    /// The JSON array elements of the frame.
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        match self {
            Self::Request { topic, request_id } => vec![
                Value::from("request"),
                Value::from(topic),
                Value::from(request_id),
            ],
            Self::Subscribe { topic } => vec![Value::from("subscribe"), Value::from(topic)],
            Self::Unsubscribe { topic } => vec![Value::from("unsubscribe"), Value::from(topic)],
            Self::Submit {
                kind,
                payload,
                request_id,
            } => vec![
                Value::from("submit"),
                Value::from(kind),
                payload,
                Value::from(request_id),
            ],
            Self::Raw(values) => values,
        }
    }
}

/// Frame received from the server: an event name and its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    /// Event to emit (system event, topic or request id).
    pub event: String,
    /// Remaining array elements.
    pub args: Vec<Value>,
}
