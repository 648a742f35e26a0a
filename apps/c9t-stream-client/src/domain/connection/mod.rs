//! Connection State
//!
//! The three-state connection machine and the status strings emitted on
//! the `status` event.
//!
//! ```text
//! Disconnected ──start()──► Connecting ──open──► Connected
//!      ▲                        │                    │
//!      └────────close───────────┴───────close────────┘
//! ```

use std::fmt;

/// State of the single transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport, or the transport closed.
    #[default]
    Disconnected,
    /// A transport exists but has not opened yet.
    Connecting,
    /// The transport is open and traffic flows.
    Connected,
}

impl ConnectionState {
    /// Check if traffic may be sent.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// State name for logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value carried by the `status` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Transport opened.
    Connected,
    /// Transport closed.
    Disconnected,
    /// Transport reported an error.
    Error,
    /// A reconnect has been scheduled.
    WaitingForReconnect,
}

impl Status {
    /// Wire string for the status event.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
            Self::Error => "Error",
            Self::WaitingForReconnect => "Waiting for reconnect",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn only_connected_is_connected() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(!ConnectionState::Disconnected.is_connected());
    }

    #[test]
    fn status_strings() {
        assert_eq!(Status::Connected.to_string(), "Connected");
        assert_eq!(Status::Disconnected.to_string(), "Disconnected");
        assert_eq!(Status::Error.to_string(), "Error");
        assert_eq!(
            Status::WaitingForReconnect.to_string(),
            "Waiting for reconnect"
        );
    }
}
