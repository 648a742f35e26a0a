#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! C9T Stream Client - Duplex Event Client
//!
//! An auto-reconnecting WebSocket client for the Cloud9Trader socket
//! service. One socket carries topic subscriptions, correlated
//! request/response calls, order submission and connection lifecycle
//! events.
//!
//! # Layers (inside to outside)
//!
//! - **Domain**: handler tokens, connection state, frames, the topic book
//! - **Application**: transport ports, the event dispatcher, request
//!   correlation, subscription bookkeeping and the lifecycle actor
//! - **Infrastructure**: the WebSocket connector, handshake signing,
//!   reference data over HTTP, configuration, metrics and tracing
//!
//! # Data Flow
//!
//! ```text
//!  StreamClient ──commands──► ClientActor ──frames──► Transport ──► socket
//!       ▲                         │    ▲                               │
//!       │                         │    └──── TransportEvents ◄─────────┘
//!       └──── handlers ◄── EventDispatcher
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - plain types with no I/O.
pub mod domain;

/// Application layer - ports and services.
pub mod application;

/// Infrastructure layer - adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::{ConnectionState, Status};
pub use domain::events::{CONNECTED, DISCONNECTED, ERROR, Handler, HandlerId, Reply, STATUS};
pub use domain::frame::{Frame, InboundFrame};

// Ports
pub use application::ports::{
    ConnectTarget, Connector, HandshakeSigner, Transport, TransportError, TransportEvent,
    TransportEvents,
};

// Client
pub use application::services::{
    ClientOptions, DEFAULT_AUTO_SUBSCRIBED, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SUBMIT_TIMEOUT,
    RequestError, StreamClient,
};

// Socket adapters
pub use infrastructure::c9t::{
    AuthError, C9tHandshake, Credentials, ReconnectConfig, WebSocketConnector, spawn_client,
};

// Configuration
pub use infrastructure::config::{ClientConfig, ConfigError};

// Reference data
pub use infrastructure::reference_data::{FetchError, Interval, ReferenceDataClient};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
