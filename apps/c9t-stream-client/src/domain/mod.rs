//! Domain Layer - Core client types and bookkeeping.
//!
//! This layer contains the pure types of the duplex client with no
//! runtime dependencies: event names and handler tokens, wire frames,
//! the connection state machine and the subscription book.

/// Connection state and status strings.
pub mod connection;

/// Event names, handlers and handler tokens.
pub mod events;

/// Outbound and inbound wire frames.
pub mod frame;

/// Subscription tracking (topic -> listeners).
pub mod subscription;
