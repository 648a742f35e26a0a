//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for external systems (transport, handshake signing).
pub mod ports;

/// Application services: dispatcher, correlation, subscriptions and the
/// lifecycle actor behind the client handle.
pub mod services;
