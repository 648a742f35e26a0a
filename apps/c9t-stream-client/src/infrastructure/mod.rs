//! Infrastructure Layer
//!
//! Adapters for the socket service, HTTP reference data, configuration,
//! metrics and tracing.

pub mod c9t;
pub mod config;
pub mod metrics;
pub mod reference_data;
pub mod telemetry;
