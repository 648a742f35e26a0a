//! Configuration Module
//!
//! Configuration loading for the stream client.

mod settings;

pub use settings::{ClientConfig, ConfigError, ReferenceDataSettings, TimeoutSettings};
