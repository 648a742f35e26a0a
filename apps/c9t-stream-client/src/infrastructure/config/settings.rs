//! Client Configuration Settings
//!
//! Configuration types for the stream client, loaded from environment variables.

use std::time::Duration;

use crate::application::services::client::{
    ClientOptions, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SUBMIT_TIMEOUT,
};
use crate::application::services::subscriptions::DEFAULT_AUTO_SUBSCRIBED;
use crate::infrastructure::c9t::auth::{AuthError, C9tHandshake, Credentials, DEFAULT_HOST};
use crate::infrastructure::c9t::reconnect::ReconnectConfig;
use crate::infrastructure::c9t::websocket::DEFAULT_PING_INTERVAL;
use crate::infrastructure::reference_data::{DEFAULT_HISTORICAL_URL, DEFAULT_INSTRUMENTS_URL};

/// Request deadline settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutSettings {
    /// Deadline for `request`.
    pub request: Duration,
    /// Deadline for `submit`.
    pub submit: Duration,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            request: DEFAULT_REQUEST_TIMEOUT,
            submit: DEFAULT_SUBMIT_TIMEOUT,
        }
    }
}

/// Reference data endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDataSettings {
    /// Instrument list URL.
    pub instruments_url: String,
    /// Historical price series URL.
    pub historical_url: String,
}

impl Default for ReferenceDataSettings {
    fn default() -> Self {
        Self {
            instruments_url: DEFAULT_INSTRUMENTS_URL.to_string(),
            historical_url: DEFAULT_HISTORICAL_URL.to_string(),
        }
    }
}

/// Complete client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// API key.
    pub key: String,
    /// Base64 signing secret. Public connection when absent.
    pub secret: Option<String>,
    /// Socket endpoint.
    pub host: String,
    /// Request deadlines.
    pub timeouts: TimeoutSettings,
    /// Topics pushed without subscribe frames.
    pub auto_subscribed: Vec<String>,
    /// Keep-alive ping interval (`None` disables).
    pub ping_interval: Option<Duration>,
    /// Jitter fraction applied to reconnect delays.
    pub reconnect_jitter: f64,
    /// Reference data endpoints.
    pub reference_data: ReferenceDataSettings,
    /// Topics the binary tails into the log.
    pub topics: Vec<String>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("key", &self.key)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("host", &self.host)
            .field("timeouts", &self.timeouts)
            .field("auto_subscribed", &self.auto_subscribed)
            .field("ping_interval", &self.ping_interval)
            .field("reconnect_jitter", &self.reconnect_jitter)
            .field("reference_data", &self.reference_data)
            .field("topics", &self.topics)
            .finish()
    }
}

impl ClientConfig {
    /// Configuration with defaults for everything but the key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: None,
            host: DEFAULT_HOST.to_string(),
            timeouts: TimeoutSettings::default(),
            auto_subscribed: DEFAULT_AUTO_SUBSCRIBED.iter().map(ToString::to_string).collect(),
            ping_interval: Some(DEFAULT_PING_INTERVAL),
            reconnect_jitter: 0.0,
            reference_data: ReferenceDataSettings::default(),
            topics: Vec::new(),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `C9T_KEY` is missing or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if `C9T_KEY` is missing or empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let key = lookup("C9T_KEY").ok_or_else(|| ConfigError::MissingEnvVar("C9T_KEY".to_string()))?;
        if key.is_empty() {
            return Err(ConfigError::EmptyValue("C9T_KEY".to_string()));
        }

        let defaults = Self::new(key);

        let secret = lookup("C9T_SECRET").filter(|s| !s.is_empty());
        let host = lookup("C9T_HOST")
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.host);

        let timeouts = TimeoutSettings {
            request: parse_duration_millis(&lookup, "C9T_REQUEST_TIMEOUT_MS", defaults.timeouts.request),
            submit: parse_duration_millis(&lookup, "C9T_SUBMIT_TIMEOUT_MS", defaults.timeouts.submit),
        };

        let auto_subscribed = lookup("C9T_AUTO_SUBSCRIBED")
            .map_or(defaults.auto_subscribed, |v| parse_list(&v));

        let ping_interval = match parse_u64(&lookup, "C9T_PING_INTERVAL_SECS") {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.ping_interval,
        };

        let reconnect_jitter = lookup("C9T_RECONNECT_JITTER")
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|j| (0.0..=1.0).contains(j))
            .unwrap_or(defaults.reconnect_jitter);

        let reference_data = ReferenceDataSettings {
            instruments_url: lookup("C9T_INSTRUMENTS_URL")
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.reference_data.instruments_url),
            historical_url: lookup("C9T_HISTORICAL_URL")
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.reference_data.historical_url),
        };

        let topics = lookup("C9T_TOPICS").map(|v| parse_list(&v)).unwrap_or_default();

        Ok(Self {
            key: defaults.key,
            secret,
            host,
            timeouts,
            auto_subscribed,
            ping_interval,
            reconnect_jitter,
            reference_data,
            topics,
        })
    }

    /// Validated credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty or the secret is not base64.
    pub fn credentials(&self) -> Result<Credentials, AuthError> {
        Credentials::new(self.key.clone(), self.secret.as_deref())
    }

    /// Handshake builder for the configured host.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials are invalid.
    pub fn handshake(&self) -> Result<C9tHandshake, AuthError> {
        Ok(C9tHandshake::new(self.host.clone(), self.credentials()?))
    }

    /// Client behavior options.
    #[must_use]
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            request_timeout: self.timeouts.request,
            submit_timeout: self.timeouts.submit,
            auto_subscribed: self.auto_subscribed.clone(),
            reconnect: ReconnectConfig {
                jitter_factor: self.reconnect_jitter,
                ..ReconnectConfig::default()
            },
            request_prefix: None,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn parse_u64<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|v| v.trim().parse().ok())
}

fn parse_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    parse_u64(lookup, key)
        .filter(|ms| *ms > 0)
        .map_or(default, Duration::from_millis)
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}
