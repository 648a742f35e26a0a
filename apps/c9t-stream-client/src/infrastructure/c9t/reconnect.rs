//! Reconnection Policy
//!
//! Stepped exponential backoff for socket reconnection. The delay grows
//! once every `attempts_per_step` attempts and stops growing after
//! `max_exponent` steps:
//!
//! ```text
//! delay = round(base ^ floor(min(attempts / attempts_per_step, max_exponent))) seconds
//! ```
//!
//! With the defaults this yields 1, 1, 2, 2, 4, 4, 8, 8, 15, 15, 15, ...

use std::time::Duration;

use rand::Rng;

/// Backoff curve and jitter.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Base of the exponential curve.
    pub base: f64,
    /// Largest exponent used.
    pub max_exponent: u32,
    /// Attempts spent on each step before the exponent grows.
    pub attempts_per_step: u32,
    /// Fraction of the delay to randomize by, `0.0` for none.
    pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base: 1.9805,
            max_exponent: 4,
            attempts_per_step: 2,
            jitter_factor: 0.0,
        }
    }
}

impl ReconnectConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(base: f64, max_exponent: u32, attempts_per_step: u32, jitter_factor: f64) -> Self {
        Self {
            base,
            max_exponent,
            attempts_per_step,
            jitter_factor,
        }
    }
}

/// Reconnection policy tracking the attempt counter.
///
/// # Example
///
/// ```rust
/// use c9t_stream_client::infrastructure::c9t::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
/// assert_eq!(policy.delay(), Duration::from_secs(1));
///
/// policy.record_attempt();
/// policy.record_attempt();
/// assert_eq!(policy.delay(), Duration::from_secs(2));
///
/// // Successful connection
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(ReconnectConfig::default())
    }
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Delay before the next attempt, given the attempts made so far.
    #[must_use]
    pub fn delay(&self) -> Duration {
        let step = self.attempt_count / self.config.attempts_per_step.max(1);
        let exponent = step.min(self.config.max_exponent);

        let seconds = self.config.base.powi(i32::try_from(exponent).unwrap_or(i32::MAX)).round();
        let millis = if seconds.is_finite() && seconds > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                (seconds * 1000.0) as u64
            }
        } else {
            0
        };

        self.apply_jitter(Duration::from_millis(millis))
    }

    /// Count a reconnection attempt.
    pub const fn record_attempt(&mut self) {
        self.attempt_count = self.attempt_count.saturating_add(1);
    }

    /// Reset the policy after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Get the current attempt count.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Spread `delay` uniformly over `±jitter_factor`, never below 1 ms.
    fn apply_jitter(&self, delay: Duration) -> Duration {
        let factor = self.config.jitter_factor.min(1.0);
        if factor <= 0.0 {
            return delay;
        }

        let scale = rand::rng().random_range((1.0 - factor)..=(1.0 + factor));
        delay.mul_f64(scale).max(Duration::from_millis(1))
    }
}
