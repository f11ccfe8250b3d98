//! Reconnection policy for the push channel.
//!
//! The channel is retried forever: a transport failure is never fatal. By
//! default the delay between attempts is a constant 3 seconds. Exponential
//! back-off with a cap can be switched on to spread reconnect load across
//! clients during a server outage; the external contract (eventual
//! reconnection, at most one active channel) is the same either way.

use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};

/// Default delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Options for automatic reconnection.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectOptions {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (for exponential backoff).
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to use exponential backoff.
    pub use_exponential_backoff: bool,
}

impl Default for ReconnectOptions {
    fn default() -> Self {
        Self::fixed_delay(DEFAULT_RECONNECT_DELAY)
    }
}

impl ReconnectOptions {
    /// Create options with a fixed delay (no backoff).
    pub fn fixed_delay(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            use_exponential_backoff: false,
        }
    }

    /// Create options with exponential backoff starting at `initial` and capped at `max`.
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self {
            initial_delay: initial,
            max_delay: max,
            backoff_multiplier: 2.0,
            use_exponential_backoff: true,
        }
    }

    /// Cap for the delay. Only consulted with exponential back-off.
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Calculate delay for a given attempt number (0-based, reset after each
    /// successful connection).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if !self.use_exponential_backoff {
            return self.initial_delay;
        }

        let exponent = attempt.min(i32::MAX as u32) as i32;
        let delay_ms = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        if !delay_ms.is_finite() || delay_ms >= self.max_delay.as_millis() as f64 {
            return self.max_delay;
        }

        Duration::from_millis(delay_ms as u64).min(self.max_delay)
    }

    /// Validate the options and return an error if invalid.
    ///
    /// Checks that:
    /// - `initial_delay` is > 0
    /// - with backoff enabled, `backoff_multiplier` is >= 1.0 and
    ///   `max_delay` >= `initial_delay`
    pub fn validate(&self) -> Result<()> {
        if self.initial_delay.is_zero() {
            return Err(Error::InvalidConfig(
                "reconnect delay must be > 0".to_string(),
            ));
        }
        if self.use_exponential_backoff {
            if self.backoff_multiplier < 1.0 {
                return Err(Error::InvalidConfig(
                    "backoff_multiplier must be >= 1.0".to_string(),
                ));
            }
            if self.max_delay < self.initial_delay {
                return Err(Error::InvalidConfig(
                    "max_delay must be >= initial_delay".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// State of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Opening a channel.
    Connecting,
    /// Channel is open and delivering frames.
    Connected,
    /// No channel; a reconnect may be pending.
    #[default]
    Disconnected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }
}
