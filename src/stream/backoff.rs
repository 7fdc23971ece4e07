//! Exponential backoff between connection attempts.
//!
//! - First retry after 2 s
//! - Each following attempt waits twice as long
//! - Capped at 60 s

use std::time::Duration;

/// Delay schedule for reopening the event stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first retry, and after a connection ends normally.
    pub initial_delay: Duration,

    /// Cap for exponential growth.
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (typically 2.0).
    pub backoff_multiplier: f64,
}

impl ReconnectConfig {
    pub const DEFAULT: Self = Self {
        initial_delay: Duration::from_millis(2000),
        max_delay: Duration::from_secs(60),
        backoff_multiplier: 2.0,
    };

    pub fn new(initial_delay: Duration, max_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Delay after the given number of consecutive failures (0-indexed).
    ///
    /// `initial_delay * backoff_multiplier^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt.min(64) as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped_secs)
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
