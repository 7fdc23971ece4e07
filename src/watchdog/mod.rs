//! Stream staleness detection.
//!
//! The review server sends events only when something happens, but a
//! half-open connection looks exactly like a quiet server. The watchdog
//! records the time of the last received line and, if nothing arrives within
//! the timeout, asks the coordinator to reconnect.
//!
//! # Checks
//!
//! - First check after `check_start_delay` (60 s by default)
//! - Then every `check_period` (20 s by default)
//! - No action while inside a configured exception window
//! - `quiet_time > timeout` (whole seconds) triggers one `reconnect()` per check
//!
//! The watchdog does not reset its own clock after reconnecting. The next
//! received line does that via [`StreamWatchdog::signal`].

pub mod exception;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::stream::Coordinator;

pub use exception::{TimeOfDay, TimeParseError, TimeSpan, WatchTimeExceptions};

/// Default delay until the first check (1 minute).
const DEFAULT_CHECK_START_DELAY_SECS: u64 = 60;

/// Default interval between checks (20 seconds).
const DEFAULT_CHECK_PERIOD_SECS: u64 = 20;

/// Configuration for the stream watchdog.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchdogConfig {
    /// Silence longer than this forces a reconnect. Zero disables the watchdog.
    pub timeout: Duration,

    /// Windows during which timeouts are ignored.
    pub exceptions: WatchTimeExceptions,

    /// Delay before the first check.
    pub check_start_delay: Duration,

    /// Interval between checks.
    pub check_period: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self::new(Duration::ZERO, WatchTimeExceptions::default())
    }
}

impl WatchdogConfig {
    pub fn new(timeout: Duration, exceptions: WatchTimeExceptions) -> Self {
        WatchdogConfig {
            timeout,
            exceptions,
            check_start_delay: Duration::from_secs(DEFAULT_CHECK_START_DELAY_SECS),
            check_period: Duration::from_secs(DEFAULT_CHECK_PERIOD_SECS),
        }
    }

    pub fn with_check_schedule(mut self, start_delay: Duration, period: Duration) -> Self {
        self.check_start_delay = start_delay;
        self.check_period = period;
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.timeout.is_zero()
    }
}

/// What a single check decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Inside an exception window.
    Excepted,
    /// Last activity was recent enough.
    Alive { quiet: Duration },
    /// Reconnect was requested.
    Reconnected { quiet: Duration },
    /// The watchdog has been shut down.
    Inert,
}

/// Periodic staleness checker for one connection.
///
/// Cloning yields another handle to the same watchdog.
#[derive(Clone)]
pub struct StreamWatchdog {
    inner: Arc<WatchdogInner>,
}

struct WatchdogInner {
    coordinator: Arc<dyn Coordinator>,
    config: WatchdogConfig,
    last_signal: Mutex<Instant>,
    cancel: CancellationToken,
}

impl StreamWatchdog {
    /// Creates a watchdog without starting its timer.
    pub fn new(coordinator: Arc<dyn Coordinator>, config: WatchdogConfig) -> Self {
        StreamWatchdog {
            inner: Arc::new(WatchdogInner {
                coordinator,
                config,
                last_signal: Mutex::new(Instant::now()),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Creates a watchdog and starts its timer task.
    pub fn spawn(coordinator: Arc<dyn Coordinator>, config: WatchdogConfig) -> Self {
        let watchdog = Self::new(coordinator, config);
        tokio::spawn(watchdog.clone().run());
        watchdog
    }

    #[instrument(skip(self), fields(timeout_secs = self.inner.config.timeout.as_secs()))]
    async fn run(self) {
        let cancel = self.inner.cancel.clone();
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(self.inner.config.check_start_delay) => {}
        }

        let mut ticker = tokio::time::interval(self.inner.config.check_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.check();
                }
            }
        }
        debug!("Watchdog stopped");
    }

    /// Records activity now.
    pub fn signal(&self) {
        *self
            .inner
            .last_signal
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn last_signal(&self) -> Instant {
        *self
            .inner
            .last_signal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Time since the last [`signal`](Self::signal).
    pub fn quiet_time(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_signal())
    }

    /// Runs one check against the current time.
    pub fn check(&self) -> CheckOutcome {
        self.check_at(Instant::now(), Local::now().naive_local())
    }

    /// Runs one check as if the monotonic clock read `now` and the local
    /// wall clock read `wall`.
    pub fn check_at(&self, now: Instant, wall: NaiveDateTime) -> CheckOutcome {
        if self.is_shut_down() {
            return CheckOutcome::Inert;
        }
        if self.inner.config.exceptions.is_exception_at(wall) {
            debug!("Inside watchdog exception window");
            return CheckOutcome::Excepted;
        }

        let quiet = now.saturating_duration_since(self.last_signal());
        debug!(quiet_secs = quiet.as_secs(), "Watchdog check");
        if quiet.as_secs() > self.inner.config.timeout.as_secs() {
            info!(
                quiet_secs = quiet.as_secs(),
                "No data from the server within the timeout; reconnecting"
            );
            self.inner.coordinator.reconnect();
            CheckOutcome::Reconnected { quiet }
        } else {
            CheckOutcome::Alive { quiet }
        }
    }

    /// Stops the timer. The watchdog never acts again afterwards.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }
}
