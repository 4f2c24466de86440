//! Heartbeat and Liveness
//!
//! The supervisor pings the server every `ping_interval` and treats a
//! session as dead once no inbound frame of any kind (data, control,
//! ping or pong) has arrived within `silence_window`.

use std::time::Duration;

use tokio::time::Instant;

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between ping messages.
    pub ping_interval: Duration,
    /// Maximum inbound silence before the session is considered dead.
    pub silence_window: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(20),
            silence_window: Duration::from_secs(60),
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(ping_interval: Duration, silence_window: Duration) -> Self {
        Self {
            ping_interval,
            silence_window,
        }
    }

    /// Build from stream settings.
    #[must_use]
    pub const fn from_settings(settings: &crate::StreamSettings) -> Self {
        Self {
            ping_interval: settings.heartbeat_interval,
            silence_window: settings.silence_window,
        }
    }

    /// Check that a session can run with these timings.
    ///
    /// # Errors
    ///
    /// Returns an error if the ping interval is zero or the silence window
    /// does not exceed it.
    pub fn validate(&self) -> Result<(), HeartbeatConfigError> {
        if self.ping_interval.is_zero() {
            return Err(HeartbeatConfigError::ZeroPingInterval);
        }
        if self.silence_window <= self.ping_interval {
            return Err(HeartbeatConfigError::SilenceWithinPing {
                ping_interval: self.ping_interval,
                silence_window: self.silence_window,
            });
        }
        Ok(())
    }
}

/// Heartbeat timings the supervisor cannot run with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeartbeatConfigError {
    /// Pings would fire continuously.
    #[error("ping interval must be greater than zero")]
    ZeroPingInterval,

    /// The session would be declared dead before a ping could be answered.
    #[error("silence window {silence_window:?} must exceed ping interval {ping_interval:?}")]
    SilenceWithinPing {
        /// Configured ping interval.
        ping_interval: Duration,
        /// Configured silence window.
        silence_window: Duration,
    },
}

/// Tracks the last inbound frame of a single session.
///
/// Uses `tokio::time::Instant` so that the deadline can drive
/// `tokio::time::sleep_until` and follows a paused test clock.
#[derive(Debug, Clone, Copy)]
pub struct Liveness {
    window: Duration,
    last_frame: Instant,
}

impl Liveness {
    /// Start tracking from now.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_frame: Instant::now(),
        }
    }

    /// Record an inbound frame.
    pub fn touch(&mut self) {
        self.last_frame = Instant::now();
    }

    /// Instant at which the session is declared dead.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.last_frame + self.window
    }

    /// Time since the last inbound frame.
    #[must_use]
    pub fn silence(&self) -> Duration {
        self.last_frame.elapsed()
    }
}
