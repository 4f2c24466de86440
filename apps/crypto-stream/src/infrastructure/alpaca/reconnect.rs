//! Reconnection Policy
//!
//! Exponential backoff with jitter for reconnecting the crypto stream.
//!
//! Delays grow as `initial * multiplier^n` up to `max_delay`. Below the cap,
//! jitter is clamped so that a returned delay never drops below the previous
//! one. Once the schedule reaches the cap, each delay is drawn from
//! `[max_delay * (1 - jitter_factor), max_delay]`. A session that stays up
//! for `stable_after` resets the schedule to `initial_delay`.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Initial delay before first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between reconnection attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 doubles delay each attempt).
    pub multiplier: f64,
    /// Jitter factor as a fraction (e.g., 0.1 = ±10% randomization).
    pub jitter_factor: f64,
    /// Maximum number of consecutive attempts (0 = unlimited).
    pub max_attempts: u32,
    /// Session lifetime after which the backoff schedule resets.
    pub stable_after: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 0,
            stable_after: Duration::from_secs(60),
        }
    }
}

impl ReconnectConfig {
    /// Build from stream settings.
    #[must_use]
    pub const fn from_settings(settings: &crate::StreamSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_delay_initial,
            max_delay: settings.reconnect_delay_max,
            multiplier: settings.reconnect_delay_multiplier,
            jitter_factor: settings.reconnect_jitter,
            max_attempts: settings.max_reconnect_attempts,
            stable_after: settings.reconnect_stable_after,
        }
    }
}

/// Backoff schedule for one run of consecutive failed connections.
///
/// # Example
///
/// ```rust
/// use crypto_stream::infrastructure::alpaca::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
///
/// let first = policy.next_delay().unwrap();
/// let second = policy.next_delay().unwrap();
/// assert!(second >= first);
/// assert!(second <= Duration::from_secs(30));
///
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempts: u32,
    floor: Duration,
}

impl ReconnectPolicy {
    /// Start a fresh schedule.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
            floor: Duration::ZERO,
        }
    }

    /// Delay to wait before the next attempt, or `None` once the attempt
    /// limit is spent.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }

        let max = self.config.max_delay;
        let base = self.base_delay(self.attempts);
        self.attempts += 1;

        if base >= max {
            return Some(self.below_cap());
        }

        let delay = self.spread(base).clamp(self.floor, max);
        self.floor = delay;
        Some(delay)
    }

    /// Un-jittered delay for the zero-based `attempt`.
    fn base_delay(&self, attempt: u32) -> Duration {
        let max = self.config.max_delay;
        let mut delay = self.config.initial_delay.min(max);
        for _ in 0..attempt {
            if delay >= max || self.config.multiplier <= 1.0 {
                break;
            }
            delay = scale(delay, self.config.multiplier, max);
        }
        delay
    }

    /// Randomize `base` by up to `jitter_factor` in either direction.
    fn spread(&self, base: Duration) -> Duration {
        let factor = self.config.jitter_factor;
        if factor <= 0.0 || base.is_zero() {
            return base;
        }
        let offset = rand::rng().random_range(-factor..=factor);
        scale(base, 1.0 + offset, self.config.max_delay)
    }

    /// Randomize the capped delay downward by up to `jitter_factor`.
    fn below_cap(&self) -> Duration {
        let max = self.config.max_delay;
        let factor = self.config.jitter_factor.min(1.0);
        if factor <= 0.0 || max.is_zero() {
            return max;
        }
        let offset = rand::rng().random_range(0.0..=factor);
        scale(max, 1.0 - offset, max)
    }

    /// Start over from `initial_delay`.
    pub const fn reset(&mut self) {
        self.attempts = 0;
        self.floor = Duration::ZERO;
    }

    /// Reset if a session lasted at least `stable_after`.
    ///
    /// Returns whether the schedule was reset.
    pub fn reset_if_stable(&mut self, session: Duration) -> bool {
        let stable = session >= self.config.stable_after;
        if stable {
            self.reset();
        }
        stable
    }

    /// Attempts handed out since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempts
    }

    /// Whether another attempt is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempts < self.config.max_attempts
    }

    /// Configured attempt limit (0 = unlimited).
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}

/// `duration * factor` in whole nanoseconds, saturating at `cap`.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn scale(duration: Duration, factor: f64, cap: Duration) -> Duration {
    let nanos = (duration.as_nanos() as f64 * factor).round();
    if !nanos.is_finite() || nanos >= cap.as_nanos() as f64 {
        cap
    } else if nanos <= 0.0 {
        Duration::ZERO
    } else {
        Duration::from_nanos(nanos as u64)
    }
}
