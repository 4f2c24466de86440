//! Stream Configuration Settings
//!
//! Configuration for the crypto stream client, loaded from environment
//! variables. Every setting has a default; a value that is present but
//! unparsable is an error rather than being silently replaced.

use std::time::Duration;

use crate::domain::market::{StreamKind, Symbol};
use crate::domain::subscription::{Subscription, expand};
use crate::infrastructure::alpaca::{CredentialError, DEFAULT_ENDPOINT};

/// Stream client settings.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    /// WebSocket URL.
    pub ws_url: String,
    /// Pairs to subscribe at start.
    pub symbols: Vec<Symbol>,
    /// Streams to subscribe for each pair.
    pub streams: Vec<StreamKind>,
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
    /// Inbound silence before the connection is considered dead.
    pub silence_window: Duration,
    /// WebSocket handshake timeout.
    pub connect_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Jitter fraction applied to each delay.
    pub reconnect_jitter: f64,
    /// Session lifetime after which backoff resets.
    pub reconnect_stable_after: Duration,
    /// Maximum consecutive reconnection attempts (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Consecutive authentication rejections tolerated (0 = unlimited).
    pub max_auth_failures: u32,
    /// Health check HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_ENDPOINT.to_string(),
            symbols: default_symbols(),
            streams: vec![StreamKind::Trade, StreamKind::Quote, StreamKind::MinuteBar],
            heartbeat_interval: Duration::from_secs(20),
            silence_window: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            reconnect_delay_initial: Duration::from_secs(1),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            reconnect_jitter: 0.1,
            reconnect_stable_after: Duration::from_secs(60),
            max_reconnect_attempts: 0,
            max_auth_failures: 3,
            health_port: 8083,
        }
    }
}

fn default_symbols() -> Vec<Symbol> {
    ["BTC/USD", "ETH/USD"]
        .into_iter()
        .filter_map(|s| Symbol::parse(s).ok())
        .collect()
}

impl StreamSettings {
    /// Load settings from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an invalid value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let env = Env(&lookup);

        let settings = Self {
            ws_url: env.string("CRYPTO_WS_URL", defaults.ws_url)?,
            symbols: env.list("CRYPTO_SYMBOLS", defaults.symbols, |s| {
                Symbol::normalized(s).map_err(|e| e.to_string())
            })?,
            streams: env.list("CRYPTO_STREAMS", defaults.streams, |s| {
                s.parse::<StreamKind>().map_err(|e| e.to_string())
            })?,
            heartbeat_interval: env.secs(
                "STREAM_HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval,
            )?,
            silence_window: env.secs("STREAM_SILENCE_WINDOW_SECS", defaults.silence_window)?,
            connect_timeout: env.secs("STREAM_CONNECT_TIMEOUT_SECS", defaults.connect_timeout)?,
            reconnect_delay_initial: env.millis(
                "STREAM_RECONNECT_DELAY_INITIAL_MS",
                defaults.reconnect_delay_initial,
            )?,
            reconnect_delay_max: env.secs(
                "STREAM_RECONNECT_DELAY_MAX_SECS",
                defaults.reconnect_delay_max,
            )?,
            reconnect_delay_multiplier: env.parse(
                "STREAM_RECONNECT_DELAY_MULTIPLIER",
                defaults.reconnect_delay_multiplier,
            )?,
            reconnect_jitter: env.parse("STREAM_RECONNECT_JITTER", defaults.reconnect_jitter)?,
            reconnect_stable_after: env.secs(
                "STREAM_RECONNECT_STABLE_AFTER_SECS",
                defaults.reconnect_stable_after,
            )?,
            max_reconnect_attempts: env.parse(
                "STREAM_MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            )?,
            max_auth_failures: env.parse("STREAM_MAX_AUTH_FAILURES", defaults.max_auth_failures)?,
            health_port: env.parse("STREAM_HEALTH_PORT", defaults.health_port)?,
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.reconnect_delay_multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "STREAM_RECONNECT_DELAY_MULTIPLIER",
                "must be at least 1.0",
            ));
        }
        if !(0.0..1.0).contains(&self.reconnect_jitter) {
            return Err(ConfigError::invalid(
                "STREAM_RECONNECT_JITTER",
                "must be in [0.0, 1.0)",
            ));
        }
        if self.reconnect_delay_max < self.reconnect_delay_initial {
            return Err(ConfigError::invalid(
                "STREAM_RECONNECT_DELAY_MAX_SECS",
                "must not be below the initial delay",
            ));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::invalid(
                "STREAM_HEARTBEAT_INTERVAL_SECS",
                "must be greater than zero",
            ));
        }
        if self.silence_window <= self.heartbeat_interval {
            return Err(ConfigError::invalid(
                "STREAM_SILENCE_WINDOW_SECS",
                "must exceed the heartbeat interval",
            ));
        }
        Ok(())
    }

    /// Subscriptions requested at start: every symbol times every stream.
    #[must_use]
    pub fn initial_subscriptions(&self) -> Vec<Subscription> {
        expand(&self.symbols, &self.streams).into_iter().collect()
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),

    /// Environment variable cannot be parsed.
    #[error("invalid value for {key}: {message}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What was wrong.
        message: String,
    },

    /// Credential values are unusable.
    #[error("invalid credentials: {0}")]
    Credential(#[from] CredentialError),

    /// A `.env` file could not be read.
    #[error("failed to read {path}: {message}")]
    EnvFile {
        /// File path.
        path: String,
        /// Underlying error.
        message: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: String) -> Result<String, ConfigError> {
        Ok(self.get(key).unwrap_or(default))
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key).map_or(Ok(default), |v| {
            v.parse()
                .map_err(|e: T::Err| ConfigError::invalid(key, format!("{v:?}: {e}")))
        })
    }

    fn secs(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.get(key).map_or(Ok(default), |v| {
            v.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|e| ConfigError::invalid(key, format!("{v:?}: {e}")))
        })
    }

    fn millis(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.get(key).map_or(Ok(default), |v| {
            v.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| ConfigError::invalid(key, format!("{v:?}: {e}")))
        })
    }

    fn list<T>(
        &self,
        key: &str,
        default: Vec<T>,
        item: impl Fn(&str) -> Result<T, String>,
    ) -> Result<Vec<T>, ConfigError> {
        let Some(raw) = self.get(key) else {
            return Ok(default);
        };

        let values = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| item(s).map_err(|e| ConfigError::invalid(key, e)))
            .collect::<Result<Vec<_>, _>>()?;

        if values.is_empty() {
            return Err(ConfigError::EmptyValue(key.to_string()));
        }
        Ok(values)
    }
}
