//! Transport port.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

/// Errors raised by a [`Transport`] or [`Connection`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Endpoint could not be turned into a handshake request.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// DNS, TCP, TLS, or upgrade failure.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Handshake rejected with an authorization status.
    #[error("handshake rejected with HTTP {0}")]
    Unauthorized(u16),

    /// Handshake did not finish in time.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// Writing a frame failed.
    #[error("send failed: {0}")]
    Send(String),

    /// Reading a frame failed.
    #[error("receive failed: {0}")]
    Receive(String),

    /// Peer closed the connection.
    #[error("connection closed{}", .0.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    Closed(Option<String>),
}

/// One inbound unit from the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Text payload.
    Text(String),
    /// Binary payload.
    Binary(Vec<u8>),
    /// Protocol-level keep-alive (ping or pong). Carries no data.
    KeepAlive,
}

/// Header fields attached to the connection handshake.
///
/// `Debug` prints header names only.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthHeaders(BTreeMap<String, String>);

impl AuthHeaders {
    /// Create an empty header map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Look up a header value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Iterate `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for AuthHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.keys().map(|k| (k, "[REDACTED]")))
            .finish()
    }
}

/// Opens connections to a feed endpoint.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Connection type produced by [`open`](Self::open).
    type Connection: Connection;

    /// Perform the handshake, presenting `headers` during the upgrade.
    async fn open(
        &self,
        endpoint: &str,
        headers: &AuthHeaders,
    ) -> Result<Self::Connection, TransportError>;
}

/// An open, bidirectional connection.
///
/// The connection holds no business state; it only moves frames.
#[async_trait]
pub trait Connection: Send + 'static {
    /// Send one text frame.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Wait for the next frame.
    ///
    /// Must be cancel-safe: dropping the future before it completes must
    /// not lose a frame.
    async fn receive(&mut self) -> Result<Frame, TransportError>;

    /// Send a protocol-level ping.
    async fn ping(&mut self) -> Result<(), TransportError>;

    /// Close the connection. Safe to call more than once.
    async fn close(&mut self) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_headers_debug_hides_values() {
        let mut headers = AuthHeaders::new();
        headers.insert("APCA-API-KEY-ID", "key123");
        headers.insert("APCA-API-SECRET-KEY", "secret456");

        let debug = format!("{headers:?}");
        assert!(debug.contains("APCA-API-KEY-ID"));
        assert!(!debug.contains("key123"));
        assert!(!debug.contains("secret456"));
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("APCA-API-KEY-ID"), Some("key123"));
    }

    #[test]
    fn closed_error_formats_reason() {
        assert_eq!(TransportError::Closed(None).to_string(), "connection closed");
        assert_eq!(
            TransportError::Closed(Some("going away".into())).to_string(),
            "connection closed: going away"
        );
    }
}
