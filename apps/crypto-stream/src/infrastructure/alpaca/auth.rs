//! Alpaca WebSocket Authentication
//!
//! The crypto stream authenticates during the WebSocket upgrade: the API
//! key and secret travel as HTTP headers on the handshake request, and the
//! session is authenticated before any frame is exchanged.
//!
//! # Authentication Flow
//!
//! 1. Open the WebSocket with `APCA-API-KEY-ID` and `APCA-API-SECRET-KEY` headers
//! 2. Receive `[{"T":"success","msg":"connected"}]`
//! 3. Receive `[{"T":"success","msg":"authenticated"}]` or an error frame
//!
//! No `{"action":"auth",...}` message is ever sent. Sending one on a
//! header-authenticated session is answered with error 403.
//!
//! # Error Codes
//!
//! - 401: Not authenticated
//! - 402: Authentication failed (invalid credentials)
//! - 403: Already authenticated
//! - 404: Authentication timeout
//! - 406: Connection limit exceeded
//!
//! # References
//!
//! - [Crypto Streaming](https://docs.alpaca.markets/docs/real-time-crypto-pricing-data)

use thiserror::Error;

use crate::application::ports::AuthHeaders;
use crate::application::services::{FeedError, FeedErrorKind};

// =============================================================================
// Constants
// =============================================================================

/// Header carrying the API key id.
pub const KEY_ID_HEADER: &str = "APCA-API-KEY-ID";

/// Header carrying the API secret.
pub const SECRET_KEY_HEADER: &str = "APCA-API-SECRET-KEY";

// =============================================================================
// Error Types
// =============================================================================

/// Invalid credential values. Fatal at startup, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// Key id is empty.
    #[error("API key cannot be empty")]
    EmptyKey,

    /// Secret is empty.
    #[error("API secret cannot be empty")]
    EmptySecret,

    /// A value cannot be sent as an HTTP header.
    #[error("{0} contains characters that are not valid in an HTTP header")]
    InvalidHeaderValue(&'static str),
}

/// Authentication failures reported by the feed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Session is not authenticated.
    #[error("not authenticated: credentials were not accepted")]
    NotAuthenticated,

    /// Credentials rejected.
    #[error("authentication failed: invalid API key or secret")]
    InvalidCredentials,

    /// Authentication did not complete in time.
    #[error("authentication timeout")]
    Timeout,

    /// Handshake rejected at the HTTP level.
    #[error("handshake rejected with HTTP {0}")]
    HandshakeRejected(u16),

    /// Too many concurrent connections for this account.
    #[error("connection limit exceeded: too many concurrent connections")]
    ConnectionLimitExceeded,
}

impl AuthError {
    /// Map a feed error to an authentication failure.
    ///
    /// Returns `None` for errors that are not credential problems,
    /// including 403 (already authenticated), which is harmless on a
    /// header-authenticated session.
    #[must_use]
    pub const fn from_feed_error(error: &FeedError) -> Option<Self> {
        match error.code {
            401 => Some(Self::NotAuthenticated),
            402 => Some(Self::InvalidCredentials),
            404 => Some(Self::Timeout),
            _ => None,
        }
    }

    /// Whether retrying with the same credentials could succeed.
    #[must_use]
    pub const fn is_credential_problem(&self) -> bool {
        !matches!(self, Self::ConnectionLimitExceeded)
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Alpaca API credentials.
///
/// An explicit value handed to the client at start; never read from
/// process-wide state by the streaming core. `Debug` redacts both fields.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    key: String,
    secret: String,
}

impl Credentials {
    /// Create new credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if either key or secret is empty.
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Result<Self, CredentialError> {
        let key = key.into();
        let secret = secret.into();

        if key.trim().is_empty() {
            return Err(CredentialError::EmptyKey);
        }
        if secret.trim().is_empty() {
            return Err(CredentialError::EmptySecret);
        }

        Ok(Self { key, secret })
    }

    /// API key id.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// API secret.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &"[REDACTED]")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Authenticator
// =============================================================================

/// Builds handshake headers from credentials.
#[derive(Debug, Default, Clone, Copy)]
pub struct Authenticator;

impl Authenticator {
    /// Produce exactly the two handshake headers the feed requires.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] if a value is empty or contains bytes
    /// that cannot appear in an HTTP header.
    pub fn headers(credentials: &Credentials) -> Result<AuthHeaders, CredentialError> {
        let key = credentials.key();
        let secret = credentials.secret();

        if key.is_empty() {
            return Err(CredentialError::EmptyKey);
        }
        if secret.is_empty() {
            return Err(CredentialError::EmptySecret);
        }
        if !is_header_safe(key) {
            return Err(CredentialError::InvalidHeaderValue("API key"));
        }
        if !is_header_safe(secret) {
            return Err(CredentialError::InvalidHeaderValue("API secret"));
        }

        let mut headers = AuthHeaders::new();
        headers.insert(KEY_ID_HEADER, key);
        headers.insert(SECRET_KEY_HEADER, secret);
        Ok(headers)
    }

    /// Classify a feed error frame received on an open session.
    ///
    /// 403 (already authenticated) is logged and ignored; 406 is surfaced
    /// as [`AuthError::ConnectionLimitExceeded`] but is not a credential
    /// problem.
    #[must_use]
    pub fn classify(error: &FeedError) -> Option<AuthError> {
        match error.kind() {
            FeedErrorKind::AlreadyAuthenticated => {
                tracing::debug!(code = error.code, "Ignoring 'already authenticated' error");
                None
            }
            FeedErrorKind::ConnectionLimit => Some(AuthError::ConnectionLimitExceeded),
            _ => AuthError::from_feed_error(error),
        }
    }
}

/// Visible ASCII only, matching what `http::HeaderValue` accepts without
/// obs-text.
fn is_header_safe(value: &str) -> bool {
    value.bytes().all(|b| b == b'\t' || (0x20..0x7f).contains(&b))
}
