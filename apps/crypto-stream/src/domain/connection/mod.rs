//! Connection lifecycle state.

use std::fmt;

use serde::Serialize;

/// Lifecycle state of a stream connection.
///
/// ```text
/// Disconnected ─► Connecting ─► Connected ─► Authenticated ─► Subscribed
///      ▲              │                           │   ▲           │
///      └──────────────┘                           │   └───────────┤
///                                                 ▼               ▼
///                         Connecting ◄──────── Reconnecting ◄─────┘
///
/// any state ─► Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No connection and none in progress.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Socket open.
    Connected,
    /// Credentials accepted during the handshake.
    Authenticated,
    /// Control message sent for a non-empty desired set.
    Subscribed,
    /// Connection lost; waiting out the backoff delay.
    Reconnecting,
    /// Stopped. Terminal.
    Closed,
}

impl ConnectionState {
    /// Lowercase label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Authenticated => "authenticated",
            Self::Subscribed => "subscribed",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }

    /// Numeric code for gauges.
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
            Self::Authenticated => 3,
            Self::Subscribed => 4,
            Self::Reconnecting => 5,
            Self::Closed => 6,
        }
    }

    /// Whether the socket is open in this state.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Connected | Self::Authenticated | Self::Subscribed)
    }

    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Check whether moving to `next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        use ConnectionState::{
            Authenticated, Closed, Connected, Connecting, Disconnected, Reconnecting, Subscribed,
        };

        match (*self, next) {
            (Closed, _) => false,
            (_, Closed)
            | (Disconnected | Reconnecting, Connecting)
            | (Connecting, Connected | Disconnected)
            | (Connected, Authenticated)
            | (Authenticated, Subscribed)
            | (Subscribed, Authenticated)
            | (Connected | Authenticated | Subscribed, Disconnected | Reconnecting) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
