//! Message Dispatcher
//!
//! Routes decoded feed messages: market events fan out to the handler
//! registry, subscription confirmations update the subscription manager,
//! and error frames go to feed error handlers.

use std::fmt;
use std::sync::Arc;

use super::handlers::{Delivery, HandlerRegistry};
use crate::domain::market::MarketEvent;
use crate::domain::subscription::{SubscriptionDelta, SubscriptionManager, SubscriptionSet};

// =============================================================================
// Feed Errors
// =============================================================================

/// Classification of feed error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedErrorKind {
    /// 400: malformed control message.
    InvalidSyntax,
    /// 401, 402, 404: credentials missing, rejected, or too late.
    AuthRejected,
    /// 403: an auth message arrived on an already authenticated session.
    AlreadyAuthenticated,
    /// 405: too many symbols.
    SymbolLimit,
    /// 406: too many concurrent connections for the account.
    ConnectionLimit,
    /// 407: client is not keeping up with the stream.
    SlowClient,
    /// 408, 409: plan does not include the requested data.
    InsufficientSubscription,
    /// 410: unknown subscribe action.
    InvalidAction,
    /// 500 and anything unrecognised.
    Other,
}

impl FeedErrorKind {
    /// Classify a numeric code.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            400 => Self::InvalidSyntax,
            401 | 402 | 404 => Self::AuthRejected,
            403 => Self::AlreadyAuthenticated,
            405 => Self::SymbolLimit,
            406 => Self::ConnectionLimit,
            407 => Self::SlowClient,
            408 | 409 => Self::InsufficientSubscription,
            410 => Self::InvalidAction,
            _ => Self::Other,
        }
    }

    /// Lowercase label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidSyntax => "invalid_syntax",
            Self::AuthRejected => "auth_rejected",
            Self::AlreadyAuthenticated => "already_authenticated",
            Self::SymbolLimit => "symbol_limit",
            Self::ConnectionLimit => "connection_limit",
            Self::SlowClient => "slow_client",
            Self::InsufficientSubscription => "insufficient_subscription",
            Self::InvalidAction => "invalid_action",
            Self::Other => "other",
        }
    }
}

/// An error frame reported by the feed.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "error", "code": 402, "msg": "auth failed"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedError {
    /// Numeric code.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
}

impl FeedError {
    /// Create a feed error.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Classification of the code.
    #[must_use]
    pub const fn kind(&self) -> FeedErrorKind {
        FeedErrorKind::from_code(self.code)
    }
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

// =============================================================================
// Parsed Messages
// =============================================================================

/// Session notices sent by the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlNotice {
    /// Socket accepted.
    Connected,
    /// Credentials accepted.
    Authenticated,
    /// Any other success message.
    Other(String),
}

/// One decoded message from a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedMessage {
    /// Market data.
    Market(MarketEvent),
    /// Full set of subscriptions the feed currently streams.
    SubscriptionAck(SubscriptionSet),
    /// Error frame.
    FeedError(FeedError),
    /// Success notice.
    Notice(ControlNotice),
    /// Well-formed message with a discriminator this client does not know.
    Unknown(String),
}

/// What [`Dispatcher::route`] did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// Market event delivered to handlers.
    Delivered(Delivery),
    /// Acknowledged set updated; `outstanding` is what the feed has not confirmed.
    Acknowledged {
        /// Delta between desired and acknowledged after the update.
        outstanding: SubscriptionDelta,
    },
    /// Error frame passed to error handlers.
    FeedError(FeedError),
    /// Notice observed.
    Notice(ControlNotice),
    /// Unknown message dropped.
    Dropped(String),
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Routes parsed messages to handlers and subscription state.
#[derive(Debug)]
pub struct Dispatcher {
    registry: HandlerRegistry,
    subscriptions: Arc<SubscriptionManager>,
}

impl Dispatcher {
    /// Create a dispatcher.
    #[must_use]
    pub const fn new(registry: HandlerRegistry, subscriptions: Arc<SubscriptionManager>) -> Self {
        Self {
            registry,
            subscriptions,
        }
    }

    /// Handler registry.
    #[must_use]
    pub const fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Subscription manager updated by acknowledgments.
    #[must_use]
    pub const fn subscriptions(&self) -> &Arc<SubscriptionManager> {
        &self.subscriptions
    }

    /// Route one message.
    pub fn route(&self, message: ParsedMessage) -> Routed {
        match message {
            ParsedMessage::Market(event) => {
                tracing::trace!(
                    kind = event.kind().as_str(),
                    symbol = %event.symbol(),
                    "Dispatching market event"
                );
                Routed::Delivered(self.registry.deliver(&event))
            }
            ParsedMessage::SubscriptionAck(confirmed) => {
                let acknowledged = confirmed.len();
                let outstanding = self.subscriptions.acknowledge(confirmed);
                if outstanding.is_empty() {
                    tracing::info!(acknowledged, "Subscriptions confirmed");
                } else {
                    tracing::debug!(
                        acknowledged,
                        outstanding_add = outstanding.to_add.len(),
                        outstanding_remove = outstanding.to_remove.len(),
                        "Subscriptions partially confirmed"
                    );
                }
                Routed::Acknowledged { outstanding }
            }
            ParsedMessage::FeedError(error) => {
                tracing::warn!(
                    code = error.code,
                    kind = error.kind().as_str(),
                    msg = %error.message,
                    "Feed reported error"
                );
                self.registry.report_feed_error(&error);
                Routed::FeedError(error)
            }
            ParsedMessage::Notice(notice) => {
                tracing::debug!(?notice, "Feed notice");
                Routed::Notice(notice)
            }
            ParsedMessage::Unknown(discriminator) => {
                tracing::debug!(%discriminator, "Dropping message with unknown type");
                Routed::Dropped(discriminator)
            }
        }
    }
}
