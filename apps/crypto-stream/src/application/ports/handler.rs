//! Handler ports.

use crate::application::services::FeedError;
use crate::domain::market::MarketEvent;

/// Failure reported by a handler. Isolated by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("handler failed: {0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    /// Create a handler error from any message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Receives decoded market events, in wire order, on the connection task.
///
/// Implementations should return quickly; slow handlers delay every
/// subsequent event.
#[cfg_attr(test, mockall::automock)]
pub trait MarketEventHandler: Send + Sync {
    /// Handle one event.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] on failure. The error is logged and does
    /// not affect other handlers.
    fn handle(&self, event: &MarketEvent) -> Result<(), HandlerError>;
}

/// Receives error frames sent by the feed.
pub trait FeedErrorHandler: Send + Sync {
    /// Handle one feed error.
    fn on_feed_error(&self, error: &FeedError);
}
