//! Port Interfaces
//!
//! Contracts between the streaming core and the outside world, following
//! the hexagonal layout of the crate.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`Transport`] / [`Connection`]: the persistent socket to the feed
//!
//! ## Driver Ports (Inbound)
//!
//! - [`MarketEventHandler`]: receives decoded market events
//! - [`FeedErrorHandler`]: receives error frames reported by the feed

mod handler;
mod transport;

pub use handler::{FeedErrorHandler, HandlerError, MarketEventHandler};
pub use transport::{AuthHeaders, Connection, Frame, Transport, TransportError};

#[cfg(test)]
pub use handler::MockMarketEventHandler;
