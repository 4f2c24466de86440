//! Application Services
//!
//! - `handlers`: registry of typed market event handlers
//! - `dispatcher`: routes decoded messages to handlers and subscription state
//! - `prices`: latest price per pair

mod dispatcher;
mod handlers;
mod prices;

pub use dispatcher::{ControlNotice, Dispatcher, FeedError, FeedErrorKind, ParsedMessage, Routed};
pub use handlers::{Delivery, HandlerRegistry};
pub use prices::{LatestPrices, PriceBook};
