//! Market Data Types
//!
//! Canonical, codec-agnostic representation of crypto market data:
//! pair symbols, stream kinds, and the events the feed produces.
//!
//! Prices and sizes are [`rust_decimal::Decimal`] so that values such as
//! `3200.50` survive decoding without floating-point drift.

mod events;
mod symbol;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use events::{
    BarEvent, BarKind, EventKind, MarketEvent, OrderBookEvent, PriceLevel, QuoteEvent, TakerSide,
    TradeEvent,
};
pub use symbol::{Symbol, SymbolError};

// =============================================================================
// Stream Kind
// =============================================================================

/// A market data stream that can be subscribed to per symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Individual trades.
    Trade,
    /// Best bid/ask quotes.
    Quote,
    /// One-minute OHLCV bars.
    MinuteBar,
    /// Daily OHLCV bars.
    DailyBar,
    /// Level-2 order book snapshots and updates.
    OrderBook,
}

impl StreamKind {
    /// Every stream kind, in wire order.
    pub const ALL: [Self; 5] = [
        Self::Trade,
        Self::Quote,
        Self::MinuteBar,
        Self::DailyBar,
        Self::OrderBook,
    ];

    /// Short lowercase name, used for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trade => "trade",
            Self::Quote => "quote",
            Self::MinuteBar => "minute_bar",
            Self::DailyBar => "daily_bar",
            Self::OrderBook => "orderbook",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stream name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stream kind: {0}")]
pub struct UnknownStreamKind(pub String);

impl FromStr for StreamKind {
    type Err = UnknownStreamKind;

    /// Accepts wire keys (`trades`, `dailyBars`, ...) and short names
    /// (`trade`, `daily_bar`, ...), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trades" | "trade" => Ok(Self::Trade),
            "quotes" | "quote" => Ok(Self::Quote),
            "bars" | "bar" | "minute_bar" | "minutebars" | "minute_bars" => Ok(Self::MinuteBar),
            "dailybars" | "daily_bars" | "daily_bar" | "dailybar" => Ok(Self::DailyBar),
            "orderbooks" | "orderbook" | "order_book" | "order_books" => Ok(Self::OrderBook),
            _ => Err(UnknownStreamKind(s.to_string())),
        }
    }
}
