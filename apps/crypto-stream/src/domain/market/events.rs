//! Market events delivered to handlers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{StreamKind, Symbol};

/// Aggressor side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TakerSide {
    /// Taker bought (lifted the ask).
    Buy,
    /// Taker sold (hit the bid).
    Sell,
    /// Feed did not report a side.
    #[default]
    Unknown,
}

impl TakerSide {
    /// Map the feed's taker flag (`B`/`S` or `buy`/`sell`).
    #[must_use]
    pub fn from_flag(flag: &str) -> Self {
        if flag.eq_ignore_ascii_case("b") || flag.eq_ignore_ascii_case("buy") {
            Self::Buy
        } else if flag.eq_ignore_ascii_case("s") || flag.eq_ignore_ascii_case("sell") {
            Self::Sell
        } else {
            Self::Unknown
        }
    }

    /// Lowercase label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::Unknown => "unknown",
        }
    }
}

/// A single executed trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeEvent {
    /// Traded pair.
    pub symbol: Symbol,
    /// Execution price.
    pub price: Decimal,
    /// Executed quantity in base currency.
    pub size: Decimal,
    /// Taker side.
    pub side: TakerSide,
    /// Feed-assigned trade id, when present.
    pub trade_id: Option<u64>,
    /// Exchange timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Top-of-book quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteEvent {
    /// Quoted pair.
    pub symbol: Symbol,
    /// Best bid price.
    pub bid_price: Decimal,
    /// Size available at the best bid.
    pub bid_size: Decimal,
    /// Best ask price.
    pub ask_price: Decimal,
    /// Size available at the best ask.
    pub ask_size: Decimal,
    /// Exchange timestamp.
    pub timestamp: DateTime<Utc>,
}

impl QuoteEvent {
    /// Ask minus bid.
    #[must_use]
    pub fn spread(&self) -> Decimal {
        self.ask_price - self.bid_price
    }

    /// Midpoint between bid and ask.
    #[must_use]
    pub fn mid_price(&self) -> Decimal {
        (self.bid_price + self.ask_price) / Decimal::TWO
    }
}

/// Aggregation period of a bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarKind {
    /// One-minute bar.
    Minute,
    /// Daily bar.
    Daily,
    /// Late correction to a previously published minute bar.
    Updated,
}

impl BarKind {
    /// Lowercase label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Daily => "daily",
            Self::Updated => "updated",
        }
    }
}

/// OHLCV bar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BarEvent {
    /// Pair the bar aggregates.
    pub symbol: Symbol,
    /// Aggregation period.
    pub kind: BarKind,
    /// Opening price.
    pub open: Decimal,
    /// Highest price.
    pub high: Decimal,
    /// Lowest price.
    pub low: Decimal,
    /// Closing price.
    pub close: Decimal,
    /// Traded volume in base currency.
    pub volume: Decimal,
    /// Volume-weighted average price.
    pub vwap: Option<Decimal>,
    /// Number of trades in the bar.
    pub trade_count: Option<u64>,
    /// Start of the bar period.
    pub timestamp: DateTime<Utc>,
}

/// One price level of an order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Level price.
    pub price: Decimal,
    /// Size resting at the level (zero removes the level).
    pub size: Decimal,
}

/// Order book snapshot (`reset == true`) or incremental update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookEvent {
    /// Pair the book belongs to.
    pub symbol: Symbol,
    /// Bid levels.
    pub bids: Vec<PriceLevel>,
    /// Ask levels.
    pub asks: Vec<PriceLevel>,
    /// Whether this replaces the whole book.
    pub reset: bool,
    /// Exchange timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Variant key of a [`MarketEvent`], used to route events to typed handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`MarketEvent::Trade`]
    Trade,
    /// [`MarketEvent::Quote`]
    Quote,
    /// [`MarketEvent::Bar`]
    Bar,
    /// [`MarketEvent::OrderBook`]
    OrderBook,
}

impl EventKind {
    /// Lowercase label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trade => "trade",
            Self::Quote => "quote",
            Self::Bar => "bar",
            Self::OrderBook => "orderbook",
        }
    }
}

/// A decoded market data event.
///
/// Events are immutable values constructed once per inbound message and
/// handed to handlers by reference; the dispatcher keeps no copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketEvent {
    /// Trade print.
    Trade(TradeEvent),
    /// Quote update.
    Quote(QuoteEvent),
    /// OHLCV bar.
    Bar(BarEvent),
    /// Order book update.
    OrderBook(OrderBookEvent),
}

impl MarketEvent {
    /// Pair the event refers to.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        match self {
            Self::Trade(e) => &e.symbol,
            Self::Quote(e) => &e.symbol,
            Self::Bar(e) => &e.symbol,
            Self::OrderBook(e) => &e.symbol,
        }
    }

    /// Exchange timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Trade(e) => e.timestamp,
            Self::Quote(e) => e.timestamp,
            Self::Bar(e) => e.timestamp,
            Self::OrderBook(e) => e.timestamp,
        }
    }

    /// Variant key.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Trade(_) => EventKind::Trade,
            Self::Quote(_) => EventKind::Quote,
            Self::Bar(_) => EventKind::Bar,
            Self::OrderBook(_) => EventKind::OrderBook,
        }
    }

    /// Stream the event was published on.
    ///
    /// Updated bars are corrections on the minute-bar stream.
    #[must_use]
    pub const fn stream_kind(&self) -> StreamKind {
        match self {
            Self::Trade(_) => StreamKind::Trade,
            Self::Quote(_) => StreamKind::Quote,
            Self::Bar(bar) => match bar.kind {
                BarKind::Minute | BarKind::Updated => StreamKind::MinuteBar,
                BarKind::Daily => StreamKind::DailyBar,
            },
            Self::OrderBook(_) => StreamKind::OrderBook,
        }
    }
}
