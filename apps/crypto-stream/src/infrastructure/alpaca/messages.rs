//! Alpaca Crypto WebSocket Message Types
//!
//! Wire format types for the `v1beta3/crypto/us` market data stream. Each
//! type converts into the corresponding domain type.
//!
//! # Dialects
//!
//! The feed uses single-letter keys (`{"T":"t","S":"BTC/USD","p":...}`).
//! Long-form keys (`{"type":"trade","symbol":"BTC/USD","price":...}`) are
//! accepted as aliases so that recorded or proxied frames decode the same way.
//!
//! # Message Types
//!
//! | `T` | long form | payload |
//! |-----|-----------|---------|
//! | `t` | `trade` | [`TradeMessage`] |
//! | `q` | `quote` | [`QuoteMessage`] |
//! | `b` | `bar` | [`BarMessage`] (minute) |
//! | `d` | `dailyBar` | [`BarMessage`] (daily) |
//! | `u` | `updatedBar` | [`BarMessage`] (correction) |
//! | `o` | `orderbook` | [`OrderBookMessage`] |
//! | `success` | | [`SuccessMessage`] |
//! | `subscription` | | [`SubscriptionMessage`] |
//! | `error` | | [`ErrorMessage`] |
//!
//! # References
//!
//! - [Crypto Streaming](https://docs.alpaca.markets/docs/real-time-crypto-pricing-data)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::application::services::{ControlNotice, FeedError};
use crate::domain::market::{
    BarEvent, BarKind, OrderBookEvent, PriceLevel, QuoteEvent, StreamKind, Symbol, SymbolError,
    TakerSide, TradeEvent,
};
use crate::domain::subscription::{Subscription, SubscriptionSet};

// =============================================================================
// Control Messages
// =============================================================================

/// Success notice.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "success", "msg": "connected"}
/// {"T": "success", "msg": "authenticated"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SuccessMessage {
    /// `connected` or `authenticated`.
    #[serde(alias = "message")]
    pub msg: String,
}

impl From<SuccessMessage> for ControlNotice {
    fn from(msg: SuccessMessage) -> Self {
        match msg.msg.as_str() {
            "connected" => Self::Connected,
            "authenticated" => Self::Authenticated,
            _ => Self::Other(msg.msg),
        }
    }
}

/// Error frame.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "error", "code": 406, "msg": "connection limit exceeded"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorMessage {
    /// Error code.
    pub code: i32,

    /// Error description.
    #[serde(alias = "message", default)]
    pub msg: String,
}

impl From<ErrorMessage> for FeedError {
    fn from(msg: ErrorMessage) -> Self {
        Self::new(msg.code, msg.msg)
    }
}

/// Subscription confirmation listing everything the feed now streams.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "T": "subscription",
///   "trades": ["BTC/USD"],
///   "quotes": ["BTC/USD", "ETH/USD"],
///   "bars": [],
///   "updatedBars": [],
///   "dailyBars": [],
///   "orderbooks": []
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SubscriptionMessage {
    /// Trade symbols.
    #[serde(default)]
    pub trades: Vec<String>,

    /// Quote symbols.
    #[serde(default)]
    pub quotes: Vec<String>,

    /// Minute bar symbols.
    #[serde(default)]
    pub bars: Vec<String>,

    /// Daily bar symbols.
    #[serde(default, rename = "dailyBars", alias = "daily_bars")]
    pub daily_bars: Vec<String>,

    /// Updated bar symbols. Implied by minute bars; not tracked separately.
    #[serde(default, rename = "updatedBars", alias = "updated_bars")]
    pub updated_bars: Vec<String>,

    /// Order book symbols.
    #[serde(default)]
    pub orderbooks: Vec<String>,
}

impl SubscriptionMessage {
    /// Convert to a subscription set.
    ///
    /// Symbols that are not valid pairs (e.g. the `*` wildcard) are
    /// reported in the second element and left out of the set.
    #[must_use]
    pub fn into_set(self) -> (SubscriptionSet, Vec<String>) {
        let mut set = SubscriptionSet::new();
        let mut rejected = Vec::new();

        let lists = [
            (StreamKind::Trade, self.trades),
            (StreamKind::Quote, self.quotes),
            (StreamKind::MinuteBar, self.bars),
            (StreamKind::DailyBar, self.daily_bars),
            (StreamKind::OrderBook, self.orderbooks),
        ];

        for (kind, symbols) in lists {
            for raw in symbols {
                match Symbol::parse(&raw) {
                    Ok(symbol) => {
                        set.insert(Subscription::new(symbol, kind));
                    }
                    Err(_) => rejected.push(raw),
                }
            }
        }

        (set, rejected)
    }
}

// =============================================================================
// Market Data Messages
// =============================================================================

/// Trade print.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "T": "t",
///   "S": "BTC/USD",
///   "p": 64250.5,
///   "s": 0.0125,
///   "t": "2025-01-01T00:00:00.123456789Z",
///   "i": 4321,
///   "tks": "B"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TradeMessage {
    /// Pair.
    #[serde(rename = "S", alias = "symbol")]
    pub symbol: String,

    /// Price.
    #[serde(rename = "p", alias = "price")]
    pub price: Decimal,

    /// Size.
    #[serde(rename = "s", alias = "size")]
    pub size: Decimal,

    /// Timestamp.
    #[serde(rename = "t", alias = "ts", alias = "timestamp")]
    pub timestamp: DateTime<Utc>,

    /// Trade id.
    #[serde(rename = "i", alias = "id", default)]
    pub trade_id: Option<u64>,

    /// Taker side flag: `B`, `S`, `buy` or `sell`.
    #[serde(rename = "tks", alias = "side", default)]
    pub taker_side: Option<String>,
}

impl TryFrom<TradeMessage> for TradeEvent {
    type Error = SymbolError;

    fn try_from(msg: TradeMessage) -> Result<Self, Self::Error> {
        Ok(Self {
            symbol: Symbol::parse(&msg.symbol)?,
            price: msg.price,
            size: msg.size,
            side: msg
                .taker_side
                .as_deref()
                .map_or(TakerSide::Unknown, TakerSide::from_flag),
            trade_id: msg.trade_id,
            timestamp: msg.timestamp,
        })
    }
}

/// Top-of-book quote.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "T": "q",
///   "S": "ETH/USD",
///   "bp": 3200.1,
///   "bs": 4.2,
///   "ap": 3200.6,
///   "as": 1.75,
///   "t": "2025-01-01T00:00:00Z"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuoteMessage {
    /// Pair.
    #[serde(rename = "S", alias = "symbol")]
    pub symbol: String,

    /// Bid price.
    #[serde(rename = "bp", alias = "bid_price", alias = "bidPrice")]
    pub bid_price: Decimal,

    /// Bid size.
    #[serde(rename = "bs", alias = "bid_size", alias = "bidSize")]
    pub bid_size: Decimal,

    /// Ask price.
    #[serde(rename = "ap", alias = "ask_price", alias = "askPrice")]
    pub ask_price: Decimal,

    /// Ask size.
    #[serde(rename = "as", alias = "ask_size", alias = "askSize")]
    pub ask_size: Decimal,

    /// Timestamp.
    #[serde(rename = "t", alias = "ts", alias = "timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl TryFrom<QuoteMessage> for QuoteEvent {
    type Error = SymbolError;

    fn try_from(msg: QuoteMessage) -> Result<Self, Self::Error> {
        Ok(Self {
            symbol: Symbol::parse(&msg.symbol)?,
            bid_price: msg.bid_price,
            bid_size: msg.bid_size,
            ask_price: msg.ask_price,
            ask_size: msg.ask_size,
            timestamp: msg.timestamp,
        })
    }
}

/// OHLCV bar. The discriminator decides the [`BarKind`].
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "T": "b",
///   "S": "BTC/USD",
///   "o": 64200, "h": 64300, "l": 64150, "c": 64250.5,
///   "v": 12.5, "n": 231, "vw": 64240.1,
///   "t": "2025-01-01T00:01:00Z"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BarMessage {
    /// Pair.
    #[serde(rename = "S", alias = "symbol")]
    pub symbol: String,

    /// Open.
    #[serde(rename = "o", alias = "open")]
    pub open: Decimal,

    /// High.
    #[serde(rename = "h", alias = "high")]
    pub high: Decimal,

    /// Low.
    #[serde(rename = "l", alias = "low")]
    pub low: Decimal,

    /// Close.
    #[serde(rename = "c", alias = "close")]
    pub close: Decimal,

    /// Volume.
    #[serde(rename = "v", alias = "volume")]
    pub volume: Decimal,

    /// Trade count.
    #[serde(rename = "n", alias = "trade_count", default)]
    pub trade_count: Option<u64>,

    /// VWAP.
    #[serde(rename = "vw", alias = "vwap", default)]
    pub vwap: Option<Decimal>,

    /// Start of the bar period.
    #[serde(rename = "t", alias = "ts", alias = "timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl BarMessage {
    /// Convert into a domain bar of the given kind.
    ///
    /// # Errors
    ///
    /// Returns [`SymbolError`] if the symbol is malformed.
    pub fn into_event(self, kind: BarKind) -> Result<BarEvent, SymbolError> {
        Ok(BarEvent {
            symbol: Symbol::parse(&self.symbol)?,
            kind,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            vwap: self.vwap,
            trade_count: self.trade_count,
            timestamp: self.timestamp,
        })
    }
}

/// One order book level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LevelMessage {
    /// Price.
    #[serde(rename = "p", alias = "price")]
    pub price: Decimal,

    /// Size.
    #[serde(rename = "s", alias = "size")]
    pub size: Decimal,
}

/// Order book update.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "T": "o",
///   "S": "BTC/USD",
///   "t": "2025-01-01T00:00:00Z",
///   "b": [{"p": 64250.1, "s": 0.5}],
///   "a": [{"p": 64251.0, "s": 0.2}],
///   "r": true
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrderBookMessage {
    /// Pair.
    #[serde(rename = "S", alias = "symbol")]
    pub symbol: String,

    /// Timestamp.
    #[serde(rename = "t", alias = "ts", alias = "timestamp")]
    pub timestamp: DateTime<Utc>,

    /// Bid levels.
    #[serde(rename = "b", alias = "bids", default)]
    pub bids: Vec<LevelMessage>,

    /// Ask levels.
    #[serde(rename = "a", alias = "asks", default)]
    pub asks: Vec<LevelMessage>,

    /// Full snapshot flag.
    #[serde(rename = "r", alias = "reset", default)]
    pub reset: bool,
}

impl TryFrom<OrderBookMessage> for OrderBookEvent {
    type Error = SymbolError;

    fn try_from(msg: OrderBookMessage) -> Result<Self, Self::Error> {
        let levels = |levels: Vec<LevelMessage>| {
            levels
                .into_iter()
                .map(|l| PriceLevel {
                    price: l.price,
                    size: l.size,
                })
                .collect()
        };

        Ok(Self {
            symbol: Symbol::parse(&msg.symbol)?,
            bids: levels(msg.bids),
            asks: levels(msg.asks),
            reset: msg.reset,
            timestamp: msg.timestamp,
        })
    }
}
