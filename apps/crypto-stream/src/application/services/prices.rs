//! Latest Prices
//!
//! Last known price per pair, fed from the event stream:
//!
//! | Event | Price |
//! |-------|-------|
//! | Trade | trade price |
//! | Quote | bid/ask midpoint, only when both sides are quoted |
//! | Bar   | close |
//!
//! Order book updates carry no single price and are skipped.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::application::ports::{HandlerError, MarketEventHandler};
use crate::domain::market::{MarketEvent, Symbol};

/// Snapshot of tracked prices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriceBook {
    /// Latest price by pair.
    pub prices: BTreeMap<Symbol, Decimal>,
    /// Events that moved a price since the tracker was created.
    pub updates: u64,
}

/// Market event handler that remembers the latest price of every pair.
///
/// Shared between the connection task, which writes, and any number of
/// readers.
#[derive(Debug, Default)]
pub struct LatestPrices {
    book: RwLock<PriceBook>,
}

impl LatestPrices {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest price for `symbol`, if one has been seen.
    #[must_use]
    pub fn latest(&self, symbol: &Symbol) -> Option<Decimal> {
        self.book.read().prices.get(symbol).copied()
    }

    /// Copy of every tracked price and the update count.
    #[must_use]
    pub fn snapshot(&self) -> PriceBook {
        self.book.read().clone()
    }

    /// Number of price updates recorded.
    #[must_use]
    pub fn update_count(&self) -> u64 {
        self.book.read().updates
    }
}

impl MarketEventHandler for LatestPrices {
    fn handle(&self, event: &MarketEvent) -> Result<(), HandlerError> {
        if let Some((symbol, price)) = price_of(event) {
            let mut book = self.book.write();
            book.prices.insert(symbol.clone(), price);
            book.updates += 1;
        }
        Ok(())
    }
}

fn price_of(event: &MarketEvent) -> Option<(&Symbol, Decimal)> {
    match event {
        MarketEvent::Trade(trade) => Some((&trade.symbol, trade.price)),
        MarketEvent::Quote(quote)
            if quote.bid_price > Decimal::ZERO && quote.ask_price > Decimal::ZERO =>
        {
            Some((&quote.symbol, quote.mid_price()))
        }
        MarketEvent::Bar(bar) => Some((&bar.symbol, bar.close)),
        MarketEvent::Quote(_) | MarketEvent::OrderBook(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::domain::market::{
        BarEvent, BarKind, OrderBookEvent, PriceLevel, QuoteEvent, TakerSide, TradeEvent,
    };

    fn sym(s: &str) -> Symbol {
        Symbol::parse(s).unwrap()
    }

    fn trade(symbol: &str, price: Decimal) -> MarketEvent {
        MarketEvent::Trade(TradeEvent {
            symbol: sym(symbol),
            price,
            size: Decimal::ONE,
            side: TakerSide::Buy,
            trade_id: None,
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
        })
    }

    fn quote(bid: Decimal, ask: Decimal) -> MarketEvent {
        MarketEvent::Quote(QuoteEvent {
            symbol: sym("ETH/USD"),
            bid_price: bid,
            bid_size: Decimal::ONE,
            ask_price: ask,
            ask_size: Decimal::ONE,
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
        })
    }

    #[test]
    fn trade_sets_price() {
        let prices = LatestPrices::new();
        prices.handle(&trade("BTC/USD", Decimal::new(6_500_050, 2))).unwrap();
        prices.handle(&trade("BTC/USD", Decimal::new(6_500_100, 2))).unwrap();

        assert_eq!(prices.latest(&sym("BTC/USD")), Some(Decimal::new(6_500_100, 2)));
        assert_eq!(prices.update_count(), 2);
    }

    #[test]
    fn quote_uses_midpoint() {
        let prices = LatestPrices::new();
        prices
            .handle(&quote(Decimal::new(3200, 0), Decimal::new(3201, 0)))
            .unwrap();

        assert_eq!(prices.latest(&sym("ETH/USD")), Some(Decimal::new(32_005, 1)));
    }

    #[test]
    fn one_sided_quote_is_ignored() {
        let prices = LatestPrices::new();
        prices.handle(&quote(Decimal::ZERO, Decimal::new(3201, 0))).unwrap();

        assert_eq!(prices.latest(&sym("ETH/USD")), None);
        assert_eq!(prices.update_count(), 0);
    }

    #[test]
    fn bar_uses_close() {
        let prices = LatestPrices::new();
        prices
            .handle(&MarketEvent::Bar(BarEvent {
                symbol: sym("SOL/USD"),
                kind: BarKind::Minute,
                open: Decimal::new(150, 0),
                high: Decimal::new(155, 0),
                low: Decimal::new(149, 0),
                close: Decimal::new(1525, 1),
                volume: Decimal::TEN,
                vwap: None,
                trade_count: None,
                timestamp: DateTime::<Utc>::UNIX_EPOCH,
            }))
            .unwrap();

        assert_eq!(prices.latest(&sym("SOL/USD")), Some(Decimal::new(1525, 1)));
    }

    #[test]
    fn order_book_is_ignored() {
        let prices = LatestPrices::new();
        prices
            .handle(&MarketEvent::OrderBook(OrderBookEvent {
                symbol: sym("BTC/USD"),
                bids: vec![PriceLevel {
                    price: Decimal::new(65_000, 0),
                    size: Decimal::ONE,
                }],
                asks: Vec::new(),
                reset: true,
                timestamp: DateTime::<Utc>::UNIX_EPOCH,
            }))
            .unwrap();

        assert_eq!(prices.snapshot(), PriceBook::default());
    }

    #[test]
    fn snapshot_lists_pairs_in_order() {
        let prices = LatestPrices::new();
        prices.handle(&trade("ETH/USD", Decimal::new(3200, 0))).unwrap();
        prices.handle(&trade("BTC/USD", Decimal::new(65_000, 0))).unwrap();

        let book = prices.snapshot();
        let pairs: Vec<_> = book.prices.keys().map(Symbol::as_str).collect();
        assert_eq!(pairs, vec!["BTC/USD", "ETH/USD"]);
        assert_eq!(book.updates, 2);
    }
}
