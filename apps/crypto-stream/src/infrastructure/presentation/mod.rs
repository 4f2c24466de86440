//! Presentation Handlers
//!
//! Market event handlers that render events for an operator: one
//! structured log line per trade, quote, bar or order book update.

use crate::application::ports::{FeedErrorHandler, HandlerError, MarketEventHandler};
use crate::application::services::FeedError;
use crate::domain::market::MarketEvent;

/// Logs every market event at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl MarketEventHandler for LoggingHandler {
    fn handle(&self, event: &MarketEvent) -> Result<(), HandlerError> {
        match event {
            MarketEvent::Trade(trade) => tracing::info!(
                symbol = %trade.symbol,
                price = %trade.price,
                size = %trade.size,
                side = trade.side.as_str(),
                ts = %trade.timestamp,
                "trade"
            ),
            MarketEvent::Quote(quote) => tracing::info!(
                symbol = %quote.symbol,
                bid = %quote.bid_price,
                bid_size = %quote.bid_size,
                ask = %quote.ask_price,
                ask_size = %quote.ask_size,
                spread = %quote.spread(),
                ts = %quote.timestamp,
                "quote"
            ),
            MarketEvent::Bar(bar) => tracing::info!(
                symbol = %bar.symbol,
                kind = bar.kind.as_str(),
                open = %bar.open,
                high = %bar.high,
                low = %bar.low,
                close = %bar.close,
                volume = %bar.volume,
                vwap = ?bar.vwap,
                ts = %bar.timestamp,
                "bar"
            ),
            MarketEvent::OrderBook(book) => tracing::info!(
                symbol = %book.symbol,
                best_bid = ?book.bids.first().map(|l| l.price),
                best_ask = ?book.asks.first().map(|l| l.price),
                levels = book.bids.len() + book.asks.len(),
                reset = book.reset,
                "orderbook"
            ),
        }
        Ok(())
    }
}

impl FeedErrorHandler for LoggingHandler {
    fn on_feed_error(&self, error: &FeedError) {
        tracing::error!(
            code = error.code,
            kind = error.kind().as_str(),
            msg = %error.message,
            "feed error"
        );
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::market::{OrderBookEvent, PriceLevel, QuoteEvent, Symbol};

    fn btc() -> Symbol {
        Symbol::parse("BTC/USD").unwrap()
    }

    #[test]
    fn logs_quotes_without_failing() {
        let event = MarketEvent::Quote(QuoteEvent {
            symbol: btc(),
            bid_price: Decimal::new(6_500_000, 2),
            bid_size: Decimal::ONE,
            ask_price: Decimal::new(6_500_100, 2),
            ask_size: Decimal::TWO,
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
        });

        assert!(LoggingHandler.handle(&event).is_ok());
    }

    #[test]
    fn logs_empty_order_book() {
        let event = MarketEvent::OrderBook(OrderBookEvent {
            symbol: btc(),
            bids: Vec::new(),
            asks: vec![PriceLevel {
                price: Decimal::new(65_001, 0),
                size: Decimal::ONE,
            }],
            reset: true,
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
        });

        assert!(LoggingHandler.handle(&event).is_ok());
    }
}
