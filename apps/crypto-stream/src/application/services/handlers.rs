//! Handler Registry
//!
//! Typed handlers keyed by event variant, invoked synchronously in
//! registration order. A handler that returns an error or panics is logged
//! and skipped; the remaining handlers still see the event.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::application::ports::{FeedErrorHandler, HandlerError, MarketEventHandler};
use crate::application::services::FeedError;
use crate::domain::market::{
    BarEvent, EventKind, MarketEvent, OrderBookEvent, QuoteEvent, TradeEvent,
};

/// Adapts a closure over `&MarketEvent` into a [`MarketEventHandler`].
struct FnHandler<F>(F);

impl<F> MarketEventHandler for FnHandler<F>
where
    F: Fn(&MarketEvent) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, event: &MarketEvent) -> Result<(), HandlerError> {
        (self.0)(event)
    }
}

const fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&MarketEvent) -> Result<(), HandlerError> + Send + Sync,
{
    FnHandler(f)
}

struct FnErrorHandler<F>(F);

impl<F> FeedErrorHandler for FnErrorHandler<F>
where
    F: Fn(&FeedError) + Send + Sync,
{
    fn on_feed_error(&self, error: &FeedError) {
        (self.0)(error);
    }
}

struct Registration {
    name: String,
    filter: Option<EventKind>,
    handler: Arc<dyn MarketEventHandler>,
}

impl Registration {
    fn accepts(&self, kind: EventKind) -> bool {
        self.filter.is_none_or(|filter| filter == kind)
    }
}

/// Outcome of delivering one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Handlers that completed successfully.
    pub delivered: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

/// Registry of market event and feed error handlers.
///
/// # Example
///
/// ```rust
/// use crypto_stream::application::services::HandlerRegistry;
///
/// let registry = HandlerRegistry::new()
///     .on_trade("printer", |trade| {
///         println!("{} {} @ {}", trade.symbol, trade.size, trade.price);
///         Ok(())
///     })
///     .on_feed_error("alerts", |err| eprintln!("feed error {}: {}", err.code, err.message));
///
/// assert_eq!(registry.len(), 1);
/// ```
#[derive(Default)]
pub struct HandlerRegistry {
    market: Vec<Registration>,
    feed_errors: Vec<(String, Arc<dyn FeedErrorHandler>)>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("market", &self.handler_names())
            .field(
                "feed_errors",
                &self.feed_errors.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for every market event.
    #[must_use]
    pub fn register(mut self, name: impl Into<String>, handler: Arc<dyn MarketEventHandler>) -> Self {
        self.market.push(Registration {
            name: name.into(),
            filter: None,
            handler,
        });
        self
    }

    /// Register a handler for one event variant only.
    #[must_use]
    pub fn register_for(
        mut self,
        name: impl Into<String>,
        kind: EventKind,
        handler: Arc<dyn MarketEventHandler>,
    ) -> Self {
        self.market.push(Registration {
            name: name.into(),
            filter: Some(kind),
            handler,
        });
        self
    }

    /// Register a closure for every market event.
    #[must_use]
    pub fn on_event<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&MarketEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(handler_fn(f)))
    }

    /// Register a closure for trades.
    #[must_use]
    pub fn on_trade<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&TradeEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let handler = handler_fn(move |event| match event {
            MarketEvent::Trade(trade) => f(trade),
            _ => Ok(()),
        });
        self.register_for(name, EventKind::Trade, Arc::new(handler))
    }

    /// Register a closure for quotes.
    #[must_use]
    pub fn on_quote<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&QuoteEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let handler = handler_fn(move |event| match event {
            MarketEvent::Quote(quote) => f(quote),
            _ => Ok(()),
        });
        self.register_for(name, EventKind::Quote, Arc::new(handler))
    }

    /// Register a closure for bars of any period.
    #[must_use]
    pub fn on_bar<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&BarEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let handler = handler_fn(move |event| match event {
            MarketEvent::Bar(bar) => f(bar),
            _ => Ok(()),
        });
        self.register_for(name, EventKind::Bar, Arc::new(handler))
    }

    /// Register a closure for order book updates.
    #[must_use]
    pub fn on_order_book<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&OrderBookEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let handler = handler_fn(move |event| match event {
            MarketEvent::OrderBook(book) => f(book),
            _ => Ok(()),
        });
        self.register_for(name, EventKind::OrderBook, Arc::new(handler))
    }

    /// Register a feed error handler.
    #[must_use]
    pub fn register_feed_error_handler(
        mut self,
        name: impl Into<String>,
        handler: Arc<dyn FeedErrorHandler>,
    ) -> Self {
        self.feed_errors.push((name.into(), handler));
        self
    }

    /// Register a closure for feed errors.
    #[must_use]
    pub fn on_feed_error<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&FeedError) + Send + Sync + 'static,
    {
        self.register_feed_error_handler(name, Arc::new(FnErrorHandler(f)))
    }

    /// Number of market event handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.market.len()
    }

    /// Check if no market event handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.market.is_empty()
    }

    /// Names of market event handlers in invocation order.
    #[must_use]
    pub fn handler_names(&self) -> Vec<&str> {
        self.market.iter().map(|r| r.name.as_str()).collect()
    }

    /// Deliver an event to every matching handler, in registration order.
    pub fn deliver(&self, event: &MarketEvent) -> Delivery {
        let kind = event.kind();
        let mut delivery = Delivery::default();

        for registration in self.market.iter().filter(|r| r.accepts(kind)) {
            match catch_unwind(AssertUnwindSafe(|| registration.handler.handle(event))) {
                Ok(Ok(())) => delivery.delivered += 1,
                Ok(Err(e)) => {
                    delivery.failed += 1;
                    tracing::warn!(
                        handler = %registration.name,
                        event = kind.as_str(),
                        symbol = %event.symbol(),
                        error = %e,
                        "Handler failed"
                    );
                }
                Err(_) => {
                    delivery.failed += 1;
                    tracing::error!(
                        handler = %registration.name,
                        event = kind.as_str(),
                        symbol = %event.symbol(),
                        "Handler panicked"
                    );
                }
            }
        }

        delivery
    }

    /// Pass a feed error to every feed error handler.
    pub fn report_feed_error(&self, error: &FeedError) {
        for (name, handler) in &self.feed_errors {
            if catch_unwind(AssertUnwindSafe(|| handler.on_feed_error(error))).is_err() {
                tracing::error!(handler = %name, code = error.code, "Feed error handler panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::{DateTime, Utc};
    use mockall::predicate::always;
    use rust_decimal::Decimal;

    use super::*;
    use crate::application::ports::MockMarketEventHandler;
    use crate::domain::market::{Symbol, TakerSide};

    fn trade() -> MarketEvent {
        MarketEvent::Trade(TradeEvent {
            symbol: Symbol::parse("ETH/USD").unwrap(),
            price: Decimal::new(320_050, 2),
            size: Decimal::new(15, 1),
            side: TakerSide::Sell,
            trade_id: None,
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
        })
    }

    fn quote() -> MarketEvent {
        MarketEvent::Quote(QuoteEvent {
            symbol: Symbol::parse("BTC/USD").unwrap(),
            bid_price: Decimal::ONE,
            bid_size: Decimal::ONE,
            ask_price: Decimal::TWO,
            ask_size: Decimal::ONE,
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
        })
    }

    #[test]
    fn delivers_to_every_handler_once() {
        let mut first = MockMarketEventHandler::new();
        first.expect_handle().with(always()).times(1).returning(|_| Ok(()));
        let mut second = MockMarketEventHandler::new();
        second.expect_handle().times(1).returning(|_| Ok(()));

        let registry = HandlerRegistry::new()
            .register("first", Arc::new(first))
            .register("second", Arc::new(second));

        let delivery = registry.deliver(&trade());
        assert_eq!(delivery, Delivery { delivered: 2, failed: 0 });
    }

    #[test]
    fn failing_handler_does_not_block_others() {
        let mut failing = MockMarketEventHandler::new();
        failing
            .expect_handle()
            .times(1)
            .returning(|_| Err(HandlerError::new("boom")));
        let mut healthy = MockMarketEventHandler::new();
        healthy.expect_handle().times(1).returning(|_| Ok(()));

        let registry = HandlerRegistry::new()
            .register("failing", Arc::new(failing))
            .register("healthy", Arc::new(healthy));

        let delivery = registry.deliver(&trade());
        assert_eq!(delivery, Delivery { delivered: 1, failed: 1 });
    }

    #[test]
    fn panicking_handler_is_isolated() {
        let seen = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&seen);

        let registry = HandlerRegistry::new()
            .on_event("panics", |_| panic!("handler bug"))
            .on_event("counts", move |_| {
                *counter.lock().unwrap() += 1;
                Ok(())
            });

        let delivery = registry.deliver(&trade());
        assert_eq!(delivery, Delivery { delivered: 1, failed: 1 });
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn typed_handlers_only_see_their_variant() {
        let trades = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&trades);

        let registry = HandlerRegistry::new().on_trade("trades", move |t| {
            sink.lock().unwrap().push(t.symbol.to_string());
            Ok(())
        });

        assert_eq!(registry.deliver(&quote()), Delivery::default());
        assert_eq!(registry.deliver(&trade()).delivered, 1);
        assert_eq!(*trades.lock().unwrap(), vec!["ETH/USD".to_string()]);
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let a = Arc::clone(&order);
        let b = Arc::clone(&order);

        let registry = HandlerRegistry::new()
            .on_event("a", move |_| {
                a.lock().unwrap().push("a");
                Ok(())
            })
            .on_trade("b", move |_| {
                b.lock().unwrap().push("b");
                Ok(())
            });

        registry.deliver(&trade());
        assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(registry.handler_names(), vec!["a", "b"]);
    }

    #[test]
    fn feed_errors_reach_error_handlers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let registry = HandlerRegistry::new()
            .on_feed_error("errors", move |e| sink.lock().unwrap().push(e.code));

        registry.report_feed_error(&FeedError::new(405, "symbol limit exceeded"));
        assert_eq!(*seen.lock().unwrap(), vec![405]);
    }
}
