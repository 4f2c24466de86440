#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Crypto Stream - Alpaca Crypto Market Data Client
//!
//! Maintains one persistent WebSocket connection to Alpaca's crypto market
//! data feed, authenticates through handshake headers, keeps the desired
//! set of `(pair, stream)` subscriptions in sync with the server, and
//! routes decoded trades, quotes, bars and order books to registered
//! handlers. Dropped connections are re-established with exponential
//! backoff and the full desired set is re-sent on every new session.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types with no I/O
//!   - `market`: pair symbols, stream kinds, market events
//!   - `subscription`: desired/requested/acknowledged sets, control messages
//!   - `connection`: connection lifecycle states
//!
//! - **Application**: Ports and services
//!   - `ports`: transport and handler contracts
//!   - `services`: handler registry, message dispatcher, latest prices
//!
//! - **Infrastructure**: Adapters
//!   - `alpaca`: wire codec, authenticator, WebSocket transport, supervisor
//!   - `config`: environment settings and credential providers
//!   - `health`: health, readiness and metrics HTTP endpoint
//!   - `metrics`: Prometheus recorder
//!   - `presentation`: log-rendering handler
//!   - `telemetry`: tracing subscriber and OTLP export
//!
//! # Data Flow
//!
//! ```text
//!                 ┌─────────────┐   frames   ┌───────┐   messages   ┌────────────┐
//! Alpaca WS ◄────►│  Transport  │───────────►│ Codec │─────────────►│ Dispatcher │──► Handlers
//!                 └─────────────┘            └───────┘              └────────────┘
//!                        ▲                                                │ acks
//!                        │ control messages  ┌──────────────┐             ▼
//!                        └───────────────────│  Supervisor  │◄──── Subscription Manager
//!                                            └──────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Market data and subscription types with no I/O.
pub mod domain;

/// Application layer - Ports and message routing.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::ConnectionState;
pub use domain::market::{
    BarEvent, BarKind, EventKind, MarketEvent, OrderBookEvent, PriceLevel, QuoteEvent, StreamKind,
    Symbol, SymbolError, TakerSide, TradeEvent,
};
pub use domain::subscription::{
    ControlAction, ControlMessage, Subscription, SubscriptionDelta, SubscriptionManager,
    SubscriptionSet, SubscriptionStats, build_control_messages, diff, expand,
};

// Ports and services
pub use application::ports::{
    Connection, FeedErrorHandler, Frame, HandlerError, MarketEventHandler, Transport,
    TransportError,
};
pub use application::services::{
    Delivery, Dispatcher, FeedError, FeedErrorKind, HandlerRegistry, LatestPrices, PriceBook,
};

// Stream client
pub use infrastructure::alpaca::{
    AuthError, CredentialError, Credentials, DEFAULT_ENDPOINT, HeartbeatConfig,
    HeartbeatConfigError, ReconnectConfig, StreamClient, StreamClientConfig, StreamClientError,
    StreamEvent, WsTransport,
};

// Configuration
pub use infrastructure::config::{
    ConfigError, CredentialProvider, DotenvCredentialProvider, EnvCredentialProvider,
    StreamSettings,
};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::{MetricsHandler, init_metrics};

// Presentation
pub use infrastructure::presentation::LoggingHandler;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
