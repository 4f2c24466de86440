//! Prometheus Metrics Module
//!
//! Exposes stream client metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Events**: Market events delivered, by kind
//! - **Errors**: Decode failures, handler failures, feed errors by code
//! - **Connection**: State gauge, reconnects, control messages sent
//! - **Subscriptions**: Desired and acknowledged pair counts
//! - **Latency**: Exchange timestamp to local delivery
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;

use chrono::Utc;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::application::ports::{HandlerError, MarketEventHandler};
use crate::domain::connection::ConnectionState;
use crate::domain::market::{EventKind, MarketEvent};
use crate::domain::subscription::{ControlAction, SubscriptionStats};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Repeated calls return the handle installed by the first call.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "crypto_stream_events_total",
        "Market events decoded and dispatched, by kind"
    );
    describe_counter!(
        "crypto_stream_decode_errors_total",
        "Frames or frame elements that could not be decoded"
    );
    describe_counter!(
        "crypto_stream_handler_failures_total",
        "Handler invocations that returned an error or panicked"
    );
    describe_counter!(
        "crypto_stream_feed_errors_total",
        "Error frames received from the feed, by code"
    );

    describe_gauge!(
        "crypto_stream_connection_state",
        "Connection state code (0=disconnected .. 6=closed)"
    );
    describe_counter!(
        "crypto_stream_reconnects_total",
        "Reconnection attempts scheduled"
    );
    describe_counter!(
        "crypto_stream_control_messages_total",
        "Subscribe and unsubscribe messages sent, by action"
    );

    describe_gauge!(
        "crypto_stream_subscriptions_desired",
        "Desired (symbol, stream) pairs"
    );
    describe_gauge!(
        "crypto_stream_subscriptions_acknowledged",
        "(symbol, stream) pairs confirmed by the feed"
    );

    describe_histogram!(
        "crypto_stream_event_latency_seconds",
        "Time from exchange timestamp to local dispatch"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a market event dispatched to handlers.
pub fn record_event(kind: EventKind) {
    counter!("crypto_stream_events_total", "kind" => kind.as_str()).increment(1);
}

/// Record elements that failed to decode.
pub fn record_decode_errors(count: u64) {
    counter!("crypto_stream_decode_errors_total").increment(count);
}

/// Record failed handler invocations.
pub fn record_handler_failures(count: u64) {
    counter!("crypto_stream_handler_failures_total").increment(count);
}

/// Record an error frame from the feed.
pub fn record_feed_error(code: i32) {
    counter!("crypto_stream_feed_errors_total", "code" => code.to_string()).increment(1);
}

/// Update the connection state gauge.
pub fn set_connection_state(state: ConnectionState) {
    gauge!("crypto_stream_connection_state").set(f64::from(state.code()));
}

/// Record a scheduled reconnection attempt.
pub fn record_reconnect() {
    counter!("crypto_stream_reconnects_total").increment(1);
}

/// Record a control message sent to the feed.
pub fn record_control_message(action: ControlAction) {
    counter!("crypto_stream_control_messages_total", "action" => action.as_str()).increment(1);
}

/// Update subscription gauges.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscriptions(stats: &SubscriptionStats) {
    gauge!("crypto_stream_subscriptions_desired").set(stats.desired as f64);
    gauge!("crypto_stream_subscriptions_acknowledged").set(stats.acknowledged as f64);
}

// =============================================================================
// Metrics Handler
// =============================================================================

/// Handler that counts events and records delivery latency.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsHandler;

impl MarketEventHandler for MetricsHandler {
    fn handle(&self, event: &MarketEvent) -> Result<(), HandlerError> {
        let kind = event.kind();
        record_event(kind);

        if let Ok(latency) = (Utc::now() - event.timestamp()).to_std() {
            histogram!("crypto_stream_event_latency_seconds", "kind" => kind.as_str())
                .record(latency.as_secs_f64());
        }

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
