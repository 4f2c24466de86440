//! Connection Supervisor
//!
//! Owns the crypto stream connection lifecycle:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Authenticated -> Subscribed
//!                     |                            |              |
//!                     v                            v              v
//!               Disconnected <---------------- (auth error)  Reconnecting
//!                     |                                           |
//!                     +------------- backoff ------------> Connecting
//!
//! any state -> Closed (stop)
//! ```
//!
//! A single task runs the receive loop, the heartbeat, subscription
//! reconciliation and the reconnect loop. Callers interact through
//! [`StreamClient`], which only touches the shared [`SubscriptionManager`]
//! and wakes the task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::auth::{AuthError, Authenticator, CredentialError, Credentials};
use super::codec::JsonCodec;
use super::heartbeat::{HeartbeatConfig, HeartbeatConfigError, Liveness};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{AuthHeaders, Connection, Frame, Transport, TransportError};
use crate::application::services::{ControlNotice, Dispatcher, FeedError, HandlerRegistry, Routed};
use crate::domain::connection::ConnectionState;
use crate::domain::subscription::{
    ControlAction, Subscription, SubscriptionManager, build_control_messages,
};
use crate::infrastructure::metrics;

/// Default crypto stream endpoint.
pub const DEFAULT_ENDPOINT: &str = "wss://stream.data.alpaca.markets/v1beta3/crypto/us";

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end the stream client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamClientError {
    /// Credentials cannot be presented to the feed.
    #[error("invalid credentials: {0}")]
    Credential(#[from] CredentialError),

    /// Heartbeat timings are unusable.
    #[error("invalid heartbeat configuration: {0}")]
    Heartbeat(#[from] HeartbeatConfigError),

    /// Authentication kept failing.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(AuthError),

    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts ({0}) exceeded")]
    MaxReconnectAttemptsExceeded(u32),

    /// The client has already stopped.
    #[error("stream client has stopped")]
    Stopped,

    /// Supervisor task panicked or was aborted.
    #[error("supervisor task failed: {0}")]
    TaskFailed(String),
}

// =============================================================================
// Status Events
// =============================================================================

/// Status updates published on the client's broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Connection state changed.
    StateChanged {
        /// Previous state.
        from: ConnectionState,
        /// New state.
        to: ConnectionState,
    },
    /// Socket opened and session started.
    Connected {
        /// Identifier of the session, also attached to its log span.
        session_id: Uuid,
    },
    /// A connection attempt failed.
    ConnectFailed {
        /// Transport failure.
        error: TransportError,
    },
    /// An established session ended.
    Disconnected {
        /// Why the session ended.
        reason: String,
    },
    /// Waiting before the next connection attempt.
    Backoff {
        /// Consecutive attempt number.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
    /// Control message written to the feed.
    ControlSent {
        /// Subscribe or unsubscribe.
        action: ControlAction,
        /// Number of `(symbol, stream)` pairs in the message.
        pairs: usize,
    },
    /// Feed confirmed its active subscriptions.
    SubscriptionAcknowledged {
        /// Pairs the feed reports as active.
        acknowledged: usize,
        /// Pairs still differing from the desired set.
        outstanding: usize,
    },
    /// Error frame received from the feed.
    FeedError(FeedError),
    /// Credentials were rejected.
    AuthRejected(AuthError),
    /// The client gave up.
    Fatal(StreamClientError),
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the stream client.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamClientConfig {
    /// WebSocket URL.
    pub endpoint: String,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Heartbeat configuration.
    pub heartbeat: HeartbeatConfig,
    /// Consecutive authentication rejections before giving up (0 = never).
    pub max_auth_failures: u32,
    /// Capacity of the status broadcast channel.
    pub status_capacity: usize,
}

impl Default for StreamClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

impl StreamClientConfig {
    /// Create a configuration for an endpoint with default policies.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            max_auth_failures: 3,
            status_capacity: 256,
        }
    }

    /// Build from stream settings.
    #[must_use]
    pub fn from_settings(settings: &crate::StreamSettings) -> Self {
        Self {
            endpoint: settings.ws_url.clone(),
            reconnect: ReconnectConfig::from_settings(settings),
            heartbeat: HeartbeatConfig::from_settings(settings),
            max_auth_failures: settings.max_auth_failures,
            status_capacity: 256,
        }
    }
}

// =============================================================================
// Stream Client
// =============================================================================

/// Handle to a running crypto stream.
///
/// # Example
///
/// ```rust,no_run
/// use crypto_stream::application::services::HandlerRegistry;
/// use crypto_stream::domain::market::{StreamKind, Symbol};
/// use crypto_stream::domain::subscription::expand;
/// use crypto_stream::infrastructure::alpaca::{
///     Credentials, StreamClient, StreamClientConfig, WsTransport,
/// };
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let btc = Symbol::parse("BTC/USD")?;
/// let registry = HandlerRegistry::new()
///     .on_trade("print", |trade| {
///         println!("{} {}", trade.symbol, trade.price);
///         Ok(())
///     });
///
/// let client = StreamClient::start(
///     StreamClientConfig::default(),
///     WsTransport::default(),
///     Credentials::new("key", "secret")?,
///     expand([&btc], &[StreamKind::Trade, StreamKind::Quote]),
///     registry,
/// )?;
///
/// client.update_subscriptions([], expand([&btc], &[StreamKind::Quote]))?;
/// client.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct StreamClient {
    cancel: CancellationToken,
    task: JoinHandle<Result<(), StreamClientError>>,
    subscriptions: Arc<SubscriptionManager>,
    notify: Arc<Notify>,
    state_rx: watch::Receiver<ConnectionState>,
    status_tx: broadcast::Sender<StreamEvent>,
}

impl std::fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClient")
            .field("state", &*self.state_rx.borrow())
            .field("subscriptions", &self.subscriptions)
            .finish_non_exhaustive()
    }
}

impl StreamClient {
    /// Spawn the supervisor and begin connecting.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`StreamClientError::Heartbeat`] if the heartbeat timings are
    /// unusable, or [`StreamClientError::Credential`] if the credentials
    /// cannot be sent as handshake headers. Nothing is spawned in either case.
    pub fn start<T: Transport>(
        config: StreamClientConfig,
        transport: T,
        credentials: Credentials,
        initial: impl IntoIterator<Item = Subscription>,
        registry: HandlerRegistry,
    ) -> Result<Self, StreamClientError> {
        config.heartbeat.validate()?;
        let headers = Authenticator::headers(&credentials)?;

        let subscriptions = Arc::new(SubscriptionManager::with_desired(initial));
        let notify = Arc::new(Notify::new());
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (status_tx, _) = broadcast::channel(config.status_capacity.max(1));

        tracing::info!(
            endpoint = %config.endpoint,
            desired = subscriptions.stats().desired,
            handlers = registry.len(),
            "Starting crypto stream client"
        );

        let supervisor = Supervisor {
            policy: ReconnectPolicy::new(config.reconnect.clone()),
            config,
            transport,
            headers,
            dispatcher: Dispatcher::new(registry, Arc::clone(&subscriptions)),
            subscriptions: Arc::clone(&subscriptions),
            codec: JsonCodec::new(),
            notify: Arc::clone(&notify),
            cancel: cancel.clone(),
            state_tx,
            status_tx: status_tx.clone(),
            auth_failures: 0,
        };

        let task = tokio::spawn(supervisor.run());

        Ok(Self {
            cancel,
            task,
            subscriptions,
            notify,
            state_rx,
            status_tx,
        })
    }

    /// Change the desired subscription set.
    ///
    /// Removals are applied before additions. The supervisor sends the
    /// resulting delta immediately when connected, or on the next
    /// connection otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`StreamClientError::Stopped`] once the client has stopped.
    pub fn update_subscriptions(
        &self,
        add: impl IntoIterator<Item = Subscription>,
        remove: impl IntoIterator<Item = Subscription>,
    ) -> Result<(), StreamClientError> {
        if self.cancel.is_cancelled() || self.task.is_finished() {
            return Err(StreamClientError::Stopped);
        }

        let removed = self.subscriptions.forget_all(remove);
        let added = self.subscriptions.desire_all(add);
        tracing::debug!(added, removed, "Desired subscriptions updated");

        if added > 0 || removed > 0 {
            self.notify.notify_one();
        }
        Ok(())
    }

    /// Stop the stream and wait for the supervisor to close the transport.
    ///
    /// No handler is invoked after this returns.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the supervisor, if it had already
    /// failed, or [`StreamClientError::TaskFailed`] if it panicked.
    pub async fn stop(self) -> Result<(), StreamClientError> {
        tracing::info!("Stopping crypto stream client");
        self.cancel.cancel();
        self.task
            .await
            .map_err(|e| StreamClientError::TaskFailed(e.to_string()))?
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch channel following the connection state.
    #[must_use]
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Subscribe to status events.
    #[must_use]
    pub fn subscribe_status(&self) -> broadcast::Receiver<StreamEvent> {
        self.status_tx.subscribe()
    }

    /// Shared subscription state.
    #[must_use]
    pub const fn subscriptions(&self) -> &Arc<SubscriptionManager> {
        &self.subscriptions
    }

    /// Whether the supervisor task has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

// =============================================================================
// Supervisor
// =============================================================================

/// How a session ended.
enum SessionEnd {
    Stopped,
    Dropped(String),
    AuthRejected(AuthError),
}

struct Supervisor<T: Transport> {
    config: StreamClientConfig,
    transport: T,
    headers: AuthHeaders,
    dispatcher: Dispatcher,
    subscriptions: Arc<SubscriptionManager>,
    codec: JsonCodec,
    notify: Arc<Notify>,
    cancel: CancellationToken,
    state_tx: watch::Sender<ConnectionState>,
    status_tx: broadcast::Sender<StreamEvent>,
    policy: ReconnectPolicy,
    auth_failures: u32,
}

impl<T: Transport> Supervisor<T> {
    async fn run(mut self) -> Result<(), StreamClientError> {
        let result = self.connection_loop().await;

        match &result {
            Ok(()) => tracing::info!("Crypto stream client stopped"),
            Err(error) => {
                tracing::error!(%error, "Crypto stream client giving up");
                self.emit(StreamEvent::Fatal(error.clone()));
            }
        }
        self.set_state(ConnectionState::Closed);

        result
    }

    async fn connection_loop(&mut self) -> Result<(), StreamClientError> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            self.set_state(ConnectionState::Connecting);
            tracing::info!(endpoint = %self.config.endpoint, "Connecting to crypto stream");

            let opened = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Ok(()),
                opened = self.transport.open(&self.config.endpoint, &self.headers) => opened,
            };

            let mut conn = match opened {
                Ok(conn) => conn,
                Err(error) => {
                    tracing::warn!(%error, "Connection attempt failed");
                    self.set_state(ConnectionState::Disconnected);
                    self.emit(StreamEvent::ConnectFailed {
                        error: error.clone(),
                    });
                    if let TransportError::Unauthorized(status) = error {
                        self.record_auth_failure(AuthError::HandshakeRejected(status))?;
                    }
                    if !self.backoff().await? {
                        return Ok(());
                    }
                    continue;
                }
            };

            self.set_state(ConnectionState::Connected);
            // Credentials were accepted with the upgrade.
            self.set_state(ConnectionState::Authenticated);

            let session_id = Uuid::new_v4();
            self.emit(StreamEvent::Connected { session_id });
            let started = Instant::now();

            let end = self
                .run_session(&mut conn)
                .instrument(tracing::info_span!("session", %session_id))
                .await;

            if let Err(error) = conn.close().await {
                tracing::debug!(%error, "Error closing connection");
            }
            self.subscriptions.reset_acknowledged();
            metrics::set_subscriptions(&self.subscriptions.stats());

            match end {
                SessionEnd::Stopped => return Ok(()),
                SessionEnd::Dropped(reason) => {
                    let lifetime = started.elapsed();
                    tracing::warn!(
                        %session_id,
                        %reason,
                        lifetime_secs = lifetime.as_secs(),
                        "Crypto stream session dropped"
                    );
                    self.set_state(ConnectionState::Reconnecting);
                    self.emit(StreamEvent::Disconnected { reason });
                    if self.policy.reset_if_stable(lifetime) {
                        tracing::debug!("Session was stable, backoff reset");
                    }
                }
                SessionEnd::AuthRejected(error) => {
                    self.set_state(ConnectionState::Disconnected);
                    self.emit(StreamEvent::Disconnected {
                        reason: error.to_string(),
                    });
                    self.record_auth_failure(error)?;
                }
            }

            if !self.backoff().await? {
                return Ok(());
            }
        }
    }

    /// Wait out the next backoff delay.
    ///
    /// Returns `Ok(false)` when stopped during the wait.
    async fn backoff(&mut self) -> Result<bool, StreamClientError> {
        let Some(delay) = self.policy.next_delay() else {
            return Err(StreamClientError::MaxReconnectAttemptsExceeded(
                self.policy.max_attempts(),
            ));
        };
        let attempt = self.policy.attempt_count();

        tracing::info!(
            attempt,
            delay_ms = delay.as_millis(),
            "Reconnecting to crypto stream"
        );
        metrics::record_reconnect();
        self.emit(StreamEvent::Backoff { attempt, delay });

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                tracing::info!("Cancelled during reconnect delay");
                Ok(false)
            }
            () = tokio::time::sleep(delay) => Ok(true),
        }
    }

    fn record_auth_failure(&mut self, error: AuthError) -> Result<(), StreamClientError> {
        self.auth_failures += 1;
        tracing::error!(
            %error,
            failures = self.auth_failures,
            max = self.config.max_auth_failures,
            "Authentication rejected"
        );
        self.emit(StreamEvent::AuthRejected(error.clone()));

        if self.config.max_auth_failures > 0 && self.auth_failures >= self.config.max_auth_failures
        {
            return Err(StreamClientError::AuthenticationFailed(error));
        }
        Ok(())
    }

    async fn run_session(&mut self, conn: &mut T::Connection) -> SessionEnd {
        tracing::info!("Crypto stream session established");

        let heartbeat = self.config.heartbeat;
        let mut liveness = Liveness::new(heartbeat.silence_window);
        let mut ping =
            tokio::time::interval_at(Instant::now() + heartbeat.ping_interval, heartbeat.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if let Err(error) = self.reconcile(conn).await {
            return SessionEnd::Dropped(error.to_string());
        }

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return SessionEnd::Stopped,
                () = self.notify.notified() => {
                    if let Err(error) = self.reconcile(conn).await {
                        return SessionEnd::Dropped(error.to_string());
                    }
                }
                () = tokio::time::sleep_until(liveness.deadline()) => {
                    tracing::warn!(
                        silence_secs = liveness.silence().as_secs(),
                        "No frames received within silence window"
                    );
                    return SessionEnd::Dropped("silence window exceeded".to_string());
                }
                _ = ping.tick() => {
                    if let Err(error) = conn.ping().await {
                        return SessionEnd::Dropped(error.to_string());
                    }
                }
                frame = conn.receive() => match frame {
                    Ok(Frame::Text(text)) => {
                        liveness.touch();
                        if let Some(end) = self.handle_text(&text) {
                            return end;
                        }
                    }
                    Ok(Frame::Binary(data)) => {
                        liveness.touch();
                        tracing::debug!(len = data.len(), "Ignoring binary frame");
                    }
                    Ok(Frame::KeepAlive) => liveness.touch(),
                    Err(error) => return SessionEnd::Dropped(error.to_string()),
                },
            }
        }
    }

    /// Decode and route one text frame, in wire order.
    fn handle_text(&mut self, text: &str) -> Option<SessionEnd> {
        let frame = match self.codec.decode(text) {
            Ok(frame) => frame,
            Err(error) => {
                tracing::warn!(%error, "Discarding undecodable frame");
                metrics::record_decode_errors(1);
                return None;
            }
        };

        if !frame.rejected.is_empty() {
            for error in &frame.rejected {
                tracing::warn!(%error, "Skipping malformed message");
            }
            metrics::record_decode_errors(u64::try_from(frame.rejected.len()).unwrap_or(u64::MAX));
        }

        for message in frame.messages {
            if self.cancel.is_cancelled() {
                return Some(SessionEnd::Stopped);
            }

            match self.dispatcher.route(message) {
                Routed::Delivered(delivery) => {
                    if delivery.failed > 0 {
                        metrics::record_handler_failures(
                            u64::try_from(delivery.failed).unwrap_or(u64::MAX),
                        );
                    }
                }
                Routed::Acknowledged { outstanding } => {
                    let stats = self.subscriptions.stats();
                    metrics::set_subscriptions(&stats);
                    self.emit(StreamEvent::SubscriptionAcknowledged {
                        acknowledged: stats.acknowledged,
                        outstanding: outstanding.to_add.len() + outstanding.to_remove.len(),
                    });
                }
                Routed::FeedError(error) => {
                    metrics::record_feed_error(error.code);
                    let auth = Authenticator::classify(&error);
                    self.emit(StreamEvent::FeedError(error));
                    match auth {
                        Some(auth) if auth.is_credential_problem() => {
                            return Some(SessionEnd::AuthRejected(auth));
                        }
                        Some(auth) => tracing::error!(error = %auth, "Feed refused the session"),
                        None => {}
                    }
                }
                Routed::Notice(ControlNotice::Authenticated) => {
                    if self.auth_failures > 0 {
                        tracing::debug!(previous = self.auth_failures, "Auth failure count reset");
                    }
                    self.auth_failures = 0;
                }
                Routed::Notice(_) | Routed::Dropped(_) => {}
            }
        }

        None
    }

    /// Send whatever the feed has not been asked for yet on this connection.
    async fn reconcile(&mut self, conn: &mut T::Connection) -> Result<(), TransportError> {
        let delta = self.subscriptions.pending_delta();

        if !delta.is_empty() {
            for message in build_control_messages(&delta) {
                let pairs = message.pair_count();
                let json = message
                    .to_json()
                    .map_err(|e| TransportError::Send(e.to_string()))?;

                tracing::debug!(action = message.action.as_str(), pairs, "Sending control message");
                conn.send(json).await?;

                metrics::record_control_message(message.action);
                self.emit(StreamEvent::ControlSent {
                    action: message.action,
                    pairs,
                });
            }
            self.subscriptions.mark_requested(&delta);
        }

        let current = *self.state_tx.borrow();
        let wants_data = !self.subscriptions.is_empty();
        match current {
            ConnectionState::Authenticated if wants_data => {
                self.set_state(ConnectionState::Subscribed);
            }
            ConnectionState::Subscribed if !wants_data => {
                self.set_state(ConnectionState::Authenticated);
            }
            _ => {}
        }
        metrics::set_subscriptions(&self.subscriptions.stats());

        Ok(())
    }

    fn set_state(&self, next: ConnectionState) {
        let current = *self.state_tx.borrow();
        if current == next {
            return;
        }
        if !current.can_transition_to(next) {
            tracing::warn!(
                from = current.as_str(),
                to = next.as_str(),
                "Unexpected connection state transition"
            );
        }

        self.state_tx.send_replace(next);
        tracing::debug!(from = current.as_str(), to = next.as_str(), "Connection state changed");
        metrics::set_connection_state(next);
        self.emit(StreamEvent::StateChanged {
            from: current,
            to: next,
        });
    }

    fn emit(&self, event: StreamEvent) {
        // No receivers is fine.
        let _ = self.status_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    /// Transport whose every connection attempt fails.
    struct Unreachable;

    #[async_trait]
    impl Transport for Unreachable {
        type Connection = NeverConnected;

        async fn open(
            &self,
            _endpoint: &str,
            _headers: &AuthHeaders,
        ) -> Result<NeverConnected, TransportError> {
            Err(TransportError::Connect("connection refused".to_string()))
        }
    }

    struct NeverConnected;

    #[async_trait]
    impl Connection for NeverConnected {
        async fn send(&mut self, _text: String) -> Result<(), TransportError> {
            Ok(())
        }
        async fn receive(&mut self) -> Result<Frame, TransportError> {
            Err(TransportError::Closed(None))
        }
        async fn ping(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
        async fn close(&mut self) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn fast_config(max_attempts: u32) -> StreamClientConfig {
        StreamClientConfig {
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(20),
                jitter_factor: 0.0,
                max_attempts,
                ..ReconnectConfig::default()
            },
            ..StreamClientConfig::new("ws://127.0.0.1:1/v1beta3/crypto/us")
        }
    }

    fn credentials() -> Credentials {
        Credentials::new("key", "secret").unwrap()
    }

    #[test]
    fn default_config_points_at_crypto_feed() {
        let config = StreamClientConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.max_auth_failures, 3);
    }

    #[tokio::test]
    async fn start_rejects_credentials_unusable_as_headers() {
        let err = StreamClient::start(
            fast_config(0),
            Unreachable,
            Credentials::new("key\r\n", "secret").unwrap(),
            [],
            HandlerRegistry::new(),
        )
        .unwrap_err();

        assert!(matches!(err, StreamClientError::Credential(_)));
    }

    #[tokio::test]
    async fn gives_up_after_max_reconnect_attempts() {
        let client = StreamClient::start(
            fast_config(2),
            Unreachable,
            credentials(),
            [],
            HandlerRegistry::new(),
        )
        .unwrap();

        let mut state = client.state_watch();
        tokio::time::timeout(
            Duration::from_secs(2),
            state.wait_for(|s| *s == ConnectionState::Closed),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(
            client.stop().await,
            Err(StreamClientError::MaxReconnectAttemptsExceeded(2))
        );
    }

    #[tokio::test]
    async fn stop_interrupts_backoff() {
        let mut config = fast_config(0);
        config.reconnect.initial_delay = Duration::from_secs(3600);
        config.reconnect.max_delay = Duration::from_secs(3600);

        let client = StreamClient::start(
            config,
            Unreachable,
            credentials(),
            [],
            HandlerRegistry::new(),
        )
        .unwrap();
        let mut status = client.subscribe_status();

        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), status.recv())
                .await
                .unwrap()
                .unwrap();
            if matches!(event, StreamEvent::Backoff { .. }) {
                break;
            }
        }

        let stopped = tokio::time::timeout(Duration::from_secs(1), client.stop()).await;
        assert_eq!(stopped.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn update_after_stop_is_rejected() {
        let client = StreamClient::start(
            fast_config(1),
            Unreachable,
            credentials(),
            [],
            HandlerRegistry::new(),
        )
        .unwrap();

        let mut state = client.state_watch();
        tokio::time::timeout(
            Duration::from_secs(2),
            state.wait_for(|s| *s == ConnectionState::Closed),
        )
        .await
        .unwrap()
        .unwrap();
        // The task may still be finishing after publishing Closed.
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(
            client.update_subscriptions([], []),
            Err(StreamClientError::Stopped)
        );
    }
}
