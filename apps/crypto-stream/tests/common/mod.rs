//! Scripted in-memory feed for driving the stream client end to end.
//!
//! [`ScriptedTransport`] hands out connection outcomes queued through a
//! [`Feed`]. Each accepted connection is paired with a [`Peer`] that plays
//! the server: it pushes frames to the client and observes what the client
//! sends back.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use crypto_stream::application::ports::AuthHeaders;
use crypto_stream::{
    Connection, Frame, HeartbeatConfig, ReconnectConfig, StreamClientConfig, StreamEvent,
    Transport, TransportError,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

/// Upper bound for any single wait in a test.
pub const WAIT: Duration = Duration::from_secs(5);

/// Client configuration with millisecond backoff and a heartbeat that
/// never fires during a test.
pub fn fast_config() -> StreamClientConfig {
    let mut config = StreamClientConfig::new("wss://feed.test/v1beta3/crypto/us");
    config.reconnect = ReconnectConfig {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        multiplier: 2.0,
        jitter_factor: 0.0,
        max_attempts: 0,
        stable_after: Duration::from_secs(60),
    };
    config.heartbeat = HeartbeatConfig::new(Duration::from_secs(3600), Duration::from_secs(7200));
    config
}

// =============================================================================
// Transport
// =============================================================================

type Outcome = Result<ScriptedConnection, TransportError>;

/// Transport whose connection attempts resolve in the order queued on the
/// paired [`Feed`]. With nothing queued, an attempt waits.
pub struct ScriptedTransport {
    outcomes: tokio::sync::Mutex<mpsc::UnboundedReceiver<Outcome>>,
    opens: Arc<AtomicUsize>,
    headers: Arc<Mutex<Option<AuthHeaders>>>,
}

/// Test-side control of a [`ScriptedTransport`].
pub struct Feed {
    outcomes: mpsc::UnboundedSender<Outcome>,
    opens: Arc<AtomicUsize>,
    headers: Arc<Mutex<Option<AuthHeaders>>>,
}

/// Create a transport and its controller.
pub fn scripted() -> (ScriptedTransport, Feed) {
    let (tx, rx) = mpsc::unbounded_channel();
    let opens = Arc::new(AtomicUsize::new(0));
    let headers = Arc::new(Mutex::new(None));

    let transport = ScriptedTransport {
        outcomes: tokio::sync::Mutex::new(rx),
        opens: Arc::clone(&opens),
        headers: Arc::clone(&headers),
    };
    let feed = Feed {
        outcomes: tx,
        opens,
        headers,
    };
    (transport, feed)
}

#[async_trait]
impl Transport for ScriptedTransport {
    type Connection = ScriptedConnection;

    async fn open(
        &self,
        _endpoint: &str,
        headers: &AuthHeaders,
    ) -> Result<ScriptedConnection, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        *self.headers.lock() = Some(headers.clone());

        let next = self.outcomes.lock().await.recv().await;
        match next {
            Some(outcome) => outcome,
            None => std::future::pending().await,
        }
    }
}

impl Feed {
    /// Queue a successful connection and return the server side of it.
    pub fn accept(&self) -> Peer {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let conn = ScriptedConnection {
            inbound: inbound_rx,
            outbound: outbound_tx,
            closed: false,
        };
        self.outcomes.send(Ok(conn)).unwrap();

        Peer {
            inbound: inbound_tx,
            outbound: outbound_rx,
        }
    }

    /// Queue a failed connection attempt.
    pub fn refuse(&self, error: TransportError) {
        self.outcomes.send(Err(error)).unwrap();
    }

    /// Number of connection attempts made so far.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Headers presented on the most recent attempt.
    pub fn last_headers(&self) -> Option<AuthHeaders> {
        self.headers.lock().clone()
    }
}

// =============================================================================
// Connection
// =============================================================================

/// What the client wrote to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    /// Text frame.
    Text(String),
    /// Protocol ping.
    Ping,
    /// Close request.
    Close,
}

/// Client side of a scripted connection.
pub struct ScriptedConnection {
    inbound: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
    outbound: mpsc::UnboundedSender<Sent>,
    closed: bool,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.outbound
            .send(Sent::Text(text))
            .map_err(|_| TransportError::Send("peer gone".to_string()))
    }

    async fn receive(&mut self) -> Result<Frame, TransportError> {
        self.inbound
            .recv()
            .await
            .unwrap_or(Err(TransportError::Closed(None)))
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.outbound
            .send(Sent::Ping)
            .map_err(|_| TransportError::Send("peer gone".to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.closed {
            self.closed = true;
            let _ = self.outbound.send(Sent::Close);
        }
        Ok(())
    }
}

/// Server side of a scripted connection.
pub struct Peer {
    inbound: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    outbound: mpsc::UnboundedReceiver<Sent>,
}

impl Peer {
    /// Push a text frame to the client.
    pub fn push(&self, text: &str) {
        let _ = self.inbound.send(Ok(Frame::Text(text.to_string())));
    }

    /// Fail the client's next read as if the socket dropped.
    pub fn drop_connection(&self, reason: &str) {
        let _ = self
            .inbound
            .send(Err(TransportError::Closed(Some(reason.to_string()))));
    }

    /// Next thing the client wrote, pings included.
    pub async fn next_sent(&mut self) -> Sent {
        timeout(WAIT, self.outbound.recv())
            .await
            .expect("timed out waiting for the client to write")
            .expect("client dropped the connection")
    }

    /// Next text frame the client wrote, parsed as JSON.
    pub async fn next_json(&mut self) -> Value {
        loop {
            match self.next_sent().await {
                Sent::Text(text) => return serde_json::from_str(&text).unwrap(),
                Sent::Ping => {}
                Sent::Close => panic!("connection closed while waiting for a text frame"),
            }
        }
    }

    /// Wait until the client closes this connection.
    pub async fn closed(&mut self) {
        loop {
            match timeout(WAIT, self.outbound.recv())
                .await
                .expect("timed out waiting for close")
            {
                Some(Sent::Close) | None => return,
                Some(_) => {}
            }
        }
    }

    /// Text frames written without waiting.
    pub fn drain_text(&mut self) -> Vec<String> {
        let mut texts = Vec::new();
        while let Ok(sent) = self.outbound.try_recv() {
            if let Sent::Text(text) = sent {
                texts.push(text);
            }
        }
        texts
    }
}

// =============================================================================
// Status Events
// =============================================================================

/// Collect status events until `stop` matches, returning all of them.
pub async fn events_until(
    rx: &mut broadcast::Receiver<StreamEvent>,
    stop: impl Fn(&StreamEvent) -> bool,
) -> Vec<StreamEvent> {
    let mut seen = Vec::new();
    loop {
        let event = timeout(WAIT, rx.recv())
            .await
            .expect("timed out waiting for status event")
            .expect("status channel closed");
        let done = stop(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

/// Symbols listed under `key` in a control message.
pub fn symbols(message: &Value, key: &str) -> Vec<String> {
    message
        .get(key)
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
