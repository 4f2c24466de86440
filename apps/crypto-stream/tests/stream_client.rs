//! Stream Client Integration Tests
//!
//! Drives the full client (supervisor, codec, dispatcher, subscription
//! manager) against a scripted in-memory feed.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Sent, WAIT, events_until, fast_config, scripted, symbols};
use crypto_stream::{
    AuthError, ConnectionState, Credentials, HandlerError, HandlerRegistry, HeartbeatConfig,
    HeartbeatConfigError, MarketEvent, MarketEventHandler, StreamClient, StreamClientError,
    StreamEvent, StreamKind, Subscription, Symbol, TakerSide, TransportError, expand,
};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};

mockall::mock! {
    Handler {}

    impl MarketEventHandler for Handler {
        fn handle(&self, event: &MarketEvent) -> Result<(), HandlerError>;
    }
}

const ETH_TRADE: &str = r#"[{"T":"t","S":"ETH/USD","p":3200.50,"s":0.25,"t":"2025-01-01T00:00:00Z","i":7,"tks":"B"}]"#;

fn sym(s: &str) -> Symbol {
    Symbol::parse(s).unwrap()
}

fn credentials() -> Credentials {
    Credentials::new("PKTEST", "secret").unwrap()
}

#[tokio::test]
async fn trade_for_subscribed_pair_is_delivered_once() {
    let (transport, feed) = scripted();
    let mut peer = feed.accept();

    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let mut handler = MockHandler::new();
    handler
        .expect_handle()
        .withf(|event| match event {
            MarketEvent::Trade(trade) => {
                trade.symbol.as_str() == "ETH/USD"
                    && trade.price == Decimal::new(320_050, 2)
                    && trade.size == Decimal::new(15, 1)
                    && trade.side == TakerSide::Sell
            }
            _ => false,
        })
        .times(1)
        .returning(move |_| {
            let _ = seen_tx.send(());
            Ok(())
        });

    let client = assert_ok!(StreamClient::start(
        fast_config(),
        transport,
        credentials(),
        expand([&sym("ETH/USD")], &[StreamKind::Trade]),
        HandlerRegistry::new().register("mock", Arc::new(handler)),
    ));

    let subscribe = peer.next_json().await;
    assert_eq!(subscribe["action"], "subscribe");
    assert_eq!(symbols(&subscribe, "trades"), vec!["ETH/USD"]);

    peer.push(r#"[{"T":"subscription","trades":["ETH/USD"]}]"#);
    peer.push(
        r#"{"type":"trade","symbol":"ETH/USD","price":"3200.50","size":"1.5","side":"sell","ts":"2025-01-01T00:00:00Z"}"#,
    );

    timeout(WAIT, seen_rx.recv())
        .await
        .expect("trade was not delivered")
        .unwrap();

    assert_ok!(client.stop().await);
}

#[tokio::test]
async fn unknown_message_type_reaches_no_handler() {
    let (transport, feed) = scripted();
    let mut peer = feed.accept();

    let mut handler = MockHandler::new();
    handler.expect_handle().never();

    let client = StreamClient::start(
        fast_config(),
        transport,
        credentials(),
        expand([&sym("BTC/USD")], &[StreamKind::Trade]),
        HandlerRegistry::new().register("mock", Arc::new(handler)),
    )
    .unwrap();
    let mut status = client.subscribe_status();

    peer.next_json().await;
    peer.push(r#"[{"T":"x","S":"BTC/USD","z":1},{"T":"subscription","trades":["BTC/USD"]}]"#);

    let events = events_until(&mut status, |e| {
        matches!(e, StreamEvent::SubscriptionAcknowledged { .. })
    })
    .await;
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, StreamEvent::FeedError(_)))
    );

    assert_ok!(client.stop().await);
}

#[tokio::test]
async fn acknowledgment_updates_confirmed_set() {
    let (transport, feed) = scripted();
    let mut peer = feed.accept();

    let client = StreamClient::start(
        fast_config(),
        transport,
        credentials(),
        expand([&sym("BTC/USD")], &[StreamKind::Trade, StreamKind::Quote]),
        HandlerRegistry::new(),
    )
    .unwrap();
    let mut status = client.subscribe_status();

    let subscribe = peer.next_json().await;
    assert_eq!(symbols(&subscribe, "trades"), vec!["BTC/USD"]);
    assert_eq!(symbols(&subscribe, "quotes"), vec!["BTC/USD"]);
    assert_eq!(client.state(), ConnectionState::Subscribed);
    assert!(client.subscriptions().acknowledged().is_empty());

    peer.push(r#"[{"T":"subscription","trades":["BTC/USD"],"quotes":["BTC/USD"],"bars":[]}]"#);

    let events = events_until(&mut status, |e| {
        matches!(e, StreamEvent::SubscriptionAcknowledged { .. })
    })
    .await;
    assert_eq!(
        events.last(),
        Some(&StreamEvent::SubscriptionAcknowledged {
            acknowledged: 2,
            outstanding: 0,
        })
    );
    assert_eq!(
        client.subscriptions().acknowledged(),
        client.subscriptions().desired()
    );

    assert_ok!(client.stop().await);
}

#[tokio::test]
async fn update_while_connected_sends_only_the_delta() {
    let (transport, feed) = scripted();
    let mut peer = feed.accept();

    let client = StreamClient::start(
        fast_config(),
        transport,
        credentials(),
        expand([&sym("BTC/USD")], &[StreamKind::Trade, StreamKind::Quote]),
        HandlerRegistry::new(),
    )
    .unwrap();

    peer.next_json().await;

    client
        .update_subscriptions(
            expand([&sym("ETH/USD")], &[StreamKind::Trade]),
            expand([&sym("BTC/USD")], &[StreamKind::Quote]),
        )
        .unwrap();

    let unsubscribe = peer.next_json().await;
    assert_eq!(unsubscribe["action"], "unsubscribe");
    assert_eq!(symbols(&unsubscribe, "quotes"), vec!["BTC/USD"]);
    assert!(symbols(&unsubscribe, "trades").is_empty());

    let subscribe = peer.next_json().await;
    assert_eq!(subscribe["action"], "subscribe");
    assert_eq!(symbols(&subscribe, "trades"), vec!["ETH/USD"]);
    assert!(symbols(&subscribe, "quotes").is_empty());

    assert_ok!(client.stop().await);
}

#[tokio::test]
async fn reconnect_resends_full_desired_set() {
    let (transport, feed) = scripted();
    let mut first = feed.accept();

    let client = StreamClient::start(
        fast_config(),
        transport,
        credentials(),
        expand([&sym("BTC/USD")], &[StreamKind::Trade, StreamKind::Quote]),
        HandlerRegistry::new(),
    )
    .unwrap();
    let mut status = client.subscribe_status();

    first.next_json().await;
    first.push(r#"[{"T":"subscription","trades":["BTC/USD"],"quotes":["BTC/USD"]}]"#);
    events_until(&mut status, |e| {
        matches!(e, StreamEvent::SubscriptionAcknowledged { .. })
    })
    .await;

    client
        .update_subscriptions(
            expand([&sym("ETH/USD")], &[StreamKind::Trade]),
            Vec::<Subscription>::new(),
        )
        .unwrap();
    let delta = first.next_json().await;
    assert_eq!(symbols(&delta, "trades"), vec!["ETH/USD"]);

    let mut second = feed.accept();
    first.drop_connection("going away");
    first.closed().await;

    let resubscribe = second.next_json().await;
    assert_eq!(resubscribe["action"], "subscribe");
    assert_eq!(symbols(&resubscribe, "trades"), vec!["BTC/USD", "ETH/USD"]);
    assert_eq!(symbols(&resubscribe, "quotes"), vec!["BTC/USD"]);

    let events = events_until(&mut status, |e| {
        matches!(
            e,
            StreamEvent::StateChanged {
                to: ConnectionState::Subscribed,
                ..
            }
        )
    })
    .await;
    assert!(events.iter().any(|e| matches!(
        e,
        StreamEvent::Disconnected { reason } if reason.contains("going away")
    )));
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, StreamEvent::Backoff { .. }))
            .count(),
        1
    );
    assert!(client.subscriptions().acknowledged().is_empty());
    assert_eq!(feed.opens(), 2);

    assert_ok!(client.stop().await);
}

#[tokio::test]
async fn connect_failures_back_off_then_subscribe_once() {
    let (transport, feed) = scripted();
    feed.refuse(TransportError::Connect("connection refused".to_string()));
    feed.refuse(TransportError::Timeout(std::time::Duration::from_secs(10)));
    let mut peer = feed.accept();

    let client = StreamClient::start(
        fast_config(),
        transport,
        credentials(),
        expand([&sym("BTC/USD")], &[StreamKind::Trade]),
        HandlerRegistry::new(),
    )
    .unwrap();
    let mut status = client.subscribe_status();

    let events = events_until(&mut status, |e| {
        matches!(e, StreamEvent::ControlSent { .. })
    })
    .await;

    let backoffs: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Backoff { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(backoffs, vec![1, 2]);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, StreamEvent::ConnectFailed { .. }))
            .count(),
        2
    );

    let subscribe = peer.next_json().await;
    assert_eq!(symbols(&subscribe, "trades"), vec!["BTC/USD"]);
    assert!(peer.drain_text().is_empty());
    assert_eq!(feed.opens(), 3);

    assert_ok!(client.stop().await);
}

#[tokio::test]
async fn failing_handler_does_not_block_others() {
    let (transport, feed) = scripted();
    let mut peer = feed.accept();

    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let registry = HandlerRegistry::new()
        .on_trade("rejects", |_| Err(HandlerError::new("downstream unavailable")))
        .on_trade("panics", |_| panic!("handler bug"))
        .on_trade("records", move |trade| {
            let _ = seen_tx.send(trade.price);
            Ok(())
        });

    let client = StreamClient::start(
        fast_config(),
        transport,
        credentials(),
        expand([&sym("ETH/USD")], &[StreamKind::Trade]),
        registry,
    )
    .unwrap();

    peer.next_json().await;
    peer.push(ETH_TRADE);
    peer.push(ETH_TRADE);

    for _ in 0..2 {
        let price = timeout(WAIT, seen_rx.recv()).await.unwrap().unwrap();
        assert_eq!(price, Decimal::new(320_050, 2));
    }
    assert!(!client.is_finished());

    assert_ok!(client.stop().await);
}

#[tokio::test]
async fn malformed_element_does_not_discard_siblings() {
    let (transport, feed) = scripted();
    let mut peer = feed.accept();

    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
    let registry = HandlerRegistry::new().on_quote("records", move |quote| {
        let _ = seen_tx.send(quote.symbol.to_string());
        Ok(())
    });

    let client = StreamClient::start(
        fast_config(),
        transport,
        credentials(),
        expand([&sym("ETH/USD")], &[StreamKind::Quote]),
        registry,
    )
    .unwrap();

    peer.next_json().await;
    peer.push("not json at all");
    peer.push(
        r#"[{"T":"q","S":"ETH/USD","bp":"oops"},{"T":"q","S":"ETH/USD","bp":3200.1,"bs":4.2,"ap":3200.6,"as":1.75,"t":"2025-01-01T00:00:00Z"}]"#,
    );

    let symbol = timeout(WAIT, seen_rx.recv()).await.unwrap().unwrap();
    assert_eq!(symbol, "ETH/USD");
    assert_eq!(client.state(), ConnectionState::Subscribed);

    assert_ok!(client.stop().await);
}

#[tokio::test]
async fn stop_closes_transport_and_ends_closed() {
    let (transport, feed) = scripted();
    let mut peer = feed.accept();

    let client = StreamClient::start(
        fast_config(),
        transport,
        credentials(),
        expand([&sym("BTC/USD")], &[StreamKind::Trade]),
        HandlerRegistry::new(),
    )
    .unwrap();
    let state = client.state_watch();

    peer.next_json().await;
    assert_ok!(client.stop().await);

    assert_eq!(peer.next_sent().await, Sent::Close);
    assert_eq!(*state.borrow(), ConnectionState::Closed);
}

#[tokio::test]
async fn handshake_presents_credential_headers() {
    let (transport, feed) = scripted();
    let mut peer = feed.accept();

    let client = StreamClient::start(
        fast_config(),
        transport,
        credentials(),
        expand([&sym("BTC/USD")], &[StreamKind::Trade]),
        HandlerRegistry::new(),
    )
    .unwrap();

    peer.next_json().await;
    let headers = feed.last_headers().unwrap();
    assert_eq!(headers.get("APCA-API-KEY-ID"), Some("PKTEST"));
    assert_eq!(headers.get("APCA-API-SECRET-KEY"), Some("secret"));

    assert_ok!(client.stop().await);
}

#[tokio::test]
async fn repeated_credential_rejection_is_fatal() {
    let (transport, feed) = scripted();
    let mut peer = feed.accept();

    let mut config = fast_config();
    config.max_auth_failures = 1;

    let (errors_tx, mut errors_rx) = mpsc::unbounded_channel();
    let registry = HandlerRegistry::new().on_feed_error("records", move |error| {
        let _ = errors_tx.send(error.code);
    });

    let client = StreamClient::start(
        config,
        transport,
        credentials(),
        expand([&sym("BTC/USD")], &[StreamKind::Trade]),
        registry,
    )
    .unwrap();
    let mut status = client.subscribe_status();

    peer.next_json().await;
    peer.push(r#"[{"T":"error","code":402,"msg":"auth failed"}]"#);

    let events = events_until(&mut status, |e| matches!(e, StreamEvent::Fatal(_))).await;
    assert!(
        events
            .iter()
            .any(|e| *e == StreamEvent::AuthRejected(AuthError::InvalidCredentials))
    );
    assert_eq!(timeout(WAIT, errors_rx.recv()).await.unwrap(), Some(402));

    let err = assert_err!(client.stop().await);
    assert_eq!(
        err,
        StreamClientError::AuthenticationFailed(AuthError::InvalidCredentials)
    );
}

#[tokio::test]
async fn stop_leaves_desired_set_intact() {
    let (transport, feed) = scripted();
    let _peer = feed.accept();

    let client = StreamClient::start(
        fast_config(),
        transport,
        credentials(),
        expand([&sym("BTC/USD")], &[StreamKind::Trade]),
        HandlerRegistry::new(),
    )
    .unwrap();
    let mut status = client.subscribe_status();

    events_until(&mut status, |e| matches!(e, StreamEvent::Connected { .. })).await;
    let subscriptions = Arc::clone(client.subscriptions());
    assert_ok!(client.stop().await);

    assert_eq!(subscriptions.stats().desired, 1);
}

#[tokio::test]
async fn silent_feed_is_pinged_then_replaced() {
    let (transport, feed) = scripted();
    let mut first = feed.accept();

    let mut config = fast_config();
    config.heartbeat = HeartbeatConfig::new(Duration::from_millis(100), Duration::from_millis(300));

    let client = StreamClient::start(
        config,
        transport,
        credentials(),
        expand([&sym("BTC/USD"), &sym("ETH/USD")], &[StreamKind::Trade]),
        HandlerRegistry::new(),
    )
    .unwrap();
    let mut status = client.subscribe_status();

    let subscribe = first.next_json().await;
    assert_eq!(subscribe["action"], "subscribe");
    assert_eq!(first.next_sent().await, Sent::Ping);

    let mut second = feed.accept();
    let events = events_until(&mut status, |e| {
        matches!(e, StreamEvent::Disconnected { .. })
    })
    .await;
    assert!(events.iter().any(|e| matches!(
        e,
        StreamEvent::Disconnected { reason } if reason == "silence window exceeded"
    )));
    first.closed().await;

    let resubscribe = second.next_json().await;
    assert_eq!(resubscribe["action"], "subscribe");
    assert_eq!(symbols(&resubscribe, "trades"), vec!["BTC/USD", "ETH/USD"]);
    assert_eq!(feed.opens(), 2);

    assert_ok!(client.stop().await);
}

#[tokio::test]
async fn zero_ping_interval_is_rejected_at_start() {
    let (transport, feed) = scripted();

    let mut config = fast_config();
    config.heartbeat = HeartbeatConfig::new(Duration::ZERO, Duration::from_secs(60));

    let err = assert_err!(StreamClient::start(
        config,
        transport,
        credentials(),
        expand([&sym("BTC/USD")], &[StreamKind::Trade]),
        HandlerRegistry::new(),
    ));
    assert_eq!(
        err,
        StreamClientError::Heartbeat(HeartbeatConfigError::ZeroPingInterval)
    );
    assert_eq!(feed.opens(), 0);
}
