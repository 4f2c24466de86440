//! Subscription Management
//!
//! Tracks which `(symbol, stream)` pairs the caller wants streamed and
//! reconciles that against what the feed has confirmed.
//!
//! # Design
//!
//! The manager keeps three sets behind a single lock:
//! - **desired**: what the caller asked for. Survives disconnects.
//! - **requested**: what has been sent to the current connection.
//! - **acknowledged**: what the feed last confirmed.
//!
//! `requested` and `acknowledged` are cleared on every disconnect, so the
//! next connection replays the full desired set. Between reconnects, only
//! the delta against `requested` is sent, which keeps rapid updates from
//! re-sending pairs whose acknowledgment is still in flight.
//!
//! # Example
//!
//! ```rust
//! use crypto_stream::domain::market::{StreamKind, Symbol};
//! use crypto_stream::domain::subscription::{SubscriptionManager, SubscriptionSet};
//!
//! let manager = SubscriptionManager::new();
//! let btc = Symbol::parse("BTC/USD").unwrap();
//! manager.desire(&btc, [StreamKind::Trade, StreamKind::Quote]);
//!
//! let delta = manager.diff(&SubscriptionSet::new());
//! assert_eq!(delta.to_add.len(), 2);
//! assert!(delta.to_remove.is_empty());
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::domain::market::{StreamKind, Symbol};

// =============================================================================
// Types
// =============================================================================

/// One `(symbol, stream)` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Subscription {
    /// Pair to stream.
    pub symbol: Symbol,
    /// Stream for the pair.
    pub kind: StreamKind,
}

impl Subscription {
    /// Create a subscription.
    #[must_use]
    pub const fn new(symbol: Symbol, kind: StreamKind) -> Self {
        Self { symbol, kind }
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.symbol, self.kind)
    }
}

/// Ordered set of subscriptions.
pub type SubscriptionSet = BTreeSet<Subscription>;

/// Expand symbols × kinds into a subscription set.
#[must_use]
pub fn expand<'a>(
    symbols: impl IntoIterator<Item = &'a Symbol>,
    kinds: &[StreamKind],
) -> SubscriptionSet {
    symbols
        .into_iter()
        .flat_map(|symbol| {
            kinds
                .iter()
                .map(move |kind| Subscription::new(symbol.clone(), *kind))
        })
        .collect()
}

// =============================================================================
// Delta
// =============================================================================

/// Difference between desired state and some reference state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionDelta {
    /// Pairs desired but not in the reference state.
    pub to_add: SubscriptionSet,
    /// Pairs in the reference state but no longer desired.
    pub to_remove: SubscriptionSet,
}

impl SubscriptionDelta {
    /// Check if there is nothing to change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Compute `desired - reference` and `reference - desired`.
#[must_use]
pub fn diff(desired: &SubscriptionSet, reference: &SubscriptionSet) -> SubscriptionDelta {
    SubscriptionDelta {
        to_add: desired.difference(reference).cloned().collect(),
        to_remove: reference.difference(desired).cloned().collect(),
    }
}

// =============================================================================
// Control Messages
// =============================================================================

/// Action carried by a control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    /// Start streaming the listed pairs.
    Subscribe,
    /// Stop streaming the listed pairs.
    Unsubscribe,
}

impl ControlAction {
    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
        }
    }
}

/// Outbound subscribe/unsubscribe request, grouped by stream kind.
///
/// # Wire Format (JSON)
/// ```json
/// {"action": "subscribe", "trades": ["BTC/USD"], "quotes": ["BTC/USD", "ETH/USD"]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlMessage {
    /// Subscribe or unsubscribe.
    pub action: ControlAction,

    /// Trade symbols.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trades: Vec<String>,

    /// Quote symbols.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quotes: Vec<String>,

    /// Minute bar symbols.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bars: Vec<String>,

    /// Daily bar symbols.
    #[serde(default, skip_serializing_if = "Vec::is_empty", rename = "dailyBars")]
    pub daily_bars: Vec<String>,

    /// Order book symbols.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub orderbooks: Vec<String>,
}

impl ControlMessage {
    /// Group a set of subscriptions under one action.
    #[must_use]
    pub fn from_set(action: ControlAction, set: &SubscriptionSet) -> Self {
        let mut msg = Self {
            action,
            trades: Vec::new(),
            quotes: Vec::new(),
            bars: Vec::new(),
            daily_bars: Vec::new(),
            orderbooks: Vec::new(),
        };

        for sub in set {
            msg.list_mut(sub.kind).push(sub.symbol.to_string());
        }

        msg
    }

    /// Symbols listed for a stream kind.
    #[must_use]
    pub fn symbols(&self, kind: StreamKind) -> &[String] {
        match kind {
            StreamKind::Trade => &self.trades,
            StreamKind::Quote => &self.quotes,
            StreamKind::MinuteBar => &self.bars,
            StreamKind::DailyBar => &self.daily_bars,
            StreamKind::OrderBook => &self.orderbooks,
        }
    }

    fn list_mut(&mut self, kind: StreamKind) -> &mut Vec<String> {
        match kind {
            StreamKind::Trade => &mut self.trades,
            StreamKind::Quote => &mut self.quotes,
            StreamKind::MinuteBar => &mut self.bars,
            StreamKind::DailyBar => &mut self.daily_bars,
            StreamKind::OrderBook => &mut self.orderbooks,
        }
    }

    /// Total number of `(symbol, stream)` pairs carried.
    #[must_use]
    pub fn pair_count(&self) -> usize {
        StreamKind::ALL
            .iter()
            .map(|kind| self.symbols(*kind).len())
            .sum()
    }

    /// Serialize to the JSON text sent on the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Build the control messages that apply `delta`.
///
/// Unsubscribes are emitted before subscribes. Empty halves produce no
/// message, so an empty delta yields an empty vector.
#[must_use]
pub fn build_control_messages(delta: &SubscriptionDelta) -> Vec<ControlMessage> {
    let mut messages = Vec::with_capacity(2);

    if !delta.to_remove.is_empty() {
        messages.push(ControlMessage::from_set(
            ControlAction::Unsubscribe,
            &delta.to_remove,
        ));
    }
    if !delta.to_add.is_empty() {
        messages.push(ControlMessage::from_set(
            ControlAction::Subscribe,
            &delta.to_add,
        ));
    }

    messages
}

// =============================================================================
// Subscription Manager
// =============================================================================

#[derive(Debug, Default)]
struct State {
    desired: SubscriptionSet,
    requested: SubscriptionSet,
    acknowledged: SubscriptionSet,
}

/// Counts of tracked subscriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionStats {
    /// Desired pairs.
    pub desired: usize,
    /// Pairs sent on the current connection.
    pub requested: usize,
    /// Pairs the feed confirmed.
    pub acknowledged: usize,
    /// Desired pairs per stream kind.
    pub desired_by_kind: BTreeMap<StreamKind, usize>,
}

/// Thread-safe owner of desired and acknowledged subscription state.
///
/// Callers mutate the desired set with [`desire`](Self::desire) and
/// [`forget`](Self::forget) from any thread while the connection task
/// reads deltas and records acknowledgments.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    state: RwLock<State>,
}

impl SubscriptionManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manager with an initial desired set.
    #[must_use]
    pub fn with_desired(initial: impl IntoIterator<Item = Subscription>) -> Self {
        let manager = Self::new();
        manager.desire_all(initial);
        manager
    }

    /// Add `(symbol, kind)` pairs to the desired set.
    ///
    /// Idempotent. Returns how many pairs were newly added.
    pub fn desire(&self, symbol: &Symbol, kinds: impl IntoIterator<Item = StreamKind>) -> usize {
        self.desire_all(
            kinds
                .into_iter()
                .map(|kind| Subscription::new(symbol.clone(), kind)),
        )
    }

    /// Add arbitrary subscriptions to the desired set.
    ///
    /// Returns how many were newly added.
    pub fn desire_all(&self, subscriptions: impl IntoIterator<Item = Subscription>) -> usize {
        let mut state = self.state.write();
        subscriptions
            .into_iter()
            .filter(|sub| state.desired.insert(sub.clone()))
            .count()
    }

    /// Remove `(symbol, kind)` pairs from the desired set.
    ///
    /// Idempotent; absent pairs are ignored. Returns how many were removed.
    pub fn forget(&self, symbol: &Symbol, kinds: impl IntoIterator<Item = StreamKind>) -> usize {
        self.forget_all(
            kinds
                .into_iter()
                .map(|kind| Subscription::new(symbol.clone(), kind)),
        )
    }

    /// Remove arbitrary subscriptions from the desired set.
    pub fn forget_all(&self, subscriptions: impl IntoIterator<Item = Subscription>) -> usize {
        let mut state = self.state.write();
        subscriptions
            .into_iter()
            .filter(|sub| state.desired.remove(sub))
            .count()
    }

    /// Delta between the desired set and `acknowledged`.
    ///
    /// Reads the desired set; does not mutate anything.
    #[must_use]
    pub fn diff(&self, acknowledged: &SubscriptionSet) -> SubscriptionDelta {
        diff(&self.state.read().desired, acknowledged)
    }

    /// Delta that still has to be sent on the current connection.
    #[must_use]
    pub fn pending_delta(&self) -> SubscriptionDelta {
        let state = self.state.read();
        diff(&state.desired, &state.requested)
    }

    /// Record that `delta` has been sent on the current connection.
    pub fn mark_requested(&self, delta: &SubscriptionDelta) {
        let mut state = self.state.write();
        for sub in &delta.to_remove {
            state.requested.remove(sub);
        }
        state.requested.extend(delta.to_add.iter().cloned());
    }

    /// Replace the acknowledged set with the feed's latest confirmation.
    ///
    /// Returns the delta still outstanding against the desired set, which
    /// is non-empty when the feed rejected or has not yet applied a pair.
    pub fn acknowledge(&self, confirmed: SubscriptionSet) -> SubscriptionDelta {
        let mut state = self.state.write();
        state.acknowledged = confirmed;
        diff(&state.desired, &state.acknowledged)
    }

    /// Forget everything the current connection knew about.
    ///
    /// Called on disconnect. The desired set is left untouched.
    pub fn reset_acknowledged(&self) {
        let mut state = self.state.write();
        state.acknowledged.clear();
        state.requested.clear();
    }

    /// Snapshot of the desired set.
    #[must_use]
    pub fn desired(&self) -> SubscriptionSet {
        self.state.read().desired.clone()
    }

    /// Snapshot of the acknowledged set.
    #[must_use]
    pub fn acknowledged(&self) -> SubscriptionSet {
        self.state.read().acknowledged.clone()
    }

    /// Check if nothing is desired.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().desired.is_empty()
    }

    /// Current counts.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        let state = self.state.read();
        let mut desired_by_kind = BTreeMap::new();
        for sub in &state.desired {
            *desired_by_kind.entry(sub.kind).or_insert(0) += 1;
        }

        SubscriptionStats {
            desired: state.desired.len(),
            requested: state.requested.len(),
            acknowledged: state.acknowledged.len(),
            desired_by_kind,
        }
    }
}
