//! Stream Codec
//!
//! Decodes text frames from the crypto stream into [`ParsedMessage`]s.
//!
//! A frame is either a JSON array of message objects (the normal case) or a
//! single object. Each object carries a type discriminator under `T`, or
//! under `type` in the long-form dialect.
//!
//! Frame-level failures (not JSON, not an object or array) are returned as
//! errors. Element-level failures are collected alongside the successfully
//! decoded messages so that one bad element does not discard its siblings.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::messages::{
    BarMessage, ErrorMessage, OrderBookMessage, QuoteMessage, SubscriptionMessage, SuccessMessage,
    TradeMessage,
};
use crate::application::services::ParsedMessage;
use crate::domain::market::{
    BarKind, MarketEvent, OrderBookEvent, QuoteEvent, SymbolError, TradeEvent,
};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Frame is not valid JSON.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is JSON but neither an object nor an array.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    /// Element has no `T`/`type` string field.
    #[error("message has no type discriminator")]
    MissingDiscriminator,

    /// Element has a known discriminator but a malformed payload.
    #[error("malformed {kind} message: {source}")]
    Payload {
        /// Discriminator of the element.
        kind: String,
        /// Underlying deserialization error.
        source: serde_json::Error,
    },

    /// Element carries an invalid symbol.
    #[error("invalid symbol in {kind} message: {source}")]
    Symbol {
        /// Discriminator of the element.
        kind: String,
        /// Underlying symbol error.
        source: SymbolError,
    },
}

/// Result of decoding one frame.
#[derive(Debug, Default)]
pub struct DecodedFrame {
    /// Successfully decoded messages, in frame order.
    pub messages: Vec<ParsedMessage>,
    /// Elements that could not be decoded.
    pub rejected: Vec<CodecError>,
}

/// JSON codec for the crypto market data stream.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not JSON or is not an object or
    /// array. Malformed elements inside a valid frame are reported in
    /// [`DecodedFrame::rejected`] instead.
    pub fn decode(&self, text: &str) -> Result<DecodedFrame, CodecError> {
        let value: Value = serde_json::from_str(text.trim())?;

        let elements = match value {
            Value::Array(elements) => elements,
            object @ Value::Object(_) => vec![object],
            other => {
                let preview: String = other.to_string().chars().take(50).collect();
                return Err(CodecError::InvalidFormat(format!(
                    "expected JSON array or object, got: {preview}"
                )));
            }
        };

        let mut frame = DecodedFrame {
            messages: Vec::with_capacity(elements.len()),
            rejected: Vec::new(),
        };

        for element in elements {
            match self.decode_message(element) {
                Ok(message) => frame.messages.push(message),
                Err(e) => frame.rejected.push(e),
            }
        }

        Ok(frame)
    }

    /// Decode a single message object.
    ///
    /// Unknown discriminators decode to [`ParsedMessage::Unknown`].
    ///
    /// # Errors
    ///
    /// Returns an error if the discriminator is missing or the payload does
    /// not match its type.
    pub fn decode_message(&self, value: Value) -> Result<ParsedMessage, CodecError> {
        let kind = value
            .get("T")
            .or_else(|| value.get("type"))
            .and_then(Value::as_str)
            .ok_or(CodecError::MissingDiscriminator)?
            .to_string();

        let message = match kind.as_str() {
            "t" | "trade" => {
                let msg: TradeMessage = payload(&kind, value)?;
                let event = TradeEvent::try_from(msg).map_err(|e| symbol_error(&kind, e))?;
                ParsedMessage::Market(MarketEvent::Trade(event))
            }
            "q" | "quote" => {
                let msg: QuoteMessage = payload(&kind, value)?;
                let event = QuoteEvent::try_from(msg).map_err(|e| symbol_error(&kind, e))?;
                ParsedMessage::Market(MarketEvent::Quote(event))
            }
            "b" | "bar" => bar(&kind, value, BarKind::Minute)?,
            "d" | "dailyBar" | "daily_bar" => bar(&kind, value, BarKind::Daily)?,
            "u" | "updatedBar" | "updated_bar" => bar(&kind, value, BarKind::Updated)?,
            "o" | "orderbook" => {
                let msg: OrderBookMessage = payload(&kind, value)?;
                let event = OrderBookEvent::try_from(msg).map_err(|e| symbol_error(&kind, e))?;
                ParsedMessage::Market(MarketEvent::OrderBook(event))
            }
            "subscription" => {
                let msg: SubscriptionMessage = payload(&kind, value)?;
                let (set, rejected) = msg.into_set();
                if !rejected.is_empty() {
                    tracing::debug!(?rejected, "Ignoring non-pair symbols in subscription ack");
                }
                ParsedMessage::SubscriptionAck(set)
            }
            "error" => {
                let msg: ErrorMessage = payload(&kind, value)?;
                ParsedMessage::FeedError(msg.into())
            }
            "success" => {
                let msg: SuccessMessage = payload(&kind, value)?;
                ParsedMessage::Notice(msg.into())
            }
            _ => ParsedMessage::Unknown(kind),
        };

        Ok(message)
    }
}

fn payload<T: DeserializeOwned>(kind: &str, value: Value) -> Result<T, CodecError> {
    serde_json::from_value(value).map_err(|source| CodecError::Payload {
        kind: kind.to_string(),
        source,
    })
}

fn symbol_error(kind: &str, source: SymbolError) -> CodecError {
    CodecError::Symbol {
        kind: kind.to_string(),
        source,
    }
}

fn bar(kind: &str, value: Value, bar_kind: BarKind) -> Result<ParsedMessage, CodecError> {
    let msg: BarMessage = payload(kind, value)?;
    let event = msg
        .into_event(bar_kind)
        .map_err(|e| symbol_error(kind, e))?;
    Ok(ParsedMessage::Market(MarketEvent::Bar(event)))
}
