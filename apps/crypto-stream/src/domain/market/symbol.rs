//! Crypto pair symbols.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Errors produced when parsing a [`Symbol`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    /// Input was empty.
    #[error("symbol cannot be empty")]
    Empty,

    /// Input did not contain exactly one `/` separator.
    #[error("symbol {0:?} must contain exactly one '/' separator")]
    Separator(String),

    /// One side of the pair was empty.
    #[error("symbol {0:?} has an empty base or quote currency")]
    EmptyLeg(String),

    /// A leg contained something other than uppercase ASCII letters.
    #[error("symbol {0:?} must be uppercase alphabetic (e.g. BTC/USD)")]
    InvalidCharacter(String),
}

/// A crypto trading pair in canonical `BASE/QUOTE` form, e.g. `BTC/USD`.
///
/// Construction validates the form, so every `Symbol` in the system is
/// well-formed. Use [`Symbol::normalized`] for user input that may be
/// lowercase or padded.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Parse a symbol in canonical form.
    ///
    /// # Errors
    ///
    /// Returns [`SymbolError`] if the input is not `BASE/QUOTE` with both
    /// legs non-empty and uppercase alphabetic.
    pub fn parse(input: &str) -> Result<Self, SymbolError> {
        if input.is_empty() {
            return Err(SymbolError::Empty);
        }

        let mut legs = input.split('/');
        let (Some(base), Some(quote), None) = (legs.next(), legs.next(), legs.next()) else {
            return Err(SymbolError::Separator(input.to_string()));
        };

        if base.is_empty() || quote.is_empty() {
            return Err(SymbolError::EmptyLeg(input.to_string()));
        }

        let valid_leg = |leg: &str| leg.bytes().all(|b| b.is_ascii_uppercase());
        if !valid_leg(base) || !valid_leg(quote) {
            return Err(SymbolError::InvalidCharacter(input.to_string()));
        }

        Ok(Self(input.to_string()))
    }

    /// Trim and uppercase the input before parsing.
    ///
    /// # Errors
    ///
    /// Returns [`SymbolError`] if the normalized input is still invalid.
    pub fn normalized(input: &str) -> Result<Self, SymbolError> {
        Self::parse(&input.trim().to_ascii_uppercase())
    }

    /// The canonical `BASE/QUOTE` string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base currency (left of the `/`).
    #[must_use]
    pub fn base(&self) -> &str {
        self.0.split_once('/').map_or("", |(base, _)| base)
    }

    /// Quote currency (right of the `/`).
    #[must_use]
    pub fn quote(&self) -> &str {
        self.0.split_once('/').map_or("", |(_, quote)| quote)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = SymbolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn parses_canonical_pair() {
        let symbol = Symbol::parse("BTC/USD").unwrap();
        assert_eq!(symbol.as_str(), "BTC/USD");
        assert_eq!(symbol.base(), "BTC");
        assert_eq!(symbol.quote(), "USD");
        assert_eq!(symbol.to_string(), "BTC/USD");
    }

    #[test_case("" => SymbolError::Empty ; "empty")]
    #[test_case("BTCUSD" => SymbolError::Separator("BTCUSD".into()) ; "no separator")]
    #[test_case("BTC/USD/EUR" => SymbolError::Separator("BTC/USD/EUR".into()) ; "two separators")]
    #[test_case("/USD" => SymbolError::EmptyLeg("/USD".into()) ; "empty base")]
    #[test_case("BTC/" => SymbolError::EmptyLeg("BTC/".into()) ; "empty quote")]
    #[test_case("btc/usd" => SymbolError::InvalidCharacter("btc/usd".into()) ; "lowercase")]
    #[test_case("BTC/US1" => SymbolError::InvalidCharacter("BTC/US1".into()) ; "digit")]
    #[test_case(" BTC/USD" => SymbolError::InvalidCharacter(" BTC/USD".into()) ; "whitespace")]
    fn rejects_malformed(input: &str) -> SymbolError {
        Symbol::parse(input).unwrap_err()
    }

    #[test]
    fn normalized_accepts_user_input() {
        let symbol = Symbol::normalized("  eth/usd ").unwrap();
        assert_eq!(symbol.as_str(), "ETH/USD");
    }

    #[test]
    fn serde_round_trips_as_plain_string() {
        let symbol = Symbol::parse("SOL/USDT").unwrap();
        let json = serde_json::to_string(&symbol).unwrap();
        assert_eq!(json, r#""SOL/USDT""#);

        let parsed: Symbol = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, symbol);

        assert!(serde_json::from_str::<Symbol>(r#""SOLUSDT""#).is_err());
    }
}
