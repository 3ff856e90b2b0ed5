//! Core data types used across the screener

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Mul};

/// Ticker symbol using Arc<str> for cheap cloning
///
/// Symbols are cloned into every candidate, outcome and queue entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

/// Custom serde for Arc<str>
mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Symbol {
    /// Symbols are stored trimmed and upper-cased
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref().trim().to_uppercase().as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Arithmetic midpoint of two floats
#[inline]
pub fn midpoint(a: f64, b: f64) -> f64 {
    (a + b) / 2.0
}

// ============================================================================
// Money Type - Precise Decimal Arithmetic for Monetary Values
// ============================================================================

/// Money type for prices, strikes and premiums.
///
/// Wraps `rust_decimal::Decimal` so quotes coming off the wire keep their
/// exact cents. Volatility math (square roots) happens in f64 and is brought
/// back with [`Money::from_f64`].
///
/// # Example
/// ```
/// use strangle_screener::Money;
/// let bid = Money::from_f64(1.20);
/// let ask = Money::from_f64(1.30);
/// assert_eq!(Money::midpoint(bid, ask).to_f64(), 1.25);
/// ```
#[derive(Debug, Clone, Copy, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(#[serde(with = "rust_decimal::serde::str")] Decimal);

impl Money {
    /// Zero value
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Create from f64
    /// Note: NaN and infinities collapse to zero
    pub fn from_f64(value: f64) -> Self {
        Money(Decimal::try_from(value).unwrap_or_else(|_| {
            if value.is_nan() || value.is_infinite() {
                Decimal::ZERO
            } else {
                Decimal::from_f64_retain(value).unwrap_or(Decimal::ZERO)
            }
        }))
    }

    /// Convert to f64 for volatility and ratio calculations
    pub fn to_f64(self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        self.0.to_f64().unwrap_or(0.0)
    }

    /// Create from i64 (for whole number values)
    pub fn from_i64(value: i64) -> Self {
        Money(Decimal::from(value))
    }

    pub fn from_decimal(value: Decimal) -> Self {
        Money(value)
    }

    /// Midpoint of a bid/ask pair
    pub fn midpoint(a: Money, b: Money) -> Money {
        Money((a.0 + b.0) / Decimal::TWO)
    }

    /// Check if value is zero
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    /// Round to specified decimal places
    pub fn round_dp(self, dp: u32) -> Self {
        Money(self.0.round_dp(dp))
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Money {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl std::hash::Hash for Money {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl Mul for Money {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self::Output {
        Money(self.0 * rhs.0)
    }
}

impl From<f64> for Money {
    fn from(value: f64) -> Self {
        Money::from_f64(value)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Money::from_i64(value)
    }
}

// ============================================================================
// Market data
// ============================================================================

/// Option type (call or put)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "CALL",
            Self::Put => "PUT",
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One contract from an options-chain snapshot.
///
/// `volatility` is kept on the feed's percentage scale (28.5 means 28.5%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub option_type: OptionType,
    /// Contract symbol as issued by the feed
    pub symbol: String,
    pub description: String,
    pub strike: Money,
    pub expiration: NaiveDate,
    pub days_to_expiration: i64,
    pub in_the_money: bool,
    pub bid: Money,
    pub ask: Money,
    pub volatility: f64,
    pub delta: f64,
    pub volume: u64,
    pub open_interest: u64,
}

impl OptionContract {
    pub fn mid_price(&self) -> Money {
        Money::midpoint(self.bid, self.ask)
    }

    pub fn is_call(&self) -> bool {
        self.option_type == OptionType::Call
    }

    pub fn is_put(&self) -> bool {
        self.option_type == OptionType::Put
    }
}

/// Underlying bid/ask at the moment of fetching
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    pub bid: Money,
    pub ask: Money,
}

impl QuoteSnapshot {
    pub fn new(bid: impl Into<Money>, ask: impl Into<Money>) -> Self {
        Self {
            bid: bid.into(),
            ask: ask.into(),
        }
    }

    pub fn midpoint(&self) -> Money {
        Money::midpoint(self.bid, self.ask)
    }
}

/// A delta-balanced call/put pair that passed the reward/risk test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrangleCandidate {
    pub underlying: Symbol,
    /// Blended IV (fraction) the risk figure was computed with
    pub iv: f64,
    pub call: OptionContract,
    pub put: OptionContract,
    /// Combined mid premium for one contract of each leg
    pub premium: Money,
    /// Dollar loss at a two standard deviation move
    pub risk: Money,
    /// `f64::INFINITY` when risk is zero
    pub reward_risk: f64,
    pub avg_delta: f64,
}

impl StrangleCandidate {
    /// Margin by which reward/risk beats the average delta
    pub fn edge(&self) -> f64 {
        self.reward_risk - self.avg_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_normalised() {
        let symbol = Symbol::new(" aapl ");
        assert_eq!(symbol.as_str(), "AAPL");
        assert_eq!(symbol, Symbol::new("AAPL"));
    }

    #[test]
    fn test_money_precision() {
        let a = Money::from_f64(0.1);
        let b = Money::from_f64(0.2);
        let c = Money::from_f64(0.3);
        assert_eq!(a + b, c, "Money should handle 0.1 + 0.2 = 0.3 correctly");
    }

    #[test]
    fn test_money_midpoint() {
        let mid = Money::midpoint(Money::from_f64(2.10), Money::from_f64(2.15));
        assert_eq!(mid, Money::from_f64(2.125));
    }

    #[test]
    fn test_money_from_nan_is_zero() {
        assert!(Money::from_f64(f64::NAN).is_zero());
    }

    #[test]
    fn test_quote_midpoint() {
        let quote = QuoteSnapshot::new(49.90, 50.10);
        assert_eq!(quote.midpoint().to_f64(), 50.0);
    }

    #[test]
    fn test_option_type_serde() {
        let json = serde_json::to_string(&OptionType::Put).unwrap();
        assert_eq!(json, "\"PUT\"");
        let parsed: OptionType = serde_json::from_str("\"CALL\"").unwrap();
        assert_eq!(parsed, OptionType::Call);
    }
}
