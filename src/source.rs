//! Quote source abstraction
//!
//! The screener only ever talks to market data through [`QuoteSource`], so the
//! HTTP client and the in-memory fixtures used by tests are interchangeable.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::ScreenResult;
use crate::{OptionContract, QuoteSnapshot, Symbol};

/// Expiration range expressed in days from the screening date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirationWindow {
    pub min_days: i64,
    pub max_days: i64,
    /// Strikes requested on each side of at-the-money
    pub strike_count: u32,
}

impl ExpirationWindow {
    pub fn new(min_days: i64, max_days: i64, strike_count: u32) -> Self {
        Self {
            min_days,
            max_days,
            strike_count,
        }
    }

    /// Build the chain request for this window as seen from `as_of`
    pub fn request(&self, as_of: NaiveDate, include_quotes: bool) -> ChainRequest {
        ChainRequest {
            from: as_of + Duration::days(self.min_days),
            to: as_of + Duration::days(self.max_days),
            strike_count: self.strike_count,
            include_quotes,
        }
    }
}

/// Parameters of one options-chain fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainRequest {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub strike_count: u32,
    pub include_quotes: bool,
}

impl ChainRequest {
    /// Inclusive on both ends
    pub fn contains(&self, expiration: NaiveDate) -> bool {
        expiration >= self.from && expiration <= self.to
    }
}

/// Market data collaborator.
///
/// Implementations must return `ScreenError::NotFound` when a chain has no
/// contracts in range and `ScreenError::RateLimited` for quota exhaustion,
/// distinct from every other failure.
pub trait QuoteSource {
    fn get_quote(&self, symbol: &Symbol) -> ScreenResult<QuoteSnapshot>;

    fn get_options_chain(
        &self,
        symbol: &Symbol,
        request: &ChainRequest,
    ) -> ScreenResult<Vec<OptionContract>>;
}

impl<S: QuoteSource + ?Sized> QuoteSource for &S {
    fn get_quote(&self, symbol: &Symbol) -> ScreenResult<QuoteSnapshot> {
        (**self).get_quote(symbol)
    }

    fn get_options_chain(
        &self,
        symbol: &Symbol,
        request: &ChainRequest,
    ) -> ScreenResult<Vec<OptionContract>> {
        (**self).get_options_chain(symbol, request)
    }
}
