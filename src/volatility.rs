//! Blended implied volatility estimator
//!
//! Takes every contract expiring inside a narrow window around 30 days, at
//! most a couple of strikes either side of the money, and reads volatility
//! at the money by averaging ITM/OTM legs that share a strike:
//!
//! ```text
//! call side = mean over (ITM call, OTM put) at same expiry+strike of mid(iv_call, iv_put)
//! put side  = mean over (ITM put, OTM call) at same expiry+strike of mid(iv_put, iv_call)
//! iv        = mid(call side, put side) / 100
//! ```
//!
//! A cut-down cousin of the VIX calculation: the feed already quotes a
//! per-contract IV, so no variance-swap replication is needed.

use chrono::NaiveDate;
use itertools::iproduct;
use tracing::debug;

use crate::error::{ScreenError, ScreenResult};
use crate::source::{ExpirationWindow, QuoteSource};
use crate::{midpoint, OptionContract, Symbol};

/// Blended IV, as a fraction, for the window it was read from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolatilityEstimate {
    pub iv: f64,
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// Mean of the pairwise IV midpoints between `itm` and `otm` legs sharing
/// expiration and strike. `None` when no pair matches.
fn side_average(itm: &[&OptionContract], otm: &[&OptionContract]) -> Option<f64> {
    let (sum, count) = iproduct!(itm.iter(), otm.iter())
        .filter(|(a, b)| a.expiration == b.expiration && a.strike == b.strike)
        .filter(|(a, b)| a.volatility.is_finite() && b.volatility.is_finite())
        .fold((0.0, 0usize), |(sum, count), (a, b)| {
            (sum + midpoint(a.volatility, b.volatility), count + 1)
        });

    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Blend a chain snapshot into a single IV fraction.
///
/// Pure function of the snapshot. Fails with `NotFound` on an empty chain
/// or when either side has no matching strike pair.
pub fn blended_iv(contracts: &[OptionContract]) -> ScreenResult<f64> {
    if contracts.is_empty() {
        return Err(ScreenError::not_found("no contracts to estimate volatility from"));
    }

    let (calls, puts): (Vec<&OptionContract>, Vec<&OptionContract>) =
        contracts.iter().partition(|c| c.is_call());
    let (calls_itm, calls_otm): (Vec<_>, Vec<_>) = calls.into_iter().partition(|c| c.in_the_money);
    let (puts_itm, puts_otm): (Vec<_>, Vec<_>) = puts.into_iter().partition(|c| c.in_the_money);

    let call_side = side_average(&calls_itm, &puts_otm).ok_or_else(|| {
        ScreenError::not_found("no ITM call / OTM put pair shares an expiration and strike")
    })?;
    let put_side = side_average(&puts_itm, &calls_otm).ok_or_else(|| {
        ScreenError::not_found("no ITM put / OTM call pair shares an expiration and strike")
    })?;

    debug!(call_side, put_side, "IV side averages");

    // Feed quotes volatility in percent
    Ok(midpoint(call_side, put_side) / 100.0)
}

/// Fetches the near-term chain and blends it
pub struct VolatilityEstimator<S> {
    source: S,
    window: ExpirationWindow,
}

impl<S: QuoteSource> VolatilityEstimator<S> {
    pub fn new(source: S, window: ExpirationWindow) -> Self {
        Self { source, window }
    }

    pub fn estimate_iv(&self, symbol: &Symbol, as_of: NaiveDate) -> ScreenResult<VolatilityEstimate> {
        let request = self.window.request(as_of, false);
        let contracts: Vec<OptionContract> = self
            .source
            .get_options_chain(symbol, &request)?
            .into_iter()
            .filter(|c| request.contains(c.expiration))
            .collect();

        if contracts.is_empty() {
            return Err(ScreenError::NotFound(format!(
                "Could not find options contracts between {}-{} days",
                self.window.min_days, self.window.max_days
            )));
        }

        let iv = blended_iv(&contracts)?;
        debug!(%symbol, iv, contracts = contracts.len(), "Estimated implied volatility");

        Ok(VolatilityEstimate {
            iv,
            from: request.from,
            to: request.to,
        })
    }
}
