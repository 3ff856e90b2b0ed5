//! Two-sigma risk model for short strangles
//!
//! One standard deviation of the underlying by expiration:
//! ```text
//! std_dev = mid_price * iv * sqrt(days_to_expiration / 365)
//! ```
//!
//! The risk of a strangle is the larger of the two breaches a
//! `std_dev_multiple` move (2 by default) would cause, per 100-share contract:
//! ```text
//! upside   = max(0, price + 2*std_dev - call_strike) * 100
//! downside = max(0, put_strike - (price - 2*std_dev)) * 100
//! risk     = max(upside, downside)
//! ```
//!
//! The model is built from a quote midpoint and an IV that the caller already
//! holds, so a screening pass prices every pair off one consistent snapshot.

use chrono::NaiveDate;
use tracing::debug;

use crate::config::ScreenConfig;
use crate::error::ScreenResult;
use crate::source::QuoteSource;
use crate::volatility::VolatilityEstimator;
use crate::{Money, Symbol};

/// One standard deviation of price move over `days_to_expiration`
pub fn one_std_dev(mid_price: f64, iv: f64, days_to_expiration: i64, days_per_year: f64) -> f64 {
    let days = days_to_expiration.max(0) as f64;
    mid_price * iv * (days / days_per_year).sqrt()
}

/// Worst per-contract loss if the underlying moves `std_dev_multiple`
/// standard deviations either way
pub fn risk_amount(
    current_price: f64,
    std_dev: f64,
    std_dev_multiple: f64,
    put_strike: f64,
    call_strike: f64,
    contract_multiplier: f64,
) -> f64 {
    let band = std_dev * std_dev_multiple;
    let upside = (current_price + band - call_strike).max(0.0) * contract_multiplier;
    let downside = (put_strike - (current_price - band)).max(0.0) * contract_multiplier;
    upside.max(downside)
}

#[derive(Debug, Clone)]
pub struct RiskModel {
    mid_price: Money,
    iv: f64,
    std_dev_multiple: f64,
    contract_multiplier: i64,
    days_per_year: f64,
}

impl RiskModel {
    pub fn new(mid_price: Money, iv: f64, config: &ScreenConfig) -> Self {
        Self {
            mid_price,
            iv,
            std_dev_multiple: config.std_dev_multiple,
            contract_multiplier: config.contract_multiplier,
            days_per_year: config.days_per_year,
        }
    }

    /// Fetch the quote for `symbol` and, when `iv` is not supplied, estimate
    /// it from the near-term chain.
    ///
    /// Convenience for one-off callers. The screener never goes through
    /// here: it passes the midpoint and IV it already fetched to [`RiskModel::new`].
    pub fn for_symbol<S: QuoteSource>(
        source: &S,
        symbol: &Symbol,
        as_of: NaiveDate,
        iv: Option<f64>,
        config: &ScreenConfig,
    ) -> ScreenResult<Self> {
        let mid_price = source.get_quote(symbol)?.midpoint();
        let iv = match iv {
            Some(iv) => iv,
            None => {
                VolatilityEstimator::new(source, config.iv_window)
                    .estimate_iv(symbol, as_of)?
                    .iv
            }
        };
        debug!(%symbol, %mid_price, iv, "Risk model ready");
        Ok(Self::new(mid_price, iv, config))
    }

    pub fn mid_price(&self) -> Money {
        self.mid_price
    }

    pub fn iv(&self) -> f64 {
        self.iv
    }

    pub fn one_std_dev(&self, days_to_expiration: i64) -> f64 {
        one_std_dev(
            self.mid_price.to_f64(),
            self.iv,
            days_to_expiration,
            self.days_per_year,
        )
    }

    pub fn risk_amount(
        &self,
        days_to_expiration: i64,
        current_price: Money,
        put_strike: Money,
        call_strike: Money,
    ) -> Money {
        let risk = risk_amount(
            current_price.to_f64(),
            self.one_std_dev(days_to_expiration),
            self.std_dev_multiple,
            put_strike.to_f64(),
            call_strike.to_f64(),
            self.contract_multiplier as f64,
        );
        Money::from_f64(risk).round_dp(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_std_dev_reference_values() {
        let sd = one_std_dev(50.0, 0.40, 30, 365.0);
        // 50 * 0.40 * sqrt(30/365)
        assert_relative_eq!(sd, 5.733_822, epsilon = 1e-6);
    }

    #[test]
    fn test_std_dev_monotonic() {
        let mut prev = 0.0;
        for days in [1, 7, 30, 45, 90] {
            let sd = one_std_dev(100.0, 0.25, days, 365.0);
            assert!(sd > prev, "std dev should grow with time");
            prev = sd;
        }

        let low = one_std_dev(100.0, 0.20, 30, 365.0);
        let high = one_std_dev(100.0, 0.30, 30, 365.0);
        assert!(high > low, "std dev should grow with iv");
    }

    #[test]
    fn test_std_dev_expired() {
        assert_eq!(one_std_dev(100.0, 0.25, 0, 365.0), 0.0);
        assert_eq!(one_std_dev(100.0, 0.25, -3, 365.0), 0.0);
    }

    #[test]
    fn test_risk_upside_breach() {
        let sd = one_std_dev(50.0, 0.40, 30, 365.0);
        let risk = risk_amount(50.0, sd, 2.0, 40.0, 60.0, 100.0);

        // upside: (50 + 11.4676 - 60) * 100, downside clipped to zero
        assert_relative_eq!(risk, 146.76, epsilon = 0.01);
    }

    #[test]
    fn test_risk_downside_breach() {
        let risk = risk_amount(100.0, 5.0, 2.0, 95.0, 120.0, 100.0);
        // downside: 95 - (100 - 10) = 5 per share
        assert_relative_eq!(risk, 500.0, epsilon = 1e-9);
    }

    #[test]
    fn test_risk_zero_at_band_edges() {
        let sd = 4.0;
        let risk = risk_amount(100.0, sd, 2.0, 100.0 - 2.0 * sd, 100.0 + 2.0 * sd, 100.0);
        assert_eq!(risk, 0.0);
    }

    #[test]
    fn test_model_matches_free_functions() {
        let config = ScreenConfig::default();
        let model = RiskModel::new(Money::from_i64(50), 0.40, &config);

        assert_relative_eq!(model.one_std_dev(30), one_std_dev(50.0, 0.40, 30, 365.0));

        let risk = model.risk_amount(30, Money::from_i64(50), Money::from_i64(40), Money::from_i64(60));
        assert_relative_eq!(risk.to_f64(), 146.76, epsilon = 0.01);
    }
}
