//! Strangle screener
//!
//! Pairs every qualifying OTM call with every qualifying OTM put of the same
//! expiration and keeps the near delta-neutral pairs whose premium-to-risk
//! ratio beats their average delta.
//!
//! Leg filters:
//! - out of the money, volume above the configured minimum
//! - calls with delta in [0.10, 0.40], puts in [-0.40, -0.10]
//!
//! Pair test:
//! ```text
//! premium     = (call.mid + put.mid) * 100
//! risk        = two-sigma risk at the pair's strikes and expiry
//! reward_risk = premium / risk            (infinite when risk is zero)
//! avg_delta   = mid(call.delta, -put.delta)
//! keep if reward_risk > avg_delta
//! ```

use chrono::NaiveDate;
use itertools::iproduct;
use tracing::{debug, info};

use crate::config::ScreenConfig;
use crate::error::ScreenResult;
use crate::risk::RiskModel;
use crate::source::QuoteSource;
use crate::volatility::VolatilityEstimator;
use crate::{midpoint, Money, OptionContract, StrangleCandidate, Symbol};

pub struct StrangleScreener<S> {
    source: S,
    config: ScreenConfig,
}

impl<S: QuoteSource> StrangleScreener<S> {
    pub fn new(source: S, config: ScreenConfig) -> Self {
        Self { source, config }
    }

    /// Screen one ticker as of `as_of`.
    ///
    /// All market data (quote, IV window, screening chain) is fetched up front;
    /// the returned iterator only does arithmetic, so a second call always
    /// sees a fresh snapshot.
    pub fn find_strangle(
        &self,
        symbol: &Symbol,
        as_of: NaiveDate,
    ) -> ScreenResult<impl Iterator<Item = StrangleCandidate>> {
        let current_price = self.source.get_quote(symbol)?.midpoint();
        let estimate =
            VolatilityEstimator::new(&self.source, self.config.iv_window).estimate_iv(symbol, as_of)?;

        info!("IV calculated for {}: {:.4}", symbol, estimate.iv);

        let request = self.config.chain_window.request(as_of, true);
        let chain: Vec<OptionContract> = self
            .source
            .get_options_chain(symbol, &request)?
            .into_iter()
            .filter(|c| request.contains(c.expiration))
            .collect();
        debug!(%symbol, contracts = chain.len(), from = %request.from, to = %request.to, "Fetched chain");

        let risk = RiskModel::new(current_price, estimate.iv, &self.config);
        Ok(screen_chain(symbol.clone(), chain, risk, self.config.clone()))
    }
}

/// Candidate legs split into (calls, puts), chain order preserved
pub fn select_legs(
    chain: Vec<OptionContract>,
    config: &ScreenConfig,
) -> (Vec<OptionContract>, Vec<OptionContract>) {
    chain
        .into_iter()
        .filter(|c| !c.in_the_money && c.volume > config.min_volume && c.delta.is_finite())
        .filter(|c| {
            (c.is_call() && config.call_delta.contains(c.delta))
                || (c.is_put() && config.put_delta.contains(c.delta))
        })
        .partition(|c| c.is_call())
}

/// Lazily pair every call with every put (calls outer, puts inner)
pub fn screen_chain(
    symbol: Symbol,
    chain: Vec<OptionContract>,
    risk: RiskModel,
    config: ScreenConfig,
) -> impl Iterator<Item = StrangleCandidate> {
    let (calls, puts) = select_legs(chain, &config);
    debug!(%symbol, calls = calls.len(), puts = puts.len(), "Candidate legs");

    iproduct!(calls.into_iter(), puts.into_iter())
        .filter_map(move |(call, put)| evaluate_pair(&symbol, call, put, &risk, &config))
}

/// Apply the pairing and reward/risk tests to one call/put pair
pub fn evaluate_pair(
    symbol: &Symbol,
    call: OptionContract,
    put: OptionContract,
    risk_model: &RiskModel,
    config: &ScreenConfig,
) -> Option<StrangleCandidate> {
    if call.expiration != put.expiration
        || (call.delta + put.delta).abs() >= config.max_delta_imbalance
    {
        return None;
    }

    let premium = (call.mid_price() + put.mid_price()) * Money::from_i64(config.contract_multiplier);
    let risk = risk_model.risk_amount(
        call.days_to_expiration,
        risk_model.mid_price(),
        put.strike,
        call.strike,
    );
    let reward_risk = if risk.is_zero() {
        f64::INFINITY
    } else {
        premium.to_f64() / risk.to_f64()
    };
    let avg_delta = midpoint(call.delta, -put.delta);

    if reward_risk <= avg_delta {
        return None;
    }

    Some(StrangleCandidate {
        underlying: symbol.clone(),
        iv: risk_model.iv(),
        call,
        put,
        premium,
        risk,
        reward_risk,
        avg_delta,
    })
}
