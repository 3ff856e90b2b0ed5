//! Integration tests for the strangle screener
//!
//! These tests drive the screener and the universe driver end to end against
//! an in-memory quote source.

use approx::assert_relative_eq;
use chrono::NaiveDate;
use rust_decimal_macros::dec;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use strangle_screener::config::{RetryConfig, ScreenConfig};
use strangle_screener::driver::{Pass, RetryQueue, ScanObserver, TickerOutcome, UniverseDriver};
use strangle_screener::risk::RiskModel;
use strangle_screener::screener::StrangleScreener;
use strangle_screener::source::{ChainRequest, QuoteSource};
use strangle_screener::universe::{load_universe, MarketCapFilter};
use strangle_screener::volatility::VolatilityEstimator;
use strangle_screener::{
    Money, OptionContract, OptionType, QuoteSnapshot, ScreenError, ScreenResult,
    StrangleCandidate, Symbol,
};

// =============================================================================
// Test Utilities
// =============================================================================

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 17).unwrap()
}

fn feb_expiry() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 2, 16).unwrap()
}

fn mar_expiry() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
}

#[allow(clippy::too_many_arguments)]
fn contract(
    option_type: OptionType,
    expiration: NaiveDate,
    strike: i64,
    in_the_money: bool,
    volatility: f64,
    delta: f64,
    bid: f64,
    ask: f64,
    volume: u64,
) -> OptionContract {
    OptionContract {
        option_type,
        symbol: format!("XYZ_{}{}{}", expiration.format("%m%d%y"), option_type.as_str(), strike),
        description: format!("XYZ {} {} {}", expiration.format("%b %d %Y"), strike, option_type),
        strike: Money::from_i64(strike),
        expiration,
        days_to_expiration: (expiration - as_of()).num_days(),
        in_the_money,
        bid: Money::from_f64(bid),
        ask: Money::from_f64(ask),
        volatility,
        delta,
        volume,
        open_interest: 1_000,
    }
}

/// Chain for an underlying trading at 50 with one February expiration
/// inside both windows and a lone March call outside the IV window.
///
/// Blended IV: call side 31.0, put side (29.25 + 30.25) / 2 = 29.75,
/// so (31.0 + 29.75) / 2 / 100 = 0.30375.
fn generate_mock_chain() -> Vec<OptionContract> {
    use OptionType::{Call, Put};
    let feb = feb_expiry();
    vec![
        // ITM call / OTM put at 45
        contract(Call, feb, 45, true, 31.0, 0.78, 5.8, 6.2, 150),
        contract(Put, feb, 45, false, 31.0, -0.20, 0.9, 1.1, 400),
        // ITM puts / OTM calls at 55 and 60
        contract(Put, feb, 55, true, 29.5, -0.75, 5.7, 6.1, 120),
        contract(Call, feb, 55, false, 29.0, 0.22, 1.0, 1.2, 500),
        contract(Put, feb, 60, true, 30.5, -0.88, 10.2, 10.6, 90),
        contract(Call, feb, 60, false, 30.0, 0.12, 0.4, 0.5, 300),
        // Too far OTM for the put delta band
        contract(Put, feb, 40, false, 33.0, -0.09, 0.3, 0.4, 250),
        // Balanced against the 45 put but a different expiration
        contract(Call, mar_expiry(), 57, false, 28.0, 0.20, 1.3, 1.5, 200),
    ]
}

/// Failure the mock source returns instead of data
#[derive(Debug, Clone, Copy)]
enum Failure {
    NotFound,
    RateLimited,
    Network,
}

impl Failure {
    fn into_error(self) -> ScreenError {
        match self {
            Failure::NotFound => ScreenError::not_found("no chain"),
            Failure::RateLimited => ScreenError::RateLimited,
            Failure::Network => ScreenError::Network("connection reset".into()),
        }
    }
}

/// In-memory quote source with scripted per-symbol failures.
///
/// Symbols without a chain return an empty one, which surfaces as `NotFound`.
#[derive(Default)]
struct MockQuoteSource {
    chains: HashMap<Symbol, Vec<OptionContract>>,
    failures: RefCell<HashMap<Symbol, VecDeque<Failure>>>,
    quote_calls: RefCell<HashMap<Symbol, usize>>,
    /// Return the whole chain regardless of the requested dates
    ignore_window: bool,
}

impl MockQuoteSource {
    fn with_chain(mut self, symbol: &str, chain: Vec<OptionContract>) -> Self {
        self.chains.insert(Symbol::new(symbol), chain);
        self
    }

    fn failing(self, symbol: &str, failures: &[Failure]) -> Self {
        self.failures
            .borrow_mut()
            .insert(Symbol::new(symbol), failures.iter().copied().collect());
        self
    }

    fn ignoring_window(mut self) -> Self {
        self.ignore_window = true;
        self
    }

    fn quote_calls(&self, symbol: &str) -> usize {
        self.quote_calls
            .borrow()
            .get(&Symbol::new(symbol))
            .copied()
            .unwrap_or(0)
    }
}

impl QuoteSource for MockQuoteSource {
    fn get_quote(&self, symbol: &Symbol) -> ScreenResult<QuoteSnapshot> {
        *self.quote_calls.borrow_mut().entry(symbol.clone()).or_default() += 1;

        let scripted = self
            .failures
            .borrow_mut()
            .get_mut(symbol)
            .and_then(|queue| queue.pop_front());
        if let Some(failure) = scripted {
            return Err(failure.into_error());
        }

        Ok(QuoteSnapshot::new(Money::from_i64(49), Money::from_i64(51)))
    }

    fn get_options_chain(
        &self,
        symbol: &Symbol,
        request: &ChainRequest,
    ) -> ScreenResult<Vec<OptionContract>> {
        Ok(self
            .chains
            .get(symbol)
            .map(|chain| {
                chain
                    .iter()
                    .filter(|c| self.ignore_window || request.contains(c.expiration))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[derive(Default)]
struct RecordingObserver {
    candidates: Vec<StrangleCandidate>,
    outcomes: Vec<(Symbol, TickerOutcome, Pass)>,
}

impl ScanObserver for RecordingObserver {
    fn on_candidate(&mut self, candidate: &StrangleCandidate) {
        self.candidates.push(candidate.clone());
    }

    fn on_outcome(&mut self, symbol: &Symbol, outcome: &TickerOutcome, pass: Pass) {
        self.outcomes.push((symbol.clone(), outcome.clone(), pass));
    }
}

fn symbols(list: &[&str]) -> Vec<Symbol> {
    list.iter().map(Symbol::new).collect()
}

/// Driver over `source` whose sleeps are recorded instead of slept
fn recording_driver(
    source: &MockQuoteSource,
    retry: RetryConfig,
) -> (UniverseDriver<&MockQuoteSource>, Rc<RefCell<Vec<Duration>>>) {
    let sleeps = Rc::new(RefCell::new(Vec::new()));
    let recorded = Rc::clone(&sleeps);
    let screener = StrangleScreener::new(source, ScreenConfig::default());
    let driver = UniverseDriver::new(screener, &retry, as_of())
        .with_sleeper(move |pause| recorded.borrow_mut().push(pause));
    (driver, sleeps)
}

// =============================================================================
// Volatility Estimator Tests
// =============================================================================

#[test]
fn test_estimate_iv_from_window() {
    let source = MockQuoteSource::default().with_chain("XYZ", generate_mock_chain());
    let estimator = VolatilityEstimator::new(&source, ScreenConfig::default().iv_window);

    let estimate = estimator.estimate_iv(&Symbol::new("XYZ"), as_of()).unwrap();
    assert_relative_eq!(estimate.iv, 0.30375, epsilon = 1e-12);
    assert_eq!(estimate.from, NaiveDate::from_ymd_opt(2024, 2, 9).unwrap());
    assert_eq!(estimate.to, NaiveDate::from_ymd_opt(2024, 2, 23).unwrap());
}

#[test]
fn test_estimate_iv_empty_window_is_not_found() {
    let march_only: Vec<_> = generate_mock_chain()
        .into_iter()
        .filter(|c| c.expiration == mar_expiry())
        .collect();
    let source = MockQuoteSource::default().with_chain("XYZ", march_only);
    let estimator = VolatilityEstimator::new(&source, ScreenConfig::default().iv_window);

    match estimator.estimate_iv(&Symbol::new("XYZ"), as_of()) {
        Err(ScreenError::NotFound(msg)) => assert!(msg.contains("23-37")),
        other => panic!("expected NotFound, got {:?}", other),
    }
}

// =============================================================================
// Risk Model Tests
// =============================================================================

#[test]
fn test_risk_model_for_symbol_estimates_iv_lazily() {
    let source = MockQuoteSource::default().with_chain("XYZ", generate_mock_chain());
    let config = ScreenConfig::default();

    let model = RiskModel::for_symbol(&source, &Symbol::new("XYZ"), as_of(), None, &config).unwrap();
    assert_eq!(model.mid_price(), Money::from_i64(50));
    assert_relative_eq!(model.iv(), 0.30375, epsilon = 1e-12);
    assert_relative_eq!(model.one_std_dev(30), 4.354_121, epsilon = 1e-6);

    let risk = model.risk_amount(30, model.mid_price(), Money::from_i64(45), Money::from_i64(55));
    assert_relative_eq!(risk.to_f64(), 370.8242, epsilon = 1e-9);
}

#[test]
fn test_risk_model_with_supplied_iv_skips_chain() {
    // No chain at all: estimating IV would fail
    let source = MockQuoteSource::default();
    let config = ScreenConfig::default();

    let model =
        RiskModel::for_symbol(&source, &Symbol::new("XYZ"), as_of(), Some(0.25), &config).unwrap();
    assert_relative_eq!(model.iv(), 0.25);
}

// =============================================================================
// Screener Tests
// =============================================================================

#[test]
fn test_find_strangle_end_to_end() {
    let source = MockQuoteSource::default().with_chain("XYZ", generate_mock_chain());
    let screener = StrangleScreener::new(&source, ScreenConfig::default());

    let candidates: Vec<_> = screener
        .find_strangle(&Symbol::new("XYZ"), as_of())
        .unwrap()
        .collect();

    assert_eq!(candidates.len(), 1);
    let c = &candidates[0];
    assert_eq!(c.call.strike, Money::from_i64(55));
    assert_eq!(c.put.strike, Money::from_i64(45));
    assert_eq!(c.premium, Money::from_decimal(dec!(210.00)));
    assert_relative_eq!(c.risk.to_f64(), 370.8242, epsilon = 1e-9);
    assert_relative_eq!(c.reward_risk, 210.0 / 370.8242, epsilon = 1e-9);
    assert_relative_eq!(c.avg_delta, 0.21, epsilon = 1e-12);
    assert_relative_eq!(c.iv, 0.30375, epsilon = 1e-12);
    assert_eq!(source.quote_calls("XYZ"), 1);
}

#[test]
fn test_candidates_share_expiration_and_are_delta_balanced() {
    let source = MockQuoteSource::default().with_chain("XYZ", generate_mock_chain());
    let screener = StrangleScreener::new(&source, ScreenConfig::default());

    for c in screener.find_strangle(&Symbol::new("XYZ"), as_of()).unwrap() {
        assert_eq!(c.call.expiration, c.put.expiration);
        assert!((c.call.delta + c.put.delta).abs() < 0.05);
        assert!(c.reward_risk > c.avg_delta);
        assert!(!c.call.in_the_money && !c.put.in_the_money);
    }
}

#[test]
fn test_find_strangle_drops_expirations_outside_window() {
    use OptionType::{Call, Put};
    // Balanced, rich pair 93 days out, past the 25-50 day window
    let april = NaiveDate::from_ymd_opt(2024, 4, 19).unwrap();
    let mut chain = generate_mock_chain();
    chain.push(contract(Call, april, 60, false, 30.0, 0.20, 5.0, 5.2, 300));
    chain.push(contract(Put, april, 40, false, 30.0, -0.18, 5.0, 5.2, 300));

    let source = MockQuoteSource::default()
        .with_chain("XYZ", chain)
        .ignoring_window();
    let screener = StrangleScreener::new(&source, ScreenConfig::default());

    let candidates: Vec<_> = screener
        .find_strangle(&Symbol::new("XYZ"), as_of())
        .unwrap()
        .collect();

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].call.expiration, feb_expiry());
}

#[test]
fn test_find_strangle_without_chain_is_not_found() {
    let source = MockQuoteSource::default();
    let screener = StrangleScreener::new(&source, ScreenConfig::default());

    let err = screener
        .find_strangle(&Symbol::new("NONE"), as_of())
        .err()
        .unwrap();
    assert!(err.is_permanent());
}

// =============================================================================
// Universe Driver Tests
// =============================================================================

#[test]
fn test_driver_classifies_outcomes() {
    let source = MockQuoteSource::default()
        .with_chain("GOOD", generate_mock_chain())
        .with_chain("FLAKY", generate_mock_chain())
        .failing("FLAKY", &[Failure::Network]);
    let (driver, sleeps) = recording_driver(&source, RetryConfig::default());
    let mut observer = RecordingObserver::default();

    let report = driver.run(
        symbols(&["GOOD", "MISSING", "FLAKY"]),
        RetryQueue::new(),
        &mut observer,
    );

    assert_eq!(report.screened(), 3);
    assert_eq!(report.candidates, 2);
    assert_eq!(report.retry_passes, 1);
    assert!(report.retry_queue.is_empty());
    assert!(sleeps.borrow().is_empty());

    assert_eq!(
        report.outcomes[&Symbol::new("FLAKY")],
        TickerOutcome::Succeeded { candidates: 1 }
    );
    assert!(matches!(
        report.outcomes[&Symbol::new("MISSING")],
        TickerOutcome::FailedPermanent { .. }
    ));
    assert_eq!(report.permanent_failures(), vec![&Symbol::new("MISSING")]);

    // MISSING is attempted once, FLAKY once per pass
    assert_eq!(source.quote_calls("MISSING"), 1);
    assert_eq!(source.quote_calls("FLAKY"), 2);

    let passes: Vec<_> = observer
        .outcomes
        .iter()
        .map(|(s, _, pass)| (s.as_str().to_string(), *pass))
        .collect();
    assert_eq!(
        passes,
        vec![
            ("GOOD".to_string(), Pass::Universe),
            ("MISSING".to_string(), Pass::Universe),
            ("FLAKY".to_string(), Pass::Universe),
            ("FLAKY".to_string(), Pass::Retry(1)),
        ]
    );
    assert_eq!(observer.candidates.len(), 2);
}

#[test]
fn test_driver_backs_off_on_rate_limit_and_retries_same_ticker() {
    let source = MockQuoteSource::default()
        .with_chain("GOOD", generate_mock_chain())
        .failing("GOOD", &[Failure::RateLimited, Failure::RateLimited]);
    let (driver, sleeps) = recording_driver(&source, RetryConfig::default());
    let mut observer = RecordingObserver::default();

    let report = driver.run(symbols(&["GOOD"]), RetryQueue::new(), &mut observer);

    assert_eq!(
        report.outcomes[&Symbol::new("GOOD")],
        TickerOutcome::Succeeded { candidates: 1 }
    );
    assert_eq!(
        *sleeps.borrow(),
        vec![Duration::from_secs(30), Duration::from_secs(60)]
    );
    assert_eq!(report.retry_passes, 0);
    assert_eq!(source.quote_calls("GOOD"), 3);
}

#[test]
fn test_driver_gives_up_after_rate_limit_cap() {
    let source = MockQuoteSource::default()
        .with_chain("HOT", generate_mock_chain())
        .failing("HOT", &[Failure::RateLimited; 3]);
    let retry = RetryConfig {
        max_rate_limit_attempts: 2,
        ..RetryConfig::default()
    };
    let (driver, sleeps) = recording_driver(&source, retry);
    let mut observer = RecordingObserver::default();

    let report = driver.run(symbols(&["HOT"]), RetryQueue::new(), &mut observer);

    assert!(matches!(
        report.outcomes[&Symbol::new("HOT")],
        TickerOutcome::FailedPermanent { .. }
    ));
    assert_eq!(sleeps.borrow().len(), 2);
    assert!(report.retry_queue.is_empty());
}

#[test]
fn test_driver_stops_after_max_retry_passes() {
    let source = MockQuoteSource::default()
        .with_chain("DOWN", generate_mock_chain())
        .failing("DOWN", &[Failure::Network; 10]);
    let retry = RetryConfig {
        max_retry_passes: 3,
        ..RetryConfig::default()
    };
    let (driver, _) = recording_driver(&source, retry);
    let mut observer = RecordingObserver::default();

    let report = driver.run(symbols(&["DOWN"]), RetryQueue::new(), &mut observer);

    assert_eq!(report.retry_passes, 3);
    assert!(report.retry_queue.contains(&Symbol::new("DOWN")));
    assert_eq!(report.retry_queue.len(), 1);
    assert!(report.outcomes[&Symbol::new("DOWN")].is_transient());
    assert_eq!(source.quote_calls("DOWN"), 4);
}

#[test]
fn test_driver_drains_queue_passed_in() {
    let source = MockQuoteSource::default().with_chain("LEFT", generate_mock_chain());
    let (driver, _) = recording_driver(&source, RetryConfig::default());
    let mut observer = RecordingObserver::default();
    let queue: RetryQueue = symbols(&["LEFT"]).into_iter().collect();

    let report = driver.run(Vec::new(), queue, &mut observer);

    assert_eq!(report.retry_passes, 1);
    assert!(report.retry_queue.is_empty());
    assert_eq!(
        observer.outcomes[0].2,
        Pass::Retry(1),
        "queued ticker is screened in the first retry pass"
    );
}

#[test]
fn test_driver_screens_duplicates_once() {
    let source = MockQuoteSource::default().with_chain("XYZ", generate_mock_chain());
    let (driver, _) = recording_driver(&source, RetryConfig::default());
    let mut observer = RecordingObserver::default();

    let report = driver.run(symbols(&["XYZ", "xyz", "XYZ"]), RetryQueue::new(), &mut observer);

    assert_eq!(report.screened(), 1);
    assert_eq!(source.quote_calls("XYZ"), 1);
}

#[test]
fn test_queued_ticker_is_queued_once() {
    let source = MockQuoteSource::default()
        .with_chain("FLAKY", generate_mock_chain())
        .failing("FLAKY", &[Failure::Network, Failure::Network]);
    let (driver, _) = recording_driver(&source, RetryConfig::default());
    let mut observer = RecordingObserver::default();
    // Already queued from an earlier scan and failing again in this one
    let queue: RetryQueue = symbols(&["FLAKY"]).into_iter().collect();

    let report = driver.run(symbols(&["FLAKY"]), queue, &mut observer);

    assert_eq!(report.retry_passes, 2);
    assert!(report.retry_queue.is_empty());
    // universe pass, failing retry pass, succeeding retry pass
    assert_eq!(source.quote_calls("FLAKY"), 3);
}

#[test]
fn test_queued_ticker_leaves_queue_after_universe_success() {
    let source = MockQuoteSource::default().with_chain("GOOD", generate_mock_chain());
    let (driver, _) = recording_driver(&source, RetryConfig::default());
    let mut observer = RecordingObserver::default();
    let queue: RetryQueue = symbols(&["GOOD"]).into_iter().collect();

    let report = driver.run(symbols(&["GOOD"]), queue, &mut observer);

    assert_eq!(source.quote_calls("GOOD"), 1);
    assert_eq!(report.retry_passes, 0);
    assert_eq!(report.candidates, 1);
    assert_eq!(observer.candidates.len(), 1);
    assert!(report.retry_queue.is_empty());
}

#[test]
fn test_queued_ticker_leaves_queue_after_not_found() {
    // No chain: the universe attempt ends in NotFound
    let source = MockQuoteSource::default();
    let (driver, _) = recording_driver(&source, RetryConfig::default());
    let mut observer = RecordingObserver::default();
    let queue: RetryQueue = symbols(&["GONE"]).into_iter().collect();

    let report = driver.run(symbols(&["GONE"]), queue, &mut observer);

    assert_eq!(source.quote_calls("GONE"), 1);
    assert_eq!(report.retry_passes, 0);
    assert!(report.retry_queue.is_empty());
    let passes: Vec<Pass> = observer.outcomes.iter().map(|(_, _, pass)| *pass).collect();
    assert_eq!(passes, vec![Pass::Universe]);
}

#[test]
fn test_not_found_is_never_queued() {
    let source = MockQuoteSource::default()
        .with_chain("GONE", generate_mock_chain())
        .failing("GONE", &[Failure::NotFound]);
    let (driver, _) = recording_driver(&source, RetryConfig::default());
    let mut observer = RecordingObserver::default();

    let report = driver.run(symbols(&["GONE"]), RetryQueue::new(), &mut observer);

    assert_eq!(report.retry_passes, 0);
    assert!(report.retry_queue.is_empty());
    assert_eq!(source.quote_calls("GONE"), 1);
}

// =============================================================================
// Universe Loading Tests
// =============================================================================

#[test]
fn test_load_universe_from_exchange_export() {
    let path = std::env::temp_dir().join(format!("strangle_universe_{}.csv", std::process::id()));
    std::fs::write(
        &path,
        "\"Symbol\",\"Name\",\"LastSale\",\"MarketCap\",\"IPOyear\"\n\
         \"BIG\",\"Big Co\",\"120.5\",\"$45.2B\",\"1999\"\n\
         \"MID\",\"Mid Co\",\"40.1\",\"$3.4B\",\"2005\"\n\
         \"SML\",\"Small Co\",\"4.2\",\"$612.3M\",\"2015\"\n",
    )
    .unwrap();

    let mut config = strangle_screener::config::UniverseConfig::default();
    let numeric = load_universe(&path, &config).unwrap();
    assert_eq!(
        numeric.iter().map(|r| r.symbol.as_str()).collect::<Vec<_>>(),
        vec!["BIG", "MID"]
    );

    // The legacy heuristic rejects "$3.4B": short string, leading digit not above 3
    config.filter = MarketCapFilter::Legacy;
    let legacy = load_universe(&path, &config).unwrap();
    assert_eq!(
        legacy.iter().map(|r| r.symbol.as_str()).collect::<Vec<_>>(),
        vec!["BIG"]
    );

    std::fs::remove_file(&path).ok();
}
