//! Universe driver
//!
//! Screens every ticker of a universe once, then keeps re-screening the ones
//! that failed transiently until they clear or the pass budget runs out.
//!
//! Per ticker attempt:
//! - success: done
//! - `NotFound`: permanent, recorded and never retried
//! - `RateLimited`: sleep with exponential backoff and retry the same ticker,
//!   permanent once the attempt cap is hit
//! - anything else: transient, the ticker joins the retry queue
//!
//! The retry queue is owned by the caller: it is passed into [`UniverseDriver::run`]
//! and handed back inside the [`ScanReport`].

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::RetryConfig;
use crate::screener::StrangleScreener;
use crate::source::QuoteSource;
use crate::{StrangleCandidate, Symbol};

/// Terminal state of one ticker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickerOutcome {
    Succeeded { candidates: usize },
    FailedPermanent { reason: String },
    FailedTransient { reason: String },
}

impl TickerOutcome {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::FailedTransient { .. })
    }
}

impl fmt::Display for TickerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded { candidates } => write!(f, "succeeded ({} candidates)", candidates),
            Self::FailedPermanent { reason } => write!(f, "failed permanently: {}", reason),
            Self::FailedTransient { reason } => write!(f, "failed transiently: {}", reason),
        }
    }
}

/// Which sweep an attempt belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Universe,
    Retry(u32),
}

/// Ordered set of tickers waiting to be re-screened
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryQueue {
    symbols: VecDeque<Symbol>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the symbol was already queued
    pub fn push(&mut self, symbol: Symbol) -> bool {
        if self.contains(&symbol) {
            return false;
        }
        self.symbols.push_back(symbol);
        true
    }

    pub fn remove(&mut self, symbol: &Symbol) -> bool {
        match self.symbols.iter().position(|s| s == symbol) {
            Some(idx) => {
                self.symbols.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.symbols.iter().any(|s| s == symbol)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    /// Copy of the current contents, for iterating while mutating
    pub fn snapshot(&self) -> Vec<Symbol> {
        self.symbols.iter().cloned().collect()
    }
}

impl FromIterator<Symbol> for RetryQueue {
    fn from_iter<I: IntoIterator<Item = Symbol>>(iter: I) -> Self {
        let mut queue = RetryQueue::new();
        for symbol in iter {
            queue.push(symbol);
        }
        queue
    }
}

/// Exponential backoff for rate-limit responses
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub multiplier: f64,
    pub max: Duration,
    pub max_attempts: u32,
}

impl BackoffPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            initial: Duration::from_secs(config.initial_backoff_secs),
            multiplier: config.backoff_multiplier,
            max: Duration::from_secs(config.max_backoff_secs),
            max_attempts: config.max_rate_limit_attempts,
        }
    }

    /// Pause before retry number `attempt` (zero based), `None` once the cap is reached
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = self.multiplier.max(1.0).powi(attempt as i32);
        let secs = (self.initial.as_secs_f64() * factor).min(self.max.as_secs_f64());
        Some(Duration::try_from_secs_f64(secs).unwrap_or(self.max))
    }
}

/// Receives results as the scan progresses
pub trait ScanObserver {
    fn on_candidate(&mut self, _candidate: &StrangleCandidate) {}

    fn on_outcome(&mut self, _symbol: &Symbol, _outcome: &TickerOutcome, _pass: Pass) {}
}

/// Result of a full scan
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Latest outcome per ticker
    pub outcomes: BTreeMap<Symbol, TickerOutcome>,
    pub candidates: usize,
    pub retry_passes: u32,
    /// Tickers still failing after the last retry pass
    pub retry_queue: RetryQueue,
}

impl ScanReport {
    pub fn screened(&self) -> usize {
        self.outcomes.len()
    }

    pub fn permanent_failures(&self) -> Vec<&Symbol> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, TickerOutcome::FailedPermanent { .. }))
            .map(|(s, _)| s)
            .collect()
    }
}

pub struct UniverseDriver<S> {
    screener: StrangleScreener<S>,
    backoff: BackoffPolicy,
    max_retry_passes: u32,
    as_of: NaiveDate,
    sleeper: Box<dyn Fn(Duration)>,
}

impl<S: QuoteSource> UniverseDriver<S> {
    pub fn new(screener: StrangleScreener<S>, retry: &RetryConfig, as_of: NaiveDate) -> Self {
        Self {
            screener,
            backoff: BackoffPolicy::from_config(retry),
            max_retry_passes: retry.max_retry_passes,
            as_of,
            sleeper: Box::new(std::thread::sleep),
        }
    }

    /// Replace the blocking sleep used between rate-limited attempts
    pub fn with_sleeper(mut self, sleeper: impl Fn(Duration) + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    /// Screen `universe`, then drain `queue` (which may carry tickers from an
    /// earlier scan) through retry passes.
    pub fn run<I, O>(&self, universe: I, mut queue: RetryQueue, observer: &mut O) -> ScanReport
    where
        I: IntoIterator<Item = Symbol>,
        O: ScanObserver + ?Sized,
    {
        let mut report = ScanReport::default();
        let mut seen = HashSet::new();

        for symbol in universe {
            if !seen.insert(symbol.clone()) {
                continue;
            }
            let outcome = self.screen_ticker(&symbol, observer);
            if outcome.is_transient() {
                queue.push(symbol.clone());
            } else {
                queue.remove(&symbol);
            }
            self.record(&mut report, symbol, outcome, Pass::Universe, observer);
        }

        while !queue.is_empty() && report.retry_passes < self.max_retry_passes {
            report.retry_passes += 1;
            let pass = report.retry_passes;
            info!("Retry pass {}: {:?}", pass, queue.snapshot());

            for symbol in queue.snapshot() {
                let outcome = self.screen_ticker(&symbol, observer);
                if !outcome.is_transient() {
                    queue.remove(&symbol);
                }
                self.record(&mut report, symbol, outcome, Pass::Retry(pass), observer);
            }
        }

        if !queue.is_empty() {
            warn!(
                "Giving up on {} tickers after {} retry passes",
                queue.len(),
                report.retry_passes
            );
        }

        report.retry_queue = queue;
        report
    }

    fn record<O: ScanObserver + ?Sized>(
        &self,
        report: &mut ScanReport,
        symbol: Symbol,
        outcome: TickerOutcome,
        pass: Pass,
        observer: &mut O,
    ) {
        if let TickerOutcome::Succeeded { candidates } = outcome {
            report.candidates += candidates;
        }
        observer.on_outcome(&symbol, &outcome, pass);
        report.outcomes.insert(symbol, outcome);
    }

    /// One ticker, including any rate-limit waits
    pub fn screen_ticker<O: ScanObserver + ?Sized>(
        &self,
        symbol: &Symbol,
        observer: &mut O,
    ) -> TickerOutcome {
        let mut rate_limited = 0;

        loop {
            match self.screener.find_strangle(symbol, self.as_of) {
                Ok(candidates) => {
                    let mut count = 0;
                    for candidate in candidates {
                        observer.on_candidate(&candidate);
                        count += 1;
                    }
                    return TickerOutcome::Succeeded { candidates: count };
                }
                Err(e) if e.is_rate_limit() => match self.backoff.delay(rate_limited) {
                    Some(pause) => {
                        warn!("Too many requests: 429. Pausing for {:?}", pause);
                        (self.sleeper)(pause);
                        rate_limited += 1;
                    }
                    None => {
                        error!("{} still rate limited after {} attempts", symbol, rate_limited);
                        return TickerOutcome::FailedPermanent {
                            reason: format!("rate limited {} times", rate_limited),
                        };
                    }
                },
                Err(e) if e.is_permanent() => {
                    warn!("Not found error {}: {}", symbol, e);
                    return TickerOutcome::FailedPermanent {
                        reason: e.to_string(),
                    };
                }
                Err(e) => {
                    error!("ERROR: Could not find strangles for {}--{}", symbol, e);
                    return TickerOutcome::FailedTransient {
                        reason: e.to_string(),
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_queue_is_a_set() {
        let mut queue = RetryQueue::new();
        assert!(queue.push(Symbol::new("AAA")));
        assert!(!queue.push(Symbol::new("AAA")));
        assert!(queue.push(Symbol::new("BBB")));
        assert_eq!(queue.len(), 2);

        assert!(queue.remove(&Symbol::new("AAA")));
        assert!(!queue.remove(&Symbol::new("AAA")));
        assert_eq!(queue.snapshot(), vec![Symbol::new("BBB")]);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = BackoffPolicy {
            initial: Duration::from_secs(30),
            multiplier: 2.0,
            max: Duration::from_secs(100),
            max_attempts: 4,
        };
        assert_eq!(policy.delay(0), Some(Duration::from_secs(30)));
        assert_eq!(policy.delay(1), Some(Duration::from_secs(60)));
        assert_eq!(policy.delay(2), Some(Duration::from_secs(100)));
        assert_eq!(policy.delay(3), Some(Duration::from_secs(100)));
        assert_eq!(policy.delay(4), None);
    }

    #[test]
    fn test_backoff_from_default_config() {
        let policy = BackoffPolicy::from_config(&RetryConfig::default());
        assert_eq!(policy.delay(0), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_backoff_with_huge_cap_does_not_overflow() {
        let policy = BackoffPolicy {
            initial: Duration::from_secs(30),
            multiplier: 2.0,
            max: Duration::from_secs(u64::MAX),
            max_attempts: 200,
        };
        assert_eq!(policy.delay(199), Some(Duration::from_secs(u64::MAX)));
    }

    #[test]
    fn test_outcome_display() {
        let outcome = TickerOutcome::Succeeded { candidates: 3 };
        assert_eq!(outcome.to_string(), "succeeded (3 candidates)");
        assert!(!outcome.is_transient());
    }
}
