//! Universe scan command

use anyhow::{Context, Result};
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use std::path::PathBuf;
use strangle_screener::driver::{Pass, RetryQueue, ScanObserver, TickerOutcome, UniverseDriver};
use strangle_screener::report::{render_candidate, render_header, render_summary};
use strangle_screener::screener::StrangleScreener;
use strangle_screener::tdameritrade::TdAmeritradeClient;
use strangle_screener::universe::{load_universe, MarketCapFilter};
use strangle_screener::{Config, StrangleCandidate, Symbol};
use tracing::{info, warn};

/// Prints candidates above the progress bar as they are found
struct ConsoleObserver<'a> {
    pb: &'a ProgressBar,
    last_header: Option<Symbol>,
}

impl ScanObserver for ConsoleObserver<'_> {
    fn on_candidate(&mut self, candidate: &StrangleCandidate) {
        if self.last_header.as_ref() != Some(&candidate.underlying) {
            self.pb
                .println(render_header(&candidate.underlying, candidate.iv));
            self.last_header = Some(candidate.underlying.clone());
        }
        self.pb.println(render_candidate(candidate));
    }

    fn on_outcome(&mut self, symbol: &Symbol, outcome: &TickerOutcome, pass: Pass) {
        // next attempt of the same ticker gets a fresh header
        self.last_header = None;
        match pass {
            Pass::Universe => self.pb.inc(1),
            Pass::Retry(n) => self.pb.set_message(format!("retry pass {}", n)),
        }
        info!("{} {}", symbol, outcome);
    }
}

pub fn run(
    config_path: Option<String>,
    as_of: NaiveDate,
    files: Vec<String>,
    legacy_filter: bool,
    min_market_cap: Option<f64>,
    max_retry_passes: Option<u32>,
) -> Result<()> {
    let mut config = Config::load(config_path)?;

    if !files.is_empty() {
        config.universe.files = files.into_iter().map(PathBuf::from).collect();
    }
    if legacy_filter {
        config.universe.filter = MarketCapFilter::Legacy;
    }
    if let Some(min) = min_market_cap {
        config.universe.min_market_cap = min;
    }
    if let Some(passes) = max_retry_passes {
        config.retry.max_retry_passes = passes;
    }

    info!("Starting scan as of {}", as_of);
    info!("Universe files: {:?}", config.universe.files);
    info!("Market-cap filter: {:?}", config.universe.filter);

    let mut universe = Vec::new();
    for file in &config.universe.files {
        let rows = load_universe(file, &config.universe)?;
        universe.extend(rows.into_iter().map(|row| row.symbol));
    }
    let universe: Vec<Symbol> = universe.into_iter().unique().collect();
    if universe.is_empty() {
        warn!("No tickers passed the market-cap filter");
    }
    println!("Screening {} tickers as of {}", universe.len(), as_of);

    let client = TdAmeritradeClient::new(&config.api).context("Failed to create API client")?;
    let screener = StrangleScreener::new(client, config.screen.clone());
    let driver = UniverseDriver::new(screener, &config.retry, as_of);

    let pb = ProgressBar::new(universe.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("#>-"),
    );

    let mut observer = ConsoleObserver {
        pb: &pb,
        last_header: None,
    };
    let report = driver.run(universe, RetryQueue::new(), &mut observer);
    pb.finish_with_message("done");

    println!();
    println!("{}", render_summary(&report));
    info!(
        "Scan finished: {} tickers, {} candidates, {} still failing",
        report.screened(),
        report.candidates,
        report.retry_queue.len()
    );

    Ok(())
}
