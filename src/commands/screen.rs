//! Single-ticker commands

use anyhow::{Context, Result};
use chrono::NaiveDate;
use strangle_screener::report::{render_candidate, render_header};
use strangle_screener::screener::StrangleScreener;
use strangle_screener::tdameritrade::TdAmeritradeClient;
use strangle_screener::volatility::VolatilityEstimator;
use strangle_screener::{Config, Symbol};
use tracing::info;

pub fn run(config_path: Option<String>, as_of: NaiveDate, symbol: String) -> Result<()> {
    let config = Config::load(config_path)?;
    let client = TdAmeritradeClient::new(&config.api).context("Failed to create API client")?;
    let symbol = Symbol::new(symbol);

    info!("Screening {} as of {}", symbol, as_of);
    let screener = StrangleScreener::new(client, config.screen.clone());
    let candidates: Vec<_> = screener
        .find_strangle(&symbol, as_of)
        .with_context(|| format!("Could not find strangles for {}", symbol))?
        .collect();

    if let Some(first) = candidates.first() {
        println!("{}", render_header(&symbol, first.iv));
    }
    for candidate in &candidates {
        println!("{}", render_candidate(candidate));
    }
    info!("{} candidates for {}", candidates.len(), symbol);

    Ok(())
}

pub fn run_iv(config_path: Option<String>, as_of: NaiveDate, symbol: String) -> Result<()> {
    let config = Config::load(config_path)?;
    let client = TdAmeritradeClient::new(&config.api).context("Failed to create API client")?;
    let symbol = Symbol::new(symbol);

    let estimate = VolatilityEstimator::new(&client, config.screen.iv_window)
        .estimate_iv(&symbol, as_of)
        .with_context(|| format!("Could not estimate IV for {}", symbol))?;

    println!(
        "{}: IV {:.4} ({:.2}%) from expirations {} to {}",
        symbol,
        estimate.iv,
        estimate.iv * 100.0,
        estimate.from,
        estimate.to
    );

    Ok(())
}
