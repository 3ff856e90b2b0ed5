//! Ticker universe loading and market-cap pre-filter
//!
//! Reads exchange listing exports (AMEX, NASDAQ, NYSE screener CSVs) and keeps
//! the tickers large enough to have a liquid options market.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use crate::config::UniverseConfig;
use crate::Symbol;

/// How the market-cap column is compared against the minimum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketCapFilter {
    /// Parse the dollar amount and compare against `min_market_cap`
    #[default]
    Numeric,
    /// String heuristic of the original screen: contains `B` and either
    /// longer than six characters or first digit above 3
    Legacy,
}

/// Market capitalization in dollars, parsed from strings like `$2.5B`
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct MarketCap(pub f64);

impl MarketCap {
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim().trim_start_matches('$').replace(',', "");
        if s.is_empty() {
            return None;
        }

        let (number, scale) = match s.chars().last()? {
            'K' | 'k' => (&s[..s.len() - 1], 1e3),
            'M' | 'm' => (&s[..s.len() - 1], 1e6),
            'B' | 'b' => (&s[..s.len() - 1], 1e9),
            'T' | 't' => (&s[..s.len() - 1], 1e12),
            _ => (s.as_str(), 1.0),
        };

        number
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite() && *n >= 0.0)
            .map(|n| MarketCap(n * scale))
    }

    pub fn dollars(&self) -> f64 {
        self.0
    }
}

/// The original `$3B+` string test, reproduced exactly
pub fn legacy_passes(raw: &str) -> bool {
    if !raw.contains('B') {
        return false;
    }
    if raw.chars().count() > 6 {
        return true;
    }
    raw.chars()
        .nth(1)
        .and_then(|c| c.to_digit(10))
        .map(|d| d > 3)
        .unwrap_or(false)
}

/// One listing row
#[derive(Debug, Clone, PartialEq)]
pub struct TickerRow {
    pub symbol: Symbol,
    pub market_cap: String,
}

impl TickerRow {
    pub fn new(symbol: impl AsRef<str>, market_cap: impl Into<String>) -> Self {
        Self {
            symbol: Symbol::new(symbol),
            market_cap: market_cap.into(),
        }
    }

    pub fn passes(&self, filter: MarketCapFilter, min_market_cap: f64) -> bool {
        match filter {
            MarketCapFilter::Numeric => MarketCap::parse(&self.market_cap)
                .map(|cap| cap.dollars() >= min_market_cap)
                .unwrap_or(false),
            MarketCapFilter::Legacy => legacy_passes(&self.market_cap),
        }
    }
}

/// Read listing rows from any CSV source with a header row
pub fn read_rows<R: Read>(reader: R, config: &UniverseConfig) -> Result<Vec<TickerRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut rows = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let record = result.context(format!("Failed to read row {}", row_idx + 1))?;

        let symbol = record.get(config.symbol_column).map(str::trim).unwrap_or("");
        let Some(market_cap) = record.get(config.market_cap_column) else {
            debug!("Row {} has no market cap column, skipping", row_idx + 1);
            continue;
        };
        if symbol.is_empty() {
            debug!("Row {} has no symbol, skipping", row_idx + 1);
            continue;
        }

        rows.push(TickerRow::new(symbol, market_cap.trim()));
    }

    Ok(rows)
}

/// Load one exchange export and apply the market-cap pre-filter
pub fn load_universe(path: impl AsRef<Path>, config: &UniverseConfig) -> Result<Vec<TickerRow>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open universe file {}", path.display()))?;
    let rows = read_rows(file, config)?;
    let total = rows.len();

    let kept = filter_universe(rows, config);
    info!(
        "Loaded {} tickers from {} ({} pass the market-cap filter)",
        total,
        path.display(),
        kept.len()
    );
    Ok(kept)
}

pub fn filter_universe(rows: Vec<TickerRow>, config: &UniverseConfig) -> Vec<TickerRow> {
    rows.into_iter()
        .filter(|row| row.passes(config.filter, config.min_market_cap))
        .collect()
}
