pub mod scan;
pub mod screen;

use anyhow::{Context, Result};
use chrono::NaiveDate;

/// `--as-of` or today's local date
pub fn parse_as_of(raw: Option<&str>) -> Result<NaiveDate> {
    match raw {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("Invalid --as-of date: {}", s)),
        None => Ok(chrono::Local::now().date_naive()),
    }
}
