//! Human-readable candidate report

use std::fmt::Write;

use crate::driver::ScanReport;
use crate::{OptionContract, StrangleCandidate, Symbol};

const TICKER_RULE: usize = 90;
const CANDIDATE_RULE: usize = 10;

/// Banner printed before the first candidate of a ticker
pub fn render_header(symbol: &Symbol, iv: f64) -> String {
    format!(
        "{}\nIV calculated for {}: {:.4} ({:.2}%)",
        "-".repeat(TICKER_RULE),
        symbol,
        iv,
        iv * 100.0
    )
}

fn render_leg(leg: &OptionContract, delta_sign: f64) -> String {
    format!(
        "{} @ ${:.2} {:.0} Delta",
        leg.description,
        leg.mid_price().to_f64(),
        leg.delta * delta_sign * 100.0
    )
}

/// Both legs plus premium, risk, ratio and margin over average delta
pub fn render_candidate(candidate: &StrangleCandidate) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "-".repeat(CANDIDATE_RULE));
    let _ = writeln!(out, "{}", render_leg(&candidate.call, 1.0));
    let _ = writeln!(out, "{}", render_leg(&candidate.put, -1.0));
    let _ = write!(
        out,
        "Premium (Reward):{:.2} Risk:{:.2} Reward/Risk:{:.2} (Reward/Risk-Avg. Delta):{:.2}",
        candidate.premium.to_f64(),
        candidate.risk.to_f64(),
        candidate.reward_risk,
        candidate.edge()
    );
    out
}

/// Closing summary of a scan
pub fn render_summary(report: &ScanReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "=".repeat(60));
    let _ = writeln!(out, "SCAN SUMMARY");
    let _ = writeln!(out, "{}", "=".repeat(60));
    let _ = writeln!(out, "Tickers screened:   {}", report.screened());
    let _ = writeln!(out, "Candidates found:   {}", report.candidates);
    let _ = writeln!(out, "Retry passes:       {}", report.retry_passes);

    let permanent = report.permanent_failures();
    let _ = writeln!(out, "Not screenable:     {}", permanent.len());
    if !report.retry_queue.is_empty() {
        let pending: Vec<&str> = report.retry_queue.iter().map(|s| s.as_str()).collect();
        let _ = writeln!(out, "Still failing:      {}", pending.join(", "));
    }
    let _ = write!(out, "{}", "=".repeat(60));
    out
}
