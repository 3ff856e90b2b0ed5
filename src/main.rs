//! Strangle screener - main entry point
//!
//! This binary provides three subcommands:
//! - scan: Screen every ticker of the exchange listing CSVs
//! - screen: Screen a single ticker
//! - iv: Print the blended implied volatility of a ticker

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "strangle-screener")]
#[command(about = "Find delta-balanced option strangles whose reward/risk beats their delta", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (defaults are used when omitted)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Screening date (YYYY-MM-DD), defaults to today
    #[arg(long, global = true)]
    as_of: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Screen every ticker in the universe CSV files
    Scan {
        /// Universe CSV files (overrides config). E.g. amex.csv nasdaq.csv nyse.csv
        files: Vec<String>,

        /// Use the original string heuristic for the market-cap filter
        #[arg(long)]
        legacy_filter: bool,

        /// Minimum market cap in dollars
        #[arg(long)]
        min_market_cap: Option<f64>,

        /// Maximum retry passes over failed tickers
        #[arg(long)]
        max_retry_passes: Option<u32>,
    },

    /// Screen a single ticker
    Screen {
        /// Ticker symbol, e.g. "AAPL"
        symbol: String,
    },

    /// Print the blended implied volatility of a ticker
    Iv {
        /// Ticker symbol, e.g. "AAPL"
        symbol: String,
    },
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // Create log file with naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Set log level - filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    if file_only {
        // Scan: only log to file, keep console for the progress bar and report
        let file_appender = tracing_appender::rolling::never("logs", &log_filename);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        let file_appender = tracing_appender::rolling::never("logs", &log_filename);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();
    }

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let (command_name, file_only) = match &cli.command {
        Commands::Scan { .. } => ("scan", true),
        Commands::Screen { .. } => ("screen", false),
        Commands::Iv { .. } => ("iv", false),
    };

    setup_logging(cli.verbose, command_name, file_only)?;

    let as_of = commands::parse_as_of(cli.as_of.as_deref())?;

    match cli.command {
        Commands::Scan {
            files,
            legacy_filter,
            min_market_cap,
            max_retry_passes,
        } => commands::scan::run(
            cli.config,
            as_of,
            files,
            legacy_filter,
            min_market_cap,
            max_retry_passes,
        ),

        Commands::Screen { symbol } => commands::screen::run(cli.config, as_of, symbol),

        Commands::Iv { symbol } => commands::screen::run_iv(cli.config, as_of, symbol),
    }
}
