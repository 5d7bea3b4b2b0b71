//! screening-batch: fetch financials for the watched companies, screen them and
//! store the latest PASS / FAIL / REVIEW result per company.
//!
//! Usage:
//!   cargo run -p screening-batch -- --mode financial
//!   cargo run -p screening-batch -- --mode financial --codes 7203 6758 --dry-run
//!   cargo run -p screening-batch -- --mode test

mod config;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use config::BatchConfig;
use screening_core::{EstimateSource, ExternalEstimateRecord, JudgedRecord, ScreeningError, ScreeningStatus};
use screening_orchestrator::{CsvInstrumentListing, ScreeningRun};
use screening_store::ScreeningDb;
use std::sync::Arc;
use yahoo_client::{YahooClient, YahooConfig};

/// Toyota, Sony, Nintendo
const TEST_CODES: [&str; 3] = ["7203", "6758", "7974"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Financial,
    Test,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Args {
    mode: Mode,
    codes: Vec<String>,
    concurrency: Option<usize>,
    db: Option<String>,
    dry_run: bool,
}

impl Args {
    fn parse(args: &[String]) -> Result<Self> {
        let value_of = |flag: &str| {
            args.iter()
                .position(|a| a == flag)
                .and_then(|i| args.get(i + 1))
                .filter(|v| !v.starts_with("--"))
        };

        let mode = match value_of("--mode").map(|s| s.as_str()) {
            None | Some("financial") => Mode::Financial,
            Some("test") => Mode::Test,
            Some(other) => bail!("unknown mode {:?} (expected financial or test)", other),
        };

        let codes = match args.iter().position(|a| a == "--codes") {
            Some(idx) => args[idx + 1..]
                .iter()
                .take_while(|a| !a.starts_with("--"))
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        let concurrency = value_of("--concurrency")
            .map(|v| v.parse::<usize>())
            .transpose()
            .context("--concurrency expects a number")?;
        if concurrency == Some(0) {
            bail!("--concurrency must be at least 1");
        }

        Ok(Self {
            mode,
            codes,
            concurrency,
            db: value_of("--db").cloned(),
            dry_run: args.iter().any(|a| a == "--dry-run"),
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  screening-batch --mode financial          Screen all watched companies");
    eprintln!("  screening-batch --mode test               Screen a few well-known companies, no writes");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --codes 7203 6758 ...   Screen these codes instead of the watchlist");
    eprintln!("  --concurrency N         Max parallel companies (default: BATCH_CONCURRENCY)");
    eprintln!("  --db URL                SQLite database URL (default: DATABASE_URL)");
    eprintln!("  --dry-run               Judge without writing to the database");
}

fn init_tracing() {
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }
}

/// Estimate source for runs without a database
struct NoEstimates;

#[async_trait]
impl EstimateSource for NoEstimates {
    async fn fetch_estimate(&self, _company_code: &str) -> Result<Option<ExternalEstimateRecord>, ScreeningError> {
        Ok(None)
    }
}

fn yahoo_client(config: &BatchConfig) -> YahooClient {
    let mut yahoo = YahooConfig {
        timeout: config.http_timeout(),
        max_attempts: config.retry_max,
        ..YahooConfig::default()
    };
    if let Some(base_url) = &config.yahoo_base_url {
        yahoo.base_url = base_url.clone();
    }
    YahooClient::with_config(yahoo)
}

fn log_result(record: &JudgedRecord) {
    tracing::info!(
        "{} {}: {}",
        record.company_code(),
        record.raw.company_name,
        record.status
    );
    match record.status {
        ScreeningStatus::Fail => {
            for reason in &record.failed_reasons {
                tracing::info!("  NG: {}", reason.message);
            }
        }
        ScreeningStatus::Review => {
            for reason in &record.review_reasons {
                tracing::info!("  Review: {} ({})", reason.message, reason.code);
            }
        }
        ScreeningStatus::Pass => {}
    }
}

async fn run_financial(config: &BatchConfig, args: &Args) -> Result<()> {
    tracing::info!("=== Financial screening batch ===");

    let db = Arc::new(ScreeningDb::new(&config.database_url).await?);

    let codes = if args.codes.is_empty() {
        db.watched_codes().await?
    } else {
        args.codes.clone()
    };
    if codes.is_empty() {
        tracing::warn!("No watched companies. Add codes to watched_tickers or pass --codes.");
        return Ok(());
    }

    let run = ScreeningRun::new(Arc::new(yahoo_client(config)), db.clone())
        .with_listing(Arc::new(CsvInstrumentListing::new(&config.stock_list_path)))
        .with_concurrency(config.concurrency);

    let report = run.run(&codes).await;

    if args.dry_run {
        for record in &report.results {
            log_result(record);
        }
        tracing::info!("Dry run: nothing written");
    } else {
        run.persist(&report, db.as_ref()).await?;
    }

    if !report.failed_codes.is_empty() {
        tracing::warn!("Fetch failed for: {}", report.failed_codes.join(", "));
    }
    tracing::info!("Result: {}", report.summary);

    Ok(())
}

async fn run_test(config: &BatchConfig, args: &Args) -> Result<()> {
    tracing::info!("=== Test mode ===");

    let codes: Vec<String> = if args.codes.is_empty() {
        TEST_CODES.iter().map(|c| c.to_string()).collect()
    } else {
        args.codes.clone()
    };

    let run = ScreeningRun::new(Arc::new(yahoo_client(config)), Arc::new(NoEstimates))
        .with_concurrency(config.concurrency);

    tracing::info!("Conditions:");
    for condition in run.engine().describe_conditions() {
        let suffix = if condition.display_only { " (display only)" } else { "" };
        tracing::info!("  {}{}", condition.description, suffix);
    }

    let report = run.run(&codes).await;
    for record in &report.results {
        log_result(record);
    }
    for code in &report.failed_codes {
        tracing::warn!("{}: fetch failed", code);
    }

    tracing::info!("=== Test complete: {} ===", report.summary);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let argv: Vec<String> = std::env::args().skip(1).collect();
    if argv.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let args = match Args::parse(&argv) {
        Ok(args) => args,
        Err(e) => {
            print_usage();
            return Err(e);
        }
    };

    let mut config = BatchConfig::from_env()?;
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(db) = &args.db {
        config.database_url = db.clone();
    }

    tracing::info!(
        "screening-batch: mode={:?}, db={}, concurrency={}, dry_run={}",
        args.mode,
        config.database_url,
        config.concurrency,
        args.dry_run
    );

    match args.mode {
        Mode::Financial => run_financial(&config, &args).await,
        Mode::Test => run_test(&config, &args).await,
    }
}
