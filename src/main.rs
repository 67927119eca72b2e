//! fillsync CLI
//!
//! One invocation = one sync run. Scheduling (cron etc.) and mutual
//! exclusion between runs live outside this process.

use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fillsync::bitget::BitgetClient;
use fillsync::config::{parse_symbols, Config};
use fillsync::sheets::SheetsLedger;
use fillsync::sync;

#[derive(Parser, Debug)]
#[command(name = "fillsync")]
#[command(about = "Sync Bitget futures fills into a Google Sheets trade ledger")]
struct Args {
    /// Compute and report the new-row count without appending
    #[arg(long)]
    dry_run: bool,

    /// Comma-separated trading pairs (overrides SYMBOLS)
    #[arg(long)]
    symbols: Option<String>,

    /// Fetch per symbol through the endpoint-probing path
    #[arg(long)]
    per_symbol: bool,

    /// Sync window lookback in days (overrides LOOKBACK_DAYS)
    #[arg(long)]
    lookback_days: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fillsync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut config = Config::from_env()?;
    if args.dry_run {
        config.dry_run = true;
    }
    if args.per_symbol {
        config.per_symbol = true;
    }
    if let Some(symbols) = args.symbols.as_deref() {
        config.symbols = parse_symbols(symbols);
    }
    if let Some(days) = args.lookback_days {
        config.lookback_days = days.max(1);
    }

    let source = BitgetClient::new(config.bitget.clone(), config.retry)?;
    let ledger = SheetsLedger::open(&config.google_sa_json, &config.sheet_id, &config.sheet_name)
        .await?;

    let report = sync::run(&config, &source, &ledger).await?;
    info!(
        "run complete: fetched={} appended={}",
        report.fetched, report.appended
    );
    Ok(())
}
