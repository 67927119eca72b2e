//! Fill-sync pipeline
//!
//! One run: read recorded ids, fetch the window's fills, map symbols,
//! normalize, dedup, append. Single-threaded and sequential; the ledger is
//! read fully before any filtering decision and all retained rows go out in
//! one batch append.

use anyhow::Result;
use tracing::{info, warn};

use crate::bitget::FillsSource;
use crate::config::Config;
use crate::ledger::{filter_new, LedgerStore};
use crate::normalize::{NormalizedRow, RawFill};
use crate::symbol::map_symbol;
use crate::window::SyncWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Raw fills matched to a requested pair.
    pub fetched: usize,
    /// Rows actually appended (0 in dry-run).
    pub appended: usize,
}

pub async fn run(
    config: &Config,
    source: &dyn FillsSource,
    ledger: &dyn LedgerStore,
) -> Result<RunReport> {
    // Recorded state first; every dedup decision is made against this one read.
    let seen = ledger.read_trade_ids().await?;
    info!("ledger holds {} recorded trade ids", seen.len());

    let window = SyncWindow::lookback(config.lookback_days);
    info!(
        "sync window [{}, {}) ({} day lookback)",
        window.start_ms, window.end_ms, config.lookback_days
    );

    // Default mode: one product-wide fetch, filtered per pair below.
    let all = if config.per_symbol {
        None
    } else {
        Some(source.all_fills(config.product_type, window).await?)
    };

    let mut new_rows: Vec<NormalizedRow> = Vec::new();
    let mut fetched = 0usize;

    for pair in &config.symbols {
        let market_id = map_symbol(pair, config.product_type);

        let fills: Vec<RawFill> = match &all {
            Some(fills) => fills
                .iter()
                .filter(|f| symbol_matches(f, &market_id))
                .cloned()
                .collect(),
            // Per-symbol probing mode: a failed pair is skipped, not fatal.
            None => match source.symbol_fills(&market_id, config.product_type, window).await {
                Ok(fills) => fills,
                Err(e) => {
                    warn!("{}: fetch failed, skipping pair: {:#}", pair, e);
                    continue;
                }
            },
        };

        let total = fills.len();
        fetched += total;

        let rows: Vec<NormalizedRow> = fills
            .iter()
            .map(|fill| NormalizedRow::from_raw(fill, pair))
            .collect();
        let rows = filter_new(rows, &seen);

        info!("{}: total={} new={}", pair, total, rows.len());
        new_rows.extend(rows);
    }

    if config.dry_run {
        info!("[dry-run] skipping append of {} rows", new_rows.len());
        return Ok(RunReport { fetched, appended: 0 });
    }

    let cells: Vec<Vec<String>> = new_rows.iter().map(NormalizedRow::cells).collect();
    let appended = cells.len();
    if !cells.is_empty() {
        ledger.append_rows(&cells).await?;
    }
    info!("appended {} new rows", appended);

    Ok(RunReport { fetched, appended })
}

fn symbol_matches(fill: &RawFill, market_id: &str) -> bool {
    fill.get("symbol")
        .and_then(|v| v.as_str())
        .map(|s| s.eq_ignore_ascii_case(market_id))
        .unwrap_or(false)
}
