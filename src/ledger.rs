//! Ledger abstraction and dedup
//!
//! The ledger is an external append-only store addressed by a store id and a
//! named partition. The pipeline only needs three operations, so the store
//! hides behind a small async trait; the Google Sheets implementation lives
//! in `crate::sheets` and tests use an in-memory double.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::normalize::NormalizedRow;

/// Canonical header row. Column order is load-bearing: the trade id must be
/// the 15th column (O), which is where `read_trade_ids` looks.
pub const HEADER: [&str; 15] = [
    "DateTime",
    "Pair",
    "Direction",
    "Setup",
    "Timeframe",
    "Entry",
    "Stop",
    "Exit",
    "Quantity",
    "Fees",
    "PnL",
    "RealizedR",
    "RMultiple",
    "OrderId",
    "TradeId",
];

/// 1-based position of the TradeId column.
pub const TRADE_ID_COLUMN: usize = 15;

/// Append-only ledger partition. Implementations resolve (or create) the
/// partition with the canonical header before handing out a value.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Full set of trade identifiers already recorded, header excluded.
    async fn read_trade_ids(&self) -> Result<HashSet<String>>;

    /// Append all rows at the end of the partition in one batch.
    async fn append_rows(&self, rows: &[Vec<String>]) -> Result<()>;
}

/// Keeps rows whose trade id is non-empty and not yet recorded, preserving
/// input order. Duplicated ids *within* the candidate batch are not
/// collapsed: two raw fills sharing an id in the same run both append.
pub fn filter_new(rows: Vec<NormalizedRow>, seen: &HashSet<String>) -> Vec<NormalizedRow> {
    rows.into_iter()
        .filter(|row| !row.trade_id.is_empty() && !seen.contains(&row.trade_id))
        .collect()
}
