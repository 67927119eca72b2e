//! Sync window computation

use chrono::Utc;

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Half-open `[start_ms, end_ms)` time range queried each run.
///
/// Windows deliberately overlap across runs; identifier dedup, not time-range
/// exclusivity, is what keeps the ledger duplicate-free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl SyncWindow {
    pub fn lookback(days: i64) -> Self {
        Self::lookback_from(Utc::now().timestamp_millis(), days)
    }

    pub fn lookback_from(now_ms: i64, days: i64) -> Self {
        Self {
            start_ms: now_ms - days * MS_PER_DAY,
            end_ms: now_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookback_spans_the_requested_days() {
        let w = SyncWindow::lookback_from(1_700_000_000_000, 3);
        assert_eq!(w.end_ms, 1_700_000_000_000);
        assert_eq!(w.end_ms - w.start_ms, 3 * MS_PER_DAY);
    }
}
