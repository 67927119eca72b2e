//! fillsync - incremental Bitget fill synchronization into a Google Sheets
//! trade ledger.
//!
//! Pipeline: authenticated paginated fetch -> symbol mapping -> field
//! normalization -> identifier dedup -> batch append. Each fill is recorded
//! at most once across runs; overlapping sync windows make the dedup step
//! correctness-bearing rather than advisory.

pub mod bitget;
pub mod config;
pub mod ledger;
pub mod normalize;
pub mod sheets;
pub mod symbol;
pub mod sync;
pub mod window;
