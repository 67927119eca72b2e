//! Google Sheets ledger backend: service-account auth plus the values API.

pub mod auth;
pub mod client;

pub use client::SheetsLedger;
