//! Bitget private API surface: request signing and the paginated fill fetch.

pub mod client;
pub mod sign;

pub use client::{BitgetClient, FillsSource, RetryPolicy, PAGE_LIMIT};
