//! Process configuration
//!
//! Everything environment-sourced is read exactly once at startup into an
//! immutable `Config` that gets passed by reference into the pipeline.
//! Pipeline code never touches `std::env`.

use anyhow::{Context, Result};

use crate::bitget::RetryPolicy;

/// Bitget futures product scope. Selects which account fills are queried and
/// which suffix the symbol mapper appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductType {
    /// USDT-margined perpetual (default)
    Umcbl,
    /// USDC-margined perpetual
    Cmcbl,
    /// Coin-margined perpetual
    Dmcbl,
}

impl ProductType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "cmcbl" => ProductType::Cmcbl,
            "dmcbl" => ProductType::Dmcbl,
            _ => ProductType::Umcbl,
        }
    }

    /// Value of the `productType` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Umcbl => "umcbl",
            ProductType::Cmcbl => "cmcbl",
            ProductType::Dmcbl => "dmcbl",
        }
    }

    /// Market-id suffix, e.g. `BTCUSDT_UMCBL`.
    pub fn suffix(&self) -> &'static str {
        match self {
            ProductType::Umcbl => "UMCBL",
            ProductType::Cmcbl => "CMCBL",
            ProductType::Dmcbl => "DMCBL",
        }
    }

}

/// Bitget private API credentials
#[derive(Clone)]
pub struct BitgetCredentials {
    pub api_key: String,
    pub secret: String,
    pub passphrase: String,
}

impl std::fmt::Debug for BitgetCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitgetCredentials")
            .field("api_key", &"[REDACTED]")
            .field("secret", &"[REDACTED]")
            .field("passphrase", &"[REDACTED]")
            .finish()
    }
}

impl BitgetCredentials {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            api_key: require_env("BITGET_API_KEY")?,
            secret: require_env("BITGET_API_SECRET")?,
            passphrase: require_env("BITGET_PASSPHRASE")?,
        })
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub product_type: ProductType,
    pub symbols: Vec<String>,
    pub sheet_id: String,
    pub sheet_name: String,
    pub dry_run: bool,
    pub lookback_days: i64,
    /// Fetch per symbol through the endpoint-probing path instead of one
    /// product-wide `allFills` call.
    pub per_symbol: bool,
    pub bitget: BitgetCredentials,
    pub google_sa_json: String,
    pub retry: RetryPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        // Credentials first: a missing secret must abort before any network call.
        let bitget = BitgetCredentials::from_env()?;
        let google_sa_json = require_env("GOOGLE_SA_JSON")?;
        let sheet_id = require_env("SHEET_ID")?;

        let product_type = ProductType::parse(
            &std::env::var("PRODUCT_TYPE").unwrap_or_else(|_| "umcbl".to_string()),
        );

        let sheet_name =
            std::env::var("SHEET_TRADES_NAME").unwrap_or_else(|_| "Trades".to_string());

        let symbols = parse_symbols(
            &std::env::var("SYMBOLS").unwrap_or_else(|_| "BTCUSDT,ETHUSDT".to_string()),
        );

        let dry_run = std::env::var("DRY_RUN")
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE"))
            .unwrap_or(false);

        let lookback_days = std::env::var("LOOKBACK_DAYS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|&d| d > 0)
            .unwrap_or(3);

        Ok(Self {
            product_type,
            symbols,
            sheet_id,
            sheet_name,
            dry_run,
            lookback_days,
            per_symbol: false,
            bitget,
            google_sa_json,
            retry: RetryPolicy::from_env(),
        })
    }
}

pub fn parse_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn require_env(name: &str) -> Result<String> {
    let value = std::env::var(name).with_context(|| format!("missing required env var {name}"))?;
    if value.is_empty() {
        anyhow::bail!("required env var {name} is empty");
    }
    Ok(value)
}
