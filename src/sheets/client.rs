//! Google Sheets implementation of the ledger store
//!
//! The spreadsheet is addressed by id, the partition by sheet title. Opening
//! resolves the title in three steps (exact, whitespace/case-insensitive,
//! create-with-header) so a hand-renamed tab still matches.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::ledger::{LedgerStore, HEADER, TRADE_ID_COLUMN};
use crate::sheets::auth::{fetch_access_token, ServiceAccountKey};

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Range of the trade-id column; data starts on row 2, below the header.
fn trade_id_range() -> String {
    let column = (b'A' + TRADE_ID_COLUMN as u8 - 1) as char;
    format!("{column}2:{column}")
}

pub struct SheetsLedger {
    client: Client,
    token: String,
    spreadsheet_id: String,
    sheet_title: String,
}

impl std::fmt::Debug for SheetsLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SheetsLedger")
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("sheet_title", &self.sheet_title)
            .finish()
    }
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

impl SheetsLedger {
    /// Authenticates, then resolves or creates the target sheet so every
    /// later call operates on a partition that exists and has the header.
    pub async fn open(sa_json: &str, spreadsheet_id: &str, wanted_title: &str) -> Result<Self> {
        let key = ServiceAccountKey::from_json(sa_json)?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build Sheets HTTP client")?;
        let token = fetch_access_token(&client, &key).await?;

        let mut ledger = Self {
            client,
            token,
            spreadsheet_id: spreadsheet_id.to_string(),
            sheet_title: wanted_title.to_string(),
        };
        ledger.sheet_title = ledger.resolve_or_create(wanted_title).await?;
        Ok(ledger)
    }

    async fn resolve_or_create(&self, wanted: &str) -> Result<String> {
        let titles = self.sheet_titles().await?;

        if titles.iter().any(|t| t == wanted) {
            return Ok(wanted.to_string());
        }

        let wanted_norm = normalize_title(wanted);
        if let Some(title) = titles.into_iter().find(|t| normalize_title(t) == wanted_norm) {
            debug!("sheet {:?} matched as {:?}", wanted, title);
            return Ok(title);
        }

        info!("sheet {:?} not found, creating it with the header row", wanted);
        self.add_sheet(wanted).await?;
        let header: Vec<Vec<String>> = vec![HEADER.iter().map(|c| c.to_string()).collect()];
        self.append_values(wanted, &header).await?;
        Ok(wanted.to_string())
    }

    async fn sheet_titles(&self) -> Result<Vec<String>> {
        let url = format!(
            "{}/{}?fields=sheets.properties.title",
            SHEETS_API_BASE, self.spreadsheet_id
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .context("GET spreadsheet metadata failed")?;
        let meta: SpreadsheetMeta = check_json(response, "spreadsheet metadata").await?;
        Ok(meta.sheets.into_iter().map(|s| s.properties.title).collect())
    }

    async fn add_sheet(&self, title: &str) -> Result<()> {
        let url = format!("{}/{}:batchUpdate", SHEETS_API_BASE, self.spreadsheet_id);
        let body = json!({
            "requests": [{ "addSheet": { "properties": { "title": title } } }]
        });
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .context("addSheet request failed")?;
        check_status(response, "addSheet").await
    }

    async fn append_values(&self, title: &str, rows: &[Vec<String>]) -> Result<()> {
        let url = format!(
            "{}/{}/values/{}:append",
            SHEETS_API_BASE,
            self.spreadsheet_id,
            encode_range(&format!("{title}!A1"))
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .query(&[
                ("valueInputOption", "USER_ENTERED"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&json!({ "values": rows }))
            .send()
            .await
            .context("values append request failed")?;
        check_status(response, "values append").await
    }
}

#[async_trait]
impl LedgerStore for SheetsLedger {
    async fn read_trade_ids(&self) -> Result<HashSet<String>> {
        let url = format!(
            "{}/{}/values/{}",
            SHEETS_API_BASE,
            self.spreadsheet_id,
            encode_range(&format!("{}!{}", self.sheet_title, trade_id_range()))
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .context("GET trade-id column failed")?;
        let range: ValueRange = check_json(response, "trade-id column").await?;

        Ok(range
            .values
            .into_iter()
            .filter_map(|mut row| if row.is_empty() { None } else { Some(row.remove(0)) })
            .filter(|id| !id.is_empty())
            .collect())
    }

    async fn append_rows(&self, rows: &[Vec<String>]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.append_values(&self.sheet_title, rows).await
    }
}

fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Minimal percent-encoding for the range path segment; sheet titles with
/// spaces are the common case, but `?`, `/` and `#` would otherwise cut the
/// path short.
fn encode_range(range: &str) -> String {
    range
        .replace('%', "%25")
        .replace(' ', "%20")
        .replace('#', "%23")
        .replace('?', "%3F")
        .replace('/', "%2F")
}

async fn check_status(response: reqwest::Response, what: &str) -> Result<()> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        bail!("{} {}: {}", what, status, crop(&text));
    }
    Ok(())
}

async fn check_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    what: &str,
) -> Result<T> {
    let status = response.status();
    let text = response
        .text()
        .await
        .with_context(|| format!("failed to read {what} body"))?;
    if !status.is_success() {
        bail!("{} {}: {}", what, status, crop(&text));
    }
    serde_json::from_str(&text).with_context(|| format!("failed to parse {what}: {}", crop(&text)))
}

fn crop(text: &str) -> &str {
    let max = 200;
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_matching_ignores_case_and_outer_whitespace() {
        assert_eq!(normalize_title(" Trades "), "trades");
        assert_eq!(normalize_title("TRADES"), normalize_title("trades"));
    }

    #[test]
    fn range_encoding_covers_path_breaking_chars() {
        assert_eq!(encode_range("Trades!O2:O"), "Trades!O2:O");
        assert_eq!(encode_range("My Trades!A1"), "My%20Trades!A1");
        assert_eq!(encode_range("Trades?!A1"), "Trades%3F!A1");
        assert_eq!(encode_range("A/B!A1"), "A%2FB!A1");
    }

    #[test]
    fn trade_id_range_follows_the_header_column() {
        assert_eq!(trade_id_range(), "O2:O");
        assert_eq!(HEADER[TRADE_ID_COLUMN - 1], "TradeId");
    }
}
