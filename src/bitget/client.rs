//! Bitget private REST client
//!
//! One authenticated GET surface: the account's executed fills for a time
//! window, paginated by `lastEndId`. The pagination loop itself is generic
//! over the page fetch so its termination rules are testable offline.

use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use reqwest::Client;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::bitget::sign;
use crate::config::{BitgetCredentials, ProductType};
use crate::normalize::{pick_str, RawFill, TRADE_ID_KEYS};
use crate::window::SyncWindow;

const BITGET_API_BASE: &str = "https://api.bitget.com";
const ALL_FILLS_PATH: &str = "/api/mix/v1/order/allFills";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(25);

/// Provider page-size ceiling; a shorter page means the last page.
pub const PAGE_LIMIT: usize = 100;

/// Safety cap on cursor-following. The provider contract is that pages
/// eventually run short; the cap bounds the loop if that ever breaks.
const MAX_PAGES: usize = 200;

/// Candidate per-symbol fill endpoints, tried in order. First well-formed
/// `data` list wins.
struct Endpoint {
    path: &'static str,
    with_product_type: bool,
}

const SYMBOL_FILL_ENDPOINTS: &[Endpoint] = &[
    Endpoint {
        path: "/api/v2/mix/order/fills",
        with_product_type: true,
    },
    Endpoint {
        path: "/api/mix/v1/order/fills",
        with_product_type: false,
    },
];

/// Bounded-attempt retry with exponential backoff and jitter, applied to a
/// single request attempt. The default of one attempt means no retry at all;
/// anything more is opt-in via env.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_env() -> Self {
        let mut policy = Self::default();
        if let Ok(v) = std::env::var("BITGET_MAX_ATTEMPTS") {
            if let Ok(n) = v.parse::<u32>() {
                policy.max_attempts = n.max(1);
            }
        }
        if let Ok(v) = std::env::var("BITGET_BACKOFF_MS") {
            if let Ok(ms) = v.parse::<u64>() {
                policy.initial_backoff = Duration::from_millis(ms);
            }
        }
        policy
    }
}

/// Source of raw fills. `BitgetClient` is the real one; tests stub it.
#[async_trait]
pub trait FillsSource: Send + Sync {
    /// Complete ordered fill sequence for the whole product scope.
    async fn all_fills(&self, product_type: ProductType, window: SyncWindow)
        -> Result<Vec<RawFill>>;

    /// Per-symbol variant that probes the candidate endpoint list.
    async fn symbol_fills(
        &self,
        market_id: &str,
        product_type: ProductType,
        window: SyncWindow,
    ) -> Result<Vec<RawFill>>;
}

#[derive(Clone)]
pub struct BitgetClient {
    client: Client,
    base_url: String,
    creds: BitgetCredentials,
    retry: RetryPolicy,
}

impl std::fmt::Debug for BitgetClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitgetClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl BitgetClient {
    pub fn new(creds: BitgetCredentials, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build Bitget HTTP client")?;

        Ok(Self {
            client,
            base_url: BITGET_API_BASE.to_string(),
            creds,
            retry,
        })
    }

    async fn all_fills_page(
        &self,
        product_type: ProductType,
        window: SyncWindow,
        cursor: Option<String>,
    ) -> Result<Vec<RawFill>> {
        let mut params = vec![
            ("productType".to_string(), product_type.as_str().to_string()),
            ("startTime".to_string(), window.start_ms.to_string()),
            ("endTime".to_string(), window.end_ms.to_string()),
        ];
        if let Some(id) = cursor {
            params.push(("lastEndId".to_string(), id));
        }
        self.signed_get(ALL_FILLS_PATH, &params).await
    }

    async fn symbol_fills_page(
        &self,
        endpoint: &Endpoint,
        market_id: &str,
        product_type: ProductType,
        window: SyncWindow,
        cursor: Option<String>,
    ) -> Result<Vec<RawFill>> {
        let mut params = vec![("symbol".to_string(), market_id.to_string())];
        if endpoint.with_product_type {
            params.push(("productType".to_string(), product_type.as_str().to_string()));
        }
        params.push(("startTime".to_string(), window.start_ms.to_string()));
        params.push(("endTime".to_string(), window.end_ms.to_string()));
        if let Some(id) = cursor {
            params.push(("lastEndId".to_string(), id));
        }
        self.signed_get(endpoint.path, &params).await
    }

    /// Signed GET returning the response's `data` list. The signature covers
    /// the exact query bytes, so the query string is assembled by hand (all
    /// parameter values here are URL-safe) rather than via reqwest's encoder.
    async fn signed_get(&self, path: &str, params: &[(String, String)]) -> Result<Vec<RawFill>> {
        let query = if params.is_empty() {
            String::new()
        } else {
            let joined: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
            format!("?{}", joined.join("&"))
        };
        let url = format!("{}{}{}", self.base_url, path, query);

        let mut backoff = self.retry.initial_backoff;
        let mut last_err: Option<anyhow::Error> = None;

        for attempt in 1..=self.retry.max_attempts {
            let ts = Utc::now().timestamp_millis().to_string();
            let signature = sign::sign(&self.creds.secret, &ts, "GET", path, &query, "")?;

            let mut request = self.client.get(&url);
            for (name, value) in sign::auth_headers(&self.creds, &ts, &signature) {
                request = request.header(name, value);
            }

            match request.send().await {
                // Status and format problems are fatal, not retried.
                Ok(response) => return read_fills_response(path, response).await,
                Err(e) => {
                    warn!("GET {} failed (attempt {}/{}): {}", path, attempt, self.retry.max_attempts, e);
                    last_err = Some(e.into());
                }
            }

            if attempt < self.retry.max_attempts {
                let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..50));
                sleep(backoff + jitter).await;
                backoff = (backoff * 2).min(self.retry.max_backoff);
            }
        }

        Err(last_err
            .unwrap_or_else(|| anyhow!("no attempt executed"))
            .context(format!(
                "GET {} failed after {} attempt(s)",
                path, self.retry.max_attempts
            )))
    }
}

#[async_trait]
impl FillsSource for BitgetClient {
    async fn all_fills(
        &self,
        product_type: ProductType,
        window: SyncWindow,
    ) -> Result<Vec<RawFill>> {
        let this = self;
        let fills =
            paginate(move |cursor| this.all_fills_page(product_type, window, cursor)).await?;
        debug!("allFills returned {} fills", fills.len());
        Ok(fills)
    }

    async fn symbol_fills(
        &self,
        market_id: &str,
        product_type: ProductType,
        window: SyncWindow,
    ) -> Result<Vec<RawFill>> {
        let this = self;
        let mut last_err: Option<anyhow::Error> = None;

        for endpoint in SYMBOL_FILL_ENDPOINTS {
            let attempt = paginate(move |cursor| {
                this.symbol_fills_page(endpoint, market_id, product_type, window, cursor)
            })
            .await;

            match attempt {
                Ok(fills) => {
                    debug!("{} returned {} fills for {}", endpoint.path, fills.len(), market_id);
                    return Ok(fills);
                }
                Err(e) => {
                    warn!("{} failed for {}: {:#}", endpoint.path, market_id, e);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| anyhow!("no fill endpoint configured"))
            .context(format!("all fill endpoints failed for {market_id}")))
    }
}

/// Pagination cursor: identifier of the last record on the page, if any.
pub fn cursor_from(batch: &[RawFill]) -> Option<String> {
    let last = batch.last()?;
    let id = pick_str(last, TRADE_ID_KEYS);
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Follows the cursor until an empty page, a page below [`PAGE_LIMIT`], a
/// record without an extractable cursor id, or the page cap. Pages are
/// concatenated in fetch order; any page error aborts the whole fetch.
pub async fn paginate<F, Fut>(mut fetch_page: F) -> Result<Vec<RawFill>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Vec<RawFill>>>,
{
    let mut out: Vec<RawFill> = Vec::new();
    let mut cursor: Option<String> = None;

    for _page in 0..MAX_PAGES {
        let batch = fetch_page(cursor.take()).await?;
        let fetched = batch.len();
        cursor = cursor_from(&batch);
        out.extend(batch);

        if fetched == 0 || fetched < PAGE_LIMIT || cursor.is_none() {
            return Ok(out);
        }
    }

    warn!("pagination stopped at the {}-page safety cap", MAX_PAGES);
    Ok(out)
}

async fn read_fills_response(path: &str, response: reqwest::Response) -> Result<Vec<RawFill>> {
    let status = response.status();
    let text = response
        .text()
        .await
        .with_context(|| format!("failed to read body from {path}"))?;

    if !status.is_success() {
        bail!("GET {} {}: {}", path, status, truncate(&text, 200));
    }

    let value: Value = serde_json::from_str(&text).with_context(|| {
        format!("non-JSON response from {}: {} {}", path, status, truncate(&text, 200))
    })?;

    match value.get("data") {
        Some(Value::Array(items)) => Ok(items
            .iter()
            .filter_map(|item| item.as_object().cloned())
            .collect()),
        Some(Value::Null) => Ok(Vec::new()),
        Some(other) => bail!(
            "unexpected `data` shape from {}: {}",
            path,
            truncate(&other.to_string(), 200)
        ),
        None => bail!(
            "response from {} missing `data`: {} {}",
            path,
            status,
            truncate(&text, 200)
        ),
    }
}

fn truncate(text: &str, max: usize) -> &str {
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
    use serde_json::json;
    use std::sync::Mutex;

    fn fill(id: &str) -> RawFill {
        json!({ "tradeId": id }).as_object().unwrap().clone()
    }

    fn page(prefix: &str, count: usize) -> Vec<RawFill> {
        (0..count).map(|i| fill(&format!("{prefix}{i}"))).collect()
    }

    #[test]
    fn cursor_probes_id_candidates() {
        assert_eq!(cursor_from(&[fill("t9")]), Some("t9".to_string()));

        let by_fill_id = json!({"fillId": "f7"}).as_object().unwrap().clone();
        assert_eq!(cursor_from(&[by_fill_id]), Some("f7".to_string()));

        let bare = json!({"price": "1"}).as_object().unwrap().clone();
        assert_eq!(cursor_from(&[bare]), None);

        assert_eq!(cursor_from(&[]), None);
    }

    #[tokio::test]
    async fn empty_first_page_terminates_immediately() {
        let fills = paginate(|_| async { Ok(Vec::new()) }).await.unwrap();
        assert!(fills.is_empty());
    }

    #[tokio::test]
    async fn short_page_terminates_after_inclusion() {
        let pages = Mutex::new(vec![page("a", PAGE_LIMIT), page("b", 3)]);
        let cursors = Mutex::new(Vec::new());

        let fills = paginate(|cursor| {
            cursors.lock().unwrap().push(cursor.clone());
            let batch = pages.lock().unwrap().remove(0);
            async move { Ok(batch) }
        })
        .await
        .unwrap();

        assert_eq!(fills.len(), PAGE_LIMIT + 3);
        // second request carries the last id of the first page
        assert_eq!(
            *cursors.lock().unwrap(),
            vec![None, Some(format!("a{}", PAGE_LIMIT - 1))]
        );
    }

    #[tokio::test]
    async fn missing_cursor_id_terminates_after_inclusion() {
        let full_page_without_ids: Vec<RawFill> = (0..PAGE_LIMIT)
            .map(|i| json!({"price": i}).as_object().unwrap().clone())
            .collect();
        let pages = Mutex::new(vec![full_page_without_ids]);

        let fills = paginate(|_| {
            let batch = pages.lock().unwrap().remove(0);
            async move { Ok(batch) }
        })
        .await
        .unwrap();

        assert_eq!(fills.len(), PAGE_LIMIT);
    }

    #[tokio::test]
    async fn page_error_aborts_the_fetch() {
        let pages = Mutex::new(vec![Ok(page("a", PAGE_LIMIT)), Err(anyhow!("boom"))]);

        let result = paginate(|_| {
            let batch = pages.lock().unwrap().remove(0);
            async move { batch }
        })
        .await;

        assert!(result.is_err());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("abcdef", 4), "abcd");
        assert_eq!(truncate("ab", 4), "ab");
        // multi-byte char straddling the cut
        let s = "aé";
        assert_eq!(truncate(s, 2), "a");
    }
}
