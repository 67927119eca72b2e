//! Fill normalization
//!
//! Bitget's fill endpoints disagree on key names between versions, and
//! numeric fields arrive as either JSON numbers or strings. Raw fills are
//! therefore kept as generic string-keyed maps and every field is extracted
//! by probing an ordered candidate list, degrading to a typed default when
//! nothing usable is present. A bad field never aborts the run.

use chrono::{TimeZone, Utc};
use serde_json::Value;

/// A raw fill record exactly as the exchange returned it.
pub type RawFill = serde_json::Map<String, Value>;

/// Candidate keys for the fill's natural identifier, in priority order.
/// Also used to derive the pagination cursor.
pub const TRADE_ID_KEYS: &[&str] = &["tradeId", "fillId", "id"];

const PRICE_KEYS: &[&str] = &["price", "priceAvg"];
const SIZE_KEYS: &[&str] = &["size", "baseVolume", "fillQty", "tradeVolume"];
const TIME_KEYS: &[&str] = &["ctime", "timestamp"];

/// First candidate present with a non-empty value, rendered as a string.
/// Numbers are stringified; null and empty-string values fall through to the
/// next candidate.
pub fn pick_str(fill: &RawFill, keys: &[&str]) -> String {
    for key in keys {
        match fill.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => return s.clone(),
            Some(Value::Number(n)) => return n.to_string(),
            _ => {}
        }
    }
    String::new()
}

/// First candidate present, parsed as a decimal. A present-but-null or
/// unparsable value yields 0 without probing further candidates; only an
/// absent key falls through to the next one.
pub fn pick_f64(fill: &RawFill, keys: &[&str]) -> f64 {
    for key in keys {
        match fill.get(*key) {
            Some(Value::Number(n)) => return n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => return s.trim().parse::<f64>().unwrap_or(0.0),
            Some(_) => return 0.0,
            None => {}
        }
    }
    0.0
}

fn pick_i64(fill: &RawFill, keys: &[&str]) -> Option<i64> {
    for key in keys {
        match fill.get(*key) {
            Some(Value::Number(n)) => return n.as_i64(),
            Some(Value::String(s)) => return s.trim().parse::<i64>().ok(),
            _ => {}
        }
    }
    None
}

/// Epoch millis -> `YYYY-MM-DD HH:MM:SS` UTC.
pub fn format_timestamp(ms: i64) -> String {
    Utc.timestamp_millis_opt(ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

/// `posSide` wins when present and non-empty; otherwise `side`. Substring
/// match, long/short checked before buy/sell.
fn direction_of(fill: &RawFill) -> &'static str {
    let raw = pick_str(fill, &["posSide"]);
    let raw = if raw.is_empty() {
        pick_str(fill, &["side"])
    } else {
        raw
    };
    let raw = raw.to_lowercase();

    if raw.contains("long") {
        "Long"
    } else if raw.contains("short") {
        "Short"
    } else if raw.contains("buy") {
        "Long"
    } else if raw.contains("sell") {
        "Short"
    } else {
        ""
    }
}

/// One ledger row. Setup/Timeframe/Entry/Stop/RealizedR/RMultiple cells are
/// reserved for the sheet side and always rendered empty.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub datetime: String,
    pub pair: String,
    pub direction: String,
    pub price: f64,
    pub size: f64,
    pub fee: f64,
    pub pnl: f64,
    pub order_id: String,
    pub trade_id: String,
}

impl NormalizedRow {
    pub fn from_raw(fill: &RawFill, pair: &str) -> Self {
        Self::from_raw_at(fill, pair, Utc::now().timestamp_millis())
    }

    /// `now_ms` is the wall-clock fallback for fills without a timestamp.
    pub fn from_raw_at(fill: &RawFill, pair: &str, now_ms: i64) -> Self {
        let ts_ms = pick_i64(fill, TIME_KEYS).unwrap_or(now_ms);

        Self {
            datetime: format_timestamp(ts_ms),
            pair: pair.to_string(),
            direction: direction_of(fill).to_string(),
            price: pick_f64(fill, PRICE_KEYS),
            size: pick_f64(fill, SIZE_KEYS),
            fee: pick_f64(fill, &["fee"]),
            pnl: pick_f64(fill, &["pnl"]),
            order_id: pick_str(fill, &["orderId"]),
            trade_id: pick_str(fill, TRADE_ID_KEYS),
        }
    }

    /// The 15 sheet cells, in header order. Executed price lands in the
    /// `Exit` column; the trade id is the last cell.
    pub fn cells(&self) -> Vec<String> {
        vec![
            self.datetime.clone(),
            self.pair.clone(),
            self.direction.clone(),
            String::new(), // Setup
            String::new(), // Timeframe
            String::new(), // Entry
            String::new(), // Stop
            self.price.to_string(),
            self.size.to_string(),
            self.fee.to_string(),
            self.pnl.to_string(),
            String::new(), // RealizedR
            String::new(), // RMultiple
            self.order_id.clone(),
            self.trade_id.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawFill {
        value.as_object().expect("fixture must be an object").clone()
    }

    #[test]
    fn price_falls_back_to_price_avg() {
        let fill = raw(json!({"priceAvg": "27123.5"}));
        assert_eq!(pick_f64(&fill, PRICE_KEYS), 27123.5);

        let fill = raw(json!({"price": 27000.0, "priceAvg": "27123.5"}));
        assert_eq!(pick_f64(&fill, PRICE_KEYS), 27000.0);

        let fill = raw(json!({"fee": "0.1"}));
        assert_eq!(pick_f64(&fill, PRICE_KEYS), 0.0);

        // explicit null shadows later candidates and defaults to 0
        let fill = raw(json!({"price": null, "priceAvg": "27123.5"}));
        assert_eq!(pick_f64(&fill, PRICE_KEYS), 0.0);
    }

    #[test]
    fn unparsable_numeric_degrades_to_zero() {
        let fill = raw(json!({"price": "not-a-number", "size": null, "fee": "0.02"}));
        assert_eq!(pick_f64(&fill, PRICE_KEYS), 0.0);
        assert_eq!(pick_f64(&fill, SIZE_KEYS), 0.0);
        assert_eq!(pick_f64(&fill, &["fee"]), 0.02);
    }

    #[test]
    fn size_probes_all_candidates() {
        for key in ["size", "baseVolume", "fillQty", "tradeVolume"] {
            let fill = raw(json!({ key: "1.25" }));
            assert_eq!(pick_f64(&fill, SIZE_KEYS), 1.25, "key {key}");
        }
    }

    #[test]
    fn trade_id_probes_in_priority_order() {
        let fill = raw(json!({"fillId": "f1", "id": "i1"}));
        assert_eq!(pick_str(&fill, TRADE_ID_KEYS), "f1");

        let fill = raw(json!({"tradeId": 42}));
        assert_eq!(pick_str(&fill, TRADE_ID_KEYS), "42");

        let fill = raw(json!({"tradeId": "", "id": "i1"}));
        assert_eq!(pick_str(&fill, TRADE_ID_KEYS), "i1");

        let fill = raw(json!({}));
        assert_eq!(pick_str(&fill, TRADE_ID_KEYS), "");
    }

    #[test]
    fn direction_mapping() {
        let cases = [
            (json!({"side": "sell"}), "Short"),
            (json!({"side": "buy"}), "Long"),
            (json!({"posSide": "long"}), "Long"),
            (json!({"posSide": "close_short"}), "Short"),
            // posSide wins over a conflicting side
            (json!({"posSide": "long_something", "side": "sell"}), "Long"),
            // empty posSide falls through to side
            (json!({"posSide": "", "side": "sell"}), "Short"),
            (json!({}), ""),
        ];
        for (fixture, expected) in cases {
            let fill = raw(fixture.clone());
            assert_eq!(direction_of(&fill), expected, "{fixture}");
        }
    }

    #[test]
    fn timestamp_renders_utc_seconds() {
        assert_eq!(format_timestamp(1_700_000_000_000), "2023-11-14 22:13:20");
        // ctime preferred over timestamp; string millis accepted
        let fill = raw(json!({"ctime": "1700000000000", "timestamp": 0}));
        let row = NormalizedRow::from_raw_at(&fill, "BTCUSDT", 0);
        assert_eq!(row.datetime, "2023-11-14 22:13:20");
    }

    #[test]
    fn missing_timestamp_uses_wall_clock_fallback() {
        let row = NormalizedRow::from_raw_at(&raw(json!({})), "BTCUSDT", 1_700_000_000_000);
        assert_eq!(row.datetime, "2023-11-14 22:13:20");
    }

    #[test]
    fn row_renders_fifteen_cells_with_trade_id_last() {
        let fill = raw(json!({
            "tradeId": "t-1",
            "orderId": "o-1",
            "price": "27000.5",
            "size": "0.01",
            "fee": "-0.16",
            "pnl": "12.5",
            "ctime": 1_700_000_000_000i64,
            "side": "buy"
        }));
        let row = NormalizedRow::from_raw_at(&fill, "BTCUSDT", 0);
        let cells = row.cells();
        assert_eq!(cells.len(), 15);
        assert_eq!(cells[0], "2023-11-14 22:13:20");
        assert_eq!(cells[1], "BTCUSDT");
        assert_eq!(cells[2], "Long");
        assert_eq!(cells[7], "27000.5"); // Exit = executed price
        assert_eq!(cells[8], "0.01");
        assert_eq!(cells[9], "-0.16");
        assert_eq!(cells[10], "12.5");
        assert_eq!(cells[13], "o-1");
        assert_eq!(cells[14], "t-1");
    }
}
