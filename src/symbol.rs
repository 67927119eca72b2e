//! Symbol mapping
//!
//! Converts a human trading-pair code into Bitget's market identifier,
//! e.g. `btc-usdt` -> `BTCUSDT_UMCBL` under the USDT-margined product scope.

use crate::config::ProductType;

/// Pure, total: strips `-`/`_`, uppercases, and appends the product-type
/// suffix when the code ends in `USDT`. Other codes pass through stripped
/// but otherwise unchanged. The `USDT` check applies under every product
/// scope; only the suffix varies with it.
pub fn map_symbol(pair: &str, product_type: ProductType) -> String {
    let stripped: String = pair
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .collect::<String>()
        .to_uppercase();

    if stripped.ends_with("USDT") {
        format!("{}_{}", stripped, product_type.suffix())
    } else {
        stripped
    }
}
