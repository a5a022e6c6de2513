//! Symbol normalization.
//!
//! Exchanges spell the same perpetual contract differently:
//! `BTCUSDT` (Binance), `BTC_USDT` (MEXC, Gate), `BTC/USDT:USDT` (unified
//! notation), `BTC-USDT-SWAP`. Reconciliation joins local rows to exchange
//! positions on the normalized form, so every boundary funnels through
//! [`normalize_symbol`].

/// Contract-type suffixes that carry no identity.
const CONTRACT_SUFFIXES: [&str; 3] = ["-SWAP", "_PERP", "-PERP"];

/// Normalize an exchange-native symbol to its canonical `BASEQUOTE` form.
///
/// Uppercases, drops the settlement suffix after `:`, drops contract-type
/// suffixes and removes `/`, `_`, `-` separators.
pub fn normalize_symbol(raw: &str) -> String {
    let upper = raw.trim().to_ascii_uppercase();

    let mut symbol = match upper.split_once(':') {
        Some((pair, _settle)) => pair.to_string(),
        None => upper,
    };

    for suffix in CONTRACT_SUFFIXES {
        if let Some(stripped) = symbol.strip_suffix(suffix) {
            symbol = stripped.to_string();
            break;
        }
    }

    symbol.retain(|c| !matches!(c, '/' | '_' | '-'));
    symbol
}
