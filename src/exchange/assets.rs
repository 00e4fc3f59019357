//! Kraken asset codes and trading pairs
//!
//! Kraken prefixes legacy asset codes with `X` (crypto) or `Z` (fiat) and
//! calls bitcoin `XBT`. Pairs are plain concatenations of the two codes,
//! e.g. `XXBTZUSD`, `XETHXXBT`, `DOTUSD`, `ETHUSDT`.

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Fiat currencies traded on Kraken (normalized codes)
static FIAT_CURRENCIES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "USD", "EUR", "GBP", "JPY", "CAD", "AUD", "MXN", "CHF", "BRL", "ARS", "AED", "DKK",
        "NOK", "SEK",
    ]
    .into_iter()
    .collect()
});

/// Quote codes tried when splitting a pair, longest first so `USDT` wins over `USD`
const KNOWN_QUOTES: &[&str] = &[
    "ZUSD", "ZEUR", "ZGBP", "ZJPY", "ZCAD", "ZAUD", "ZCHF", "XXBT", "XETH", "USDT", "USDC",
    "PYUSD", "DAI", "USD", "EUR", "GBP", "JPY", "CAD", "AUD", "CHF", "BRL", "AED", "ARS",
    "MXN", "XBT", "ETH", "DOT", "SOL",
];

/// Normalize a Kraken asset code to its common ticker
pub fn normalize_asset(code: &str) -> String {
    let code = code.trim().to_uppercase();
    match code.as_str() {
        "XXBT" | "XBT" => "BTC".to_string(),
        "XXDG" | "XDG" => "DOGE".to_string(),
        "XETH" => "ETH".to_string(),
        "XXRP" => "XRP".to_string(),
        "XLTC" => "LTC".to_string(),
        "XXLM" => "XLM".to_string(),
        "XXMR" => "XMR".to_string(),
        "XETC" => "ETC".to_string(),
        "XZEC" => "ZEC".to_string(),
        "XREP" => "REP".to_string(),
        "XMLN" => "MLN".to_string(),
        other => {
            // Legacy four-letter codes: XETH, ZUSD, ZEUR...
            if other.len() == 4 && (other.starts_with('X') || other.starts_with('Z')) {
                let stripped = &other[1..];
                if FIAT_CURRENCIES.contains(stripped) || other.starts_with('X') {
                    return stripped.to_string();
                }
            }
            other.to_string()
        }
    }
}

pub fn is_fiat(asset: &str) -> bool {
    FIAT_CURRENCIES.contains(normalize_asset(asset).as_str())
}

/// Split a Kraken trading pair into normalized (base, quote)
pub fn parse_pair(pair: &str) -> Option<(String, String)> {
    let pair = pair.trim().to_uppercase();
    if pair.len() < 5 {
        return None;
    }

    // Classic 8-letter pairs: two prefixed legacy codes (XXBTZUSD, XETHXXBT)
    if pair.len() == 8 {
        let (base, quote) = pair.split_at(4);
        let prefixed = |c: &str| c.starts_with('X') || c.starts_with('Z');
        if prefixed(base) && prefixed(quote) {
            return Some((normalize_asset(base), normalize_asset(quote)));
        }
    }

    // Pairs written with a slash (websocket style: XBT/USD)
    if let Some((base, quote)) = pair.split_once('/') {
        return Some((normalize_asset(base), normalize_asset(quote)));
    }

    let mut candidates: Vec<&str> = KNOWN_QUOTES.to_vec();
    candidates.sort_by_key(|q| std::cmp::Reverse(q.len()));
    for quote in candidates {
        if let Some(base) = pair.strip_suffix(quote) {
            if base.len() >= 2 {
                return Some((normalize_asset(base), normalize_asset(quote)));
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(base: &str, quote: &str) -> Option<(String, String)> {
        Some((base.to_string(), quote.to_string()))
    }

    #[test]
    fn test_normalize_asset() {
        assert_eq!(normalize_asset("XXBT"), "BTC");
        assert_eq!(normalize_asset("XBT"), "BTC");
        assert_eq!(normalize_asset("XETH"), "ETH");
        assert_eq!(normalize_asset("ZUSD"), "USD");
        assert_eq!(normalize_asset("ZEUR"), "EUR");
        assert_eq!(normalize_asset("XXDG"), "DOGE");
        assert_eq!(normalize_asset("USDT"), "USDT");
        assert_eq!(normalize_asset("DOT"), "DOT");
        assert_eq!(normalize_asset("SOL"), "SOL");
        // Z-prefixed non-fiat codes are left alone
        assert_eq!(normalize_asset("ZRX"), "ZRX");
    }

    #[test]
    fn test_is_fiat() {
        assert!(is_fiat("ZUSD"));
        assert!(is_fiat("EUR"));
        assert!(is_fiat("BRL"));
        assert!(!is_fiat("XXBT"));
        assert!(!is_fiat("USDT"));
    }

    #[test]
    fn test_parse_classic_pairs() {
        assert_eq!(parse_pair("XXBTZUSD"), pair("BTC", "USD"));
        assert_eq!(parse_pair("XETHZEUR"), pair("ETH", "EUR"));
        assert_eq!(parse_pair("XETHXXBT"), pair("ETH", "BTC"));
        assert_eq!(parse_pair("XXRPZUSD"), pair("XRP", "USD"));
    }

    #[test]
    fn test_parse_modern_pairs() {
        assert_eq!(parse_pair("DOTUSD"), pair("DOT", "USD"));
        assert_eq!(parse_pair("SOLEUR"), pair("SOL", "EUR"));
        assert_eq!(parse_pair("ETHUSDT"), pair("ETH", "USDT"));
        assert_eq!(parse_pair("USDTZUSD"), pair("USDT", "USD"));
        assert_eq!(parse_pair("USDCUSD"), pair("USDC", "USD"));
        assert_eq!(parse_pair("ADAXBT"), pair("ADA", "BTC"));
        assert_eq!(parse_pair("XBT/USD"), pair("BTC", "USD"));
    }

    #[test]
    fn test_parse_unknown_pair() {
        assert_eq!(parse_pair("FOO"), None);
        assert_eq!(parse_pair("ABCDEFG"), None);
    }
}
