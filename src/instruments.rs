//! Static instrument catalog
//!
//! The exchange trades a fixed set of pairs. Each instrument carries the
//! CoinGecko id used for market data lookups; that id is the instrument's
//! identity.

use serde::{Deserialize, Serialize};

/// A tradeable pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    /// Display name, matches the pair string stored on-chain (e.g. "ETH/USD")
    pub name: String,
    /// CoinGecko coin id (e.g. "ethereum")
    pub feed_id: String,
    /// Ticker symbol (e.g. "ETH")
    pub symbol: String,
}

impl Instrument {
    fn new(name: &str, feed_id: &str, symbol: &str) -> Self {
        Self {
            name: name.to_string(),
            feed_id: feed_id.to_string(),
            symbol: symbol.to_string(),
        }
    }
}

impl PartialEq for Instrument {
    fn eq(&self, other: &Self) -> bool {
        self.feed_id == other.feed_id
    }
}

impl Eq for Instrument {}

/// All pairs listed on the exchange
pub fn supported_instruments() -> Vec<Instrument> {
    vec![
        Instrument::new("ETH/USD", "ethereum", "ETH"),
        Instrument::new("BTC/USD", "bitcoin", "BTC"),
        Instrument::new("BNB/USD", "binancecoin", "BNB"),
        Instrument::new("SOL/USD", "solana", "SOL"),
    ]
}

/// Look up an instrument by pair name, feed id or symbol (case-insensitive)
pub fn find_instrument(key: &str) -> Option<Instrument> {
    let key = key.to_lowercase();
    supported_instruments().into_iter().find(|i| {
        i.name.to_lowercase() == key
            || i.feed_id.to_lowercase() == key
            || i.symbol.to_lowercase() == key
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_by_symbol_and_name() {
        let eth = find_instrument("eth").expect("ETH should be listed");
        assert_eq!(eth.feed_id, "ethereum");
        assert_eq!(find_instrument("BTC/USD").unwrap().symbol, "BTC");
        assert_eq!(find_instrument("solana").unwrap().name, "SOL/USD");
    }

    #[test]
    fn test_unknown_instrument() {
        assert!(find_instrument("DOGE").is_none());
    }

    #[test]
    fn test_identity_by_feed_id() {
        let a = Instrument::new("ETH/USD", "ethereum", "ETH");
        let b = Instrument::new("Ether", "ethereum", "WETH");
        assert_eq!(a, b);
    }
}
