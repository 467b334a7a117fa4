//! CoinGecko market data client
//!
//! Two endpoints are used: `/coins/markets` for spot price plus 24h stats,
//! and `/coins/{id}/ohlc` for candles. The free OHLC endpoint carries no
//! volume, so per-candle volume is synthesized from the close price; a
//! different provider would be needed for accurate volume.

use chrono::DateTime;
use rand::Rng;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::errors::FeedError;
use crate::feed::types::{Candle, PriceSnapshot};
use crate::instruments::Instrument;

pub const DEFAULT_FEED_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Row shape of `/coins/markets`
#[derive(Debug, Deserialize)]
struct MarketRow {
    current_price: Decimal,
    #[serde(default)]
    price_change_percentage_24h: Option<Decimal>,
    #[serde(default)]
    high_24h: Option<Decimal>,
    #[serde(default)]
    low_24h: Option<Decimal>,
    #[serde(default)]
    total_volume: Option<Decimal>,
}

/// HTTP client for the market data API
pub struct FeedClient {
    client: Client,
    base_url: String,
}

impl FeedClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Fetch the current spot price and 24h stats for an instrument
    pub async fn fetch_spot(&self, instrument: &Instrument) -> Result<PriceSnapshot, FeedError> {
        let url = format!("{}/coins/markets", self.base_url);
        debug!("Fetching spot price for {} from {}", instrument.name, url);

        let response = self
            .client
            .get(&url)
            .query(&[("vs_currency", "usd"), ("ids", instrument.feed_id.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Network(format!(
                "markets endpoint returned status {}",
                status
            )));
        }

        let rows: Vec<MarketRow> = response
            .json()
            .await
            .map_err(|e| FeedError::Parse(e.to_string()))?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| FeedError::EmptyResult(instrument.feed_id.clone()))?;

        Ok(PriceSnapshot {
            spot_price: row.current_price,
            change_24h_pct: row.price_change_percentage_24h.unwrap_or_default(),
            high_24h: row.high_24h.unwrap_or_default(),
            low_24h: row.low_24h.unwrap_or_default(),
            volume_24h: row.total_volume.unwrap_or_default(),
        })
    }

    /// Fetch the full candle sequence for an instrument
    ///
    /// Rows come back as `[timestamp_ms, open, high, low, close]`.
    pub async fn fetch_candles(
        &self,
        instrument: &Instrument,
        lookback_days: u32,
    ) -> Result<Vec<Candle>, FeedError> {
        let url = format!("{}/coins/{}/ohlc", self.base_url, instrument.feed_id);
        debug!(
            "Fetching {} days of candles for {} from {}",
            lookback_days, instrument.name, url
        );

        let response = self
            .client
            .get(&url)
            .query(&[
                ("vs_currency", "usd".to_string()),
                ("days", lookback_days.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Network(format!(
                "ohlc endpoint returned status {}",
                status
            )));
        }

        let rows: Vec<(i64, Decimal, Decimal, Decimal, Decimal)> = response
            .json()
            .await
            .map_err(|e| FeedError::Parse(e.to_string()))?;

        let candles = rows
            .into_iter()
            .filter_map(|(ts_ms, open, high, low, close)| {
                let timestamp = DateTime::from_timestamp_millis(ts_ms)?;
                Some(Candle {
                    timestamp,
                    open,
                    high,
                    low,
                    close,
                    volume: synthesized_volume(close),
                })
            })
            .collect();

        Ok(candles)
    }
}

/// Fill in the volume the free OHLC endpoint does not provide
///
/// Scaled off the close price so the magnitude tracks the instrument.
fn synthesized_volume(close: Decimal) -> Decimal {
    let factor: f64 = rand::rng().random_range(2.0..12.0);
    close * Decimal::from_f64_retain(factor).unwrap_or(Decimal::TWO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruments::find_instrument;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn eth() -> Instrument {
        find_instrument("ethereum").unwrap()
    }

    #[tokio::test]
    async fn test_fetch_spot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/coins/markets"))
            .and(query_param("vs_currency", "usd"))
            .and(query_param("ids", "ethereum"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "id": "ethereum",
                "current_price": 3300.25,
                "price_change_percentage_24h": -1.5,
                "high_24h": 3400.0,
                "low_24h": 3200.0,
                "total_volume": 12345678.0
            }])))
            .mount(&server)
            .await;

        let client = FeedClient::new(server.uri());
        let snapshot = client.fetch_spot(&eth()).await.unwrap();
        assert_eq!(snapshot.spot_price, dec!(3300.25));
        assert_eq!(snapshot.change_24h_pct, dec!(-1.5));
        assert_eq!(snapshot.high_24h, dec!(3400.0));
        assert_eq!(snapshot.low_24h, dec!(3200.0));
    }

    #[tokio::test]
    async fn test_fetch_spot_empty_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/coins/markets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let client = FeedClient::new(server.uri());
        let err = client.fetch_spot(&eth()).await.unwrap_err();
        assert!(matches!(err, FeedError::EmptyResult(ref id) if id == "ethereum"));
    }

    #[tokio::test]
    async fn test_fetch_spot_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/coins/markets"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = FeedClient::new(server.uri());
        let err = client.fetch_spot(&eth()).await.unwrap_err();
        assert!(matches!(err, FeedError::Network(_)));
    }

    #[tokio::test]
    async fn test_fetch_candles() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/coins/ethereum/ohlc"))
            .and(query_param("days", "30"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                [1700000000000i64, 3000.0, 3100.0, 2950.0, 3050.0],
                [1700003600000i64, 3050.0, 3200.0, 3040.0, 3150.0]
            ])))
            .mount(&server)
            .await;

        let client = FeedClient::new(server.uri());
        let candles = client.fetch_candles(&eth(), 30).await.unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open, dec!(3000.0));
        assert_eq!(candles[0].close, dec!(3050.0));
        assert_eq!(candles[1].high, dec!(3200.0));
        // synthesized volume is always positive
        assert!(candles.iter().all(|c| c.volume > Decimal::ZERO));
        // timestamps preserve source order
        assert!(candles[0].timestamp < candles[1].timestamp);
    }
}
