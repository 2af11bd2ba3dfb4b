//! Ether/fiat spot price lookup, used purely to render alert and report
//! text in a human-readable currency alongside the raw ether amount.
//!
//! A price lookup failure is never allowed to interrupt analysis: every
//! implementation swallows its own errors and reports them as `None`.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

const COINGECKO_URL: &str = "https://api.coingecko.com/api/v3/simple/price";

#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Current ether price in `currency` (e.g. `"usd"`), or `None` if the
    /// lookup failed for any reason.
    async fn eth_price(&self, currency: &str) -> Option<f64>;
}

pub struct CoingeckoOracle {
    client: Client,
    api_key: Option<String>,
}

impl CoingeckoOracle {
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }
}

#[derive(Debug, Deserialize)]
struct PriceResponse(std::collections::HashMap<String, Value>);

#[async_trait]
impl PriceOracle for CoingeckoOracle {
    async fn eth_price(&self, currency: &str) -> Option<f64> {
        let mut request = self
            .client
            .get(COINGECKO_URL)
            .query(&[("ids", "ethereum"), ("vs_currencies", currency)]);
        if let Some(api_key) = &self.api_key {
            request = request.header("x-cg-api-key", api_key);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(%error, "coingecko request failed");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "coingecko returned an error status");
            return None;
        }

        let body: PriceResponse = match response.json().await {
            Ok(body) => body,
            Err(error) => {
                tracing::warn!(%error, "failed to decode coingecko response");
                return None;
            }
        };

        body.0
            .get("ethereum")
            .and_then(|entry| entry.get(currency))
            .and_then(Value::as_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_nested_currency_field() {
        let body: PriceResponse =
            serde_json::from_str(r#"{"ethereum":{"usd":3456.78}}"#).unwrap();
        let price = body.0.get("ethereum").and_then(|e| e.get("usd")).and_then(Value::as_f64);
        assert_eq!(price, Some(3456.78));
    }
}
