//! MEV-Boost relay side channel.
//!
//! Relays expose a public "delivered payloads" endpoint; this crate polls
//! one or more of them for the payload value a proposer was paid for a given
//! slot. Any single relay being unreachable or slow is not fatal — callers
//! iterate the configured list and stop at the first relay that actually
//! answers.

use async_trait::async_trait;
use reqwest::Client;
use sensitive_url::SensitiveUrl;
use serde::Deserialize;
use thiserror::Error;
use watch_types::Slot;

/// Path suffix appended to every relay's base URL.
pub const RELAY_PAYLOAD_URL: &str = "/relay/v1/data/bidtraces/proposer_payload_delivered";

#[derive(Debug, Error)]
pub enum Error {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to decode relay response: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A delivered-payload record, reduced to the one field the engine cares
/// about: the value paid to the proposer, in ether.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelayReward {
    pub value_eth: f64,
}

#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Queries every configured relay in order and returns the first
    /// non-empty payload record found for `slot`. Individual relay errors
    /// (connection refused, TLS failure, malformed body) are logged and
    /// skipped rather than propagated — one unreachable relay must not
    /// block analysis of a block proposed via a different one.
    async fn payload_value(&self, slot: Slot) -> Option<RelayReward>;
}

#[derive(Debug, Deserialize)]
struct DeliveredPayload {
    value: String,
}

/// Production [`RelayClient`]: a fixed list of relay base URLs, queried in
/// the order given.
pub struct HttpRelayClient {
    client: Client,
    relays: Vec<SensitiveUrl>,
}

impl HttpRelayClient {
    pub fn new(client: Client, relays: Vec<SensitiveUrl>) -> Self {
        Self { client, relays }
    }

    async fn query_one(&self, base: &SensitiveUrl, slot: Slot) -> Option<RelayReward> {
        let mut url = match base.full().join(RELAY_PAYLOAD_URL) {
            Ok(url) => url,
            Err(error) => {
                tracing::warn!(%base, %error, "malformed relay url, skipping");
                return None;
            }
        };
        url.query_pairs_mut().append_pair("slot", &slot.as_u64().to_string());

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(relay = %base, %error, "relay request failed, skipping");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::warn!(relay = %base, status = %response.status(), "relay returned an error status");
            return None;
        }

        let payloads: Vec<DeliveredPayload> = match response.json().await {
            Ok(payloads) => payloads,
            Err(error) => {
                tracing::warn!(relay = %base, %error, "failed to decode relay response");
                return None;
            }
        };

        let payload = payloads.into_iter().next()?;
        let wei: u128 = match payload.value.parse() {
            Ok(wei) => wei,
            Err(error) => {
                tracing::warn!(relay = %base, %error, "relay returned a non-numeric value");
                return None;
            }
        };
        Some(RelayReward {
            value_eth: wei_to_eth(wei),
        })
    }
}

#[async_trait]
impl RelayClient for HttpRelayClient {
    async fn payload_value(&self, slot: Slot) -> Option<RelayReward> {
        for relay in &self.relays {
            if let Some(reward) = self.query_one(relay, slot).await {
                return Some(reward);
            }
        }
        None
    }
}

/// Converts a wei amount (as carried in relay JSON) into ether.
fn wei_to_eth(wei: u128) -> f64 {
    wei as f64 / 1_000_000_000_000_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wei_to_eth_converts_exactly() {
        assert_eq!(wei_to_eth(1_000_000_000_000_000_000), 1.0);
        assert_eq!(wei_to_eth(500_000_000_000_000_000), 0.5);
        assert_eq!(wei_to_eth(0), 0.0);
    }
}
