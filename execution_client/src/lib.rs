//! Execution-layer JSON-RPC client.
//!
//! Used only for optional execution-side inspection of a proposed block's
//! payload (the core analytical modules do not depend on its result); kept
//! as its own crate so the engine can run with no execution node
//! configured at all.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use sensitive_url::SensitiveUrl;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("execution node returned a JSON-RPC error: {0}")]
    Rpc(String),
    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone)]
pub struct ExecutionTransaction {
    pub to: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExecutionBlock {
    pub hash: String,
    pub transactions: Vec<ExecutionTransaction>,
}

#[async_trait]
pub trait ExecutionNode: Send + Sync {
    async fn get_block_by_hash(&self, hash: &str) -> Result<Option<ExecutionBlock>>;
}

pub struct HttpExecutionNode {
    client: Client,
    url: SensitiveUrl,
}

impl HttpExecutionNode {
    pub fn new(client: Client, url: SensitiveUrl) -> Self {
        Self { client, url }
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'a str,
    method: &'a str,
    params: (String, bool),
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<RawBlock>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct RawBlock {
    hash: String,
    #[serde(default)]
    transactions: Vec<RawTransaction>,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    to: Option<String>,
}

#[async_trait]
impl ExecutionNode for HttpExecutionNode {
    async fn get_block_by_hash(&self, hash: &str) -> Result<Option<ExecutionBlock>> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: "eth_getBlockByHash",
            params: (hash.to_string(), true),
            id: 1,
        };

        // `ExecutionNode` retries on 404 only (spec §5) — a round-trip-time
        // backoff similar to the sync-race beacon endpoints.
        let mut response = None;
        for attempt in 1..=3u32 {
            let sent = self.client.post(self.url.full().clone()).json(&request).send().await?;
            if sent.status() == reqwest::StatusCode::NOT_FOUND && attempt < 3 {
                tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
                continue;
            }
            response = Some(sent);
            break;
        }
        let response = response.expect("loop always assigns on its final iteration");

        let body: JsonRpcResponse = response.json().await?;
        if let Some(error) = body.error {
            return Err(Error::Rpc(error.message));
        }
        Ok(body.result.map(|block| ExecutionBlock {
            hash: block.hash,
            transactions: block
                .transactions
                .into_iter()
                .map(|t| ExecutionTransaction { to: t.to })
                .collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_shape_matches_eth_get_block_by_hash() {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: "eth_getBlockByHash",
            params: ("0xabc".to_string(), true),
            id: 1,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["method"], "eth_getBlockByHash");
        assert_eq!(value["params"][1], true);
    }
}
