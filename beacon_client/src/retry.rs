use std::future::Future;
use std::time::Duration;

use reqwest::{Response, StatusCode};

use crate::error::{Error, Result};

/// Which retry policy (§5) applies to a given beacon endpoint.
#[derive(Debug, Clone, Copy)]
pub enum RetryClass {
    /// `genesis`, `proposer_duties`, `validators`, `committees` — these
    /// reflect node-sync races, so 404/502/503 are all worth a retry.
    SyncRace,
    /// `block`, `header` — 404 is the authoritative "no block" answer and
    /// must not be retried; only 502/503 indicate the node itself is down.
    BlockLookup,
}

impl RetryClass {
    fn retryable_statuses(self) -> &'static [StatusCode] {
        match self {
            RetryClass::SyncRace => &[
                StatusCode::NOT_FOUND,
                StatusCode::BAD_GATEWAY,
                StatusCode::SERVICE_UNAVAILABLE,
            ],
            RetryClass::BlockLookup => &[StatusCode::BAD_GATEWAY, StatusCode::SERVICE_UNAVAILABLE],
        }
    }
}

const STATUS_RETRY_ATTEMPTS: u32 = 3;
const TRANSPORT_RETRY_ATTEMPTS: u32 = 5;
const TRANSPORT_RETRY_WAIT: Duration = Duration::from_secs(3);

fn is_transport_truncation(err: &reqwest::Error) -> bool {
    // A response that was cut off mid-stream surfaces from reqwest as a
    // body/decode error rather than a status code; timeouts count too,
    // since they're caused by the same class of flaky connection.
    err.is_body() || err.is_decode() || err.is_timeout()
}

/// Sends a request built fresh by `make_request` on every attempt, applying
/// both the per-status backoff (half-second-growing, up to 3 attempts) and
/// the transport-truncation retry (up to 5 attempts, 3-second waits).
pub async fn send_with_retry<F, Fut>(class: RetryClass, make_request: F) -> Result<Response>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<Response, reqwest::Error>>,
{
    for transport_attempt in 0..TRANSPORT_RETRY_ATTEMPTS {
        let mut last_response = None;
        for status_attempt in 1..=STATUS_RETRY_ATTEMPTS {
            match make_request().await {
                Ok(response) => {
                    if class.retryable_statuses().contains(&response.status())
                        && status_attempt < STATUS_RETRY_ATTEMPTS
                    {
                        tokio::time::sleep(Duration::from_millis(500 * status_attempt as u64))
                            .await;
                        last_response = Some(response);
                        continue;
                    }
                    return Ok(response);
                }
                Err(err) => {
                    if is_transport_truncation(&err) && transport_attempt + 1 < TRANSPORT_RETRY_ATTEMPTS {
                        tokio::time::sleep(TRANSPORT_RETRY_WAIT).await;
                        last_response = None;
                        break;
                    }
                    return Err(Error::Http(err));
                }
            }
        }
        if let Some(response) = last_response {
            return Ok(response);
        }
    }
    // Exhausted transport retries; make one last, unshielded attempt and
    // surface whatever it returns.
    make_request().await.map_err(Error::Http)
}

/// Maps a completed response into a `Result<T>`, collapsing 404 into the
/// typed `NoBlock` condition for `BlockLookup`-class endpoints.
pub async fn decode_or_no_block<T: serde::de::DeserializeOwned>(
    response: Response,
) -> Result<T> {
    if response.status() == StatusCode::NOT_FOUND {
        return Err(Error::NoBlock);
    }
    if !response.status().is_success() {
        return Err(Error::Status(response.status()));
    }
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(Error::Decode)
}
