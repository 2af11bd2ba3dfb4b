use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The beacon node reported no block/header at the requested slot or
    /// identifier (HTTP 404). Callers treat this as a typed condition, not
    /// a failure — a missed or orphaned block looks exactly like this.
    #[error("no block at the requested slot or identifier")]
    NoBlock,
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("beacon node returned unexpected status {0}")]
    Status(reqwest::StatusCode),
}

pub type Result<T> = std::result::Result<T, Error>;
