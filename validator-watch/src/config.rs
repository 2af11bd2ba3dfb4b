//! Value-typed configuration, built once at startup from CLI flags and
//! environment variables. Never read again except the pubkeys file, which
//! is re-read every epoch by the engine itself.

use std::path::PathBuf;

use beacon_client::ConsensusClient;
use sensitive_url::SensitiveUrl;
use thiserror::Error;
use watch_types::ChainSpec;

use crate::cli::Cli;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid --cl-node url: {0}")]
    ClNodeUrl(#[source] sensitive_url::SensitiveError),
    #[error("invalid --el-node url: {0}")]
    ElNodeUrl(#[source] sensitive_url::SensitiveError),
    #[error("invalid MEV_RELAY_URLS entry: {0}")]
    RelayUrl(#[source] sensitive_url::SensitiveError),
}

/// Everything the binary needs to construct its collaborators and run the
/// engine. Chain timing uses mainnet defaults; this spec exposes no CLI
/// flags to override them.
pub struct Config {
    pub cl_node: SensitiveUrl,
    pub el_node: Option<SensitiveUrl>,
    pub pubkeys_file: Option<PathBuf>,
    pub cl_client: ConsensusClient,
    pub chain_spec: ChainSpec,
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<i64>,
    pub coingecko_api_key: Option<String>,
    /// MEV relay base URLs to query for block rewards, comma-separated in
    /// `MEV_RELAY_URLS`. Empty means the MEV side-channel is skipped.
    pub relay_urls: Vec<SensitiveUrl>,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let cl_node = SensitiveUrl::parse(&cli.cl_node).map_err(ConfigError::ClNodeUrl)?;
        let el_node = match cli.el_node.or_else(|| std::env::var("EL_NODE_URL").ok()) {
            Some(url) => Some(SensitiveUrl::parse(&url).map_err(ConfigError::ElNodeUrl)?),
            None => None,
        };

        let relay_urls = std::env::var("MEV_RELAY_URLS")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| SensitiveUrl::parse(s).map_err(ConfigError::RelayUrl))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            cl_node,
            el_node,
            pubkeys_file: cli.pubkeys_file,
            cl_client: cli.cl_client,
            chain_spec: ChainSpec::default(),
            telegram_token: std::env::var("TGBOT_TOKEN").ok(),
            telegram_chat_id: std::env::var("BASED_CHAT_ID")
                .ok()
                .and_then(|raw| raw.parse().ok()),
            coingecko_api_key: std::env::var("COINGECKO_APIKEY").ok(),
            relay_urls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_cl_node_url() {
        let cli = Cli {
            cl_node: "not a url".to_string(),
            el_node: None,
            pubkeys_file: None,
            cl_client: ConsensusClient::Other,
        };
        assert!(matches!(Config::from_cli(cli), Err(ConfigError::ClNodeUrl(_))));
    }

    #[test]
    fn accepts_well_formed_urls() {
        let cli = Cli {
            cl_node: "http://localhost:5052".to_string(),
            el_node: Some("http://localhost:8551".to_string()),
            pubkeys_file: None,
            cl_client: ConsensusClient::Lighthouse,
        };
        let config = Config::from_cli(cli).unwrap();
        assert!(config.el_node.is_some());
    }
}
