//! Entry point: parses the CLI, wires up every collaborator, and runs the
//! engine until interrupted.

mod cli;
mod config;
mod engine;
mod metrics_server;
mod slot_stream;

use std::sync::Arc;
use std::time::Duration;

use beacon_client::HttpConsensusNode;
use clap::Parser;
use cli::Cli;
use config::Config;
use engine::Engine;
use execution_client::HttpExecutionNode;
use messenger::TelegramMessenger;
use price_oracle::CoingeckoOracle;
use relay_client::HttpRelayClient;
use slot_clock::{SlotClock, SystemSlotClock};
use watch_types::Slot;

const METRICS_PORT: u16 = 8000;
const PRICE_CURRENCY: &str = "usd";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_cli(cli)?;

    logging::init_tracing("info", false);

    let http_client = reqwest::Client::new();

    let consensus = Arc::new(HttpConsensusNode::new(
        http_client.clone(),
        config.cl_node.clone(),
        config.cl_client,
    ));

    // Constructed whenever an execution node is configured, but not wired
    // into the engine: the core analysis does not presently depend on its
    // result (see module docs on `execution_client`).
    if let Some(el_node) = &config.el_node {
        let _execution = HttpExecutionNode::new(http_client.clone(), el_node.clone());
        tracing::info!(url = %el_node, "execution node configured for future use");
    }

    let relay = Arc::new(HttpRelayClient::new(http_client.clone(), config.relay_urls.clone()));
    let price_oracle = Arc::new(CoingeckoOracle::new(http_client.clone(), config.coingecko_api_key));

    let messenger: Arc<dyn messenger::Messenger> = match config.telegram_token {
        Some(token) => Arc::new(TelegramMessenger::new(http_client.clone(), token, config.telegram_chat_id)),
        None => {
            tracing::warn!("TGBOT_TOKEN not set; alerts will not be delivered anywhere");
            Arc::new(TelegramMessenger::new(http_client.clone(), String::new(), None))
        }
    };

    let genesis_time = consensus.genesis_time().await?;
    let clock: Arc<dyn SlotClock> = Arc::new(SystemSlotClock::new(
        Slot::new(0),
        Duration::from_secs(genesis_time),
        Duration::from_secs(config.chain_spec.seconds_per_slot),
    ));

    let mut engine = Engine::new(
        consensus,
        relay,
        messenger,
        price_oracle,
        clock,
        config.chain_spec,
        config.pubkeys_file,
        config.cl_client,
        PRICE_CURRENCY.to_string(),
        METRICS_PORT,
    );

    let shutdown = Box::pin(async {
        let _ = tokio::signal::ctrl_c().await;
    });

    engine.run(shutdown).await;

    tracing::info!("validator-watch exiting");
    Ok(())
}
