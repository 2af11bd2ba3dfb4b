//! Command-line surface: one `run` verb exposed as the binary's only
//! behavior, so there is no `Commands` enum for a single variant.

use beacon_client::ConsensusClient;
use clap::Parser;

fn parse_consensus_client(raw: &str) -> Result<ConsensusClient, String> {
    raw.parse()
}

#[derive(Debug, Parser)]
#[command(name = "validator-watch", about = "Real-time beacon-chain validator monitor")]
pub struct Cli {
    /// Base URL of the consensus (beacon) node to monitor.
    #[arg(long = "cl-node")]
    pub cl_node: String,

    /// Base URL of an execution node, used only for optional payload inspection.
    #[arg(long = "el-node")]
    pub el_node: Option<String>,

    /// Path to a file of hex-encoded validator public keys, one per line.
    /// Re-read at the start of every epoch.
    #[arg(long = "pubkeys-file")]
    pub pubkeys_file: Option<std::path::PathBuf>,

    /// The consensus client implementation running behind `--cl-node`,
    /// selecting the liveness and rewards request shapes to use.
    #[arg(long = "cl-client", default_value = "other", value_parser = parse_consensus_client)]
    pub cl_client: ConsensusClient,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_other_client() {
        let cli = Cli::parse_from(["validator-watch", "--cl-node", "http://localhost:5052"]);
        assert!(matches!(cli.cl_client, ConsensusClient::Other));
        assert!(cli.el_node.is_none());
        assert!(cli.pubkeys_file.is_none());
    }

    #[test]
    fn parses_every_client_tag() {
        for tag in ["lighthouse", "prysm", "teku", "nimbus", "other"] {
            let cli = Cli::parse_from([
                "validator-watch",
                "--cl-node",
                "http://localhost:5052",
                "--cl-client",
                tag,
            ]);
            let _ = cli.cl_client;
        }
    }
}
