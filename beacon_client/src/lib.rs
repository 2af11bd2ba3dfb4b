mod error;
mod http;
mod retry;
pub mod types;

pub use error::{Error, Result};
pub use http::HttpConsensusNode;

use std::collections::HashMap;

use async_trait::async_trait;
pub use consensus_client::ConsensusClient;
use watch_types::{Epoch, PublicKeyBytes, Slot};

pub mod consensus_client {
    use serde::{Deserialize, Serialize};

    /// The four beacon-client implementations this daemon knows how to talk
    /// to for endpoints that aren't uniform across clients (liveness,
    /// rewards). `Other` behaves like the default/Prysm variant.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum ConsensusClient {
        Lighthouse,
        Prysm,
        Teku,
        Nimbus,
        Other,
    }

    impl ConsensusClient {
        /// Prysm and Nimbus never implement the attestation-rewards
        /// endpoint.
        pub fn supports_rewards(self) -> bool {
            !matches!(self, ConsensusClient::Prysm | ConsensusClient::Nimbus)
        }
    }

    impl std::str::FromStr for ConsensusClient {
        type Err = String;
        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s.to_ascii_lowercase().as_str() {
                "lighthouse" => Ok(ConsensusClient::Lighthouse),
                "prysm" => Ok(ConsensusClient::Prysm),
                "teku" => Ok(ConsensusClient::Teku),
                "nimbus" => Ok(ConsensusClient::Nimbus),
                "other" => Ok(ConsensusClient::Other),
                other => Err(format!("unknown consensus client tag: {other}")),
            }
        }
    }
}

/// A single validator's liveness result for one epoch.
#[derive(Debug, Clone, Copy)]
pub struct Liveness {
    pub index: u64,
    pub is_live: bool,
}

/// A full (source, target, head) reward/penalty triple.
#[derive(Debug, Clone, Copy, Default)]
pub struct RewardTriple {
    pub source: i64,
    pub target: i64,
    pub head: i64,
}

#[derive(Debug, Clone, Default)]
pub struct AttestationRewards {
    /// Ideal (maximum attainable) rewards, keyed by effective balance.
    pub ideal_by_effective_balance: HashMap<u64, RewardTriple>,
    /// Earned rewards, keyed by validator index.
    pub earned_by_index: HashMap<u64, RewardTriple>,
}

#[derive(Debug, Clone)]
pub struct DecodedAttestation {
    pub slot: Slot,
    pub committee_index: u64,
    pub aggregation_bits_hex: String,
}

#[derive(Debug, Clone)]
pub struct DecodedBlock {
    pub slot: Slot,
    pub proposer_index: u64,
    pub attestations: Vec<DecodedAttestation>,
    pub execution_block_hash: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ValidatorRecord {
    pub index: u64,
    pub status: watch_types::ValidatorStatus,
    pub pubkey: PublicKeyBytes,
    pub effective_balance_gwei: u64,
    pub slashed: bool,
}

/// Committee duties for one epoch: `slot -> committee_index -> ordered
/// validator indices`.
pub type CommitteeDuties = HashMap<u64, HashMap<u64, Vec<u64>>>;

/// Proposer duties for one epoch: one `(slot, pubkey)` pair per slot.
pub type ProposerDuties = Vec<(Slot, PublicKeyBytes)>;

/// The narrow surface the engine needs from a beacon node. Implemented by
/// [`HttpConsensusNode`] in production and by hand-written fakes in tests.
#[async_trait]
pub trait ConsensusNode: Send + Sync {
    async fn genesis_time(&self) -> Result<u64>;

    /// `None` means no block/header at this slot (404) — a typed condition,
    /// never a failure.
    async fn header_slot(&self, id: HeaderId) -> Result<Option<Slot>>;

    async fn block(&self, slot: Slot) -> Result<Option<DecodedBlock>>;

    async fn proposer_duties(&self, epoch: Epoch) -> Result<ProposerDuties>;

    async fn validators(&self) -> Result<Vec<ValidatorRecord>>;

    async fn committees(&self, epoch: Epoch) -> Result<CommitteeDuties>;

    async fn attestation_rewards(
        &self,
        epoch: Epoch,
        indices: &[u64],
    ) -> Result<AttestationRewards>;

    async fn liveness(&self, epoch: Epoch, indices: &[u64]) -> Result<Vec<Liveness>>;
}

/// Identifies which header to fetch: a specific slot or one of the beacon
/// API's named identifiers.
#[derive(Debug, Clone, Copy)]
pub enum HeaderId {
    Slot(Slot),
    Genesis,
    Finalized,
    Head,
}

impl std::fmt::Display for HeaderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeaderId::Slot(slot) => write!(f, "{slot}"),
            HeaderId::Genesis => write!(f, "genesis"),
            HeaderId::Finalized => write!(f, "finalized"),
            HeaderId::Head => write!(f, "head"),
        }
    }
}
