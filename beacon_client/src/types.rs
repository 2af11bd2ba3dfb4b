use serde::{Deserialize, Serialize};
use watch_types::PublicKeyBytes;

#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub struct GenesisData {
    #[serde(with = "serde_as_str")]
    pub genesis_time: u64,
}

#[derive(Debug, Deserialize)]
pub struct HeaderData {
    pub header: HeaderMessageEnvelope,
}

#[derive(Debug, Deserialize)]
pub struct HeaderMessageEnvelope {
    pub message: HeaderMessage,
}

#[derive(Debug, Deserialize)]
pub struct HeaderMessage {
    #[serde(with = "serde_as_str")]
    pub slot: u64,
}

#[derive(Debug, Deserialize)]
pub struct BlockData {
    pub message: BlockMessage,
}

#[derive(Debug, Deserialize)]
pub struct BlockMessage {
    #[serde(with = "serde_as_str")]
    pub slot: u64,
    #[serde(with = "serde_as_str")]
    pub proposer_index: u64,
    pub body: BlockBody,
}

#[derive(Debug, Deserialize)]
pub struct BlockBody {
    #[serde(default)]
    pub attestations: Vec<Attestation>,
    pub execution_payload: Option<ExecutionPayloadHeader>,
}

#[derive(Debug, Deserialize)]
pub struct ExecutionPayloadHeader {
    pub fee_recipient: String,
    pub block_hash: String,
}

#[derive(Debug, Deserialize)]
pub struct Attestation {
    pub aggregation_bits: String,
    pub data: AttestationData,
}

#[derive(Debug, Deserialize)]
pub struct AttestationData {
    #[serde(with = "serde_as_str")]
    pub slot: u64,
    #[serde(with = "serde_as_str")]
    pub index: u64,
}

#[derive(Debug, Deserialize)]
pub struct ProposerDutiesData {
    pub dependent_root: String,
    pub data: Vec<ProposerDuty>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProposerDuty {
    pub pubkey: PublicKeyBytes,
    #[serde(with = "serde_as_str")]
    pub validator_index: u64,
    #[serde(with = "serde_as_str")]
    pub slot: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ValidatorEntry {
    #[serde(with = "serde_as_str")]
    pub index: u64,
    pub status: String,
    pub validator: ValidatorDetail,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ValidatorDetail {
    pub pubkey: PublicKeyBytes,
    #[serde(with = "serde_as_str")]
    pub effective_balance: u64,
    pub slashed: bool,
}

#[derive(Debug, Deserialize)]
pub struct CommitteeEntry {
    #[serde(with = "serde_as_str")]
    pub index: u64,
    #[serde(with = "serde_as_str")]
    pub slot: u64,
    pub validators: Vec<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RewardsData {
    pub ideal_rewards: Vec<IdealReward>,
    pub total_rewards: Vec<TotalReward>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IdealReward {
    #[serde(with = "serde_as_str")]
    pub effective_balance: u64,
    #[serde(with = "serde_as_str_signed")]
    pub source: i64,
    #[serde(with = "serde_as_str_signed")]
    pub target: i64,
    #[serde(with = "serde_as_str_signed")]
    pub head: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TotalReward {
    #[serde(with = "serde_as_str")]
    pub validator_index: u64,
    #[serde(with = "serde_as_str_signed")]
    pub source: i64,
    #[serde(with = "serde_as_str_signed")]
    pub target: i64,
    #[serde(with = "serde_as_str_signed")]
    pub head: i64,
}

#[derive(Debug, Serialize)]
pub struct LivenessRequestDefault(pub Vec<String>);

#[derive(Debug, Serialize)]
pub struct LivenessRequestLighthouse {
    pub epoch: u64,
    pub indices: Vec<u64>,
}

#[derive(Debug, Serialize)]
pub struct LivenessRequestTeku {
    pub indices: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct LivenessResponse {
    pub data: Vec<LivenessEntry>,
}

#[derive(Debug, Deserialize)]
pub struct LivenessEntry {
    #[serde(with = "serde_as_str")]
    pub index: u64,
    pub is_live: bool,
}

/// The beacon API renders most integer fields as JSON strings. These two
/// helper modules decode (and, for requests, encode) them transparently so
/// the rest of the crate can work with plain `u64`/`i64`.
mod serde_as_str {
    use serde::{de::Error, Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<u64>().map_err(D::Error::custom)
    }
}

mod serde_as_str_signed {
    use serde::{de::Error, Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<i64>().map_err(D::Error::custom)
    }
}
