use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Client;
use sensitive_url::SensitiveUrl;
use watch_types::{Epoch, Slot, ValidatorStatus};

use crate::error::{Error, Result};
use crate::retry::{decode_or_no_block, send_with_retry, RetryClass};
use crate::types::*;
use crate::{
    AttestationRewards, CommitteeDuties, ConsensusClient, ConsensusNode, DecodedAttestation,
    DecodedBlock, HeaderId, Liveness, ProposerDuties, RewardTriple, ValidatorRecord,
};

/// Production [`ConsensusNode`]: talks to a single beacon node over HTTP.
///
/// Proposer duties are memoized for the lifetime of the process (duties are
/// stable once finalized); committees are memoized for the single most
/// recently requested epoch only, since they're only ever needed for the
/// current or immediately preceding epoch.
pub struct HttpConsensusNode {
    client: Client,
    base_url: SensitiveUrl,
    client_tag: ConsensusClient,
    proposer_duty_cache: Mutex<HashMap<u64, ProposerDuties>>,
    committee_cache: Mutex<Option<(u64, CommitteeDuties)>>,
}

impl HttpConsensusNode {
    pub fn new(client: Client, base_url: SensitiveUrl, client_tag: ConsensusClient) -> Self {
        Self {
            client,
            base_url,
            client_tag,
            proposer_duty_cache: Mutex::new(HashMap::new()),
            committee_cache: Mutex::new(None),
        }
    }

    fn url(&self, path: &str) -> reqwest::Url {
        self.base_url
            .full()
            .join(path)
            .expect("path is a fixed, known-good literal")
    }
}

fn parse_status(raw: &str) -> Option<ValidatorStatus> {
    match raw {
        "pending_initialized" => Some(ValidatorStatus::PendingInitialized),
        "pending_queued" => Some(ValidatorStatus::PendingQueued),
        "active_ongoing" => Some(ValidatorStatus::ActiveOngoing),
        "active_exiting" => Some(ValidatorStatus::ActiveExiting),
        "active_slashed" => Some(ValidatorStatus::ActiveSlashed),
        "exited_unslashed" => Some(ValidatorStatus::ExitedUnslashed),
        "exited_slashed" => Some(ValidatorStatus::ExitedSlashed),
        "withdrawal_possible" => Some(ValidatorStatus::WithdrawalPossible),
        "withdrawal_done" => Some(ValidatorStatus::WithdrawalDone),
        _ => None,
    }
}

#[async_trait]
impl ConsensusNode for HttpConsensusNode {
    async fn genesis_time(&self) -> Result<u64> {
        let url = self.url("eth/v1/beacon/genesis");
        let response = send_with_retry(RetryClass::SyncRace, || self.client.get(url.clone()).send())
            .await?;
        let envelope: Envelope<GenesisData> = decode_or_no_block(response).await?;
        Ok(envelope.data.genesis_time)
    }

    async fn header_slot(&self, id: HeaderId) -> Result<Option<Slot>> {
        let url = self.url(&format!("eth/v1/beacon/headers/{id}"));
        let response =
            send_with_retry(RetryClass::BlockLookup, || self.client.get(url.clone()).send())
                .await?;
        match decode_or_no_block::<Envelope<HeaderData>>(response).await {
            Ok(envelope) => Ok(Some(Slot::new(envelope.data.header.message.slot))),
            Err(Error::NoBlock) => Ok(None),
            Err(other) => Err(other),
        }
    }

    async fn block(&self, slot: Slot) -> Result<Option<DecodedBlock>> {
        let url = self.url(&format!("eth/v2/beacon/blocks/{}", slot.as_u64()));
        let response =
            send_with_retry(RetryClass::BlockLookup, || self.client.get(url.clone()).send())
                .await?;
        match decode_or_no_block::<Envelope<BlockData>>(response).await {
            Ok(envelope) => {
                let message = envelope.data.message;
                let attestations = message
                    .body
                    .attestations
                    .into_iter()
                    .map(|attestation| DecodedAttestation {
                        slot: Slot::new(attestation.data.slot),
                        committee_index: attestation.data.index,
                        aggregation_bits_hex: attestation.aggregation_bits,
                    })
                    .collect();
                Ok(Some(DecodedBlock {
                    slot: Slot::new(message.slot),
                    proposer_index: message.proposer_index,
                    attestations,
                    execution_block_hash: message.body.execution_payload.map(|p| p.block_hash),
                }))
            }
            Err(Error::NoBlock) => Ok(None),
            Err(other) => Err(other),
        }
    }

    async fn proposer_duties(&self, epoch: Epoch) -> Result<ProposerDuties> {
        if let Some(cached) = self.proposer_duty_cache.lock().unwrap().get(&epoch.as_u64()) {
            return Ok(cached.clone());
        }

        let url = self.url(&format!("eth/v1/validator/duties/proposer/{}", epoch.as_u64()));
        let response =
            send_with_retry(RetryClass::SyncRace, || self.client.get(url.clone()).send()).await?;
        let envelope: Envelope<ProposerDutiesData> = decode_or_no_block(response).await?;
        let duties: ProposerDuties = envelope
            .data
            .data
            .into_iter()
            .map(|duty| (Slot::new(duty.slot), duty.pubkey))
            .collect();

        self.proposer_duty_cache
            .lock()
            .unwrap()
            .insert(epoch.as_u64(), duties.clone());
        Ok(duties)
    }

    async fn validators(&self) -> Result<Vec<ValidatorRecord>> {
        let url = self.url("eth/v1/beacon/states/head/validators");
        let response =
            send_with_retry(RetryClass::SyncRace, || self.client.get(url.clone()).send()).await?;
        let envelope: Envelope<Vec<ValidatorEntry>> = decode_or_no_block(response).await?;
        Ok(envelope
            .data
            .into_iter()
            .filter_map(|entry| {
                let status = parse_status(&entry.status)?;
                Some(ValidatorRecord {
                    index: entry.index,
                    status,
                    pubkey: entry.validator.pubkey,
                    effective_balance_gwei: entry.validator.effective_balance,
                    slashed: entry.validator.slashed,
                })
            })
            .collect())
    }

    async fn committees(&self, epoch: Epoch) -> Result<CommitteeDuties> {
        if let Some((cached_epoch, cached)) = self.committee_cache.lock().unwrap().as_ref() {
            if *cached_epoch == epoch.as_u64() {
                return Ok(cached.clone());
            }
        }

        let url = {
            let mut url = self.url("eth/v1/beacon/states/head/committees");
            url.query_pairs_mut().append_pair("epoch", &epoch.as_u64().to_string());
            url
        };
        let response =
            send_with_retry(RetryClass::SyncRace, || self.client.get(url.clone()).send()).await?;
        let envelope: Envelope<Vec<CommitteeEntry>> = decode_or_no_block(response).await?;

        let mut duties: CommitteeDuties = HashMap::new();
        for entry in envelope.data {
            duties
                .entry(entry.slot)
                .or_default()
                .insert(entry.index, entry.validators);
        }

        *self.committee_cache.lock().unwrap() = Some((epoch.as_u64(), duties.clone()));
        Ok(duties)
    }

    async fn attestation_rewards(
        &self,
        epoch: Epoch,
        indices: &[u64],
    ) -> Result<AttestationRewards> {
        if !self.client_tag.supports_rewards() {
            return Ok(AttestationRewards::default());
        }

        let url = self.url(&format!("eth/v1/beacon/rewards/attestations/{}", epoch.as_u64()));
        let body: Vec<String> = indices.iter().map(u64::to_string).collect();
        let response = send_with_retry(RetryClass::SyncRace, || {
            self.client.post(url.clone()).json(&body).send()
        })
        .await?;
        let envelope: Envelope<RewardsData> = decode_or_no_block(response).await?;

        let ideal_by_effective_balance = envelope
            .data
            .ideal_rewards
            .into_iter()
            .map(|r| {
                (
                    r.effective_balance,
                    RewardTriple {
                        source: r.source,
                        target: r.target,
                        head: r.head,
                    },
                )
            })
            .collect();
        let earned_by_index = envelope
            .data
            .total_rewards
            .into_iter()
            .map(|r| {
                (
                    r.validator_index,
                    RewardTriple {
                        source: r.source,
                        target: r.target,
                        head: r.head,
                    },
                )
            })
            .collect();

        Ok(AttestationRewards {
            ideal_by_effective_balance,
            earned_by_index,
        })
    }

    async fn liveness(&self, epoch: Epoch, indices: &[u64]) -> Result<Vec<Liveness>> {
        if matches!(self.client_tag, ConsensusClient::Nimbus) {
            return Ok(indices
                .iter()
                .map(|&index| Liveness { index, is_live: true })
                .collect());
        }

        let response = match self.client_tag {
            ConsensusClient::Lighthouse => {
                let url = self.url("lighthouse/liveness");
                let body = LivenessRequestLighthouse {
                    epoch: epoch.as_u64(),
                    indices: indices.to_vec(),
                };
                send_with_retry(RetryClass::SyncRace, || {
                    self.client.post(url.clone()).json(&body).send()
                })
                .await?
            }
            ConsensusClient::Teku => {
                let url = self.url(&format!("eth/v1/validator/liveness/{}", epoch.as_u64()));
                let body = LivenessRequestTeku {
                    indices: indices.iter().map(u64::to_string).collect(),
                };
                send_with_retry(RetryClass::SyncRace, || {
                    self.client.post(url.clone()).json(&body).send()
                })
                .await?
            }
            ConsensusClient::Prysm | ConsensusClient::Other | ConsensusClient::Nimbus => {
                let url = self.url(&format!("eth/v1/validator/liveness/{}", epoch.as_u64()));
                let body = LivenessRequestDefault(indices.iter().map(u64::to_string).collect());
                send_with_retry(RetryClass::SyncRace, || {
                    self.client.post(url.clone()).json(&body).send()
                })
                .await?
            }
        };

        if response.status() == reqwest::StatusCode::BAD_REQUEST {
            // Epoch too old, or a client/tag mismatch: a permanent failure
            // for this request. Assume all queried validators are live
            // rather than aborting the epoch's analysis.
            return Ok(indices
                .iter()
                .map(|&index| Liveness { index, is_live: true })
                .collect());
        }

        let envelope: Envelope<Vec<LivenessEntry>> = decode_or_no_block(response).await?;
        Ok(envelope
            .data
            .into_iter()
            .map(|entry| Liveness {
                index: entry.index,
                is_live: entry.is_live,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_id_formats_as_the_beacon_api_expects() {
        assert_eq!(HeaderId::Slot(Slot::new(5)).to_string(), "5");
        assert_eq!(HeaderId::Finalized.to_string(), "finalized");
    }

    #[test]
    fn nimbus_client_does_not_support_rewards() {
        assert!(!ConsensusClient::Nimbus.supports_rewards());
        assert!(ConsensusClient::Lighthouse.supports_rewards());
    }

    fn node(server_url: &str, client_tag: ConsensusClient) -> HttpConsensusNode {
        HttpConsensusNode::new(
            Client::new(),
            SensitiveUrl::parse(server_url).unwrap(),
            client_tag,
        )
    }

    #[tokio::test]
    async fn genesis_time_decodes_the_envelope() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/eth/v1/beacon/genesis")
            .with_status(200)
            .with_body(r#"{"data":{"genesis_time":"1606824023"}}"#)
            .create_async()
            .await;

        let node = node(&server.url(), ConsensusClient::Other);
        let genesis_time = node.genesis_time().await.unwrap();

        assert_eq!(genesis_time, 1_606_824_023);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn header_slot_returns_none_on_404_without_retrying() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/eth/v1/beacon/headers/finalized")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let node = node(&server.url(), ConsensusClient::Other);
        let header = node.header_slot(HeaderId::Finalized).await.unwrap();

        assert_eq!(header, None);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn header_slot_retries_past_a_502_then_succeeds() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("GET", "/eth/v1/beacon/headers/5")
            .with_status(502)
            .expect(1)
            .create_async()
            .await;
        let succeeding = server
            .mock("GET", "/eth/v1/beacon/headers/5")
            .with_status(200)
            .with_body(r#"{"data":{"header":{"message":{"slot":"5"}}}}"#)
            .expect(1)
            .create_async()
            .await;

        let node = node(&server.url(), ConsensusClient::Other);
        let header = node.header_slot(HeaderId::Slot(Slot::new(5))).await.unwrap();

        assert_eq!(header, Some(Slot::new(5)));
        failing.assert_async().await;
        succeeding.assert_async().await;
    }

    #[tokio::test]
    async fn liveness_bad_request_assumes_all_queried_validators_are_live() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/eth/v1/validator/liveness/3")
            .with_status(400)
            .create_async()
            .await;

        let node = node(&server.url(), ConsensusClient::Other);
        let liveness = node.liveness(Epoch::new(3), &[1, 2]).await.unwrap();

        assert_eq!(liveness.len(), 2);
        assert!(liveness.iter().all(|entry| entry.is_live));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn liveness_dispatches_to_the_lighthouse_endpoint_and_body_shape() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/lighthouse/liveness")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "epoch": 3,
                "indices": [1, 2],
            })))
            .with_status(200)
            .with_body(r#"{"data":[{"index":"1","is_live":true},{"index":"2","is_live":false}]}"#)
            .create_async()
            .await;

        let node = node(&server.url(), ConsensusClient::Lighthouse);
        let liveness = node.liveness(Epoch::new(3), &[1, 2]).await.unwrap();

        assert_eq!(liveness.len(), 2);
        assert!(liveness.iter().any(|e| e.index == 1 && e.is_live));
        assert!(liveness.iter().any(|e| e.index == 2 && !e.is_live));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn nimbus_liveness_never_calls_the_network() {
        let node = node("http://127.0.0.1:1", ConsensusClient::Nimbus);
        let liveness = node.liveness(Epoch::new(3), &[1, 2, 3]).await.unwrap();
        assert!(liveness.iter().all(|entry| entry.is_live));
    }
}
