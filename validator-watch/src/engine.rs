//! The main orchestration loop (spec §4.11): one iteration per slot,
//! refreshing epoch-scoped state at epoch boundaries and invoking each
//! analytical module at its prescribed offset. All mutable state lives in
//! [`EngineState`], constructed once and threaded through by `&mut self` —
//! there is no global mutable state anywhere in this crate.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use beacon_client::{ConsensusClient, ConsensusNode, HeaderId};
use futures::StreamExt;
use messenger::Messenger;
use price_oracle::PriceOracle;
use relay_client::RelayClient;
use slot_clock::SlotClock;
use watch_analysis::{
    dispatch, ActivationQueueEstimator, AttestationAnalyzer, BlockProposalMonitor, ExitedTracker,
    MissedAttestationDetector, RewardsComparator, SlashedTracker,
};
use watch_types::{parse_pubkeys_file, ChainSpec, Epoch, OwnKeySet, Slot, ValidatorSetSnapshot, ValidatorStatus};

use crate::slot_stream::slot_stream;

/// Sleeps until `target`, a duration since the UNIX epoch. Returns
/// immediately if `target` has already passed.
async fn sleep_until(target: Duration) {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    if target > now {
        tokio::time::sleep(target - now).await;
    }
}

/// Mutable state the engine carries from one slot to the next. Held
/// separately from the collaborators and spec constants so the loop body
/// can borrow both without fighting the borrow checker.
struct EngineState {
    own_keys: OwnKeySet,
    active_snapshots: watch_types::BoundedEpochCache<ValidatorSetSnapshot>,
    last_processed_epoch: Option<Epoch>,
    last_processed_finalized_slot: Option<Slot>,
    missed_attestations_done_for: Option<Epoch>,
    rewards_done_for: Option<Epoch>,
    metrics_server_started: bool,

    activation_queue: ActivationQueueEstimator,
    block_monitor: BlockProposalMonitor,
    attestation_analyzer: AttestationAnalyzer,
    missed_attestation: MissedAttestationDetector,
    rewards_comparator: RewardsComparator,
    exited_tracker: ExitedTracker,
    slashed_tracker: SlashedTracker,

    slot_gauge: metrics::Result<metrics::IntGauge>,
    epoch_gauge: metrics::Result<metrics::IntGauge>,
    network_pending_gauge: metrics::Result<metrics::IntGauge>,
    network_active_gauge: metrics::Result<metrics::IntGauge>,
    eth_price_gauge: metrics::Result<metrics::Gauge>,
}

impl EngineState {
    fn new() -> Self {
        Self {
            own_keys: OwnKeySet::empty(),
            active_snapshots: watch_types::BoundedEpochCache::new(watch_types::EPOCH_CACHE_DEPTH),
            last_processed_epoch: None,
            last_processed_finalized_slot: None,
            missed_attestations_done_for: None,
            rewards_done_for: None,
            metrics_server_started: false,
            activation_queue: ActivationQueueEstimator::new(),
            block_monitor: BlockProposalMonitor::new(),
            attestation_analyzer: AttestationAnalyzer::new(),
            missed_attestation: MissedAttestationDetector::new(),
            rewards_comparator: RewardsComparator::new(),
            exited_tracker: ExitedTracker::new(),
            slashed_tracker: SlashedTracker::new(),
            slot_gauge: metrics::try_create_int_gauge("current_slot", "Most recently observed slot"),
            epoch_gauge: metrics::try_create_int_gauge("current_epoch", "Most recently observed epoch"),
            network_pending_gauge: metrics::try_create_int_gauge(
                "network_validators_pending",
                "Count of network validators in pending_queued status",
            ),
            network_active_gauge: metrics::try_create_int_gauge(
                "network_validators_active",
                "Count of network validators in an active status",
            ),
            eth_price_gauge: metrics::try_create_gauge(
                "eth_price",
                "Most recently fetched ether spot price, in the configured currency",
            ),
        }
    }
}

/// The collaborators and configuration the engine is constructed with.
/// Everything here is injected so the orchestration logic can be driven by
/// fakes in tests.
pub struct Engine {
    consensus: Arc<dyn ConsensusNode>,
    relay: Arc<dyn RelayClient>,
    messenger: Arc<dyn Messenger>,
    price_oracle: Arc<dyn PriceOracle>,
    clock: Arc<dyn SlotClock>,
    spec: ChainSpec,
    pubkeys_file: Option<PathBuf>,
    client_tag: ConsensusClient,
    price_currency: String,
    metrics_port: u16,
    state: EngineState,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        consensus: Arc<dyn ConsensusNode>,
        relay: Arc<dyn RelayClient>,
        messenger: Arc<dyn Messenger>,
        price_oracle: Arc<dyn PriceOracle>,
        clock: Arc<dyn SlotClock>,
        spec: ChainSpec,
        pubkeys_file: Option<PathBuf>,
        client_tag: ConsensusClient,
        price_currency: String,
        metrics_port: u16,
    ) -> Self {
        Self {
            consensus,
            relay,
            messenger,
            price_oracle,
            clock,
            spec,
            pubkeys_file,
            client_tag,
            price_currency,
            metrics_port,
            state: EngineState::new(),
        }
    }

    /// Runs the orchestration loop until `shutdown` resolves. A graceful
    /// interrupt truncates the in-flight iteration rather than the whole
    /// process being killed mid-HTTP-call.
    pub async fn run(&mut self, mut shutdown: impl std::future::Future<Output = ()> + Unpin) {
        let mut ticks = Box::pin(slot_stream(self.clock.clone()));

        loop {
            let next = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("shutdown signal received, exiting cleanly");
                    return;
                }
                tick = ticks.next() => tick,
            };

            let Some((raw_slot, slot_start_time)) = next else {
                return;
            };

            if raw_slot < 0 {
                tracing::info!(slot = raw_slot, "pre-genesis, counting down");
                continue;
            }

            self.process_slot(Slot::new(raw_slot as u64), slot_start_time).await;

            if !self.state.metrics_server_started {
                crate::metrics_server::spawn(self.metrics_port);
                self.state.metrics_server_started = true;
            }
        }
    }

    async fn process_slot(&mut self, slot: Slot, slot_start_time: Duration) {
        let epoch = slot.epoch_for(&self.spec);
        let slot_in_epoch = slot.slot_in_epoch(self.spec.slots_per_epoch);
        metrics::set_int_gauge(&self.state.slot_gauge, slot.as_u64() as i64);
        metrics::set_int_gauge(&self.state.epoch_gauge, epoch.as_u64() as i64);

        let is_new_epoch = self.state.last_processed_epoch != Some(epoch);

        if self.state.last_processed_finalized_slot.is_none() {
            self.state.last_processed_finalized_slot = Some(slot);
        }

        if is_new_epoch {
            self.refresh_epoch_state(epoch).await;
            self.state.last_processed_epoch = Some(epoch);
        }

        if slot_in_epoch >= self.spec.slot_for_missed_attestations_process
            && self.state.missed_attestations_done_for != Some(epoch)
        {
            self.run_missed_attestations(epoch).await;
            self.state.missed_attestations_done_for = Some(epoch);
        }

        if slot_in_epoch >= self.spec.slot_for_rewards_process
            && self.state.rewards_done_for != Some(epoch)
        {
            self.run_rewards_comparator(epoch).await;
            self.state.rewards_done_for = Some(epoch);
        }

        self.run_future_lookahead(slot, epoch, is_new_epoch).await;
        self.run_finalized_reconciliation(slot).await;

        sleep_until(slot_start_time + Duration::from_secs(self.spec.missed_block_timeout_sec)).await;

        let block = match self.consensus.block(slot).await {
            Ok(block) => block,
            Err(error) => {
                tracing::warn!(%slot, %error, "failed to fetch block for slot");
                None
            }
        };

        if let Some(block) = &block {
            self.run_attestation_analysis(block).await;
        }

        self.run_head_check(slot, epoch, block.as_ref()).await;
    }

    async fn refresh_epoch_state(&mut self, epoch: Epoch) {
        self.messenger.refresh_chats().await;

        self.state.own_keys = match &self.pubkeys_file {
            None => OwnKeySet::empty(),
            Some(path) => match tokio::fs::read_to_string(path).await {
                Ok(contents) => match parse_pubkeys_file(&contents) {
                    Ok(keys) => keys,
                    Err(error) => {
                        tracing::warn!(%error, path = %path.display(), "invalid pubkeys file, keeping previous key set");
                        self.state.own_keys.clone()
                    }
                },
                Err(error) => {
                    tracing::warn!(%error, path = %path.display(), "failed to read pubkeys file, keeping previous key set");
                    self.state.own_keys.clone()
                }
            },
        };

        let validators = match self.consensus.validators().await {
            Ok(validators) => validators,
            Err(error) => {
                tracing::warn!(%error, "failed to fetch validator set, skipping epoch refresh");
                return;
            }
        };

        let mut snapshot = ValidatorSetSnapshot::default();
        for record in validators {
            snapshot.insert(
                record.index,
                record.status,
                watch_types::Validator {
                    pubkey: record.pubkey,
                    effective_balance_gwei: record.effective_balance_gwei,
                    slashed: record.slashed,
                },
            );
        }

        let pending = snapshot.pending_queued();
        let active = snapshot.active();
        metrics::set_int_gauge(&self.state.network_pending_gauge, pending.len() as i64);
        metrics::set_int_gauge(&self.state.network_active_gauge, active.len() as i64);

        if let Err(error) = self.state.activation_queue.estimate(
            &self.spec,
            active.len() as u64,
            pending.len() as u64,
        ) {
            tracing::warn!(%error, "activation queue estimate unavailable this epoch");
        }

        let own_exited_unslashed = ValidatorSetSnapshot::intersect_own(&snapshot.exited_unslashed(), &self.state.own_keys);
        let own_withdrawable = ValidatorSetSnapshot::intersect_own(&snapshot.withdrawable(), &self.state.own_keys);
        let exited_findings = self.state.exited_tracker.process(&own_exited_unslashed, &own_withdrawable);
        dispatch(&exited_findings, self.messenger.as_ref()).await;

        let total_exited_slashed = snapshot.exited_slashed();
        let total_withdrawable = snapshot.withdrawable();
        let own_exited_slashed = ValidatorSetSnapshot::intersect_own(&total_exited_slashed, &self.state.own_keys);
        let slashed_result = self.state.slashed_tracker.process(
            &total_exited_slashed,
            &total_withdrawable,
            &own_exited_slashed,
            &own_withdrawable,
        );
        dispatch(&slashed_result.findings, self.messenger.as_ref()).await;

        self.state.active_snapshots.insert(epoch.as_u64(), snapshot);

        if let Some(price) = self.price_oracle.eth_price(&self.price_currency).await {
            metrics::set_gauge(&self.state.eth_price_gauge, price);
        }
    }

    fn own_active_indices(&self, epoch: Epoch) -> std::collections::HashSet<u64> {
        let fallbacks = [epoch.as_u64().saturating_sub(1), epoch.as_u64().saturating_sub(2)];
        match self.state.active_snapshots.get_with_fallback(epoch.as_u64(), &fallbacks) {
            Some(snapshot) => {
                let active = ValidatorSetSnapshot::intersect_own(&snapshot.active(), &self.state.own_keys);
                active.keys().copied().collect()
            }
            None => std::collections::HashSet::new(),
        }
    }

    async fn run_missed_attestations(&mut self, epoch: Epoch) {
        let inspected = epoch.saturating_sub(1);
        let own_active = self.own_active_indices(inspected);
        let active_indices: Vec<u64> = match self.state.active_snapshots.get(inspected.as_u64()) {
            Some(snapshot) => snapshot.active().keys().copied().collect(),
            None => return,
        };

        let liveness = match self.consensus.liveness(inspected, &active_indices).await {
            Ok(liveness) => liveness,
            Err(error) => {
                tracing::warn!(%error, %inspected, "failed to fetch liveness");
                return;
            }
        };

        let result = self.state.missed_attestation.process(epoch, &liveness, &own_active);
        dispatch(&result.findings, self.messenger.as_ref()).await;
    }

    async fn run_rewards_comparator(&mut self, epoch: Epoch) {
        if epoch.as_u64() < 2 {
            return;
        }
        if !self.client_tag.supports_rewards() {
            return;
        }
        let target_epoch = epoch.saturating_sub(2);
        let fallbacks = [epoch.saturating_sub(1).as_u64(), epoch.as_u64()];
        let Some(snapshot) = self.state.active_snapshots.get_with_fallback(target_epoch.as_u64(), &fallbacks) else {
            return;
        };
        let active: HashMap<u64, watch_types::Validator> =
            snapshot.active().into_iter().map(|(index, v)| (index, v.clone())).collect();
        let own_active: std::collections::HashSet<u64> = active
            .iter()
            .filter(|(_, v)| self.state.own_keys.contains(&v.pubkey))
            .map(|(index, _)| *index)
            .collect();

        let indices: Vec<u64> = active.keys().copied().collect();
        let rewards = match self.consensus.attestation_rewards(target_epoch, &indices).await {
            Ok(rewards) => rewards,
            Err(error) => {
                tracing::warn!(%error, %target_epoch, "failed to fetch attestation rewards");
                return;
            }
        };

        // `analyze` tags findings with the epoch it's given and gates on
        // that same value being >= 2; pass the engine's current epoch (the
        // value this function already gated on) rather than `target_epoch`,
        // whose own reward/validator data this call supplies separately.
        let result = self.state.rewards_comparator.analyze(epoch, &rewards, &active, &own_active);
        dispatch(&result.findings, self.messenger.as_ref()).await;
    }

    async fn run_future_lookahead(&mut self, slot: Slot, epoch: Epoch, is_new_epoch: bool) {
        if !is_new_epoch {
            return;
        }
        let this_duties = match self.consensus.proposer_duties(epoch).await {
            Ok(duties) => duties,
            Err(error) => {
                tracing::warn!(%error, %epoch, "failed to fetch this epoch's proposer duties");
                return;
            }
        };
        let next_duties = match self.consensus.proposer_duties(epoch + 1).await {
            Ok(duties) => duties,
            Err(error) => {
                tracing::warn!(%error, "failed to fetch next epoch's proposer duties");
                Vec::new()
            }
        };

        let result = self.state.block_monitor.future_lookahead(
            slot,
            &this_duties,
            &next_duties,
            &self.state.own_keys,
            &self.spec,
            is_new_epoch,
        );
        dispatch(&result.findings, self.messenger.as_ref()).await;
    }

    async fn run_finalized_reconciliation(&mut self, _slot: Slot) {
        let finalized_slot = match self.consensus.header_slot(HeaderId::Finalized).await {
            Ok(Some(slot)) => slot,
            Ok(None) => return,
            Err(error) => {
                tracing::warn!(%error, "failed to fetch finalized header");
                return;
            }
        };

        let last = self.state.last_processed_finalized_slot.unwrap_or(finalized_slot);
        if finalized_slot <= last {
            return;
        }

        let (new_last, findings) = self
            .state
            .block_monitor
            .finalized_reconciliation(
                self.consensus.as_ref(),
                self.relay.as_ref(),
                &self.spec,
                last,
                finalized_slot,
                &self.state.own_keys,
            )
            .await;
        self.state.last_processed_finalized_slot = Some(new_last);
        dispatch(&findings, self.messenger.as_ref()).await;
    }

    async fn run_attestation_analysis(&mut self, block: &beacon_client::DecodedBlock) {
        let prev_epoch = (block.slot - 1).epoch_for(&self.spec);
        let committees = match self.consensus.committees(prev_epoch).await {
            Ok(committees) => committees,
            Err(error) => {
                tracing::warn!(%error, %prev_epoch, "failed to fetch committees");
                return;
            }
        };
        let own_active = self.own_active_indices(prev_epoch);

        match self.state.attestation_analyzer.analyze(block, &committees, &own_active) {
            Ok(result) => dispatch(&result.findings, self.messenger.as_ref()).await,
            Err(error) => tracing::warn!(%error, slot = %block.slot, "failed to analyze attestation inclusion"),
        }
    }

    async fn run_head_check(&mut self, slot: Slot, epoch: Epoch, block: Option<&beacon_client::DecodedBlock>) {
        let duties = match self.consensus.proposer_duties(epoch).await {
            Ok(duties) => duties,
            Err(error) => {
                tracing::warn!(%error, %epoch, "failed to fetch proposer duties for head check");
                return;
            }
        };
        let proposer = duties.iter().find(|(s, _)| *s == slot).map(|(_, pubkey)| *pubkey);

        let findings = self.state.block_monitor.head_check(slot, block.is_some(), proposer, &self.state.own_keys);
        dispatch(&findings, self.messenger.as_ref()).await;
    }
}
