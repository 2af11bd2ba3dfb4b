use std::collections::{HashMap, HashSet};

use beacon_client::{AttestationRewards, RewardTriple};
use watch_types::{Epoch, Validator};

use crate::findings::{Finding, RewardComponent};

#[derive(Debug, Clone, Copy, Default)]
pub struct RewardRates {
    pub source: Option<f64>,
    pub target: Option<f64>,
    pub head: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct RewardsFindings {
    pub network_rates: RewardRates,
    pub own_rates: RewardRates,
    pub findings: Vec<Finding>,
}

#[derive(Default, Clone, Copy)]
struct ComponentTally {
    max_count: u64,
    possible: i64,
    earned: i64,
    total: u64,
}

impl ComponentTally {
    fn rate(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.max_count as f64 / self.total as f64)
        }
    }
}

#[derive(Default, Clone, Copy)]
struct ScopeTally {
    source: ComponentTally,
    target: ComponentTally,
    head: ComponentTally,
}

/// Compares earned attestation rewards to the ideal (maximum attainable)
/// rewards for the same effective balance, for the network as a whole and
/// for the operator's own validators.
pub struct RewardsComparator {
    rate: metrics::Result<metrics::GaugeVec>,
    possible_total: metrics::Result<metrics::GaugeVec>,
    earned_total: metrics::Result<metrics::GaugeVec>,
    reward_total: metrics::Result<metrics::CounterVec>,
    penalty_total: metrics::Result<metrics::CounterVec>,
    unsupported_warned: bool,
}

fn component_maximal(ideal: RewardTriple, earned: RewardTriple) -> (bool, bool, bool) {
    (
        earned.source == ideal.source,
        earned.target == ideal.target,
        earned.head == ideal.head,
    )
}

impl RewardsComparator {
    pub fn new() -> Self {
        Self {
            rate: metrics::try_create_gauge_vec(
                "attestation_reward_max_rate",
                "Fraction of validators achieving the maximum attainable reward, by component",
                &["scope", "component"],
            ),
            possible_total: metrics::try_create_gauge_vec(
                "attestation_reward_possible_total",
                "Sum of ideal attainable rewards for this epoch, by component",
                &["scope", "component"],
            ),
            earned_total: metrics::try_create_gauge_vec(
                "attestation_reward_earned_total",
                "Sum of earned rewards for this epoch, by component",
                &["scope", "component"],
            ),
            reward_total: metrics::try_create_counter_vec(
                "attestation_reward_gained_total",
                "Cumulative reward gained, by component (heads are never penalized)",
                &["scope", "component"],
            ),
            penalty_total: metrics::try_create_counter_vec(
                "attestation_reward_penalized_total",
                "Cumulative reward lost to penalties, by component",
                &["scope", "component"],
            ),
            unsupported_warned: false,
        }
    }

    fn export(&self, scope: &str, tally: &ScopeTally) {
        for (component, t) in [
            ("source", tally.source),
            ("target", tally.target),
            ("head", tally.head),
        ] {
            if let Some(rate) = t.rate() {
                metrics::set_gauge_vec(&self.rate, &[scope, component], rate);
            }
            metrics::set_gauge_vec(&self.possible_total, &[scope, component], t.possible as f64);
            metrics::set_gauge_vec(&self.earned_total, &[scope, component], t.earned as f64);

            let (reward, penalty) = reward_penalty_split(component, t.earned);
            if reward != 0 {
                metrics::inc_counter_vec_by(&self.reward_total, &[scope, component], reward as f64);
            }
            if penalty != 0 {
                metrics::inc_counter_vec_by(&self.penalty_total, &[scope, component], penalty as f64);
            }
        }
    }

    pub fn analyze(
        &mut self,
        epoch: Epoch,
        rewards: &AttestationRewards,
        active_snapshot: &HashMap<u64, Validator>,
        own_active_indices: &HashSet<u64>,
    ) -> RewardsFindings {
        if epoch.as_u64() < 2 {
            return RewardsFindings::default();
        }
        if rewards.ideal_by_effective_balance.is_empty() && rewards.earned_by_index.is_empty() {
            if !self.unsupported_warned {
                tracing::warn!("consensus client does not implement attestation rewards for this epoch; skipping comparator");
                self.unsupported_warned = true;
            }
            return RewardsFindings::default();
        }

        let mut network = ScopeTally::default();
        let mut own = ScopeTally::default();
        let mut shortfall: HashMap<RewardComponent, Vec<watch_types::PublicKeyBytes>> =
            HashMap::new();

        for (&index, &earned) in &rewards.earned_by_index {
            let Some(validator) = active_snapshot.get(&index) else {
                continue;
            };
            let Some(&ideal) = rewards
                .ideal_by_effective_balance
                .get(&validator.effective_balance_gwei)
            else {
                continue;
            };
            let (source_max, target_max, head_max) = component_maximal(ideal, earned);

            accumulate(&mut network.source, ideal.source, earned.source, source_max);
            accumulate(&mut network.target, ideal.target, earned.target, target_max);
            accumulate(&mut network.head, ideal.head, earned.head, head_max);

            if own_active_indices.contains(&index) {
                accumulate(&mut own.source, ideal.source, earned.source, source_max);
                accumulate(&mut own.target, ideal.target, earned.target, target_max);
                accumulate(&mut own.head, ideal.head, earned.head, head_max);

                if !source_max {
                    shortfall
                        .entry(RewardComponent::Source)
                        .or_default()
                        .push(validator.pubkey);
                }
                if !target_max {
                    shortfall
                        .entry(RewardComponent::Target)
                        .or_default()
                        .push(validator.pubkey);
                }
                if !head_max {
                    shortfall
                        .entry(RewardComponent::Head)
                        .or_default()
                        .push(validator.pubkey);
                }
            }
        }

        self.export("network", &network);
        self.export("own", &own);

        let mut findings = Vec::new();
        for (component, pubkeys) in shortfall {
            let shown: Vec<_> = pubkeys.iter().take(5).copied().collect();
            let remainder = pubkeys.len().saturating_sub(5);
            findings.push(Finding::RewardShortfall {
                epoch,
                component,
                pubkeys: shown,
                remainder,
            });
        }

        RewardsFindings {
            network_rates: RewardRates {
                source: network.source.rate(),
                target: network.target.rate(),
                head: network.head.rate(),
            },
            own_rates: RewardRates {
                source: own.source.rate(),
                target: own.target.rate(),
                head: own.head.rate(),
            },
            findings,
        }
    }
}

/// Splits a component's aggregate earned total for the epoch into a reward
/// amount and a penalty amount. Heads are never penalized, so a head's
/// earned total always lands in the reward side regardless of sign.
fn reward_penalty_split(component: &str, earned: i64) -> (u64, u64) {
    if component == "head" || earned >= 0 {
        (earned.unsigned_abs(), 0)
    } else {
        (0, earned.unsigned_abs())
    }
}

fn accumulate(tally: &mut ComponentTally, possible: i64, earned: i64, is_max: bool) {
    tally.total += 1;
    tally.possible += possible;
    tally.earned += earned;
    if is_max {
        tally.max_count += 1;
    }
}

impl Default for RewardsComparator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use watch_types::PublicKeyBytes;

    fn pubkey(byte: u8) -> PublicKeyBytes {
        PublicKeyBytes::from_hex(&hex::encode([byte; 48])).unwrap()
    }

    #[test]
    fn epoch_below_two_is_a_no_op() {
        let mut comparator = RewardsComparator::new();
        let result = comparator.analyze(
            Epoch::new(1),
            &AttestationRewards::default(),
            &HashMap::new(),
            &HashSet::new(),
        );
        assert!(result.findings.is_empty());
        assert_eq!(result.network_rates.source, None);
    }

    #[test]
    fn unsupported_client_is_a_no_op() {
        let mut comparator = RewardsComparator::new();
        let result = comparator.analyze(
            Epoch::new(5),
            &AttestationRewards::default(),
            &HashMap::new(),
            &HashSet::new(),
        );
        assert!(result.findings.is_empty());
    }

    #[test]
    fn reward_triple_comparison_matches_spec_scenario() {
        // Spec §8 scenario 6.
        let mut rewards = AttestationRewards::default();
        rewards.ideal_by_effective_balance.insert(
            32_000_000_000,
            RewardTriple {
                source: 14_000,
                target: 13_000,
                head: 7_500,
            },
        );
        rewards.earned_by_index.insert(
            42,
            RewardTriple {
                source: 14_000,
                target: 12_999,
                head: 7_500,
            },
        );

        let mut snapshot = HashMap::new();
        snapshot.insert(
            42,
            Validator {
                pubkey: pubkey(1),
                effective_balance_gwei: 32_000_000_000,
                slashed: false,
            },
        );
        let own: HashSet<u64> = [42].into_iter().collect();

        let mut comparator = RewardsComparator::new();
        let result = comparator.analyze(Epoch::new(2), &rewards, &snapshot, &own);

        assert_eq!(result.network_rates.source, Some(1.0));
        assert_eq!(result.network_rates.target, Some(0.0));
        assert_eq!(result.network_rates.head, Some(1.0));
        assert_eq!(result.findings.len(), 1);
        assert!(matches!(
            result.findings[0],
            Finding::RewardShortfall {
                component: RewardComponent::Target,
                ..
            }
        ));
    }

    #[test]
    fn mixed_reward_and_penalty_batch_splits_by_aggregate_sign() {
        let mut source = ComponentTally::default();
        accumulate(&mut source, 1_000, 5_000, false);
        accumulate(&mut source, 1_000, -8_000, false);
        assert_eq!(source.earned, -3_000);
        assert_eq!(reward_penalty_split("source", source.earned), (0, 3_000));

        let mut target = ComponentTally::default();
        accumulate(&mut target, 1_000, 2_000, false);
        accumulate(&mut target, 1_000, 4_000, false);
        assert_eq!(reward_penalty_split("target", target.earned), (6_000, 0));

        // Heads are never penalized, even if the raw value were negative.
        let mut head = ComponentTally::default();
        accumulate(&mut head, 500, 500, true);
        accumulate(&mut head, 500, -200, false);
        assert_eq!(reward_penalty_split("head", head.earned), (300, 0));
    }
}
