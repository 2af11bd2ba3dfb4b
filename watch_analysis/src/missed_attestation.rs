use std::collections::HashSet;

use beacon_client::Liveness;
use watch_types::Epoch;

use crate::findings::Finding;

#[derive(Debug, Clone, Default)]
pub struct MissedAttestationFindings {
    pub dead: HashSet<u64>,
    pub findings: Vec<Finding>,
}

/// Epoch-level validator liveness. Run once per epoch against the
/// previous epoch's data; remembers that epoch's dead set so the next
/// invocation can detect two-epoch-in-a-row misses.
pub struct MissedAttestationDetector {
    previous: Option<(Epoch, HashSet<u64>)>,
    dead_total: metrics::Result<metrics::IntCounter>,
    paired_total: metrics::Result<metrics::IntCounter>,
}

impl MissedAttestationDetector {
    pub fn new() -> Self {
        Self {
            previous: None,
            dead_total: metrics::try_create_int_counter(
                "own_missed_attestations_total",
                "Count of epochs in which an own validator failed to attest",
            ),
            paired_total: metrics::try_create_int_counter(
                "own_paired_missed_attestations_total",
                "Count of own validators that missed attestations in two consecutive epochs",
            ),
        }
    }

    /// `engine_epoch` is the epoch the engine is currently in; the inspected
    /// epoch is always `engine_epoch - 1`. Returns the empty result for
    /// `engine_epoch < 1` per spec §8.
    pub fn process(
        &mut self,
        engine_epoch: Epoch,
        liveness: &[Liveness],
        own_active: &HashSet<u64>,
    ) -> MissedAttestationFindings {
        if engine_epoch.as_u64() < 1 {
            return MissedAttestationFindings::default();
        }
        let inspected_epoch = engine_epoch - 1;

        let dead: HashSet<u64> = liveness
            .iter()
            .filter(|entry| !entry.is_live)
            .map(|entry| entry.index)
            .collect();

        let mut findings = Vec::new();
        for &index in &dead {
            if own_active.contains(&index) {
                metrics::inc_counter(&self.dead_total);
                findings.push(Finding::DeadAttester {
                    epoch: inspected_epoch,
                    index,
                });
            }
        }

        if engine_epoch.as_u64() >= 2 {
            if let Some((prev_inspected, prev_dead)) = &self.previous {
                if prev_inspected.as_u64() + 1 == inspected_epoch.as_u64() {
                    let mut paired: Vec<u64> = dead.intersection(prev_dead).copied().collect();
                    paired.sort_unstable();
                    for index in paired {
                        metrics::inc_counter(&self.paired_total);
                        findings.push(Finding::PairedMiss {
                            epoch: inspected_epoch,
                            index,
                        });
                    }
                }
            }
        }

        self.previous = Some((inspected_epoch, dead.clone()));

        MissedAttestationFindings { dead, findings }
    }
}

impl Default for MissedAttestationDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn liveness(dead: &[u64], all: &[u64]) -> Vec<Liveness> {
        all.iter()
            .map(|&index| Liveness {
                index,
                is_live: !dead.contains(&index),
            })
            .collect()
    }

    #[test]
    fn epoch_below_one_is_a_no_op() {
        let mut detector = MissedAttestationDetector::new();
        let result = detector.process(Epoch::new(0), &[], &HashSet::new());
        assert!(result.dead.is_empty());
        assert!(result.findings.is_empty());
    }

    #[test]
    fn paired_miss_scenario_matches_spec() {
        // Spec §8 scenario 5: epoch E-1 dead = {7,9}, epoch E dead = {9,12}.
        let mut detector = MissedAttestationDetector::new();
        let own: HashSet<u64> = HashSet::new();

        // engine_epoch = 1 inspects epoch 0, pretend dead = {7, 9}.
        let first = liveness(&[7, 9], &[7, 9, 12]);
        detector.process(Epoch::new(1), &first, &own);

        // engine_epoch = 2 inspects epoch 1, dead = {9, 12}.
        let second = liveness(&[9, 12], &[7, 9, 12]);
        let result = detector.process(Epoch::new(2), &second, &own);

        let paired: HashSet<u64> = result
            .findings
            .iter()
            .filter_map(|f| match f {
                Finding::PairedMiss { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(paired, [9].into_iter().collect());
    }

    #[test]
    fn own_dead_validator_raises_a_finding() {
        let mut detector = MissedAttestationDetector::new();
        let own: HashSet<u64> = [9].into_iter().collect();
        let result = detector.process(Epoch::new(1), &liveness(&[9], &[9, 10]), &own);
        assert!(result
            .findings
            .iter()
            .any(|f| matches!(f, Finding::DeadAttester { index: 9, .. })));
    }
}
