use std::collections::{HashMap, HashSet};

use watch_types::Validator;

use crate::findings::Finding;

/// Diffs the own-exited set against an internally remembered set, emitting
/// one `NewExited` finding per index that appeared since the last call. The
/// first call always primes with no alerts (there is nothing to diff yet).
pub struct ExitedTracker {
    remembered_unslashed: Option<HashSet<u64>>,
    own_exited_count: metrics::Result<metrics::IntGauge>,
}

impl ExitedTracker {
    pub fn new() -> Self {
        Self {
            remembered_unslashed: None,
            own_exited_count: metrics::try_create_int_gauge(
                "own_exited_validators",
                "Count of own validators in exited_unslashed or withdrawable-and-unslashed status",
            ),
        }
    }

    /// `own_withdrawable` is the union of `withdrawal_possible` and
    /// `withdrawal_done` for own validators; the exported count is
    /// `own_exited_unslashed ∪ {i ∈ own_withdrawable : not slashed}`, but —
    /// per spec §4.10 — the remembered set used for the diff is
    /// `own_exited_unslashed` alone.
    pub fn process(
        &mut self,
        own_exited_unslashed: &HashMap<u64, &Validator>,
        own_withdrawable: &HashMap<u64, &Validator>,
    ) -> Vec<Finding> {
        let combined: HashSet<u64> = own_exited_unslashed
            .keys()
            .copied()
            .chain(own_withdrawable.iter().filter(|(_, v)| !v.slashed).map(|(i, _)| *i))
            .collect();
        metrics::set_int_gauge(&self.own_exited_count, combined.len() as i64);

        let current_unslashed: HashSet<u64> = own_exited_unslashed.keys().copied().collect();
        let findings = match &self.remembered_unslashed {
            None => Vec::new(),
            Some(prev) => {
                let mut new_indexes: Vec<u64> =
                    current_unslashed.difference(prev).copied().collect();
                new_indexes.sort_unstable();
                new_indexes.into_iter().map(|index| Finding::NewExited { index }).collect()
            }
        };

        self.remembered_unslashed = Some(current_unslashed);
        findings
    }
}

impl Default for ExitedTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Diffs both the network-wide and own slashed sets against two internally
/// remembered sets. A new own-slashed validator raises an alert; a new
/// network slashed validator that isn't own is only logged, using the
/// pubkey looked up from the network slashed map itself (spec §9 flags the
/// original code's non-own lookup as a bug — this resolves it by keying the
/// log line off the network map rather than indexing some other structure
/// by validator index).
pub struct SlashedTracker {
    remembered_total: Option<HashSet<u64>>,
    remembered_own: Option<HashSet<u64>>,
    total_count: metrics::Result<metrics::IntGauge>,
    own_count: metrics::Result<metrics::IntGauge>,
}

#[derive(Debug, Clone, Default)]
pub struct SlashedFindings {
    pub findings: Vec<Finding>,
}

impl SlashedTracker {
    pub fn new() -> Self {
        Self {
            remembered_total: None,
            remembered_own: None,
            total_count: metrics::try_create_int_gauge(
                "network_slashed_validators",
                "Count of validators in exited_slashed or withdrawable-and-slashed status, network-wide",
            ),
            own_count: metrics::try_create_int_gauge(
                "own_slashed_validators",
                "Count of own validators in exited_slashed or withdrawable-and-slashed status",
            ),
        }
    }

    pub fn process<'a>(
        &mut self,
        total_exited_slashed: &HashMap<u64, &'a Validator>,
        total_withdrawable: &HashMap<u64, &'a Validator>,
        own_exited_slashed: &HashMap<u64, &'a Validator>,
        own_withdrawable: &HashMap<u64, &'a Validator>,
    ) -> SlashedFindings {
        let total_slashed: HashMap<u64, &Validator> = total_exited_slashed
            .iter()
            .map(|(i, v)| (*i, *v))
            .chain(total_withdrawable.iter().filter(|(_, v)| v.slashed).map(|(i, v)| (*i, *v)))
            .collect();
        let own_slashed: HashSet<u64> = own_exited_slashed
            .keys()
            .copied()
            .chain(own_withdrawable.iter().filter(|(_, v)| v.slashed).map(|(i, _)| *i))
            .collect();

        metrics::set_int_gauge(&self.total_count, total_slashed.len() as i64);
        metrics::set_int_gauge(&self.own_count, own_slashed.len() as i64);

        let mut findings = Vec::new();
        let total_indexes: HashSet<u64> = total_slashed.keys().copied().collect();

        if let (Some(prev_total), Some(prev_own)) = (&self.remembered_total, &self.remembered_own) {
            let mut newly_total: Vec<u64> = total_indexes.difference(prev_total).copied().collect();
            newly_total.sort_unstable();

            for index in newly_total {
                if own_slashed.contains(&index) && !prev_own.contains(&index) {
                    findings.push(Finding::NewSlashedOwn { index });
                } else if !own_slashed.contains(&index) {
                    if let Some(validator) = total_slashed.get(&index) {
                        tracing::info!(index, pubkey = %validator.pubkey, "network validator slashed");
                    }
                }
            }
        }

        self.remembered_total = Some(total_indexes);
        self.remembered_own = Some(own_slashed);
        SlashedFindings { findings }
    }
}

impl Default for SlashedTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(slashed: bool) -> Validator {
        Validator {
            pubkey: watch_types::PublicKeyBytes::from_hex(&hex::encode([1u8; 48])).unwrap(),
            effective_balance_gwei: 32_000_000_000,
            slashed,
        }
    }

    #[test]
    fn exited_tracker_primes_without_alerting() {
        let mut tracker = ExitedTracker::new();
        let v = validator(false);
        let exited: HashMap<u64, &Validator> = [(1, &v)].into_iter().collect();
        let findings = tracker.process(&exited, &HashMap::new());
        assert!(findings.is_empty());
    }

    #[test]
    fn exited_tracker_alerts_on_new_index() {
        let mut tracker = ExitedTracker::new();
        let v = validator(false);
        let first: HashMap<u64, &Validator> = HashMap::new();
        tracker.process(&first, &HashMap::new());

        let second: HashMap<u64, &Validator> = [(1, &v)].into_iter().collect();
        let findings = tracker.process(&second, &HashMap::new());
        assert_eq!(findings.len(), 1);
        assert!(matches!(findings[0], Finding::NewExited { index: 1 }));
    }

    #[test]
    fn slashed_tracker_primes_without_alerting() {
        let mut tracker = SlashedTracker::new();
        let v = validator(true);
        let own: HashMap<u64, &Validator> = [(5, &v)].into_iter().collect();
        let result = tracker.process(&own, &HashMap::new(), &own, &HashMap::new());
        assert!(result.findings.is_empty());
    }

    #[test]
    fn slashed_tracker_alerts_only_for_new_own_index() {
        let mut tracker = SlashedTracker::new();
        let own_v = validator(true);
        let other_v = validator(true);

        let total_empty: HashMap<u64, &Validator> = HashMap::new();
        tracker.process(&total_empty, &HashMap::new(), &total_empty, &HashMap::new());

        let total: HashMap<u64, &Validator> = [(5, &own_v), (6, &other_v)].into_iter().collect();
        let own: HashMap<u64, &Validator> = [(5, &own_v)].into_iter().collect();
        let result = tracker.process(&total, &HashMap::new(), &own, &HashMap::new());

        assert_eq!(result.findings.len(), 1);
        assert!(matches!(result.findings[0], Finding::NewSlashedOwn { index: 5 }));
    }
}
