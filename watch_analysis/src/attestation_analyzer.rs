use std::collections::{HashMap, HashSet};

use beacon_client::{CommitteeDuties, DecodedBlock};
use watch_types::{aggregate_bits, apply_mask, decode_aggregation_bits, BitError, Slot};

use crate::findings::Finding;

#[derive(Debug, Clone)]
pub struct AttestationFindings {
    pub prev_slot: Slot,
    pub assigned_own: usize,
    pub included_own: usize,
    pub participation_rate: Option<f64>,
    pub findings: Vec<Finding>,
}

/// Reconstructs which validators assigned to attest for `slot - 1` were
/// actually included in the block at `slot`.
pub struct AttestationAnalyzer {
    participation_rate: metrics::Result<metrics::Gauge>,
}

impl AttestationAnalyzer {
    pub fn new() -> Self {
        Self {
            participation_rate: metrics::try_create_gauge(
                "own_attestation_participation_rate",
                "Fraction of own validators' assigned attestations included in the next block",
            ),
        }
    }

    pub fn analyze(
        &self,
        block: &DecodedBlock,
        committees_for_prev_epoch: &CommitteeDuties,
        own_active_indices: &HashSet<u64>,
    ) -> Result<AttestationFindings, BitError> {
        let prev = block.slot - 1;

        let mut by_committee: HashMap<u64, Vec<_>> = HashMap::new();
        for attestation in &block.attestations {
            if attestation.slot != prev {
                continue;
            }
            let decoded = decode_aggregation_bits(&attestation.aggregation_bits_hex)?;
            by_committee
                .entry(attestation.committee_index)
                .or_default()
                .push(decoded);
        }

        let mut assigned = HashSet::new();
        let mut included = HashSet::new();

        if let Some(duties_by_committee) = committees_for_prev_epoch.get(&prev.as_u64()) {
            for (committee_index, duties) in duties_by_committee {
                assigned.extend(duties.iter().copied());
                if let Some(vectors) = by_committee.get(committee_index) {
                    let aggregated = aggregate_bits(vectors)?;
                    let included_here = apply_mask(duties, &aggregated)?;
                    included.extend(included_here);
                }
            }
        }

        let assigned_own: HashSet<u64> =
            assigned.intersection(own_active_indices).copied().collect();
        let included_own: HashSet<u64> =
            assigned_own.intersection(&included).copied().collect();
        let mut shortfall: Vec<u64> = assigned_own.difference(&included_own).copied().collect();
        shortfall.sort_unstable();

        let participation_rate = if assigned_own.is_empty() {
            None
        } else {
            Some(included_own.len() as f64 / assigned_own.len() as f64)
        };
        if let Some(rate) = participation_rate {
            metrics::set_gauge(&self.participation_rate, rate);
        }

        let findings = if shortfall.is_empty() {
            Vec::new()
        } else {
            vec![Finding::AttestationShortfall {
                slot: prev,
                indices: shortfall,
            }]
        };

        Ok(AttestationFindings {
            prev_slot: prev,
            assigned_own: assigned_own.len(),
            included_own: included_own.len(),
            participation_rate,
            findings,
        })
    }
}

impl Default for AttestationAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_client::DecodedAttestation;

    fn committees(prev_slot: u64, committee_index: u64, duties: Vec<u64>) -> CommitteeDuties {
        let mut by_index = HashMap::new();
        by_index.insert(committee_index, duties);
        let mut by_slot = HashMap::new();
        by_slot.insert(prev_slot, by_index);
        by_slot
    }

    #[test]
    fn full_inclusion_yields_no_shortfall() {
        let block = DecodedBlock {
            slot: Slot::new(11),
            proposer_index: 7,
            attestations: vec![DecodedAttestation {
                slot: Slot::new(10),
                committee_index: 0,
                // committee size 3, all bits set, trailing delimiter 1 -> 0x0F
                aggregation_bits_hex: "0x0F".to_string(),
            }],
            execution_block_hash: None,
        };
        let duties = committees(10, 0, vec![1, 2, 3]);
        let own: HashSet<u64> = [1, 2].into_iter().collect();

        let analyzer = AttestationAnalyzer::new();
        let result = analyzer.analyze(&block, &duties, &own).unwrap();

        assert_eq!(result.assigned_own, 2);
        assert_eq!(result.included_own, 2);
        assert!(result.findings.is_empty());
        assert_eq!(result.participation_rate, Some(1.0));
    }

    #[test]
    fn missing_attestation_produces_shortfall_for_own_validators() {
        let block = DecodedBlock {
            slot: Slot::new(11),
            proposer_index: 7,
            attestations: vec![],
            execution_block_hash: None,
        };
        let duties = committees(10, 0, vec![1, 2, 3]);
        let own: HashSet<u64> = [1, 2].into_iter().collect();

        let analyzer = AttestationAnalyzer::new();
        let result = analyzer.analyze(&block, &duties, &own).unwrap();

        assert_eq!(result.assigned_own, 2);
        assert_eq!(result.included_own, 0);
        assert_eq!(result.participation_rate, Some(0.0));
        assert_eq!(result.findings.len(), 1);
    }

    #[test]
    fn no_own_assignment_yields_undefined_rate() {
        let block = DecodedBlock {
            slot: Slot::new(11),
            proposer_index: 7,
            attestations: vec![],
            execution_block_hash: None,
        };
        let duties = committees(10, 0, vec![1, 2, 3]);
        let own: HashSet<u64> = HashSet::new();

        let analyzer = AttestationAnalyzer::new();
        let result = analyzer.analyze(&block, &duties, &own).unwrap();
        assert_eq!(result.participation_rate, None);
    }
}
