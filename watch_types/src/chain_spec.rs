/// Chain timing and churn constants, read once from configuration at startup
/// and passed by reference wherever the analytical modules need them.
///
/// Defaults match Ethereum mainnet; every field is overridable on the CLI so
/// the daemon can watch a devnet or a chain with different timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainSpec {
    pub seconds_per_slot: u64,
    pub slots_per_epoch: u64,
    pub min_per_epoch_churn_limit: u64,
    pub churn_limit_quotient: u64,
    pub max_per_epoch_activation_churn_limit: u64,
    /// Slot-within-epoch at which the missed-attestation analysis runs.
    pub slot_for_missed_attestations_process: u64,
    /// Slot-within-epoch at which the rewards comparator runs.
    pub slot_for_rewards_process: u64,
    /// Seconds after slot start before a missing block is treated as absent.
    pub missed_block_timeout_sec: u64,
}

impl ChainSpec {
    pub const fn seconds_per_epoch(&self) -> u64 {
        self.seconds_per_slot * self.slots_per_epoch
    }
}

impl Default for ChainSpec {
    fn default() -> Self {
        Self {
            seconds_per_slot: 12,
            slots_per_epoch: 32,
            min_per_epoch_churn_limit: 4,
            churn_limit_quotient: 65_536,
            max_per_epoch_activation_churn_limit: 8,
            slot_for_missed_attestations_process: 16,
            slot_for_rewards_process: 20,
            missed_block_timeout_sec: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_per_epoch_is_derived() {
        let spec = ChainSpec {
            seconds_per_slot: 12,
            slots_per_epoch: 32,
            ..ChainSpec::default()
        };
        assert_eq!(spec.seconds_per_epoch(), 384);
    }
}
