//! Structured results of each analytical module.
//!
//! Every module returns a `Vec<Finding>` rather than alerting directly
//! (§9 DESIGN NOTES: keep analyses pure). [`dispatch`] is the one place
//! findings turn into outbound messages, so tests can assert on findings
//! without a fake messenger.

use watch_types::{Epoch, PublicKeyBytes, Slot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardComponent {
    Source,
    Target,
    Head,
}

impl RewardComponent {
    fn label(self) -> &'static str {
        match self {
            RewardComponent::Source => "source",
            RewardComponent::Target => "target",
            RewardComponent::Head => "head",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Finding {
    FutureProposal { slot: Slot, eta_seconds: u64 },
    MissedHeadProposal { slot: Slot },
    ProposedFinalized { slot: Slot, reward_eth: Option<f64> },
    MissedFinalized { slot: Slot },
    AttestationShortfall { slot: Slot, indices: Vec<u64> },
    DeadAttester { epoch: Epoch, index: u64 },
    PairedMiss { epoch: Epoch, index: u64 },
    RewardShortfall {
        epoch: Epoch,
        component: RewardComponent,
        pubkeys: Vec<PublicKeyBytes>,
        remainder: usize,
    },
    NewExited { index: u64 },
    NewSlashedOwn { index: u64 },
}

/// Renders up to `limit` items followed by "and N more" if there are any
/// left over. Used for every alert that enumerates validator indices.
pub fn enumerate_with_overflow<T: std::fmt::Display>(items: &[T], limit: usize) -> String {
    if items.is_empty() {
        return String::new();
    }
    let shown: Vec<String> = items.iter().take(limit).map(|i| i.to_string()).collect();
    let remainder = items.len().saturating_sub(limit);
    if remainder > 0 {
        format!("{} and {} more", shown.join(", "), remainder)
    } else {
        shown.join(", ")
    }
}

impl Finding {
    pub fn text(&self) -> String {
        match self {
            Finding::FutureProposal { slot, eta_seconds } => format!(
                "upcoming proposal: one of your validators is due to propose slot {slot} in ~{eta_seconds}s"
            ),
            Finding::MissedHeadProposal { slot } => {
                format!("missed proposal (head): your validator's block for slot {slot} is absent at head")
            }
            Finding::ProposedFinalized { slot, reward_eth: Some(reward) } => {
                format!("proposed slot {slot}, finalized. MEV reward: {reward:.4} ETH")
            }
            Finding::ProposedFinalized { slot, reward_eth: None } => {
                format!("proposed slot {slot}, finalized. No MEV reward found.")
            }
            Finding::MissedFinalized { slot } => {
                format!("missed proposal (finalized): your validator's block for slot {slot} never finalized")
            }
            Finding::AttestationShortfall { slot, indices } => format!(
                "attestation shortfall for slot {slot}: validators not optimally included: {}",
                enumerate_with_overflow(indices, 5)
            ),
            Finding::DeadAttester { epoch, index } => {
                format!("validator {index} did not attest during epoch {epoch}")
            }
            Finding::PairedMiss { epoch, index } => format!(
                "validator {index} missed attestations in two consecutive epochs (from epoch {})",
                epoch.as_u64().saturating_sub(1)
            ),
            Finding::RewardShortfall { epoch, component, pubkeys, remainder } => {
                let shown: Vec<String> = pubkeys.iter().map(|p| p.short()).collect();
                let suffix = if *remainder > 0 {
                    format!(" and {remainder} more")
                } else {
                    String::new()
                };
                format!(
                    "epoch {epoch}: sub-maximal {} reward for {}{}",
                    component.label(),
                    shown.join(", "),
                    suffix
                )
            }
            Finding::NewExited { index } => format!("validator {index} has exited"),
            Finding::NewSlashedOwn { index } => {
                format!("validator {index} under your watch has been slashed")
            }
        }
    }
}

/// Turns a batch of findings into outbound messages, in order.
pub async fn dispatch(findings: &[Finding], messenger: &dyn messenger::Messenger) {
    for finding in findings {
        messenger.broadcast(&finding.text()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_list_mentions_remainder() {
        let items: Vec<u64> = (0..8).collect();
        let text = enumerate_with_overflow(&items, 5);
        assert_eq!(text, "0, 1, 2, 3, 4 and 3 more");
    }

    #[test]
    fn short_list_has_no_overflow_suffix() {
        let items = vec![1u64, 2];
        assert_eq!(enumerate_with_overflow(&items, 5), "1, 2");
    }
}
