//! The six analytical modules and the validator-set trackers that the main
//! engine drives every slot or epoch. Every module returns plain findings
//! (see [`findings`]) rather than reaching for a messenger itself.

pub mod activation_queue;
pub mod attestation_analyzer;
pub mod block_monitor;
pub mod findings;
pub mod missed_attestation;
pub mod rewards_comparator;
pub mod validator_set_tracker;

pub use activation_queue::{ActivationQueueEstimator, ChurnError};
pub use attestation_analyzer::{AttestationAnalyzer, AttestationFindings};
pub use block_monitor::{BlockProposalMonitor, FutureLookahead};
pub use findings::{dispatch, enumerate_with_overflow, Finding, RewardComponent};
pub use missed_attestation::{MissedAttestationDetector, MissedAttestationFindings};
pub use rewards_comparator::{RewardRates, RewardsComparator, RewardsFindings};
pub use validator_set_tracker::{ExitedTracker, SlashedFindings, SlashedTracker};
