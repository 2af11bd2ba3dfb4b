use thiserror::Error;
use watch_types::ChainSpec;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ChurnError {
    #[error("computed churn limit is zero, cannot estimate an activation queue duration")]
    ZeroChurn,
}

/// Estimates how long the pending-activation queue will take to drain at
/// the chain's current churn rate.
pub struct ActivationQueueEstimator {
    duration_seconds: metrics::Result<metrics::IntGauge>,
}

impl ActivationQueueEstimator {
    pub fn new() -> Self {
        Self {
            duration_seconds: metrics::try_create_int_gauge(
                "activation_queue_duration_seconds",
                "Estimated time, in seconds, for the pending activation queue to clear",
            ),
        }
    }

    /// `churn = min(max_per_epoch_activation_churn_limit, n_active / churn_limit_quotient)`.
    /// `duration = floor(n_pending / churn) * seconds_per_epoch`.
    pub fn estimate(
        &self,
        spec: &ChainSpec,
        n_active: u64,
        n_pending: u64,
    ) -> Result<u64, ChurnError> {
        let churn = spec
            .max_per_epoch_activation_churn_limit
            .min(n_active / spec.churn_limit_quotient);
        if churn == 0 {
            return Err(ChurnError::ZeroChurn);
        }
        let duration = (n_pending / churn) * spec.seconds_per_epoch();
        metrics::set_int_gauge(&self.duration_seconds, duration as i64);
        Ok(duration)
    }
}

impl Default for ActivationQueueEstimator {
    fn default() -> Self {
        Self::new()
    }
}
