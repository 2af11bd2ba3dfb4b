use metrics::{try_create_int_counter, IntCounter, Result as MetricsResult};
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// The minimum interval between repeated log messages for a debounced condition.
const LOG_DEBOUNCE_INTERVAL: Duration = Duration::from_secs(30);

pub static INFOS_TOTAL: LazyLock<MetricsResult<IntCounter>> =
    LazyLock::new(|| try_create_int_counter("info_total", "Count of infos logged"));
pub static WARNS_TOTAL: LazyLock<MetricsResult<IntCounter>> =
    LazyLock::new(|| try_create_int_counter("warn_total", "Count of warns logged"));
pub static ERRORS_TOTAL: LazyLock<MetricsResult<IntCounter>> =
    LazyLock::new(|| try_create_int_counter("error_total", "Count of errors logged"));

/// De-bounce helper for conditions that would otherwise log every slot.
///
/// Used around noisy-but-not-urgent conditions, e.g. a relay that has been
/// unreachable for many consecutive slots.
#[derive(Default)]
pub struct TimeLatch(Option<Instant>);

impl TimeLatch {
    /// Only returns true once every `LOG_DEBOUNCE_INTERVAL`.
    pub fn elapsed(&mut self) -> bool {
        let now = Instant::now();

        let is_elapsed = self.0.is_some_and(|elapse_time| now > elapse_time);

        if is_elapsed || self.0.is_none() {
            self.0 = Some(now + LOG_DEBOUNCE_INTERVAL);
        }

        is_elapsed
    }
}

/// A `tracing_subscriber::Layer` that turns log events into Prometheus counters.
pub struct MetricsLayer;

impl<S: Subscriber> Layer<S> for MetricsLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<S>) {
        let counter = match *event.metadata().level() {
            tracing::Level::INFO => &INFOS_TOTAL,
            tracing::Level::WARN => &WARNS_TOTAL,
            tracing::Level::ERROR => &ERRORS_TOTAL,
            _ => return,
        };
        if let Ok(counter) = counter.as_ref() {
            counter.inc();
        }
    }
}

/// Initializes the global `tracing` subscriber used by the daemon binary.
///
/// `RUST_LOG` (or `default_directive` when unset) selects verbosity; every
/// logged event also increments the matching `info_total`/`warn_total`/
/// `error_total` counter so operators can alert on log volume without
/// scraping text logs.
pub fn init_tracing(default_directive: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive.to_string()));

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .json()
            .flatten_event(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(MetricsLayer)
        .init();
}

/// Return a tracing subscriber suitable for test usage.
///
/// By default no logs will be printed, but they can be enabled via the
/// `test_logger` feature, e.g. `cargo test -p watch_analysis --features
/// logging/test_logger`.
pub fn create_test_tracing_subscriber() {
    if cfg!(feature = "test_logger") {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::try_new("debug").unwrap())
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_latch_does_not_fire_immediately() {
        let mut latch = TimeLatch::default();
        assert!(!latch.elapsed(), "first call always arms the latch");
    }
}
