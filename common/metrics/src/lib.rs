//! Thin wrapper around the `prometheus` crate's default registry.
//!
//! Mirrors the small set of helpers every collaborator in this workspace
//! reaches for: a fallible `try_create_*` constructor (so a metric that
//! fails to register, e.g. a duplicate name during tests, never panics the
//! caller) and a single global registry that `gather_prometheus_text` can
//! encode for the metrics HTTP endpoint.

pub use prometheus::{
    Counter, CounterVec, Gauge, GaugeVec, HistogramOpts, HistogramVec, IntCounter, IntCounterVec,
    IntGauge, IntGaugeVec, Opts, Result,
};

use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::LazyLock;

static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub fn try_create_int_counter(name: &str, help: &str) -> Result<IntCounter> {
    let counter = IntCounter::new(name, help)?;
    REGISTRY.register(Box::new(counter.clone()))?;
    Ok(counter)
}

pub fn try_create_int_gauge(name: &str, help: &str) -> Result<IntGauge> {
    let gauge = IntGauge::new(name, help)?;
    REGISTRY.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

/// Floating-point counterpart of [`try_create_int_gauge`], for metrics like
/// participation rates that are naturally fractional.
pub fn try_create_gauge(name: &str, help: &str) -> Result<Gauge> {
    let gauge = Gauge::new(name, help)?;
    REGISTRY.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

pub fn try_create_int_counter_vec(
    name: &str,
    help: &str,
    label_names: &[&str],
) -> Result<IntCounterVec> {
    let opts = Opts::new(name, help);
    let counter_vec = IntCounterVec::new(opts, label_names)?;
    REGISTRY.register(Box::new(counter_vec.clone()))?;
    Ok(counter_vec)
}

pub fn try_create_int_gauge_vec(
    name: &str,
    help: &str,
    label_names: &[&str],
) -> Result<IntGaugeVec> {
    let opts = Opts::new(name, help);
    let gauge_vec = IntGaugeVec::new(opts, label_names)?;
    REGISTRY.register(Box::new(gauge_vec.clone()))?;
    Ok(gauge_vec)
}

pub fn try_create_gauge_vec(
    name: &str,
    help: &str,
    label_names: &[&str],
) -> Result<GaugeVec> {
    let opts = Opts::new(name, help);
    let gauge_vec = GaugeVec::new(opts, label_names)?;
    REGISTRY.register(Box::new(gauge_vec.clone()))?;
    Ok(gauge_vec)
}

pub fn try_create_counter(name: &str, help: &str) -> Result<Counter> {
    let counter = Counter::new(name, help)?;
    REGISTRY.register(Box::new(counter.clone()))?;
    Ok(counter)
}

pub fn try_create_counter_vec(
    name: &str,
    help: &str,
    label_names: &[&str],
) -> Result<CounterVec> {
    let opts = Opts::new(name, help);
    let counter_vec = CounterVec::new(opts, label_names)?;
    REGISTRY.register(Box::new(counter_vec.clone()))?;
    Ok(counter_vec)
}

pub fn set_int_gauge(metric: &Result<IntGauge>, value: i64) {
    if let Ok(gauge) = metric {
        gauge.set(value);
    }
}

pub fn inc_counter(metric: &Result<IntCounter>) {
    if let Ok(counter) = metric {
        counter.inc();
    }
}

pub fn set_gauge(metric: &Result<Gauge>, value: f64) {
    if let Ok(gauge) = metric {
        gauge.set(value);
    }
}

pub fn set_gauge_vec(metric: &Result<GaugeVec>, label_values: &[&str], value: f64) {
    if let Ok(gauge_vec) = metric {
        if let Ok(gauge) = gauge_vec.get_metric_with_label_values(label_values) {
            gauge.set(value);
        }
    }
}

pub fn inc_counter_by(metric: &Result<Counter>, value: f64) {
    if let Ok(counter) = metric {
        counter.inc_by(value);
    }
}

pub fn inc_counter_vec_by(metric: &Result<CounterVec>, label_values: &[&str], value: f64) {
    if let Ok(counter_vec) = metric {
        if let Ok(counter) = counter_vec.get_metric_with_label_values(label_values) {
            counter.inc_by(value);
        }
    }
}

/// Renders every metric registered via this module in Prometheus text format.
pub fn gather_prometheus_text() -> std::result::Result<String, prometheus::Error> {
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_round_trips_through_the_registry() {
        let counter = try_create_int_counter(
            "metrics_crate_test_counter_total",
            "exercised only by unit tests",
        )
        .unwrap();
        counter.inc();
        let text = gather_prometheus_text().unwrap();
        assert!(text.contains("metrics_crate_test_counter_total 1"));
    }
}
