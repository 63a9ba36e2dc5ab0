//! Metrics boundary. Purely observational: counters for operation
//! outcomes, observations for score distributions. Nothing in the
//! workflow ever reads a metric back.

pub trait MetricsSink: Send + Sync {
    fn incr(&self, name: &str);
    fn observe(&self, name: &str, value: f64);
}

/// Default sink: emits each metric to the log output at debug level.
pub struct LogMetrics;

impl MetricsSink for LogMetrics {
    fn incr(&self, name: &str) {
        log::debug!("metric {name} +1");
    }

    fn observe(&self, name: &str, value: f64) {
        log::debug!("metric {name} = {value:.4}");
    }
}

/// Discards everything. For tests that do not care about metrics.
pub struct NullMetrics;

impl MetricsSink for NullMetrics {
    fn incr(&self, _name: &str) {}

    fn observe(&self, _name: &str, _value: f64) {}
}
