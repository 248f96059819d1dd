use std::time::Duration;

use tracing::debug;

/// Statistics sink for the store comparison. The process-local default just
/// emits tracing events; a real collector can be substituted at wiring time.
pub trait MetricsRecorder: Send + Sync {
    fn record_latency(&self, endpoint: &str, elapsed: Duration);
    fn record_contention(&self, endpoint: &str, wait: Duration);
    fn increment_counter(&self, name: &str, delta: i64);
}

pub struct TracingMetrics;

impl MetricsRecorder for TracingMetrics {
    fn record_latency(&self, endpoint: &str, elapsed: Duration) {
        debug!(endpoint, micros = elapsed.as_micros() as u64, "latency");
    }

    fn record_contention(&self, endpoint: &str, wait: Duration) {
        debug!(endpoint, micros = wait.as_micros() as u64, "lock wait");
    }

    fn increment_counter(&self, name: &str, delta: i64) {
        debug!(name, delta, "counter");
    }
}
