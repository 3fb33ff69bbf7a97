use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

/// Histogram of use-case execution time, in seconds.
pub const DURATION_METRIC: &str = "backbone_usecase_duration_seconds";
/// Counter of executions that ended without error.
pub const SUCCESS_METRIC: &str = "backbone_usecase_success_total";
/// Counter of executions that ended with an error or no result.
pub const ERROR_METRIC: &str = "backbone_usecase_errors_total";

/// How one instrumented execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    Error,
    /// The body panicked or returned a non-terminal result.
    NoResult,
}

impl Outcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::NoResult => "no_result",
        }
    }
}

/// Destination for latency and outcome measurements.
pub trait MetricsSink: Send + Sync + 'static {
    fn record_latency(&self, operation: &'static str, elapsed: Duration);

    fn record_outcome(&self, operation: &'static str, outcome: Outcome);
}

/// Sink backed by the `metrics` facade; an installed recorder (e.g. the
/// Prometheus exporter) picks the values up.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsFacadeSink;

impl MetricsSink for MetricsFacadeSink {
    fn record_latency(&self, operation: &'static str, elapsed: Duration) {
        metrics::histogram!(DURATION_METRIC, "operation" => operation).record(elapsed.as_secs_f64());
    }

    fn record_outcome(&self, operation: &'static str, outcome: Outcome) {
        match outcome {
            Outcome::Success => {
                metrics::counter!(SUCCESS_METRIC, "operation" => operation).increment(1);
            }
            Outcome::Error | Outcome::NoResult => {
                metrics::counter!(
                    ERROR_METRIC,
                    "operation" => operation,
                    "kind" => outcome.as_str()
                )
                .increment(1);
            }
        }
    }
}

/// Sink that keeps every measurement in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetrics {
    inner: Arc<Mutex<Recorded>>,
}

#[derive(Debug, Default)]
struct Recorded {
    latencies: HashMap<&'static str, Vec<Duration>>,
    outcomes: HashMap<(&'static str, Outcome), u64>,
}

impl InMemoryMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn latencies(&self, operation: &str) -> Vec<Duration> {
        self.inner
            .lock()
            .latencies
            .get(operation)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn count(&self, operation: &str, outcome: Outcome) -> u64 {
        self.inner
            .lock()
            .outcomes
            .iter()
            .filter(|((op, o), _)| *op == operation && *o == outcome)
            .map(|(_, n)| *n)
            .sum()
    }

    #[must_use]
    pub fn successes(&self, operation: &str) -> u64 {
        self.count(operation, Outcome::Success)
    }

    /// Errors plus no-result executions, matching the exported error counter.
    #[must_use]
    pub fn errors(&self, operation: &str) -> u64 {
        self.count(operation, Outcome::Error) + self.count(operation, Outcome::NoResult)
    }
}

impl MetricsSink for InMemoryMetrics {
    fn record_latency(&self, operation: &'static str, elapsed: Duration) {
        self.inner
            .lock()
            .latencies
            .entry(operation)
            .or_default()
            .push(elapsed);
    }

    fn record_outcome(&self, operation: &'static str, outcome: Outcome) {
        *self
            .inner
            .lock()
            .outcomes
            .entry((operation, outcome))
            .or_default() += 1;
    }
}
