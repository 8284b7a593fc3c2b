//! Prometheus metrics for the scheduling engine.
//!
//! Engine code records through the small recorder types below; they talk to
//! the `metrics` facade and cost nothing until an exporter is installed.
//! [`MetricsServer`] installs the Prometheus exporter.
//!
//! # Example
//!
//! ```rust,no_run
//! use dojo_scheduler_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?; // serves http://0.0.0.0:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server bound to `addr` once started.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Register metric descriptions, install the exporter and serve
    /// `/metrics` over HTTP on the configured address.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed. A recorder
    /// that is already installed (e.g. by another test) is not an error.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let result = Self::builder()?.with_http_listener(self.addr).install();
        match result {
            Ok(()) => {
                tracing::info!(
                    addr = %self.addr,
                    "Metrics available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(e) => Self::tolerate_reinstall(&e.to_string()),
        }
    }

    /// Install the recorder without an HTTP listener, keeping a handle so the
    /// caller can [`render`](Self::render) metrics itself.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub fn start_recorder_only(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        match Self::builder()?.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => Self::tolerate_reinstall(&e.to_string()),
        }
    }

    fn builder() -> Result<PrometheusBuilder, MetricsError> {
        PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))
    }

    fn tolerate_reinstall(message: &str) -> Result<(), MetricsError> {
        if message.contains("already initialized") {
            tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
            Ok(())
        } else {
            Err(MetricsError::Install(message.to_string()))
        }
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    describe_counter!(
        "scheduler_transitions_total",
        "Committed slot transitions by kind (save, book, cancel, delete)"
    );
    describe_counter!(
        "scheduler_booking_attempts_total",
        "Booking attempts by outcome (success, conflict, rejected, error)"
    );
    describe_counter!(
        "scheduler_hook_failures_total",
        "Post-commit hook failures that were logged and swallowed"
    );
    describe_counter!(
        "scheduler_mirror_failures_total",
        "Failed writes to the legacy availability/meeting mirror"
    );
    describe_counter!(
        "scheduler_slots_expired_total",
        "Slots removed by the expiration sweep"
    );
    describe_histogram!(
        "scheduler_operation_duration_seconds",
        "Engine operation latency by operation"
    );
    describe_counter!("retry_attempts_total", "Total number of retry attempts");
    describe_counter!("retry_successes_total", "Operations that succeeded after retrying");
    describe_counter!("retry_exhausted_total", "Operations that ran out of retries");
}

/// How a booking attempt ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BookingOutcome {
    /// A seat was claimed.
    Success,
    /// Lost to a concurrent writer, or the slot was already taken.
    Conflict,
    /// Refused before any write (validation, authorization, not found).
    Rejected,
    /// Infrastructure failure.
    Error,
}

impl BookingOutcome {
    const fn label(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Conflict => "conflict",
            Self::Rejected => "rejected",
            Self::Error => "error",
        }
    }
}

/// Engine metrics recorder.
pub struct SchedulerMetrics;

impl SchedulerMetrics {
    /// Record a committed transition.
    pub fn record_transition(kind: &'static str) {
        counter!("scheduler_transitions_total", "kind" => kind).increment(1);
    }

    /// Record how a booking attempt ended.
    pub fn record_booking(outcome: BookingOutcome) {
        counter!("scheduler_booking_attempts_total", "outcome" => outcome.label()).increment(1);
    }

    /// Record a swallowed hook failure.
    pub fn record_hook_failure(hook: &'static str) {
        counter!("scheduler_hook_failures_total", "hook" => hook).increment(1);
    }

    /// Record a failed mirror write.
    pub fn record_mirror_failure() {
        counter!("scheduler_mirror_failures_total").increment(1);
    }

    /// Record slots removed by the sweep.
    pub fn record_expired(count: u64) {
        counter!("scheduler_slots_expired_total").increment(count);
    }

    /// Record the latency of an engine operation.
    pub fn record_duration(op: &'static str, duration: Duration) {
        histogram!("scheduler_operation_duration_seconds", "op" => op)
            .record(duration.as_secs_f64());
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("retry_attempts_total").increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!("retry_successes_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("retry_exhausted_total").increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn recorder_only_mode_renders_scheduler_metrics() {
        let mut server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        server.start_recorder_only().unwrap();
        SchedulerMetrics::record_transition("save");

        // Another test may have installed the global recorder first
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("scheduler_transitions_total"));
        }
    }

    #[test]
    fn test_metrics_server_creation() {
        let addr = "127.0.0.1:0".parse().unwrap();
        let server = MetricsServer::new(addr);
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[test]
    fn recording_without_exporter_is_a_no_op() {
        SchedulerMetrics::record_transition("book");
        SchedulerMetrics::record_booking(BookingOutcome::Conflict);
        SchedulerMetrics::record_duration("book", Duration::from_millis(3));
        RetryMetrics::record_attempt();
    }

    #[test]
    fn booking_outcome_labels() {
        assert_eq!(BookingOutcome::Success.label(), "success");
        assert_eq!(BookingOutcome::Rejected.label(), "rejected");
    }
}
