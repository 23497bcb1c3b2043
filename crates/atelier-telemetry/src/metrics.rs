//! Prometheus metrics for the plugin pipeline.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `atelier_requests_total` | Counter | `outcome` | Requests through the executor |
//! | `atelier_request_duration_seconds` | Histogram | `outcome` | Pipeline latency |
//! | `atelier_hook_failures_total` | Counter | `phase`, `source` | Failed hooks and middleware |
//! | `atelier_in_flight_requests` | Gauge | - | Requests currently executing |
//!
//! Recording functions are no-ops until a recorder is installed, so the
//! pipeline can call them unconditionally.
//!
//! # Example
//!
//! ```rust
//! use atelier_telemetry::metrics::{record_hook_failure, record_request};
//! use std::time::Duration;
//!
//! record_request("completed", Duration::from_millis(45));
//! record_hook_failure("before_request", "seo");
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;

/// Requests counter name.
pub const REQUESTS_TOTAL: &str = "atelier_requests_total";

/// Request duration histogram name.
pub const REQUEST_DURATION_SECONDS: &str = "atelier_request_duration_seconds";

/// Hook failure counter name.
pub const HOOK_FAILURES_TOTAL: &str = "atelier_hook_failures_total";

/// In-flight gauge name.
pub const IN_FLIGHT_REQUESTS: &str = "atelier_in_flight_requests";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,

    /// Value of the `service` label attached to every metric.
    pub service_name: String,

    /// Histogram buckets for request duration, in seconds.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_name: "atelier".to_string(),
            // 1ms .. 10s
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        }
    }
}

impl MetricsConfig {
    /// Builds the exporter for this configuration without installing it.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidConfig`] if the bucket list is empty.
    pub fn exporter(&self) -> TelemetryResult<PrometheusBuilder> {
        PrometheusBuilder::new()
            .add_global_label("service", self.service_name.clone())
            .set_buckets_for_metric(
                Matcher::Full(REQUEST_DURATION_SECONDS.to_string()),
                &self.duration_buckets,
            )
            .map_err(|e| TelemetryError::InvalidConfig(e.to_string()))
    }
}

/// Installs the global Prometheus recorder.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidConfig`] for unusable buckets and
/// [`TelemetryError::MetricsInit`] if a recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let handle = config
        .exporter()?
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let _ = METRICS_HANDLE.set(handle);
    describe_metrics();

    tracing::debug!(service = %config.service_name, "Metrics recorder installed");
    Ok(())
}

/// Returns the global handle if metrics are initialized.
pub fn metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Renders metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

/// Registers help text for the standard metrics with the current recorder.
pub fn describe_metrics() {
    describe_counter!(REQUESTS_TOTAL, "Requests processed by the plugin executor");
    describe_histogram!(
        REQUEST_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Time spent in the plugin pipeline"
    );
    describe_counter!(
        HOOK_FAILURES_TOTAL,
        "Plugin hooks and middleware that failed or timed out"
    );
    describe_gauge!(IN_FLIGHT_REQUESTS, "Requests currently in the plugin pipeline");
}

/// Records a finished request.
///
/// `outcome` is one of `completed`, `stopped` or `failed`.
pub fn record_request(outcome: &str, duration: Duration) {
    let outcome = outcome.to_string();
    counter!(REQUESTS_TOTAL, "outcome" => outcome.clone()).increment(1);
    histogram!(REQUEST_DURATION_SECONDS, "outcome" => outcome).record(duration.as_secs_f64());
}

/// Records a failed hook.
///
/// `source` is the plugin or middleware name, or `handler`.
pub fn record_hook_failure(phase: &str, source: &str) {
    counter!(
        HOOK_FAILURES_TOTAL,
        "phase" => phase.to_string(),
        "source" => source.to_string()
    )
    .increment(1);
}

/// Tracks one in-flight request for as long as it lives.
#[derive(Debug)]
#[must_use = "the request stops counting as in flight when the guard is dropped"]
pub struct InFlightGuard(());

impl InFlightGuard {
    /// Increments the in-flight gauge.
    pub fn new() -> Self {
        gauge!(IN_FLIGHT_REQUESTS).increment(1.0);
        Self(())
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(IN_FLIGHT_REQUESTS).decrement(1.0);
    }
}
