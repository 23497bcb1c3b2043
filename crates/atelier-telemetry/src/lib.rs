//! Structured logging and Prometheus metrics for Atelier.
//!
//! - **Logging**: `tracing` events rendered as JSON (production) or pretty
//!   text (development), filtered by an `EnvFilter` directive
//! - **Metrics**: request, hook failure and in-flight metrics recorded through
//!   the `metrics` facade and exported in Prometheus text format
//!
//! The plugin executor records metrics whether or not [`init_telemetry`] was
//! called. Without an installed recorder every call is a no-op.
//!
//! # Example
//!
//! ```rust,no_run
//! use atelier_telemetry::{init_telemetry, metrics::render_metrics, TelemetryConfig};
//!
//! let config = TelemetryConfig::builder()
//!     .service_name("cms-admin")
//!     .environment("production")
//!     .build();
//!
//! init_telemetry(&config).expect("Failed to init telemetry");
//!
//! // Serve this from a /metrics route.
//! let body = render_metrics().unwrap_or_default();
//! ```
//!
//! # Metrics Output
//!
//! ```text
//! # HELP atelier_requests_total Requests processed by the plugin executor
//! # TYPE atelier_requests_total counter
//! atelier_requests_total{service="cms-admin",outcome="completed"} 1234
//! atelier_requests_total{service="cms-admin",outcome="stopped"} 56
//! atelier_hook_failures_total{service="cms-admin",phase="before_request",source="seo"} 3
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

pub use self::config::{TelemetryConfig, TelemetryConfigBuilder};
pub use self::error::TelemetryError;
pub use self::logging::{init_logging, LogConfig};
pub use self::metrics::{init_metrics, render_metrics, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Initializes logging, then metrics.
///
/// Call once at startup. A second call fails because the global subscriber
/// and recorder are already installed.
///
/// # Errors
///
/// Returns `TelemetryError` if either subsystem fails to initialize.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<()> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)?;

    tracing::info!(
        service = %config.service_name,
        environment = %config.environment,
        metrics = config.metrics.enabled,
        "Telemetry initialized"
    );
    Ok(())
}
