//! Telemetry configuration.

use crate::logging::LogConfig;
use crate::metrics::MetricsConfig;
use serde::Deserialize;

/// Configuration for logging and metrics.
///
/// Deserializes from the `[telemetry]` table of an application config:
///
/// ```toml
/// service_name = "cms-admin"
/// environment = "production"
///
/// [logging]
/// level = "atelier_plugins=debug,info"
///
/// [metrics]
/// enabled = true
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Service name, used as the `service` metric label.
    pub service_name: String,

    /// Environment (production, staging, development).
    pub environment: String,

    /// Metrics configuration.
    pub metrics: MetricsConfig,

    /// Logging configuration.
    pub logging: LogConfig,
}

impl TelemetryConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::new()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "atelier".to_string(),
            environment: "development".to_string(),
            metrics: MetricsConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

/// Builder for [`TelemetryConfig`].
#[derive(Debug, Default)]
pub struct TelemetryConfigBuilder {
    service_name: Option<String>,
    environment: Option<String>,
    metrics: Option<MetricsConfig>,
    logging: Option<LogConfig>,
}

impl TelemetryConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the service name.
    #[must_use]
    pub fn service_name(mut self, name: &str) -> Self {
        self.service_name = Some(name.to_string());
        self
    }

    /// Sets the environment.
    ///
    /// Unless logging is configured explicitly, `development` selects
    /// [`LogConfig::development`] and anything else [`LogConfig::production`].
    #[must_use]
    pub fn environment(mut self, env: &str) -> Self {
        self.environment = Some(env.to_string());
        self
    }

    /// Sets the metrics configuration.
    #[must_use]
    pub fn metrics(mut self, config: MetricsConfig) -> Self {
        self.metrics = Some(config);
        self
    }

    /// Disables metrics.
    #[must_use]
    pub fn disable_metrics(mut self) -> Self {
        let mut config = self.metrics.unwrap_or_default();
        config.enabled = false;
        self.metrics = Some(config);
        self
    }

    /// Sets the logging configuration.
    #[must_use]
    pub fn logging(mut self, config: LogConfig) -> Self {
        self.logging = Some(config);
        self
    }

    /// Sets the log filter directive.
    #[must_use]
    pub fn log_level(mut self, level: &str) -> Self {
        let config = self.logging.unwrap_or_default();
        self.logging = Some(config.with_level(level));
        self
    }

    /// Builds the configuration.
    ///
    /// The service name is copied into the metrics configuration.
    #[must_use]
    pub fn build(self) -> TelemetryConfig {
        let defaults = TelemetryConfig::default();
        let service_name = self.service_name.unwrap_or(defaults.service_name);
        let environment = self.environment.unwrap_or(defaults.environment);

        let mut metrics = self.metrics.unwrap_or_default();
        metrics.service_name.clone_from(&service_name);

        let logging = self.logging.unwrap_or_else(|| {
            if environment == "development" {
                LogConfig::development()
            } else {
                LogConfig::production()
            }
        });

        TelemetryConfig {
            service_name,
            environment,
            metrics,
            logging,
        }
    }
}
