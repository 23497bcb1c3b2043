//! Application configuration file.
//!
//! One TOML document configures the executor, telemetry, and the
//! registration options of individual plugins and middleware:
//!
//! ```toml
//! [executor]
//! hook_timeout_ms = 5000
//!
//! [telemetry]
//! service_name = "cms-admin"
//!
//! [telemetry.logging]
//! level = "atelier_plugins=debug,info"
//!
//! [plugins.seo]
//! priority = 10
//! routes = ["/api/pages/*"]
//!
//! [plugins.seo.options]
//! max_title_length = 60
//!
//! [middleware.bearer_auth]
//! priority = 0
//! exclude_routes = ["/api/health"]
//! ```
//!
//! Plugins and middleware without a table register with default options.

use atelier_plugins::{ConfigError, Executor, ExecutorConfig, MiddlewareConfig, PluginConfig, Registry};
use atelier_telemetry::TelemetryConfig;
use indexmap::IndexMap;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while loading the configuration file.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file could not be read.
    #[error("failed to read configuration file: {}", .path.display())]
    Read {
        /// Path to the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Everything an application built on the pipeline configures.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AtelierConfig {
    /// Executor settings.
    pub executor: ExecutorConfig,

    /// Logging and metrics.
    pub telemetry: TelemetryConfig,

    /// Registration options by plugin name.
    pub plugins: IndexMap<String, PluginConfig>,

    /// Registration options by middleware name.
    pub middleware: IndexMap<String, MiddlewareConfig>,
}

impl AtelierConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.executor.validate()?;
        for plugin in config.plugins.values() {
            plugin.validate()?;
        }
        for middleware in config.middleware.values() {
            middleware.validate()?;
        }
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_toml_str(&source)?)
    }

    /// Registration options for a plugin, or the defaults.
    #[must_use]
    pub fn plugin(&self, name: &str) -> PluginConfig {
        self.plugins.get(name).cloned().unwrap_or_default()
    }

    /// Registration options for a middleware, or the defaults.
    #[must_use]
    pub fn middleware(&self, name: &str) -> MiddlewareConfig {
        self.middleware.get(name).cloned().unwrap_or_default()
    }

    /// Builds an executor over `registry` with the `[executor]` settings.
    pub fn executor(&self, registry: Arc<Registry>) -> Result<Executor, ConfigError> {
        Executor::with_config(registry, &self.executor)
    }
}
