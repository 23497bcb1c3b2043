//! Registration and executor configuration.
//!
//! All configuration types deserialize with `serde`, so they can be loaded
//! from TOML or JSON next to the rest of an application's settings. Missing
//! fields take the documented defaults.
//!
//! ```
//! use atelier_plugins::config::PluginConfig;
//!
//! let config: PluginConfig = toml::from_str(r#"
//!     priority = 10
//!     routes = ["/api/*"]
//!     exclude_routes = ["/api/internal/*"]
//!
//!     [options]
//!     max_length = 160
//! "#).unwrap();
//!
//! assert!(config.enabled);
//! assert_eq!(config.priority, 10);
//! assert_eq!(config.options.unwrap()["max_length"], 160);
//! ```

use crate::matcher::{PatternError, RouteFilter};
use http::HeaderName;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Default priority for plugins and middleware. Lower runs earlier.
pub const DEFAULT_PRIORITY: i32 = 100;

/// The options bag handed to a plugin's hooks.
pub type PluginOptions = serde_json::Map<String, serde_json::Value>;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML document could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A header name is not a valid HTTP header name.
    #[error("Invalid header name '{value}' in {field}")]
    InvalidHeader {
        /// The offending field.
        field: &'static str,
        /// The offending value.
        value: String,
    },

    /// A value is out of range.
    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        /// The offending field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// A route pattern is too long or does not compile.
    #[error("Invalid route pattern: {0}")]
    InvalidRoute(#[from] PatternError),
}

const fn default_enabled() -> bool {
    true
}

const fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

/// Per-plugin registration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Disabled plugins stay registered but never run.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Execution order, ascending.
    #[serde(default = "default_priority")]
    pub priority: i32,

    /// Allow-list of route patterns. `None` applies to every route.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routes: Option<Vec<String>>,

    /// Deny-list of route patterns, checked after the allow-list.
    #[serde(
        default,
        alias = "excludeRoutes",
        skip_serializing_if = "Option::is_none"
    )]
    pub exclude_routes: Option<Vec<String>>,

    /// Options made available to the plugin's hooks through the request context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<PluginOptions>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: DEFAULT_PRIORITY,
            routes: None,
            exclude_routes: None,
            options: None,
        }
    }
}

impl PluginConfig {
    /// Creates a configuration with all defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the enabled flag.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Restricts the plugin to the given route patterns.
    #[must_use]
    pub fn with_routes<I, S>(mut self, routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.routes = Some(routes.into_iter().map(Into::into).collect());
        self
    }

    /// Excludes the given route patterns.
    #[must_use]
    pub fn with_exclude_routes<I, S>(mut self, routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_routes = Some(routes.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the options bag.
    #[must_use]
    pub fn with_options(mut self, options: PluginOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Sets a single option, creating the bag if needed.
    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.options
            .get_or_insert_with(PluginOptions::new)
            .insert(key.into(), value.into());
        self
    }

    /// Checks that every route pattern compiles.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.route_filter()?;
        Ok(())
    }

    pub(crate) fn route_filter(&self) -> Result<RouteFilter, PatternError> {
        RouteFilter::new(self.routes.as_deref(), self.exclude_routes.as_deref())
    }
}

/// Per-middleware registration settings.
///
/// Same shape as [`PluginConfig`] minus the enabled flag and options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    /// Execution order, ascending.
    #[serde(default = "default_priority")]
    pub priority: i32,

    /// Allow-list of route patterns. `None` applies to every route.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routes: Option<Vec<String>>,

    /// Deny-list of route patterns, checked after the allow-list.
    #[serde(
        default,
        alias = "excludeRoutes",
        skip_serializing_if = "Option::is_none"
    )]
    pub exclude_routes: Option<Vec<String>>,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
            routes: None,
            exclude_routes: None,
        }
    }
}

impl MiddlewareConfig {
    /// Creates a configuration with all defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Restricts the middleware to the given route patterns.
    #[must_use]
    pub fn with_routes<I, S>(mut self, routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.routes = Some(routes.into_iter().map(Into::into).collect());
        self
    }

    /// Excludes the given route patterns.
    #[must_use]
    pub fn with_exclude_routes<I, S>(mut self, routes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_routes = Some(routes.into_iter().map(Into::into).collect());
        self
    }

    /// Checks that every route pattern compiles.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.route_filter()?;
        Ok(())
    }

    pub(crate) fn route_filter(&self) -> Result<RouteFilter, PatternError> {
        RouteFilter::new(self.routes.as_deref(), self.exclude_routes.as_deref())
    }
}

/// Settings for the request executor.
///
/// ```
/// use atelier_plugins::config::ExecutorConfig;
///
/// let config = ExecutorConfig::from_toml_str(r#"
///     hook_timeout_ms = 2500
///     expose_error_messages = false
/// "#).unwrap();
///
/// assert_eq!(config.hook_timeout(), Some(std::time::Duration::from_millis(2500)));
/// assert_eq!(config.response_header, "x-request-id");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Inbound correlation headers, checked in order.
    pub request_id_headers: Vec<String>,

    /// Response header carrying the resolved request id.
    pub response_header: String,

    /// Whether inbound correlation ids are reused at all.
    pub trust_incoming_request_id: bool,

    /// Upper bound for each middleware, hook and handler call.
    ///
    /// `None` waits indefinitely.
    pub hook_timeout_ms: Option<u64>,

    /// Whether the fallback `500` body carries the failure's message.
    pub expose_error_messages: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            request_id_headers: vec!["x-request-id".to_string(), "x-correlation-id".to_string()],
            response_header: "x-request-id".to_string(),
            trust_incoming_request_id: true,
            hook_timeout_ms: None,
            expose_error_messages: true,
        }
    }
}

impl ExecutorConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks header names and the timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_header("response_header", &self.response_header)?;
        for name in &self.request_id_headers {
            parse_header("request_id_headers", name)?;
        }
        if self.hook_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "hook_timeout_ms",
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Returns the per-hook timeout, if configured.
    #[must_use]
    pub fn hook_timeout(&self) -> Option<Duration> {
        self.hook_timeout_ms.map(Duration::from_millis)
    }

    /// Sets the per-hook timeout.
    #[must_use]
    pub fn with_hook_timeout(mut self, timeout: Duration) -> Self {
        self.hook_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }
}

pub(crate) fn parse_header(field: &'static str, value: &str) -> Result<HeaderName, ConfigError> {
    HeaderName::from_bytes(value.as_bytes()).map_err(|_| ConfigError::InvalidHeader {
        field,
        value: value.to_string(),
    })
}
