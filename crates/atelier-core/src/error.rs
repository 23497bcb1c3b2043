//! Error types for the plugin pipeline.
//!
//! Two families of errors exist:
//!
//! - [`RegistryError`] is returned synchronously to whoever registers or
//!   unregisters plugins and middleware. Nothing is retried.
//! - [`ExecutionError`] describes why a request entered the error phase. It
//!   is handed to every plugin's error hook and its [`message`] ends up in
//!   the fallback `500` body.
//!
//! | Failure | Variant |
//! |---|---|
//! | Duplicate name on register | [`RegistryError::DuplicatePlugin`], [`RegistryError::DuplicateMiddleware`] |
//! | Unknown name on unregister | [`RegistryError::PluginNotFound`], [`RegistryError::MiddlewareNotFound`] |
//! | Route pattern rejected on register | [`RegistryError::InvalidConfig`] |
//! | Middleware failed | [`ExecutionError::Middleware`] |
//! | Before-request hook failed | [`ExecutionError::BeforeRequest`] |
//! | Wrapped handler failed | [`ExecutionError::Handler`] |
//! | Hook exceeded the configured timeout | [`ExecutionError::Timeout`] |
//!
//! [`message`]: ExecutionError::message

use std::time::Duration;
use thiserror::Error;

/// Coarse classification of a [`RegistryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryErrorKind {
    /// A plugin or middleware with the same name already exists.
    Conflict,
    /// No plugin or middleware with that name exists.
    NotRegistered,
    /// A lifecycle hook failed during (un)registration.
    HookFailure,
    /// The registration settings were rejected.
    InvalidConfig,
}

/// Errors returned by registry mutations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A plugin with this name is already registered.
    #[error("Plugin '{0}' is already registered")]
    DuplicatePlugin(String),

    /// A middleware with this name is already registered.
    #[error("Middleware '{0}' is already registered")]
    DuplicateMiddleware(String),

    /// No plugin with this name is registered.
    #[error("Plugin '{0}' is not registered")]
    PluginNotFound(String),

    /// No middleware with this name is registered.
    #[error("Middleware '{0}' is not registered")]
    MiddlewareNotFound(String),

    /// The plugin's on-register hook failed, so it was not stored.
    #[error("on_register hook of plugin '{name}' failed: {source}")]
    RegisterHookFailed {
        /// Plugin name.
        name: String,
        /// Error raised by the hook.
        #[source]
        source: anyhow::Error,
    },

    /// The registration settings were rejected, so nothing was stored.
    #[error("Invalid configuration for '{name}': {source}")]
    InvalidConfig {
        /// Plugin or middleware name.
        name: String,
        /// The validation error.
        #[source]
        source: anyhow::Error,
    },

    /// The plugin's on-unregister hook failed, so it stays registered.
    #[error("on_unregister hook of plugin '{name}' failed: {source}")]
    UnregisterHookFailed {
        /// Plugin name.
        name: String,
        /// Error raised by the hook.
        #[source]
        source: anyhow::Error,
    },
}

impl RegistryError {
    /// Returns the error classification.
    #[must_use]
    pub const fn kind(&self) -> RegistryErrorKind {
        match self {
            Self::DuplicatePlugin(_) | Self::DuplicateMiddleware(_) => RegistryErrorKind::Conflict,
            Self::PluginNotFound(_) | Self::MiddlewareNotFound(_) => {
                RegistryErrorKind::NotRegistered
            }
            Self::RegisterHookFailed { .. } | Self::UnregisterHookFailed { .. } => {
                RegistryErrorKind::HookFailure
            }
            Self::InvalidConfig { .. } => RegistryErrorKind::InvalidConfig,
        }
    }
}

/// The failure that moved a request into the error phase.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A middleware returned an error.
    #[error("Middleware '{name}' failed: {source}")]
    Middleware {
        /// Middleware name.
        name: String,
        /// Error raised by the middleware.
        #[source]
        source: anyhow::Error,
    },

    /// A plugin's before-request hook returned an error.
    #[error("before_request hook of plugin '{plugin}' failed: {source}")]
    BeforeRequest {
        /// Plugin name.
        plugin: String,
        /// Error raised by the hook.
        #[source]
        source: anyhow::Error,
    },

    /// The wrapped handler returned an error.
    #[error("Handler failed: {0}")]
    Handler(#[source] anyhow::Error),

    /// A middleware, hook or the handler ran longer than the configured limit.
    #[error("'{name}' timed out after {timeout:?}")]
    Timeout {
        /// Name of the middleware, plugin, or `handler`.
        name: String,
        /// The configured limit.
        timeout: Duration,
    },
}

impl ExecutionError {
    /// Returns the message of the underlying error.
    ///
    /// For a handler failing with `anyhow!("boom")` this is exactly `"boom"`.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Middleware { source, .. }
            | Self::BeforeRequest { source, .. }
            | Self::Handler(source) => source.to_string(),
            Self::Timeout { .. } => self.to_string(),
        }
    }

    /// Returns the name of the middleware or plugin that failed, if any.
    #[must_use]
    pub fn origin(&self) -> &str {
        match self {
            Self::Middleware { name, .. } | Self::Timeout { name, .. } => name,
            Self::BeforeRequest { plugin, .. } => plugin,
            Self::Handler(_) => "handler",
        }
    }

    /// Returns `true` if the wrapped handler itself failed.
    #[must_use]
    pub const fn is_handler_failure(&self) -> bool {
        matches!(self, Self::Handler(_))
    }
}
