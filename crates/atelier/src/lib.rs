//! # Atelier
//!
//! **Plugin and middleware pipeline for the Atelier CMS admin**
//!
//! Atelier lets independently written extensions take part in every admin
//! API request:
//!
//! - **Plugins** hook into registration, before-request, after-request and
//!   error handling, each filtered by route and ordered by priority
//! - **Middleware** runs ahead of all plugins and can authenticate, annotate
//!   or stop a request
//! - **Shared state** flows between extensions through a typed per-request
//!   context
//! - **Failure isolation** keeps one broken plugin from taking down error
//!   handling for the rest
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use atelier::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AtelierConfig::from_file("atelier.toml")?;
//!     init_telemetry(&config.telemetry)?;
//!
//!     let registry = Arc::new(Registry::new());
//!     registry.register_with(SeoPlugin::new(), config.plugin("seo")).await?;
//!     registry.register_middleware(
//!         BearerAuthMiddleware::required(my_authenticator()),
//!         config.middleware("bearer_auth"),
//!     )?;
//!
//!     let pages = config.executor(registry)?.wrap(list_pages);
//!     let response = pages.handle(request).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Request → Middleware → Before hooks → Handler → After hooks → Response
//!               │             │            │
//!               └─────────────┴────────────┴──→ Error hooks → 500 fallback
//! ```

#![doc(html_root_url = "https://docs.rs/atelier/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;

// Re-export core types
pub use atelier_core as core;

// Re-export the plugin pipeline
pub use atelier_plugins as plugins;

// Re-export telemetry
pub use atelier_telemetry as telemetry;

pub use config::{AtelierConfig, LoadError};

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use atelier::prelude::*;
///
/// let registry = Registry::new();
/// assert!(registry.plugins().is_empty());
/// ```
pub mod prelude {
    pub use crate::config::AtelierConfig;

    pub use atelier_core::{
        AuthError, Authenticator, BoxFuture, ExecutionError, RegistryError, Request, RequestId,
        Response, ResponseExt, UserIdentity,
    };

    pub use atelier_plugins::{
        AfterRequest, BeforeRequest, Executor, ExecutorConfig, Flow, FnMiddleware, FnPlugin,
        Handler, HookResult, Middleware, MiddlewareConfig, OnError, OnRegister, OnUnregister,
        Plugin, PluginConfig, Registry, RequestContext, WrappedHandler,
    };

    // Built-in extensions
    pub use atelier_plugins::stages::{AccessLogPlugin, AuthMode, BearerAuthMiddleware};

    pub use atelier_telemetry::{init_telemetry, TelemetryConfig};
}
