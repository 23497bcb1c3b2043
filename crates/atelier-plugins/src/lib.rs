//! # Atelier Plugins
//!
//! Plugin registry and request lifecycle executor for Atelier.
//!
//! Independently registered plugins and middleware run around a request
//! handler in priority order, share per-request state, and can stop a
//! request early. Failures are isolated so that one misbehaving plugin
//! cannot prevent the others from handling an error.
//!
//! ## Lifecycle
//!
//! ```text
//! Request → Middleware → Before hooks → Handler → After hooks → Response
//!               │             │            │
//!               └─────────────┴────────────┴──→ Error hooks → 500 fallback
//! ```
//!
//! | Phase | Runs | Failure |
//! |-------|------|---------|
//! | Middleware | every middleware for the route | error phase |
//! | Before-request | every enabled plugin for the route | error phase |
//! | Handler | the wrapped handler | error phase |
//! | After-request | every enabled plugin for the route | logged, last response kept |
//! | Error | every enabled plugin for the route | logged, next hook still runs |
//!
//! ## Example
//!
//! ```
//! use atelier_core::{Request, Response, ResponseExt};
//! use atelier_plugins::{Executor, Flow, FnPlugin, PluginConfig, Registry};
//! use bytes::Bytes;
//! use http::StatusCode;
//! use http_body_util::Full;
//! use std::sync::Arc;
//!
//! struct Locale(String);
//!
//! # tokio_test::block_on(async {
//! let registry = Arc::new(Registry::new());
//! registry
//!     .register_with(
//!         FnPlugin::builder("locale")
//!             .before_request(|ctx| {
//!                 Box::pin(async move {
//!                     let locale = ctx.header("accept-language").unwrap_or("en").to_string();
//!                     ctx.insert(Locale(locale));
//!                     Ok(Flow::Continue)
//!                 })
//!             })
//!             .build(),
//!         PluginConfig::new().with_priority(10).with_routes(["/api/*"]),
//!     )
//!     .await
//!     .unwrap();
//!
//! let handler = Executor::new(registry).wrap(|_request: Request| async {
//!     Ok(Response::empty(StatusCode::OK))
//! });
//!
//! let request = http::Request::get("/api/pages")
//!     .body(Full::new(Bytes::new()))
//!     .unwrap();
//! assert_eq!(handler.handle(request).await.status(), StatusCode::OK);
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/atelier-plugins/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod context;
pub mod executor;
pub mod factory;
pub mod matcher;
pub mod middleware;
pub mod plugin;
pub mod registry;
pub mod stages;
pub mod wrapper;

// Re-export main types at crate root
pub use config::{ConfigError, ExecutorConfig, MiddlewareConfig, PluginConfig, PluginOptions};
pub use context::RequestContext;
pub use executor::{Executor, Outcome, Phase};
pub use factory::ContextFactory;
pub use matcher::{matches, PatternError, RouteFilter, RoutePattern};
pub use middleware::{FnMiddleware, Middleware};
pub use plugin::{
    AfterRequest, BeforeRequest, Flow, FnPlugin, FnPluginBuilder, HookResult, OnError, OnRegister,
    OnUnregister, Plugin,
};
pub use registry::{RegisteredMiddleware, RegisteredPlugin, Registry};
pub use wrapper::{Handler, WrappedHandler};
