//! Plugin trait and lifecycle hook capabilities.
//!
//! A plugin is a named unit exposing any subset of five lifecycle hooks:
//!
//! | Capability | When it runs |
//! |------------|--------------|
//! | [`OnRegister`] | Once, while the plugin is being registered |
//! | [`BeforeRequest`] | Before the handler, in priority order |
//! | [`AfterRequest`] | After a successful handler, threading the response |
//! | [`OnError`] | When middleware, a before-hook or the handler fails |
//! | [`OnUnregister`] | Once, while the plugin is being unregistered |
//!
//! Each capability is its own trait. A [`Plugin`] advertises the ones it has
//! through the `as_*` accessors, which return `None` by default.
//!
//! # Example
//!
//! Most plugins are built from closures with [`FnPlugin::builder`]:
//!
//! ```
//! use atelier_plugins::plugin::{Flow, FnPlugin};
//!
//! struct Started;
//!
//! let plugin = FnPlugin::builder("timing")
//!     .version("1.0.0")
//!     .before_request(|ctx| {
//!         Box::pin(async move {
//!             ctx.insert(Started);
//!             Ok(Flow::Continue)
//!         })
//!     })
//!     .build();
//! ```
//!
//! Plugins with their own state implement the traits directly:
//!
//! ```
//! use atelier_core::BoxFuture;
//! use atelier_plugins::context::RequestContext;
//! use atelier_plugins::plugin::{BeforeRequest, Flow, HookResult, Plugin};
//!
//! struct Maintenance {
//!     enabled: bool,
//! }
//!
//! impl BeforeRequest for Maintenance {
//!     fn before_request<'a>(&'a self, _ctx: &'a mut RequestContext) -> BoxFuture<'a, HookResult<Flow>> {
//!         Box::pin(async move {
//!             Ok(if self.enabled { Flow::Stop } else { Flow::Continue })
//!         })
//!     }
//! }
//!
//! impl Plugin for Maintenance {
//!     fn name(&self) -> &str {
//!         "maintenance"
//!     }
//!
//!     fn as_before_request(&self) -> Option<&dyn BeforeRequest> {
//!         Some(self)
//!     }
//! }
//! ```

use crate::context::RequestContext;
use atelier_core::{BoxFuture, ExecutionError, Response};
use std::fmt;
use std::future::Future;

/// Result type returned by hooks and middleware.
pub type HookResult<T = ()> = anyhow::Result<T>;

/// Whether request processing continues after a before-hook or middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Proceed to the next hook.
    Continue,
    /// Stop here. No further hooks, no handler, no after- or error-hooks.
    ///
    /// The stopping hook is expected to have answered the request with
    /// [`RequestContext::respond`].
    Stop,
}

/// Runs while the plugin is being registered. A failure aborts registration.
pub trait OnRegister: Send + Sync {
    /// Invoked once before the plugin is stored.
    fn on_register(&self) -> BoxFuture<'_, HookResult>;
}

/// Runs while the plugin is being unregistered. A failure aborts removal.
pub trait OnUnregister: Send + Sync {
    /// Invoked once before the plugin is removed.
    fn on_unregister(&self) -> BoxFuture<'_, HookResult>;
}

/// Runs before the handler.
pub trait BeforeRequest: Send + Sync {
    /// Inspects or enriches the request context.
    fn before_request<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, HookResult<Flow>>;
}

/// Runs after a successful handler.
pub trait AfterRequest: Send + Sync {
    /// Returns `Some` to replace the response, `None` to keep it.
    fn after_request<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        response: &'a Response,
    ) -> BoxFuture<'a, HookResult<Option<Response>>>;
}

/// Runs when the request fails.
pub trait OnError: Send + Sync {
    /// Observes the failure. May answer the request with [`RequestContext::respond`].
    fn on_error<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        error: &'a ExecutionError,
    ) -> BoxFuture<'a, HookResult>;
}

/// A named extension with optional lifecycle hooks.
///
/// The name identifies the plugin in the registry and must be unique.
pub trait Plugin: Send + Sync + 'static {
    /// Returns the unique plugin name.
    fn name(&self) -> &str;

    /// Returns the plugin version, if any.
    fn version(&self) -> Option<&str> {
        None
    }

    /// Returns a human-readable description, if any.
    fn description(&self) -> Option<&str> {
        None
    }

    /// Returns the on-register capability.
    fn as_on_register(&self) -> Option<&dyn OnRegister> {
        None
    }

    /// Returns the before-request capability.
    fn as_before_request(&self) -> Option<&dyn BeforeRequest> {
        None
    }

    /// Returns the after-request capability.
    fn as_after_request(&self) -> Option<&dyn AfterRequest> {
        None
    }

    /// Returns the on-error capability.
    fn as_on_error(&self) -> Option<&dyn OnError> {
        None
    }

    /// Returns the on-unregister capability.
    fn as_on_unregister(&self) -> Option<&dyn OnUnregister> {
        None
    }
}

struct RegisterFn<F>(F);

impl<F, Fut> OnRegister for RegisterFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = HookResult> + Send + 'static,
{
    fn on_register(&self) -> BoxFuture<'_, HookResult> {
        Box::pin((self.0)())
    }
}

struct UnregisterFn<F>(F);

impl<F, Fut> OnUnregister for UnregisterFn<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = HookResult> + Send + 'static,
{
    fn on_unregister(&self) -> BoxFuture<'_, HookResult> {
        Box::pin((self.0)())
    }
}

struct BeforeFn<F>(F);

impl<F> BeforeRequest for BeforeFn<F>
where
    F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, HookResult<Flow>> + Send + Sync,
{
    fn before_request<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, HookResult<Flow>> {
        (self.0)(ctx)
    }
}

struct AfterFn<F>(F);

impl<F> AfterRequest for AfterFn<F>
where
    F: for<'a> Fn(&'a mut RequestContext, &'a Response) -> BoxFuture<'a, HookResult<Option<Response>>>
        + Send
        + Sync,
{
    fn after_request<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        response: &'a Response,
    ) -> BoxFuture<'a, HookResult<Option<Response>>> {
        (self.0)(ctx, response)
    }
}

struct ErrorFn<F>(F);

impl<F> OnError for ErrorFn<F>
where
    F: for<'a> Fn(&'a mut RequestContext, &'a ExecutionError) -> BoxFuture<'a, HookResult>
        + Send
        + Sync,
{
    fn on_error<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        error: &'a ExecutionError,
    ) -> BoxFuture<'a, HookResult> {
        (self.0)(ctx, error)
    }
}

/// A plugin assembled from closures.
///
/// Built with [`FnPlugin::builder`]. Hooks that are not set are simply absent.
pub struct FnPlugin {
    name: String,
    version: Option<String>,
    description: Option<String>,
    on_register: Option<Box<dyn OnRegister>>,
    before_request: Option<Box<dyn BeforeRequest>>,
    after_request: Option<Box<dyn AfterRequest>>,
    on_error: Option<Box<dyn OnError>>,
    on_unregister: Option<Box<dyn OnUnregister>>,
}

impl FnPlugin {
    /// Starts building a plugin with the given name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> FnPluginBuilder {
        FnPluginBuilder {
            plugin: Self {
                name: name.into(),
                version: None,
                description: None,
                on_register: None,
                before_request: None,
                after_request: None,
                on_error: None,
                on_unregister: None,
            },
        }
    }
}

impl fmt::Debug for FnPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPlugin")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("on_register", &self.on_register.is_some())
            .field("before_request", &self.before_request.is_some())
            .field("after_request", &self.after_request.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_unregister", &self.on_unregister.is_some())
            .finish_non_exhaustive()
    }
}

impl Plugin for FnPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn as_on_register(&self) -> Option<&dyn OnRegister> {
        self.on_register.as_deref()
    }

    fn as_before_request(&self) -> Option<&dyn BeforeRequest> {
        self.before_request.as_deref()
    }

    fn as_after_request(&self) -> Option<&dyn AfterRequest> {
        self.after_request.as_deref()
    }

    fn as_on_error(&self) -> Option<&dyn OnError> {
        self.on_error.as_deref()
    }

    fn as_on_unregister(&self) -> Option<&dyn OnUnregister> {
        self.on_unregister.as_deref()
    }
}

/// Builder for [`FnPlugin`].
#[must_use]
pub struct FnPluginBuilder {
    plugin: FnPlugin,
}

impl FnPluginBuilder {
    /// Sets the version.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.plugin.version = Some(version.into());
        self
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.plugin.description = Some(description.into());
        self
    }

    /// Sets the on-register hook.
    pub fn on_register<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.plugin.on_register = Some(Box::new(RegisterFn(hook)));
        self
    }

    /// Sets the before-request hook.
    pub fn before_request<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, HookResult<Flow>>
            + Send
            + Sync
            + 'static,
    {
        self.plugin.before_request = Some(Box::new(BeforeFn(hook)));
        self
    }

    /// Sets the after-request hook.
    pub fn after_request<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut RequestContext, &'a Response) -> BoxFuture<'a, HookResult<Option<Response>>>
            + Send
            + Sync
            + 'static,
    {
        self.plugin.after_request = Some(Box::new(AfterFn(hook)));
        self
    }

    /// Sets the on-error hook.
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: for<'a> Fn(&'a mut RequestContext, &'a ExecutionError) -> BoxFuture<'a, HookResult>
            + Send
            + Sync
            + 'static,
    {
        self.plugin.on_error = Some(Box::new(ErrorFn(hook)));
        self
    }

    /// Sets the on-unregister hook.
    pub fn on_unregister<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.plugin.on_unregister = Some(Box::new(UnregisterFn(hook)));
        self
    }

    /// Finishes the plugin.
    #[must_use]
    pub fn build(self) -> FnPlugin {
        self.plugin
    }
}
