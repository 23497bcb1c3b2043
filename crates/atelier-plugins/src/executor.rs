//! Request lifecycle executor.
//!
//! The [`Executor`] drives one request through a fixed sequence of phases:
//!
//! ```text
//!            ┌────────────┐   ┌────────────────┐   ┌─────────┐   ┌───────────────┐
//! request ──▶│ Middleware │──▶│ Before-request │──▶│ Handler │──▶│ After-request │──▶ response
//!            └─────┬──────┘   └───────┬────────┘   └────┬────┘   └───────────────┘
//!                  │ error            │ error           │ error
//!                  ▼                  ▼                 ▼
//!            ┌─────────────────────────────────────────────┐
//!            │ Error: every on-error hook, then 500 backstop │──▶ response
//!            └─────────────────────────────────────────────┘
//! ```
//!
//! A middleware or before-hook returning [`Flow::Stop`] ends the request
//! immediately with whatever response it stored on the context. No handler,
//! after-hooks or error-hooks run for a deliberate stop.
//!
//! Each phase queries the [`Registry`] when it starts, so registry changes
//! made while a request is in flight only affect phases not yet started.

use crate::config::{ConfigError, ExecutorConfig};
use crate::context::RequestContext;
use crate::factory::ContextFactory;
use crate::plugin::{Flow, HookResult};
use crate::registry::Registry;
use crate::wrapper::{Handler, WrappedHandler};
use atelier_core::{ExecutionError, Request, Response, ResponseExt, UserIdentity};
use atelier_telemetry::metrics::{record_hook_failure, record_request, InFlightGuard};
use http::StatusCode;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Message used in the fallback `500` body when error messages are hidden.
pub const GENERIC_ERROR_MESSAGE: &str = "An unexpected error occurred";

/// The lifecycle phases of a request, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Phase {
    /// Middleware chain.
    Middleware = 1,
    /// Plugin before-request hooks.
    BeforeRequest = 2,
    /// The wrapped handler.
    Handler = 3,
    /// Plugin after-request hooks.
    AfterRequest = 4,
    /// Plugin on-error hooks and the fallback response.
    Error = 5,
}

impl Phase {
    /// Returns the phase name used in logs and metric labels.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Middleware => "middleware",
            Self::BeforeRequest => "before_request",
            Self::Handler => "handler",
            Self::AfterRequest => "after_request",
            Self::Error => "error",
        }
    }

    /// Returns all phases in order.
    #[must_use]
    pub const fn all() -> [Phase; 5] {
        [
            Self::Middleware,
            Self::BeforeRequest,
            Self::Handler,
            Self::AfterRequest,
            Self::Error,
        ]
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a request left the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The handler ran and after-hooks were applied.
    Completed,
    /// A middleware or before-hook stopped the request.
    Stopped,
    /// The request went through the error phase.
    Failed,
}

impl Outcome {
    /// Returns the outcome label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

/// A single hook call that did not produce a value.
enum HookFailure {
    Failed(anyhow::Error),
    TimedOut(Duration),
}

impl HookFailure {
    /// Turns the failure into the error that feeds the error phase.
    fn escalate(self, name: &str, wrap: impl FnOnce(anyhow::Error) -> ExecutionError) -> ExecutionError {
        match self {
            Self::Failed(source) => wrap(source),
            Self::TimedOut(timeout) => ExecutionError::Timeout {
                name: name.to_string(),
                timeout,
            },
        }
    }
}

impl fmt::Display for HookFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(source) => write!(f, "{source}"),
            Self::TimedOut(timeout) => write!(f, "timed out after {timeout:?}"),
        }
    }
}

#[derive(Debug)]
struct Inner {
    registry: Arc<Registry>,
    factory: ContextFactory,
    hook_timeout: Option<Duration>,
    expose_error_messages: bool,
}

/// Runs requests through middleware, plugin hooks and a handler.
///
/// Cheap to clone; clones share the registry and settings.
///
/// # Example
///
/// ```
/// use atelier_core::{Request, Response, ResponseExt};
/// use atelier_plugins::executor::Executor;
/// use atelier_plugins::registry::Registry;
/// use bytes::Bytes;
/// use http::StatusCode;
/// use http_body_util::Full;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let executor = Executor::new(Arc::new(Registry::new()));
/// let handler = executor.wrap(|_request: Request| async {
///     Ok(Response::empty(StatusCode::OK))
/// });
///
/// let request = http::Request::get("/api/health")
///     .header("x-request-id", "req-1")
///     .body(Full::new(Bytes::new()))
///     .unwrap();
/// let response = handler.handle(request).await;
///
/// assert_eq!(response.status(), StatusCode::OK);
/// assert_eq!(response.headers()["x-request-id"], "req-1");
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct Executor {
    inner: Arc<Inner>,
}

impl Executor {
    /// Creates an executor with default settings.
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                factory: ContextFactory::new(),
                hook_timeout: None,
                expose_error_messages: true,
            }),
        }
    }

    /// Creates an executor from explicit settings.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the settings fail validation.
    pub fn with_config(registry: Arc<Registry>, config: &ExecutorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                factory: ContextFactory::from_config(config)?,
                hook_timeout: config.hook_timeout(),
                expose_error_messages: config.expose_error_messages,
            }),
        })
    }

    /// Returns the registry consulted for every request.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    /// Returns the context factory.
    #[must_use]
    pub fn factory(&self) -> &ContextFactory {
        &self.inner.factory
    }

    /// Wraps a handler so every call runs the full lifecycle.
    pub fn wrap<H: Handler>(&self, handler: H) -> WrappedHandler<H> {
        WrappedHandler::new(self.clone(), handler)
    }

    /// Runs one anonymous request through the lifecycle.
    pub async fn execute<H>(&self, request: Request, handler: &H) -> Response
    where
        H: Handler + ?Sized,
    {
        self.execute_with_user(request, None, handler).await
    }

    /// Runs one request through the lifecycle with an already authenticated user.
    ///
    /// Always returns a response. The resolved request id is written to the
    /// configured response header.
    pub async fn execute_with_user<H>(
        &self,
        request: Request,
        user: Option<UserIdentity>,
        handler: &H,
    ) -> Response
    where
        H: Handler + ?Sized,
    {
        let _in_flight = InFlightGuard::new();
        let mut ctx = self.inner.factory.create(&request, user);
        let span = tracing::info_span!(
            "request",
            request_id = %ctx.request_id(),
            http.method = %ctx.method(),
            http.path = %ctx.path(),
        );

        let (outcome, response) = self.run(&mut ctx, request, handler).instrument(span).await;

        let duration = ctx.elapsed();
        record_request(outcome.as_str(), duration);
        tracing::debug!(
            request_id = %ctx.request_id(),
            outcome = outcome.as_str(),
            http.status_code = response.status().as_u16(),
            duration_ms = duration.as_secs_f64() * 1000.0,
            "Request finished"
        );

        self.inner.factory.finish(&ctx, response)
    }

    async fn run<H>(&self, ctx: &mut RequestContext, request: Request, handler: &H) -> (Outcome, Response)
    where
        H: Handler + ?Sized,
    {
        match self.run_phases(ctx, request, handler).await {
            Ok(Some(response)) => (Outcome::Completed, response),
            Ok(None) => (Outcome::Stopped, Self::stopped_response(ctx)),
            Err(error) => (Outcome::Failed, self.run_error_phase(ctx, error).await),
        }
    }

    /// Runs every phase up to and including after-request hooks.
    ///
    /// Returns `None` when the request was stopped.
    async fn run_phases<H>(
        &self,
        ctx: &mut RequestContext,
        mut request: Request,
        handler: &H,
    ) -> Result<Option<Response>, ExecutionError>
    where
        H: Handler + ?Sized,
    {
        let path = ctx.path().to_string();

        if self.run_middleware(ctx, &path).await? == Flow::Stop {
            return Ok(None);
        }
        if self.run_before_hooks(ctx, &path).await? == Flow::Stop {
            return Ok(None);
        }

        ctx.set_phase(Phase::Handler);
        request.extensions_mut().insert(ctx.request_id().clone());
        if let Some(user) = ctx.user() {
            request.extensions_mut().insert(user.clone());
        }
        let response = self
            .guard(handler.call(request))
            .await
            .map_err(|failure| failure.escalate(Phase::Handler.name(), ExecutionError::Handler))?;

        Ok(Some(self.run_after_hooks(ctx, &path, response).await))
    }

    async fn run_middleware(&self, ctx: &mut RequestContext, path: &str) -> Result<Flow, ExecutionError> {
        ctx.set_phase(Phase::Middleware);

        for entry in self.inner.registry.middleware_for_route(path) {
            let name = entry.name();
            tracing::trace!(middleware = name, "Running middleware");

            let flow = self
                .guard(entry.middleware().process(ctx))
                .await
                .map_err(|failure| {
                    failure.escalate(name, |source| ExecutionError::Middleware {
                        name: name.to_string(),
                        source,
                    })
                })?;

            if flow == Flow::Stop {
                tracing::debug!(middleware = name, "Middleware stopped the request");
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }

    async fn run_before_hooks(&self, ctx: &mut RequestContext, path: &str) -> Result<Flow, ExecutionError> {
        ctx.set_phase(Phase::BeforeRequest);

        for entry in self.inner.registry.plugins_for_route(path) {
            let name = entry.name();
            ctx.enter_plugin(name, entry.options());
            let Some(hook) = entry.plugin().as_before_request() else {
                ctx.leave_plugin();
                continue;
            };

            tracing::trace!(plugin = name, "Running before_request hook");
            let result = self.guard(hook.before_request(ctx)).await;
            ctx.leave_plugin();

            let flow = result.map_err(|failure| {
                failure.escalate(name, |source| ExecutionError::BeforeRequest {
                    plugin: name.to_string(),
                    source,
                })
            })?;

            if flow == Flow::Stop {
                tracing::debug!(plugin = name, "Plugin stopped the request");
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }

    /// Threads the response through after-hooks.
    ///
    /// The first failing hook ends the phase; the last successfully computed
    /// response is returned.
    async fn run_after_hooks(&self, ctx: &mut RequestContext, path: &str, mut response: Response) -> Response {
        ctx.set_phase(Phase::AfterRequest);

        for entry in self.inner.registry.plugins_for_route(path) {
            let Some(hook) = entry.plugin().as_after_request() else {
                continue;
            };
            let name = entry.name();
            ctx.enter_plugin(name, entry.options());

            tracing::trace!(plugin = name, "Running after_request hook");
            let result = self.guard(hook.after_request(ctx, &response)).await;
            ctx.leave_plugin();

            match result {
                Ok(Some(replacement)) => response = replacement,
                Ok(None) => {}
                Err(failure) => {
                    record_hook_failure(Phase::AfterRequest.name(), name);
                    tracing::warn!(
                        plugin = name,
                        error = %failure,
                        "after_request hook failed, keeping last response"
                    );
                    break;
                }
            }
        }
        response
    }

    /// Runs every applicable on-error hook, then falls back to a `500`.
    async fn run_error_phase(&self, ctx: &mut RequestContext, error: ExecutionError) -> Response {
        let failed_in = ctx.phase();
        record_hook_failure(failed_in.name(), error.origin());
        tracing::error!(
            phase = failed_in.name(),
            origin = error.origin(),
            error = %error,
            "Request failed"
        );

        ctx.set_phase(Phase::Error);
        for entry in self.inner.registry.plugins_for_route(ctx.path()) {
            let Some(hook) = entry.plugin().as_on_error() else {
                continue;
            };
            let name = entry.name();
            ctx.enter_plugin(name, entry.options());

            tracing::trace!(plugin = name, "Running on_error hook");
            let result = self.guard(hook.on_error(ctx, &error)).await;
            ctx.leave_plugin();

            if let Err(failure) = result {
                record_hook_failure(Phase::Error.name(), name);
                tracing::error!(plugin = name, error = %failure, "on_error hook failed");
            }
        }

        ctx.take_response().unwrap_or_else(|| {
            let message = if self.inner.expose_error_messages {
                error.message()
            } else {
                GENERIC_ERROR_MESSAGE.to_string()
            };
            Response::internal_error(&message)
        })
    }

    fn stopped_response(ctx: &mut RequestContext) -> Response {
        ctx.take_response().unwrap_or_else(|| {
            tracing::warn!(
                phase = ctx.phase().name(),
                "Request stopped without a response, answering 204"
            );
            Response::empty(StatusCode::NO_CONTENT)
        })
    }

    /// Awaits a hook, applying the configured timeout.
    async fn guard<T, F>(&self, hook: F) -> Result<T, HookFailure>
    where
        F: Future<Output = HookResult<T>>,
    {
        let result = match self.inner.hook_timeout {
            Some(limit) => tokio::time::timeout(limit, hook)
                .await
                .map_err(|_| HookFailure::TimedOut(limit))?,
            None => hook.await,
        };
        result.map_err(HookFailure::Failed)
    }
}
