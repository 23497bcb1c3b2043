//! Access log plugin.
//!
//! Emits one log line per request with method, path, status and duration,
//! and one per failure. The level is read from the plugin options:
//!
//! ```toml
//! [options]
//! level = "debug"   # or "info", the default
//! ```

use crate::context::RequestContext;
use crate::plugin::{AfterRequest, BeforeRequest, Flow, HookResult, OnError, Plugin};
use atelier_core::{BoxFuture, ExecutionError, Response};
use std::time::{Duration, Instant};

/// Name the plugin registers under.
pub const ACCESS_LOG_PLUGIN: &str = "access_log";

/// When the access log first saw the request.
#[derive(Debug, Clone, Copy)]
struct AccessLogStart(Instant);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Info,
    Debug,
}

impl Level {
    fn from_context(ctx: &RequestContext) -> Self {
        match ctx
            .options()
            .and_then(|options| options.get("level"))
            .and_then(serde_json::Value::as_str)
        {
            Some("debug") => Self::Debug,
            _ => Self::Info,
        }
    }
}

/// Logs every request passing through the pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessLogPlugin;

impl AccessLogPlugin {
    /// Creates the plugin.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn duration(ctx: &RequestContext) -> Duration {
        ctx.get::<AccessLogStart>()
            .map_or_else(|| ctx.elapsed(), |start| start.0.elapsed())
    }
}

impl Plugin for AccessLogPlugin {
    fn name(&self) -> &str {
        ACCESS_LOG_PLUGIN
    }

    fn version(&self) -> Option<&str> {
        Some(env!("CARGO_PKG_VERSION"))
    }

    fn description(&self) -> Option<&str> {
        Some("Logs method, path, status and duration of every request")
    }

    fn as_before_request(&self) -> Option<&dyn BeforeRequest> {
        Some(self)
    }

    fn as_after_request(&self) -> Option<&dyn AfterRequest> {
        Some(self)
    }

    fn as_on_error(&self) -> Option<&dyn OnError> {
        Some(self)
    }
}

impl BeforeRequest for AccessLogPlugin {
    fn before_request<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, HookResult<Flow>> {
        Box::pin(async move {
            ctx.insert(AccessLogStart(Instant::now()));
            Ok(Flow::Continue)
        })
    }
}

impl AfterRequest for AccessLogPlugin {
    fn after_request<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        response: &'a Response,
    ) -> BoxFuture<'a, HookResult<Option<Response>>> {
        Box::pin(async move {
            let duration_ms = Self::duration(ctx).as_secs_f64() * 1000.0;
            let status = response.status().as_u16();
            let user = ctx.user().map(|user| user.log_id());

            match Level::from_context(ctx) {
                Level::Info => tracing::info!(
                    request_id = %ctx.request_id(),
                    http.method = %ctx.method(),
                    http.path = ctx.path(),
                    http.status_code = status,
                    user = user.as_deref(),
                    duration_ms,
                    "Request completed"
                ),
                Level::Debug => tracing::debug!(
                    request_id = %ctx.request_id(),
                    http.method = %ctx.method(),
                    http.path = ctx.path(),
                    http.status_code = status,
                    user = user.as_deref(),
                    duration_ms,
                    "Request completed"
                ),
            }
            Ok(None)
        })
    }
}

impl OnError for AccessLogPlugin {
    fn on_error<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        error: &'a ExecutionError,
    ) -> BoxFuture<'a, HookResult> {
        Box::pin(async move {
            let duration_ms = Self::duration(ctx).as_secs_f64() * 1000.0;
            tracing::warn!(
                request_id = %ctx.request_id(),
                http.method = %ctx.method(),
                http.path = ctx.path(),
                origin = error.origin(),
                error = %error,
                duration_ms,
                "Request failed"
            );
            Ok(())
        })
    }
}
