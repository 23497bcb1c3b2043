//! Middleware trait.
//!
//! Middleware is the simpler extension point. A middleware is a single named
//! function run before every plugin hook, in priority order. It either lets
//! the request through with [`Flow::Continue`] or ends it with [`Flow::Stop`],
//! usually after answering with [`RequestContext::respond`].
//!
//! # Example
//!
//! ```
//! use atelier_core::{Response, ResponseExt};
//! use atelier_plugins::middleware::FnMiddleware;
//! use atelier_plugins::plugin::Flow;
//! use http::StatusCode;
//!
//! let maintenance = FnMiddleware::new("maintenance", |ctx| {
//!     Box::pin(async move {
//!         if ctx.header("x-maintenance").is_some() {
//!             ctx.respond(Response::empty(StatusCode::SERVICE_UNAVAILABLE));
//!             return Ok(Flow::Stop);
//!         }
//!         Ok(Flow::Continue)
//!     })
//! });
//! ```

use crate::context::RequestContext;
use crate::plugin::{Flow, HookResult};
use atelier_core::BoxFuture;
use std::fmt;

/// A named request interceptor.
///
/// # Invariants
///
/// - Returning [`Flow::Stop`] skips every later middleware, all plugin
///   hooks and the handler.
/// - Returning an error moves the request into the error phase.
pub trait Middleware: Send + Sync + 'static {
    /// Returns the unique name of this middleware.
    fn name(&self) -> &str;

    /// Processes the request context.
    fn process<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, HookResult<Flow>>;
}

/// A middleware created from a closure.
pub struct FnMiddleware<F> {
    name: String,
    func: F,
}

impl<F> FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, HookResult<Flow>>
        + Send
        + Sync
        + 'static,
{
    /// Creates a new function-based middleware.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> fmt::Debug for FnMiddleware<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMiddleware")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut RequestContext) -> BoxFuture<'a, HookResult<Flow>>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn process<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, HookResult<Flow>> {
        (self.func)(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::{Response, ResponseExt};
    use http::StatusCode;

    struct Tagged(&'static str);

    struct TagMiddleware;

    impl Middleware for TagMiddleware {
        fn name(&self) -> &str {
            "tag"
        }

        fn process<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, HookResult<Flow>> {
            Box::pin(async move {
                ctx.insert(Tagged("seen"));
                Ok(Flow::Continue)
            })
        }
    }

    #[tokio::test]
    async fn test_trait_impl() {
        let mut ctx = RequestContext::builder().build();
        let flow = TagMiddleware.process(&mut ctx).await.unwrap();

        assert_eq!(flow, Flow::Continue);
        assert_eq!(ctx.get::<Tagged>().map(|t| t.0), Some("seen"));
    }

    #[tokio::test]
    async fn test_fn_middleware_can_stop() {
        let middleware = FnMiddleware::new("gate", |ctx| {
            Box::pin(async move {
                ctx.respond(Response::empty(StatusCode::FORBIDDEN));
                Ok(Flow::Stop)
            })
        });
        assert_eq!(middleware.name(), "gate");

        let mut ctx = RequestContext::builder().build();
        let flow = middleware.process(&mut ctx).await.unwrap();

        assert_eq!(flow, Flow::Stop);
        assert!(ctx.has_response());
    }

    #[tokio::test]
    async fn test_fn_middleware_error() {
        let middleware = FnMiddleware::new("broken", |_ctx| {
            Box::pin(async { Err(anyhow::anyhow!("nope")) })
        });

        let mut ctx = RequestContext::builder().build();
        let err = middleware.process(&mut ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "nope");
    }
}
