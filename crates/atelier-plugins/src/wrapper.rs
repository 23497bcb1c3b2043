//! Handler wrapping.
//!
//! [`Executor::wrap`] turns any [`Handler`] into a [`WrappedHandler`] that
//! runs the full plugin lifecycle around it. The wrapped handler is itself a
//! [`Handler`], so it can be used anywhere the original was.

use crate::executor::Executor;
use atelier_core::{BoxFuture, Request, Response, UserIdentity};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// An async request handler.
///
/// Implemented for every `Fn(Request) -> impl Future<Output = anyhow::Result<Response>>`.
pub trait Handler: Send + Sync + 'static {
    /// Handles a request.
    fn call(&self, request: Request) -> BoxFuture<'static, anyhow::Result<Response>>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Response>> + Send + 'static,
{
    fn call(&self, request: Request) -> BoxFuture<'static, anyhow::Result<Response>> {
        Box::pin(self(request))
    }
}

/// A handler with the plugin lifecycle around it.
///
/// Cloning is cheap; clones share the executor and the inner handler.
pub struct WrappedHandler<H> {
    executor: Executor,
    handler: Arc<H>,
}

impl<H: Handler> WrappedHandler<H> {
    pub(crate) fn new(executor: Executor, handler: H) -> Self {
        Self {
            executor,
            handler: Arc::new(handler),
        }
    }

    /// Handles an anonymous request. Never fails.
    pub async fn handle(&self, request: Request) -> Response {
        self.executor.execute(request, &*self.handler).await
    }

    /// Handles a request on behalf of an authenticated user.
    pub async fn handle_as(&self, request: Request, user: UserIdentity) -> Response {
        self.executor
            .execute_with_user(request, Some(user), &*self.handler)
            .await
    }

    /// Returns the executor driving this handler.
    #[must_use]
    pub fn executor(&self) -> &Executor {
        &self.executor
    }
}

impl<H> Clone for WrappedHandler<H> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<H> fmt::Debug for WrappedHandler<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrappedHandler")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

impl<H: Handler> Handler for WrappedHandler<H> {
    fn call(&self, request: Request) -> BoxFuture<'static, anyhow::Result<Response>> {
        let this = self.clone();
        Box::pin(async move { Ok(this.handle(request).await) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PluginConfig;
    use crate::plugin::{Flow, FnPlugin};
    use crate::registry::Registry;
    use atelier_core::ResponseExt;
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::Full;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request(path: &str) -> Request {
        http::Request::get(path).body(Full::new(Bytes::new())).unwrap()
    }

    #[tokio::test]
    async fn test_closure_is_a_handler() {
        let handler = |_request: Request| async { Ok(Response::empty(StatusCode::CREATED)) };
        let response = Handler::call(&handler, request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_wrapped_handler_runs_lifecycle() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let registry = Arc::new(Registry::new());
        registry
            .register_with(
                FnPlugin::builder("counter")
                    .before_request(move |_ctx| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Box::pin(async { Ok(Flow::Continue) })
                    })
                    .build(),
                PluginConfig::new().with_routes(["/api/*"]),
            )
            .await
            .unwrap();

        let wrapped = Executor::new(registry)
            .wrap(|_request: Request| async { Ok(Response::empty(StatusCode::OK)) });

        wrapped.handle(request("/api/pages")).await;
        wrapped.clone().handle(request("/api/users")).await;
        wrapped.handle(request("/health")).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_wrapped_handler_is_drop_in() {
        let executor = Executor::new(Arc::new(Registry::new()));
        let inner = executor.wrap(|_request: Request| async {
            Err::<Response, _>(anyhow::anyhow!("boom"))
        });

        // A wrapped handler never fails; failures become responses.
        let outer: Arc<dyn Handler> = Arc::new(inner);
        let response = outer.call(request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_handle_as_attaches_user() {
        let executor = Executor::new(Arc::new(Registry::new()));
        let wrapped = executor.wrap(|request: Request| async move {
            let status = if request.extensions().get::<UserIdentity>().is_some() {
                StatusCode::OK
            } else {
                StatusCode::UNAUTHORIZED
            };
            Ok(Response::empty(status))
        });

        let anonymous = wrapped.handle(request("/")).await;
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

        let authenticated = wrapped
            .handle_as(request("/"), UserIdentity::new("u1"))
            .await;
        assert_eq!(authenticated.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_concurrent_requests() {
        let wrapped = Executor::new(Arc::new(Registry::new()))
            .wrap(|_request: Request| async { Ok(Response::empty(StatusCode::OK)) });

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let wrapped = wrapped.clone();
                tokio::spawn(async move { wrapped.handle(request(&format!("/items/{i}"))).await })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().status(), StatusCode::OK);
        }
    }
}
