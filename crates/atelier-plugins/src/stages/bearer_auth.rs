//! Bearer token authentication middleware.
//!
//! Reads `Authorization: Bearer <token>`, resolves the token through an
//! [`Authenticator`] and attaches the resulting [`UserIdentity`] to the
//! request context.
//!
//! ## Modes
//!
//! | Mode | Missing or rejected token |
//! |------|---------------------------|
//! | [`AuthMode::Required`] | Stops with `401` `{success: false, error: "Unauthorized", message}` |
//! | [`AuthMode::Optional`] | Continues anonymously |
//!
//! A failing authentication backend is an error in both modes.

use crate::context::RequestContext;
use crate::middleware::Middleware;
use crate::plugin::{Flow, HookResult};
use atelier_core::{AuthError, Authenticator, BoxFuture, Response, ResponseExt};
use http::header::AUTHORIZATION;
use http::StatusCode;
use std::fmt;
use std::sync::Arc;

const BEARER_SCHEME: &str = "bearer";

/// What to do with requests that carry no valid token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// Reject them with `401`.
    #[default]
    Required,
    /// Let them through without a user.
    Optional,
}

/// Middleware attaching the authenticated user to the context.
///
/// # Example
///
/// ```
/// use atelier_core::{StaticTokenAuthenticator, UserIdentity};
/// use atelier_plugins::config::MiddlewareConfig;
/// use atelier_plugins::registry::Registry;
/// use atelier_plugins::stages::BearerAuthMiddleware;
///
/// let authenticator = StaticTokenAuthenticator::new()
///     .with_token("secret", UserIdentity::new("editor-1"));
///
/// let registry = Registry::new();
/// registry
///     .register_middleware(
///         BearerAuthMiddleware::required(authenticator),
///         MiddlewareConfig::new().with_priority(0).with_routes(["/api/*"]),
///     )
///     .unwrap();
/// ```
pub struct BearerAuthMiddleware {
    authenticator: Arc<dyn Authenticator>,
    mode: AuthMode,
}

impl BearerAuthMiddleware {
    /// Creates a middleware with an explicit mode.
    pub fn new(authenticator: impl Authenticator, mode: AuthMode) -> Self {
        Self {
            authenticator: Arc::new(authenticator),
            mode,
        }
    }

    /// Creates a middleware rejecting unauthenticated requests.
    pub fn required(authenticator: impl Authenticator) -> Self {
        Self::new(authenticator, AuthMode::Required)
    }

    /// Creates a middleware letting unauthenticated requests through.
    pub fn optional(authenticator: impl Authenticator) -> Self {
        Self::new(authenticator, AuthMode::Optional)
    }

    /// Returns the mode.
    #[must_use]
    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    fn reject(&self, ctx: &mut RequestContext, message: &str) -> Flow {
        match self.mode {
            AuthMode::Required => {
                tracing::debug!(reason = message, "Rejecting unauthenticated request");
                ctx.respond(Response::failure(StatusCode::UNAUTHORIZED, "Unauthorized", message));
                Flow::Stop
            }
            AuthMode::Optional => Flow::Continue,
        }
    }
}

impl fmt::Debug for BearerAuthMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuthMiddleware")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

/// Extracts the token from an `Authorization` header value.
///
/// The scheme is matched case-insensitively (RFC 7235 §2.1).
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

impl Middleware for BearerAuthMiddleware {
    fn name(&self) -> &str {
        "bearer_auth"
    }

    fn process<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, HookResult<Flow>> {
        Box::pin(async move {
            let Some(token) = ctx.header(AUTHORIZATION.as_str()).and_then(bearer_token) else {
                return Ok(self.reject(ctx, "Missing bearer token"));
            };
            let token = token.to_string();

            match self.authenticator.authenticate(&token).await {
                Ok(user) => {
                    tracing::debug!(user = %user.log_id(), "Request authenticated");
                    ctx.set_user(user);
                    Ok(Flow::Continue)
                }
                Err(AuthError::Backend(source)) => Err(source.context("authentication backend failed")),
                Err(err) => Ok(self.reject(ctx, &err.to_string())),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::{StaticTokenAuthenticator, UserIdentity};
    use http_body_util::BodyExt;

    fn authenticator() -> StaticTokenAuthenticator {
        StaticTokenAuthenticator::new().with_token("good", UserIdentity::new("u1"))
    }

    struct BrokenBackend;

    impl Authenticator for BrokenBackend {
        fn authenticate<'a>(&'a self, _token: &'a str) -> BoxFuture<'a, Result<UserIdentity, AuthError>> {
            Box::pin(async { Err(AuthError::Backend(anyhow::anyhow!("connection refused"))) })
        }
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Bearer  abc "), Some("abc"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearerabc"), None);
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        assert_eq!(bearer_token("bearer abc"), Some("abc"));
        assert_eq!(bearer_token("BEARER abc"), Some("abc"));
        assert_eq!(bearer_token("  bEaReR \t abc  "), Some("abc"));
    }

    #[tokio::test]
    async fn test_lowercase_scheme_authenticates() {
        let middleware = BearerAuthMiddleware::required(authenticator());
        let mut ctx = RequestContext::builder()
            .header("authorization", "bearer   good")
            .build();

        assert_eq!(middleware.process(&mut ctx).await.unwrap(), Flow::Continue);
        assert_eq!(ctx.user().unwrap().id, "u1");
    }

    #[tokio::test]
    async fn test_valid_token_sets_user() {
        let middleware = BearerAuthMiddleware::required(authenticator());
        let mut ctx = RequestContext::builder()
            .header("authorization", "Bearer good")
            .build();

        let flow = middleware.process(&mut ctx).await.unwrap();
        assert_eq!(flow, Flow::Continue);
        assert_eq!(ctx.user().unwrap().id, "u1");
    }

    #[tokio::test]
    async fn test_required_rejects_missing_token() {
        let middleware = BearerAuthMiddleware::required(authenticator());
        let mut ctx = RequestContext::builder().build();

        let flow = middleware.process(&mut ctx).await.unwrap();
        assert_eq!(flow, Flow::Stop);

        let response = ctx.take_response().unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Unauthorized");
        assert_eq!(body["message"], "Missing bearer token");
    }

    #[tokio::test]
    async fn test_required_rejects_unknown_token() {
        let middleware = BearerAuthMiddleware::required(authenticator());
        let mut ctx = RequestContext::builder()
            .header("authorization", "Bearer forged")
            .build();

        assert_eq!(middleware.process(&mut ctx).await.unwrap(), Flow::Stop);
        assert!(!ctx.is_authenticated());
    }

    #[tokio::test]
    async fn test_optional_continues_anonymously() {
        let middleware = BearerAuthMiddleware::optional(authenticator());
        assert_eq!(middleware.mode(), AuthMode::Optional);

        let mut ctx = RequestContext::builder()
            .header("authorization", "Bearer forged")
            .build();

        assert_eq!(middleware.process(&mut ctx).await.unwrap(), Flow::Continue);
        assert!(!ctx.is_authenticated());
        assert!(!ctx.has_response());
    }

    #[tokio::test]
    async fn test_backend_failure_is_an_error() {
        let middleware = BearerAuthMiddleware::optional(BrokenBackend);
        let mut ctx = RequestContext::builder()
            .header("authorization", "Bearer any")
            .build();

        let err = middleware.process(&mut ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "authentication backend failed");
    }
}
