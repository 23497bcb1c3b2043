//! Per-request context.
//!
//! The [`RequestContext`] is created once per request by the
//! [`ContextFactory`](crate::factory::ContextFactory) and threaded through
//! every middleware and plugin hook for that request. State written by one
//! hook is visible to every later hook in the same request.

use crate::config::PluginOptions;
use crate::executor::Phase;
use atelier_core::{RequestId, Response, UserIdentity};
use http::{HeaderMap, Method, Uri};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Mutable state shared by all hooks of a single request.
///
/// Besides request metadata, the context carries:
///
/// - a typed state store keyed by type, for data passed between hooks
/// - the optional authenticated user
/// - the options of the plugin whose hook is currently running
/// - a response slot used by hooks that answer the request themselves
///
/// # Example
///
/// ```
/// use atelier_plugins::context::RequestContext;
///
/// #[derive(Debug, PartialEq)]
/// struct Locale(&'static str);
///
/// let mut ctx = RequestContext::builder().path("/api/pages").build();
/// ctx.insert(Locale("fr"));
///
/// assert_eq!(ctx.get::<Locale>(), Some(&Locale("fr")));
/// assert_eq!(ctx.path(), "/api/pages");
/// ```
#[derive(Debug)]
pub struct RequestContext {
    request_id: RequestId,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    user: Option<UserIdentity>,
    phase: Phase,
    started_at: Instant,
    state: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    plugin_options: HashMap<String, Arc<PluginOptions>>,
    current_plugin: Option<String>,
    response: Option<Response>,
}

impl RequestContext {
    /// Creates a context from request metadata.
    #[must_use]
    pub fn new(
        request_id: RequestId,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        user: Option<UserIdentity>,
    ) -> Self {
        Self {
            request_id,
            method,
            uri,
            headers,
            user,
            phase: Phase::Middleware,
            started_at: Instant::now(),
            state: HashMap::new(),
            plugin_options: HashMap::new(),
            current_plugin: None,
            response: None,
        }
    }

    /// Returns a builder, mostly useful for exercising hooks in isolation.
    #[must_use]
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }

    /// Returns the request id.
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Returns the request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the request path, without query string.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Returns the request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the authenticated user, if any.
    #[must_use]
    pub fn user(&self) -> Option<&UserIdentity> {
        self.user.as_ref()
    }

    /// Attaches an authenticated user.
    pub fn set_user(&mut self, user: UserIdentity) {
        self.user = Some(user);
    }

    /// Returns `true` if a user is attached.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Returns the lifecycle phase currently executing.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    /// Returns when the context was created.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the time elapsed since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Stores a typed value, replacing any previous value of that type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.state
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    /// Returns a typed value.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.state
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Returns a typed value mutably.
    pub fn get_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.state
            .get_mut(&TypeId::of::<T>())
            .and_then(|v| v.downcast_mut())
    }

    /// Removes and returns a typed value.
    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.state
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    /// Returns `true` if a value of type `T` is stored.
    #[must_use]
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.state.contains_key(&TypeId::of::<T>())
    }

    /// Returns the options of the plugin whose hook is running.
    #[must_use]
    pub fn options(&self) -> Option<&PluginOptions> {
        self.current_plugin
            .as_deref()
            .and_then(|name| self.options_for(name))
    }

    /// Returns the options injected for the named plugin.
    #[must_use]
    pub fn options_for(&self, plugin: &str) -> Option<&PluginOptions> {
        self.plugin_options.get(plugin).map(|options| &**options)
    }

    /// Returns the name of the plugin whose hook is running.
    #[must_use]
    pub fn current_plugin(&self) -> Option<&str> {
        self.current_plugin.as_deref()
    }

    /// Marks `plugin` as running and injects its options.
    pub(crate) fn enter_plugin(&mut self, plugin: &str, options: Option<&Arc<PluginOptions>>) {
        if let Some(options) = options {
            self.plugin_options
                .insert(plugin.to_string(), Arc::clone(options));
        }
        self.current_plugin = Some(plugin.to_string());
    }

    pub(crate) fn leave_plugin(&mut self) {
        self.current_plugin = None;
    }

    /// Answers the request from a hook.
    ///
    /// A before-request hook or middleware that returns
    /// [`Flow::Stop`](crate::plugin::Flow::Stop) should call this first. Error
    /// hooks may call it to replace the generic `500` response.
    pub fn respond(&mut self, response: Response) {
        self.response = Some(response);
    }

    /// Returns `true` if a hook has already answered the request.
    #[must_use]
    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    pub(crate) fn take_response(&mut self) -> Option<Response> {
        self.response.take()
    }
}

/// Builder for [`RequestContext`].
#[derive(Debug, Default)]
pub struct RequestContextBuilder {
    request_id: Option<RequestId>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    user: Option<UserIdentity>,
}

impl RequestContextBuilder {
    /// Sets the request id. A fresh one is generated otherwise.
    #[must_use]
    pub fn request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Sets the method.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the path. Invalid paths fall back to `/`.
    #[must_use]
    pub fn path(mut self, path: &str) -> Self {
        self.uri = path.parse().unwrap_or_default();
        self
    }

    /// Adds a header. Invalid names or values are ignored.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::HeaderName::from_bytes(name.as_bytes()),
            http::HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Sets the authenticated user.
    #[must_use]
    pub fn user(mut self, user: UserIdentity) -> Self {
        self.user = Some(user);
        self
    }

    /// Builds the context.
    #[must_use]
    pub fn build(self) -> RequestContext {
        RequestContext::new(
            self.request_id.unwrap_or_default(),
            self.method,
            self.uri,
            self.headers,
            self.user,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::ResponseExt;
    use http::StatusCode;

    #[derive(Debug, Clone, PartialEq)]
    struct Counter(u32);

    #[test]
    fn test_typed_state() {
        let mut ctx = RequestContext::builder().build();

        assert!(!ctx.contains::<Counter>());
        assert!(ctx.insert(Counter(1)).is_none());
        assert_eq!(ctx.get::<Counter>(), Some(&Counter(1)));

        ctx.get_mut::<Counter>().unwrap().0 += 1;
        assert_eq!(ctx.insert(Counter(10)), Some(Counter(2)));

        assert_eq!(ctx.remove::<Counter>(), Some(Counter(10)));
        assert!(!ctx.contains::<Counter>());
    }

    #[test]
    fn test_request_metadata() {
        let ctx = RequestContext::builder()
            .method(Method::POST)
            .path("/api/pages?draft=true")
            .header("x-tenant", "acme")
            .request_id(RequestId::parse("req-1").unwrap())
            .build();

        assert_eq!(ctx.method(), Method::POST);
        assert_eq!(ctx.path(), "/api/pages");
        assert_eq!(ctx.uri().query(), Some("draft=true"));
        assert_eq!(ctx.header("x-tenant"), Some("acme"));
        assert_eq!(ctx.request_id().as_str(), "req-1");
        assert_eq!(ctx.phase(), Phase::Middleware);
    }

    #[test]
    fn test_user_slot() {
        let mut ctx = RequestContext::builder().build();
        assert!(!ctx.is_authenticated());

        ctx.set_user(UserIdentity::new("u1"));
        assert!(ctx.is_authenticated());
        assert_eq!(ctx.user().unwrap().id, "u1");
    }

    #[test]
    fn test_plugin_options_follow_current_plugin() {
        let mut ctx = RequestContext::builder().build();
        let mut options = PluginOptions::new();
        options.insert("limit".into(), 5.into());
        let options = Arc::new(options);

        assert!(ctx.options().is_none());

        ctx.enter_plugin("seo", Some(&options));
        assert_eq!(ctx.current_plugin(), Some("seo"));
        assert_eq!(ctx.options().unwrap()["limit"], 5);

        ctx.enter_plugin("audit", None);
        assert!(ctx.options().is_none());
        assert_eq!(ctx.options_for("seo").unwrap()["limit"], 5);

        ctx.leave_plugin();
        assert!(ctx.current_plugin().is_none());
    }

    #[test]
    fn test_response_slot() {
        let mut ctx = RequestContext::builder().build();
        assert!(!ctx.has_response());

        ctx.respond(Response::empty(StatusCode::ACCEPTED));
        assert!(ctx.has_response());

        let response = ctx.take_response().unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(!ctx.has_response());
    }

    #[test]
    fn test_elapsed_time() {
        let ctx = RequestContext::builder().build();
        std::thread::sleep(Duration::from_millis(5));
        assert!(ctx.elapsed() >= Duration::from_millis(5));
    }
}
