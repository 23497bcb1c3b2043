//! Request context creation.
//!
//! The [`ContextFactory`] resolves the request id for each inbound request
//! and builds the [`RequestContext`] shared by every hook of that request.
//!
//! ## Request id sources
//!
//! 1. A [`RequestId`] already in the request extensions, as placed there by
//!    an enclosing executor when wrapped handlers are nested
//! 2. The first recognised correlation header carrying an acceptable value
//!    (`x-request-id`, then `x-correlation-id`, by default)
//! 3. Otherwise a freshly generated UUID v7
//!
//! The resolved id is echoed back on the response through
//! [`ContextFactory::finish`], whatever the outcome of the request.

use crate::config::{parse_header, ConfigError, ExecutorConfig};
use crate::context::RequestContext;
use atelier_core::{Request, RequestId, Response, UserIdentity};
use http::{HeaderMap, HeaderName};

/// Default response header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Alternative inbound correlation header.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Builds per-request contexts.
#[derive(Debug, Clone)]
pub struct ContextFactory {
    request_id_headers: Vec<HeaderName>,
    response_header: HeaderName,
    trust_incoming: bool,
}

impl Default for ContextFactory {
    fn default() -> Self {
        Self {
            request_id_headers: vec![
                HeaderName::from_static(REQUEST_ID_HEADER),
                HeaderName::from_static(CORRELATION_ID_HEADER),
            ],
            response_header: HeaderName::from_static(REQUEST_ID_HEADER),
            trust_incoming: true,
        }
    }
}

impl ContextFactory {
    /// Creates a factory with the default headers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a factory from executor settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHeader`] for invalid header names.
    pub fn from_config(config: &ExecutorConfig) -> Result<Self, ConfigError> {
        let request_id_headers = config
            .request_id_headers
            .iter()
            .map(|name| parse_header("request_id_headers", name))
            .collect::<Result<_, _>>()?;
        Ok(Self {
            request_id_headers,
            response_header: parse_header("response_header", &config.response_header)?,
            trust_incoming: config.trust_incoming_request_id,
        })
    }

    /// Returns the response header the request id is written to.
    #[must_use]
    pub fn response_header(&self) -> &HeaderName {
        &self.response_header
    }

    /// Builds the context for `request`.
    ///
    /// An id or user attached by an enclosing executor is carried over, so
    /// nested wrapped handlers share one request id.
    #[must_use]
    pub fn create(&self, request: &Request, user: Option<UserIdentity>) -> RequestContext {
        let extensions = request.extensions();
        let request_id = extensions
            .get::<RequestId>()
            .cloned()
            .unwrap_or_else(|| self.resolve_request_id(request.headers()));
        let user = user.or_else(|| extensions.get::<UserIdentity>().cloned());
        RequestContext::new(
            request_id,
            request.method().clone(),
            request.uri().clone(),
            request.headers().clone(),
            user,
        )
    }

    /// Reuses an inbound correlation id when allowed, otherwise generates one.
    #[must_use]
    pub fn resolve_request_id(&self, headers: &HeaderMap) -> RequestId {
        if !self.trust_incoming {
            return RequestId::new();
        }

        self.request_id_headers
            .iter()
            .filter_map(|name| headers.get(name))
            .filter_map(|value| value.to_str().ok())
            .find_map(RequestId::parse)
            .unwrap_or_default()
    }

    /// Writes the request id onto the outgoing response.
    ///
    /// Any value already present under the header is replaced, so the header
    /// appears exactly once.
    #[must_use]
    pub fn finish(&self, ctx: &RequestContext, mut response: Response) -> Response {
        response
            .headers_mut()
            .insert(self.response_header.clone(), ctx.request_id().to_header_value());
        response
    }
}
