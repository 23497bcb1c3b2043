//! Common types used throughout the pipeline.
//!
//! This module defines the HTTP request and response types that flow through
//! middleware, plugin hooks and handlers, plus helpers for the JSON failure
//! envelope.

use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The HTTP request type used in the pipeline.
///
/// This is a standard `http::Request` with a `Full<Bytes>` body.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type used in the pipeline.
///
/// This is a standard `http::Response` with a `Full<Bytes>` body.
pub type Response = http::Response<Full<Bytes>>;

/// JSON body of every failure response emitted by the pipeline.
///
/// ```json
/// { "success": false, "error": "Internal server error", "message": "boom" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureBody {
    /// Always `false`.
    pub success: bool,
    /// Short, generic error title.
    pub error: String,
    /// Detail message.
    pub message: String,
}

impl FailureBody {
    /// Creates a failure body.
    #[must_use]
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            message: message.into(),
        }
    }
}

/// Extension trait for building pipeline responses.
pub trait ResponseExt {
    /// Creates a JSON response from any serializable value.
    fn json<T: Serialize>(status: StatusCode, value: &T) -> Response;

    /// Creates a failure envelope response.
    fn failure(status: StatusCode, error: &str, message: &str) -> Response;

    /// Creates the generic `500 Internal server error` response.
    fn internal_error(message: &str) -> Response;

    /// Creates an empty response with the given status.
    fn empty(status: StatusCode) -> Response;
}

impl ResponseExt for Response {
    fn json<T: Serialize>(status: StatusCode, value: &T) -> Response {
        let body = serde_json::to_vec(value).unwrap_or_else(|_| b"null".to_vec());

        http::Response::builder()
            .status(status)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))
            .expect("failed to build JSON response")
    }

    fn failure(status: StatusCode, error: &str, message: &str) -> Response {
        Self::json(status, &FailureBody::new(error, message))
    }

    fn internal_error(message: &str) -> Response {
        Self::failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            message,
        )
    }

    fn empty(status: StatusCode) -> Response {
        http::Response::builder()
            .status(status)
            .body(Full::new(Bytes::new()))
            .expect("failed to build empty response")
    }
}
