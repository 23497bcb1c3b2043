//! # Atelier Core
//!
//! Core types shared by the Atelier plugin pipeline.
//!
//! This crate provides the vocabulary used by every other Atelier crate:
//!
//! - [`RequestId`] - Per-request correlation identifier (inbound or UUID v7)
//! - [`UserIdentity`] - The authenticated user attached to a request
//! - [`Authenticator`] - Bearer token to user identity resolution
//! - [`RegistryError`] / [`ExecutionError`] - The pipeline error taxonomy
//! - [`Request`] / [`Response`] - HTTP types flowing through the pipeline

#![doc(html_root_url = "https://docs.rs/atelier-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod identity;
mod request_id;
pub mod types;

pub use error::{ExecutionError, RegistryError, RegistryErrorKind};
pub use identity::{AuthError, Authenticator, StaticTokenAuthenticator, UserIdentity};
pub use request_id::RequestId;
pub use types::{BoxFuture, FailureBody, Request, Response, ResponseExt};
