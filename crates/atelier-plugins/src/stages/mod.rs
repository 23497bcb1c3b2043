//! Built-in middleware and plugins.
//!
//! - [`bearer_auth`] - Resolves `Authorization: Bearer` tokens into a user
//! - [`access_log`] - Logs every request with its status and duration
//!
//! Neither is registered automatically.

pub mod access_log;
pub mod bearer_auth;

pub use access_log::AccessLogPlugin;
pub use bearer_auth::{AuthMode, BearerAuthMiddleware};
