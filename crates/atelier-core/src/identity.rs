//! Authenticated users and token resolution.
//!
//! Token verification itself lives outside the pipeline. The pipeline only
//! consumes it through the [`Authenticator`] trait: a function from a bearer
//! token to a [`UserIdentity`] or a failure.

use crate::types::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The authenticated user attached to a request.
///
/// # Example
///
/// ```
/// use atelier_core::UserIdentity;
///
/// let user = UserIdentity::new("u-1")
///     .with_email("editor@example.com")
///     .with_role("editor");
///
/// assert!(user.has_role("editor"));
/// assert_eq!(user.log_id(), "user:u-1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Stable user identifier.
    pub id: String,
    /// Email address, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Display name, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Roles granted to the user.
    #[serde(default)]
    pub roles: Vec<String>,
}

impl UserIdentity {
    /// Creates an identity with only an id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            name: None,
            roles: Vec::new(),
        }
    }

    /// Sets the email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds a role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Returns `true` if the user holds the given role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Returns an identifier suitable for logs. Never contains credentials.
    #[must_use]
    pub fn log_id(&self) -> String {
        format!("user:{}", self.id)
    }
}

/// Reasons a bearer token can be rejected.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token is malformed or unknown.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// The token was valid once but has expired.
    #[error("Token expired")]
    Expired,

    /// The verification backend failed.
    #[error("Authentication backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

/// Resolves bearer tokens into user identities.
///
/// Implementations typically verify a signed token or look up a session.
pub trait Authenticator: Send + Sync + 'static {
    /// Verifies `token` and returns the user it belongs to.
    fn authenticate<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<UserIdentity, AuthError>>;
}

/// An [`Authenticator`] backed by a fixed token table.
///
/// Useful for development setups and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, UserIdentity>,
}

impl StaticTokenAuthenticator {
    /// Creates an authenticator that accepts no tokens.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `token` as `user`.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, user: UserIdentity) -> Self {
        self.tokens.insert(token.into(), user);
        self
    }
}

impl Authenticator for StaticTokenAuthenticator {
    fn authenticate<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<UserIdentity, AuthError>> {
        Box::pin(async move {
            self.tokens
                .get(token)
                .cloned()
                .ok_or_else(|| AuthError::InvalidToken("unknown token".to_string()))
        })
    }
}
