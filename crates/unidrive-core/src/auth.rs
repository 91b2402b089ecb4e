//! Credential boundary
//!
//! Token acquisition (interactive authorization, code exchange) lives
//! outside this system. Backends only need two things from it: a bearer
//! token to sign the next request with, and a way to obtain a fresh one
//! when the remote rejects the current token.
//!
//! Backends retry an authorization failure exactly once after `refresh`,
//! as a bounded loop - never more than two attempts per request.

use crate::error::StorageError;

/// Supplies bearer tokens on demand
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    /// Returns the token to sign the next request with
    async fn bearer(&self) -> Result<String, StorageError>;

    /// Obtains a fresh token after an authorization failure
    ///
    /// Called at most once per failed request. Implementations without a
    /// refresh path should return `AuthorizationFailure`.
    async fn refresh(&self) -> Result<String, StorageError>;
}

/// A fixed token with no refresh path
///
/// Useful for tests and for backends whose token is managed entirely out
/// of process.
pub struct StaticToken(String);

impl StaticToken {
    /// Wraps a fixed bearer token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait::async_trait]
impl TokenSource for StaticToken {
    async fn bearer(&self) -> Result<String, StorageError> {
        Ok(self.0.clone())
    }

    async fn refresh(&self) -> Result<String, StorageError> {
        Err(StorageError::AuthorizationFailure(
            "static token cannot be refreshed".to_string(),
        ))
    }
}
