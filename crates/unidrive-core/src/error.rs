//! Error taxonomy shared by all storage backends
//!
//! Every fallible operation in the provider contract returns [`StorageError`].
//! The taxonomy separates three concerns:
//!
//! - **Local validation** (`InvalidName`, `ReadOnly`, `NotADirectory`,
//!   `InvalidArgument`) - raised synchronously before any remote call is made.
//! - **Remote-reported conditions** (`AuthorizationFailure`, `Conflict`,
//!   `NotFound`, `ProviderUnavailable`, `InsufficientPermissions`) - mapped
//!   from backend HTTP status codes by each adapter.
//! - **Passthrough** (`Transport`) - any other transport or decoding failure,
//!   propagated unmodified for the caller to inspect.
//!
//! `ProviderUnavailable` (remote 5xx) is deliberately not retried here; the
//! caller decides whether and when to try again.

use thiserror::Error;

/// Errors produced by the virtual file system and its storage backends
#[derive(Debug, Error)]
pub enum StorageError {
    /// The provider has not been given credentials yet
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// The remote rejected our credentials (after the single refresh retry)
    #[error("authorization failed: {0}")]
    AuthorizationFailure(String),

    /// Name collision or remote-reported conflict
    #[error("conflict: {0}")]
    Conflict(String),

    /// The remote entity does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote service reported a server-side failure (5xx)
    #[error("provider unavailable ({status}): {message}")]
    ProviderUnavailable {
        /// HTTP status code reported by the backend
        status: u16,
        /// Server-supplied error message, if any
        message: String,
    },

    /// The granted authorization scope is narrower than required
    #[error("insufficient permissions: {0}")]
    InsufficientPermissions(String),

    /// The operation is not supported by this backend or node kind
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The operation was cancelled cooperatively before completion
    #[error("operation cancelled")]
    Cancelled,

    /// A name is empty, untrimmed-blank, or contains a reserved character
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// The target entry is read-only
    #[error("read-only entry: {0}")]
    ReadOnly(String),

    /// A directory was required but the entry is a file
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// A parameter combination is invalid (e.g. progress without a size hint)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Any other transport/decoding failure, propagated unmodified
    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

impl StorageError {
    /// Convenience constructor for transport errors from string context
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(anyhow::anyhow!(msg.into()))
    }
}
