//! Drive and authorization error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::retry::IsKnownTransient;

/// Errors that can occur talking to the storage backend.
#[derive(Error, Debug)]
pub enum DriveError {
    /// Transport-level failure (DNS, TLS, timeout, reset).
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("Drive API returned {status} during {operation}: {body}")]
    Api {
        operation: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },

    /// A response body did not have the expected shape.
    #[error("Failed to parse {operation} response: {reason}")]
    Parse {
        operation: &'static str,
        reason: String,
    },

    /// Failed to read the client secrets file.
    #[error("Failed to read client secrets '{path}': {source}")]
    ClientSecretsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The client secrets file had an unexpected shape.
    #[error("Invalid client secrets: {0}")]
    ClientSecretsFormat(String),

    /// OAuth2 flow failure (device flow, refresh, missing authorization).
    #[error("Authorization failed: {0}")]
    Auth(String),

    /// Token persistence failure.
    #[error("Token store error: {0}")]
    TokenStore(String),
}

impl From<crate::db::DatabaseError> for DriveError {
    fn from(err: crate::db::DatabaseError) -> Self {
        DriveError::TokenStore(err.to_string())
    }
}

impl IsKnownTransient for DriveError {
    fn is_known_transient(&self) -> bool {
        match self {
            DriveError::Transport(e) => e.is_known_transient(),
            DriveError::Api { status, .. } => status.is_known_transient(),
            _ => false,
        }
    }
}

/// Result type for Drive operations.
pub type Result<T> = std::result::Result<T, DriveError>;
