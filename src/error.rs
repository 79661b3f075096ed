//! Error types for cardsync
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad args, missing vault, bad config)
//! - 3: Blocked (sync refused after a failed fetch, watcher already running)
//! - 4: Operation failed (I/O, remote service, broken identity invariant)

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the cardsync CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const BLOCKED: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for cardsync operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Vault not found: {0}")]
    VaultNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(PathBuf),

    #[error("No access token configured (set CARDSYNC_TOKEN or remote.access_token)")]
    MissingToken,

    // Blocked (exit code 3)
    #[error("Sync refused: the last fetch failed, fetch again before applying changes")]
    SyncRefused,

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),

    // Operation failures (exit code 4)
    #[error("Known delta does not match snapshot: {filters} identified entries, {removed} removed")]
    IdentityMismatch { filters: usize, removed: usize },

    #[error("Remote service returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            // User errors
            Error::VaultNotFound(_)
            | Error::InvalidConfig(_)
            | Error::InvalidArgument(_)
            | Error::DocumentNotFound(_)
            | Error::MissingToken => exit_codes::USER_ERROR,

            // Blocked
            Error::SyncRefused | Error::LockFailed(_) => exit_codes::BLOCKED,

            // Operation failures
            Error::IdentityMismatch { .. }
            | Error::Remote { .. }
            | Error::Http(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::Watch(_)
            | Error::OperationFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Structured details for JSON error output
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::IdentityMismatch { filters, removed } => Some(serde_json::json!({
                "filters": filters,
                "removed": removed,
            })),
            Error::Remote { status, .. } => Some(serde_json::json!({ "status": status })),
            Error::DocumentNotFound(path) | Error::LockFailed(path) | Error::VaultNotFound(path) => {
                Some(serde_json::json!({ "path": path.to_string_lossy() }))
            }
            _ => None,
        }
    }
}

/// Result type alias for cardsync operations
pub type Result<T> = std::result::Result<T, Error>;
