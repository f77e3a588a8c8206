//! Common error types for the pricing engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Common result type for pricing operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types shared by every pricedesk component
#[derive(Error, Debug)]
pub enum Error {
    /// Negative cost, negative price, malformed settings field
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Backend refresh did not complete
    #[error("Sync failed: {0}")]
    Sync(String),

    /// Durable override/settings map unreadable or unwritable
    #[error("Storage error: {0}")]
    Storage(String),

    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Category reported to consumers alongside the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    InvalidInput,
    SyncFailure,
    StorageFailure,
    Configuration,
    NotFound,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorCategory::InvalidInput => "invalid input",
            ErrorCategory::SyncFailure => "sync failure",
            ErrorCategory::StorageFailure => "storage failure",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::NotFound => "not found",
        };
        f.write_str(label)
    }
}

/// Terminal, user-visible failure: message plus category, no backtrace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFacingError {
    pub category: ErrorCategory,
    pub message: String,
    pub retryable: bool,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidInput(_) => ErrorCategory::InvalidInput,
            Error::Sync(_) => ErrorCategory::SyncFailure,
            Error::Storage(_) | Error::Database(_) | Error::Io(_) | Error::Serialization(_) => {
                ErrorCategory::StorageFailure
            }
            Error::Config(_) => ErrorCategory::Configuration,
            Error::NotFound(_) => ErrorCategory::NotFound,
        }
    }

    /// Sync and storage failures are transient; the caller may simply retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::SyncFailure | ErrorCategory::StorageFailure
        )
    }

    pub fn to_user_facing(&self) -> UserFacingError {
        UserFacingError {
            category: self.category(),
            message: self.to_string(),
            retryable: self.is_retryable(),
        }
    }
}
