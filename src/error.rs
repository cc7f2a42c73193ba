//! Error types for dbshape.
//!
//! This module defines all error types using `thiserror`. Projection-layer
//! failures get their own variants; driver failures are carried unchanged in
//! [`DbError::Driver`] so callers can still tell storage errors apart from
//! configuration mistakes.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Schema mismatch on '{entity}': {message}")]
    SchemaMismatch { entity: String, message: String },

    #[error("Connection pool exhausted: no connection available after {waited_ms}ms (max_size: {max_size})")]
    PoolExhausted { waited_ms: u64, max_size: u32 },

    #[error("Connection pool is closed: {reason}")]
    PoolClosed { reason: String },

    #[error("Expected at most one row, got {count}")]
    MultipleResults { count: usize },

    #[error("Expected exactly one row, got none")]
    NoResult,

    #[error("Invalid page request: {message}")]
    InvalidPageRequest { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Failed to decode row into '{shape}': {message}")]
    Decode { shape: String, message: String },

    #[error("Timeout: {operation} exceeded {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error(transparent)]
    Driver(#[from] sqlx::Error),
}

impl DbError {
    /// Create a schema mismatch error for an entity.
    pub fn schema_mismatch(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            entity: entity.into(),
            message: message.into(),
        }
    }

    pub fn pool_exhausted(waited_ms: u64, max_size: u32) -> Self {
        Self::PoolExhausted {
            waited_ms,
            max_size,
        }
    }

    pub fn pool_closed(reason: impl Into<String>) -> Self {
        Self::PoolClosed {
            reason: reason.into(),
        }
    }

    pub fn multiple_results(count: usize) -> Self {
        Self::MultipleResults { count }
    }

    pub fn invalid_page_request(message: impl Into<String>) -> Self {
        Self::InvalidPageRequest {
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn decode(shape: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            shape: shape.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_ms,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::SchemaMismatch { .. } => {
                Some("Check that every field of the result shape exists on the entity")
            }
            Self::PoolExhausted { .. } => {
                Some("Retry with backoff, raise max_size, or release sessions sooner")
            }
            Self::PoolClosed { .. } => Some("Call Engine::connect() before opening sessions"),
            Self::InvalidPageRequest { .. } => Some("Use page >= 1 and size >= 1"),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    ///
    /// Only pool exhaustion qualifies; this layer never retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. })
    }

    /// Borrow the underlying driver error, if this is one.
    pub fn as_driver(&self) -> Option<&sqlx::Error> {
        match self {
            Self::Driver(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Whether a driver error means the connection itself can no longer be trusted.
pub(crate) fn is_connection_broken(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::PoolClosed
    )
}
