//! Crate-wide error type.
//!
//! Every fallible operation in the service and store layers returns [`AppError`].
//! Version conflicts raised by the store's conditional commit never appear here:
//! they are consumed by [`crate::application::updater::OptimisticUpdater`].

use serde_json::{Value, json};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Input or transformation rejected. Terminal, never retried.
    #[error("{message}")]
    Validation { message: String, details: Value },
    /// Alias or store key does not exist.
    #[error("{message}")]
    NotFound { message: String, details: Value },
    /// Alias already exists on create.
    #[error("{message}")]
    Conflict { message: String, details: Value },
    /// Deadline passed before the operation could commit.
    #[error("{message}")]
    Canceled { message: String, details: Value },
    /// Transport or backend failure. The caller may retry the whole operation.
    #[error("{message}")]
    Unavailable { message: String, details: Value },
    #[error("{message}")]
    Internal { message: String, details: Value },
}

impl AppError {
    pub fn bad_request(message: impl Into<String>, details: Value) -> Self {
        Self::Validation {
            message: message.into(),
            details,
        }
    }
    pub fn not_found(message: impl Into<String>, details: Value) -> Self {
        Self::NotFound {
            message: message.into(),
            details,
        }
    }
    pub fn conflict(message: impl Into<String>, details: Value) -> Self {
        Self::Conflict {
            message: message.into(),
            details,
        }
    }
    pub fn canceled(message: impl Into<String>, details: Value) -> Self {
        Self::Canceled {
            message: message.into(),
            details,
        }
    }
    pub fn unavailable(message: impl Into<String>, details: Value) -> Self {
        Self::Unavailable {
            message: message.into(),
            details,
        }
    }
    pub fn internal(message: impl Into<String>, details: Value) -> Self {
        Self::Internal {
            message: message.into(),
            details,
        }
    }

    /// Stable machine-readable code for the error category.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "validation_error",
            AppError::NotFound { .. } => "not_found",
            AppError::Conflict { .. } => "conflict",
            AppError::Canceled { .. } => "canceled",
            AppError::Unavailable { .. } => "backend_unavailable",
            AppError::Internal { .. } => "internal_error",
        }
    }

    pub fn details(&self) -> &Value {
        match self {
            AppError::Validation { details, .. }
            | AppError::NotFound { details, .. }
            | AppError::Conflict { details, .. }
            | AppError::Canceled { details, .. }
            | AppError::Unavailable { details, .. }
            | AppError::Internal { details, .. } => details,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound { .. })
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, AppError::Canceled { .. })
    }
}

/// Maps a Redis client error onto the crate taxonomy.
///
/// Connection, I/O and timeout failures become [`AppError::Unavailable`];
/// anything else (script errors, type mismatches) is [`AppError::Internal`].
pub fn map_redis_error(e: redis::RedisError) -> AppError {
    if e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal()
    {
        return AppError::unavailable(
            "Store unavailable",
            json!({ "reason": e.to_string() }),
        );
    }

    AppError::internal("Store error", json!({ "reason": e.to_string() }))
}

impl From<redis::RedisError> for AppError {
    fn from(e: redis::RedisError) -> Self {
        map_redis_error(e)
    }
}
