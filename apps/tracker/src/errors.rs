use thiserror::Error;

use crate::store::StoreError;

/// Application-level error type.
/// Every service operation returns `Result<T, AppError>`; callers decide whether
/// to retry by asking `is_retryable()`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Transient store error: {0}")]
    Transient(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Transient failures are safe to retry: every single-document write in this
    /// crate is either conditional or idempotent.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Transient(_) | AppError::Database(_))
    }

    /// Short machine-readable code, used as a structured log field.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Transient(_) => "TRANSIENT_STORE_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { collection, id } => {
                AppError::NotFound(format!("{collection}/{id} not found"))
            }
            StoreError::AlreadyExists { collection, id } => {
                AppError::Conflict(format!("{collection}/{id} already exists"))
            }
            StoreError::VersionMismatch {
                collection,
                id,
                expected,
                actual,
            } => AppError::Transient(format!(
                "{collection}/{id} changed concurrently \
                 (expected version {expected}, found {actual})"
            )),
            StoreError::LimitExceeded { limit, requested } => AppError::Validation(format!(
                "batch of {requested} exceeds the store limit of {limit}"
            )),
            StoreError::InvalidPath(path) => {
                AppError::Validation(format!("invalid field path '{path}'"))
            }
            StoreError::Codec(e) => AppError::Serialization(e),
            StoreError::Backend(e) => AppError::Database(e),
            StoreError::Unavailable(msg) => AppError::Transient(msg),
        }
    }
}
