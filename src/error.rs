//! Error types for tutorq-admin
//!
//! This module defines the error hierarchy shared by every collaborator:
//! - Persistent queue store (SQLite) errors
//! - Live queue cache (Redis) errors
//! - Notification channel (Redis stream) errors
//! - Configuration and server errors
//! - HTTP API errors, rendered as JSON bodies
//!
//! The resolution-specific outcome type lives in `resolve::outcome`, because
//! it has to carry which steps were already applied.

use crate::resolve::ResolveError;
use axum::http::StatusCode;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for the admin service
#[derive(Error, Debug)]
pub enum AdminError {
    /// Persistent queue store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Live queue cache errors
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Notification channel errors
    #[error("Notify error: {0}")]
    Notify(#[from] NotifyError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors (listener bind, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistent queue store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to open or create the database file
    #[error("Failed to open database at '{path}': {reason}")]
    CreateFailed { path: PathBuf, reason: String },

    /// Record disappeared between lookup and update
    #[error("No queue entry for student '{student_id}'")]
    Missing { student_id: String },

    /// Record already exists
    #[error("{entity} '{id}' already exists")]
    Duplicate { entity: &'static str, id: String },

    /// Stored value could not be decoded
    #[error("Invalid stored value: {0}")]
    InvalidData(String),

    /// Blocking task could not complete
    #[error("Store task failed: {0}")]
    TaskFailed(String),

    /// Operation exceeded its budget
    #[error("Store operation timed out after {after:?}")]
    Timeout { after: Duration },
}

impl StoreError {
    /// Check if this error is a uniqueness violation reported by SQLite
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

/// Live queue cache errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// Redis connection failed
    #[error("Failed to connect to Redis at '{url}': {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// Redis command failed
    #[error("Redis error: {0}")]
    Redis(String),

    /// Snapshot under the cache key is not valid queue JSON
    #[error("Cached queue under '{key}' is corrupt: {reason}")]
    Corrupt { key: String, reason: String },

    /// Optimistic update kept losing to concurrent writers
    #[error("Cached queue under '{key}' changed concurrently {attempts} times")]
    Contended { key: String, attempts: u32 },

    /// Operation exceeded its budget
    #[error("Cache operation timed out after {after:?}")]
    Timeout { after: Duration },
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Redis(err.to_string())
    }
}

/// Notification channel errors
#[derive(Error, Debug)]
pub enum NotifyError {
    /// Redis connection failed
    #[error("Failed to connect to Redis at '{url}': {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// Publish command failed
    #[error("Publish to '{channel}' failed: {reason}")]
    PublishFailed { channel: String, reason: String },

    /// Event could not be encoded
    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation exceeded its budget
    #[error("Publish timed out after {after:?}")]
    Timeout { after: Duration },
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Step timeout out of range
    #[error("Invalid {step} timeout {millis}ms: must be between 1 and {max}ms")]
    InvalidTimeout {
        step: &'static str,
        millis: u64,
        max: u64,
    },

    /// Compare-and-set attempt count out of range
    #[error("Invalid cache CAS attempts {count}: must be between 1 and {max}")]
    InvalidCasAttempts { count: u32, max: u32 },

    /// Empty Redis key or stream name
    #[error("Missing required configuration: {0}")]
    MissingRequired(&'static str),

    /// Snapshot key and stream name point at the same Redis key
    #[error("Cache key and queue name must differ (both '{0}')")]
    KeyCollision(String),

    /// Host/port do not form a socket address
    #[error("Invalid bind address '{addr}': {reason}")]
    InvalidBindAddress { addr: String, reason: String },

    /// Database path error
    #[error("Invalid database path '{path}': {reason}")]
    InvalidDbPath { path: PathBuf, reason: String },
}

/// HTTP API errors
#[derive(Error, Debug)]
pub enum ApiError {
    /// `X-User` header missing, empty or `{}`
    #[error("Unauthorized")]
    Unauthorized,

    /// Body sent with a content type other than JSON
    #[error("Request body must be JSON")]
    UnsupportedMediaType,

    /// Body is not valid JSON or misses a required field
    #[error("{0}")]
    InvalidRequest(String),

    /// Class number not in the store
    #[error("Class not found: {0}")]
    ClassNotFound(String),

    /// Class number already taken
    #[error("Class already exists: {0}")]
    ClassExists(String),

    /// Queue resolution failure
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Any other store failure
    #[error("Database error: {0}")]
    Store(#[from] StoreError),

    /// Live queue read failure
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

impl ApiError {
    /// Stable identifier reported as `kind`
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "unauthorized",
            ApiError::UnsupportedMediaType => "unsupported_media_type",
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::ClassNotFound(_) => "class_not_found",
            ApiError::ClassExists(_) => "class_exists",
            ApiError::Resolve(e) => e.kind(),
            ApiError::Store(_) => "store_error",
            ApiError::Cache(_) => "cache_error",
        }
    }

    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::InvalidRequest(_) | ApiError::ClassExists(_) => StatusCode::BAD_REQUEST,
            ApiError::ClassNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Resolve(e) => e.status_code(),
            ApiError::Store(_) | ApiError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        use axum::Json;

        let status = self.status_code();
        let mut body = serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });

        // Store-side resolution failures say how far the operation got
        if let ApiError::Resolve(
            e @ (ResolveError::Store { .. } | ResolveError::Cache { .. } | ResolveError::Notify { .. }),
        ) = &self
        {
            body["applied"] = serde_json::json!(e.applied_steps());
            if let Some(at) = e.resolved_at() {
                body["resolved_at"] = serde_json::json!(at);
            }
            if let Some(from) = e.resume_point() {
                body["retry"] = serde_json::json!(from);
            }
        }

        (status, Json(body)).into_response()
    }
}

/// Result type alias for AdminError
pub type Result<T> = std::result::Result<T, AdminError>;

/// Result type alias for StoreError
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for CacheError
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Result type alias for NotifyError
pub type NotifyResult<T> = std::result::Result<T, NotifyError>;

/// Result type alias for ApiError
pub type ApiResult<T> = std::result::Result<T, ApiError>;
