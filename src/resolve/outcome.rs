//! Outcome types for queue resolution
//!
//! Every failure names the step it happened in, so a caller can tell
//! "nothing happened" from "resolved durably, derived views lagging".

use crate::error::{CacheError, NotifyError, StoreError};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Steps completed before a `Cache` failure
const APPLIED_STORE: &[&str] = &["store"];

/// Steps completed before a `Notify` failure
const APPLIED_STORE_CACHE: &[&str] = &["store", "cache"];

/// Successful resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub student_id: String,
    /// Timestamp stored in the persistent queue store
    pub resolved_at: DateTime<Utc>,
    /// The entry was resolved before this call; no store write happened
    pub already_resolved: bool,
    /// The cache actually listed the student
    pub cache_removed: bool,
}

/// Where a targeted retry starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeFrom {
    /// Remove from the cache, then publish
    CacheRemoval,
    /// Publish only
    Notify,
}

impl ResumeFrom {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResumeFrom::CacheRemoval => "cache_removal",
            ResumeFrom::Notify => "notify",
        }
    }
}

impl std::fmt::Display for ResumeFrom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-step time budgets. An elapsed budget counts as a failure of that step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTimeouts {
    pub store: Duration,
    pub cache: Duration,
    pub notify: Duration,
}

impl Default for StepTimeouts {
    fn default() -> Self {
        Self {
            store: Duration::from_secs(2),
            cache: Duration::from_secs(2),
            notify: Duration::from_secs(2),
        }
    }
}

/// Resolution failure, classified by the step that failed
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Empty or whitespace-only identifier; nothing was called
    #[error("Student id must not be empty")]
    InvalidStudentId,

    /// No queue entry; nothing was written
    #[error("Question not found for student '{student_id}'")]
    NotFound { student_id: String },

    /// Lookup or durable write failed.
    ///
    /// Reported with nothing applied, but after a `StoreError::Timeout` the
    /// abandoned blocking write may still commit. Resolving again is safe:
    /// the conditional write keeps whichever timestamp landed first.
    #[error("Store failure while resolving '{student_id}': {source}")]
    Store {
        student_id: String,
        source: StoreError,
    },

    /// Resolved durably, but the cache still lists the student
    #[error("Question for '{student_id}' resolved at {resolved_at} but cache removal failed: {source}")]
    Cache {
        student_id: String,
        resolved_at: DateTime<Utc>,
        source: CacheError,
    },

    /// Resolved durably and removed from the cache, but subscribers were not told
    #[error("Question for '{student_id}' resolved at {resolved_at} but notification failed: {source}")]
    Notify {
        student_id: String,
        resolved_at: DateTime<Utc>,
        source: NotifyError,
    },

    /// A targeted retry was requested for an entry that is still pending
    #[error("Question for student '{student_id}' is not resolved yet")]
    NotResolved { student_id: String },
}

impl ResolveError {
    /// Stable identifier for the failure class
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::InvalidStudentId => "invalid_student_id",
            ResolveError::NotFound { .. } => "not_found",
            ResolveError::Store { .. } => "store_error",
            ResolveError::Cache { .. } => "cache_error",
            ResolveError::Notify { .. } => "notify_error",
            ResolveError::NotResolved { .. } => "not_resolved",
        }
    }

    /// HTTP status reported for this failure
    pub fn status_code(&self) -> StatusCode {
        match self {
            ResolveError::InvalidStudentId => StatusCode::BAD_REQUEST,
            ResolveError::NotFound { .. } => StatusCode::NOT_FOUND,
            ResolveError::NotResolved { .. } => StatusCode::CONFLICT,
            ResolveError::Store { .. } | ResolveError::Cache { .. } | ResolveError::Notify { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Steps that had already taken effect when the failure happened
    pub fn applied_steps(&self) -> &'static [&'static str] {
        match self {
            ResolveError::Cache { .. } => APPLIED_STORE,
            ResolveError::Notify { .. } => APPLIED_STORE_CACHE,
            _ => &[],
        }
    }

    /// Returns true if the durable store already reflects the resolution
    pub fn is_partially_applied(&self) -> bool {
        !self.applied_steps().is_empty()
    }

    /// Where a targeted retry should start; `None` means retry the whole
    /// operation (or do not retry at all)
    pub fn resume_point(&self) -> Option<ResumeFrom> {
        match self {
            ResolveError::Cache { .. } => Some(ResumeFrom::CacheRemoval),
            ResolveError::Notify { .. } => Some(ResumeFrom::Notify),
            _ => None,
        }
    }

    /// Durable resolution timestamp, when one exists
    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        match self {
            ResolveError::Cache { resolved_at, .. } | ResolveError::Notify { resolved_at, .. } => {
                Some(*resolved_at)
            }
            _ => None,
        }
    }
}
