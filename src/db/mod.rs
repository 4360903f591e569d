//! Persistent queue store
//!
//! Durable storage for queued questions and the class catalog, backed by
//! SQLite. Questions are soft-resolved: resolution sets `resolved_at` and the
//! row stays in place as an audit trail.
//!
//! The resolution coordinator only depends on the [`QueueStore`] trait, so a
//! different backend (or a fake in tests) can be injected.

pub mod schema;
mod store;

pub use schema::{create_database, keys, set_admin_info, SCHEMA_VERSION};
pub use store::SqliteQueueStore;

use crate::error::StoreResult;
use crate::model::QueueEntry;
use chrono::{DateTime, Utc};

/// Result of a conditional resolve write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// This call set the timestamp
    Resolved(DateTime<Utc>),
    /// A timestamp was already present and was left untouched
    AlreadyResolved(DateTime<Utc>),
}

impl MarkOutcome {
    /// The timestamp now stored for the entry
    pub fn resolved_at(&self) -> DateTime<Utc> {
        match self {
            MarkOutcome::Resolved(at) | MarkOutcome::AlreadyResolved(at) => *at,
        }
    }

    /// Returns true if the entry had been resolved before this call
    pub fn was_already_resolved(&self) -> bool {
        matches!(self, MarkOutcome::AlreadyResolved(_))
    }
}

/// Store operations the resolution coordinator needs
#[async_trait::async_trait]
pub trait QueueStore: Send + Sync {
    /// Look up the entry for a student
    async fn find_by_student_id(&self, student_id: &str) -> StoreResult<Option<QueueEntry>>;

    /// Set `resolved_at` if it is not set yet.
    ///
    /// Safe to call any number of times; an existing timestamp is never
    /// overwritten.
    async fn mark_resolved(&self, student_id: &str, at: DateTime<Utc>) -> StoreResult<MarkOutcome>;
}
