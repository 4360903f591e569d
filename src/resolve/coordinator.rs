//! Queue resolution coordinator
//!
//! Sequences the three side effects of resolving a question:
//!
//! ```text
//!   lookup ──► durable resolve ──► cache removal ──► notify
//!     │              │                   │              │
//!  NotFound        Store               Cache         Notify
//!  Store
//! ```
//!
//! The order is fixed and the first failure stops the sequence. The store
//! is the source of truth, so once step two succeeds the resolution has
//! happened; later failures only mean derived views are lagging. Nothing is
//! retried or rolled back here.

use crate::cache::LiveQueueCache;
use crate::db::{MarkOutcome, QueueStore};
use crate::error::{CacheError, NotifyError, StoreError};
use crate::model::{NotificationEvent, QueueEntry};
use crate::notify::Notifier;
use crate::resolve::outcome::{Resolution, ResolveError, ResumeFrom, StepTimeouts};

use chrono::{DateTime, SubsecRound, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Coordinator for resolving queued questions
#[derive(Clone)]
pub struct ResolveCoordinator {
    store: Arc<dyn QueueStore>,
    cache: Arc<dyn LiveQueueCache>,
    notifier: Arc<dyn Notifier>,
    timeouts: StepTimeouts,
}

impl ResolveCoordinator {
    /// Create a coordinator over already-constructed collaborators
    pub fn new(
        store: Arc<dyn QueueStore>,
        cache: Arc<dyn LiveQueueCache>,
        notifier: Arc<dyn Notifier>,
        timeouts: StepTimeouts,
    ) -> Self {
        Self {
            store,
            cache,
            notifier,
            timeouts,
        }
    }

    /// Resolve the queued question of `student_id`.
    ///
    /// Resolving an already-resolved entry succeeds without touching the
    /// store, and still re-runs cache removal and notification. That makes
    /// the whole operation the retry path after a `Cache` or `Notify`
    /// failure.
    pub async fn resolve(&self, student_id: &str) -> Result<Resolution, ResolveError> {
        validate_student_id(student_id)?;

        let entry = self.lookup(student_id).await?;

        let outcome = match entry.resolved_at {
            Some(at) => {
                debug!(student_id, %at, "entry already resolved, skipping store write");
                MarkOutcome::AlreadyResolved(at)
            }
            None => self.durable_resolve(student_id).await?,
        };
        let resolved_at = outcome.resolved_at();

        let cache_removed = self.remove_from_cache(student_id, resolved_at).await?;
        self.publish(student_id, resolved_at).await?;

        info!(
            student_id,
            %resolved_at,
            already_resolved = outcome.was_already_resolved(),
            cache_removed,
            "question resolved"
        );

        Ok(Resolution {
            student_id: student_id.to_string(),
            resolved_at,
            already_resolved: outcome.was_already_resolved(),
            cache_removed,
        })
    }

    /// Re-run only the steps after a partial failure.
    ///
    /// The store is read but never written; the entry must already be
    /// resolved.
    pub async fn resume(&self, student_id: &str, from: ResumeFrom) -> Result<Resolution, ResolveError> {
        validate_student_id(student_id)?;

        let entry = self.lookup(student_id).await?;
        let resolved_at = entry.resolved_at.ok_or_else(|| ResolveError::NotResolved {
            student_id: student_id.to_string(),
        })?;

        debug!(student_id, from = %from, "resuming resolution");

        let cache_removed = match from {
            ResumeFrom::CacheRemoval => self.remove_from_cache(student_id, resolved_at).await?,
            ResumeFrom::Notify => false,
        };
        self.publish(student_id, resolved_at).await?;

        info!(student_id, from = %from, cache_removed, "resolution resumed");

        Ok(Resolution {
            student_id: student_id.to_string(),
            resolved_at,
            already_resolved: true,
            cache_removed,
        })
    }

    /// Step 1: existence check
    async fn lookup(&self, student_id: &str) -> Result<QueueEntry, ResolveError> {
        debug!(student_id, step = "lookup", "looking up queue entry");

        let found = within(
            self.timeouts.store,
            self.store.find_by_student_id(student_id),
            |after| StoreError::Timeout { after },
        )
        .await
        .map_err(|source| {
            error!(student_id, step = "lookup", error = %source, "store lookup failed");
            ResolveError::Store {
                student_id: student_id.to_string(),
                source,
            }
        })?;

        found.ok_or_else(|| {
            debug!(student_id, "no queue entry");
            ResolveError::NotFound {
                student_id: student_id.to_string(),
            }
        })
    }

    /// Step 2: conditional durable write
    async fn durable_resolve(&self, student_id: &str) -> Result<MarkOutcome, ResolveError> {
        debug!(student_id, step = "store", "marking entry resolved");

        // Millisecond precision, same as the timestamps other services write
        let now = Utc::now().trunc_subsecs(3);

        let result = within(
            self.timeouts.store,
            self.store.mark_resolved(student_id, now),
            |after| StoreError::Timeout { after },
        )
        .await;

        match result {
            Ok(outcome) => Ok(outcome),
            Err(StoreError::Missing { .. }) => Err(ResolveError::NotFound {
                student_id: student_id.to_string(),
            }),
            Err(source) => {
                error!(student_id, step = "store", error = %source, "durable resolve failed");
                Err(ResolveError::Store {
                    student_id: student_id.to_string(),
                    source,
                })
            }
        }
    }

    /// Step 3: drop the student from the live view
    async fn remove_from_cache(
        &self,
        student_id: &str,
        resolved_at: DateTime<Utc>,
    ) -> Result<bool, ResolveError> {
        debug!(student_id, step = "cache", "removing entry from live queue");

        within(
            self.timeouts.cache,
            self.cache.remove_if_present(student_id),
            |after| CacheError::Timeout { after },
        )
        .await
        .map_err(|source| {
            warn!(
                student_id,
                step = "cache",
                error = %source,
                "resolved durably but cache removal failed"
            );
            ResolveError::Cache {
                student_id: student_id.to_string(),
                resolved_at,
                source,
            }
        })
    }

    /// Step 4: tell subscribers
    async fn publish(&self, student_id: &str, resolved_at: DateTime<Utc>) -> Result<(), ResolveError> {
        debug!(
            student_id,
            step = "notify",
            channel = self.notifier.channel_name(),
            "publishing resolution event"
        );

        let event = NotificationEvent::resolved(student_id, resolved_at);

        within(
            self.timeouts.notify,
            self.notifier.publish(&event),
            |after| NotifyError::Timeout { after },
        )
        .await
        .map_err(|source| {
            warn!(
                student_id,
                step = "notify",
                channel = self.notifier.channel_name(),
                error = %source,
                "resolved but notification failed"
            );
            ResolveError::Notify {
                student_id: student_id.to_string(),
                resolved_at,
                source,
            }
        })
    }
}

fn validate_student_id(student_id: &str) -> Result<(), ResolveError> {
    if student_id.trim().is_empty() {
        return Err(ResolveError::InvalidStudentId);
    }
    Ok(())
}

/// Run `fut` within `budget`; an elapsed budget becomes `elapsed(budget)`
async fn within<T, E, F>(budget: Duration, fut: F, elapsed: impl FnOnce(Duration) -> E) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(elapsed(budget)),
    }
}
