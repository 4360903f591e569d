//! In-memory collaborators with fault injection, shared by the integration
//! tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tutorq_admin::cache::LiveQueueCache;
use tutorq_admin::db::{MarkOutcome, QueueStore, SqliteQueueStore};
use tutorq_admin::error::{CacheError, CacheResult, NotifyError, NotifyResult, StoreError, StoreResult};
use tutorq_admin::model::{NotificationEvent, QueueEntry, QueueSnapshot};
use tutorq_admin::notify::Notifier;
use tutorq_admin::resolve::{ResolveCoordinator, StepTimeouts};

/// Live queue cache held in memory
#[derive(Default)]
pub struct FakeCache {
    snapshot: Mutex<QueueSnapshot>,
    pub fail: AtomicBool,
    delay: Mutex<Option<Duration>>,
    pub removal_calls: AtomicUsize,
}

impl FakeCache {
    pub fn with_students(ids: &[&str]) -> Self {
        let queue = ids.iter().map(|id| json!({ "id": id, "name": "student" })).collect();
        let cache = Self::default();
        *cache.snapshot.lock() = QueueSnapshot {
            queue,
            ..Default::default()
        };
        cache
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn listed(&self) -> Vec<String> {
        self.snapshot
            .lock()
            .student_ids()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn calls(&self) -> usize {
        self.removal_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiveQueueCache for FakeCache {
    async fn remove_if_present(&self, student_id: &str) -> CacheResult<bool> {
        self.removal_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(CacheError::Redis("injected cache failure".into()));
        }
        Ok(self.snapshot.lock().remove_student(student_id) > 0)
    }

    async fn snapshot(&self) -> CacheResult<QueueSnapshot> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CacheError::Redis("injected cache failure".into()));
        }
        Ok(self.snapshot.lock().clone())
    }
}

/// Notifier that records every published event
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotificationEvent>>,
    pub fail: AtomicBool,
    delay: Mutex<Option<Duration>>,
    pub publish_calls: AtomicUsize,
}

impl RecordingNotifier {
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.publish_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, event: &NotificationEvent) -> NotifyResult<()> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::PublishFailed {
                channel: "tutorq:events".into(),
                reason: "injected broker outage".into(),
            });
        }
        self.events.lock().push(event.clone());
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "tutorq:events"
    }
}

/// SQLite store wrapper that can fail or stall the durable write
pub struct FlakyStore {
    inner: SqliteQueueStore,
    pub fail_lookup: AtomicBool,
    pub fail_mark: AtomicBool,
    /// Run the delayed write on its own task so it outlives a timed-out call
    pub detach_mark: AtomicBool,
    mark_delay: Mutex<Option<Duration>>,
    pub mark_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: SqliteQueueStore) -> Self {
        Self {
            inner,
            fail_lookup: AtomicBool::new(false),
            fail_mark: AtomicBool::new(false),
            detach_mark: AtomicBool::new(false),
            mark_delay: Mutex::new(None),
            mark_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_mark_delay(&self, delay: Duration) {
        *self.mark_delay.lock() = Some(delay);
    }
}

#[async_trait]
impl QueueStore for FlakyStore {
    async fn find_by_student_id(&self, student_id: &str) -> StoreResult<Option<QueueEntry>> {
        if self.fail_lookup.load(Ordering::SeqCst) {
            return Err(StoreError::TaskFailed("injected lookup failure".into()));
        }
        self.inner.find_by_student_id(student_id).await
    }

    async fn mark_resolved(&self, student_id: &str, at: DateTime<Utc>) -> StoreResult<MarkOutcome> {
        self.mark_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.mark_delay.lock();
        if self.detach_mark.load(Ordering::SeqCst) {
            let inner = self.inner.clone();
            let student_id = student_id.to_string();
            let write = tokio::spawn(async move {
                tokio::time::sleep(delay.unwrap_or_default()).await;
                inner.mark_resolved(&student_id, at).await
            });
            return write
                .await
                .map_err(|e| StoreError::TaskFailed(e.to_string()))?;
        }

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_mark.load(Ordering::SeqCst) {
            return Err(StoreError::TaskFailed("injected write failure".into()));
        }
        self.inner.mark_resolved(student_id, at).await
    }
}

/// A pending question created a few minutes ago
pub fn pending_question(student_id: &str) -> QueueEntry {
    let mut entry = QueueEntry::pending(student_id, Utc::now() - ChronoDuration::minutes(5));
    entry.name = format!("Student {student_id}");
    entry.class_number = "INFO 441".into();
    entry.topic = "ownership".into();
    entry.problem = "borrow checker rejects my loop".into();
    entry
}

/// Store seeded with pending questions for `ids`
pub async fn seeded_store(ids: &[&str]) -> SqliteQueueStore {
    let store = SqliteQueueStore::open_in_memory().unwrap();
    for id in ids {
        store.enqueue(pending_question(id)).await.unwrap();
    }
    store
}

/// Fully wired coordinator over in-memory collaborators
pub struct Harness {
    pub store: SqliteQueueStore,
    pub flaky: Arc<FlakyStore>,
    pub cache: Arc<FakeCache>,
    pub notifier: Arc<RecordingNotifier>,
    pub coordinator: ResolveCoordinator,
}

impl Harness {
    pub async fn new(ids: &[&str]) -> Self {
        Self::with_timeouts(ids, StepTimeouts::default()).await
    }

    pub async fn with_timeouts(ids: &[&str], timeouts: StepTimeouts) -> Self {
        let store = seeded_store(ids).await;
        let flaky = Arc::new(FlakyStore::new(store.clone()));
        let cache = Arc::new(FakeCache::with_students(ids));
        let notifier = Arc::new(RecordingNotifier::default());
        let coordinator = ResolveCoordinator::new(
            flaky.clone(),
            cache.clone(),
            notifier.clone(),
            timeouts,
        );
        Self {
            store,
            flaky,
            cache,
            notifier,
            coordinator,
        }
    }

    /// `resolved_at` as currently stored
    pub async fn stored_resolved_at(&self, student_id: &str) -> Option<DateTime<Utc>> {
        self.store
            .find_by_student_id(student_id)
            .await
            .unwrap()
            .and_then(|entry| entry.resolved_at)
    }
}
