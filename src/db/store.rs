//! SQLite-backed queue store
//!
//! A single connection guarded by a mutex. Every call runs on the blocking
//! thread pool so the async server threads never wait on SQLite I/O.

use crate::db::schema;
use crate::db::{MarkOutcome, QueueStore};
use crate::error::{StoreError, StoreResult};
use crate::model::{Class, QueueEntry};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const SELECT_QUESTION: &str = "SELECT student_id, name, class_number, topic, problem, created_at, resolved_at FROM questions";

/// Persistent queue store over SQLite
#[derive(Clone)]
pub struct SqliteQueueStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteQueueStore {
    /// Open (or create) the database at `path`
    pub fn open(path: &Path, busy_timeout: Duration) -> StoreResult<Self> {
        let conn = Connection::open(path).map_err(|e| StoreError::CreateFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        conn.busy_timeout(busy_timeout)?;
        schema::create_database(&conn)?;

        debug!(path = %path.display(), "opened queue store");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::create_database(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::TaskFailed(e.to_string()))?
    }

    /// Insert a new pending question
    pub async fn enqueue(&self, entry: QueueEntry) -> StoreResult<()> {
        self.with_conn(move |conn| {
            let result = conn.execute(
                "INSERT INTO questions (student_id, name, class_number, topic, problem, created_at, resolved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    entry.student_id,
                    entry.name,
                    entry.class_number,
                    entry.topic,
                    entry.problem,
                    entry.created_at,
                    entry.resolved_at,
                ],
            );
            match result {
                Ok(_) => Ok(()),
                Err(e) => {
                    let err = StoreError::from(e);
                    if err.is_constraint_violation() {
                        Err(StoreError::Duplicate {
                            entity: "Question",
                            id: entry.student_id,
                        })
                    } else {
                        Err(err)
                    }
                }
            }
        })
        .await
    }

    /// Unresolved questions, oldest first
    pub async fn active_entries(&self) -> StoreResult<Vec<QueueEntry>> {
        self.with_conn(|conn| {
            let sql = format!("{SELECT_QUESTION} WHERE resolved_at IS NULL ORDER BY created_at, student_id");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], question_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// All classes, ordered by class number
    pub async fn list_classes(&self) -> StoreResult<Vec<Class>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT class_number, topics FROM classes ORDER BY class_number")?;
            let raw = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            raw.into_iter()
                .map(|(class_number, topics)| decode_class(class_number, &topics))
                .collect()
        })
        .await
    }

    /// Look up one class
    pub async fn find_class(&self, class_number: &str) -> StoreResult<Option<Class>> {
        let class_number = class_number.to_string();
        self.with_conn(move |conn| find_class_sync(conn, &class_number))
            .await
    }

    /// Insert a new class; an existing class number is `StoreError::Duplicate`
    pub async fn insert_class(&self, class: Class) -> StoreResult<Class> {
        self.with_conn(move |conn| {
            let topics = encode_topics(&class.topics)?;
            let tx = conn.transaction()?;
            let exists = tx
                .query_row(
                    "SELECT 1 FROM classes WHERE class_number = ?1",
                    [&class.class_number],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if exists {
                return Err(StoreError::Duplicate {
                    entity: "Class",
                    id: class.class_number,
                });
            }
            tx.execute(
                "INSERT INTO classes (class_number, topics) VALUES (?1, ?2)",
                params![class.class_number, topics],
            )?;
            tx.commit()?;
            Ok(class)
        })
        .await
    }

    /// Replace the topics of an existing class. Returns `None` if the class
    /// does not exist.
    pub async fn update_class_topics(
        &self,
        class_number: &str,
        topics: Vec<String>,
    ) -> StoreResult<Option<Class>> {
        let class_number = class_number.to_string();
        self.with_conn(move |conn| {
            let encoded = encode_topics(&topics)?;
            let changed = conn.execute(
                "UPDATE classes SET topics = ?1 WHERE class_number = ?2",
                params![encoded, class_number],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            find_class_sync(conn, &class_number)
        })
        .await
    }
}

#[async_trait::async_trait]
impl QueueStore for SqliteQueueStore {
    async fn find_by_student_id(&self, student_id: &str) -> StoreResult<Option<QueueEntry>> {
        let student_id = student_id.to_string();
        self.with_conn(move |conn| {
            let sql = format!("{SELECT_QUESTION} WHERE student_id = ?1");
            let entry = conn
                .query_row(&sql, [&student_id], question_from_row)
                .optional()?;
            Ok(entry)
        })
        .await
    }

    async fn mark_resolved(&self, student_id: &str, at: DateTime<Utc>) -> StoreResult<MarkOutcome> {
        let student_id = student_id.to_string();
        self.with_conn(move |conn| {
            // Conditional write: concurrent resolvers converge on the first timestamp
            let changed = conn.execute(
                "UPDATE questions SET resolved_at = ?1 WHERE student_id = ?2 AND resolved_at IS NULL",
                params![at, student_id],
            )?;
            if changed == 1 {
                return Ok(MarkOutcome::Resolved(at));
            }

            let existing: Option<Option<DateTime<Utc>>> = conn
                .query_row(
                    "SELECT resolved_at FROM questions WHERE student_id = ?1",
                    [&student_id],
                    |row| row.get(0),
                )
                .optional()?;

            match existing {
                Some(Some(stored)) => Ok(MarkOutcome::AlreadyResolved(stored)),
                Some(None) => Err(StoreError::InvalidData(format!(
                    "question '{student_id}' still pending after conditional update"
                ))),
                None => Err(StoreError::Missing { student_id }),
            }
        })
        .await
    }
}

fn question_from_row(row: &Row<'_>) -> rusqlite::Result<QueueEntry> {
    Ok(QueueEntry {
        student_id: row.get(0)?,
        name: row.get(1)?,
        class_number: row.get(2)?,
        topic: row.get(3)?,
        problem: row.get(4)?,
        created_at: row.get(5)?,
        resolved_at: row.get(6)?,
    })
}

fn find_class_sync(conn: &Connection, class_number: &str) -> StoreResult<Option<Class>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT topics FROM classes WHERE class_number = ?1",
            [class_number],
            |row| row.get(0),
        )
        .optional()?;
    raw.map(|topics| decode_class(class_number.to_string(), &topics))
        .transpose()
}

fn encode_topics(topics: &[String]) -> StoreResult<String> {
    serde_json::to_string(topics).map_err(|e| StoreError::InvalidData(e.to_string()))
}

fn decode_class(class_number: String, topics: &str) -> StoreResult<Class> {
    let topics = serde_json::from_str(topics).map_err(|e| {
        StoreError::InvalidData(format!("topics of class '{class_number}': {e}"))
    })?;
    Ok(Class {
        class_number,
        topics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, SubsecRound};
    use tempfile::tempdir;

    fn entry(id: &str, minutes_ago: i64) -> QueueEntry {
        let mut e = QueueEntry::pending(id, (Utc::now() - ChronoDuration::minutes(minutes_ago)).trunc_subsecs(3));
        e.class_number = "142".into();
        e.topic = "loops".into();
        e
    }

    #[tokio::test]
    async fn test_enqueue_and_find() {
        let store = SqliteQueueStore::open_in_memory().unwrap();
        let e = entry("S1", 1);
        store.enqueue(e.clone()).await.unwrap();

        let found = store.find_by_student_id("S1").await.unwrap();
        assert_eq!(found, Some(e));
        assert_eq!(store.find_by_student_id("ghost").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_enqueue_duplicate() {
        let store = SqliteQueueStore::open_in_memory().unwrap();
        store.enqueue(entry("S1", 1)).await.unwrap();
        let err = store.enqueue(entry("S1", 0)).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { entity: "Question", .. }));
    }

    #[tokio::test]
    async fn test_mark_resolved_is_conditional() {
        let store = SqliteQueueStore::open_in_memory().unwrap();
        store.enqueue(entry("S1", 1)).await.unwrap();

        let first = Utc::now().trunc_subsecs(3);
        let later = first + ChronoDuration::seconds(30);

        let outcome = store.mark_resolved("S1", first).await.unwrap();
        assert_eq!(outcome, MarkOutcome::Resolved(first));

        let again = store.mark_resolved("S1", later).await.unwrap();
        assert_eq!(again, MarkOutcome::AlreadyResolved(first));
        assert!(again.was_already_resolved());

        let stored = store.find_by_student_id("S1").await.unwrap().unwrap();
        assert_eq!(stored.resolved_at, Some(first));
    }

    #[tokio::test]
    async fn test_mark_resolved_missing_row() {
        let store = SqliteQueueStore::open_in_memory().unwrap();
        let err = store.mark_resolved("ghost", Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::Missing { ref student_id } if student_id == "ghost"));
    }

    #[tokio::test]
    async fn test_active_entries_excludes_resolved() {
        let store = SqliteQueueStore::open_in_memory().unwrap();
        store.enqueue(entry("S1", 5)).await.unwrap();
        store.enqueue(entry("S2", 3)).await.unwrap();
        store.enqueue(entry("S3", 1)).await.unwrap();
        store.mark_resolved("S2", Utc::now()).await.unwrap();

        let active: Vec<String> = store
            .active_entries()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.student_id)
            .collect();
        assert_eq!(active, vec!["S1", "S3"]);
    }

    #[tokio::test]
    async fn test_class_crud() {
        let store = SqliteQueueStore::open_in_memory().unwrap();
        let class = Class {
            class_number: "142".into(),
            topics: vec!["loops".into(), "arrays".into()],
        };
        store.insert_class(class.clone()).await.unwrap();

        let dup = store.insert_class(class.clone()).await.unwrap_err();
        assert!(matches!(dup, StoreError::Duplicate { entity: "Class", .. }));

        let updated = store
            .update_class_topics("142", vec!["recursion".into()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.topics, vec!["recursion"]);

        assert!(store
            .update_class_topics("999", vec![])
            .await
            .unwrap()
            .is_none());

        let all = store.list_classes().await.unwrap();
        assert_eq!(all, vec![updated]);
        assert_eq!(store.find_class("143").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_open_on_disk_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.db");

        {
            let store = SqliteQueueStore::open(&path, Duration::from_secs(1)).unwrap();
            store.enqueue(entry("S1", 1)).await.unwrap();
            store.mark_resolved("S1", Utc::now()).await.unwrap();
        }

        let reopened = SqliteQueueStore::open(&path, Duration::from_secs(1)).unwrap();
        let found = reopened.find_by_student_id("S1").await.unwrap().unwrap();
        assert!(found.is_resolved());
    }
}
