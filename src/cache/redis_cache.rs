//! Redis-backed live queue cache
//!
//! The snapshot lives under a single key as JSON. Removal is an optimistic
//! read-modify-write:
//! - `WATCH key`, `GET key`, filter the student out in process
//! - `MULTI` / `SET key` / `EXEC`, which aborts if anyone else wrote the key
//! - retry a bounded number of times, then report contention
//!
//! A writer racing with us can never resurrect a removed student through
//! this path, because every rewrite starts from the value it watched.

use crate::cache::LiveQueueCache;
use crate::error::{CacheError, CacheResult};
use crate::model::QueueSnapshot;

use parking_lot::Mutex;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use tracing::debug;

/// Default Redis key holding the queue snapshot
pub const DEFAULT_CACHE_KEY: &str = "queue";

/// Configuration for the Redis cache
#[derive(Debug, Clone)]
pub struct RedisQueueCacheConfig {
    /// Redis connection URL
    pub url: String,
    /// Key holding the snapshot document
    pub key: String,
    /// Maximum WATCH/EXEC rounds before giving up
    pub max_cas_attempts: u32,
}

impl Default for RedisQueueCacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            key: DEFAULT_CACHE_KEY.to_string(),
            max_cas_attempts: 5,
        }
    }
}

impl RedisQueueCacheConfig {
    /// Create config with custom Redis URL
    pub fn with_url(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }
}

/// Idle WATCH connections kept for reuse
const MAX_IDLE_WATCH_CONNS: usize = 4;

/// Live queue cache stored in Redis
pub struct RedisQueueCache {
    client: Client,
    connection: MultiplexedConnection,
    /// Connections used only for WATCH rounds; never shared while in use
    idle: Mutex<Vec<MultiplexedConnection>>,
    config: RedisQueueCacheConfig,
}

impl RedisQueueCache {
    /// Connect to Redis
    pub async fn new(config: RedisQueueCacheConfig) -> CacheResult<Self> {
        let client = Client::open(config.url.as_str()).map_err(|e| CacheError::ConnectionFailed {
            url: config.url.clone(),
            reason: e.to_string(),
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::ConnectionFailed {
                url: config.url.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            connection,
            idle: Mutex::new(Vec::new()),
            config,
        })
    }

    /// Take an idle WATCH connection or open a new one; WATCH state is per
    /// connection, so these are never the shared multiplexed one
    async fn checkout(&self) -> CacheResult<MultiplexedConnection> {
        let pooled = self.idle.lock().pop();
        if let Some(conn) = pooled {
            return Ok(conn);
        }

        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::ConnectionFailed {
                url: self.config.url.clone(),
                reason: e.to_string(),
            })
    }

    /// Return a connection whose last round ended with EXEC or UNWATCH
    fn checkin(&self, conn: MultiplexedConnection) {
        let mut idle = self.idle.lock();
        if idle.len() < MAX_IDLE_WATCH_CONNS {
            idle.push(conn);
        }
    }
}

#[async_trait::async_trait]
impl LiveQueueCache for RedisQueueCache {
    async fn remove_if_present(&self, student_id: &str) -> CacheResult<bool> {
        let key = self.config.key.as_str();
        let mut conn = self.checkout().await?;

        let result = {
            let mut round = WatchedRemoval {
                conn: &mut conn,
                key,
                student_id,
            };
            run_cas(&mut round, key, student_id, self.config.max_cas_attempts).await
        };

        // After an error the WATCH state is unknown, so the connection is dropped
        if result.is_ok() {
            self.checkin(conn);
        }
        result
    }

    async fn snapshot(&self) -> CacheResult<QueueSnapshot> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn.get(&self.config.key).await?;

        match raw {
            Some(json) => QueueSnapshot::from_json(&json).map_err(|e| CacheError::Corrupt {
                key: self.config.key.clone(),
                reason: e.to_string(),
            }),
            None => Ok(QueueSnapshot::default()),
        }
    }
}

/// Result of one WATCH/EXEC round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CasRound {
    /// EXEC committed the rewritten snapshot
    Removed,
    /// Key missing or student not listed; nothing written
    NothingToRemove,
    /// Another writer touched the key; EXEC replied nil
    Aborted,
}

/// One optimistic removal attempt
#[async_trait::async_trait]
trait CasAttempt: Send {
    async fn attempt(&mut self) -> CacheResult<CasRound>;
}

/// Retry `round` until it commits, finds nothing to do, or runs out of attempts
async fn run_cas(
    round: &mut dyn CasAttempt,
    key: &str,
    student_id: &str,
    max_attempts: u32,
) -> CacheResult<bool> {
    for attempt in 1..=max_attempts {
        match round.attempt().await? {
            CasRound::Removed => {
                debug!(student_id, attempt, "removed student from cached queue");
                return Ok(true);
            }
            CasRound::NothingToRemove => return Ok(false),
            CasRound::Aborted => {
                debug!(student_id, attempt, "cached queue changed during removal, retrying");
            }
        }
    }

    Err(CacheError::Contended {
        key: key.to_string(),
        attempts: max_attempts,
    })
}

/// WATCH, GET, filter, then MULTI/SET/EXEC on a dedicated connection
struct WatchedRemoval<'a> {
    conn: &'a mut MultiplexedConnection,
    key: &'a str,
    student_id: &'a str,
}

#[async_trait::async_trait]
impl<'a> CasAttempt for WatchedRemoval<'a> {
    async fn attempt(&mut self) -> CacheResult<CasRound> {
        redis::cmd("WATCH")
            .arg(self.key)
            .query_async::<()>(&mut *self.conn)
            .await?;

        let raw: Option<String> = self.conn.get(self.key).await?;

        let updated = match strip_student(raw.as_deref(), self.key, self.student_id) {
            Ok(Some(json)) => json,
            Ok(None) => {
                redis::cmd("UNWATCH").query_async::<()>(&mut *self.conn).await?;
                return Ok(CasRound::NothingToRemove);
            }
            Err(e) => {
                // The corrupt value is reported either way
                let _ = redis::cmd("UNWATCH").query_async::<()>(&mut *self.conn).await;
                return Err(e);
            }
        };

        // EXEC replies nil when the watched key changed underneath us
        let committed: Option<(redis::Value,)> = redis::pipe()
            .atomic()
            .set(self.key, updated)
            .query_async(&mut *self.conn)
            .await?;

        Ok(if committed.is_some() {
            CasRound::Removed
        } else {
            CasRound::Aborted
        })
    }
}

/// Compute the rewritten snapshot without `student_id`.
///
/// Returns `None` when there is nothing to write: the key is missing or the
/// student is not listed.
fn strip_student(
    raw: Option<&str>,
    key: &str,
    student_id: &str,
) -> CacheResult<Option<String>> {
    let Some(raw) = raw else {
        return Ok(None);
    };

    let corrupt = |e: serde_json::Error| CacheError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    };

    let mut snapshot = QueueSnapshot::from_json(raw).map_err(corrupt)?;
    if snapshot.remove_student(student_id) == 0 {
        return Ok(None);
    }

    snapshot.to_json().map(Some).map_err(corrupt)
}
