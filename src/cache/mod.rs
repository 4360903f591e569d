//! Live queue cache
//!
//! The cache holds one JSON snapshot of the current queue that front ends
//! read to render who is waiting. It is derived state: the persistent store
//! is the source of truth, and resolution only ever removes entries here.

mod redis_cache;

pub use redis_cache::{RedisQueueCache, RedisQueueCacheConfig, DEFAULT_CACHE_KEY};

use crate::error::CacheResult;
use crate::model::QueueSnapshot;

/// Trait for live queue cache implementations
#[async_trait::async_trait]
pub trait LiveQueueCache: Send + Sync {
    /// Remove a student from the active snapshot.
    ///
    /// Returns `true` if an element was removed. A missing key or a student
    /// that is not listed is not an error.
    async fn remove_if_present(&self, student_id: &str) -> CacheResult<bool>;

    /// Read the current snapshot (empty if the key does not exist)
    async fn snapshot(&self) -> CacheResult<QueueSnapshot>;
}
