//! Notification channel
//!
//! Resolution events are published once per successful resolution for
//! subscribers such as the instructor dashboard. Delivery is at-least-once;
//! events carry a unique id so subscribers can drop duplicates.

mod redis_stream;

pub use redis_stream::{RedisStreamNotifier, RedisStreamConfig, DEFAULT_QUEUE_NAME};

use crate::error::NotifyResult;
use crate::model::NotificationEvent;

/// Trait for notification channel implementations
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Publish one event. No acknowledgment of subscriber receipt is awaited.
    async fn publish(&self, event: &NotificationEvent) -> NotifyResult<()>;

    /// Name of the channel events go to (for logging)
    fn channel_name(&self) -> &str;
}
