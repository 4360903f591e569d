//! Redis Streams notification channel
//!
//! Each event becomes one stream entry (`XADD <stream> MAXLEN ~ N * ...`).
//! Streams persist entries and let any number of consumer groups read them,
//! which gives subscribers a durable queue without a separate broker.

use crate::error::{NotifyError, NotifyResult};
use crate::model::NotificationEvent;
use crate::notify::Notifier;

use redis::{aio::MultiplexedConnection, Client};
use tracing::debug;

/// Default stream name, namespaced apart from the cached snapshot key
pub const DEFAULT_QUEUE_NAME: &str = "tutorq:events";

/// Configuration for the stream notifier
#[derive(Debug, Clone)]
pub struct RedisStreamConfig {
    /// Redis connection URL
    pub url: String,
    /// Stream key events are appended to
    pub stream: String,
    /// Approximate cap on retained entries
    pub max_len: usize,
}

impl Default for RedisStreamConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            stream: DEFAULT_QUEUE_NAME.to_string(),
            max_len: 10_000,
        }
    }
}

impl RedisStreamConfig {
    /// Create config with custom Redis URL
    pub fn with_url(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }
}

/// Notifier appending to a Redis stream
pub struct RedisStreamNotifier {
    connection: MultiplexedConnection,
    config: RedisStreamConfig,
}

impl RedisStreamNotifier {
    /// Connect to Redis
    pub async fn new(config: RedisStreamConfig) -> NotifyResult<Self> {
        let client = Client::open(config.url.as_str()).map_err(|e| NotifyError::ConnectionFailed {
            url: config.url.clone(),
            reason: e.to_string(),
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| NotifyError::ConnectionFailed {
                url: config.url.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self { connection, config })
    }
}

/// Build the XADD command for an event
fn xadd_command(stream: &str, max_len: usize, event: &NotificationEvent) -> NotifyResult<redis::Cmd> {
    let mut cmd = redis::cmd("XADD");
    cmd.arg(stream).arg("MAXLEN").arg("~").arg(max_len).arg("*");
    for (field, value) in event.stream_fields()? {
        cmd.arg(field).arg(value);
    }
    Ok(cmd)
}

#[async_trait::async_trait]
impl Notifier for RedisStreamNotifier {
    async fn publish(&self, event: &NotificationEvent) -> NotifyResult<()> {
        let cmd = xadd_command(&self.config.stream, self.config.max_len, event)?;
        let mut conn = self.connection.clone();

        let entry_id: String = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| NotifyError::PublishFailed {
                channel: self.config.stream.clone(),
                reason: e.to_string(),
            })?;

        debug!(
            stream = %self.config.stream,
            entry_id = %entry_id,
            event_id = %event.event_id,
            student_id = %event.student_id,
            "published resolution event"
        );
        Ok(())
    }

    fn channel_name(&self) -> &str {
        &self.config.stream
    }
}
