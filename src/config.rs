//! Configuration types for tutorq-admin
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros, with environment
//!   variable fallbacks for container deployments
//! - Runtime configuration with validation

use crate::cache::{RedisQueueCacheConfig, DEFAULT_CACHE_KEY};
use crate::error::ConfigError;
use crate::notify::{RedisStreamConfig, DEFAULT_QUEUE_NAME};
use crate::resolve::StepTimeouts;
use clap::Parser;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound for any single step budget
const MAX_TIMEOUT_MS: u64 = 60_000;

/// Upper bound for cache compare-and-set rounds
const MAX_CAS_ATTEMPTS: u32 = 100;

/// Administrative API for the TutorQ question queue
#[derive(Parser, Debug, Clone)]
#[command(
    name = "tutorq-admin",
    version,
    about = "Administrative API for the TutorQ classroom question queue",
    long_about = "Serves class management and queue resolution endpoints.\n\n\
                  Resolving a question marks it resolved in SQLite, removes it from the\n\
                  live queue snapshot in Redis, and publishes an event on a Redis stream.",
    after_help = "EXAMPLES:\n    \
        tutorq-admin --db queue.db --redis redis://localhost:6379\n    \
        ADMIN_PORT=9000 QUEUE_NAME=dashboard tutorq-admin -v"
)]
pub struct CliArgs {
    /// Address to bind the HTTP server to
    #[arg(long, env = "ADMIN_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "ADMIN_PORT", default_value_t = 8080)]
    pub port: u16,

    /// SQLite database holding questions and classes
    #[arg(long, env = "QUEUE_DB", default_value = "question_queue.db", value_name = "FILE")]
    pub db: PathBuf,

    /// Redis URL for the live queue cache and notification stream
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis: String,

    /// Redis key holding the live queue snapshot
    #[arg(long, env = "CACHE_KEY", default_value = DEFAULT_CACHE_KEY)]
    pub cache_key: String,

    /// Redis stream resolution events are published to
    #[arg(long, env = "QUEUE_NAME", default_value = DEFAULT_QUEUE_NAME)]
    pub queue_name: String,

    /// Approximate number of events retained in the stream
    #[arg(long, env = "STREAM_MAX_LEN", default_value_t = 10_000, value_name = "NUM")]
    pub stream_max_len: usize,

    /// Budget for each persistent store call
    #[arg(long, env = "STORE_TIMEOUT_MS", default_value_t = 2000, value_name = "MS")]
    pub store_timeout_ms: u64,

    /// Budget for cache removal
    #[arg(long, env = "CACHE_TIMEOUT_MS", default_value_t = 2000, value_name = "MS")]
    pub cache_timeout_ms: u64,

    /// Budget for publishing a notification
    #[arg(long, env = "NOTIFY_TIMEOUT_MS", default_value_t = 2000, value_name = "MS")]
    pub notify_timeout_ms: u64,

    /// Compare-and-set rounds before a contended cache removal fails
    #[arg(long = "cas-attempts", env = "CACHE_CAS_ATTEMPTS", default_value_t = 5, value_name = "NUM")]
    pub cas_attempts: u32,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// Socket address to listen on
    pub bind_addr: SocketAddr,
    /// SQLite database path
    pub db_path: PathBuf,
    /// SQLite busy timeout, half the store step budget so lock waits fail
    /// inside the blocking task before the step times out
    pub busy_timeout: Duration,
    /// Live queue cache settings
    pub cache: RedisQueueCacheConfig,
    /// Notification stream settings
    pub stream: RedisStreamConfig,
    /// Per-step budgets for resolution
    pub timeouts: StepTimeouts,
    /// Debug logging
    pub verbose: bool,
}

impl AdminConfig {
    /// Create validated config from CLI args
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let bind_addr = resolve_bind_addr(&args.host, args.port)?;

        if args.db.as_os_str().is_empty() || args.db.is_dir() {
            return Err(ConfigError::InvalidDbPath {
                path: args.db,
                reason: "must be a file path".into(),
            });
        }

        if args.cache_key.trim().is_empty() {
            return Err(ConfigError::MissingRequired("cache key"));
        }
        if args.queue_name.trim().is_empty() {
            return Err(ConfigError::MissingRequired("queue name"));
        }
        // One Redis serves both; a string key cannot also be a stream
        if args.cache_key == args.queue_name {
            return Err(ConfigError::KeyCollision(args.cache_key));
        }

        if args.cas_attempts == 0 || args.cas_attempts > MAX_CAS_ATTEMPTS {
            return Err(ConfigError::InvalidCasAttempts {
                count: args.cas_attempts,
                max: MAX_CAS_ATTEMPTS,
            });
        }

        let timeouts = StepTimeouts {
            store: validate_timeout("store", args.store_timeout_ms)?,
            cache: validate_timeout("cache", args.cache_timeout_ms)?,
            notify: validate_timeout("notify", args.notify_timeout_ms)?,
        };

        Ok(Self {
            bind_addr,
            db_path: args.db,
            busy_timeout: timeouts.store / 2,
            cache: RedisQueueCacheConfig {
                url: args.redis.clone(),
                key: args.cache_key,
                max_cas_attempts: args.cas_attempts,
            },
            stream: RedisStreamConfig {
                url: args.redis,
                stream: args.queue_name,
                max_len: args.stream_max_len,
            },
            timeouts,
            verbose: args.verbose,
        })
    }
}

/// Resolve host names such as `localhost` as well as literal addresses
fn resolve_bind_addr(host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidBindAddress {
        addr: format!("{host}:{port}"),
        reason,
    };

    (host, port)
        .to_socket_addrs()
        .map_err(|e| invalid(e.to_string()))?
        .next()
        .ok_or_else(|| invalid("no addresses found".into()))
}

fn validate_timeout(step: &'static str, millis: u64) -> Result<Duration, ConfigError> {
    if millis == 0 || millis > MAX_TIMEOUT_MS {
        return Err(ConfigError::InvalidTimeout {
            step,
            millis,
            max: MAX_TIMEOUT_MS,
        });
    }
    Ok(Duration::from_millis(millis))
}
