//! tutorq-admin - Administrative API for the TutorQ question queue
//!
//! Entry point for the server binary.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tutorq_admin::cache::RedisQueueCache;
use tutorq_admin::config::{AdminConfig, CliArgs};
use tutorq_admin::db::SqliteQueueStore;
use tutorq_admin::notify::RedisStreamNotifier;
use tutorq_admin::resolve::ResolveCoordinator;
use tutorq_admin::server::{self, AppState};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = AdminConfig::from_args(args).context("Invalid configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create async runtime")?;

    runtime.block_on(run_server(config))
}

async fn run_server(config: AdminConfig) -> Result<()> {
    let store = SqliteQueueStore::open(&config.db_path, config.busy_timeout)
        .with_context(|| format!("Failed to open database {}", config.db_path.display()))?;
    info!(db = %config.db_path.display(), "opened queue store");

    let cache = RedisQueueCache::new(config.cache.clone())
        .await
        .context("Failed to connect to live queue cache")?;
    info!(key = %config.cache.key, "connected to live queue cache");

    let notifier = RedisStreamNotifier::new(config.stream.clone())
        .await
        .context("Failed to connect to notification stream")?;
    info!(stream = %config.stream.stream, "connected to notification stream");

    let cache = Arc::new(cache);
    let coordinator = ResolveCoordinator::new(
        Arc::new(store.clone()),
        cache.clone(),
        Arc::new(notifier),
        config.timeouts,
    );

    let state = Arc::new(AppState {
        coordinator,
        store,
        cache,
    });

    server::serve(state, config.bind_addr)
        .await
        .context("Server failed")
}

fn setup_logging(verbose: bool) -> Result<()> {
    let default = if verbose {
        "tutorq_admin=debug,tower_http=debug,warn"
    } else {
        "tutorq_admin=info,tower_http=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
