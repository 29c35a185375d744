//! Daemon command implementation.

use anyhow::Result;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

use crate::lock::LockGuard;
use crate::scheduler::Scheduler;
use crate::signal::{listen_for_signals, ShutdownToken};

use super::{load_config, open_pipeline};

/// Run the daemon until SIGINT or SIGTERM
pub async fn run(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    // Only one daemon at a time. Each scheduled job takes the shared lock
    // for its own critical section, so CLI edits go through in between.
    let _daemon = LockGuard::acquire(config.daemon_lock_file())?;
    let pipeline = Arc::new(open_pipeline(&config).await?);

    let token = ShutdownToken::new();
    listen_for_signals(token.clone());

    // Catch up on startup: refresh when any enabled list is stale,
    // otherwise just make sure the generated files are current
    let now = Utc::now();
    let stale = pipeline
        .source_statuses(now)?
        .iter()
        .any(|s| s.source.enabled && s.needs_update);
    let startup = if stale {
        info!("Block lists are out of date, refreshing...");
        pipeline.refresh_all(&token).await.map(|s| s.regeneration)
    } else {
        pipeline.regenerate().await
    };
    if let Err(e) = startup {
        error!("Startup regeneration failed: {:#}", e);
    }

    let scheduler = Scheduler::new(
        Arc::clone(&pipeline),
        config.schedule.update_interval()?,
        config.schedule.cleanup_interval()?,
    );
    scheduler.run(&token).await;

    info!("pidns daemon stopped");
    Ok(())
}
