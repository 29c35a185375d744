//! Timer-driven jobs run by `pidns daemon`.
//!
//! Two tasks share the pipeline: a periodic refresh of every enabled source
//! and a periodic expiry cleanup. Both go through the pipeline's critical
//! section, so a tick that fires while the other job is running simply waits.
//! Errors are logged and the next tick proceeds.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::manager::ListPipeline;
use crate::signal::ShutdownToken;

pub struct Scheduler {
    pipeline: Arc<ListPipeline>,
    refresh_every: Duration,
    cleanup_every: Duration,
}

impl Scheduler {
    pub fn new(pipeline: Arc<ListPipeline>, refresh_every: Duration, cleanup_every: Duration) -> Self {
        Self {
            pipeline,
            refresh_every,
            cleanup_every,
        }
    }

    /// Spawn both jobs. They stop once `token` is cancelled.
    pub fn spawn(&self, token: &ShutdownToken) -> Vec<JoinHandle<()>> {
        vec![
            spawn_refresh_task(Arc::clone(&self.pipeline), self.refresh_every, token.clone()),
            spawn_cleanup_task(Arc::clone(&self.pipeline), self.cleanup_every, token.clone()),
        ]
    }

    /// Run both jobs until `token` is cancelled.
    pub async fn run(&self, token: &ShutdownToken) {
        info!(
            "Scheduler started (refresh every {}s, cleanup every {}s)",
            self.refresh_every.as_secs(),
            self.cleanup_every.as_secs()
        );
        for handle in self.spawn(token) {
            if let Err(e) = handle.await {
                error!("Scheduled task aborted: {}", e);
            }
        }
        info!("Scheduler stopped");
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period);
    // A long refresh must not cause a burst of catch-up ticks
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

fn spawn_refresh_task(
    pipeline: Arc<ListPipeline>,
    period: Duration,
    token: ShutdownToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = ticker(period);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }

            info!("Scheduled block list refresh...");
            match pipeline.refresh_all(&token).await {
                Ok(summary) => {
                    for failed in summary.batch.failed() {
                        warn!("Refresh of {} failed", failed.name);
                    }
                    info!(
                        "Scheduled refresh done: {} lists updated, {} domains blocked",
                        summary.batch.succeeded(),
                        summary.regeneration.blocked
                    );
                }
                Err(e) => error!("Scheduled refresh failed: {:#}", e),
            }
        }
    })
}

fn spawn_cleanup_task(
    pipeline: Arc<ListPipeline>,
    period: Duration,
    token: ShutdownToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = ticker(period);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }

            match pipeline.cleanup(Utc::now()).await {
                Ok(summary) if summary.entries.total() > 0 => info!(
                    "Scheduled cleanup removed {} expired entries",
                    summary.entries.total()
                ),
                Ok(_) => {}
                Err(e) => error!("Scheduled cleanup failed: {:#}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd_abstraction::{CommandExecutor, CommandOutput};
    use crate::config::Config;
    use crate::fetcher::MockSourceFetcher;
    use crate::store::JsonStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingExecutor {
        reloads: AtomicUsize,
    }

    #[async_trait]
    impl CommandExecutor for CountingExecutor {
        async fn execute(&self, cmd: &str, args: &[String]) -> anyhow::Result<CommandOutput> {
            if cmd == "systemctl" && args.first().map(String::as_str) == Some("reload") {
                self.reloads.fetch_add(1, Ordering::SeqCst);
            }
            Ok(CommandOutput {
                success: true,
                code: Some(0),
                ..Default::default()
            })
        }
    }

    fn pipeline(dir: &TempDir, executor: Arc<CountingExecutor>) -> Arc<ListPipeline> {
        let mut config = Config::default();
        config.blocklists_dir = dir.path().join("blocklists");
        config.lock_file = dir.path().join("pidns.lock");
        config.dnsmasq.config_dir = dir.path().to_path_buf();
        config.dnsmasq.adblock_file = dir.path().join("adblock.conf");
        config.dnsmasq.whitelist_file = dir.path().join("whitelist.conf");
        config.dnsmasq.blacklist_file = dir.path().join("blacklist.conf");

        Arc::new(
            ListPipeline::with_parts(
                &config,
                Arc::new(JsonStore::in_memory()),
                Arc::new(MockSourceFetcher::new()),
                executor,
            )
            .unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_ticks_until_cancelled() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(CountingExecutor::default());
        let scheduler = Scheduler::new(
            pipeline(&dir, Arc::clone(&executor)),
            Duration::from_secs(3600),
            Duration::from_secs(600),
        );

        let token = ShutdownToken::new();
        let handles = scheduler.spawn(&token);

        tokio::time::sleep(Duration::from_secs(3 * 3600 + 60)).await;
        token.cancel();
        for handle in handles {
            handle.await.unwrap();
        }

        // No expired entries, so cleanup never reloads
        assert_eq!(executor.reloads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_first_tick() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(CountingExecutor::default());
        let scheduler = Scheduler::new(
            pipeline(&dir, Arc::clone(&executor)),
            Duration::from_secs(3600),
            Duration::from_secs(3600),
        );

        let token = ShutdownToken::new();
        token.cancel();
        scheduler.run(&token).await;
        assert_eq!(executor.reloads.load(Ordering::SeqCst), 0);
    }
}
