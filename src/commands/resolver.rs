//! Resolver control command implementation.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use crate::cli::ResolverAction;
use crate::cmd_abstraction::RealCommandExecutor;
use crate::lock::LockGuard;
use crate::resolver::{ControlOutcome, ResolverController};

use super::load_config;

/// Run the resolver command
pub async fn run(action: ResolverAction, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let controller = ResolverController::new(
        Arc::new(RealCommandExecutor::new()),
        config.dnsmasq.resolver_settings(),
    );

    match action {
        ResolverAction::Status => {
            println!("dnsmasq: {}", controller.status().await);
            Ok(())
        }
        ResolverAction::Info => {
            let info = controller.info().await;
            if info.is_empty() {
                anyhow::bail!("Could not query the {} unit", config.dnsmasq.service);
            }
            for (key, value) in &info {
                println!("{}: {}", key, value);
            }
            Ok(())
        }
        ResolverAction::Reload => report(controller.reload().await),
        ResolverAction::Restart => report(controller.restart().await),
        ResolverAction::Backup => {
            let _lock = LockGuard::wait(&config.lock_file).await?;
            report(controller.backup().await)
        }
        ResolverAction::Restore { file } => {
            let _lock = LockGuard::wait(&config.lock_file).await?;
            report(controller.restore(&file).await)
        }
    }
}

fn report(outcome: ControlOutcome) -> Result<()> {
    if outcome.success {
        println!("[OK] {}", outcome);
        Ok(())
    } else {
        anyhow::bail!("{}", outcome)
    }
}
