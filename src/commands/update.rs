//! Update command implementation.

use anyhow::Result;
use std::path::Path;
use tracing::{info, warn};

use crate::reconciler::RefreshOutcome;
use crate::signal::{listen_for_signals, ShutdownToken};
use crate::utils::format_count;

use super::{load_config, open_pipeline, print_regeneration};

/// Run the update command
pub async fn run(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let pipeline = open_pipeline(&config).await?;

    let token = ShutdownToken::new();
    listen_for_signals(token.clone());

    info!("Updating block lists...");
    let summary = pipeline.refresh_all(&token).await?;

    if summary.batch.results.is_empty() {
        warn!("No block lists enabled. Enable one with 'pidns sources enable <id>'.");
    }

    println!();
    for result in &summary.batch.results {
        match &result.outcome {
            RefreshOutcome::Updated(count) => {
                println!("  [OK]   {} ({} domains)", result.name, format_count(*count))
            }
            RefreshOutcome::Failed(reason) => println!("  [FAIL] {}: {}", result.name, reason),
            RefreshOutcome::Skipped => println!("  [SKIP] {} (no URL)", result.name),
            RefreshOutcome::Cancelled => println!("  [SKIP] {} (cancelled)", result.name),
        }
    }
    println!();
    println!(
        "{}/{} block lists updated",
        summary.batch.succeeded(),
        summary.batch.results.len()
    );
    print_regeneration(&summary.regeneration);

    Ok(())
}
