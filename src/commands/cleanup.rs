//! Cleanup command implementation.

use anyhow::Result;
use chrono::Utc;
use std::path::Path;


use super::{load_config, open_pipeline, print_regeneration};

/// Run the cleanup command
pub async fn run(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let pipeline = open_pipeline(&config).await?;

    let summary = pipeline.cleanup(Utc::now()).await?;

    println!(
        "[OK] Removed {} expired whitelist and {} expired blacklist entries",
        summary.entries.whitelist, summary.entries.blacklist
    );
    if summary.orphaned_files > 0 {
        println!(
            "[OK] Removed files of {} deleted block lists",
            summary.orphaned_files
        );
    }
    match &summary.regeneration {
        Some(regeneration) => print_regeneration(regeneration),
        None => println!("Nothing expired, configuration unchanged"),
    }
    Ok(())
}
