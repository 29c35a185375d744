//! Stats command implementation.

use anyhow::Result;
use chrono::Utc;
use std::path::Path;

use crate::manager::ListPipeline;
use crate::stats::render_stats;

use super::load_config;

/// Run the stats command
pub async fn run(json: bool, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let pipeline = ListPipeline::from_config(&config)?;
    let now = Utc::now();

    let stats = pipeline.statistics(now).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let sources = pipeline.source_statuses(now)?;
    let resolver = pipeline.resolver().status().await;
    print!("{}", render_stats(&stats, &sources, resolver, now));
    Ok(())
}
