//! CLI command implementations.

pub mod check;
pub mod cleanup;
pub mod daemon;
pub mod entries;
pub mod generate;
pub mod resolver;
pub mod sources;
pub mod stats;
pub mod update;

use anyhow::{Context, Result};
use std::path::Path;

use crate::config::Config;
use crate::manager::{ListPipeline, Regeneration};

/// Load the config file, or defaults when it does not exist.
pub(crate) fn load_config(config_path: &Path) -> Result<Config> {
    Config::load_or_default(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))
}

/// Open the pipeline and make sure the predefined sources exist.
pub(crate) async fn open_pipeline(config: &Config) -> Result<ListPipeline> {
    let pipeline = ListPipeline::from_config(config)?;
    pipeline.seed().await?;
    Ok(pipeline)
}

pub(crate) fn print_regeneration(regeneration: &Regeneration) {
    if regeneration.reload.success {
        println!(
            "[OK] dnsmasq reloaded: {} blocked, {} blacklisted, {} whitelisted",
            regeneration.blocked, regeneration.blacklisted, regeneration.whitelisted
        );
    } else {
        println!(
            "[WARN] Configuration written but dnsmasq was not reloaded: {}",
            regeneration.reload.message
        );
    }
}
