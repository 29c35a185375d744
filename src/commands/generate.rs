//! Generate command implementation.

use anyhow::Result;
use std::path::Path;


use super::{load_config, open_pipeline, print_regeneration};

/// Run the generate command
pub async fn run(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let pipeline = open_pipeline(&config).await?;

    let regeneration = pipeline.regenerate().await?;
    println!("Wrote {}", pipeline.writer().adblock_file().display());
    println!("Wrote {}", pipeline.writer().whitelist_file().display());
    println!("Wrote {}", pipeline.writer().blacklist_file().display());
    print_regeneration(&regeneration);

    if !regeneration.reload.success {
        anyhow::bail!("dnsmasq reload failed");
    }
    Ok(())
}
