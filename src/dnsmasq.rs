//! dnsmasq configuration generation.
//!
//! Three files are produced, each starting with a title line, a generation
//! timestamp and a blank line:
//! - the block file: `address=/<domain>/0.0.0.0` and `address=/<domain>/::`
//!   for every domain of the combined block set
//! - the blacklist file: the same directives for active blacklist entries
//! - the whitelist file: `server=/<domain>/#` for active whitelist entries,
//!   which forwards the domain upstream
//!
//! Whitelisted domains are left out of the block and blacklist bodies, so the
//! whitelist wins regardless of how dnsmasq orders directives.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::membership::Overrides;
use crate::reconciler::CombinedBlockSet;
use crate::utils::{format_count, write_atomic};

const BLOCK_TITLE: &str = "PiDNS Ad-Blocker Configuration";
const WHITELIST_TITLE: &str = "PiDNS Ad-Blocker Whitelist Configuration";
const BLACKLIST_TITLE: &str = "PiDNS Ad-Blocker Blacklist Configuration";

fn header(title: &str, generated_at: DateTime<Utc>) -> String {
    format!(
        "# {}\n# Generated on {}\n\n",
        title,
        generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// Sorted, deduplicated domains minus the excluded ones.
fn body_domains<'a, I>(domains: I, exclude: &Overrides) -> BTreeSet<&'a str>
where
    I: IntoIterator<Item = &'a String>,
{
    domains
        .into_iter()
        .map(String::as_str)
        .filter(|d| !d.is_empty() && !exclude.is_whitelisted(d))
        .collect()
}

fn render_sinkhole<'a, I>(
    title: &str,
    domains: I,
    overrides: &Overrides,
    generated_at: DateTime<Utc>,
) -> (String, usize)
where
    I: IntoIterator<Item = &'a String>,
{
    let domains = body_domains(domains, overrides);
    let mut out = header(title, generated_at);
    for domain in &domains {
        // Writing to a String cannot fail
        let _ = writeln!(out, "address=/{}/0.0.0.0", domain);
        let _ = writeln!(out, "address=/{}/::", domain);
    }
    (out, domains.len())
}

/// Render the whitelist file for the active whitelist entries.
pub fn render_whitelist(overrides: &Overrides, generated_at: DateTime<Utc>) -> String {
    let mut out = header(WHITELIST_TITLE, generated_at);
    for domain in overrides.whitelist() {
        let _ = writeln!(out, "server=/{}/#", domain);
    }
    out
}

/// Directive counts of one generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationReport {
    pub blocked: usize,
    pub whitelisted: usize,
    pub blacklisted: usize,
}

/// Writes the three configuration files.
#[derive(Debug, Clone)]
pub struct ConfigWriter {
    adblock_file: PathBuf,
    whitelist_file: PathBuf,
    blacklist_file: PathBuf,
}

impl ConfigWriter {
    pub fn new(
        adblock_file: impl Into<PathBuf>,
        whitelist_file: impl Into<PathBuf>,
        blacklist_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            adblock_file: adblock_file.into(),
            whitelist_file: whitelist_file.into(),
            blacklist_file: blacklist_file.into(),
        }
    }

    pub fn adblock_file(&self) -> &Path {
        &self.adblock_file
    }

    pub fn whitelist_file(&self) -> &Path {
        &self.whitelist_file
    }

    pub fn blacklist_file(&self) -> &Path {
        &self.blacklist_file
    }

    /// Regenerate all three files atomically.
    pub fn write_all(
        &self,
        combined: &CombinedBlockSet,
        overrides: &Overrides,
        generated_at: DateTime<Utc>,
    ) -> Result<GenerationReport> {
        let (block, blocked) =
            render_sinkhole(BLOCK_TITLE, combined.domains(), overrides, generated_at);
        let (blacklist, blacklisted) =
            render_sinkhole(BLACKLIST_TITLE, overrides.blacklist(), overrides, generated_at);
        let whitelist = render_whitelist(overrides, generated_at);
        let whitelisted = overrides.whitelist().count();

        write_atomic(&self.adblock_file, block.as_bytes())
            .with_context(|| format!("Failed to write {:?}", self.adblock_file))?;
        write_atomic(&self.blacklist_file, blacklist.as_bytes())
            .with_context(|| format!("Failed to write {:?}", self.blacklist_file))?;
        write_atomic(&self.whitelist_file, whitelist.as_bytes())
            .with_context(|| format!("Failed to write {:?}", self.whitelist_file))?;

        info!(
            "Generated dnsmasq config: {} blocked, {} blacklisted, {} whitelisted",
            format_count(blocked),
            blacklisted,
            whitelisted
        );

        Ok(GenerationReport {
            blocked,
            whitelisted,
            blacklisted,
        })
    }
}
