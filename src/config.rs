//! Configuration management for pidns.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fetcher::{DEFAULT_TIMEOUT_SECS, MAX_LIST_SIZE};
use crate::reconciler::DEFAULT_CONCURRENCY;
use crate::resolver::ResolverSettings;
use crate::validation::{is_valid_interval, parse_interval};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "/etc/pidns/config.yaml";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where DomainSet and raw download files live
    pub blocklists_dir: PathBuf,

    /// JSON record store holding sources and list entries
    pub store_path: PathBuf,

    /// Advisory lock held for each pass through the critical section
    pub lock_file: PathBuf,

    pub dnsmasq: DnsmasqConfig,

    pub fetch: FetchConfig,

    pub schedule: ScheduleConfig,

    /// Category given to list entries created without one
    pub default_category: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            blocklists_dir: PathBuf::from("/var/lib/pidns/blocklists"),
            store_path: PathBuf::from("/var/lib/pidns/pidns.json"),
            lock_file: PathBuf::from("/run/pidns.lock"),
            dnsmasq: DnsmasqConfig::default(),
            fetch: FetchConfig::default(),
            schedule: ScheduleConfig::default(),
            default_category: "custom".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsmasqConfig {
    /// Directory archived by `resolver backup`
    pub config_dir: PathBuf,
    pub adblock_file: PathBuf,
    pub whitelist_file: PathBuf,
    pub blacklist_file: PathBuf,
    /// systemd unit name
    pub service: String,
    pub dnsmasq_bin: String,
    pub systemctl_bin: String,
    pub tar_bin: String,
    pub command_timeout_secs: u64,
    /// Number of backups kept after each backup
    pub backup_keep: usize,
}

impl Default for DnsmasqConfig {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("/etc/dnsmasq.d"),
            adblock_file: PathBuf::from("/etc/dnsmasq.d/adblock.conf"),
            whitelist_file: PathBuf::from("/etc/dnsmasq.d/whitelist.conf"),
            blacklist_file: PathBuf::from("/etc/dnsmasq.d/blacklist.conf"),
            service: "dnsmasq".to_string(),
            dnsmasq_bin: "dnsmasq".to_string(),
            systemctl_bin: "systemctl".to_string(),
            tar_bin: "tar".to_string(),
            command_timeout_secs: 30,
            backup_keep: 5,
        }
    }
}

impl DnsmasqConfig {
    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            service: self.service.clone(),
            dnsmasq_bin: self.dnsmasq_bin.clone(),
            systemctl_bin: self.systemctl_bin.clone(),
            tar_bin: self.tar_bin.clone(),
            config_dir: self.config_dir.clone(),
            timeout: Duration::from_secs(self.command_timeout_secs),
            backup_keep: self.backup_keep,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub max_size_bytes: usize,
    /// Sources fetched in parallel during a batch refresh
    pub concurrency: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_size_bytes: MAX_LIST_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Daemon timers. Intervals use the `30s`, `15m`, `1h`, `1d` format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// How often enabled sources are refreshed
    pub update_interval: String,
    /// How often expired list entries are purged
    pub cleanup_interval: String,
    /// Age after which the cached combined block set is rebuilt for checks
    pub stale_after: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            update_interval: "1d".to_string(),
            cleanup_interval: "1h".to_string(),
            stale_after: "5m".to_string(),
        }
    }
}

impl ScheduleConfig {
    pub fn update_interval(&self) -> Result<Duration> {
        parse_interval(&self.update_interval)
    }

    pub fn cleanup_interval(&self) -> Result<Duration> {
        parse_interval(&self.cleanup_interval)
    }

    pub fn stale_after(&self) -> Result<Duration> {
        parse_interval(&self.stale_after)
    }
}

impl Config {
    /// Load configuration from YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("schedule.update_interval", &self.schedule.update_interval),
            ("schedule.cleanup_interval", &self.schedule.cleanup_interval),
            ("schedule.stale_after", &self.schedule.stale_after),
        ] {
            if !is_valid_interval(value) {
                anyhow::bail!(
                    "Invalid {} '{}'. Use format like '30m', '1h', '1d'",
                    key,
                    value
                );
            }
        }

        if self.fetch.timeout_secs == 0 {
            anyhow::bail!("fetch.timeout_secs must be greater than 0");
        }
        if self.fetch.max_size_bytes == 0 {
            anyhow::bail!("fetch.max_size_bytes must be greater than 0");
        }
        if self.fetch.concurrency == 0 {
            anyhow::bail!("fetch.concurrency must be greater than 0");
        }
        if self.dnsmasq.command_timeout_secs == 0 {
            anyhow::bail!("dnsmasq.command_timeout_secs must be greater than 0");
        }
        if self.dnsmasq.service.trim().is_empty() {
            anyhow::bail!("dnsmasq.service must not be empty");
        }
        if self.default_category.trim().is_empty() {
            anyhow::bail!("default_category must not be empty");
        }

        let outputs = [
            &self.dnsmasq.adblock_file,
            &self.dnsmasq.whitelist_file,
            &self.dnsmasq.blacklist_file,
        ];
        for (i, a) in outputs.iter().enumerate() {
            if outputs[i + 1..].contains(a) {
                anyhow::bail!("dnsmasq output files must be distinct: {:?}", a);
            }
        }

        Ok(())
    }

    /// Held by a running daemon for its whole lifetime
    pub fn daemon_lock_file(&self) -> PathBuf {
        self.lock_file.with_extension("daemon.lock")
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
    }
}
