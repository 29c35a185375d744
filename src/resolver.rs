//! dnsmasq service control.
//!
//! Every external call is bounded by the configured timeout. Failures never
//! propagate as errors: they are logged and reported as an unsuccessful
//! [`ControlOutcome`]. A reload always validates the configuration with
//! `dnsmasq --test` first and is aborted if validation fails.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::cmd_abstraction::{args_to_strings, CommandExecutor, CommandOutput};

const BACKUP_PREFIX: &str = "dnsmasq_backup_";
const BACKUP_SUFFIX: &str = ".tar.gz";
const BACKUP_DIR: &str = "backups";

/// Result of a resolver control action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlOutcome {
    pub success: bool,
    pub message: String,
}

impl ControlOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        error!("{}", message);
        Self {
            success: false,
            message,
        }
    }
}

impl fmt::Display for ControlOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverStatus {
    Active,
    Inactive,
    /// The status probe itself failed
    Unknown,
}

impl fmt::Display for ResolverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResolverStatus::Active => "active",
            ResolverStatus::Inactive => "inactive",
            ResolverStatus::Unknown => "unknown",
        })
    }
}

/// Binaries and paths used by the controller.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub service: String,
    pub dnsmasq_bin: String,
    pub systemctl_bin: String,
    pub tar_bin: String,
    pub config_dir: PathBuf,
    pub timeout: Duration,
    pub backup_keep: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            service: "dnsmasq".to_string(),
            dnsmasq_bin: "dnsmasq".to_string(),
            systemctl_bin: "systemctl".to_string(),
            tar_bin: "tar".to_string(),
            config_dir: PathBuf::from("/etc/dnsmasq.d"),
            timeout: Duration::from_secs(30),
            backup_keep: 5,
        }
    }
}

/// Drives the dnsmasq service through external commands.
pub struct ResolverController {
    executor: Arc<dyn CommandExecutor>,
    settings: ResolverSettings,
}

impl ResolverController {
    pub fn new(executor: Arc<dyn CommandExecutor>, settings: ResolverSettings) -> Self {
        Self { executor, settings }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.settings.config_dir.join(BACKUP_DIR)
    }

    /// Run a command under the configured timeout.
    async fn run(&self, cmd: &str, args: &[&str]) -> Result<CommandOutput> {
        let args = args_to_strings(args);
        debug!("Running {} {}", cmd, args.join(" "));
        tokio::time::timeout(self.settings.timeout, self.executor.execute(cmd, &args))
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "{} timed out after {}s",
                    cmd,
                    self.settings.timeout.as_secs()
                )
            })?
    }

    /// Run a command and turn its result into an outcome.
    async fn control(&self, action: &str, cmd: &str, args: &[&str]) -> ControlOutcome {
        match self.run(cmd, args).await {
            Ok(output) if output.success => ControlOutcome::ok(format!("{} succeeded", action)),
            Ok(output) => ControlOutcome::failed(format!(
                "{} failed: {}",
                action,
                output.diagnostic()
            )),
            Err(e) => ControlOutcome::failed(format!("{} failed: {:#}", action, e)),
        }
    }

    /// Validate the configuration with `dnsmasq --test`.
    pub async fn test_config(&self) -> ControlOutcome {
        self.control(
            "dnsmasq configuration test",
            &self.settings.dnsmasq_bin,
            &["--test"],
        )
        .await
    }

    /// Validate the configuration, then reload the service.
    pub async fn reload(&self) -> ControlOutcome {
        let test = self.test_config().await;
        if !test.success {
            return test;
        }

        let outcome = self
            .control(
                "dnsmasq reload",
                &self.settings.systemctl_bin,
                &["reload", &self.settings.service],
            )
            .await;
        if outcome.success {
            info!("dnsmasq reloaded successfully");
        }
        outcome
    }

    pub async fn restart(&self) -> ControlOutcome {
        let outcome = self
            .control(
                "dnsmasq restart",
                &self.settings.systemctl_bin,
                &["restart", &self.settings.service],
            )
            .await;
        if outcome.success {
            info!("dnsmasq restarted successfully");
        }
        outcome
    }

    /// `systemctl is-active`: a zero exit means active, any other exit
    /// inactive, and a failure to run the probe unknown.
    pub async fn status(&self) -> ResolverStatus {
        match self
            .run(&self.settings.systemctl_bin, &["is-active", &self.settings.service])
            .await
        {
            Ok(output) if output.success => ResolverStatus::Active,
            Ok(_) => ResolverStatus::Inactive,
            Err(e) => {
                warn!("Failed to get dnsmasq status: {:#}", e);
                ResolverStatus::Unknown
            }
        }
    }

    /// ActiveState, SubState and MainPID from `systemctl show`. Empty when
    /// the probe fails.
    pub async fn info(&self) -> BTreeMap<String, String> {
        let output = match self
            .run(
                &self.settings.systemctl_bin,
                &[
                    "show",
                    &self.settings.service,
                    "--property=ActiveState,SubState,MainPID",
                ],
            )
            .await
        {
            Ok(output) if output.success => output,
            Ok(output) => {
                warn!("Failed to get dnsmasq info: {}", output.diagnostic());
                return BTreeMap::new();
            }
            Err(e) => {
                warn!("Failed to get dnsmasq info: {:#}", e);
                return BTreeMap::new();
            }
        };

        output
            .stdout
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect()
    }

    /// Archive the configuration directory into
    /// `<config_dir>/backups/dnsmasq_backup_<timestamp>.tar.gz`, then prune
    /// old archives.
    pub async fn backup(&self) -> ControlOutcome {
        let backup_dir = self.backup_dir();
        if let Err(e) = fs::create_dir_all(&backup_dir) {
            return ControlOutcome::failed(format!(
                "Failed to create backup directory {:?}: {}",
                backup_dir, e
            ));
        }

        let file = backup_dir.join(format!(
            "{}{}{}",
            BACKUP_PREFIX,
            Utc::now().format("%Y%m%d_%H%M%S"),
            BACKUP_SUFFIX
        ));
        let file_arg = file.to_string_lossy();
        let dir_arg = self.settings.config_dir.to_string_lossy();
        let exclude = format!("--exclude=./{}", BACKUP_DIR);

        let outcome = self
            .control(
                "dnsmasq config backup",
                &self.settings.tar_bin,
                &["-czf", &file_arg, &exclude, "-C", &dir_arg, "."],
            )
            .await;
        if !outcome.success {
            return outcome;
        }

        info!("Created dnsmasq config backup: {}", file.display());
        if let Err(e) = self.cleanup_old_backups(self.settings.backup_keep) {
            warn!("Failed to clean up old backups: {:#}", e);
        }
        ControlOutcome::ok(format!("Created backup {}", file.display()))
    }

    /// Extract a backup over the configuration directory, then reload.
    pub async fn restore(&self, backup: &Path) -> ControlOutcome {
        if !backup.is_file() {
            return ControlOutcome::failed(format!("Backup file not found: {}", backup.display()));
        }

        let file_arg = backup.to_string_lossy();
        let dir_arg = self.settings.config_dir.to_string_lossy();
        let outcome = self
            .control(
                "dnsmasq config restore",
                &self.settings.tar_bin,
                &["-xzf", &file_arg, "-C", &dir_arg],
            )
            .await;
        if !outcome.success {
            return outcome;
        }

        info!("Restored dnsmasq config from {}", backup.display());
        self.reload().await
    }

    /// Existing backups, newest first.
    pub fn list_backups(&self) -> Result<Vec<PathBuf>> {
        let dir = self.backup_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("Failed to list {:?}", dir)),
        };

        let mut backups: Vec<(std::time::SystemTime, PathBuf)> = entries
            .flatten()
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .map(|n| n.starts_with(BACKUP_PREFIX) && n.ends_with(BACKUP_SUFFIX))
                    .unwrap_or(false)
            })
            .filter_map(|e| {
                let modified = e.metadata().and_then(|m| m.modified()).ok()?;
                Some((modified, e.path()))
            })
            .collect();

        // Newest first; names embed the timestamp so they break ties
        backups.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        Ok(backups.into_iter().map(|(_, path)| path).collect())
    }

    /// Keep the newest `keep` backups and delete the rest. Returns how many
    /// were deleted.
    pub fn cleanup_old_backups(&self, keep: usize) -> Result<usize> {
        let mut removed = 0;
        for path in self.list_backups()?.into_iter().skip(keep) {
            fs::remove_file(&path).with_context(|| format!("Failed to remove {:?}", path))?;
            info!("Removed old backup: {}", path.display());
            removed += 1;
        }
        Ok(removed)
    }
}
