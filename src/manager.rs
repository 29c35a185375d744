//! The list pipeline.
//!
//! Every trigger that changes what dnsmasq should block (a scheduled refresh,
//! the expiry cleanup, a user edit) ends in the same critical section:
//! rebuild the combined block set, fold in the active overrides, write the
//! three configuration files and reload dnsmasq once. [`ListPipeline`] runs
//! that section under a single async mutex so concurrent triggers serialize
//! and never interleave file writes or reloads. Across processes the section
//! also holds the file lock and starts by reloading the store, so a daemon
//! and a CLI edit see each other's writes.
//!
//! The mutex also guards the last combined block set, which domain checks
//! reuse until it is older than the configured staleness bound.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::cache::ListCache;
use crate::cmd_abstraction::{CommandExecutor, RealCommandExecutor};
use crate::config::Config;
use crate::dnsmasq::{ConfigWriter, GenerationReport};
use crate::error::PidnsError;
use crate::fetcher::{HttpFetcher, SourceFetcher};
use crate::lists::{CleanupReport, ImportRecord, ImportReport, ListManager, ListStatistics};
use crate::lock::LockGuard;
use crate::membership::{decide, Verdict};
use crate::model::{EntryUpdate, ListEntry, ListKind, NewSource, Source, SourceFilter, SourceUpdate};
use crate::presets::{is_protected_url, seed_predefined, DEFAULT_CATEGORY};
use crate::reconciler::{BatchReport, CombinedBlockSet, Reconciler, SourceRefresh, SourceStatus};
use crate::resolver::{ControlOutcome, ResolverController};
use crate::signal::ShutdownToken;
use crate::store::{JsonStore, Store};
use crate::validation::{validate_domain, validate_url};

/// Outcome of one pass through the critical section.
#[derive(Debug, Clone, Serialize)]
pub struct Regeneration {
    pub blocked: usize,
    pub whitelisted: usize,
    pub blacklisted: usize,
    pub reload: ControlOutcome,
}

impl Regeneration {
    fn new(report: GenerationReport, reload: ControlOutcome) -> Self {
        Self {
            blocked: report.blocked,
            whitelisted: report.whitelisted,
            blacklisted: report.blacklisted,
            reload,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefreshSummary {
    pub batch: BatchReport,
    pub regeneration: Regeneration,
}

#[derive(Debug, Clone)]
pub struct SourceAdded {
    pub source: Source,
    pub refresh: SourceRefresh,
    /// Only present when the initial fetch succeeded
    pub regeneration: Option<Regeneration>,
}

#[derive(Debug, Clone)]
pub struct CleanupSummary {
    pub entries: CleanupReport,
    pub orphaned_files: usize,
    /// Only present when expired entries were deleted
    pub regeneration: Option<Regeneration>,
}

/// Totals shown by `pidns stats`.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatistics {
    pub sources_total: usize,
    pub sources_enabled: usize,
    pub blocked_domains: usize,
    pub cache_bytes: u64,
    pub lists: ListStatistics,
}

/// Tunables of the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// A source older than this is reported as needing an update
    pub update_interval: Duration,
    /// Age after which checks rebuild the combined block set
    pub stale_after: Duration,
    pub default_category: String,
    /// Inter-process lock taken by every critical section
    pub lock_file: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(24 * 3600),
            stale_after: Duration::from_secs(300),
            default_category: DEFAULT_CATEGORY.to_string(),
            lock_file: None,
        }
    }
}

/// One pass through the critical section.
struct Section<'a> {
    _lock: Option<LockGuard>,
    combined: MutexGuard<'a, Option<CombinedBlockSet>>,
}

/// Orchestrates the reconciler, list manager, config writer and resolver.
pub struct ListPipeline {
    store: Arc<dyn Store>,
    reconciler: Reconciler,
    lists: ListManager,
    writer: ConfigWriter,
    resolver: ResolverController,
    settings: PipelineSettings,
    /// Critical section; holds the last combined block set
    combined: Mutex<Option<CombinedBlockSet>>,
}

impl ListPipeline {
    pub fn new(
        store: Arc<dyn Store>,
        reconciler: Reconciler,
        writer: ConfigWriter,
        resolver: ResolverController,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            lists: ListManager::new(Arc::clone(&store)),
            store,
            reconciler,
            writer,
            resolver,
            settings,
            combined: Mutex::new(None),
        }
    }

    /// Assemble the production pipeline described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store: Arc<dyn Store> = Arc::new(
            JsonStore::open(&config.store_path)
                .with_context(|| format!("Failed to open store {:?}", config.store_path))?,
        );
        let fetcher: Arc<dyn SourceFetcher> = Arc::new(HttpFetcher::new(
            config.fetch_timeout(),
            config.fetch.max_size_bytes,
        )?);
        let executor: Arc<dyn CommandExecutor> = Arc::new(RealCommandExecutor::new());

        Self::with_parts(config, store, fetcher, executor)
    }

    /// Assemble a pipeline from `config` around the given collaborators.
    pub fn with_parts(
        config: &Config,
        store: Arc<dyn Store>,
        fetcher: Arc<dyn SourceFetcher>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Result<Self> {
        let reconciler = Reconciler::new(
            Arc::clone(&store),
            fetcher,
            ListCache::new(&config.blocklists_dir),
            config.fetch.concurrency,
        );
        let writer = ConfigWriter::new(
            &config.dnsmasq.adblock_file,
            &config.dnsmasq.whitelist_file,
            &config.dnsmasq.blacklist_file,
        );
        let resolver = ResolverController::new(executor, config.dnsmasq.resolver_settings());
        let settings = PipelineSettings {
            update_interval: config.schedule.update_interval()?,
            stale_after: config.schedule.stale_after()?,
            default_category: config.default_category.clone(),
            lock_file: Some(config.lock_file.clone()),
        };

        Ok(Self::new(store, reconciler, writer, resolver, settings))
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn lists(&self) -> &ListManager {
        &self.lists
    }

    pub fn resolver(&self) -> &ResolverController {
        &self.resolver
    }

    pub fn writer(&self) -> &ConfigWriter {
        &self.writer
    }

    /// Enter the critical section: in-process mutex, then the file lock,
    /// then a fresh view of the store.
    async fn enter(&self) -> Result<Section<'_>> {
        let combined = self.combined.lock().await;
        let lock = match &self.settings.lock_file {
            Some(path) => Some(LockGuard::wait(path).await?),
            None => None,
        };
        self.store.reload()?;
        Ok(Section {
            _lock: lock,
            combined,
        })
    }

    /// Insert the predefined sources that are not in the store yet.
    pub async fn seed(&self) -> Result<usize> {
        let _section = self.enter().await?;
        let added = seed_predefined(self.store.as_ref())?;
        if added > 0 {
            info!("Added {} predefined block lists", added);
        }
        Ok(added)
    }

    /// Rebuild, write and reload inside the critical section.
    async fn regenerate_locked(&self, section: &mut Section<'_>) -> Result<Regeneration> {
        let combined = self.reconciler.rebuild_combined()?;
        let now = Utc::now();
        let overrides = self.lists.overrides(now)?;
        let report = self.writer.write_all(&combined, &overrides, now)?;
        *section.combined = Some(combined);

        let reload = self.resolver.reload().await;
        if !reload.success {
            warn!("Configuration written but dnsmasq was not reloaded");
        }
        Ok(Regeneration::new(report, reload))
    }

    /// Regenerate the dnsmasq configuration and reload once.
    pub async fn regenerate(&self) -> Result<Regeneration> {
        let mut section = self.enter().await?;
        self.regenerate_locked(&mut section).await
    }

    /// Refresh every enabled source, then regenerate exactly once.
    pub async fn refresh_all(&self, token: &ShutdownToken) -> Result<RefreshSummary> {
        let mut section = self.enter().await?;

        let sources = self.store.list_sources(&SourceFilter::enabled())?;
        info!("Refreshing {} enabled block lists...", sources.len());
        let batch = self.reconciler.refresh_batch(&sources, token).await;
        info!(
            "Refreshed {}/{} block lists",
            batch.succeeded(),
            sources.len()
        );

        let regeneration = self.regenerate_locked(&mut section).await?;
        Ok(RefreshSummary {
            batch,
            regeneration,
        })
    }

    /// Refresh a single source; regenerates only if the fetch succeeded.
    pub async fn refresh_source(&self, id: u64) -> Result<(SourceRefresh, Option<Regeneration>)> {
        let mut section = self.enter().await?;
        let source = self.source(id)?;

        let refresh = self.reconciler.refresh_one(&source).await;
        let regeneration = if refresh.is_success() && source.enabled {
            Some(self.regenerate_locked(&mut section).await?)
        } else {
            None
        };
        Ok((refresh, regeneration))
    }

    fn source(&self, id: u64) -> Result<Source> {
        Ok(self
            .store
            .get_source(id)?
            .ok_or(PidnsError::SourceNotFound(id))?)
    }

    pub fn list_sources(&self, filter: &SourceFilter) -> Result<Vec<Source>> {
        Ok(self.store.list_sources(filter)?)
    }

    /// Add a user source, fetch it and on success regenerate.
    ///
    /// A failed initial fetch keeps the record; it is retried on the next
    /// refresh.
    pub async fn add_source(
        &self,
        name: &str,
        url: &str,
        category: Option<&str>,
        description: &str,
    ) -> Result<SourceAdded> {
        let url = validate_url(url)?;
        let mut section = self.enter().await?;

        if self.store.find_source_by_url(&url)?.is_some() {
            return Err(PidnsError::DuplicateSource(url).into());
        }

        let name = if name.trim().is_empty() {
            url.clone()
        } else {
            name.trim().to_string()
        };
        let source = self
            .store
            .create_source(NewSource {
                name,
                url: Some(url.clone()),
                category: category.unwrap_or(DEFAULT_CATEGORY).to_string(),
                enabled: true,
                description: description.to_string(),
            })
            .map_err(|e| match e {
                crate::store::StoreError::Duplicate(_) => PidnsError::DuplicateSource(url).into(),
                other => anyhow::Error::from(other),
            })?;
        info!("Added block list {} ({})", source.name, source.id);

        let refresh = self.reconciler.refresh_one(&source).await;
        let regeneration = if refresh.is_success() {
            Some(self.regenerate_locked(&mut section).await?)
        } else {
            None
        };

        let source = self.source(source.id)?;
        Ok(SourceAdded {
            source,
            refresh,
            regeneration,
        })
    }

    /// Delete a user source with its files and regenerate.
    pub async fn remove_source(&self, id: u64) -> Result<(Source, Regeneration)> {
        let mut section = self.enter().await?;
        let source = self.source(id)?;

        if source.url.as_deref().map(is_protected_url).unwrap_or(false) {
            return Err(PidnsError::ProtectedSource(source.name).into());
        }

        // Record first: leftover files are only orphans, cleaned up later
        self.store.delete_source(id)?;
        if let Err(e) = self.reconciler.remove_files(id) {
            warn!("Failed to remove files of {}: {:#}", source.name, e);
        }
        info!("Removed block list {} ({})", source.name, id);

        let regeneration = self.regenerate_locked(&mut section).await?;
        Ok((source, regeneration))
    }

    /// Set `enabled` and regenerate synchronously.
    pub async fn set_enabled(&self, id: u64, enabled: bool) -> Result<(Source, Regeneration)> {
        let mut section = self.enter().await?;
        self.source(id)?;
        self.set_enabled_locked(&mut section, id, enabled).await
    }

    /// Flip `enabled` and regenerate synchronously.
    ///
    /// The current state is read inside the critical section, so queued
    /// toggles each see the previous one's result.
    pub async fn toggle(&self, id: u64) -> Result<(Source, Regeneration)> {
        let mut section = self.enter().await?;
        let enabled = self.source(id)?.enabled;
        self.set_enabled_locked(&mut section, id, !enabled).await
    }

    async fn set_enabled_locked(
        &self,
        section: &mut Section<'_>,
        id: u64,
        enabled: bool,
    ) -> Result<(Source, Regeneration)> {
        let source = self.store.update_source(
            id,
            &SourceUpdate {
                enabled: Some(enabled),
                ..Default::default()
            },
        )?;
        info!(
            "{} block list {}",
            if enabled { "Enabled" } else { "Disabled" },
            source.name
        );

        let regeneration = self.regenerate_locked(section).await?;
        Ok((source, regeneration))
    }

    /// Update descriptive fields of a source. Changing `enabled` regenerates.
    pub async fn update_source(
        &self,
        id: u64,
        update: &SourceUpdate,
    ) -> Result<(Source, Option<Regeneration>)> {
        let mut section = self.enter().await?;
        let before = self.source(id)?;

        let update = SourceUpdate {
            name: update.name.clone(),
            category: update.category.clone(),
            enabled: update.enabled,
            description: update.description.clone(),
            ..Default::default()
        };
        let source = self.store.update_source(id, &update)?;

        let regeneration = if source.enabled != before.enabled {
            Some(self.regenerate_locked(&mut section).await?)
        } else {
            None
        };
        Ok((source, regeneration))
    }

    /// Re-parse a source's last raw download without fetching it again.
    ///
    /// Returns `None` when no raw download is cached. Regenerates when the
    /// source is enabled.
    pub async fn reparse_source(
        &self,
        id: u64,
    ) -> Result<(Source, Option<usize>, Option<Regeneration>)> {
        let mut section = self.enter().await?;
        let source = self.source(id)?;

        let Some(count) = self.reconciler.reparse(&source)? else {
            return Ok((source, None, None));
        };
        info!("Re-parsed {} - {} domains", source.name, count);
        let regeneration = if source.enabled {
            Some(self.regenerate_locked(&mut section).await?)
        } else {
            None
        };
        Ok((self.source(id)?, Some(count), regeneration))
    }

    pub fn source_statuses(&self, now: DateTime<Utc>) -> Result<Vec<SourceStatus>> {
        let interval = chrono::Duration::from_std(self.settings.update_interval)
            .context("Update interval out of range")?;
        Ok(self
            .store
            .list_sources(&SourceFilter::default())?
            .into_iter()
            .map(|s| self.reconciler.status(s, interval, now))
            .collect())
    }

    pub async fn add_entry(
        &self,
        kind: ListKind,
        domain: &str,
        category: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
        notes: &str,
    ) -> Result<(ListEntry, Regeneration)> {
        let mut section = self.enter().await?;
        let category = category.unwrap_or(&self.settings.default_category);
        let entry = self
            .lists
            .add(kind, domain, Some(category), expires_at, notes)?;
        let regeneration = self.regenerate_locked(&mut section).await?;
        Ok((entry, regeneration))
    }

    pub async fn remove_entry(&self, kind: ListKind, id: u64) -> Result<(ListEntry, Regeneration)> {
        let mut section = self.enter().await?;
        let entry = self.lists.remove(kind, id)?;
        let regeneration = self.regenerate_locked(&mut section).await?;
        Ok((entry, regeneration))
    }

    pub async fn update_entry(
        &self,
        kind: ListKind,
        id: u64,
        update: &EntryUpdate,
    ) -> Result<(ListEntry, Regeneration)> {
        let mut section = self.enter().await?;
        let entry = self.lists.update(kind, id, update)?;
        let regeneration = self.regenerate_locked(&mut section).await?;
        Ok((entry, regeneration))
    }

    /// Import entries; regenerates when at least one was added.
    pub async fn import_entries(
        &self,
        kind: ListKind,
        records: &[ImportRecord],
    ) -> Result<(ImportReport, Option<Regeneration>)> {
        let mut section = self.enter().await?;
        let report = self
            .lists
            .import(kind, records, &self.settings.default_category)?;
        let regeneration = if report.added > 0 {
            Some(self.regenerate_locked(&mut section).await?)
        } else {
            None
        };
        Ok((report, regeneration))
    }

    /// Delete expired entries and orphaned cache files.
    ///
    /// The configuration is regenerated only when an entry was deleted.
    pub async fn cleanup(&self, now: DateTime<Utc>) -> Result<CleanupSummary> {
        let mut section = self.enter().await?;

        let entries = self.lists.cleanup_expired(now)?;
        let orphaned_files = match self.reconciler.cleanup_orphans() {
            Ok(n) => n,
            Err(e) => {
                warn!("Failed to clean up orphaned list files: {:#}", e);
                0
            }
        };

        let regeneration = if entries.total() > 0 {
            Some(self.regenerate_locked(&mut section).await?)
        } else {
            None
        };
        Ok(CleanupSummary {
            entries,
            orphaned_files,
            regeneration,
        })
    }

    /// Decide whether `domain` is blocked right now.
    ///
    /// This is exact membership of the normalized domain. The generated
    /// `address=/d/` directives also sinkhole every subdomain of `d`, so
    /// [`Verdict::NotListed`] does not mean dnsmasq will resolve it.
    pub async fn check(&self, domain: &str) -> Result<Verdict> {
        let domain = validate_domain(domain)?;
        let now = Utc::now();
        let stale_after = chrono::Duration::from_std(self.settings.stale_after)
            .context("Staleness bound out of range")?;

        let mut guard = self.combined.lock().await;
        let fresh = guard
            .as_ref()
            .map(|c| !c.is_stale(now, stale_after))
            .unwrap_or(false);
        if !fresh {
            *guard = Some(self.reconciler.rebuild_combined()?);
        }
        let combined = guard
            .as_ref()
            .context("Combined block set unavailable")?;

        let overrides = self.lists.overrides(now)?;
        Ok(decide(&domain, combined, &overrides))
    }

    pub async fn statistics(&self, now: DateTime<Utc>) -> Result<PipelineStatistics> {
        let sources = self.store.list_sources(&SourceFilter::default())?;
        let blocked_domains = self.reconciler.rebuild_combined()?.len();
        Ok(PipelineStatistics {
            sources_total: sources.len(),
            sources_enabled: sources.iter().filter(|s| s.enabled).count(),
            blocked_domains,
            cache_bytes: self.reconciler.cache().disk_usage(),
            lists: self.lists.statistics(now)?,
        })
    }
}
