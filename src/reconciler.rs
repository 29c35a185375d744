//! Block list reconciliation.
//!
//! Refreshing a source fetches its list, keeps the raw download, parses it and
//! atomically replaces its DomainSet file. Only then are the record's
//! `entry_count` and `last_updated` updated, so a failed refresh leaves both the
//! file and the record exactly as they were.
//!
//! [`Reconciler::rebuild_combined`] recomputes the union of every enabled
//! source's DomainSet from disk, along with a reverse index from each domain to
//! the sources that list it.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::ListCache;
use crate::fetcher::SourceFetcher;
use crate::model::{Source, SourceFilter, SourceUpdate};
use crate::parser::parse_bytes;
use crate::signal::ShutdownToken;
use crate::store::Store;
use crate::utils::format_count;

/// Maximum number of sources fetched concurrently during a batch refresh
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Union of all enabled sources' DomainSets at one point in time.
#[derive(Debug, Clone)]
pub struct CombinedBlockSet {
    /// domain -> ids of the sources listing it (ascending)
    index: BTreeMap<String, Vec<u64>>,
    built_at: DateTime<Utc>,
}

impl CombinedBlockSet {
    pub fn empty(built_at: DateTime<Utc>) -> Self {
        Self {
            index: BTreeMap::new(),
            built_at,
        }
    }

    /// Build from `(source id, DomainSet)` pairs.
    pub fn from_sets<I>(sets: I, built_at: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = (u64, BTreeSet<String>)>,
    {
        let mut index: BTreeMap<String, Vec<u64>> = BTreeMap::new();
        for (id, domains) in sets {
            for domain in domains {
                let ids = index.entry(domain).or_default();
                if let Err(pos) = ids.binary_search(&id) {
                    ids.insert(pos, id);
                }
            }
        }
        Self { index, built_at }
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.index.contains_key(domain)
    }

    /// Sources that contributed `domain`. Empty if it is not in the set.
    pub fn sources_for(&self, domain: &str) -> &[u64] {
        self.index.get(domain).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Domains in sorted order.
    pub fn domains(&self) -> impl Iterator<Item = &String> {
        self.index.keys()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// True once more than `ttl` has elapsed since the set was built.
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.built_at > ttl
    }
}

/// What happened to one source during a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// New DomainSet written with this many domains
    Updated(usize),
    /// The source has no URL
    Skipped,
    /// The batch was cancelled before this source was attempted
    Cancelled,
    /// Fetch or persistence failed; previous state kept
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SourceRefresh {
    pub source_id: u64,
    pub name: String,
    pub outcome: RefreshOutcome,
}

impl SourceRefresh {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RefreshOutcome::Updated(_))
    }
}

/// Result of refreshing several sources.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub results: Vec<SourceRefresh>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &SourceRefresh> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, RefreshOutcome::Failed(_)))
    }

    pub fn was_cancelled(&self) -> bool {
        self.results
            .iter()
            .any(|r| r.outcome == RefreshOutcome::Cancelled)
    }
}

/// Per-source status as shown by `sources status`.
#[derive(Debug, Clone)]
pub struct SourceStatus {
    pub source: Source,
    pub file_exists: bool,
    pub needs_update: bool,
}

/// A source needs an update if it was never fetched or its last fetch is
/// older than `interval`.
pub fn needs_update(source: &Source, interval: Duration, now: DateTime<Utc>) -> bool {
    match source.last_updated {
        None => true,
        Some(at) => now - at > interval,
    }
}

/// Fetches sources and maintains their DomainSet files.
pub struct Reconciler {
    store: Arc<dyn Store>,
    fetcher: Arc<dyn SourceFetcher>,
    cache: ListCache,
    concurrency: usize,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn Store>,
        fetcher: Arc<dyn SourceFetcher>,
        cache: ListCache,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            fetcher,
            cache,
            concurrency: concurrency.max(1),
        }
    }

    pub fn cache(&self) -> &ListCache {
        &self.cache
    }

    /// Fetch one source and replace its DomainSet.
    pub async fn refresh_one(&self, source: &Source) -> SourceRefresh {
        let outcome = match &source.url {
            None => {
                debug!("Skipping {} (no URL)", source.name);
                RefreshOutcome::Skipped
            }
            Some(url) => {
                info!("Fetching {}...", source.name);
                match self.fetcher.fetch(url).await {
                    Ok(body) => match self.store_download(source, body).await {
                        Ok(count) => {
                            info!("Fetched {} - {} domains", source.name, format_count(count));
                            RefreshOutcome::Updated(count)
                        }
                        Err(e) => {
                            warn!("Failed to store {}: {:#}", source.name, e);
                            RefreshOutcome::Failed(format!("{:#}", e))
                        }
                    },
                    Err(e) => {
                        warn!("Failed to fetch {}: {}", source.name, e);
                        RefreshOutcome::Failed(e.to_string())
                    }
                }
            }
        };

        SourceRefresh {
            source_id: source.id,
            name: source.name.clone(),
            outcome,
        }
    }

    /// Persist raw bytes, parse, swap the DomainSet file, then update the record.
    async fn store_download(&self, source: &Source, body: Vec<u8>) -> Result<usize> {
        let cache = self.cache.clone();
        let id = source.id;
        let domains = tokio::task::spawn_blocking(move || -> Result<BTreeSet<String>> {
            cache.write_raw(id, &body)?;
            let domains = parse_bytes(&body);
            cache.write_domain_set(id, &domains)?;
            Ok(domains)
        })
        .await
        .context("Parse task panicked")??;

        let count = domains.len();
        self.store.update_source(
            id,
            &SourceUpdate {
                last_updated: Some(Utc::now()),
                entry_count: Some(count),
                ..Default::default()
            },
        )?;
        Ok(count)
    }

    /// Re-parse the last raw download of a source without refetching.
    pub fn reparse(&self, source: &Source) -> Result<Option<usize>> {
        let Some(body) = self.cache.read_raw(source.id)? else {
            return Ok(None);
        };
        let domains = parse_bytes(&body);
        self.cache.write_domain_set(source.id, &domains)?;
        self.store.update_source(
            source.id,
            &SourceUpdate {
                entry_count: Some(domains.len()),
                ..Default::default()
            },
        )?;
        Ok(Some(domains.len()))
    }

    /// Refresh `sources` with bounded parallelism, waiting for all of them.
    ///
    /// Sources not yet started when `token` is cancelled are reported as
    /// [`RefreshOutcome::Cancelled`].
    pub async fn refresh_batch(&self, sources: &[Source], token: &ShutdownToken) -> BatchReport {
        // Owned items keep the batch future Send for spawned callers
        let results: Vec<SourceRefresh> = stream::iter(sources.to_vec())
            .map(|source| async move {
                if token.is_cancelled() {
                    return SourceRefresh {
                        source_id: source.id,
                        name: source.name,
                        outcome: RefreshOutcome::Cancelled,
                    };
                }
                self.refresh_one(&source).await
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        BatchReport { results }
    }

    /// Union of every enabled source's DomainSet, read fresh from disk.
    ///
    /// An unreadable DomainSet is logged and contributes nothing.
    pub fn rebuild_combined(&self) -> Result<CombinedBlockSet> {
        let sources = self.store.list_sources(&SourceFilter::enabled())?;

        let mut sets = Vec::with_capacity(sources.len());
        for source in &sources {
            match self.cache.read_domain_set(source.id) {
                Ok(domains) => sets.push((source.id, domains)),
                Err(e) => warn!("Skipping {} in rebuild: {:#}", source.name, e),
            }
        }

        let combined = CombinedBlockSet::from_sets(sets, Utc::now());
        info!(
            "Combined {} enabled lists into {} domains",
            sources.len(),
            format_count(combined.len())
        );
        Ok(combined)
    }

    pub fn status(&self, source: Source, interval: Duration, now: DateTime<Utc>) -> SourceStatus {
        SourceStatus {
            file_exists: self.cache.has_domain_set(source.id),
            needs_update: needs_update(&source, interval, now),
            source,
        }
    }

    /// Delete the files of a source that is being removed.
    pub fn remove_files(&self, id: u64) -> Result<()> {
        self.cache.remove(id)
    }

    /// Remove cached files for sources that no longer exist.
    pub fn cleanup_orphans(&self) -> Result<usize> {
        let known: HashSet<u64> = self
            .store
            .list_sources(&SourceFilter::default())?
            .into_iter()
            .map(|s| s.id)
            .collect();
        let removed = self.cache.cleanup_orphans(&known)?;
        if removed > 0 {
            info!("Removed files of {} orphaned lists", removed);
        }
        Ok(removed)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn domain_set() -> impl Strategy<Value = BTreeSet<String>> {
        prop::collection::btree_set("[a-z]{1,6}\\.(com|net|org)", 0..20)
    }

    proptest! {
        /// The combined set is exactly the union of its inputs
        #[test]
        fn prop_combined_is_union(sets in prop::collection::vec(domain_set(), 0..6)) {
            let union: BTreeSet<String> = sets.iter().flatten().cloned().collect();
            let combined = CombinedBlockSet::from_sets(
                sets.iter().cloned().enumerate().map(|(i, s)| (i as u64, s)),
                Utc::now(),
            );
            let domains: BTreeSet<String> = combined.domains().cloned().collect();
            prop_assert_eq!(domains, union);

            for (i, s) in sets.iter().enumerate() {
                for d in s {
                    prop_assert!(combined.sources_for(d).contains(&(i as u64)));
                }
            }
        }
    }
}
