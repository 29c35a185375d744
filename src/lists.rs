//! Whitelist and blacklist entry management.
//!
//! Every domain goes through the same normalization as block list entries
//! before it is stored, so lookups compare like with like. These operations
//! only touch the store; regenerating the resolver configuration afterwards is
//! the caller's job (see [`crate::manager::ListPipeline`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{PidnsError, Result};
use crate::membership::Overrides;
use crate::model::{EntryFilter, EntryUpdate, ListEntry, ListKind, NewEntry};
use crate::presets::DEFAULT_CATEGORY;
use crate::store::{Store, StoreError};
use crate::validation::{parse_expiry, validate_domain};

/// One record of a batch import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ImportRecord {
    #[serde(default)]
    pub domain: String,
    pub category: Option<String>,
    /// ISO-8601 timestamp or date
    pub expires_at: Option<String>,
    pub notes: Option<String>,
}

impl ImportRecord {
    pub fn domain(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Default::default()
        }
    }
}

/// Read an import file: either a JSON array of records, or plain text with
/// one domain per line (`#` comments allowed).
pub fn parse_import(content: &str) -> std::result::Result<Vec<ImportRecord>, serde_json::Error> {
    if content.trim_start().starts_with('[') {
        return serde_json::from_str(content);
    }
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(ImportRecord::domain)
        .collect())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub added: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub whitelist: usize,
    pub blacklist: usize,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.whitelist + self.blacklist
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KindStatistics {
    pub total: usize,
    pub active: usize,
    pub expired: usize,
    /// Active entries per category
    pub categories: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListStatistics {
    pub whitelist: KindStatistics,
    pub blacklist: KindStatistics,
}

/// Store-level operations on override entries.
pub struct ListManager {
    store: Arc<dyn Store>,
}

impl ListManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Add a domain to a list.
    pub fn add(
        &self,
        kind: ListKind,
        domain: &str,
        category: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
        notes: &str,
    ) -> Result<ListEntry> {
        let domain = validate_domain(domain)?;
        let entry = self
            .store
            .create_entry(
                kind,
                NewEntry {
                    domain: domain.clone(),
                    category: category.unwrap_or(DEFAULT_CATEGORY).to_string(),
                    expires_at,
                    notes: notes.to_string(),
                },
            )
            .map_err(|e| duplicate_entry(e, kind, &domain))?;
        info!("Added {} to {}", entry.domain, kind);
        Ok(entry)
    }

    /// Remove an entry, returning it.
    pub fn remove(&self, kind: ListKind, id: u64) -> Result<ListEntry> {
        let entry = self
            .store
            .get_entry(kind, id)?
            .ok_or(PidnsError::EntryNotFound { kind, id })?;
        self.store.delete_entry(kind, id)?;
        info!("Removed {} from {}", entry.domain, kind);
        Ok(entry)
    }

    pub fn update(&self, kind: ListKind, id: u64, update: &EntryUpdate) -> Result<ListEntry> {
        self.store
            .update_entry(kind, id, update)
            .map_err(|e| match e {
                StoreError::NotFound(_) => PidnsError::EntryNotFound { kind, id },
                other => other.into(),
            })
    }

    /// Entries of a list, ordered by domain.
    pub fn list(
        &self,
        kind: ListKind,
        category: Option<&str>,
        include_expired: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<ListEntry>> {
        let filter = EntryFilter {
            category: category.map(str::to_string),
        };
        let mut entries: Vec<ListEntry> = self
            .store
            .list_entries(kind, &filter)?
            .into_iter()
            .filter(|e| include_expired || !e.is_expired(now))
            .collect();
        entries.sort_by(|a, b| a.domain.cmp(&b.domain));
        Ok(entries)
    }

    /// Add many records at once.
    ///
    /// Empty domains and domains already on the list are skipped; invalid
    /// domains and unparseable dates are reported per record and do not stop
    /// the batch.
    pub fn import(
        &self,
        kind: ListKind,
        records: &[ImportRecord],
        default_category: &str,
    ) -> Result<ImportReport> {
        let mut report = ImportReport::default();
        let mut seen = HashSet::new();

        for record in records {
            let raw = record.domain.trim();
            if raw.is_empty() {
                report.skipped += 1;
                continue;
            }

            let domain = match validate_domain(raw) {
                Ok(domain) => domain,
                Err(e) => {
                    report.errors.push(e.to_string());
                    continue;
                }
            };

            if !seen.insert(domain.clone()) || self.store.find_entry_by_domain(kind, &domain)?.is_some() {
                report.skipped += 1;
                continue;
            }

            let expires_at = match record.expires_at.as_deref().filter(|s| !s.trim().is_empty()) {
                None => None,
                Some(value) => match parse_expiry(value) {
                    Ok(at) => Some(at),
                    Err(_) => {
                        report
                            .errors
                            .push(format!("Invalid expiration date for {}", domain));
                        continue;
                    }
                },
            };

            match self.store.create_entry(
                kind,
                NewEntry {
                    domain: domain.clone(),
                    category: record
                        .category
                        .clone()
                        .unwrap_or_else(|| default_category.to_string()),
                    expires_at,
                    notes: record.notes.clone().unwrap_or_default(),
                },
            ) {
                Ok(_) => report.added += 1,
                Err(StoreError::Duplicate(_)) => report.skipped += 1,
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            "Imported {} entries to {} ({} skipped, {} errors)",
            report.added,
            kind,
            report.skipped,
            report.errors.len()
        );
        Ok(report)
    }

    /// Entries for export (expired ones included).
    pub fn export(&self, kind: ListKind, category: Option<&str>) -> Result<Vec<ListEntry>> {
        self.list(kind, category, true, Utc::now())
    }

    /// Delete every expired entry of both lists.
    pub fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();
        for kind in [ListKind::Whitelist, ListKind::Blacklist] {
            let expired: Vec<ListEntry> = self
                .store
                .list_entries(kind, &EntryFilter::default())?
                .into_iter()
                .filter(|e| e.is_expired(now))
                .collect();

            let mut removed = 0;
            for entry in expired {
                match self.store.delete_entry(kind, entry.id) {
                    Ok(true) => removed += 1,
                    Ok(false) => {}
                    Err(e) => warn!("Failed to delete expired {} entry {}: {}", kind, entry.id, e),
                }
            }

            match kind {
                ListKind::Whitelist => report.whitelist = removed,
                ListKind::Blacklist => report.blacklist = removed,
            }
        }

        if report.total() > 0 {
            info!(
                "Cleaned up {} expired whitelist and {} expired blacklist entries",
                report.whitelist, report.blacklist
            );
        }
        Ok(report)
    }

    /// Active overrides at `now`.
    pub fn overrides(&self, now: DateTime<Utc>) -> Result<Overrides> {
        let whitelist = self
            .store
            .list_entries(ListKind::Whitelist, &EntryFilter::default())?;
        let blacklist = self
            .store
            .list_entries(ListKind::Blacklist, &EntryFilter::default())?;
        Ok(Overrides::active(&whitelist, &blacklist, now))
    }

    pub fn statistics(&self, now: DateTime<Utc>) -> Result<ListStatistics> {
        Ok(ListStatistics {
            whitelist: self.kind_statistics(ListKind::Whitelist, now)?,
            blacklist: self.kind_statistics(ListKind::Blacklist, now)?,
        })
    }

    fn kind_statistics(&self, kind: ListKind, now: DateTime<Utc>) -> Result<KindStatistics> {
        let entries = self.store.list_entries(kind, &EntryFilter::default())?;
        let mut stats = KindStatistics {
            total: entries.len(),
            ..Default::default()
        };
        for entry in entries.iter().filter(|e| !e.is_expired(now)) {
            stats.active += 1;
            *stats.categories.entry(entry.category.clone()).or_default() += 1;
        }
        stats.expired = stats.total - stats.active;
        Ok(stats)
    }
}

fn duplicate_entry(err: StoreError, kind: ListKind, domain: &str) -> PidnsError {
    match err {
        StoreError::Duplicate(_) => PidnsError::DuplicateEntry {
            kind,
            domain: domain.to_string(),
        },
        other => other.into(),
    }
}
