//! Record store for sources and whitelist/blacklist entries.
//!
//! [`Store`] is the persistence boundary used by the pipeline. [`JsonStore`]
//! keeps every table in one JSON document that is rewritten atomically after
//! each mutation; [`JsonStore::in_memory`] skips the file entirely.
//!
//! Uniqueness: a source URL appears at most once across all sources, and a
//! domain at most once per list kind.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use crate::model::{
    EntryFilter, EntryUpdate, ListEntry, ListKind, NewEntry, NewSource, Source, SourceFilter,
    SourceUpdate,
};
use crate::utils::write_atomic;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with the same unique key already exists
    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("record {0} not found")]
    NotFound(u64),

    #[error("{0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persistence operations for sources and list entries.
pub trait Store: Send + Sync {
    fn create_source(&self, new: NewSource) -> StoreResult<Source>;
    fn get_source(&self, id: u64) -> StoreResult<Option<Source>>;
    fn find_source_by_url(&self, url: &str) -> StoreResult<Option<Source>>;
    fn list_sources(&self, filter: &SourceFilter) -> StoreResult<Vec<Source>>;
    fn update_source(&self, id: u64, update: &SourceUpdate) -> StoreResult<Source>;
    /// Returns `false` if no such source existed.
    fn delete_source(&self, id: u64) -> StoreResult<bool>;

    fn create_entry(&self, kind: ListKind, new: NewEntry) -> StoreResult<ListEntry>;
    fn get_entry(&self, kind: ListKind, id: u64) -> StoreResult<Option<ListEntry>>;
    fn find_entry_by_domain(&self, kind: ListKind, domain: &str)
        -> StoreResult<Option<ListEntry>>;
    fn list_entries(&self, kind: ListKind, filter: &EntryFilter) -> StoreResult<Vec<ListEntry>>;
    fn update_entry(&self, kind: ListKind, id: u64, update: &EntryUpdate)
        -> StoreResult<ListEntry>;
    fn delete_entry(&self, kind: ListKind, id: u64) -> StoreResult<bool>;

    /// Drop cached state and re-read the backing storage.
    ///
    /// Called at the start of every critical section, since another process
    /// may have written the store in the meantime.
    fn reload(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct Tables {
    next_source_id: u64,
    next_entry_id: u64,
    sources: BTreeMap<u64, Source>,
    whitelist: BTreeMap<u64, ListEntry>,
    blacklist: BTreeMap<u64, ListEntry>,
}

impl Tables {
    fn entries(&self, kind: ListKind) -> &BTreeMap<u64, ListEntry> {
        match kind {
            ListKind::Whitelist => &self.whitelist,
            ListKind::Blacklist => &self.blacklist,
        }
    }

    fn entries_mut(&mut self, kind: ListKind) -> &mut BTreeMap<u64, ListEntry> {
        match kind {
            ListKind::Whitelist => &mut self.whitelist,
            ListKind::Blacklist => &mut self.blacklist,
        }
    }

    fn next_source_id(&mut self) -> u64 {
        let highest = self.sources.keys().max().copied().unwrap_or(0);
        self.next_source_id = self.next_source_id.max(highest) + 1;
        self.next_source_id
    }

    fn next_entry_id(&mut self) -> u64 {
        let highest = self
            .whitelist
            .keys()
            .chain(self.blacklist.keys())
            .max()
            .copied()
            .unwrap_or(0);
        self.next_entry_id = self.next_entry_id.max(highest) + 1;
        self.next_entry_id
    }
}

fn load_tables(path: &Path) -> StoreResult<Tables> {
    match fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Ok(Tables::default()),
        Ok(content) => serde_json::from_str(&content).map_err(|e| {
            StoreError::Backend(format!("Failed to parse store {:?}: {}", path, e))
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Tables::default()),
        Err(e) => Err(StoreError::Backend(format!(
            "Failed to read store {:?}: {}",
            path, e
        ))),
    }
}

/// JSON document store.
pub struct JsonStore {
    path: Option<PathBuf>,
    tables: Mutex<Tables>,
}

impl JsonStore {
    /// Open (or create on first write) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let tables = load_tables(&path)?;

        Ok(Self {
            path: Some(path),
            tables: Mutex::new(tables),
        })
    }

    /// A store that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            tables: Mutex::new(Tables::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
    }

    /// Apply `f` to a copy of the tables, persist, then commit. A failed
    /// mutation or write leaves the in-memory state untouched.
    fn mutate<T>(&self, f: impl FnOnce(&mut Tables) -> StoreResult<T>) -> StoreResult<T> {
        let mut guard = self.lock()?;
        let mut next = guard.clone();
        let result = f(&mut next)?;
        self.persist(&next)?;
        *guard = next;
        Ok(result)
    }

    fn persist(&self, tables: &Tables) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_vec_pretty(tables)
            .map_err(|e| StoreError::Backend(format!("Failed to serialize store: {}", e)))?;
        write_atomic(path, &json)
            .map_err(|e| StoreError::Backend(format!("Failed to write store: {:#}", e)))
    }
}

impl Store for JsonStore {
    fn create_source(&self, new: NewSource) -> StoreResult<Source> {
        self.mutate(|t| {
            if let Some(url) = &new.url {
                if t.sources.values().any(|s| s.url.as_ref() == Some(url)) {
                    return Err(StoreError::Duplicate(url.clone()));
                }
            }
            let now = Utc::now();
            let source = Source {
                id: t.next_source_id(),
                name: new.name,
                url: new.url,
                category: new.category,
                enabled: new.enabled,
                last_updated: None,
                entry_count: 0,
                description: new.description,
                created_at: now,
                updated_at: now,
            };
            t.sources.insert(source.id, source.clone());
            Ok(source)
        })
    }

    fn get_source(&self, id: u64) -> StoreResult<Option<Source>> {
        Ok(self.lock()?.sources.get(&id).cloned())
    }

    fn find_source_by_url(&self, url: &str) -> StoreResult<Option<Source>> {
        Ok(self
            .lock()?
            .sources
            .values()
            .find(|s| s.url.as_deref() == Some(url))
            .cloned())
    }

    fn list_sources(&self, filter: &SourceFilter) -> StoreResult<Vec<Source>> {
        Ok(self
            .lock()?
            .sources
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }

    fn update_source(&self, id: u64, update: &SourceUpdate) -> StoreResult<Source> {
        self.mutate(|t| {
            let source = t.sources.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            if let Some(name) = &update.name {
                source.name = name.clone();
            }
            if let Some(category) = &update.category {
                source.category = category.clone();
            }
            if let Some(enabled) = update.enabled {
                source.enabled = enabled;
            }
            if let Some(description) = &update.description {
                source.description = description.clone();
            }
            if let Some(last_updated) = update.last_updated {
                source.last_updated = Some(last_updated);
            }
            if let Some(count) = update.entry_count {
                source.entry_count = count;
            }
            source.updated_at = Utc::now();
            Ok(source.clone())
        })
    }

    fn delete_source(&self, id: u64) -> StoreResult<bool> {
        if !self.lock()?.sources.contains_key(&id) {
            return Ok(false);
        }
        self.mutate(|t| Ok(t.sources.remove(&id).is_some()))
    }

    fn create_entry(&self, kind: ListKind, new: NewEntry) -> StoreResult<ListEntry> {
        self.mutate(|t| {
            if t.entries(kind).values().any(|e| e.domain == new.domain) {
                return Err(StoreError::Duplicate(new.domain.clone()));
            }
            let now = Utc::now();
            let entry = ListEntry {
                id: t.next_entry_id(),
                domain: new.domain,
                category: new.category,
                expires_at: new.expires_at,
                notes: new.notes,
                created_at: now,
                updated_at: now,
            };
            t.entries_mut(kind).insert(entry.id, entry.clone());
            Ok(entry)
        })
    }

    fn get_entry(&self, kind: ListKind, id: u64) -> StoreResult<Option<ListEntry>> {
        Ok(self.lock()?.entries(kind).get(&id).cloned())
    }

    fn find_entry_by_domain(
        &self,
        kind: ListKind,
        domain: &str,
    ) -> StoreResult<Option<ListEntry>> {
        Ok(self
            .lock()?
            .entries(kind)
            .values()
            .find(|e| e.domain == domain)
            .cloned())
    }

    fn list_entries(&self, kind: ListKind, filter: &EntryFilter) -> StoreResult<Vec<ListEntry>> {
        Ok(self
            .lock()?
            .entries(kind)
            .values()
            .filter(|e| {
                filter
                    .category
                    .as_deref()
                    .map_or(true, |c| e.category == c)
            })
            .cloned()
            .collect())
    }

    fn update_entry(
        &self,
        kind: ListKind,
        id: u64,
        update: &EntryUpdate,
    ) -> StoreResult<ListEntry> {
        self.mutate(|t| {
            let entry = t
                .entries_mut(kind)
                .get_mut(&id)
                .ok_or(StoreError::NotFound(id))?;
            if let Some(category) = &update.category {
                entry.category = category.clone();
            }
            if let Some(expires_at) = update.expires_at {
                entry.expires_at = expires_at;
            }
            if let Some(notes) = &update.notes {
                entry.notes = notes.clone();
            }
            entry.updated_at = Utc::now();
            Ok(entry.clone())
        })
    }

    fn delete_entry(&self, kind: ListKind, id: u64) -> StoreResult<bool> {
        if !self.lock()?.entries(kind).contains_key(&id) {
            return Ok(false);
        }
        self.mutate(|t| Ok(t.entries_mut(kind).remove(&id).is_some()))
    }

    fn reload(&self) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let tables = load_tables(path)?;
        *self.lock()? = tables;
        Ok(())
    }
}
