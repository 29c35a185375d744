//! Per-source list files on disk.
//!
//! Each source owns two files in the block lists directory:
//! - `blocklist_<id>.raw`: the last successful download, verbatim
//! - `blocklist_<id>.txt`: its DomainSet, one normalized domain per line
//!
//! Both are replaced atomically, so an interrupted refresh leaves the previous
//! version intact.

use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::parser::{parse_list, serialize_domains};
use crate::utils::write_atomic;

const FILE_PREFIX: &str = "blocklist_";
const DOMAIN_SET_EXT: &str = "txt";
const RAW_EXT: &str = "raw";

/// Handle on the block lists directory.
#[derive(Debug, Clone)]
pub struct ListCache {
    dir: PathBuf,
}

impl ListCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn domain_set_path(&self, id: u64) -> PathBuf {
        self.dir
            .join(format!("{}{}.{}", FILE_PREFIX, id, DOMAIN_SET_EXT))
    }

    pub fn raw_path(&self, id: u64) -> PathBuf {
        self.dir.join(format!("{}{}.{}", FILE_PREFIX, id, RAW_EXT))
    }

    pub fn has_domain_set(&self, id: u64) -> bool {
        self.domain_set_path(id).is_file()
    }

    pub fn write_raw(&self, id: u64, body: &[u8]) -> Result<()> {
        write_atomic(&self.raw_path(id), body)
    }

    /// Last raw download, if any.
    pub fn read_raw(&self, id: u64) -> Result<Option<Vec<u8>>> {
        let path = self.raw_path(id);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {:?}", path)),
        }
    }

    pub fn write_domain_set(&self, id: u64, domains: &BTreeSet<String>) -> Result<()> {
        let path = self.domain_set_path(id);
        write_atomic(&path, serialize_domains(domains).as_bytes())?;
        debug!("Wrote {} domains to {:?}", domains.len(), path);
        Ok(())
    }

    /// Read a DomainSet back. A source that was never fetched has an empty set.
    pub fn read_domain_set(&self, id: u64) -> Result<BTreeSet<String>> {
        let path = self.domain_set_path(id);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(parse_list(&content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeSet::new()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {:?}", path)),
        }
    }

    /// Delete both files of a source. Missing files are not an error.
    pub fn remove(&self, id: u64) -> Result<()> {
        for path in [self.domain_set_path(id), self.raw_path(id)] {
            match fs::remove_file(&path) {
                Ok(()) => debug!("Removed {:?}", path),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e).with_context(|| format!("Failed to remove {:?}", path)),
            }
        }
        Ok(())
    }

    /// Source ids that have at least one file in the directory.
    pub fn cached_ids(&self) -> Result<BTreeSet<u64>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to list {:?}", self.dir));
            }
        };

        let mut ids = BTreeSet::new();
        for entry in entries.flatten() {
            if let Some(id) = entry.file_name().to_str().and_then(parse_file_id) {
                ids.insert(id);
            }
        }
        Ok(ids)
    }

    /// Remove files whose source id is not in `known`. Returns the number of
    /// sources whose files were removed.
    pub fn cleanup_orphans(&self, known: &HashSet<u64>) -> Result<usize> {
        let mut removed = 0;
        for id in self.cached_ids()? {
            if known.contains(&id) {
                continue;
            }
            match self.remove(id) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove orphaned list {}: {:#}", id, e),
            }
        }
        Ok(removed)
    }

    /// Total size of all cached files in bytes.
    pub fn disk_usage(&self) -> u64 {
        fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .flatten()
                    .filter(|e| e.file_name().to_str().and_then(parse_file_id).is_some())
                    .filter_map(|e| e.metadata().ok())
                    .map(|m| m.len())
                    .sum()
            })
            .unwrap_or(0)
    }
}

/// `blocklist_12.txt` / `blocklist_12.raw` -> 12
fn parse_file_id(name: &str) -> Option<u64> {
    let rest = name.strip_prefix(FILE_PREFIX)?;
    let (id, ext) = rest.split_once('.')?;
    if ext != DOMAIN_SET_EXT && ext != RAW_EXT {
        return None;
    }
    id.parse().ok()
}
