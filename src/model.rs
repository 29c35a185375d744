//! Record types shared by the store, the reconciler and the list manager.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A configured provider of a domain block list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: u64,
    pub name: String,
    /// Absent for purely local entries
    pub url: Option<String>,
    pub category: String,
    pub enabled: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub entry_count: usize,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a source.
#[derive(Debug, Clone, Default)]
pub struct NewSource {
    pub name: String,
    pub url: Option<String>,
    pub category: String,
    pub enabled: bool,
    pub description: String,
}

/// Partial update of a source. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct SourceUpdate {
    pub name: Option<String>,
    pub category: Option<String>,
    pub enabled: Option<bool>,
    pub description: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    pub entry_count: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct SourceFilter {
    pub enabled: Option<bool>,
    pub category: Option<String>,
}

impl SourceFilter {
    pub fn enabled() -> Self {
        Self {
            enabled: Some(true),
            category: None,
        }
    }

    pub fn matches(&self, source: &Source) -> bool {
        self.enabled.map_or(true, |e| source.enabled == e)
            && self
                .category
                .as_deref()
                .map_or(true, |c| source.category == c)
    }
}

/// Which override list an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Whitelist,
    Blacklist,
}

impl ListKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListKind::Whitelist => "whitelist",
            ListKind::Blacklist => "blacklist",
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single whitelist or blacklist override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
    pub id: u64,
    pub domain: String,
    pub category: String,
    /// `None` means the entry never expires
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ListEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        is_expired(self.expires_at, now)
    }
}

/// An entry is expired once its expiry time lies strictly in the past.
pub fn is_expired(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    matches!(expires_at, Some(at) if at < now)
}

#[derive(Debug, Clone, Default)]
pub struct NewEntry {
    pub domain: String,
    pub category: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: String,
}

/// Partial update of a list entry.
///
/// `expires_at: Some(None)` clears the expiry.
#[derive(Debug, Clone, Default)]
pub struct EntryUpdate {
    pub category: Option<String>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub notes: Option<String>,
}

impl EntryUpdate {
    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.expires_at.is_none() && self.notes.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    pub category: Option<String>,
}
