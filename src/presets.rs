//! Predefined block list sources and well-known categories.
//!
//! Predefined sources are seeded into the store on first run. Their URLs are
//! protected: a source carrying one of them can be disabled but never removed,
//! and no second source may be added with the same URL.

use tracing::{debug, info};

use crate::model::NewSource;
use crate::store::{Store, StoreResult};

/// Well-known source categories. Any other string is accepted as a custom
/// category.
pub const CATEGORIES: &[&str] = &["ads", "trackers", "malware", "phishing", "social", "adult"];

/// Category used for user-added sources and entries when none is given
pub const DEFAULT_CATEGORY: &str = "custom";

/// Definition of a predefined block list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredefinedSource {
    pub name: &'static str,
    pub url: &'static str,
    pub category: &'static str,
    pub description: &'static str,
}

pub const PREDEFINED_SOURCES: &[PredefinedSource] = &[
    PredefinedSource {
        name: "StevenBlack's Ad Block List",
        url: "https://raw.githubusercontent.com/StevenBlack/hosts/master/hosts",
        category: "ads",
        description: "Unified hosts file with base extensions",
    },
    PredefinedSource {
        name: "EasyList",
        url: "https://easylist.to/easylist/easylist.txt",
        category: "ads",
        description: "Primary AdBlock filter list",
    },
    PredefinedSource {
        name: "EasyPrivacy",
        url: "https://easylist.to/easylist/easyprivacy.txt",
        category: "trackers",
        description: "Tracking and telemetry domains",
    },
    PredefinedSource {
        name: "Malware Domain List",
        url: "https://badsites.com/badlist/hosts.txt",
        category: "malware",
        description: "Known malware distribution domains",
    },
    PredefinedSource {
        name: "PhishTank",
        url: "https://raw.githubusercontent.com/mitchellkrogza/Phishing.Database/master/phishing-domains-ACTIVE.txt",
        category: "phishing",
        description: "Active phishing domains",
    },
];

/// Whether `url` belongs to a predefined source.
pub fn is_protected_url(url: &str) -> bool {
    PREDEFINED_SOURCES.iter().any(|p| p.url == url)
}

/// Whether `category` is one of the well-known categories (or `custom`).
pub fn is_known_category(category: &str) -> bool {
    category == DEFAULT_CATEGORY || CATEGORIES.contains(&category)
}

/// Create every predefined source missing from the store. Returns how many
/// were added. Existing records (even disabled ones) are left alone.
pub fn seed_predefined(store: &dyn Store) -> StoreResult<usize> {
    let mut added = 0;
    for predefined in PREDEFINED_SOURCES {
        if store.find_source_by_url(predefined.url)?.is_some() {
            debug!("Predefined source already present: {}", predefined.name);
            continue;
        }
        store.create_source(NewSource {
            name: predefined.name.to_string(),
            url: Some(predefined.url.to_string()),
            category: predefined.category.to_string(),
            enabled: true,
            description: predefined.description.to_string(),
        })?;
        info!("Added predefined block list: {}", predefined.name);
        added += 1;
    }
    Ok(added)
}
