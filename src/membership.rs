//! Membership decisions.
//!
//! A domain is blocked when it is in the combined block set or on an active
//! blacklist entry, unless an active whitelist entry exists for it. The
//! whitelist always wins. Expired entries are ignored here; they are only
//! deleted by the cleanup pass.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::model::ListEntry;
use crate::reconciler::CombinedBlockSet;

/// Active (non-expired) whitelist and blacklist domains.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    whitelist: BTreeMap<String, u64>,
    blacklist: BTreeMap<String, u64>,
}

impl Overrides {
    /// Keep only the entries that are not expired at `now`.
    pub fn active(whitelist: &[ListEntry], blacklist: &[ListEntry], now: DateTime<Utc>) -> Self {
        let collect = |entries: &[ListEntry]| -> BTreeMap<String, u64> {
            entries
                .iter()
                .filter(|e| !e.is_expired(now))
                .map(|e| (e.domain.clone(), e.id))
                .collect()
        };
        Self {
            whitelist: collect(whitelist),
            blacklist: collect(blacklist),
        }
    }

    pub fn whitelist(&self) -> impl Iterator<Item = &String> {
        self.whitelist.keys()
    }

    pub fn blacklist(&self) -> impl Iterator<Item = &String> {
        self.blacklist.keys()
    }

    pub fn is_whitelisted(&self, domain: &str) -> bool {
        self.whitelist.contains_key(domain)
    }

    pub fn is_blacklisted(&self, domain: &str) -> bool {
        self.blacklist.contains_key(domain)
    }
}

/// The outcome of a membership check, with the rule that decided it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Verdict {
    /// Allowed by an active whitelist entry
    Whitelisted { entry_id: u64 },
    /// Blocked by an active blacklist entry
    Blacklisted { entry_id: u64 },
    /// Blocked by one or more enabled block lists
    BlockList { sources: Vec<u64> },
    /// The exact name is on no list. A listed parent domain still makes
    /// dnsmasq sinkhole it.
    NotListed,
}

impl Verdict {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Verdict::Blacklisted { .. } | Verdict::BlockList { .. })
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Whitelisted { entry_id } => {
                write!(f, "allowed (whitelist entry {})", entry_id)
            }
            Verdict::Blacklisted { entry_id } => {
                write!(f, "blocked (blacklist entry {})", entry_id)
            }
            Verdict::BlockList { sources } => {
                let ids: Vec<String> = sources.iter().map(u64::to_string).collect();
                write!(f, "blocked (block lists {})", ids.join(", "))
            }
            Verdict::NotListed => f.write_str("not listed (exact name)"),
        }
    }
}

/// Decide whether a normalized `domain` is blocked.
pub fn decide(domain: &str, combined: &CombinedBlockSet, overrides: &Overrides) -> Verdict {
    if let Some(&entry_id) = overrides.whitelist.get(domain) {
        return Verdict::Whitelisted { entry_id };
    }
    if let Some(&entry_id) = overrides.blacklist.get(domain) {
        return Verdict::Blacklisted { entry_id };
    }
    let sources = combined.sources_for(domain);
    if !sources.is_empty() {
        return Verdict::BlockList {
            sources: sources.to_vec(),
        };
    }
    Verdict::NotListed
}


#[cfg(test)]
mod proptests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn entry(id: u64, domain: &str, expires_at: Option<DateTime<Utc>>) -> ListEntry {
        let now = Utc::now();
        ListEntry {
            id,
            domain: domain.to_string(),
            category: "custom".to_string(),
            expires_at,
            notes: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    proptest! {
        /// An active whitelist entry always yields "not blocked", and an
        /// active blacklist entry without a whitelist entry always blocks
        #[test]
        fn prop_precedence_law(
            in_block_set: bool,
            whitelisted: bool,
            blacklisted: bool,
            white_expired: bool,
            black_expired: bool,
        ) {
            let now = Utc::now();
            let domain = "ads.example.com";
            let expiry = |expired: bool| if expired { Some(now - Duration::minutes(1)) } else { None };

            let white: Vec<_> = whitelisted.then(|| entry(1, domain, expiry(white_expired))).into_iter().collect();
            let black: Vec<_> = blacklisted.then(|| entry(2, domain, expiry(black_expired))).into_iter().collect();
            let overrides = Overrides::active(&white, &black, now);

            let mut set = BTreeSet::new();
            if in_block_set {
                set.insert(domain.to_string());
            }
            let combined = CombinedBlockSet::from_sets(vec![(1, set)], now);

            let blocked = decide(domain, &combined, &overrides).is_blocked();
            let white_active = whitelisted && !white_expired;
            let black_active = blacklisted && !black_expired;

            if white_active {
                prop_assert!(!blocked);
            } else if black_active {
                prop_assert!(blocked);
            } else {
                prop_assert_eq!(blocked, in_block_set);
            }
        }
    }
}
