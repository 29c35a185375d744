//! Centralized validation functions for pidns.
//!
//! This module provides unified validation for:
//! - Domain names (the single normalization law shared by list parsing and
//!   user-submitted whitelist/blacklist entries)
//! - Block list URLs
//! - Time intervals (scheduler format)
//! - Expiry timestamps

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::Url;
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::error::PidnsError;

/// Shortest domain accepted (e.g. `x.io`)
const MIN_DOMAIN_LEN: usize = 4;

/// RFC 1035 limits
const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// More labels than this is treated as a malformed entry
const MAX_LABELS: usize = 5;

/// Suffixes that never reach the public resolver
const LOCAL_SUFFIXES: &[&str] = &[".local", ".localhost"];

/// Normalize a candidate domain, returning `None` when it is rejected.
///
/// The token is trimmed and lowercased (a trailing root dot is dropped), then
/// accepted only if:
/// - it is at least 4 characters long,
/// - it does not end in `.local` or `.localhost`,
/// - it is not a bare IPv4 literal,
/// - it only contains letters, digits, hyphens and dots, has no empty label,
///   and its last label is at least two letters,
/// - it has at most 5 labels.
///
/// # Examples
/// ```
/// use pidns::validation::normalize_domain;
/// assert_eq!(normalize_domain("  Ads.Example.COM "), Some("ads.example.com".to_string()));
/// assert_eq!(normalize_domain("printer.local"), None);
/// assert_eq!(normalize_domain("10.0.0.1"), None);
/// ```
pub fn normalize_domain(raw: &str) -> Option<String> {
    let lowered = raw.trim().to_ascii_lowercase();
    let domain = lowered.strip_suffix('.').unwrap_or(&lowered);

    if !domain.is_ascii() || domain.len() < MIN_DOMAIN_LEN || domain.len() > MAX_DOMAIN_LEN {
        return None;
    }

    if LOCAL_SUFFIXES.iter().any(|suffix| domain.ends_with(suffix)) {
        return None;
    }

    if domain.parse::<Ipv4Addr>().is_ok() || is_dotted_quad(domain) {
        return None;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.len() > MAX_LABELS {
        return None;
    }

    let labels_ok = labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && label
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    });
    if !labels_ok {
        return None;
    }

    // Safe: labels has at least two elements
    let tld = labels[labels.len() - 1];
    if tld.len() < 2 || !tld.chars().all(|c| c.is_ascii_lowercase()) {
        return None;
    }

    Some(domain.to_string())
}

/// Four all-digit labels, whether or not each octet fits in a byte
fn is_dotted_quad(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    parts.len() == 4
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// Normalize a user-submitted domain or explain why it was rejected.
pub fn validate_domain(raw: &str) -> Result<String, PidnsError> {
    normalize_domain(raw).ok_or_else(|| PidnsError::InvalidDomain(raw.trim().to_string()))
}

/// Validate a block list URL: it needs an http(s) scheme and a host.
///
/// # Examples
/// ```
/// use pidns::validation::validate_url;
/// assert!(validate_url("https://example.com/hosts.txt").is_ok());
/// assert!(validate_url("example.com/hosts.txt").is_err());
/// ```
pub fn validate_url(url: &str) -> Result<String, PidnsError> {
    let url = url.trim();
    let invalid = || PidnsError::InvalidUrl(url.to_string());

    let parsed = Url::parse(url).map_err(|_| invalid())?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid());
    }

    // The parser skips extra slashes before the host ("https:///x" has host
    // "x"); a list URL must name its host right after the scheme.
    let host_follows_scheme = url
        .split_once("://")
        .map_or(false, |(_, rest)| !rest.starts_with('/'));
    let has_host = parsed.host_str().map_or(false, |h| !h.is_empty());
    if !host_follows_scheme || !has_host || url.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    // Keep the text as given: duplicate detection compares it verbatim
    Ok(url.to_string())
}

/// Timer interval validation (e.g., "24h", "30m", "1d").
///
/// Returns `true` if the interval is valid.
/// Requires ASCII-only input to prevent Unicode-related edge cases.
///
/// # Examples
/// ```
/// use pidns::validation::is_valid_interval;
/// assert!(is_valid_interval("24h"));
/// assert!(!is_valid_interval("4x"));
/// ```
pub fn is_valid_interval(interval: &str) -> bool {
    parse_interval(interval).is_ok()
}

/// Parse an interval such as `30s`, `5m`, `4h` or `1d` into a `Duration`.
///
/// Zero-length intervals are rejected since they would spin the scheduler.
pub fn parse_interval(interval: &str) -> Result<Duration> {
    if interval.is_empty() {
        bail!("Interval cannot be empty");
    }

    // Reject non-ASCII to prevent Unicode edge cases
    if !interval.is_ascii() {
        bail!("Invalid interval '{}'. Only ASCII characters allowed", interval);
    }

    if interval.len() < 2 {
        bail!(
            "Invalid interval '{}'. Use format like '24h', '30m', '1d'",
            interval
        );
    }

    let (num_part, suffix) = interval.split_at(interval.len() - 1);

    let unit_secs: u64 = match suffix {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        _ => bail!(
            "Invalid interval '{}'. Suffix must be s, m, h, or d",
            interval
        ),
    };

    let value: u32 = num_part.parse().map_err(|_| {
        anyhow::anyhow!(
            "Invalid interval '{}'. Number part must be a positive integer",
            interval
        )
    })?;

    if value == 0 {
        bail!("Invalid interval '{}'. Must be greater than zero", interval);
    }

    Ok(Duration::from_secs(u64::from(value) * unit_secs))
}

/// Parse an expiry timestamp.
///
/// Accepts RFC 3339 (`2026-01-01T00:00:00Z`), a naive ISO-8601 date-time
/// (`2026-01-01T00:00:00`, interpreted as UTC) or a bare date (midnight UTC).
pub fn parse_expiry(value: &str) -> Result<DateTime<Utc>, PidnsError> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }

    Err(PidnsError::InvalidDate {
        value: value.to_string(),
        reason: "expected ISO-8601 date or date-time".to_string(),
    })
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Normalization is idempotent on everything it accepts
        #[test]
        fn prop_normalize_idempotent(raw in "[ a-zA-Z0-9.\\-_]{0,40}") {
            if let Some(once) = normalize_domain(&raw) {
                prop_assert_eq!(normalize_domain(&once), Some(once.clone()));
            }
        }

        /// Well-formed domains are always accepted, lowercased
        #[test]
        fn prop_well_formed_accepted(
            labels in prop::collection::vec("[a-z0-9]{1,10}", 1..4),
            tld in "[a-z]{2,6}",
        ) {
            let domain = format!("{}.{}", labels.join("."), tld);
            prop_assume!(domain.len() >= 4);
            let upper = domain.to_uppercase();
            prop_assert_eq!(normalize_domain(&upper), Some(domain));
        }

        /// Arbitrary input never panics
        #[test]
        fn prop_normalize_no_panic(raw in "\\PC{0,64}") {
            let _ = normalize_domain(&raw);
        }
    }
}
