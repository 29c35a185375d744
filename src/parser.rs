//! Block list parsing.
//!
//! Lists come in several formats (hosts files, AdBlock filters, plain domain
//! lists). Each line is tried against an ordered list of matchers; the first
//! matcher whose pattern matches decides the captured token, which is then run
//! through [`normalize_domain`]. Lines that match nothing, or whose token is
//! rejected, are skipped.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

use crate::validation::normalize_domain;

/// A named line pattern. Capture group 1 holds the candidate domain.
#[derive(Debug)]
pub struct LineMatcher {
    pub name: &'static str,
    regex: Regex,
}

impl LineMatcher {
    fn new(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            regex: Regex::new(pattern).expect("Failed to compile line matcher regex"),
        }
    }

    /// Return the raw captured token if this matcher applies to `line`.
    pub fn capture<'a>(&self, line: &'a str) -> Option<&'a str> {
        self.regex
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

/// Matchers in precedence order.
static LINE_MATCHERS: Lazy<[LineMatcher; 4]> = Lazy::new(|| {
    [
        // 0.0.0.0 ads.example.com / 127.0.0.1 ads.example.com / :: ads.example.com
        LineMatcher::new("hosts", r"^(?:0\.0\.0\.0|127\.0\.0\.1|::)\s+([^\s#]+)"),
        // ads.example.com
        LineMatcher::new("domain", r"^([A-Za-z0-9-][A-Za-z0-9.-]*\.[A-Za-z]{2,})$"),
        // ||ads.example.com^
        LineMatcher::new("adblock", r"^\|\|([^\^/$]+)\^"),
        // ads.example.com <anything>
        LineMatcher::new("loose", r"^([A-Za-z0-9.-]+)\s"),
    ]
});

/// The ordered matcher list.
pub fn matchers() -> &'static [LineMatcher] {
    LINE_MATCHERS.as_slice()
}

/// Lines that are never inspected.
fn is_skipped(line: &str) -> bool {
    line.is_empty() || line.starts_with('#') || line.starts_with('!')
}

/// Extract the normalized domain from a single line, if any.
///
/// Only the first matching pattern is consulted: if its token is rejected by
/// the normalizer the line yields nothing.
pub fn parse_line(line: &str) -> Option<String> {
    let line = line.trim();
    if is_skipped(line) {
        return None;
    }

    matchers()
        .iter()
        .find_map(|m| m.capture(line))
        .and_then(normalize_domain)
}

/// Parse a whole list into its set of normalized domains.
///
/// # Examples
/// ```
/// use pidns::parser::parse_list;
/// let set = parse_list("0.0.0.0 ads.example.com\n# comment\nbad..line\nexample.org");
/// assert_eq!(set.len(), 2);
/// ```
pub fn parse_list(content: &str) -> BTreeSet<String> {
    content.lines().filter_map(parse_line).collect()
}

/// Parse raw bytes, replacing invalid UTF-8.
pub fn parse_bytes(content: &[u8]) -> BTreeSet<String> {
    parse_list(&String::from_utf8_lossy(content))
}

/// Serialize a domain set into the cache file format: one domain per line,
/// sorted, trailing newline. Reading it back with [`parse_list`] yields the
/// same set.
pub fn serialize_domains<'a, I>(domains: I) -> String
where
    I: IntoIterator<Item = &'a String>,
{
    let sorted: BTreeSet<&String> = domains.into_iter().collect();
    let mut out = String::with_capacity(sorted.len() * 24);
    for domain in sorted {
        out.push_str(domain);
        out.push('\n');
    }
    out
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn domain_strategy() -> impl Strategy<Value = String> {
        (
            prop::collection::vec("[a-z0-9][a-z0-9-]{0,8}", 1..4),
            "[a-z]{2,6}",
        )
            .prop_map(|(labels, tld)| format!("{}.{}", labels.join("."), tld))
            .prop_filter_map("normalizable", |d| normalize_domain(&d))
    }

    fn list_content_strategy(max_lines: usize) -> impl Strategy<Value = String> {
        prop::collection::vec(
            prop_oneof![
                domain_strategy().prop_map(|d| format!("0.0.0.0 {}", d)),
                domain_strategy().prop_map(|d| format!("||{}^", d)),
                domain_strategy(),
                Just("# comment".to_string()),
                Just("".to_string()),
                "\\PC{0,30}",
            ],
            0..max_lines,
        )
        .prop_map(|lines| lines.join("\n"))
    }

    proptest! {
        /// The cache file format reads back to the same set
        #[test]
        fn prop_cache_round_trip(domains in prop::collection::btree_set(domain_strategy(), 0..50)) {
            let serialized = serialize_domains(&domains);
            prop_assert_eq!(parse_list(&serialized), domains);
        }

        /// Arbitrary content never panics and only yields normalized domains
        #[test]
        fn prop_parsed_domains_normalized(content in list_content_strategy(60)) {
            for domain in parse_list(&content) {
                prop_assert_eq!(normalize_domain(&domain), Some(domain.clone()));
            }
        }
    }
}
