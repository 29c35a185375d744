//! Statistics display for pidns.

use chrono::{DateTime, Utc};
use std::fmt::Write as _;

use crate::lists::KindStatistics;
use crate::manager::PipelineStatistics;
use crate::reconciler::SourceStatus;
use crate::resolver::ResolverStatus;
use crate::utils::{format_age, format_bytes, format_count, format_count_with_separator, truncate};

const RULE: &str = "══════════════════════════════════════════════════════════════════";

/// Render the `pidns stats` report.
pub fn render_stats(
    stats: &PipelineStatistics,
    sources: &[SourceStatus],
    resolver: ResolverStatus,
    now: DateTime<Utc>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, " PIDNS AD-BLOCKER STATISTICS");
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out);

    let _ = writeln!(out, " dnsmasq: {}", resolver.to_string().to_uppercase());
    let _ = writeln!(
        out,
        " Block lists: {} enabled / {} total",
        stats.sources_enabled, stats.sources_total
    );
    let _ = writeln!(
        out,
        " Blocked domains: {}",
        format_count_with_separator(stats.blocked_domains)
    );
    let _ = writeln!(out, " List cache: {}", format_bytes(stats.cache_bytes));
    let _ = writeln!(out);

    if !sources.is_empty() {
        let _ = writeln!(out, " ID   SOURCE               CATEGORY   DOMAINS   UPDATED");
        let _ = writeln!(out, " ──── ──────────────────── ────────── ───────── ────────────");
        for status in sources {
            let source = &status.source;
            let marker = if source.enabled { ' ' } else { '-' };
            let _ = writeln!(
                out,
                "{}{:<4} {:<20} {:<10} {:>9} {}",
                marker,
                source.id,
                truncate(&source.name, 20),
                truncate(&source.category, 10),
                format_count(source.entry_count),
                format_age(source.last_updated, now),
            );
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, " OVERRIDES");
    let _ = writeln!(out, " ────────────────────────────────────────────────────────────────");
    write_kind(&mut out, "Whitelist", &stats.lists.whitelist);
    write_kind(&mut out, "Blacklist", &stats.lists.blacklist);

    let _ = writeln!(out, "{}", RULE);
    out
}

fn write_kind(out: &mut String, label: &str, stats: &KindStatistics) {
    let _ = writeln!(
        out,
        " {}: {} active, {} expired",
        label, stats.active, stats.expired
    );
    for (category, count) in &stats.categories {
        let _ = writeln!(out, "   {:<12} {}", category, count);
    }
}
