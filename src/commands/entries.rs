//! Whitelist and blacklist command implementation.

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use std::fs;
use std::path::Path;

use crate::cli::{EntryArgs, ListAction};
use crate::lists::parse_import;
use crate::manager::ListPipeline;
use crate::model::{EntryUpdate, ListKind};
use crate::utils::{truncate, write_atomic};
use crate::validation::parse_expiry;

use super::{load_config, open_pipeline, print_regeneration};

/// Run a whitelist or blacklist command
pub async fn run(kind: ListKind, action: ListAction, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    let read_only = matches!(action, ListAction::List { .. } | ListAction::Export { .. });
    let pipeline = if read_only {
        ListPipeline::from_config(&config)?
    } else {
        open_pipeline(&config).await?
    };

    match action {
        ListAction::Add { domain, entry } => add_entry(&pipeline, kind, &domain, entry).await,
        ListAction::Del { id } => {
            let (entry, regeneration) = pipeline.remove_entry(kind, id).await?;
            println!("[OK] Removed {} from {}", entry.domain, kind);
            print_regeneration(&regeneration);
            Ok(())
        }
        ListAction::Update {
            id,
            entry,
            no_expiry,
        } => update_entry(&pipeline, kind, id, entry, no_expiry).await,
        ListAction::List { category, all } => list_entries(&pipeline, kind, category.as_deref(), all),
        ListAction::Import { file } => import_entries(&pipeline, kind, &file).await,
        ListAction::Export { output, category } => {
            export_entries(&pipeline, kind, output.as_deref(), category.as_deref())
        }
    }
}

async fn add_entry(
    pipeline: &ListPipeline,
    kind: ListKind,
    domain: &str,
    args: EntryArgs,
) -> Result<()> {
    let expires_at = args.expires.as_deref().map(parse_expiry).transpose()?;
    let (entry, regeneration) = pipeline
        .add_entry(
            kind,
            domain,
            args.category.as_deref(),
            expires_at,
            args.notes.as_deref().unwrap_or_default(),
        )
        .await?;

    println!("[OK] Added {} to {} (id {})", entry.domain, kind, entry.id);
    print_regeneration(&regeneration);
    Ok(())
}

async fn update_entry(
    pipeline: &ListPipeline,
    kind: ListKind,
    id: u64,
    args: EntryArgs,
    no_expiry: bool,
) -> Result<()> {
    let expires_at = if no_expiry {
        Some(None)
    } else {
        args.expires
            .as_deref()
            .map(parse_expiry)
            .transpose()?
            .map(Some)
    };
    let update = EntryUpdate {
        category: args.category,
        expires_at,
        notes: args.notes,
    };
    if update.is_empty() {
        anyhow::bail!("Nothing to update. Use --category, --expires, --no-expiry or --notes");
    }

    let (entry, regeneration) = pipeline.update_entry(kind, id, &update).await?;
    println!("[OK] Updated {} entry {} ({})", kind, entry.id, entry.domain);
    print_regeneration(&regeneration);
    Ok(())
}

fn list_entries(
    pipeline: &ListPipeline,
    kind: ListKind,
    category: Option<&str>,
    include_expired: bool,
) -> Result<()> {
    let now = Utc::now();
    let entries = pipeline.lists().list(kind, category, include_expired, now)?;

    println!();
    println!("{} ({} entries):", kind, entries.len());
    println!();
    if entries.is_empty() {
        println!("  (empty)");
        println!();
        return Ok(());
    }

    println!(" ID     DOMAIN                               CATEGORY   EXPIRES");
    println!(" ────── ──────────────────────────────────── ────────── ────────────────────");
    for entry in &entries {
        let expires = match entry.expires_at {
            None => "never".to_string(),
            Some(at) if entry.is_expired(now) => format!("expired {}", at.format("%Y-%m-%d")),
            Some(at) => at.format("%Y-%m-%d %H:%M").to_string(),
        };
        println!(
            " {:<6} {:<36} {:<10} {}",
            entry.id,
            truncate(&entry.domain, 36),
            truncate(&entry.category, 10),
            expires
        );
    }
    println!();
    Ok(())
}

async fn import_entries(pipeline: &ListPipeline, kind: ListKind, file: &Path) -> Result<()> {
    let content = fs::read_to_string(file)
        .with_context(|| format!("Failed to read import file {:?}", file))?;
    let records = parse_import(&content)
        .with_context(|| format!("Failed to parse import file {:?}", file))?;

    let (report, regeneration) = pipeline.import_entries(kind, &records).await?;

    println!(
        "[OK] Imported {} entries into {} ({} skipped)",
        report.added, kind, report.skipped
    );
    for error in &report.errors {
        println!("  [ERR] {}", error);
    }
    if let Some(regeneration) = regeneration {
        print_regeneration(&regeneration);
    }
    Ok(())
}

fn export_entries(
    pipeline: &ListPipeline,
    kind: ListKind,
    output: Option<&Path>,
    category: Option<&str>,
) -> Result<()> {
    let entries = pipeline.lists().export(kind, category)?;
    let records: Vec<serde_json::Value> = entries
        .iter()
        .map(|e| {
            serde_json::json!({
                "domain": e.domain,
                "category": e.category,
                "expires_at": e.expires_at.map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true)),
                "notes": e.notes,
            })
        })
        .collect();
    let json = serde_json::to_string_pretty(&records).context("Failed to serialize entries")?;

    match output {
        Some(path) => {
            write_atomic(path, json.as_bytes())?;
            println!("[OK] Exported {} {} entries to {}", entries.len(), kind, path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
