//! Block list source management command implementation.

use anyhow::Result;
use chrono::Utc;
use std::path::Path;

use crate::cli::SourcesAction;
use crate::manager::ListPipeline;
use crate::model::{Source, SourceFilter, SourceUpdate};
use crate::presets::{is_known_category, is_protected_url};
use crate::reconciler::RefreshOutcome;
use crate::utils::{format_age, format_count, truncate};

use super::{load_config, open_pipeline, print_regeneration};

/// Run the sources command
pub async fn run(action: SourcesAction, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    // Read-only actions skip seeding
    let read_only = matches!(action, SourcesAction::List { .. } | SourcesAction::Status);
    let pipeline = if read_only {
        ListPipeline::from_config(&config)?
    } else {
        open_pipeline(&config).await?
    };

    match action {
        SourcesAction::List { category, enabled } => list_sources(&pipeline, category, enabled),
        SourcesAction::Add {
            url,
            name,
            category,
            description,
        } => add_source(&pipeline, &url, &name, category.as_deref(), &description).await,
        SourcesAction::Update {
            id,
            name,
            category,
            description,
        } => {
            let update = SourceUpdate {
                name,
                category,
                description,
                ..Default::default()
            };
            if update.name.is_none() && update.category.is_none() && update.description.is_none() {
                anyhow::bail!("Nothing to update. Use --name, --category or --description");
            }
            let (source, _) = pipeline.update_source(id, &update).await?;
            println!("[OK] Updated block list '{}' (id {})", source.name, source.id);
            Ok(())
        }
        SourcesAction::Remove { id } => {
            let (source, regeneration) = pipeline.remove_source(id).await?;
            println!("[OK] Removed block list '{}'", source.name);
            print_regeneration(&regeneration);
            Ok(())
        }
        SourcesAction::Enable { id } => set_enabled(&pipeline, id, true).await,
        SourcesAction::Disable { id } => set_enabled(&pipeline, id, false).await,
        SourcesAction::Toggle { id } => {
            let (source, regeneration) = pipeline.toggle(id).await?;
            println!(
                "[OK] Block list '{}' is now {}",
                source.name,
                if source.enabled { "enabled" } else { "disabled" }
            );
            print_regeneration(&regeneration);
            Ok(())
        }
        SourcesAction::Refresh { id } => {
            let (refresh, regeneration) = pipeline.refresh_source(id).await?;
            match refresh.outcome {
                RefreshOutcome::Updated(count) => {
                    println!("[OK] {}: {} domains", refresh.name, format_count(count))
                }
                RefreshOutcome::Failed(reason) => {
                    anyhow::bail!("Failed to refresh {}: {}", refresh.name, reason)
                }
                RefreshOutcome::Skipped | RefreshOutcome::Cancelled => {
                    println!("{} was not refreshed (no URL)", refresh.name)
                }
            }
            if let Some(regeneration) = regeneration {
                print_regeneration(&regeneration);
            }
            Ok(())
        }
        SourcesAction::Reparse { id } => {
            let (source, count, regeneration) = pipeline.reparse_source(id).await?;
            match count {
                Some(count) => println!("[OK] {}: {} domains", source.name, format_count(count)),
                None => anyhow::bail!(
                    "No cached download for '{}'. Run 'pidns sources refresh {}' first",
                    source.name,
                    source.id
                ),
            }
            if let Some(regeneration) = regeneration {
                print_regeneration(&regeneration);
            }
            Ok(())
        }
        SourcesAction::Status => show_status(&pipeline),
    }
}

fn list_sources(pipeline: &ListPipeline, category: Option<String>, enabled_only: bool) -> Result<()> {
    let filter = SourceFilter {
        enabled: enabled_only.then_some(true),
        category,
    };
    let sources = pipeline.list_sources(&filter)?;
    let now = Utc::now();

    println!();
    if sources.is_empty() {
        println!("  (no block lists)");
        println!();
        return Ok(());
    }

    println!(" ID   STATE    NAME                         CATEGORY   DOMAINS   UPDATED");
    println!(" ──── ──────── ──────────────────────────── ────────── ───────── ────────────");
    for source in &sources {
        println!(
            " {:<4} {:<8} {:<28} {:<10} {:>9} {}",
            source.id,
            state_label(source),
            truncate(&source.name, 28),
            truncate(&source.category, 10),
            format_count(source.entry_count),
            format_age(source.last_updated, now),
        );
    }
    println!();
    println!(" * predefined (cannot be removed)");
    println!();
    Ok(())
}

fn state_label(source: &Source) -> String {
    let state = if source.enabled { "on" } else { "off" };
    if source.url.as_deref().map(is_protected_url).unwrap_or(false) {
        format!("{}*", state)
    } else {
        state.to_string()
    }
}

async fn add_source(
    pipeline: &ListPipeline,
    url: &str,
    name: &str,
    category: Option<&str>,
    description: &str,
) -> Result<()> {
    if let Some(category) = category {
        if !is_known_category(category) {
            println!("Note: '{}' is not a well-known category", category);
        }
    }

    let added = pipeline.add_source(name, url, category, description).await?;
    println!(
        "[OK] Added block list '{}' (id {})",
        added.source.name, added.source.id
    );

    match &added.refresh.outcome {
        RefreshOutcome::Updated(count) => println!("     {} domains fetched", format_count(*count)),
        RefreshOutcome::Failed(reason) => {
            println!("[WARN] Initial fetch failed: {}", reason);
            println!("       It will be retried on the next update");
        }
        RefreshOutcome::Skipped | RefreshOutcome::Cancelled => {}
    }
    if let Some(regeneration) = &added.regeneration {
        print_regeneration(regeneration);
    }
    Ok(())
}

async fn set_enabled(pipeline: &ListPipeline, id: u64, enabled: bool) -> Result<()> {
    let (source, regeneration) = pipeline.set_enabled(id, enabled).await?;
    println!(
        "[OK] {} block list '{}'",
        if enabled { "Enabled" } else { "Disabled" },
        source.name
    );
    print_regeneration(&regeneration);
    Ok(())
}

fn show_status(pipeline: &ListPipeline) -> Result<()> {
    let now = Utc::now();
    let statuses = pipeline.source_statuses(now)?;

    println!();
    println!(" ID   NAME                         ENABLED  FILE     NEEDS UPDATE");
    println!(" ──── ──────────────────────────── ──────── ──────── ────────────");
    for status in &statuses {
        println!(
            " {:<4} {:<28} {:<8} {:<8} {}",
            status.source.id,
            truncate(&status.source.name, 28),
            if status.source.enabled { "yes" } else { "no" },
            if status.file_exists { "present" } else { "missing" },
            if status.needs_update { "yes" } else { "no" },
        );
    }
    println!();
    Ok(())
}
