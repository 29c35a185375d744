//! Check command implementation.

use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use crate::manager::ListPipeline;
use crate::membership::Verdict;

use super::load_config;

#[derive(Debug, Serialize)]
struct DomainCheck {
    domain: String,
    blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    verdict: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Run the check command
pub async fn run(domains: &[String], json: bool, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let pipeline = ListPipeline::from_config(&config)?;

    let mut checks = Vec::with_capacity(domains.len());
    for domain in domains {
        let check = match pipeline.check(domain).await {
            Ok(verdict) => DomainCheck {
                domain: domain.clone(),
                blocked: verdict.is_blocked(),
                verdict: Some(verdict),
                error: None,
            },
            Err(e) => DomainCheck {
                domain: domain.clone(),
                blocked: false,
                verdict: None,
                error: Some(e.to_string()),
            },
        };
        checks.push(check);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&checks)?);
        return Ok(());
    }

    println!();
    for check in &checks {
        match (&check.verdict, &check.error) {
            (Some(verdict), _) => {
                let state = if check.blocked { "BLOCKED" } else { "NOT blocked" };
                println!("{} is {}: {}", check.domain, state, describe(&pipeline, verdict));
            }
            (None, Some(error)) => println!("{}: {}", check.domain, error),
            (None, None) => {}
        }
    }
    if checks
        .iter()
        .any(|c| matches!(c.verdict, Some(Verdict::NotListed)))
    {
        println!();
        println!("Note: only exact names are checked. dnsmasq also blocks every");
        println!("      subdomain of a listed domain.");
    }
    println!();

    Ok(())
}

/// Verdict text with source names instead of ids.
fn describe(pipeline: &ListPipeline, verdict: &Verdict) -> String {
    let Verdict::BlockList { sources } = verdict else {
        return verdict.to_string();
    };
    let names: Vec<String> = sources
        .iter()
        .map(|id| match pipeline.store().get_source(*id) {
            Ok(Some(source)) => source.name,
            _ => format!("#{}", id),
        })
        .collect();
    format!("listed by {}", names.join(", "))
}
