//! Jobs command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use squish_core::jobs::{Job, JobStore};
use uuid::Uuid;

use super::{JobsAction, JobsArgs};
use crate::ui::{format_bytes, format_duration, rule, truncate};

/// Run the jobs command.
pub async fn run(args: JobsArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = super::load_config(config_path)?;
    if let Some(dir) = args.data_dir {
        config.storage.data_dir = Some(dir);
    }
    let mut store = JobStore::from_config(&config).context("Failed to open job store")?;

    match args.action {
        JobsAction::List { limit } => {
            let jobs = store.list(Some(limit));
            if args.json {
                println!("{}", serde_json::to_string_pretty(jobs)?);
            } else {
                display_jobs(jobs, store.len());
            }
        }

        JobsAction::Show { id } => {
            let job = store
                .get(&parse_id(&id)?)
                .with_context(|| format!("Job not found: {}", id))?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(job)?);
            } else {
                display_job(&store, job);
            }
        }

        JobsAction::Remove { id } => {
            let job = store.remove(&parse_id(&id)?)?;
            if args.json {
                println!("{}", serde_json::json!({ "removed": job.id }));
            } else {
                println!("Removed job {} ({})", job.id, job.original_name);
            }
        }

        JobsAction::Clear => {
            let removed = store.clear()?;
            if args.json {
                println!("{}", serde_json::json!({ "removed": removed }));
            } else {
                println!("Removed {} jobs.", removed);
            }
        }

        JobsAction::Purge => {
            let purged = store.purge_expired()?;
            if args.json {
                println!("{}", serde_json::json!({ "purged": purged }));
            } else {
                println!(
                    "Deleted {} outputs older than {}.",
                    purged,
                    format_duration(store.retention())
                );
            }
        }
    }

    Ok(())
}

fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).with_context(|| format!("Invalid job ID: {}", id))
}

fn display_jobs(jobs: &[Job], total: usize) {
    if jobs.is_empty() {
        println!("No jobs.");
        return;
    }

    println!();
    println!("Recent Jobs ({} of {}):", jobs.len(), total);
    rule(92);
    println!(
        "  {:8}  {:16}  {:24}  {:13}  {:10}  {:10}",
        "ID", "Date", "File", "State", "Before", "After"
    );
    rule(92);

    for job in jobs {
        let id = job.id.to_string();
        println!(
            "  {:8}  {:16}  {:24}  {:13}  {:10}  {:10}",
            &id[..8],
            job.formatted_timestamp(),
            truncate(&job.original_name, 24),
            job.state.to_string(),
            format_bytes(job.original_size),
            format_bytes(job.output_size)
        );
    }

    rule(92);
}

fn display_job(store: &JobStore, job: &Job) {
    let retention = store.retention();

    println!();
    println!("Job {}", job.id);
    rule(50);
    println!("  File:       {}", job.original_name);
    println!("  Created:    {}", job.formatted_timestamp());
    println!("  State:      {}", job.state);
    if let Some(kind) = job.kind {
        println!("  Kind:       {:?}", kind);
    }
    if let Some(parameter) = job.parameter {
        println!("  Setting:    {}", parameter);
    }
    println!("  Before:     {}", format_bytes(job.original_size));
    println!("  After:      {}", format_bytes(job.output_size));
    println!("  Saved:      {}", format_bytes(job.bytes_saved()));
    println!("  Downloads:  {}", job.downloads);
    if let Some(owner) = job.owner {
        println!("  Owner:      {}", owner);
    }
    if let Some(message) = &job.error_message {
        println!("  Error:      {}", message);
    }
    match store.output_path(job) {
        Some(path) if job.is_downloadable(retention) => {
            println!("  Output:     {}", path.display());
        }
        _ => println!("  Output:     (none)"),
    }
    rule(50);
}
