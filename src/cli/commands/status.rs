//! Status command implementation.
//!
//! Classifies the local snapshot against the fingerprint store exactly as
//! the next run would, without scraping or calling the remote index.

use crate::cli::StatusArgs;
use crate::error::Result;
use crate::sync::{ClassifiedDelta, FingerprintStore, classify, discover, guard_snapshot};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

/// Output for status command.
#[derive(Serialize)]
struct StatusOutput {
    articles_dir: PathBuf,
    state_file: PathBuf,
    last_run_at: Option<String>,
    documents: usize,
    synced: usize,
    tombstoned: usize,
    added: Vec<String>,
    updated: Vec<UpdatedOutput>,
    unchanged: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    unchanged_keys: Option<Vec<String>>,
    removed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    guard_violation: Option<String>,
}

#[derive(Serialize)]
struct UpdatedOutput {
    key: String,
    reason: String,
}

impl StatusOutput {
    fn new(args: &StatusArgs, delta: &ClassifiedDelta, documents: usize) -> Self {
        Self {
            articles_dir: args.source.articles_dir.clone(),
            state_file: args.source.state_file.clone(),
            last_run_at: None,
            documents,
            synced: 0,
            tombstoned: 0,
            added: delta.added.iter().map(|e| e.key().to_string()).collect(),
            updated: delta
                .updated
                .iter()
                .map(|u| UpdatedOutput {
                    key: u.entry.key().to_string(),
                    reason: u.reason.to_string(),
                })
                .collect(),
            unchanged: delta.unchanged_count(),
            unchanged_keys: args
                .all
                .then(|| delta.unchanged.iter().map(ToString::to_string).collect()),
            removed: delta.removed.iter().map(ToString::to_string).collect(),
            guard_violation: None,
        }
    }
}

/// Execute status command.
pub fn execute(args: &StatusArgs, json: bool) -> Result<()> {
    let state = FingerprintStore::new(&args.source.state_file).load();
    let documents = discover(&args.source.articles_dir, &args.source.extension)?;
    let count = documents.len();

    let guard_violation =
        guard_snapshot(count, &state, &args.source.guard(), &args.source.articles_dir)
            .err()
            .map(|e| e.to_string());
    let delta = classify(documents, &state, &args.source.marker_prefix);

    let mut output = StatusOutput::new(args, &delta, count);
    output.last_run_at.clone_from(&state.last_run_at);
    output.synced = state.active_count();
    output.tombstoned = state.documents.len() - output.synced;
    output.guard_violation = guard_violation;

    if json {
        println!("{}", serde_json::to_string(&output)?);
    } else {
        print_status(&output);
    }

    Ok(())
}

fn print_status(output: &StatusOutput) {
    println!("{}", "Sync Status".bold());
    println!("===========");
    println!();
    println!("Articles:  {}", output.articles_dir.display());
    println!("State:     {}", output.state_file.display());
    println!(
        "Last run:  {}",
        output.last_run_at.as_deref().unwrap_or("never")
    );
    println!(
        "Documents: {} on disk, {} synced, {} tombstoned",
        output.documents, output.synced, output.tombstoned
    );
    println!();

    if let Some(violation) = &output.guard_violation {
        println!("{} {violation}", "Guard:".red().bold());
        println!(
            "{}",
            "The next run will refuse this snapshot.".dimmed()
        );
        println!();
    }

    if output.added.is_empty() && output.updated.is_empty() && output.removed.is_empty() {
        println!("{}", "No changes since the last run.".green());
    } else {
        for key in &output.added {
            println!("  {} {key}", "+".green());
        }
        for updated in &output.updated {
            println!(
                "  {} {} {}",
                "~".yellow(),
                updated.key,
                format!("({})", updated.reason).dimmed()
            );
        }
        for key in &output.removed {
            println!("  {} {key}", "-".red());
        }
    }

    println!();
    println!(
        "Added: {}  Updated: {}  Unchanged: {}  Removed: {}",
        output.added.len(),
        output.updated.len(),
        output.unchanged,
        output.removed.len()
    );

    if let Some(keys) = &output.unchanged_keys {
        println!();
        println!("{}", "Unchanged:".blue().bold());
        for key in keys {
            println!("  {key}");
        }
    }
}
