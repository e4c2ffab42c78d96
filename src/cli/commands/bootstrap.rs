//! Bootstrap command implementation.

use std::sync::Arc;

use colored::Colorize;

use crate::bootstrap::{BootstrapOutcome, Bootstrapper};
use crate::cli::BootstrapArgs;
use crate::error::{Error, Result};
use crate::remote::OpenAiClient;
use crate::sync::print_summary;

/// Execute the bootstrap command.
pub fn execute(args: &BootstrapArgs, json: bool) -> Result<()> {
    let config = args.sync.to_config()?;
    let client = OpenAiClient::new(
        config.require_api_key()?,
        config.base_url.clone(),
        config.request_timeout,
    )
    .map_err(|e| Error::Config(e.to_string()))?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))?;
    let bootstrapper = Bootstrapper::new(
        config,
        Arc::new(client),
        &args.assistant_name,
        &args.vector_store_name,
    );
    let outcome = rt.block_on(bootstrapper.run(&args.report_file))?;

    print_outcome(&outcome, json)?;
    outcome.sync.check()
}

fn print_outcome(outcome: &BootstrapOutcome, json: bool) -> Result<()> {
    let report = &outcome.report;

    if json {
        let output = serde_json::json!({
            "assistant_id": report.assistant_id,
            "vector_store_id": report.vector_store_id,
            "file_count": report.file_count,
            "estimated_total_chunks": report.estimated_total_chunks,
            "report_path": outcome.report_path.display().to_string(),
            "sync": outcome.sync.summary,
        });
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("{}", "Bootstrap complete".green().bold());
    println!("  Assistant ID:     {}", report.assistant_id);
    println!("  Vector Store ID:  {}", report.vector_store_id);
    println!("  Files:            {}", report.file_count);
    println!(
        "  Estimated chunks: {} ({} tokens)",
        report.estimated_total_chunks, report.estimated_total_tokens
    );
    println!("  Report:           {}", outcome.report_path.display());
    println!();
    print_summary(&outcome.sync.summary);
    println!();
    println!(
        "{}",
        format!(
            "Set ASSISTANT_ID={} and VECTOR_STORE_ID={} for scheduled runs.",
            report.assistant_id, report.vector_store_id
        )
        .dimmed()
    );
    Ok(())
}
