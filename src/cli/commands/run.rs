//! Run command implementation: the scheduled sync job.

use std::sync::Arc;

use tokio::runtime::Runtime;

use crate::cli::SyncArgs;
use crate::error::{Error, Result};
use crate::job::{JobOutcome, SyncJob, record_abort};
use crate::remote::OpenAiClient;
use crate::sync::print_summary;

/// Execute the run command.
///
/// Exits non-zero for aborted runs and for runs where some uploads failed;
/// in every case the summary file has already been written.
pub fn execute(args: &SyncArgs, json: bool) -> Result<()> {
    let (job, rt) = match prepare(args) {
        Ok(prepared) => prepared,
        Err(e) => {
            record_abort(&args.summary_file, &e);
            return Err(e);
        }
    };

    let outcome = rt.block_on(job.run())?;

    print_outcome(&outcome, json)?;
    outcome.check()
}

/// Everything that can fail before the job itself starts.
fn prepare(args: &SyncArgs) -> Result<(SyncJob<OpenAiClient>, Runtime)> {
    let config = args.to_config()?;
    config.validate_for_run()?;

    let client = OpenAiClient::new(
        config.require_api_key()?,
        config.base_url.clone(),
        config.request_timeout,
    )
    .map_err(|e| Error::Config(e.to_string()))?;

    // Create tokio runtime for async operations
    let rt = Runtime::new()
        .map_err(|e| Error::Other(format!("Failed to create async runtime: {e}")))?;

    Ok((SyncJob::new(config, Arc::new(client)), rt))
}

fn print_outcome(outcome: &JobOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(&outcome.summary)?);
        return Ok(());
    }

    print_summary(&outcome.summary);
    println!();
    println!("Summary written to {}", outcome.summary_path.display());
    if let Some(state) = &outcome.summary.state_path {
        println!("State written to   {}", state.display());
    }
    Ok(())
}
