//! Version command: crate version plus the defaults a deployment runs with.

use serde::Serialize;

use crate::config::{DEFAULT_MODEL, DEFAULT_STATE_FILE, DEFAULT_SUMMARY_FILE};
use crate::error::Result;
use crate::remote::openai::DEFAULT_BASE_URL;

#[derive(Serialize)]
struct VersionInfo {
    name: &'static str,
    version: &'static str,
    profile: &'static str,
    api_base: &'static str,
    model: &'static str,
    state_file: &'static str,
    summary_file: &'static str,
}

impl VersionInfo {
    fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            profile: if cfg!(debug_assertions) { "debug" } else { "release" },
            api_base: DEFAULT_BASE_URL,
            model: DEFAULT_MODEL,
            state_file: DEFAULT_STATE_FILE,
            summary_file: DEFAULT_SUMMARY_FILE,
        }
    }
}

/// Print version information.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let info = VersionInfo::current();

    if json {
        println!("{}", serde_json::to_string(&info)?);
    } else {
        println!("{} {} ({})", info.name, info.version, info.profile);
        println!("  api:     {}", info.api_base);
        println!("  model:   {}", info.model);
        println!("  state:   {}", info.state_file);
        println!("  summary: {}", info.summary_file);
    }
    Ok(())
}
