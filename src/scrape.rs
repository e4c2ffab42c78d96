//! Scrape stage: runs the external scraper that fills the articles directory.
//!
//! The scraper is a black box. It is called as
//! `<program> <args...> --locale <L> --max-articles <N> --out-dir <DIR>` and
//! must exit zero. Its stdout is logged at debug level; on failure the tail
//! of its stderr ends up in the error.

use std::path::Path;
use std::process::Command;

use tracing::{debug, info};

use crate::config::ScrapeConfig;
use crate::error::{Error, Result};

/// Lines of scraper stderr kept in the error message.
const STDERR_TAIL_LINES: usize = 20;

/// Build the scraper command line.
#[must_use]
pub fn command(config: &ScrapeConfig, out_dir: &Path) -> Command {
    let mut cmd = Command::new(&config.program);
    cmd.args(&config.args)
        .arg("--locale")
        .arg(&config.locale)
        .arg("--max-articles")
        .arg(config.max_articles.to_string())
        .arg("--out-dir")
        .arg(out_dir);
    cmd
}

/// Run the scraper to completion.
///
/// # Errors
///
/// Returns `Error::Scrape` if the program cannot be started or exits
/// non-zero.
pub fn run(config: &ScrapeConfig, out_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(out_dir)?;

    info!(
        program = %config.program,
        locale = %config.locale,
        max_articles = config.max_articles,
        out_dir = %out_dir.display(),
        "Running scraper"
    );

    let output = command(config, out_dir).output().map_err(|e| Error::Scrape {
        status: None,
        message: format!("cannot start {}: {e}", config.program),
    })?;

    for line in String::from_utf8_lossy(&output.stdout).lines() {
        debug!(target: "kbsync::scrape", "{line}");
    }

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let message = match tail(&stderr, STDERR_TAIL_LINES) {
        t if t.is_empty() => format!("{} exited unsuccessfully", config.program),
        t => t,
    };
    Err(Error::Scrape {
        status: output.status.code(),
        message,
    })
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
