//! kbsync - incremental knowledge-base sync for a hosted assistant
//!
//! This crate provides the core functionality for the `kbsync` CLI tool: a
//! daily job that scrapes a help center into Markdown, works out which
//! documents changed since the last run, and uploads only those to the
//! vector store an assistant retrieves from.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`config`] - Run configuration
//! - [`sync`] - Fingerprint store, delta detection, executor, run reports
//! - [`remote`] - Remote index trait, OpenAI client, in-memory fake
//! - [`job`] - The end-to-end sync run
//! - [`bootstrap`] - First-time provisioning
//! - [`scrape`] - External scraper invocation
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod error;
pub mod job;
pub mod remote;
pub mod scrape;
pub mod sync;

pub use error::{Error, Result};
