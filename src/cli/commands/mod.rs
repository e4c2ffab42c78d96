//! Command implementations.

pub mod bootstrap;
pub mod completions;
pub mod run;
pub mod status;
pub mod version;
