//! Tooling & Integration Layer
//!
//! Command-line entry points over the synchronization core.

pub mod cli;

pub use cli::{Cli, CliContext, Commands, OutputFormat, PreviewKind};
