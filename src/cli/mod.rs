//! CLI module for the schema synchronization tool.
//!
//! This module provides the command-line interface for validating, planning,
//! deploying and retrieving data modeling schemas.

mod commands;
mod output;

pub use commands::{Cli, Commands, KindArg, OutputFormat};
pub use output::OutputFormatter;
