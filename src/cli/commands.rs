//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};
use crate::planner::{ExistingPolicy, MergePolicy};

/// dms-sync - Declarative data modeling schema deployment.
#[derive(Parser, Debug)]
#[command(name = "dms-sync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "DMS_SYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the configuration and the local schema.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Compare the local schema with the CDF project and show the plan.
    Plan {
        /// Handling of resources that already exist.
        #[arg(long)]
        existing: Option<ExistingPolicy>,

        /// Governance of properties, constraints and indexes (additive, rebuild).
        #[arg(long)]
        governance: Option<MergePolicy>,

        /// Show every planned difference.
        #[arg(short, long)]
        detailed: bool,
    },

    /// Deploy the local schema to the CDF project.
    Deploy {
        /// Handling of resources that already exist.
        #[arg(long)]
        existing: Option<ExistingPolicy>,

        /// Governance of properties, constraints and indexes (additive, rebuild).
        #[arg(long)]
        governance: Option<MergePolicy>,

        /// Plan only, change nothing.
        #[arg(long)]
        dry_run: bool,

        /// Undo the deployment's changes if it fails.
        #[arg(long)]
        restore_on_failure: bool,

        /// Always retrieve from the API instead of caching.
        #[arg(long)]
        no_cache: bool,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Retrieve resources from the CDF project.
    Retrieve {
        /// Resource kind.
        kind: KindArg,

        /// Identifiers: `space`, `space:externalId` or `space:externalId:version`.
        #[arg(required = true)]
        ids: Vec<String>,

        /// Also retrieve parent views, or required containers.
        #[arg(long)]
        recursive: bool,

        /// Also retrieve views reached through properties.
        #[arg(long)]
        connected: bool,
    },
}

/// Resource kinds accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum KindArg {
    /// Spaces.
    Spaces,
    /// Containers.
    Containers,
    /// Views.
    Views,
    /// Data models.
    DataModels,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl KindArg {
    /// Number of `:`-separated parts in an identifier of this kind.
    #[must_use]
    pub const fn identifier_parts(self) -> usize {
        match self {
            Self::Spaces => 1,
            Self::Containers => 2,
            Self::Views | Self::DataModels => 3,
        }
    }

    /// Splits a command-line identifier into its parts.
    ///
    /// # Errors
    ///
    /// Returns an error if the number of parts does not match the kind or a
    /// part is empty.
    pub fn split_identifier(self, raw: &str) -> Result<Vec<String>> {
        let parts: Vec<String> = raw.split(':').map(str::to_string).collect();
        if parts.len() != self.identifier_parts() || parts.iter().any(String::is_empty) {
            return Err(ConfigError::InvalidOption {
                option: String::from("ids"),
                value: raw.to_string(),
            }
            .into());
        }
        Ok(parts)
    }
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
