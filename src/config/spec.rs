//! Configuration specification types for the synchronization tool.
//!
//! This module defines the structs that map to the `dms-sync.yaml` file: the
//! target CDF project, the deployment defaults and the location of the local
//! schema.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

use crate::planner::{ExistingPolicy, MergePolicy};

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.cognitedata.com";

/// The root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeployConfig {
    /// Project-level configuration.
    pub project: ProjectConfig,
    /// Target CDF project.
    pub cdf: CdfConfig,
    /// Deployment defaults.
    #[serde(default)]
    pub deploy: DeploySettings,
    /// Path of the local schema file, relative to the configuration file.
    #[serde(default = "default_schema_path")]
    pub schema: PathBuf,
}

/// Project-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct ProjectConfig {
    /// Name of the schema project, used in logs.
    #[validate(length(min = 1, message = "Project name cannot be empty"))]
    pub name: String,
}

/// Connection to a CDF project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct CdfConfig {
    /// API base URL.
    #[serde(default = "default_base_url")]
    #[validate(url(message = "Base URL must be a valid URL"))]
    pub base_url: String,
    /// CDF project name.
    #[validate(length(min = 1, message = "CDF project cannot be empty"))]
    pub project: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    #[validate(range(min = 1, max = 600))]
    pub timeout_secs: u64,
}

/// Deployment defaults, overridable from the command line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploySettings {
    /// Handling of resources that already exist.
    #[serde(default)]
    pub existing: ExistingPolicy,
    /// Governance of dictionary-valued sub-resources.
    #[serde(default)]
    pub governance: MergePolicy,
    /// Plan only.
    #[serde(default)]
    pub dry_run: bool,
    /// Undo a failed deployment.
    #[serde(default)]
    pub restore_on_failure: bool,
    /// Cache retrieved resources.
    #[serde(default = "default_true")]
    pub cache: bool,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            existing: ExistingPolicy::default(),
            governance: MergePolicy::default(),
            dry_run: false,
            restore_on_failure: false,
            cache: true,
        }
    }
}

impl DeployConfig {
    /// Schema path resolved against the directory of the configuration file.
    #[must_use]
    pub fn schema_path(&self, config_dir: &Path) -> PathBuf {
        if self.schema.is_absolute() {
            self.schema.clone()
        } else {
            config_dir.join(&self.schema)
        }
    }
}

fn default_schema_path() -> PathBuf {
    PathBuf::from("schema.yaml")
}

fn default_base_url() -> String {
    String::from(DEFAULT_BASE_URL)
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_true() -> bool {
    true
}
