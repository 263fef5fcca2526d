//! Configuration module for the schema synchronization tool.
//!
//! This module handles all configuration-related functionality:
//! - Parsing `dms-sync.yaml` and the local schema it points to
//! - Validation of configuration values and schema identifiers
//! - Computing schema fingerprints

mod hash;
mod parser;
mod spec;
mod validator;

pub use hash::SchemaHasher;
pub use parser::{
    ConfigParser, DEFAULT_CONFIG_FILES, ENV_CDF_BASE_URL, ENV_CDF_PROJECT, ENV_EXISTING,
    find_config_file,
};
pub use spec::{CdfConfig, DEFAULT_BASE_URL, DeployConfig, DeploySettings, ProjectConfig};
pub use validator::{SchemaValidator, ValidationResult};
