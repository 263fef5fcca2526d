//! Configuration parser for loading configuration and schema files.
//!
//! This module loads the YAML configuration with environment overrides and
//! `.env` support, and reads the local schema it points to.

use std::path::{Path, PathBuf};
use tracing::{debug, info};
use validator::{Validate, ValidationErrors};

use crate::error::{ConfigError, Result};
use crate::planner::ExistingPolicy;
use crate::schema::DmsSchema;

use super::spec::DeployConfig;

/// Overrides `cdf.project`.
pub const ENV_CDF_PROJECT: &str = "DMS_SYNC_CDF_PROJECT";
/// Overrides `cdf.base_url`.
pub const ENV_CDF_BASE_URL: &str = "DMS_SYNC_CDF_BASE_URL";
/// Overrides `deploy.existing`.
pub const ENV_EXISTING: &str = "DMS_SYNC_EXISTING";

/// Configuration parser for loading deployment configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<DeployConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());
        let content = read(path)?;
        self.parse_yaml(&content, Some(path))
    }

    /// Parses and validates configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or a field fails validation.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<DeployConfig> {
        debug!("Parsing YAML configuration");

        let config: DeployConfig = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError {
            message: format!("YAML parse error: {e}"),
            location: source.map(|p| p.display().to_string()),
        })?;
        validate(&config)?;

        debug!("Parsed configuration for project: {}", config.project.name);
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or an override is invalid.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<DeployConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
        validate(&config)?;
        Ok(config)
    }

    /// Applies overrides looked up through `var`.
    fn apply_env_overrides(
        config: &mut DeployConfig,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<()> {
        if let Some(project) = var(ENV_CDF_PROJECT) {
            debug!("Overriding cdf.project from environment");
            config.cdf.project = project;
        }

        if let Some(base_url) = var(ENV_CDF_BASE_URL) {
            debug!("Overriding cdf.base_url from environment");
            config.cdf.base_url = base_url;
        }

        if let Some(existing) = var(ENV_EXISTING) {
            debug!("Overriding deploy.existing from environment");
            config.deploy.existing = existing.parse::<ExistingPolicy>()?;
        }

        Ok(())
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| ConfigError::ParseError {
                message: format!("Failed to load .env file: {e}"),
                location: Some(env_path.display().to_string()),
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Loads a local schema file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_schema(&self, path: impl AsRef<Path>) -> Result<DmsSchema> {
        let path = path.as_ref();
        info!("Loading schema from: {}", path.display());
        let content = read(path)?;
        let schema = Self::parse_schema(&content, Some(path))?;
        debug!("Loaded {} resource(s)", schema.resource_count());
        Ok(schema)
    }

    /// Parses a local schema from YAML (JSON is accepted too).
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not describe a schema.
    pub fn parse_schema(content: &str, source: Option<&Path>) -> Result<DmsSchema> {
        serde_yaml::from_str(content).map_err(|e| {
            ConfigError::ParseError {
                message: format!("Schema parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            }
            .into()
        })
    }
}

fn read(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        }
        .into());
    }

    std::fs::read_to_string(path).map_err(|e| {
        ConfigError::ParseError {
            message: format!("Failed to read file: {e}"),
            location: Some(path.display().to_string()),
        }
        .into()
    })
}

fn validate(config: &DeployConfig) -> Result<()> {
    check("project", config.project.validate())?;
    check("cdf", config.cdf.validate())
}

fn check(section: &str, result: std::result::Result<(), ValidationErrors>) -> Result<()> {
    let Err(errors) = result else {
        return Ok(());
    };
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    let Some((field, errs)) = fields.first() else {
        return Err(ConfigError::validation(errors.to_string(), section).into());
    };
    let message = errs
        .first()
        .and_then(|e| e.message.as_ref())
        .map_or_else(|| format!("Invalid value for {section}.{field}"), ToString::to_string);
    Err(ConfigError::validation(message, format!("{section}.{field}")).into())
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["dms-sync.yaml", "dms-sync.yml"];

/// Finds the configuration file in the current directory or parent directories.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::planner::MergePolicy;
    use std::collections::HashMap;

    const MINIMAL: &str = r"
project:
  name: assets
cdf:
  project: acme-dev
";

    #[test]
    fn test_parse_minimal_config() {
        let config = ConfigParser::new().parse_yaml(MINIMAL, None).expect("valid config");
        assert_eq!(config.project.name, "assets");
        assert_eq!(config.cdf.base_url, "https://api.cognitedata.com");
        assert_eq!(config.cdf.timeout_secs, 30);
        assert_eq!(config.deploy.existing, ExistingPolicy::Update);
        assert_eq!(config.schema, PathBuf::from("schema.yaml"));
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r"
project:
  name: assets
cdf:
  base_url: https://westeurope-1.cognitedata.com
  project: acme-prod
  timeout_secs: 60
deploy:
  existing: force
  governance: rebuild
  restore_on_failure: true
  cache: false
schema: model/assets.yaml
";
        let config = ConfigParser::new().parse_yaml(yaml, None).expect("valid config");
        assert_eq!(config.deploy.existing, ExistingPolicy::Force);
        assert_eq!(config.deploy.governance, MergePolicy::Overwrite);
        assert!(config.deploy.restore_on_failure);
        assert!(!config.deploy.cache);
    }

    #[test]
    fn test_invalid_field_is_reported() {
        let yaml = r"
project:
  name: assets
cdf:
  project: ''
";
        let err = ConfigParser::new().parse_yaml(yaml, None).expect_err("empty project");
        match err {
            SyncError::Config(ConfigError::ValidationError { field, .. }) => {
                assert_eq!(field.as_deref(), Some("cdf.project"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ConfigParser::new().parse_yaml(MINIMAL, None).expect("valid config");
        let env = HashMap::from([
            (ENV_CDF_PROJECT, "acme-test"),
            (ENV_EXISTING, "recreate"),
        ]);
        ConfigParser::apply_env_overrides(&mut config, |name| env.get(name).map(ToString::to_string))
            .expect("valid overrides");

        assert_eq!(config.cdf.project, "acme-test");
        assert_eq!(config.deploy.existing, ExistingPolicy::Recreate);
    }

    #[test]
    fn test_invalid_env_override_is_rejected() {
        let mut config = ConfigParser::new().parse_yaml(MINIMAL, None).expect("valid config");
        let result = ConfigParser::apply_env_overrides(&mut config, |name| {
            (name == ENV_EXISTING).then(|| String::from("sometimes"))
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("dms-sync.yaml"), MINIMAL).expect("write");
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).expect("mkdir");

        let found = find_config_file(&nested).expect("found");
        assert_eq!(found, dir.path().join("dms-sync.yaml"));
    }

    #[test]
    fn test_load_schema_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("schema.yaml");
        std::fs::write(
            &path,
            r"
spaces:
  - space: sp
containers:
  - space: sp
    externalId: Asset
    properties:
      name:
        type:
          type: text
views:
  - space: sp
    externalId: Asset
    version: v1
    properties:
      name:
        container:
          space: sp
          externalId: Asset
        containerPropertyIdentifier: name
",
        )
        .expect("write");

        let schema = ConfigParser::new().load_schema(&path).expect("schema");
        assert_eq!(schema.resource_count(), 3);
        assert!(schema.data_models.is_empty());
    }

    #[test]
    fn test_missing_schema_file() {
        let err = ConfigParser::new()
            .load_schema("/nonexistent/schema.yaml")
            .expect_err("missing");
        assert!(matches!(err, SyncError::Config(ConfigError::FileNotFound { .. })));
    }
}
