//! Local schema validation.
//!
//! This module checks a local schema before anything is sent to the API:
//! identifiers must be unique and well formed, `requires` constraints and
//! view parents must not form cycles within the schema, and references that
//! cannot be resolved locally are reported as warnings.

use crate::error::{ConfigError, Result, SyncError};
use crate::loader::ResourceLoader;
use crate::schema::{
    ContainerId, ContainerKind, DataModelKind, DmsSchema, ResourceKind, SpaceKind, ViewId, ViewKind,
};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

/// Space identifiers reserved by the API.
const RESERVED_SPACES: &[&str] = &[
    "space", "cdf", "dms", "pg3", "shared", "system", "node", "instance", "edge", "schema",
    "extensions",
];

/// Property identifiers reserved by the API.
const RESERVED_PROPERTIES: &[&str] = &[
    "space",
    "externalId",
    "createdTime",
    "lastUpdatedTime",
    "deletedTime",
    "edge_id",
    "node_id",
    "project_id",
    "property_group",
    "seq",
    "tg_table_name",
    "extensions",
];

/// Validator for local schemas.
#[derive(Debug, Default)]
pub struct SchemaValidator;

/// Validation result containing all problems found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Errors, in the order they were found.
    pub errors: Vec<ConfigError>,
    /// Warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

impl SchemaValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a schema, returning the first error found.
    ///
    /// # Errors
    ///
    /// Returns the first validation error.
    pub fn validate(&self, schema: &DmsSchema) -> Result<ValidationResult> {
        let mut result = self.check(schema);
        if result.errors.is_empty() {
            debug!("Schema validation passed with {} warning(s)", result.warnings.len());
            return Ok(result);
        }
        Err(SyncError::Config(result.errors.remove(0)))
    }

    /// Collects every problem of a schema.
    #[must_use]
    pub fn check(&self, schema: &DmsSchema) -> ValidationResult {
        let mut result = ValidationResult::default();
        if schema.is_empty() {
            result.warnings.push(String::from("Schema defines no resources"));
            return result;
        }

        Self::check_duplicates::<SpaceKind>(&schema.spaces, &mut result);
        Self::check_duplicates::<ContainerKind>(&schema.containers, &mut result);
        Self::check_duplicates::<ViewKind>(&schema.views, &mut result);
        Self::check_duplicates::<DataModelKind>(&schema.data_models, &mut result);

        Self::check_identifiers(schema, &mut result);
        Self::check_cycles::<ContainerKind>(&schema.containers, &mut result);
        Self::check_cycles::<ViewKind>(&schema.views, &mut result);
        Self::check_references(schema, &mut result);
        result
    }

    fn check_duplicates<K: ResourceKind>(items: &[K::Write], result: &mut ValidationResult) {
        let mut seen = HashSet::new();
        for item in items {
            let id = K::write_id(item);
            if !seen.insert(id.clone()) {
                result.errors.push(ConfigError::DuplicateIdentifier {
                    kind: K::NAME.to_string(),
                    id: id.to_string(),
                });
            }
        }
    }

    fn check_identifiers(schema: &DmsSchema, result: &mut ValidationResult) {
        for space in &schema.spaces {
            check_space(&space.space, "spaces", result);
        }

        for (i, container) in schema.containers.iter().enumerate() {
            let prefix = format!("containers[{i}]");
            check_space(&container.space, &prefix, result);
            check_external_id(&container.external_id, &prefix, result);
            for key in container.properties.keys() {
                check_property(key, &format!("{prefix}.properties"), result);
            }
        }

        for (i, view) in schema.views.iter().enumerate() {
            let prefix = format!("views[{i}]");
            check_space(&view.space, &prefix, result);
            check_external_id(&view.external_id, &prefix, result);
            check_version(&view.version, &prefix, result);
            for key in view.properties.iter().flatten().map(|(k, _)| k) {
                check_property(key, &format!("{prefix}.properties"), result);
            }
        }

        for (i, model) in schema.data_models.iter().enumerate() {
            let prefix = format!("dataModels[{i}]");
            check_space(&model.space, &prefix, result);
            check_external_id(&model.external_id, &prefix, result);
            check_version(&model.version, &prefix, result);
        }
    }

    fn check_cycles<K: ResourceKind>(items: &[K::Write], result: &mut ValidationResult) {
        if let Err(err) = ResourceLoader::<K>::sort_by_dependencies(items) {
            result
                .errors
                .push(ConfigError::validation(err.to_string(), format!("{}s", K::NAME)));
        }
    }

    fn check_references(schema: &DmsSchema, result: &mut ValidationResult) {
        let spaces: BTreeSet<&str> = schema.spaces.iter().map(|s| s.space.as_str()).collect();
        let containers: BTreeSet<ContainerId> =
            schema.containers.iter().map(ContainerKind::write_id).collect();
        let views: BTreeSet<ViewId> = schema.views.iter().map(ViewKind::write_id).collect();

        let used_spaces = schema
            .containers
            .iter()
            .map(|c| c.space.as_str())
            .chain(schema.views.iter().map(|v| v.space.as_str()))
            .chain(schema.data_models.iter().map(|m| m.space.as_str()))
            .collect::<BTreeSet<_>>();
        for space in used_spaces.difference(&spaces) {
            result
                .warnings
                .push(format!("Space '{space}' is not defined locally and must exist remotely"));
        }

        for view in &schema.views {
            for container in view.referenced_containers().difference(&containers) {
                result.warnings.push(format!(
                    "View {} maps container {container} which is not defined locally",
                    ViewKind::write_id(view)
                ));
            }
        }

        for model in &schema.data_models {
            for view in model.views.iter().flatten().filter(|v| !views.contains(*v)) {
                result.warnings.push(format!(
                    "Data model {} lists view {view} which is not defined locally",
                    DataModelKind::write_id(model)
                ));
            }
        }
    }
}

fn check_space(space: &str, field: &str, result: &mut ValidationResult) {
    if RESERVED_SPACES.contains(&space) {
        result.errors.push(ConfigError::validation(
            format!("Space '{space}' is reserved"),
            format!("{field}.space"),
        ));
    } else if !is_valid_space(space) {
        result.errors.push(ConfigError::validation(
            format!("Space '{space}' is invalid. Must start with a letter and contain letters, digits, '_' or '-', at most 43 characters."),
            format!("{field}.space"),
        ));
    }
}

fn check_external_id(external_id: &str, field: &str, result: &mut ValidationResult) {
    if !is_valid_external_id(external_id) {
        result.errors.push(ConfigError::validation(
            format!("External id '{external_id}' is invalid. Must start with a letter and contain letters, digits or '_', at most 255 characters."),
            format!("{field}.externalId"),
        ));
    }
}

fn check_version(version: &str, field: &str, result: &mut ValidationResult) {
    if !is_valid_version(version) {
        result.errors.push(ConfigError::validation(
            format!("Version '{version}' is invalid. Must contain letters, digits, '.', '_' or '-', at most 43 characters."),
            format!("{field}.version"),
        ));
    }
}

fn check_property(identifier: &str, field: &str, result: &mut ValidationResult) {
    if RESERVED_PROPERTIES.contains(&identifier) {
        result.errors.push(ConfigError::validation(
            format!("Property identifier '{identifier}' is reserved"),
            format!("{field}.{identifier}"),
        ));
    } else if !is_valid_external_id(identifier) {
        result.errors.push(ConfigError::validation(
            format!("Property identifier '{identifier}' is invalid"),
            format!("{field}.{identifier}"),
        ));
    }
}

/// `[a-zA-Z][a-zA-Z0-9_-]{0,42}`
fn is_valid_space(space: &str) -> bool {
    let mut chars = space.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && space.len() <= 43
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// `[a-zA-Z]([a-zA-Z0-9_]{0,253}[a-zA-Z0-9])?`
fn is_valid_external_id(external_id: &str) -> bool {
    let mut chars = external_id.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && external_id.len() <= 255
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && external_id.chars().last().is_some_and(|c| c.is_ascii_alphanumeric())
}

/// `[a-zA-Z0-9]([.a-zA-Z0-9_-]{0,41}[a-zA-Z0-9])?`
fn is_valid_version(version: &str) -> bool {
    let mut chars = version.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
        && version.len() <= 43
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        && version.chars().last().is_some_and(|c| c.is_ascii_alphanumeric())
}

impl ValidationResult {
    /// Returns true if no errors were found.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for error in &self.errors {
            writeln!(f, "ERROR: {error}")?;
        }
        for warning in &self.warnings {
            writeln!(f, "WARNING: {warning}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        Constraint, ContainerApply, DataModelApply, SpaceApply, ViewApply,
    };

    fn requires(mut container: ContainerApply, target: &str) -> ContainerApply {
        container.constraints.insert(
            format!("requires{target}"),
            Constraint::Requires {
                require: ContainerId::new("sp", target),
            },
        );
        container
    }

    #[test]
    fn test_identifier_syntax() {
        assert!(is_valid_space("my_space-1"));
        assert!(!is_valid_space("1space"));
        assert!(!is_valid_space(&"s".repeat(44)));
        assert!(is_valid_external_id("Pump2"));
        assert!(!is_valid_external_id("Pump_"));
        assert!(!is_valid_external_id("Pump-2"));
        assert!(!is_valid_external_id(""));
        assert!(is_valid_version("v1.0"));
        assert!(is_valid_version("1"));
        assert!(!is_valid_version("v1."));
    }

    #[test]
    fn test_valid_schema() {
        let schema = DmsSchema {
            spaces: vec![SpaceApply::new("sp")],
            containers: vec![ContainerApply::new("sp", "Asset")],
            views: vec![ViewApply::new("sp", "Asset", "v1")],
            data_models: vec![DataModelApply::new("sp", "Model", "v1")],
        };
        let result = SchemaValidator::new().validate(&schema).expect("valid");
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 0);
    }

    #[test]
    fn test_duplicates_are_rejected() {
        let schema = DmsSchema {
            spaces: vec![SpaceApply::new("sp")],
            containers: vec![ContainerApply::new("sp", "Asset"), ContainerApply::new("sp", "Asset")],
            ..DmsSchema::default()
        };
        let err = SchemaValidator::new().validate(&schema).expect_err("duplicate");
        assert!(matches!(
            err,
            SyncError::Config(ConfigError::DuplicateIdentifier { ref id, .. }) if id == "sp:Asset"
        ));
    }

    #[test]
    fn test_reserved_names_are_rejected() {
        let mut container = ContainerApply::new("sp", "Asset");
        container.properties.insert(
            String::from("externalId"),
            crate::schema::ContainerProperty::new(crate::schema::PropertyType::Boolean { list: None }),
        );
        let schema = DmsSchema {
            spaces: vec![SpaceApply::new("cdf")],
            containers: vec![container],
            ..DmsSchema::default()
        };
        let result = SchemaValidator::new().check(&schema);
        assert_eq!(result.error_count(), 2);
    }

    #[test]
    fn test_requires_cycle_is_rejected() {
        let schema = DmsSchema {
            spaces: vec![SpaceApply::new("sp")],
            containers: vec![
                requires(ContainerApply::new("sp", "A"), "B"),
                requires(ContainerApply::new("sp", "B"), "A"),
            ],
            ..DmsSchema::default()
        };
        let result = SchemaValidator::new().check(&schema);
        assert_eq!(result.error_count(), 1);
        assert!(result.errors[0].to_string().contains("sp:A, sp:B"));
    }

    #[test]
    fn test_unresolved_references_are_warnings() {
        let mut model = DataModelApply::new("sp", "Model", "v1");
        model.views = Some(vec![ViewId::new("sp", "Remote", "v1")]);
        let schema = DmsSchema {
            containers: vec![ContainerApply::new("other", "Asset")],
            data_models: vec![model],
            ..DmsSchema::default()
        };
        let result = SchemaValidator::new().validate(&schema).expect("warnings only");
        assert_eq!(result.warning_count(), 3);
    }

    #[test]
    fn test_empty_schema_warns() {
        let result = SchemaValidator::new().check(&DmsSchema::default());
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 1);
    }
}
