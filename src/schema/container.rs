//! Containers.
//!
//! A container holds typed properties and may declare constraints and
//! indexes. The `requires` constraint makes one container depend on another,
//! which is what the container dependency sort walks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ids::ContainerId;
use super::{ResourceKind, UsedFor};
use crate::planner::{DifferenceFactory, MergePolicy, ResourceDifference};

/// Default collation reported by the API for text properties.
pub const DEFAULT_COLLATION: &str = "ucs_basic";

/// Type of a container property, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PropertyType {
    /// Text.
    Text {
        /// Whether the property holds a list.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        list: Option<bool>,
        /// Collation used for sorting.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        collation: Option<String>,
    },
    /// Boolean.
    Boolean {
        /// Whether the property holds a list.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        list: Option<bool>,
    },
    /// 32-bit float.
    Float32 {
        /// Whether the property holds a list.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        list: Option<bool>,
    },
    /// 64-bit float.
    Float64 {
        /// Whether the property holds a list.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        list: Option<bool>,
    },
    /// 32-bit integer.
    Int32 {
        /// Whether the property holds a list.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        list: Option<bool>,
    },
    /// 64-bit integer.
    Int64 {
        /// Whether the property holds a list.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        list: Option<bool>,
    },
    /// Timestamp.
    Timestamp {
        /// Whether the property holds a list.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        list: Option<bool>,
    },
    /// Calendar date.
    Date {
        /// Whether the property holds a list.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        list: Option<bool>,
    },
    /// Arbitrary JSON.
    Json {
        /// Whether the property holds a list.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        list: Option<bool>,
    },
    /// Reference to a time series.
    Timeseries {
        /// Whether the property holds a list.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        list: Option<bool>,
    },
    /// Reference to a file.
    File {
        /// Whether the property holds a list.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        list: Option<bool>,
    },
    /// Reference to a sequence.
    Sequence {
        /// Whether the property holds a list.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        list: Option<bool>,
    },
    /// Direct relation to another node.
    Direct {
        /// Container the target node is required to have data in.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        container: Option<ContainerId>,
        /// Whether the property holds a list.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        list: Option<bool>,
    },
    /// Enumeration.
    Enum {
        /// Allowed values with their metadata.
        values: BTreeMap<String, serde_json::Value>,
        /// Value used when none of the allowed values apply.
        #[serde(
            default,
            rename = "unknownValue",
            skip_serializing_if = "Option::is_none"
        )]
        unknown_value: Option<String>,
    },
}

/// A property of a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerProperty {
    /// Property type.
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    /// Whether the property may be null. Defaults to true server-side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    /// Whether the value is generated. Defaults to false server-side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_increment: Option<bool>,
    /// Whether the value can change after creation. Defaults to false server-side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immutable: Option<bool>,
    /// Default value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A container constraint, tagged by `constraintType`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "constraintType", rename_all = "camelCase")]
pub enum Constraint {
    /// Instances must also have data in the required container.
    Requires {
        /// The required container.
        require: ContainerId,
    },
    /// The combination of properties must be unique.
    Uniqueness {
        /// Properties forming the unique key.
        properties: Vec<String>,
        /// Whether uniqueness is scoped to a space.
        #[serde(default, rename = "bySpace", skip_serializing_if = "Option::is_none")]
        by_space: Option<bool>,
    },
}

/// A container index, tagged by `indexType`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "indexType", rename_all = "camelCase")]
pub enum Index {
    /// B-tree index.
    Btree {
        /// Indexed properties.
        properties: Vec<String>,
        /// Whether the index supports cursoring.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cursorable: Option<bool>,
        /// Whether the index is scoped to a space.
        #[serde(default, rename = "bySpace", skip_serializing_if = "Option::is_none")]
        by_space: Option<bool>,
    },
    /// Inverted index for list properties.
    Inverted {
        /// Indexed properties.
        properties: Vec<String>,
    },
}

/// Write form of a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerApply {
    /// Owning space.
    pub space: String,
    /// External identifier.
    pub external_id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Instance kinds this container applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_for: Option<UsedFor>,
    /// Properties keyed by identifier.
    #[serde(default)]
    pub properties: BTreeMap<String, ContainerProperty>,
    /// Constraints keyed by identifier.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub constraints: BTreeMap<String, Constraint>,
    /// Indexes keyed by identifier.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub indexes: BTreeMap<String, Index>,
}

/// Read form of a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Owning space.
    pub space: String,
    /// External identifier.
    pub external_id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Instance kinds this container applies to; always reported.
    #[serde(default)]
    pub used_for: UsedFor,
    /// Properties keyed by identifier.
    #[serde(default)]
    pub properties: BTreeMap<String, ContainerProperty>,
    /// Constraints keyed by identifier.
    #[serde(default)]
    pub constraints: BTreeMap<String, Constraint>,
    /// Indexes keyed by identifier.
    #[serde(default)]
    pub indexes: BTreeMap<String, Index>,
    /// Whether this is a system container.
    #[serde(default)]
    pub is_global: bool,
    /// Creation time in epoch milliseconds.
    pub created_time: i64,
    /// Last update time in epoch milliseconds.
    pub last_updated_time: i64,
}

/// The container resource kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerKind;

impl PropertyType {
    /// Fills the defaults the API reports for omitted fields.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut normalized = self.clone();
        match &mut normalized {
            Self::Text { list, collation } => {
                list.get_or_insert(false);
                collation.get_or_insert_with(|| DEFAULT_COLLATION.to_string());
            }
            Self::Boolean { list }
            | Self::Float32 { list }
            | Self::Float64 { list }
            | Self::Int32 { list }
            | Self::Int64 { list }
            | Self::Timestamp { list }
            | Self::Date { list }
            | Self::Json { list }
            | Self::Timeseries { list }
            | Self::File { list }
            | Self::Sequence { list }
            | Self::Direct { list, .. } => {
                list.get_or_insert(false);
            }
            Self::Enum { .. } => {}
        }
        normalized
    }
}

impl ContainerProperty {
    /// Creates a nullable property of the given type.
    #[must_use]
    pub const fn new(property_type: PropertyType) -> Self {
        Self {
            property_type,
            nullable: None,
            auto_increment: None,
            immutable: None,
            default_value: None,
            name: None,
            description: None,
        }
    }

    /// Fills the defaults the API reports for omitted fields.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            property_type: self.property_type.normalized(),
            nullable: Some(self.nullable.unwrap_or(true)),
            auto_increment: Some(self.auto_increment.unwrap_or(false)),
            immutable: Some(self.immutable.unwrap_or(false)),
            ..self.clone()
        }
    }
}

impl Constraint {
    /// Fills the defaults the API reports for omitted fields.
    #[must_use]
    pub fn normalized(&self) -> Self {
        match self {
            Self::Uniqueness { properties, by_space } => Self::Uniqueness {
                properties: properties.clone(),
                by_space: Some(by_space.unwrap_or(false)),
            },
            Self::Requires { .. } => self.clone(),
        }
    }
}

impl Index {
    /// Fills the defaults the API reports for omitted fields.
    #[must_use]
    pub fn normalized(&self) -> Self {
        match self {
            Self::Btree {
                properties,
                cursorable,
                by_space,
            } => Self::Btree {
                properties: properties.clone(),
                cursorable: Some(cursorable.unwrap_or(false)),
                by_space: Some(by_space.unwrap_or(false)),
            },
            Self::Inverted { .. } => self.clone(),
        }
    }
}

impl ContainerApply {
    /// Creates an empty container.
    #[must_use]
    pub fn new(space: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            space: space.into(),
            external_id: external_id.into(),
            name: None,
            description: None,
            used_for: None,
            properties: BTreeMap::new(),
            constraints: BTreeMap::new(),
            indexes: BTreeMap::new(),
        }
    }

    /// Containers this container requires through `requires` constraints.
    #[must_use]
    pub fn required_containers(&self) -> Vec<ContainerId> {
        required_containers(&self.constraints)
    }
}

impl Container {
    /// Containers this container requires through `requires` constraints.
    #[must_use]
    pub fn required_containers(&self) -> Vec<ContainerId> {
        required_containers(&self.constraints)
    }
}

fn required_containers(constraints: &BTreeMap<String, Constraint>) -> Vec<ContainerId> {
    constraints
        .values()
        .filter_map(|c| match c {
            Constraint::Requires { require } => Some(require.clone()),
            Constraint::Uniqueness { .. } => None,
        })
        .collect()
}

impl ResourceKind for ContainerKind {
    type Id = ContainerId;
    type Write = ContainerApply;
    type Read = Container;

    const NAME: &'static str = "container";
    const ENDPOINT: &'static str = "containers";

    fn write_id(item: &ContainerApply) -> ContainerId {
        ContainerId::new(&item.space, &item.external_id)
    }

    fn read_id(item: &Container) -> ContainerId {
        ContainerId::new(&item.space, &item.external_id)
    }

    fn as_write(item: &Container) -> ContainerApply {
        ContainerApply {
            space: item.space.clone(),
            external_id: item.external_id.clone(),
            name: item.name.clone(),
            description: item.description.clone(),
            used_for: Some(item.used_for),
            properties: item.properties.clone(),
            constraints: item.constraints.clone(),
            indexes: item.indexes.clone(),
        }
    }

    /// The remote always reports `usedFor` and the flags of properties,
    /// constraints and indexes, so a local container that omits them gets the
    /// server defaults injected before comparison.
    fn normalize(item: &ContainerApply) -> ContainerApply {
        ContainerApply {
            used_for: Some(item.used_for.unwrap_or_default()),
            properties: item
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.normalized()))
                .collect(),
            constraints: item
                .constraints
                .iter()
                .map(|(k, v)| (k.clone(), v.normalized()))
                .collect(),
            indexes: item
                .indexes
                .iter()
                .map(|(k, v)| (k.clone(), v.normalized()))
                .collect(),
            ..item.clone()
        }
    }

    fn dependencies(item: &ContainerApply) -> Vec<ContainerId> {
        item.required_containers()
    }

    fn difference(
        new: &ContainerApply,
        previous: &ContainerApply,
        policy: MergePolicy,
    ) -> ResourceDifference {
        let mut diff = ResourceDifference::new(Self::write_id(new));
        DifferenceFactory::nullable_primary(&mut diff, "name", new.name.as_ref(), previous.name.as_ref());
        DifferenceFactory::nullable_primary(
            &mut diff,
            "description",
            new.description.as_ref(),
            previous.description.as_ref(),
        );
        DifferenceFactory::nullable_primary(
            &mut diff,
            "usedFor",
            new.used_for.as_ref(),
            previous.used_for.as_ref(),
        );
        DifferenceFactory::comparable_by_id(
            &mut diff,
            "properties",
            &new.properties,
            &previous.properties,
            policy,
        );
        DifferenceFactory::comparable_by_id(
            &mut diff,
            "constraints",
            &new.constraints,
            &previous.constraints,
            policy,
        );
        DifferenceFactory::comparable_by_id(&mut diff, "indexes", &new.indexes, &previous.indexes, policy);
        diff
    }

    fn merge(new: &ContainerApply, previous: &ContainerApply) -> ContainerApply {
        ContainerApply {
            properties: DifferenceFactory::merge_by_id(&new.properties, &previous.properties),
            constraints: DifferenceFactory::merge_by_id(&new.constraints, &previous.constraints),
            indexes: DifferenceFactory::merge_by_id(&new.indexes, &previous.indexes),
            ..new.clone()
        }
    }
}
