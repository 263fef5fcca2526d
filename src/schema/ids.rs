//! Resource identities.
//!
//! Every resource kind is addressed by its own identity shape. Identities are
//! immutable, hashable and ordered so they can key caches and drive
//! deterministic ordering.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpaceId {
    /// Space identifier.
    pub space: String,
}

/// Identity of a container: `(space, external_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerId {
    /// Owning space.
    pub space: String,
    /// External identifier within the space.
    pub external_id: String,
}

/// Identity of a view: `(space, external_id, version)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewId {
    /// Owning space.
    pub space: String,
    /// External identifier within the space.
    pub external_id: String,
    /// Version of the view.
    pub version: String,
}

/// Identity of a data model: `(space, external_id, version)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataModelId {
    /// Owning space.
    pub space: String,
    /// External identifier within the space.
    pub external_id: String,
    /// Version of the data model.
    pub version: String,
}

/// Reference to either a view or a container, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SourceRef {
    /// A view reference.
    View(ViewId),
    /// A container reference.
    Container(ContainerId),
}

impl SpaceId {
    /// Creates a space identity.
    #[must_use]
    pub fn new(space: impl Into<String>) -> Self {
        Self {
            space: space.into(),
        }
    }
}

impl ContainerId {
    /// Creates a container identity.
    #[must_use]
    pub fn new(space: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            space: space.into(),
            external_id: external_id.into(),
        }
    }
}

impl ViewId {
    /// Creates a view identity.
    #[must_use]
    pub fn new(
        space: impl Into<String>,
        external_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            space: space.into(),
            external_id: external_id.into(),
            version: version.into(),
        }
    }
}

impl DataModelId {
    /// Creates a data model identity.
    #[must_use]
    pub fn new(
        space: impl Into<String>,
        external_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            space: space.into(),
            external_id: external_id.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.space)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.space, self.external_id)
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}(version={})", self.space, self.external_id, self.version)
    }
}

impl fmt::Display for DataModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}(version={})", self.space, self.external_id, self.version)
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::View(id) => write!(f, "view {id}"),
            Self::Container(id) => write!(f, "container {id}"),
        }
    }
}
