//! Spaces.

use serde::{Deserialize, Serialize};

use super::ResourceKind;
use super::ids::SpaceId;
use crate::planner::{DifferenceFactory, MergePolicy, ResourceDifference};

/// Write form of a space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceApply {
    /// Space identifier.
    pub space: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Read form of a space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Space {
    /// Space identifier.
    pub space: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether this is a system space.
    #[serde(default)]
    pub is_global: bool,
    /// Creation time in epoch milliseconds.
    pub created_time: i64,
    /// Last update time in epoch milliseconds.
    pub last_updated_time: i64,
}

/// The space resource kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpaceKind;

impl SpaceApply {
    /// Creates a space with only its identifier set.
    #[must_use]
    pub fn new(space: impl Into<String>) -> Self {
        Self {
            space: space.into(),
            name: None,
            description: None,
        }
    }
}

impl ResourceKind for SpaceKind {
    type Id = SpaceId;
    type Write = SpaceApply;
    type Read = Space;

    const NAME: &'static str = "space";
    const ENDPOINT: &'static str = "spaces";

    fn write_id(item: &SpaceApply) -> SpaceId {
        SpaceId::new(&item.space)
    }

    fn read_id(item: &Space) -> SpaceId {
        SpaceId::new(&item.space)
    }

    fn as_write(item: &Space) -> SpaceApply {
        SpaceApply {
            space: item.space.clone(),
            name: item.name.clone(),
            description: item.description.clone(),
        }
    }

    fn difference(new: &SpaceApply, previous: &SpaceApply, _policy: MergePolicy) -> ResourceDifference {
        let mut diff = ResourceDifference::new(Self::write_id(new));
        DifferenceFactory::nullable_primary(&mut diff, "name", new.name.as_ref(), previous.name.as_ref());
        DifferenceFactory::nullable_primary(
            &mut diff,
            "description",
            new.description.as_ref(),
            previous.description.as_ref(),
        );
        diff
    }
}
