//! Data models.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ResourceKind;
use super::ids::{DataModelId, ViewId};
use super::view::View;
use crate::planner::{DifferenceFactory, MergePolicy, ResourceDifference};

/// A view listed by a data model, either as a bare identity or inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ViewRef {
    /// Fully resolved view.
    Inline(Box<View>),
    /// Identity only.
    Id(ViewId),
}

/// Write form of a data model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataModelApply {
    /// Owning space.
    pub space: String,
    /// External identifier.
    pub external_id: String,
    /// Version.
    pub version: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Views in the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub views: Option<Vec<ViewId>>,
}

/// Read form of a data model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataModel {
    /// Owning space.
    pub space: String,
    /// External identifier.
    pub external_id: String,
    /// Version.
    pub version: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Views in the model.
    #[serde(default)]
    pub views: Vec<ViewRef>,
    /// Whether this is a system data model.
    #[serde(default)]
    pub is_global: bool,
    /// Creation time in epoch milliseconds.
    pub created_time: i64,
    /// Last update time in epoch milliseconds.
    pub last_updated_time: i64,
}

/// The data model resource kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataModelKind;

impl ViewRef {
    /// Identity of the referenced view.
    #[must_use]
    pub fn id(&self) -> ViewId {
        match self {
            Self::Inline(view) => ViewId::new(&view.space, &view.external_id, &view.version),
            Self::Id(id) => id.clone(),
        }
    }
}

impl DataModelApply {
    /// Creates a data model without views.
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
            name: None,
            description: None,
            views: None,
        }
    }
}

fn views_by_id(views: Option<&Vec<ViewId>>) -> BTreeMap<String, ViewId> {
    views
        .into_iter()
        .flatten()
        .map(|v| (v.to_string(), v.clone()))
        .collect()
}

impl ResourceKind for DataModelKind {
    type Id = DataModelId;
    type Write = DataModelApply;
    type Read = DataModel;

    const NAME: &'static str = "data model";
    const ENDPOINT: &'static str = "datamodels";

    fn write_id(item: &DataModelApply) -> DataModelId {
        DataModelId::new(&item.space, &item.external_id, &item.version)
    }

    fn read_id(item: &DataModel) -> DataModelId {
        DataModelId::new(&item.space, &item.external_id, &item.version)
    }

    fn as_write(item: &DataModel) -> DataModelApply {
        DataModelApply {
            space: item.space.clone(),
            external_id: item.external_id.clone(),
            version: item.version.clone(),
            name: item.name.clone(),
            description: item.description.clone(),
            views: Some(item.views.iter().map(ViewRef::id).collect()),
        }
    }

    /// Views form a set: order and duplicates do not matter.
    fn normalize(item: &DataModelApply) -> DataModelApply {
        let views = item.views.clone().map(|mut views| {
            views.sort();
            views.dedup();
            views
        });
        DataModelApply {
            views: views.filter(|v| !v.is_empty()),
            ..item.clone()
        }
    }

    fn difference(
        new: &DataModelApply,
        previous: &DataModelApply,
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
        DifferenceFactory::comparable_by_id(
            &mut diff,
            "views",
            &views_by_id(new.views.as_ref()),
            &views_by_id(previous.views.as_ref()),
            policy,
        );
        diff
    }

    /// Local views first, in local order, followed by remote-only views.
    fn merge(new: &DataModelApply, previous: &DataModelApply) -> DataModelApply {
        let mut views = new.views.clone().unwrap_or_default();
        for view in previous.views.iter().flatten() {
            if !views.contains(view) {
                views.push(view.clone());
            }
        }
        DataModelApply {
            views: (!views.is_empty()).then_some(views),
            ..new.clone()
        }
    }
}
