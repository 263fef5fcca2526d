//! Views.
//!
//! A view maps container properties and declares connections to other
//! views. Views that `implements` a parent inherit every parent property in
//! their read form, which has to be undone before a remote view can be
//! compared with its local definition.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::container::PropertyType;
use super::ids::{ContainerId, SourceRef, ViewId};
use super::{ResourceKind, UsedFor};
use crate::error::Result;
use crate::loader::ResourceLoader;
use crate::planner::{DifferenceFactory, MergePolicy, ResourceDifference};

/// Reference to the node that types an edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectRelationReference {
    /// Space of the type node.
    pub space: String,
    /// External identifier of the type node.
    pub external_id: String,
}

/// Direction in which an edge is traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeDirection {
    /// From the view's node outwards.
    #[default]
    Outwards,
    /// Towards the view's node.
    Inwards,
}

/// Identifies a property of a view or container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyId {
    /// Owner of the property.
    pub source: SourceRef,
    /// Property identifier within the owner.
    pub identifier: String,
}

/// A view property mapped onto a container property (write form).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedPropertyApply {
    /// Container holding the data.
    pub container: ContainerId,
    /// Property identifier within the container.
    pub container_property_identifier: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Target view of a direct relation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ViewId>,
}

/// A view property mapped onto a container property (read form).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedProperty {
    /// Container holding the data.
    pub container: ContainerId,
    /// Property identifier within the container.
    pub container_property_identifier: String,
    /// Type of the underlying container property.
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    /// Whether the property may be null.
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Whether the value is generated.
    #[serde(default)]
    pub auto_increment: bool,
    /// Whether the value is immutable.
    #[serde(default)]
    pub immutable: bool,
    /// Default value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Target view of a direct relation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ViewId>,
}

/// An edge connection to another view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeConnection {
    /// Node typing the edges.
    #[serde(rename = "type")]
    pub edge_type: DirectRelationReference,
    /// View of the nodes at the other end.
    pub source: ViewId,
    /// View of the edges themselves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_source: Option<ViewId>,
    /// Traversal direction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<EdgeDirection>,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `single_edge_connection` or `multi_edge_connection`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
}

/// A reverse direct relation: nodes pointing at this one through a property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverseDirectRelation {
    /// View of the pointing nodes.
    pub source: ViewId,
    /// Direct relation property the nodes point through.
    pub through: PropertyId,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `single_reverse_direct_relation` or `multi_reverse_direct_relation`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
}

/// A view property in write form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ViewPropertyApply {
    /// Mapped container property.
    Mapped(MappedPropertyApply),
    /// Reverse direct relation.
    Reverse(ReverseDirectRelation),
    /// Edge connection.
    Edge(EdgeConnection),
}

/// A view property in read form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ViewProperty {
    /// Mapped container property.
    Mapped(MappedProperty),
    /// Reverse direct relation.
    Reverse(ReverseDirectRelation),
    /// Edge connection.
    Edge(EdgeConnection),
}

/// Write form of a view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewApply {
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
    /// Instance filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<serde_json::Value>,
    /// Parent views.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implements: Option<Vec<ViewId>>,
    /// Properties keyed by identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, ViewPropertyApply>>,
}

/// Read form of a view; `properties` includes everything inherited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct View {
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
    /// Instance filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<serde_json::Value>,
    /// Parent views.
    #[serde(default)]
    pub implements: Vec<ViewId>,
    /// Properties keyed by identifier, inherited ones included.
    #[serde(default)]
    pub properties: BTreeMap<String, ViewProperty>,
    /// Whether instances can be written through the view.
    #[serde(default)]
    pub writable: bool,
    /// Instance kinds the view applies to.
    #[serde(default)]
    pub used_for: UsedFor,
    /// Whether this is a system view.
    #[serde(default)]
    pub is_global: bool,
    /// Creation time in epoch milliseconds.
    pub created_time: i64,
    /// Last update time in epoch milliseconds.
    pub last_updated_time: i64,
}

/// The view resource kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewKind;

const fn default_true() -> bool {
    true
}

impl ViewPropertyApply {
    /// Views this property points at: relation sources, edge sources and
    /// `through` owners that are views.
    #[must_use]
    pub fn referenced_views(&self) -> Vec<ViewId> {
        match self {
            Self::Mapped(mapped) => mapped.source.iter().cloned().collect(),
            Self::Edge(edge) => edge_views(edge),
            Self::Reverse(reverse) => reverse_views(reverse),
        }
    }
}

impl ViewProperty {
    /// Views this property points at.
    #[must_use]
    pub fn referenced_views(&self) -> Vec<ViewId> {
        match self {
            Self::Mapped(mapped) => mapped.source.iter().cloned().collect(),
            Self::Edge(edge) => edge_views(edge),
            Self::Reverse(reverse) => reverse_views(reverse),
        }
    }

    /// Write form of the property.
    #[must_use]
    pub fn as_write(&self) -> ViewPropertyApply {
        match self {
            Self::Mapped(mapped) => ViewPropertyApply::Mapped(MappedPropertyApply {
                container: mapped.container.clone(),
                container_property_identifier: mapped.container_property_identifier.clone(),
                name: mapped.name.clone(),
                description: mapped.description.clone(),
                source: mapped.source.clone(),
            }),
            Self::Edge(edge) => ViewPropertyApply::Edge(edge.clone()),
            Self::Reverse(reverse) => ViewPropertyApply::Reverse(reverse.clone()),
        }
    }
}

fn edge_views(edge: &EdgeConnection) -> Vec<ViewId> {
    std::iter::once(edge.source.clone())
        .chain(edge.edge_source.iter().cloned())
        .collect()
}

fn reverse_views(reverse: &ReverseDirectRelation) -> Vec<ViewId> {
    let mut views = vec![reverse.source.clone()];
    if let SourceRef::View(through) = &reverse.through.source {
        views.push(through.clone());
    }
    views
}

impl ViewApply {
    /// Creates a view without properties.
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
            filter: None,
            implements: None,
            properties: None,
        }
    }

    /// Containers mapped by the view's properties, deduplicated.
    #[must_use]
    pub fn referenced_containers(&self) -> BTreeSet<ContainerId> {
        self.properties
            .iter()
            .flatten()
            .filter_map(|(_, p)| match p {
                ViewPropertyApply::Mapped(mapped) => Some(mapped.container.clone()),
                _ => None,
            })
            .collect()
    }

    /// Views referenced by parents and properties, deduplicated.
    #[must_use]
    pub fn referenced_views(&self) -> BTreeSet<ViewId> {
        self.implements
            .iter()
            .flatten()
            .cloned()
            .chain(
                self.properties
                    .iter()
                    .flatten()
                    .flat_map(|(_, p)| p.referenced_views()),
            )
            .collect()
    }
}

impl View {
    /// Views reachable in one step.
    ///
    /// Parents are included with `include_ancestor`; property sources, edge
    /// sources and view-owned `through` properties with `include_connected`.
    #[must_use]
    pub fn connected_views(&self, include_connected: bool, include_ancestor: bool) -> Vec<ViewId> {
        let mut connected = Vec::new();
        if include_ancestor {
            connected.extend(self.implements.iter().cloned());
        }
        if include_connected {
            connected.extend(self.properties.values().flat_map(ViewProperty::referenced_views));
        }
        connected
    }

    /// Copy of the view without the properties it inherits unchanged from
    /// any of `ancestors`. Overridden properties are kept.
    #[must_use]
    pub fn without_inherited(&self, ancestors: &[Self]) -> Self {
        let own_id = ViewKind::read_id(self);
        let mut stripped = self.clone();
        stripped.properties.retain(|name, property| {
            !ancestors
                .iter()
                .filter(|a| ViewKind::read_id(a) != own_id)
                .any(|ancestor| ancestor.properties.get(name) == Some(property))
        });
        stripped
    }
}

#[async_trait]
impl ResourceKind for ViewKind {
    type Id = ViewId;
    type Write = ViewApply;
    type Read = View;

    const NAME: &'static str = "view";
    const ENDPOINT: &'static str = "views";

    fn write_id(item: &ViewApply) -> ViewId {
        ViewId::new(&item.space, &item.external_id, &item.version)
    }

    fn read_id(item: &View) -> ViewId {
        ViewId::new(&item.space, &item.external_id, &item.version)
    }

    fn as_write(item: &View) -> ViewApply {
        ViewApply {
            space: item.space.clone(),
            external_id: item.external_id.clone(),
            version: item.version.clone(),
            name: item.name.clone(),
            description: item.description.clone(),
            filter: item.filter.clone(),
            implements: Some(item.implements.clone()),
            properties: Some(
                item.properties
                    .iter()
                    .map(|(k, v)| (k.clone(), v.as_write()))
                    .collect(),
            ),
        }
    }

    /// Empty `implements` and `properties` are the same as absent ones.
    fn normalize(item: &ViewApply) -> ViewApply {
        ViewApply {
            implements: item.implements.clone().filter(|i| !i.is_empty()),
            properties: item.properties.clone().filter(|p| !p.is_empty()),
            ..item.clone()
        }
    }

    fn dependencies(item: &ViewApply) -> Vec<ViewId> {
        item.implements.clone().unwrap_or_default()
    }

    fn difference(new: &ViewApply, previous: &ViewApply, policy: MergePolicy) -> ResourceDifference {
        let mut diff = ResourceDifference::new(Self::write_id(new));
        DifferenceFactory::nullable_primary(&mut diff, "name", new.name.as_ref(), previous.name.as_ref());
        DifferenceFactory::nullable_primary(
            &mut diff,
            "description",
            new.description.as_ref(),
            previous.description.as_ref(),
        );
        DifferenceFactory::nullable_primary(&mut diff, "filter", new.filter.as_ref(), previous.filter.as_ref());
        DifferenceFactory::nullable_primary(
            &mut diff,
            "implements",
            new.implements.as_ref(),
            previous.implements.as_ref(),
        );
        let empty = BTreeMap::new();
        DifferenceFactory::comparable_by_id(
            &mut diff,
            "properties",
            new.properties.as_ref().unwrap_or(&empty),
            previous.properties.as_ref().unwrap_or(&empty),
            policy,
        );
        diff
    }

    fn merge(new: &ViewApply, previous: &ViewApply) -> ViewApply {
        let empty = BTreeMap::new();
        let properties = DifferenceFactory::merge_by_id(
            new.properties.as_ref().unwrap_or(&empty),
            previous.properties.as_ref().unwrap_or(&empty),
        );
        ViewApply {
            properties: (!properties.is_empty()).then_some(properties),
            ..new.clone()
        }
    }

    async fn comparable_remote(loader: &mut ResourceLoader<Self>, remote: &View) -> Result<ViewApply> {
        if remote.implements.is_empty() {
            return Ok(Self::as_write(remote));
        }
        let ancestors = loader.retrieve_views(&remote.implements, false, true).await?;
        Ok(Self::as_write(&remote.without_inherited(&ancestors)))
    }
}
