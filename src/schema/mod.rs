//! Data modeling resource definitions.
//!
//! This module describes the four resource kinds that make up a schema
//! (spaces, containers, views and data models) in both their *write* form
//! (what is sent to create/update) and their *read* form (what the API
//! returns). The [`ResourceKind`] trait ties the two forms together and
//! carries the per-kind identity, normalization, diff and merge rules.

mod container;
mod data_model;
mod ids;
mod space;
mod view;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use std::hash::Hash;

use crate::error::{PlanError, Result};
use crate::loader::ResourceLoader;
use crate::planner::{MergePolicy, ResourceDifference};

pub use container::{
    Constraint, Container, ContainerApply, ContainerKind, ContainerProperty, Index, PropertyType,
};
pub use data_model::{DataModel, DataModelApply, DataModelKind, ViewRef};
pub use ids::{ContainerId, DataModelId, SourceRef, SpaceId, ViewId};
pub use space::{Space, SpaceApply, SpaceKind};
pub use view::{
    DirectRelationReference, EdgeConnection, EdgeDirection, MappedProperty, MappedPropertyApply,
    PropertyId, ReverseDirectRelation, View, ViewApply, ViewKind, ViewProperty,
    ViewPropertyApply,
};

/// What a container (and the views over it) may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsedFor {
    /// Node instances only. The server-side default.
    #[default]
    Node,
    /// Edge instances only.
    Edge,
    /// Both nodes and edges.
    All,
}

/// Any representation of a resource that an identity can be extracted from.
#[derive(Debug)]
pub enum ResourceRef<'a, K: ResourceKind> {
    /// The desired (write) form.
    Write(&'a K::Write),
    /// The remote (read) form.
    Read(&'a K::Read),
    /// An untyped JSON payload, such as a raw API item.
    Raw(&'a serde_json::Value),
    /// A bare identity.
    Id(&'a K::Id),
}

impl<K: ResourceKind> Clone for ResourceRef<'_, K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: ResourceKind> Copy for ResourceRef<'_, K> {}

/// A kind of remote schema resource.
///
/// Implementors connect the write and read forms of one kind: how to get the
/// identity out of either, how to turn a read form back into a write form,
/// and how two write forms are normalized, compared and merged.
#[async_trait]
pub trait ResourceKind: Sized + Send + Sync + 'static {
    /// Identity type.
    type Id: Clone
        + Eq
        + Hash
        + Ord
        + Debug
        + Display
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;
    /// Desired (write) form.
    type Write: Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static;
    /// Remote (read) form.
    type Read: Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Singular kind name used in logs and reports.
    const NAME: &'static str;
    /// Path segment of the API endpoint (`models/{ENDPOINT}`).
    const ENDPOINT: &'static str;

    /// Identity of a write form.
    fn write_id(item: &Self::Write) -> Self::Id;

    /// Identity of a read form.
    fn read_id(item: &Self::Read) -> Self::Id;

    /// Projects a read form onto the write form that would produce it.
    fn as_write(item: &Self::Read) -> Self::Write;

    /// Identity of any representation of this kind.
    ///
    /// # Errors
    ///
    /// Returns an error if a raw payload does not contain a valid identity.
    fn get_id(item: ResourceRef<'_, Self>) -> Result<Self::Id> {
        match item {
            ResourceRef::Write(write) => Ok(Self::write_id(write)),
            ResourceRef::Read(read) => Ok(Self::read_id(read)),
            ResourceRef::Id(id) => Ok(id.clone()),
            ResourceRef::Raw(value) => serde_json::from_value(value.clone()).map_err(|e| {
                PlanError::InvalidIdentifier {
                    kind: Self::NAME.to_string(),
                    message: e.to_string(),
                }
                .into()
            }),
        }
    }

    /// Fills server-side defaults and canonical ordering so that semantically
    /// equal write forms compare equal.
    fn normalize(item: &Self::Write) -> Self::Write {
        item.clone()
    }

    /// Identities of same-kind resources that must exist before this one.
    fn dependencies(_item: &Self::Write) -> Vec<Self::Id> {
        Vec::new()
    }

    /// Structural difference between a desired and a previous write form.
    fn difference(
        new: &Self::Write,
        previous: &Self::Write,
        policy: MergePolicy,
    ) -> ResourceDifference;

    /// The resource to send when merging `new` into `previous`.
    fn merge(new: &Self::Write, _previous: &Self::Write) -> Self::Write {
        new.clone()
    }

    /// Write form of a remote resource suitable for comparison with a local one.
    ///
    /// Kinds whose read form carries derived data (such as inherited view
    /// properties) override this and may use the loader to resolve it.
    ///
    /// # Errors
    ///
    /// Returns an error if resolving related resources fails.
    async fn comparable_remote(
        _loader: &mut ResourceLoader<Self>,
        remote: &Self::Read,
    ) -> Result<Self::Write> {
        Ok(Self::as_write(remote))
    }
}

/// A complete local schema: the desired state of a deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DmsSchema {
    /// Spaces.
    #[serde(default)]
    pub spaces: Vec<SpaceApply>,
    /// Containers.
    #[serde(default)]
    pub containers: Vec<ContainerApply>,
    /// Views.
    #[serde(default)]
    pub views: Vec<ViewApply>,
    /// Data models.
    #[serde(default)]
    pub data_models: Vec<DataModelApply>,
}

impl DmsSchema {
    /// Returns true if the schema defines no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
            && self.containers.is_empty()
            && self.views.is_empty()
            && self.data_models.is_empty()
    }

    /// Total number of resources in the schema.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.spaces.len() + self.containers.len() + self.views.len() + self.data_models.len()
    }
}
