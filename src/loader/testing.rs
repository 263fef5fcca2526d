//! In-memory transport for tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use crate::cdf::{ApiFailure, ApiResult, ResourceApi};
use crate::schema::{
    Container, ContainerApply, ContainerKind, DataModel, DataModelApply, DataModelKind, MappedProperty,
    PropertyType, ResourceKind, Space, SpaceApply, SpaceKind, View, ViewApply, ViewKind, ViewProperty,
    ViewPropertyApply, ViewRef,
};

/// Turns a write form into the read form the API would report.
pub trait Materialize: ResourceKind {
    fn materialize(item: &Self::Write) -> Self::Read;
}

/// Number of calls per operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calls {
    pub create: usize,
    pub retrieve: usize,
    pub update: usize,
    pub delete: usize,
}

struct FakeState<K: ResourceKind> {
    remote: BTreeMap<K::Id, K::Read>,
    calls: Calls,
    retrieved: Vec<Vec<K::Id>>,
    fail_create: HashSet<K::Id>,
    fail_update: HashSet<K::Id>,
    fail_delete: HashSet<K::Id>,
    strict_create: bool,
}

/// A fake remote holding resources in memory.
///
/// Items listed as failing make the whole call fail with status 400, naming
/// the failing items. A failed call applies nothing.
pub struct FakeApi<K: ResourceKind> {
    state: Mutex<FakeState<K>>,
}

impl<K: Materialize> FakeApi<K> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                remote: BTreeMap::new(),
                calls: Calls::default(),
                retrieved: Vec::new(),
                fail_create: HashSet::new(),
                fail_update: HashSet::new(),
                fail_delete: HashSet::new(),
                strict_create: false,
            }),
        }
    }

    /// Creating a resource that already exists fails.
    pub fn strict_create(self) -> Self {
        self.state.lock().expect("state").strict_create = true;
        self
    }

    pub fn seed(&self, items: &[K::Write]) {
        let mut state = self.state.lock().expect("state");
        for item in items {
            state.remote.insert(K::write_id(item), K::materialize(item));
        }
    }

    pub fn seed_read(&self, item: K::Read) {
        let mut state = self.state.lock().expect("state");
        state.remote.insert(K::read_id(&item), item);
    }

    pub fn fail_create(&self, ids: &[K::Id]) {
        self.state.lock().expect("state").fail_create.extend(ids.iter().cloned());
    }

    pub fn fail_update(&self, ids: &[K::Id]) {
        self.state.lock().expect("state").fail_update.extend(ids.iter().cloned());
    }

    pub fn fail_delete(&self, ids: &[K::Id]) {
        self.state.lock().expect("state").fail_delete.extend(ids.iter().cloned());
    }

    pub fn calls(&self) -> Calls {
        self.state.lock().expect("state").calls
    }

    pub fn retrieved_batches(&self) -> Vec<Vec<K::Id>> {
        self.state.lock().expect("state").retrieved.clone()
    }

    pub fn remote_ids(&self) -> Vec<K::Id> {
        self.state.lock().expect("state").remote.keys().cloned().collect()
    }

    pub fn remote(&self, id: &K::Id) -> Option<K::Read> {
        self.state.lock().expect("state").remote.get(id).cloned()
    }

    fn reject(ids: &[K::Id], failing: &HashSet<K::Id>) -> ApiResult<(), K::Id> {
        let failed: Vec<K::Id> = ids.iter().filter(|id| failing.contains(*id)).cloned().collect();
        if failed.is_empty() {
            return Ok(());
        }
        Err(ApiFailure::new(400, "Rejected by fake", failed))
    }

    fn apply(&self, items: &[K::Write], updating: bool) -> ApiResult<Vec<K::Read>, K::Id> {
        let mut state = self.state.lock().expect("state");
        let mut failing = if updating {
            state.fail_update.clone()
        } else {
            state.fail_create.clone()
        };
        if !updating && state.strict_create {
            failing.extend(state.remote.keys().cloned());
        }

        let ids: Vec<K::Id> = items.iter().map(K::write_id).collect();
        Self::reject(&ids, &failing)?;
        let mut applied = Vec::new();
        for item in items {
            let read = K::materialize(item);
            state.remote.insert(K::write_id(item), read.clone());
            applied.push(read);
        }
        Ok(applied)
    }
}

#[async_trait]
impl<K: Materialize> ResourceApi<K> for FakeApi<K> {
    async fn create(&self, items: &[K::Write]) -> ApiResult<Vec<K::Read>, K::Id> {
        self.state.lock().expect("state").calls.create += 1;
        self.apply(items, false)
    }

    async fn retrieve(&self, ids: &[K::Id]) -> ApiResult<Vec<K::Read>, K::Id> {
        let mut state = self.state.lock().expect("state");
        state.calls.retrieve += 1;
        state.retrieved.push(ids.to_vec());
        Ok(ids.iter().filter_map(|id| state.remote.get(id).cloned()).collect())
    }

    async fn update(&self, items: &[K::Write]) -> ApiResult<Vec<K::Read>, K::Id> {
        self.state.lock().expect("state").calls.update += 1;
        self.apply(items, true)
    }

    async fn delete(&self, ids: &[K::Id]) -> ApiResult<Vec<K::Id>, K::Id> {
        let mut state = self.state.lock().expect("state");
        state.calls.delete += 1;
        Self::reject(ids, &state.fail_delete)?;
        let mut deleted = Vec::new();
        for id in ids {
            if state.remote.remove(id).is_some() {
                deleted.push(id.clone());
            }
        }
        Ok(deleted)
    }
}

impl Materialize for SpaceKind {
    fn materialize(item: &SpaceApply) -> Space {
        Space {
            space: item.space.clone(),
            name: item.name.clone(),
            description: item.description.clone(),
            is_global: false,
            created_time: 0,
            last_updated_time: 0,
        }
    }
}

impl Materialize for ContainerKind {
    fn materialize(item: &ContainerApply) -> Container {
        Container {
            space: item.space.clone(),
            external_id: item.external_id.clone(),
            name: item.name.clone(),
            description: item.description.clone(),
            used_for: item.used_for.unwrap_or_default(),
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
            is_global: false,
            created_time: 0,
            last_updated_time: 0,
        }
    }
}

impl Materialize for ViewKind {
    fn materialize(item: &ViewApply) -> View {
        View {
            space: item.space.clone(),
            external_id: item.external_id.clone(),
            version: item.version.clone(),
            name: item.name.clone(),
            description: item.description.clone(),
            filter: item.filter.clone(),
            implements: item.implements.clone().unwrap_or_default(),
            properties: item
                .properties
                .iter()
                .flatten()
                .map(|(k, v)| (k.clone(), materialize_view_property(v)))
                .collect(),
            writable: true,
            used_for: Default::default(),
            is_global: false,
            created_time: 0,
            last_updated_time: 0,
        }
    }
}

impl FakeApi<ViewKind> {
    /// Read form of `child` as the API reports it: parent properties
    /// included, own properties taking precedence.
    pub fn inheriting(child: &ViewApply, parents: &[&ViewApply]) -> View {
        let mut view = ViewKind::materialize(child);
        let own = std::mem::take(&mut view.properties);
        for parent in parents {
            view.properties.extend(ViewKind::materialize(parent).properties);
        }
        view.properties.extend(own);
        view
    }
}

fn materialize_view_property(property: &ViewPropertyApply) -> ViewProperty {
    match property {
        ViewPropertyApply::Mapped(mapped) => ViewProperty::Mapped(MappedProperty {
            container: mapped.container.clone(),
            container_property_identifier: mapped.container_property_identifier.clone(),
            property_type: PropertyType::Text {
                list: Some(false),
                collation: Some(String::from("ucs_basic")),
            },
            nullable: true,
            auto_increment: false,
            immutable: false,
            default_value: None,
            name: mapped.name.clone(),
            description: mapped.description.clone(),
            source: mapped.source.clone(),
        }),
        ViewPropertyApply::Edge(edge) => ViewProperty::Edge(edge.clone()),
        ViewPropertyApply::Reverse(reverse) => ViewProperty::Reverse(reverse.clone()),
    }
}

impl Materialize for DataModelKind {
    fn materialize(item: &DataModelApply) -> DataModel {
        DataModel {
            space: item.space.clone(),
            external_id: item.external_id.clone(),
            version: item.version.clone(),
            name: item.name.clone(),
            description: item.description.clone(),
            views: item.views.iter().flatten().cloned().map(ViewRef::Id).collect(),
            is_global: false,
            created_time: 0,
            last_updated_time: 0,
        }
    }
}
