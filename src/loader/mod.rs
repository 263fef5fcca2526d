//! Resource loaders.
//!
//! A [`ResourceLoader`] wraps the remote CRUD operations of one resource
//! kind behind an identity-keyed cache. Kind-specific loading (recursive
//! view and container retrieval, dependency ordering) lives in the
//! submodules as inherent impls on the concrete loader types.

mod container;
mod sort;
mod view;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cdf::{ApiResult, ResourceApi};
use crate::error::Result;
use crate::schema::{ContainerKind, DataModelKind, ResourceKind, ResourceRef, SpaceKind, ViewKind};

pub use container::MAX_CONTAINER_ROUNDS;

/// Loader for one resource kind.
pub struct ResourceLoader<K: ResourceKind> {
    /// Remote transport.
    api: Arc<dyn ResourceApi<K>>,
    /// Read forms keyed by identity.
    cache: HashMap<K::Id, K::Read>,
    /// Whether results are kept between calls.
    cache_enabled: bool,
}

/// Result of a recursive retrieval.
#[derive(Debug, Clone)]
pub struct RetrievedClosure<R> {
    /// Every resource resolved, requested ones first, in discovery order.
    pub items: Vec<R>,
    /// Number of rounds performed.
    pub rounds: usize,
    /// True if the round limit stopped the traversal with ids outstanding.
    pub truncated: bool,
}

/// Outcome of [`ResourceLoader::create_force`].
#[derive(Debug, Clone)]
pub struct ForcedCreate<K: ResourceKind> {
    /// Created resources, or the failure that ended the escalation.
    pub result: ApiResult<Vec<K::Read>, K::Id>,
    /// Remote resources deleted on the way, as they were before deletion.
    pub deleted: Vec<K::Read>,
}

/// One loader per resource kind, sharing a transport.
#[derive(Debug)]
pub struct SchemaLoaders {
    /// Space loader.
    pub spaces: ResourceLoader<SpaceKind>,
    /// Container loader.
    pub containers: ResourceLoader<ContainerKind>,
    /// View loader.
    pub views: ResourceLoader<ViewKind>,
    /// Data model loader.
    pub data_models: ResourceLoader<DataModelKind>,
}

impl SchemaLoaders {
    /// Creates loaders for every kind on top of one transport.
    #[must_use]
    pub fn new<A>(api: &Arc<A>, cache_enabled: bool) -> Self
    where
        A: ResourceApi<SpaceKind>
            + ResourceApi<ContainerKind>
            + ResourceApi<ViewKind>
            + ResourceApi<DataModelKind>
            + 'static,
    {
        Self {
            spaces: ResourceLoader::<SpaceKind>::with_cache(api.clone(), cache_enabled),
            containers: ResourceLoader::<ContainerKind>::with_cache(api.clone(), cache_enabled),
            views: ResourceLoader::<ViewKind>::with_cache(api.clone(), cache_enabled),
            data_models: ResourceLoader::<DataModelKind>::with_cache(api.clone(), cache_enabled),
        }
    }

    /// Clears every cache.
    pub fn bust_caches(&mut self) {
        self.spaces.bust_cache();
        self.containers.bust_cache();
        self.views.bust_cache();
        self.data_models.bust_cache();
    }
}

impl<K: ResourceKind> ResourceLoader<K> {
    /// Creates a loader with caching enabled.
    #[must_use]
    pub fn new(api: Arc<dyn ResourceApi<K>>) -> Self {
        Self::with_cache(api, true)
    }

    /// Creates a loader, choosing whether to cache.
    #[must_use]
    pub fn with_cache(api: Arc<dyn ResourceApi<K>>, cache_enabled: bool) -> Self {
        Self {
            api,
            cache: HashMap::new(),
            cache_enabled,
        }
    }

    /// Returns true if results are cached between calls.
    #[must_use]
    pub const fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    /// Identity of any representation of this loader's kind.
    ///
    /// # Errors
    ///
    /// Returns an error if a raw payload carries no valid identity.
    pub fn get_id(item: ResourceRef<'_, K>) -> Result<K::Id> {
        K::get_id(item)
    }

    /// Cached read form of a resource.
    #[must_use]
    pub fn cached(&self, id: &K::Id) -> Option<&K::Read> {
        self.cache.get(id)
    }

    /// Number of cached resources.
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Clears the cache.
    pub fn bust_cache(&mut self) {
        self.cache.clear();
    }

    /// Creates resources.
    ///
    /// # Errors
    ///
    /// Returns the transport failure. A rejected batch leaves the cache as it was.
    pub async fn create(&mut self, items: &[K::Write]) -> ApiResult<Vec<K::Read>, K::Id> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let created = self.api.create(items).await?;
        self.remember(&created);
        Ok(created)
    }

    /// Retrieves resources, cache first.
    ///
    /// Only identities missing from the cache are fetched. Identities that do
    /// not exist remotely are omitted from the result, which follows the
    /// requested order.
    ///
    /// # Errors
    ///
    /// Returns the transport failure.
    pub async fn retrieve(&mut self, ids: &[K::Id]) -> ApiResult<Vec<K::Read>, K::Id> {
        let mut requested = Vec::with_capacity(ids.len());
        let mut seen = HashSet::new();
        for id in ids {
            if seen.insert(id) {
                requested.push(id.clone());
            }
        }

        if !self.cache_enabled {
            let fetched = self.api.retrieve(&requested).await?;
            let by_id: HashMap<K::Id, K::Read> =
                fetched.into_iter().map(|item| (K::read_id(&item), item)).collect();
            return Ok(requested.iter().filter_map(|id| by_id.get(id).cloned()).collect());
        }

        let missing: Vec<K::Id> = requested
            .iter()
            .filter(|id| !self.cache.contains_key(*id))
            .cloned()
            .collect();
        if !missing.is_empty() {
            debug!("Cache miss for {} {}(s)", missing.len(), K::NAME);
            let fetched = self.api.retrieve(&missing).await?;
            self.remember(&fetched);
        }

        Ok(requested.iter().filter_map(|id| self.cache.get(id).cloned()).collect())
    }

    /// Updates resources in place.
    ///
    /// # Errors
    ///
    /// Returns the transport failure.
    pub async fn update(&mut self, items: &[K::Write]) -> ApiResult<Vec<K::Read>, K::Id> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let updated = self.api.update(items).await?;
        self.remember(&updated);
        Ok(updated)
    }

    /// Deletes resources by identity.
    ///
    /// # Errors
    ///
    /// Returns the transport failure.
    pub async fn delete(&mut self, ids: &[K::Id]) -> ApiResult<Vec<K::Id>, K::Id> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let deleted = self.api.delete(ids).await?;
        self.forget(ids);
        Ok(deleted)
    }

    /// Deletes resources given in any representation.
    ///
    /// # Errors
    ///
    /// Returns an error if an identity cannot be extracted or the delete fails.
    pub async fn delete_resources(&mut self, items: &[ResourceRef<'_, K>]) -> Result<Vec<K::Id>> {
        let ids = items
            .iter()
            .map(|item| K::get_id(*item))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.delete(&ids).await?)
    }

    /// Creates resources, deleting and recreating those the API rejects.
    ///
    /// A rejected batch applies nothing, so after deleting the blamed items
    /// the whole batch is sent again. Each identity is deleted at most once
    /// per call. When the API only blames items already deleted, the last
    /// failure is returned.
    ///
    /// Deleted resources are reported with their state before deletion,
    /// whatever the outcome of the create.
    pub async fn create_force(&mut self, items: &[K::Write]) -> ForcedCreate<K> {
        let mut tried: HashSet<K::Id> = HashSet::new();
        let mut deleted: Vec<K::Read> = Vec::new();

        loop {
            let failure = match self.create(items).await {
                Ok(created) => {
                    return ForcedCreate {
                        result: Ok(created),
                        deleted,
                    };
                }
                Err(failure) => failure,
            };

            let mut retry: Vec<K::Id> = failure
                .failed
                .iter()
                .filter(|id| !tried.contains(*id))
                .cloned()
                .collect();
            retry.sort();
            retry.dedup();
            if retry.is_empty() {
                return ForcedCreate {
                    result: Err(failure),
                    deleted,
                };
            }

            warn!(
                "Force-recreating {} {}(s) after create failure: {}",
                retry.len(),
                K::NAME,
                failure.message
            );
            let snapshots = match self.retrieve(&retry).await {
                Ok(snapshots) => snapshots,
                Err(failure) => {
                    return ForcedCreate {
                        result: Err(failure),
                        deleted,
                    };
                }
            };
            match self.delete(&retry).await {
                Ok(removed) => {
                    deleted.extend(
                        snapshots
                            .into_iter()
                            .filter(|snapshot| removed.contains(&K::read_id(snapshot))),
                    );
                }
                Err(failure) => {
                    return ForcedCreate {
                        result: Err(failure),
                        deleted,
                    };
                }
            }
            tried.extend(retry);
        }
    }

    /// Remote resource projected to a normalized write form, ready to be
    /// compared with or diffed against a local definition.
    ///
    /// # Errors
    ///
    /// Returns an error if resolving related resources fails.
    pub async fn comparable(&mut self, remote: &K::Read) -> Result<K::Write> {
        let write = K::comparable_remote(self, remote).await?;
        Ok(K::normalize(&write))
    }

    /// Returns true if the local definition matches the remote resource.
    ///
    /// # Errors
    ///
    /// Returns an error if resolving related resources fails.
    pub async fn are_equal(&mut self, local: &K::Write, remote: &K::Read) -> Result<bool> {
        let remote = self.comparable(remote).await?;
        Ok(K::normalize(local) == remote)
    }

    /// Breadth-first retrieval of `ids` and everything reachable from them
    /// through `connected`.
    ///
    /// Each identity is visited once. With `max_rounds`, traversal stops after
    /// that many rounds and a warning is logged if identities were still
    /// outstanding. With caching disabled, the cache is empty afterwards.
    ///
    /// # Errors
    ///
    /// Returns the transport failure of a retrieve round.
    pub async fn retrieve_closure<F>(
        &mut self,
        ids: &[K::Id],
        max_rounds: Option<usize>,
        connected: F,
    ) -> Result<RetrievedClosure<K::Read>>
    where
        F: Fn(&K::Read) -> Vec<K::Id> + Send + Sync,
    {
        let result = self.closure_rounds(ids, max_rounds, &connected).await;
        if !self.cache_enabled {
            self.bust_cache();
        }
        result
    }

    async fn closure_rounds<F>(
        &mut self,
        ids: &[K::Id],
        max_rounds: Option<usize>,
        connected: &F,
    ) -> Result<RetrievedClosure<K::Read>>
    where
        F: Fn(&K::Read) -> Vec<K::Id> + Send + Sync,
    {
        let mut seen: HashSet<K::Id> = HashSet::new();
        let mut frontier: Vec<K::Id> = ids.iter().filter(|id| seen.insert((*id).clone())).cloned().collect();
        let mut items = Vec::new();
        let mut rounds = 0;
        let mut truncated = false;

        while !frontier.is_empty() {
            if max_rounds.is_some_and(|max| rounds >= max) {
                warn!(
                    "Max iterations reached resolving referenced {}s, result may be incomplete ({} outstanding)",
                    K::NAME,
                    frontier.len()
                );
                truncated = true;
                break;
            }
            rounds += 1;

            let missing: Vec<K::Id> = frontier
                .iter()
                .filter(|id| !self.cache.contains_key(*id))
                .cloned()
                .collect();
            if !missing.is_empty() {
                let fetched = self.api.retrieve(&missing).await?;
                for item in fetched {
                    self.cache.insert(K::read_id(&item), item);
                }
            }

            let mut next = Vec::new();
            for id in &frontier {
                let Some(item) = self.cache.get(id) else {
                    continue;
                };
                for reference in connected(item) {
                    if seen.insert(reference.clone()) {
                        next.push(reference);
                    }
                }
                items.push(item.clone());
            }
            frontier = next;
        }

        debug!("Resolved {} {}(s) in {rounds} round(s)", items.len(), K::NAME);
        Ok(RetrievedClosure {
            items,
            rounds,
            truncated,
        })
    }

    fn remember(&mut self, items: &[K::Read]) {
        if self.cache_enabled {
            for item in items {
                self.cache.insert(K::read_id(item), item.clone());
            }
        }
    }

    fn forget(&mut self, ids: &[K::Id]) {
        for id in ids {
            self.cache.remove(id);
        }
    }
}

impl<K: ResourceKind> std::fmt::Debug for ResourceLoader<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceLoader")
            .field("kind", &K::NAME)
            .field("cached", &self.cache.len())
            .field("cache_enabled", &self.cache_enabled)
            .finish_non_exhaustive()
    }
}
