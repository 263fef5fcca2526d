//! Schema hashing for change detection.
//!
//! This module computes deterministic fingerprints of local schemas. Each
//! resource is hashed in its normalized form, so definitions that only differ
//! in server-side defaults or ordering hash the same.

use sha2::{Digest, Sha256};

use crate::schema::{ContainerKind, DataModelKind, DmsSchema, ResourceKind, SpaceKind, ViewKind};

/// Hasher for computing schema fingerprints.
#[derive(Debug, Default)]
pub struct SchemaHasher;

impl SchemaHasher {
    /// Creates a new schema hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the fingerprint of a whole schema.
    ///
    /// Independent of the order resources are listed in.
    #[must_use]
    pub fn hash_schema(&self, schema: &DmsSchema) -> String {
        let mut hasher = Sha256::new();
        self.update_kind::<SpaceKind>(&mut hasher, &schema.spaces);
        self.update_kind::<ContainerKind>(&mut hasher, &schema.containers);
        self.update_kind::<ViewKind>(&mut hasher, &schema.views);
        self.update_kind::<DataModelKind>(&mut hasher, &schema.data_models);
        hex::encode(hasher.finalize())
    }

    /// Computes the fingerprint of one resource.
    #[must_use]
    pub fn hash_resource<K: ResourceKind>(&self, item: &K::Write) -> String {
        let normalized = K::normalize(item);
        // Serializing plain data into a buffer does not fail.
        let bytes = serde_json::to_vec(&normalized).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }

    fn update_kind<K: ResourceKind>(&self, hasher: &mut Sha256, items: &[K::Write]) {
        let mut entries: Vec<(String, String)> = items
            .iter()
            .map(|item| (K::write_id(item).to_string(), self.hash_resource::<K>(item)))
            .collect();
        entries.sort();

        hasher.update(K::NAME.as_bytes());
        hasher.update((entries.len() as u64).to_be_bytes());
        for (id, hash) in entries {
            hasher.update(id.as_bytes());
            hasher.update(hash.as_bytes());
        }
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }
}
