//! Deployment plan types and construction.
//!
//! This module sorts every desired resource into exactly one bucket
//! (create, update, recreate, skipped, unchanged or existing) by comparing it
//! with its remote counterpart. Planning performs no mutating calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

use crate::error::{ConfigError, PlanError, Result};
use crate::loader::{ResourceLoader, SchemaLoaders};
use crate::schema::{ContainerKind, DataModelKind, DmsSchema, ResourceKind, SpaceKind, ViewKind};

use super::diff::{MergePolicy, ResourceDifference};

/// How resources that already exist remotely are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistingPolicy {
    /// Abort before any change if anything already exists.
    Fail,
    /// Leave existing resources alone.
    Skip,
    /// Update resources that differ.
    #[default]
    Update,
    /// Update, deleting and recreating resources the API refuses to update.
    Force,
    /// Delete and recreate every existing resource.
    Recreate,
}

/// An in-place update.
#[derive(Debug, Clone)]
pub struct PlannedUpdate<K: ResourceKind> {
    /// The resource to send: the local definition, merged with the remote
    /// one under additive governance.
    pub item: K::Write,
    /// What changes.
    pub difference: ResourceDifference,
    /// Remote resource before the deployment.
    pub previous: K::Write,
}

/// A delete followed by a create of the same identity.
#[derive(Debug, Clone)]
pub struct PlannedRecreate<K: ResourceKind> {
    /// The local definition to create.
    pub item: K::Write,
    /// Remote resource before the deployment.
    pub previous: K::Write,
}

/// Plan for one resource kind. Every desired identity is in exactly one bucket.
#[derive(Debug, Clone)]
pub struct KindPlan<K: ResourceKind> {
    /// Resources that do not exist remotely, in dependency order.
    pub to_create: Vec<K::Write>,
    /// Resources that differ from their remote counterpart.
    pub to_update: Vec<PlannedUpdate<K>>,
    /// Resources to delete and create again.
    pub to_recreate: Vec<PlannedRecreate<K>>,
    /// Existing resources left alone under the skip policy.
    pub skipped: Vec<K::Id>,
    /// Existing resources without differences.
    pub unchanged: Vec<K::Id>,
    /// Existing resources flagged under the fail policy.
    pub existing: Vec<K::Id>,
}

/// Counts of one kind's buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KindSummary {
    /// Resource kind.
    pub kind: &'static str,
    /// Resources to create.
    pub create: usize,
    /// Resources to update.
    pub update: usize,
    /// Resources to delete and recreate.
    pub recreate: usize,
    /// Resources skipped.
    pub skipped: usize,
    /// Resources unchanged.
    pub unchanged: usize,
    /// Resources that already exist under the fail policy.
    pub existing: usize,
}

/// A complete deployment plan.
#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Fingerprint of the local schema this plan is based on.
    pub schema_hash: String,
    /// Existing-resource policy.
    pub policy: ExistingPolicy,
    /// Governance of dictionary-valued sub-resources.
    pub governance: MergePolicy,
    /// Spaces.
    pub spaces: KindPlan<SpaceKind>,
    /// Containers.
    pub containers: KindPlan<ContainerKind>,
    /// Views.
    pub views: KindPlan<ViewKind>,
    /// Data models.
    pub data_models: KindPlan<DataModelKind>,
}

/// Builds deployment plans.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeploymentPlanner {
    policy: ExistingPolicy,
    governance: MergePolicy,
}

impl<K: ResourceKind> KindPlan<K> {
    /// Creates an empty plan.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            to_create: Vec::new(),
            to_update: Vec::new(),
            to_recreate: Vec::new(),
            skipped: Vec::new(),
            unchanged: Vec::new(),
            existing: Vec::new(),
        }
    }

    /// Identities to create, recreated ones included.
    #[must_use]
    pub fn create_ids(&self) -> Vec<K::Id> {
        self.to_create
            .iter()
            .chain(self.to_recreate.iter().map(|r| &r.item))
            .map(K::write_id)
            .collect()
    }

    /// Identities to update.
    #[must_use]
    pub fn update_ids(&self) -> Vec<K::Id> {
        self.to_update.iter().map(|u| K::write_id(&u.item)).collect()
    }

    /// Identities to delete.
    #[must_use]
    pub fn delete_ids(&self) -> Vec<K::Id> {
        self.to_recreate.iter().map(|r| K::write_id(&r.item)).collect()
    }

    /// Returns true if executing the plan would not call the API.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_recreate.is_empty()
    }

    /// Bucket counts.
    #[must_use]
    pub fn summary(&self) -> KindSummary {
        KindSummary {
            kind: K::NAME,
            create: self.to_create.len(),
            update: self.to_update.len(),
            recreate: self.to_recreate.len(),
            skipped: self.skipped.len(),
            unchanged: self.unchanged.len(),
            existing: self.existing.len(),
        }
    }

    /// Fails if any resource was flagged under the fail policy.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::ExistingResources`] listing the flagged identities.
    pub fn check_existing(&self) -> Result<()> {
        if self.existing.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = self.existing.iter().map(ToString::to_string).collect();
        Err(PlanError::ExistingResources {
            kind: K::NAME.to_string(),
            count: ids.len(),
            ids: ids.join(", "),
        }
        .into())
    }
}

impl<K: ResourceKind> Default for KindPlan<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl DeploymentPlan {
    /// Bucket counts per kind, in deployment order.
    #[must_use]
    pub fn summaries(&self) -> Vec<KindSummary> {
        vec![
            self.spaces.summary(),
            self.containers.summary(),
            self.views.summary(),
            self.data_models.summary(),
        ]
    }

    /// Returns true if executing the plan would not call the API.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.spaces.is_noop() && self.containers.is_noop() && self.views.is_noop() && self.data_models.is_noop()
    }

    /// Fails if any resource was flagged under the fail policy.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::ExistingResources`] for the first kind with
    /// flagged resources.
    pub fn check_existing(&self) -> Result<()> {
        self.spaces.check_existing()?;
        self.containers.check_existing()?;
        self.views.check_existing()?;
        self.data_models.check_existing()
    }

    /// Every planned difference, in deployment order.
    #[must_use]
    pub fn differences(&self) -> Vec<&ResourceDifference> {
        fn of<K: ResourceKind>(plan: &KindPlan<K>) -> impl Iterator<Item = &ResourceDifference> {
            plan.to_update.iter().map(|u| &u.difference)
        }
        of(&self.spaces)
            .chain(of(&self.containers))
            .chain(of(&self.views))
            .chain(of(&self.data_models))
            .collect()
    }
}

impl DeploymentPlanner {
    /// Creates a planner.
    #[must_use]
    pub const fn new(policy: ExistingPolicy, governance: MergePolicy) -> Self {
        Self { policy, governance }
    }

    /// Existing-resource policy.
    #[must_use]
    pub const fn policy(&self) -> ExistingPolicy {
        self.policy
    }

    /// Plans a whole schema.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval fails or a kind has a dependency cycle.
    pub async fn plan(
        &self,
        loaders: &mut SchemaLoaders,
        schema: &DmsSchema,
        schema_hash: &str,
    ) -> Result<DeploymentPlan> {
        info!(
            "Planning {} resource(s) with existing={} governance={}",
            schema.resource_count(),
            self.policy,
            self.governance
        );

        let plan = DeploymentPlan {
            created_at: Utc::now(),
            schema_hash: schema_hash.to_string(),
            policy: self.policy,
            governance: self.governance,
            spaces: self.plan_kind(&mut loaders.spaces, &schema.spaces).await?,
            containers: self.plan_kind(&mut loaders.containers, &schema.containers).await?,
            views: self.plan_kind(&mut loaders.views, &schema.views).await?,
            data_models: self.plan_kind(&mut loaders.data_models, &schema.data_models).await?,
        };

        Ok(plan)
    }

    /// Plans one kind.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval fails or the batch has a dependency cycle.
    pub async fn plan_kind<K: ResourceKind>(
        &self,
        loader: &mut ResourceLoader<K>,
        desired: &[K::Write],
    ) -> Result<KindPlan<K>> {
        let mut plan = KindPlan::new();
        if desired.is_empty() {
            return Ok(plan);
        }

        let desired = ResourceLoader::<K>::sort_by_dependencies(desired)?;
        let ids: Vec<K::Id> = desired.iter().map(K::write_id).collect();
        let remote: HashMap<K::Id, K::Read> = loader
            .retrieve(&ids)
            .await?
            .into_iter()
            .map(|item| (K::read_id(&item), item))
            .collect();

        for item in desired {
            let id = K::write_id(&item);
            let Some(current) = remote.get(&id) else {
                plan.to_create.push(item);
                continue;
            };

            match self.policy {
                ExistingPolicy::Skip => plan.skipped.push(id),
                ExistingPolicy::Fail => plan.existing.push(id),
                ExistingPolicy::Recreate => plan.to_recreate.push(PlannedRecreate {
                    item,
                    previous: K::as_write(current),
                }),
                ExistingPolicy::Update | ExistingPolicy::Force => {
                    let previous = loader.comparable(current).await?;
                    let difference = K::difference(&K::normalize(&item), &previous, self.governance);
                    if difference.is_empty() {
                        plan.unchanged.push(id);
                        continue;
                    }
                    debug!("{} {id} differs: {difference}", K::NAME);
                    let item = if self.governance.is_merge() {
                        K::merge(&item, &previous)
                    } else {
                        item
                    };
                    plan.to_update.push(PlannedUpdate {
                        item,
                        difference,
                        previous: K::as_write(current),
                    });
                }
            }
        }

        Ok(plan)
    }
}

impl fmt::Display for ExistingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fail => "fail",
            Self::Skip => "skip",
            Self::Update => "update",
            Self::Force => "force",
            Self::Recreate => "recreate",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ExistingPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fail" => Ok(Self::Fail),
            "skip" => Ok(Self::Skip),
            "update" => Ok(Self::Update),
            "force" => Ok(Self::Force),
            "recreate" => Ok(Self::Recreate),
            _ => Err(ConfigError::InvalidOption {
                option: String::from("existing"),
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for KindSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} to create, {} to update, {} to recreate, {} unchanged, {} skipped",
            self.kind, self.create, self.update, self.recreate, self.unchanged, self.skipped
        )?;
        if self.existing > 0 {
            write!(f, ", {} already existing", self.existing)?;
        }
        Ok(())
    }
}

impl fmt::Display for DeploymentPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_noop() && self.summaries().iter().all(|s| s.existing == 0) {
            return write!(f, "No changes required");
        }

        writeln!(f, "Deployment Plan (existing={}, governance={}):", self.policy, self.governance)?;
        for summary in self.summaries() {
            writeln!(f, "  {summary}")?;
        }

        let differences = self.differences();
        if !differences.is_empty() {
            writeln!(f, "\nChanges:")?;
            for difference in differences {
                writeln!(f, "  ~ {difference}")?;
            }
        }

        Ok(())
    }
}
