//! Deployment orchestration.
//!
//! The [`Deployer`] turns a local schema into a [`DeployResult`]: it checks
//! cross-references, plans every kind, stops at the fail gate or after a dry
//! run, executes the plan in kind order and, when asked, compensates a failed
//! run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::SchemaHasher;
use crate::error::{DeployError, PlanError, Result};
use crate::loader::{ResourceLoader, SchemaLoaders};
use crate::planner::{
    DeploymentExecutor, DeploymentPlan, DeploymentPlanner, ExistingPolicy, FailedRequest,
    KindExecution, KindReport, MergePolicy,
};
use crate::schema::{
    ContainerId, ContainerKind, DataModelKind, DmsSchema, ResourceKind, SpaceKind, ViewId, ViewKind,
};

/// Options of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeployOptions {
    /// Handling of resources that already exist.
    pub existing: ExistingPolicy,
    /// Governance of dictionary-valued sub-resources.
    pub governance: MergePolicy,
    /// Plan only.
    pub dry_run: bool,
    /// Undo the run's changes if it fails.
    pub restore_on_failure: bool,
}

/// Final status of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeployStatus {
    /// Every call succeeded.
    Success,
    /// At least one call failed.
    Failure,
    /// Nothing was executed.
    DryRun,
}

/// Outcome of a deployment.
#[derive(Debug, Clone, Serialize)]
pub struct DeployResult {
    /// Deployment identifier.
    pub id: Uuid,
    /// Final status.
    pub status: DeployStatus,
    /// Human readable summary.
    pub message: String,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// End time.
    pub finished_at: DateTime<Utc>,
    /// Per-kind reports in deployment order.
    pub kinds: Vec<KindReport>,
    /// True if a failed run was fully compensated.
    pub restored: bool,
    /// Compensating calls that failed.
    pub failed_restored: Vec<FailedRequest>,
}

/// Executions of every kind of one run.
struct Executions {
    spaces: KindExecution<SpaceKind>,
    containers: KindExecution<ContainerKind>,
    views: KindExecution<ViewKind>,
    data_models: KindExecution<DataModelKind>,
}

/// Deploys schemas through a set of loaders.
#[derive(Debug)]
pub struct Deployer {
    loaders: SchemaLoaders,
    options: DeployOptions,
}

impl DeployStatus {
    /// Returns true for [`DeployStatus::Failure`].
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Failure)
    }
}

impl std::fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::DryRun => write!(f, "dry-run"),
        }
    }
}

impl DeployResult {
    /// Report of one kind, by kind name.
    #[must_use]
    pub fn kind(&self, name: &str) -> Option<&KindReport> {
        self.kinds.iter().find(|k| k.kind == name)
    }

    /// Number of failed calls across all kinds.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        failure_count(&self.kinds)
    }
}

impl Executions {
    fn new(plan: &DeploymentPlan) -> Self {
        Self {
            spaces: KindExecution::new(&plan.spaces),
            containers: KindExecution::new(&plan.containers),
            views: KindExecution::new(&plan.views),
            data_models: KindExecution::new(&plan.data_models),
        }
    }

    fn failed(&self) -> bool {
        self.spaces.failed() || self.containers.failed() || self.views.failed() || self.data_models.failed()
    }

    fn failed_updates(&self) -> Option<(&str, usize)> {
        [
            &self.spaces.report,
            &self.containers.report,
            &self.views.report,
            &self.data_models.report,
        ]
        .into_iter()
        .find(|r| !r.failed_updated.is_empty())
        .map(|r| (r.kind.as_str(), r.failed_updated.len()))
    }

    fn into_reports(self) -> Vec<KindReport> {
        vec![
            self.spaces.report,
            self.containers.report,
            self.views.report,
            self.data_models.report,
        ]
    }
}

impl Deployer {
    /// Creates a deployer.
    #[must_use]
    pub const fn new(loaders: SchemaLoaders, options: DeployOptions) -> Self {
        Self { loaders, options }
    }

    /// Deployment options.
    #[must_use]
    pub const fn options(&self) -> &DeployOptions {
        &self.options
    }

    /// Loaders used by the deployer.
    pub fn loaders_mut(&mut self) -> &mut SchemaLoaders {
        &mut self.loaders
    }

    /// Checks references and plans the schema without changing anything.
    ///
    /// # Errors
    ///
    /// Returns an error if a reference is missing, retrieval fails, or a
    /// dependency cycle is found.
    pub async fn plan(&mut self, schema: &DmsSchema) -> Result<DeploymentPlan> {
        self.check_references(schema).await?;
        let hash = SchemaHasher::new().hash_schema(schema);
        DeploymentPlanner::new(self.options.existing, self.options.governance)
            .plan(&mut self.loaders, schema, &hash)
            .await
    }

    /// Deploys the schema.
    ///
    /// Failed calls are reported in the result. Errors are returned only for
    /// problems found before the first mutating call, and for a failed run
    /// with failed updates when restore is requested.
    ///
    /// # Errors
    ///
    /// Returns an error if planning fails, the fail policy finds existing
    /// resources, or restoring failed updates is required.
    pub async fn deploy(&mut self, schema: &DmsSchema) -> Result<DeployResult> {
        let id = Uuid::new_v4();
        let span = info_span!("deploy", id = %id);
        self.deploy_inner(id, schema).instrument(span).await
    }

    async fn deploy_inner(&mut self, id: Uuid, schema: &DmsSchema) -> Result<DeployResult> {
        let started_at = Utc::now();
        info!(
            "Deploying {} resource(s) with existing={}",
            schema.resource_count(),
            self.options.existing
        );

        let plan = self.plan(schema).await?;
        if self.options.existing == ExistingPolicy::Fail {
            plan.check_existing()?;
        }

        if self.options.dry_run {
            let changes: usize = plan
                .summaries()
                .iter()
                .map(|s| s.create + s.update + s.recreate)
                .sum();
            info!("Dry run, {changes} change(s) planned and not executed");
            return Ok(DeployResult {
                id,
                status: DeployStatus::DryRun,
                message: format!("Dry run: {changes} change(s) planned"),
                started_at,
                finished_at: Utc::now(),
                kinds: Executions::new(&plan).into_reports(),
                restored: false,
                failed_restored: Vec::new(),
            });
        }

        let mut executions = Executions::new(&plan);
        self.execute(&plan, &mut executions).await;

        let failed = executions.failed();
        let mut restored = false;
        let mut failed_restored = Vec::new();
        if failed && self.options.restore_on_failure {
            if let Some((kind, count)) = executions.failed_updates() {
                return Err(DeployError::UpdateRestoreUnsupported {
                    kind: kind.to_string(),
                    count,
                }
                .into());
            }
            failed_restored = self.restore(&executions).await;
            restored = failed_restored.is_empty();
            if restored {
                info!("Restored the pre-deployment state");
            } else {
                error!("Restore incomplete: {} call(s) failed", failed_restored.len());
            }
        }

        let kinds = executions.into_reports();
        let failures = failure_count(&kinds);
        let (status, message) = if failed {
            warn!("Deployment finished with {failures} failed request(s)");
            (
                DeployStatus::Failure,
                format!("Deployment failed: {failures} failed request(s)"),
            )
        } else {
            info!("Deployment succeeded");
            (DeployStatus::Success, String::from("Deployment succeeded"))
        };

        Ok(DeployResult {
            id,
            status,
            message,
            started_at,
            finished_at: Utc::now(),
            kinds,
            restored,
            failed_restored,
        })
    }

    /// Runs deletes in reverse kind order, then creates, then updates.
    async fn execute(&mut self, plan: &DeploymentPlan, ex: &mut Executions) {
        let executor = DeploymentExecutor::new(self.options.existing);
        let loaders = &mut self.loaders;

        executor.delete_phase(&mut loaders.data_models, &plan.data_models, &mut ex.data_models).await;
        executor.delete_phase(&mut loaders.views, &plan.views, &mut ex.views).await;
        executor.delete_phase(&mut loaders.containers, &plan.containers, &mut ex.containers).await;
        executor.delete_phase(&mut loaders.spaces, &plan.spaces, &mut ex.spaces).await;

        executor.create_phase(&mut loaders.spaces, &plan.spaces, &mut ex.spaces).await;
        executor.create_phase(&mut loaders.containers, &plan.containers, &mut ex.containers).await;
        executor.create_phase(&mut loaders.views, &plan.views, &mut ex.views).await;
        executor.create_phase(&mut loaders.data_models, &plan.data_models, &mut ex.data_models).await;

        executor.update_phase(&mut loaders.spaces, &plan.spaces, &mut ex.spaces).await;
        executor.update_phase(&mut loaders.containers, &plan.containers, &mut ex.containers).await;
        executor.update_phase(&mut loaders.views, &plan.views, &mut ex.views).await;
        executor.update_phase(&mut loaders.data_models, &plan.data_models, &mut ex.data_models).await;
    }

    /// Deletes what the run created, then recreates what it deleted.
    async fn restore(&mut self, ex: &Executions) -> Vec<FailedRequest> {
        warn!("Deployment failed, restoring");
        let loaders = &mut self.loaders;
        let mut failed = Vec::new();

        failed.extend(DeploymentExecutor::undo_creates(&mut loaders.data_models, &ex.data_models).await);
        failed.extend(DeploymentExecutor::undo_creates(&mut loaders.views, &ex.views).await);
        failed.extend(DeploymentExecutor::undo_creates(&mut loaders.containers, &ex.containers).await);
        failed.extend(DeploymentExecutor::undo_creates(&mut loaders.spaces, &ex.spaces).await);

        failed.extend(DeploymentExecutor::redo_deletes(&mut loaders.spaces, &ex.spaces).await);
        failed.extend(DeploymentExecutor::redo_deletes(&mut loaders.containers, &ex.containers).await);
        failed.extend(DeploymentExecutor::redo_deletes(&mut loaders.views, &ex.views).await);
        failed.extend(DeploymentExecutor::redo_deletes(&mut loaders.data_models, &ex.data_models).await);
        failed
    }

    /// Fails if a local resource references a container or view that exists
    /// neither in the schema nor remotely.
    async fn check_references(&mut self, schema: &DmsSchema) -> Result<()> {
        let local_containers: BTreeSet<ContainerId> =
            schema.containers.iter().map(ContainerKind::write_id).collect();
        let local_views: BTreeSet<ViewId> = schema.views.iter().map(ViewKind::write_id).collect();

        let mut containers: Vec<Reference<ContainerId>> = Vec::new();
        let mut views: Vec<Reference<ViewId>> = Vec::new();
        for container in &schema.containers {
            let source = ContainerKind::write_id(container).to_string();
            for target in container.required_containers() {
                containers.push((ContainerKind::NAME, source.clone(), target));
            }
        }
        for view in &schema.views {
            let source = ViewKind::write_id(view).to_string();
            for target in view.referenced_containers() {
                containers.push((ViewKind::NAME, source.clone(), target));
            }
            for parent in view.implements.iter().flatten() {
                views.push((ViewKind::NAME, source.clone(), parent.clone()));
            }
        }
        for model in &schema.data_models {
            let source = DataModelKind::write_id(model).to_string();
            for target in model.views.iter().flatten() {
                views.push((DataModelKind::NAME, source.clone(), target.clone()));
            }
        }

        Self::check_kind(&mut self.loaders.containers, &local_containers, &containers).await?;
        Self::check_kind(&mut self.loaders.views, &local_views, &views).await
    }

    async fn check_kind<K: ResourceKind>(
        loader: &mut ResourceLoader<K>,
        local: &BTreeSet<K::Id>,
        references: &[Reference<K::Id>],
    ) -> Result<()> {
        let outside: BTreeSet<K::Id> = references
            .iter()
            .map(|(_, _, target)| target)
            .filter(|target| !local.contains(*target))
            .cloned()
            .collect();
        if outside.is_empty() {
            return Ok(());
        }

        let outside: Vec<K::Id> = outside.into_iter().collect();
        let remote: BTreeSet<K::Id> = loader.retrieve(&outside).await?.iter().map(K::read_id).collect();
        let missing = references
            .iter()
            .find(|(_, _, target)| !local.contains(target) && !remote.contains(target));
        if let Some((kind, id, target)) = missing {
            return Err(PlanError::MissingReference {
                kind: (*kind).to_string(),
                id: id.clone(),
                target: format!("{} {target}", K::NAME),
            }
            .into());
        }
        Ok(())
    }
}

/// Kind and identity of a referencing resource, and the referenced identity.
type Reference<Id> = (&'static str, String, Id);

fn failure_count(reports: &[KindReport]) -> usize {
    reports
        .iter()
        .map(|k| k.failed_created.len() + k.failed_updated.len() + k.failed_deleted.len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::loader::testing::FakeApi;
    use crate::schema::{
        ContainerApply, ContainerProperty, DataModelApply, MappedPropertyApply, PropertyType,
        SpaceApply, SpaceId, ViewApply, ViewPropertyApply,
    };
    use std::collections::BTreeMap;
    use std::sync::Arc;

    struct Fakes {
        spaces: Arc<FakeApi<SpaceKind>>,
        containers: Arc<FakeApi<ContainerKind>>,
        views: Arc<FakeApi<ViewKind>>,
        data_models: Arc<FakeApi<DataModelKind>>,
    }

    impl Fakes {
        fn new() -> Self {
            Self {
                spaces: Arc::new(FakeApi::new()),
                containers: Arc::new(FakeApi::new()),
                views: Arc::new(FakeApi::new()),
                data_models: Arc::new(FakeApi::new()),
            }
        }

        fn deployer(&self, options: DeployOptions) -> Deployer {
            let loaders = SchemaLoaders {
                spaces: ResourceLoader::<SpaceKind>::new(self.spaces.clone()),
                containers: ResourceLoader::<ContainerKind>::new(self.containers.clone()),
                views: ResourceLoader::<ViewKind>::new(self.views.clone()),
                data_models: ResourceLoader::<DataModelKind>::new(self.data_models.clone()),
            };
            Deployer::new(loaders, options)
        }

        fn mutations(&self) -> usize {
            let spaces = self.spaces.calls();
            let containers = self.containers.calls();
            let views = self.views.calls();
            let models = self.data_models.calls();
            [spaces, containers, views, models]
                .iter()
                .map(|c| c.create + c.update + c.delete)
                .sum()
        }
    }

    fn asset_container() -> ContainerApply {
        let mut container = ContainerApply::new("sp", "Asset");
        container.properties.insert(
            String::from("name"),
            ContainerProperty::new(PropertyType::Text {
                list: None,
                collation: None,
            }),
        );
        container
    }

    fn asset_view(container: &str) -> ViewApply {
        let mut view = ViewApply::new("sp", "Asset", "v1");
        view.properties = Some(BTreeMap::from([(
            String::from("name"),
            ViewPropertyApply::Mapped(MappedPropertyApply {
                container: ContainerId::new("sp", container),
                container_property_identifier: String::from("name"),
                name: None,
                description: None,
                source: None,
            }),
        )]));
        view
    }

    fn schema() -> DmsSchema {
        let mut model = DataModelApply::new("sp", "Model", "v1");
        model.views = Some(vec![ViewId::new("sp", "Asset", "v1")]);
        DmsSchema {
            spaces: vec![SpaceApply::new("sp")],
            containers: vec![asset_container()],
            views: vec![asset_view("Asset")],
            data_models: vec![model],
        }
    }

    fn options(existing: ExistingPolicy) -> DeployOptions {
        DeployOptions {
            existing,
            ..DeployOptions::default()
        }
    }

    #[tokio::test]
    async fn test_fresh_deploy_creates_every_kind() {
        let fakes = Fakes::new();
        let result = fakes
            .deployer(options(ExistingPolicy::Update))
            .deploy(&schema())
            .await
            .expect("deploy");

        assert_eq!(result.status, DeployStatus::Success);
        assert_eq!(result.kinds.len(), 4);
        assert_eq!(result.kind("space").expect("spaces").created, vec!["sp"]);
        assert_eq!(result.kind("data model").expect("models").created.len(), 1);
        assert_eq!(fakes.views.remote_ids(), vec![ViewId::new("sp", "Asset", "v1")]);
        assert!(!result.restored);
    }

    #[tokio::test]
    async fn test_second_deploy_is_unchanged() {
        let fakes = Fakes::new();
        fakes
            .deployer(options(ExistingPolicy::Update))
            .deploy(&schema())
            .await
            .expect("first deploy");
        let before = fakes.mutations();

        let result = fakes
            .deployer(options(ExistingPolicy::Update))
            .deploy(&schema())
            .await
            .expect("second deploy");

        assert_eq!(result.status, DeployStatus::Success);
        assert_eq!(fakes.mutations(), before);
        for kind in &result.kinds {
            assert_eq!(kind.unchanged.len(), 1, "{} should be unchanged", kind.kind);
        }
    }

    #[tokio::test]
    async fn test_dry_run_does_not_mutate() {
        let fakes = Fakes::new();
        let result = fakes
            .deployer(DeployOptions {
                dry_run: true,
                ..options(ExistingPolicy::Update)
            })
            .deploy(&schema())
            .await
            .expect("dry run");

        assert_eq!(result.status, DeployStatus::DryRun);
        assert_eq!(result.kind("container").expect("containers").to_create, vec!["sp:Asset"]);
        assert_eq!(fakes.mutations(), 0);
    }

    #[tokio::test]
    async fn test_fail_policy_stops_before_mutation() {
        let fakes = Fakes::new();
        fakes.spaces.seed(&[SpaceApply::new("sp")]);

        let err = fakes
            .deployer(options(ExistingPolicy::Fail))
            .deploy(&schema())
            .await
            .expect_err("existing space");

        assert!(matches!(err, SyncError::Plan(PlanError::ExistingResources { .. })));
        assert_eq!(fakes.mutations(), 0);
    }

    #[tokio::test]
    async fn test_missing_reference_is_rejected() {
        let fakes = Fakes::new();
        let mut schema = schema();
        schema.views = vec![asset_view("Unknown")];

        let err = fakes
            .deployer(options(ExistingPolicy::Update))
            .deploy(&schema)
            .await
            .expect_err("missing container");

        match err {
            SyncError::Plan(PlanError::MissingReference { kind, id, target }) => {
                assert_eq!(kind, "view");
                assert_eq!(id, "sp:Asset(version=v1)");
                assert_eq!(target, "container sp:Unknown");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fakes.mutations(), 0);
    }

    #[tokio::test]
    async fn test_remote_reference_is_accepted() {
        let fakes = Fakes::new();
        fakes.containers.seed(&[ContainerApply::new("sp", "Remote")]);
        let mut schema = schema();
        schema.views = vec![asset_view("Remote")];

        let result = fakes
            .deployer(options(ExistingPolicy::Update))
            .deploy(&schema)
            .await
            .expect("deploy");
        assert_eq!(result.status, DeployStatus::Success);
    }

    #[tokio::test]
    async fn test_restore_undoes_creates() {
        let fakes = Fakes::new();
        fakes.views.fail_create(&[ViewId::new("sp", "Asset", "v1")]);

        let result = fakes
            .deployer(DeployOptions {
                restore_on_failure: true,
                ..options(ExistingPolicy::Update)
            })
            .deploy(&schema())
            .await
            .expect("deploy");

        assert_eq!(result.status, DeployStatus::Failure);
        assert!(result.restored);
        assert!(result.failed_restored.is_empty());
        assert_eq!(result.failure_count(), 1);
        assert!(fakes.spaces.remote_ids().is_empty());
        assert!(fakes.containers.remote_ids().is_empty());
        assert!(fakes.data_models.remote_ids().is_empty());
    }

    #[tokio::test]
    async fn test_failed_restore_is_reported() {
        let fakes = Fakes::new();
        let mut previous = SpaceApply::new("sp");
        previous.description = Some(String::from("before"));
        fakes.spaces.seed(&[previous]);
        fakes.spaces.fail_create(&[SpaceId::new("sp")]);

        let result = fakes
            .deployer(DeployOptions {
                restore_on_failure: true,
                ..options(ExistingPolicy::Recreate)
            })
            .deploy(&DmsSchema {
                spaces: vec![SpaceApply::new("sp")],
                ..DmsSchema::default()
            })
            .await
            .expect("deploy");

        assert_eq!(result.status, DeployStatus::Failure);
        assert_eq!(result.kinds[0].deleted, vec!["sp"]);
        // The snapshot goes through the same failing create.
        assert!(!result.restored);
        assert_eq!(result.failed_restored.len(), 1);
    }

    #[tokio::test]
    async fn test_restore_with_failed_update_is_unsupported() {
        let fakes = Fakes::new();
        fakes.spaces.seed(&[SpaceApply::new("sp")]);
        fakes.spaces.fail_update(&[SpaceId::new("sp")]);
        let mut space = SpaceApply::new("sp");
        space.description = Some(String::from("changed"));

        let err = fakes
            .deployer(DeployOptions {
                restore_on_failure: true,
                ..options(ExistingPolicy::Update)
            })
            .deploy(&DmsSchema {
                spaces: vec![space],
                ..DmsSchema::default()
            })
            .await
            .expect_err("restore of updates");

        assert!(matches!(
            err,
            SyncError::Deploy(DeployError::UpdateRestoreUnsupported { count: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_update_without_restore_is_reported() {
        let fakes = Fakes::new();
        fakes.spaces.seed(&[SpaceApply::new("sp")]);
        fakes.spaces.fail_update(&[SpaceId::new("sp")]);
        let mut space = SpaceApply::new("sp");
        space.description = Some(String::from("changed"));

        let result = fakes
            .deployer(options(ExistingPolicy::Update))
            .deploy(&DmsSchema {
                spaces: vec![space],
                ..DmsSchema::default()
            })
            .await
            .expect("deploy");

        assert!(result.status.is_failure());
        assert_eq!(result.kinds[0].failed_updated[0].resource_ids, vec!["sp"]);
        assert!(!result.restored);
    }

    #[tokio::test]
    async fn test_force_recreates_rejected_update() {
        let fakes = Fakes::new();
        fakes.spaces.seed(&[SpaceApply::new("sp")]);
        fakes.spaces.fail_update(&[SpaceId::new("sp")]);
        let mut space = SpaceApply::new("sp");
        space.description = Some(String::from("changed"));

        let result = fakes
            .deployer(options(ExistingPolicy::Force))
            .deploy(&DmsSchema {
                spaces: vec![space],
                ..DmsSchema::default()
            })
            .await
            .expect("deploy");

        assert_eq!(result.status, DeployStatus::Success);
        assert_eq!(result.kinds[0].forced.len(), 1);
        let remote = fakes.spaces.remote(&SpaceId::new("sp")).expect("recreated");
        assert_eq!(remote.description.as_deref(), Some("changed"));
    }
}
