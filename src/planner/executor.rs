//! Plan executor for applying deployment plans.
//!
//! This module applies one kind's plan at a time: deletes, creates and
//! updates each go out as a batched call, and every outcome is recorded in a
//! [`KindReport`]. Failures are accumulated rather than aborting the run.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::cdf::{ApiFailure, ApiResult};
use crate::loader::ResourceLoader;
use crate::schema::ResourceKind;

use super::diff::ResourceDifference;
use super::plan::{ExistingPolicy, KindPlan, PlannedUpdate};

/// Message recorded for requested resources missing from a create response.
const NOT_REPORTED: &str = "Not reported as created by the API";

/// A failed batched call, or a resource the API did not report back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRequest {
    /// Error message reported by the API.
    pub error_message: String,
    /// HTTP status code, `0` when no response was received or the call
    /// succeeded without reporting the resource.
    pub status_code: u16,
    /// Identities the failure applies to.
    pub resource_ids: Vec<String>,
}

/// A resource recreated after its update was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForcedResource {
    /// Identity of the resource.
    pub resource_id: String,
    /// The update error that triggered the recreation.
    pub reason: String,
}

/// What happened to one resource kind during a deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KindReport {
    /// Resource kind.
    pub kind: String,
    /// Planned creates.
    pub to_create: Vec<String>,
    /// Planned updates.
    pub to_update: Vec<String>,
    /// Planned deletes.
    pub to_delete: Vec<String>,
    /// Skipped resources.
    pub skipped: Vec<String>,
    /// Unchanged resources.
    pub unchanged: Vec<String>,
    /// Resources that already exist under the fail policy.
    pub existing: Vec<String>,
    /// Created resources.
    pub created: Vec<String>,
    /// Applied differences.
    pub updated: Vec<ResourceDifference>,
    /// Deleted resources.
    pub deleted: Vec<String>,
    /// Failed creates.
    pub failed_created: Vec<FailedRequest>,
    /// Failed updates.
    pub failed_updated: Vec<FailedRequest>,
    /// Failed deletes.
    pub failed_deleted: Vec<FailedRequest>,
    /// Resources recreated after a rejected update.
    pub forced: Vec<ForcedResource>,
}

/// Execution state of one kind: the report plus what restoring needs.
#[derive(Debug)]
pub struct KindExecution<K: ResourceKind> {
    /// Report of the kind.
    pub report: KindReport,
    /// Identities created during the run.
    pub created: Vec<K::Id>,
    /// Pre-deployment snapshots of resources deleted during the run.
    pub deleted: Vec<K::Write>,
}

/// Executes kind plans against a loader.
#[derive(Debug, Clone, Copy)]
pub struct DeploymentExecutor {
    policy: ExistingPolicy,
}

impl<Id: std::fmt::Display> From<&ApiFailure<Id>> for FailedRequest {
    fn from(failure: &ApiFailure<Id>) -> Self {
        Self {
            error_message: failure.message.clone(),
            status_code: failure.status,
            resource_ids: failure.failed.iter().map(ToString::to_string).collect(),
        }
    }
}

impl KindReport {
    /// Returns true if any call of this kind failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !(self.failed_created.is_empty() && self.failed_updated.is_empty() && self.failed_deleted.is_empty())
    }
}

fn strings<Id: std::fmt::Display>(ids: &[Id]) -> Vec<String> {
    ids.iter().map(ToString::to_string).collect()
}

impl<K: ResourceKind> KindExecution<K> {
    /// Starts an execution, filling the planned buckets of the report.
    #[must_use]
    pub fn new(plan: &KindPlan<K>) -> Self {
        let report = KindReport {
            kind: K::NAME.to_string(),
            to_create: strings(&plan.create_ids()),
            to_update: strings(&plan.update_ids()),
            to_delete: strings(&plan.delete_ids()),
            skipped: strings(&plan.skipped),
            unchanged: strings(&plan.unchanged),
            existing: strings(&plan.existing),
            ..KindReport::default()
        };
        Self {
            report,
            created: Vec::new(),
            deleted: Vec::new(),
        }
    }

    /// Returns true if any call of this kind failed.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.report.has_failures()
    }

    /// Records a create call and returns the identities the API reported
    /// as created. Requested resources without a read form are failures.
    fn record_created(&mut self, requested: &[K::Id], result: ApiResult<Vec<K::Read>, K::Id>) -> Vec<K::Id> {
        let reads = match result {
            Ok(reads) => reads,
            Err(failure) => {
                error!("Create of {} {}(s) failed: {failure}", failure.failed.len(), K::NAME);
                self.report.failed_created.push(FailedRequest::from(&failure));
                return Vec::new();
            }
        };
        let reported: Vec<K::Id> = reads.iter().map(K::read_id).collect();
        let (created, missing): (Vec<K::Id>, Vec<K::Id>) =
            requested.iter().cloned().partition(|id| reported.contains(id));
        if !missing.is_empty() {
            error!("{} {}(s) missing from the create response", missing.len(), K::NAME);
            self.report.failed_created.push(FailedRequest {
                error_message: NOT_REPORTED.to_string(),
                status_code: 0,
                resource_ids: strings(&missing),
            });
        }
        self.report.created.extend(strings(&created));
        self.created.extend(created.iter().cloned());
        created
    }

    /// Records a delete call and returns the identities that are gone.
    fn record_deleted(&mut self, requested: &[K::Id], result: ApiResult<Vec<K::Id>, K::Id>) -> Vec<K::Id> {
        match result {
            Ok(_) => {
                self.report.deleted.extend(strings(requested));
                requested.to_vec()
            }
            Err(failure) => {
                error!("Delete of {} {}(s) failed: {failure}", failure.failed.len(), K::NAME);
                self.report.failed_deleted.push(FailedRequest::from(&failure));
                Vec::new()
            }
        }
    }

    /// Records resources a forced create deleted on its way.
    fn record_escalation_deletes(&mut self, deleted: &[K::Read]) {
        let ids: Vec<K::Id> = deleted.iter().map(K::read_id).collect();
        self.report.deleted.extend(strings(&ids));
        self.deleted.extend(deleted.iter().map(K::as_write));
    }
}

/// Requested identities a rejected call blames, or all of them when it
/// names none.
fn blamed<Id: Clone + PartialEq>(failure: &ApiFailure<Id>, requested: &[Id]) -> Vec<Id> {
    let named: Vec<Id> = requested.iter().filter(|id| failure.failed.contains(id)).cloned().collect();
    if named.is_empty() { requested.to_vec() } else { named }
}

impl DeploymentExecutor {
    /// Creates an executor.
    #[must_use]
    pub const fn new(policy: ExistingPolicy) -> Self {
        Self { policy }
    }

    /// Deletes the resources planned for recreation.
    pub async fn delete_phase<K: ResourceKind>(
        &self,
        loader: &mut ResourceLoader<K>,
        plan: &KindPlan<K>,
        execution: &mut KindExecution<K>,
    ) {
        let ids = plan.delete_ids();
        if ids.is_empty() {
            return;
        }
        info!("Deleting {} {}(s)", ids.len(), K::NAME);
        let result = loader.delete(&ids).await;
        let deleted = execution.record_deleted(&ids, result);
        execution.deleted.extend(
            plan.to_recreate
                .iter()
                .filter(|r| deleted.contains(&K::write_id(&r.item)))
                .map(|r| r.previous.clone()),
        );
    }

    /// Creates new and recreated resources.
    ///
    /// A rejected batch applies nothing, so the items the API did not blame
    /// are sent again without the blamed ones. Under the force policy,
    /// rejected creates are retried after deleting the offending resources.
    pub async fn create_phase<K: ResourceKind>(
        &self,
        loader: &mut ResourceLoader<K>,
        plan: &KindPlan<K>,
        execution: &mut KindExecution<K>,
    ) {
        let mut pending: Vec<K::Write> = plan
            .to_create
            .iter()
            .chain(plan.to_recreate.iter().map(|r| &r.item))
            .cloned()
            .collect();
        if pending.is_empty() {
            return;
        }
        info!("Creating {} {}(s)", pending.len(), K::NAME);

        while !pending.is_empty() {
            let ids: Vec<K::Id> = pending.iter().map(K::write_id).collect();
            let result = if self.policy == ExistingPolicy::Force {
                let forced = loader.create_force(&pending).await;
                execution.record_escalation_deletes(&forced.deleted);
                forced.result
            } else {
                loader.create(&pending).await
            };

            let failure = match result {
                Ok(reads) => {
                    execution.record_created(&ids, Ok(reads));
                    return;
                }
                Err(failure) => failure,
            };
            let rejected = blamed(&failure, &ids);
            let failure = ApiFailure {
                failed: rejected,
                ..failure
            };
            pending.retain(|item| !failure.failed.contains(&K::write_id(item)));
            execution.record_created(&ids, Err(failure));
        }
    }

    /// Updates changed resources.
    ///
    /// Items the API did not blame for a rejected batch are sent again. Under
    /// the force policy, rejected updates escalate to a delete followed by a
    /// create of the same resources.
    pub async fn update_phase<K: ResourceKind>(
        &self,
        loader: &mut ResourceLoader<K>,
        plan: &KindPlan<K>,
        execution: &mut KindExecution<K>,
    ) {
        let mut pending: Vec<&PlannedUpdate<K>> = plan.to_update.iter().collect();
        if pending.is_empty() {
            return;
        }
        info!("Updating {} {}(s)", pending.len(), K::NAME);

        while !pending.is_empty() {
            let items: Vec<K::Write> = pending.iter().map(|u| u.item.clone()).collect();
            let ids: Vec<K::Id> = items.iter().map(K::write_id).collect();

            let failure = match loader.update(&items).await {
                Ok(_) => {
                    Self::record_updated(execution, &pending);
                    return;
                }
                Err(failure) => failure,
            };
            let rejected = blamed(&failure, &ids);
            let failure = ApiFailure {
                failed: rejected,
                ..failure
            };
            let (rejected, rest): (Vec<&PlannedUpdate<K>>, Vec<&PlannedUpdate<K>>) = pending
                .into_iter()
                .partition(|u| failure.failed.contains(&K::write_id(&u.item)));

            if self.policy == ExistingPolicy::Force {
                self.force_recreate(loader, execution, &rejected, &failure).await;
            } else {
                error!("Update of {} {}(s) failed: {failure}", failure.failed.len(), K::NAME);
                execution.report.failed_updated.push(FailedRequest::from(&failure));
            }
            pending = rest;
        }
    }

    /// Deletes and recreates resources whose update was rejected.
    async fn force_recreate<K: ResourceKind>(
        &self,
        loader: &mut ResourceLoader<K>,
        execution: &mut KindExecution<K>,
        targets: &[&PlannedUpdate<K>],
        failure: &ApiFailure<K::Id>,
    ) {
        let ids: Vec<K::Id> = targets.iter().map(|u| K::write_id(&u.item)).collect();
        warn!(
            "Update of {} {}(s) rejected, recreating: {}",
            ids.len(),
            K::NAME,
            failure.message
        );

        let result = loader.delete(&ids).await;
        let deleted = execution.record_deleted(&ids, result);
        execution.deleted.extend(
            targets
                .iter()
                .filter(|u| deleted.contains(&K::write_id(&u.item)))
                .map(|u| u.previous.clone()),
        );

        let items: Vec<K::Write> = targets.iter().map(|u| u.item.clone()).collect();
        let result = loader.create(&items).await;
        let created = execution.record_created(&ids, result);

        let recreated: Vec<&PlannedUpdate<K>> = targets
            .iter()
            .copied()
            .filter(|u| created.contains(&K::write_id(&u.item)))
            .collect();
        for update in &recreated {
            execution.report.forced.push(ForcedResource {
                resource_id: K::write_id(&update.item).to_string(),
                reason: failure.message.clone(),
            });
        }
        Self::record_updated(execution, &recreated);
    }

    fn record_updated<K: ResourceKind>(execution: &mut KindExecution<K>, updates: &[&PlannedUpdate<K>]) {
        execution
            .report
            .updated
            .extend(updates.iter().map(|u| u.difference.clone()));
    }

    /// Deletes everything the run created. Returns the failed deletes.
    pub async fn undo_creates<K: ResourceKind>(
        loader: &mut ResourceLoader<K>,
        execution: &KindExecution<K>,
    ) -> Vec<FailedRequest> {
        if execution.created.is_empty() {
            return Vec::new();
        }
        info!("Restore: deleting {} created {}(s)", execution.created.len(), K::NAME);
        match loader.delete(&execution.created).await {
            Ok(_) => Vec::new(),
            Err(failure) => vec![FailedRequest::from(&failure)],
        }
    }

    /// Recreates everything the run deleted from its pre-deployment
    /// snapshot. Returns the failed creates.
    pub async fn redo_deletes<K: ResourceKind>(
        loader: &mut ResourceLoader<K>,
        execution: &KindExecution<K>,
    ) -> Vec<FailedRequest> {
        if execution.deleted.is_empty() {
            return Vec::new();
        }
        info!("Restore: recreating {} deleted {}(s)", execution.deleted.len(), K::NAME);
        match loader.create(&execution.deleted).await {
            Ok(_) => Vec::new(),
            Err(failure) => vec![FailedRequest::from(&failure)],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::testing::FakeApi;
    use crate::planner::{DeploymentPlanner, MergePolicy};
    use crate::schema::{SpaceApply, SpaceId, SpaceKind};
    use std::sync::Arc;

    fn described(name: &str, description: &str) -> SpaceApply {
        let mut space = SpaceApply::new(name);
        space.description = Some(description.to_string());
        space
    }

    async fn run(
        api: &Arc<FakeApi<SpaceKind>>,
        policy: ExistingPolicy,
        desired: &[SpaceApply],
    ) -> KindExecution<SpaceKind> {
        let mut loader = ResourceLoader::<SpaceKind>::new(api.clone());
        let plan = DeploymentPlanner::new(policy, MergePolicy::Merge)
            .plan_kind(&mut loader, desired)
            .await
            .expect("plan");
        let executor = DeploymentExecutor::new(policy);
        let mut execution = KindExecution::new(&plan);
        executor.delete_phase(&mut loader, &plan, &mut execution).await;
        executor.create_phase(&mut loader, &plan, &mut execution).await;
        executor.update_phase(&mut loader, &plan, &mut execution).await;
        execution
    }

    #[tokio::test]
    async fn test_create_and_update_are_reported() {
        let api = Arc::new(FakeApi::<SpaceKind>::new());
        api.seed(&[SpaceApply::new("old")]);

        let execution = run(
            &api,
            ExistingPolicy::Update,
            &[SpaceApply::new("new"), described("old", "changed")],
        )
        .await;

        assert!(!execution.failed());
        assert_eq!(execution.report.created, vec!["new"]);
        assert_eq!(execution.report.updated.len(), 1);
        assert_eq!(execution.report.updated[0].resource_id, "old");
        assert_eq!(execution.created, vec![SpaceId::new("new")]);
    }

    #[tokio::test]
    async fn test_failed_update_without_force_is_recorded() {
        let api = Arc::new(FakeApi::<SpaceKind>::new());
        api.seed(&[SpaceApply::new("a"), SpaceApply::new("b")]);
        api.fail_update(&[SpaceId::new("a")]);

        let execution = run(&api, ExistingPolicy::Update, &[described("a", "x"), described("b", "y")]).await;

        assert!(execution.failed());
        assert_eq!(execution.report.failed_updated.len(), 1);
        assert_eq!(execution.report.failed_updated[0].resource_ids, vec!["a"]);
        assert_eq!(execution.report.failed_updated[0].status_code, 400);
        assert_eq!(execution.report.updated.len(), 1);
        assert!(execution.report.forced.is_empty());
        assert_eq!(api.calls().update, 2);
        assert_eq!(api.calls().delete, 0);
    }

    #[tokio::test]
    async fn test_unblamed_creates_are_sent_again() {
        let api = Arc::new(FakeApi::<SpaceKind>::new());
        api.fail_create(&[SpaceId::new("b")]);

        let execution = run(&api, ExistingPolicy::Update, &[SpaceApply::new("a"), SpaceApply::new("b")]).await;

        assert_eq!(execution.report.created, vec!["a"]);
        assert_eq!(execution.created, vec![SpaceId::new("a")]);
        assert_eq!(execution.report.failed_created.len(), 1);
        assert_eq!(execution.report.failed_created[0].resource_ids, vec!["b"]);
        assert_eq!(api.calls().create, 2);
        assert_eq!(api.remote_ids(), vec![SpaceId::new("a")]);
    }

    #[tokio::test]
    async fn test_forced_create_deletes_are_restored() {
        let api = Arc::new(FakeApi::<SpaceKind>::new().strict_create());
        let mut loader = ResourceLoader::<SpaceKind>::new(api.clone());
        let plan = DeploymentPlanner::new(ExistingPolicy::Force, MergePolicy::Merge)
            .plan_kind(&mut loader, &[described("dup", "after")])
            .await
            .expect("plan");
        assert_eq!(plan.to_create.len(), 1);

        // Created remotely between planning and execution.
        api.seed(&[described("dup", "before")]);

        let mut execution = KindExecution::new(&plan);
        DeploymentExecutor::new(ExistingPolicy::Force)
            .create_phase(&mut loader, &plan, &mut execution)
            .await;

        assert!(!execution.failed());
        assert_eq!(execution.report.created, vec!["dup"]);
        assert_eq!(execution.report.deleted, vec!["dup"]);
        assert_eq!(execution.deleted, vec![described("dup", "before")]);

        assert!(DeploymentExecutor::undo_creates(&mut loader, &execution).await.is_empty());
        assert!(DeploymentExecutor::redo_deletes(&mut loader, &execution).await.is_empty());
        let restored = api.remote(&SpaceId::new("dup")).expect("restored");
        assert_eq!(restored.description.as_deref(), Some("before"));
    }

    #[tokio::test]
    async fn test_force_escalates_failed_updates() {
        let api = Arc::new(FakeApi::<SpaceKind>::new());
        api.seed(&[SpaceApply::new("a")]);
        api.fail_update(&[SpaceId::new("a")]);

        let execution = run(&api, ExistingPolicy::Force, &[described("a", "x")]).await;

        assert!(!execution.failed());
        assert_eq!(execution.report.forced.len(), 1);
        assert_eq!(execution.report.forced[0].resource_id, "a");
        assert_eq!(execution.report.forced[0].reason, "Rejected by fake");
        assert_eq!(execution.report.deleted, vec!["a"]);
        assert_eq!(execution.report.updated.len(), 1);
        assert_eq!(execution.deleted, vec![SpaceApply::new("a")]);
        let remote = api.remote(&SpaceId::new("a")).expect("recreated");
        assert_eq!(remote.description.as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_force_escalation_continues_after_failed_delete() {
        let api = Arc::new(FakeApi::<SpaceKind>::new());
        api.seed(&[SpaceApply::new("a")]);
        api.fail_update(&[SpaceId::new("a")]);
        api.fail_delete(&[SpaceId::new("a")]);

        let execution = run(&api, ExistingPolicy::Force, &[described("a", "x")]).await;

        assert!(execution.failed());
        assert_eq!(execution.report.failed_deleted.len(), 1);
        assert_eq!(api.calls().create, 1);
    }

    #[tokio::test]
    async fn test_recreate_deletes_then_creates() {
        let api = Arc::new(FakeApi::<SpaceKind>::new());
        api.seed(&[SpaceApply::new("same")]);

        let execution = run(&api, ExistingPolicy::Recreate, &[SpaceApply::new("same")]).await;

        assert_eq!(execution.report.deleted, vec!["same"]);
        assert_eq!(execution.report.created, vec!["same"]);
        assert_eq!(execution.report.to_delete, vec!["same"]);
        assert_eq!(api.calls().update, 0);
    }

    #[tokio::test]
    async fn test_failed_create_does_not_stop_updates() {
        let api = Arc::new(FakeApi::<SpaceKind>::new());
        api.seed(&[SpaceApply::new("old")]);
        api.fail_create(&[SpaceId::new("new")]);

        let execution = run(
            &api,
            ExistingPolicy::Update,
            &[SpaceApply::new("new"), described("old", "changed")],
        )
        .await;

        assert_eq!(execution.report.failed_created.len(), 1);
        assert_eq!(execution.report.updated.len(), 1);
    }

    #[tokio::test]
    async fn test_undo_and_redo() {
        let api = Arc::new(FakeApi::<SpaceKind>::new());
        api.seed(&[described("same", "before")]);

        let execution = run(&api, ExistingPolicy::Recreate, &[described("same", "after")]).await;
        let mut loader = ResourceLoader::<SpaceKind>::new(api.clone());

        assert!(DeploymentExecutor::undo_creates(&mut loader, &execution).await.is_empty());
        assert!(api.remote_ids().is_empty());
        assert!(DeploymentExecutor::redo_deletes(&mut loader, &execution).await.is_empty());
        let restored = api.remote(&SpaceId::new("same")).expect("restored");
        assert_eq!(restored.description.as_deref(), Some("before"));
    }
}
