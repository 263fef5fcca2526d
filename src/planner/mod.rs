//! Planning module for deployment operations.
//!
//! This module compares local definitions with their remote counterparts,
//! buckets every resource into create/update/recreate/skip/unchanged, and
//! applies the resulting plan kind by kind.

mod diff;
mod executor;
mod plan;

pub use diff::{DifferenceFactory, MergePolicy, PropertyChange, PropertyValue, ResourceDifference};
pub use executor::{DeploymentExecutor, FailedRequest, ForcedResource, KindExecution, KindReport};
pub use plan::{
    DeploymentPlan, DeploymentPlanner, ExistingPolicy, KindPlan, KindSummary, PlannedRecreate,
    PlannedUpdate,
};
