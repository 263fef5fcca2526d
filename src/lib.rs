// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![warn(missing_docs)]                // All public items must be documented
#![warn(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![warn(unused_imports)]              // Unused imports are forbidden
#![warn(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # dms-sync
//!
//! Declarative deployment of data modeling schemas to a CDF project.
//!
//! ## Overview
//!
//! A schema is a set of spaces, containers, views and data models. `dms-sync`
//! compares a local schema with what the project already holds and brings the
//! project in line with it:
//!
//! - Retrieve remote resources through per-kind loaders with an identity cache
//! - Classify every local resource as create, update, recreate, skip or unchanged
//! - Apply the plan in dependency order, one batched call per kind and operation
//! - Report every success and failure, and optionally undo a failed run
//!
//! ## Architecture
//!
//! 1. **Local schema**: defined in a YAML file referenced from `dms-sync.yaml`
//! 2. **Remote schema**: retrieved from the data modeling API
//! 3. **Planner**: compares both under an existing-resource policy
//! 4. **Executor**: performs the planned calls and records the outcome
//!
//! ## Modules
//!
//! - [`schema`]: Resource identities and write/read forms
//! - [`cdf`]: Data modeling API transport
//! - [`loader`]: Cached, per-kind resource loading
//! - [`planner`]: Differences, plans and plan execution
//! - [`deployer`]: End-to-end deployment with restore
//! - [`config`]: Configuration parsing and schema validation
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! project:
//!   name: asset-model
//!
//! cdf:
//!   project: acme-dev
//!   base_url: https://westeurope-1.cognitedata.com
//!
//! deploy:
//!   existing: update
//!   governance: additive
//!
//! schema: schema.yaml
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cdf;
pub mod cli;
pub mod config;
pub mod deployer;
pub mod error;
pub mod loader;
pub mod planner;
pub mod schema;

// ============================================================================
// Re-exports
// ============================================================================

pub use cdf::{ApiFailure, ApiResult, CdfClient, ResourceApi};
pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, DeployConfig, SchemaHasher, SchemaValidator};
pub use deployer::{DeployOptions, DeployResult, DeployStatus, Deployer};
pub use error::{Result, SyncError};
pub use loader::{ResourceLoader, SchemaLoaders};
pub use planner::{DeploymentExecutor, DeploymentPlan, DeploymentPlanner, ExistingPolicy, MergePolicy};
pub use schema::{DmsSchema, ResourceKind};
