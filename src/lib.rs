// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
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

//! # Cluster Roles
//!
//! Role-based configuration resolver and phased action planner for compute
//! clusters (NIS, NFS, Ceph, GlusterFS, Slurm).
//!
//! ## Overview
//!
//! A cluster is described declaratively: node groups, the roles each group
//! plays, and the variables those roles need. For every node, this crate:
//!
//! - Collects facts (OS family and version, declared roles, variables)
//! - Resolves the node's roles into one de-duplicated plan, applying
//!   OS-specific overrides
//! - Orders the plan into phases and runs it through an execution backend
//!
//! ## Architecture
//!
//! 1. **Catalog**: Built-in roles from `share/roles.yaml`, replaced by user
//!    roles from the configuration file
//! 2. **Inventory**: A cluster profile expanded into named nodes
//! 3. **Planning**: packages, templates, handler flush, services, then
//!    post-install commands
//! 4. **Orchestrator**: Nodes run concurrently, actions within a node run in
//!    order, a failed node never stops the others
//!
//! ## Modules
//!
//! - [`config`]: Configuration parsing and validation
//! - [`cluster`]: Inventory of cluster nodes
//! - [`facts`]: Fact collection and OS detection
//! - [`roles`]: Role definitions, catalog and resolver
//! - [`planner`]: Action planning, execution backends and the node runner
//! - [`orchestrator`]: Cluster-wide runs
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! login:
//!   debian9:
//!     image_user: debian
//!
//! setup:
//!   nis-nfs:
//!     groups:
//!       frontend: [nis_master, nfs_server]
//!       compute: [nis_client, nfs_client]
//!
//! cluster:
//!   lab:
//!     login: debian9
//!     setup: nis-nfs
//!     ssh_to: frontend
//!     nodes:
//!       frontend: 1
//!       compute: 4
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod cluster;
pub mod config;
pub mod error;
pub mod facts;
pub mod orchestrator;
pub mod planner;
pub mod roles;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use cluster::{Inventory, NodeSpec};
pub use config::{ClusterConfig, ConfigParser, ConfigValidator};
pub use error::{ClusterError, Result};
pub use facts::{FactCollector, NodeFacts, OsFamily};
pub use orchestrator::{NodeOutcome, Orchestrator, RunOptions, RunReport};
pub use planner::{ActionPlanner, ActionSequence, DryRunExecutor, ExecutorAdapter, PlanRunner};
pub use roles::{ResolvedPlan, RoleCatalog, RoleDefinition, RoleResolver};
