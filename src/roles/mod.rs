//! Role module: definitions, the shared catalog and the resolver.
//!
//! This module handles everything between a node's facts and its merged
//! plan:
//! - Role definitions with predicate-gated overrides
//! - The read-only role catalog (built-in and user roles)
//! - Resolution of a role set into a de-duplicated plan

mod catalog;
mod definition;
mod resolver;

pub use catalog::{RENAMED_ROLES, RoleCatalog, canonical_role_name, is_renamed_role};
pub use definition::{
    ConditionalOverride, EffectiveRole, HandlerAction, HandlerSpec, PostCommandSpec, Predicate,
    RoleDefinition, RolePatch, ServiceSpec, ServiceState, TemplateSpec,
};
pub use resolver::{ResolvedPlan, RoleResolver};
