//! Role resolver.
//!
//! Maps a node's requested roles plus its facts to a [`ResolvedPlan`]: the
//! de-duplicated union of every effective role definition, in the order the
//! roles were requested.

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{ResolveError, Result};
use crate::facts::NodeFacts;

use super::catalog::RoleCatalog;
use super::definition::{EffectiveRole, HandlerAction, PostCommandSpec, ServiceSpec, TemplateSpec};

/// Everything a node needs, merged across its roles.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResolvedPlan {
    /// Node the plan was resolved for.
    pub node: String,
    /// Roles merged into the plan, in merge order.
    pub roles: Vec<String>,
    /// Packages, de-duplicated, first declaration wins its position.
    pub package_set: IndexSet<String>,
    /// Services, de-duplicated by name, first declaration wins.
    pub service_list: Vec<ServiceSpec>,
    /// Template deployments, coalesced by destination.
    pub template_actions: Vec<TemplateSpec>,
    /// Handler definitions by name, first definition wins.
    pub handlers: IndexMap<String, HandlerAction>,
    /// Every handler some template may queue.
    pub handler_triggers: IndexSet<String>,
    /// Post-install commands in declaration order.
    pub post_commands: Vec<PostCommandSpec>,
    /// Node variables available to templates.
    pub vars: BTreeMap<String, String>,
}

/// Resolves role sets against a shared catalog.
#[derive(Debug, Clone, Copy)]
pub struct RoleResolver<'a> {
    /// Role definitions.
    catalog: &'a RoleCatalog,
}

impl<'a> RoleResolver<'a> {
    /// Creates a resolver over a catalog.
    #[must_use]
    pub const fn new(catalog: &'a RoleCatalog) -> Self {
        Self { catalog }
    }

    /// Resolves the requested roles for a node.
    ///
    /// Every role is looked up before anything is merged, so an unknown
    /// role never yields a partial plan.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::UnknownRole`] if a requested role has no
    /// definition.
    pub fn resolve<S: AsRef<str>>(
        &self,
        facts: &NodeFacts,
        requested_roles: impl IntoIterator<Item = S>,
    ) -> Result<ResolvedPlan> {
        let mut seen = IndexSet::new();
        let mut definitions = Vec::new();
        for role in requested_roles {
            let role = role.as_ref();
            let definition = self.catalog.get(role).ok_or_else(|| ResolveError::UnknownRole {
                role: role.to_string(),
                node: facts.node.clone(),
            })?;
            if seen.insert(definition.name.clone()) {
                definitions.push(definition);
            }
        }

        let mut plan = ResolvedPlan::empty(&facts.node);
        plan.vars.clone_from(&facts.vars);

        for definition in definitions {
            let effective = definition.effective(facts);
            plan.merge(effective);
        }

        debug!(
            "Resolved {} for {}: {} packages, {} services, {} templates, {} post commands",
            plan.roles.join(","),
            facts.node,
            plan.package_set.len(),
            plan.service_list.len(),
            plan.template_actions.len(),
            plan.post_commands.len()
        );

        Ok(plan)
    }

    /// Resolves the roles declared in the facts themselves.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::UnknownRole`] if a declared role has no
    /// definition.
    pub fn resolve_declared(&self, facts: &NodeFacts) -> Result<ResolvedPlan> {
        self.resolve(facts, facts.roles.iter())
    }
}

impl ResolvedPlan {
    /// Creates an empty plan for a node.
    #[must_use]
    pub fn empty(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            roles: vec![],
            package_set: IndexSet::new(),
            service_list: vec![],
            template_actions: vec![],
            handlers: IndexMap::new(),
            handler_triggers: IndexSet::new(),
            post_commands: vec![],
            vars: BTreeMap::new(),
        }
    }

    /// Merges one effective role into the plan.
    pub fn merge(&mut self, role: EffectiveRole) {
        self.roles.push(role.name);

        self.package_set.extend(role.packages);

        for service in role.services {
            if !self.service_list.iter().any(|s| s.name == service.name) {
                self.service_list.push(service);
            }
        }

        for template in role.templates {
            self.handler_triggers.extend(template.notify.iter().cloned());
            match self.template_actions.iter_mut().find(|t| t.dest == template.dest) {
                Some(existing) => {
                    for handler in template.notify {
                        if !existing.notify.contains(&handler) {
                            existing.notify.push(handler);
                        }
                    }
                }
                None => self.template_actions.push(template),
            }
        }

        for handler in role.handlers {
            self.handlers.entry(handler.name).or_insert(handler.action);
        }

        self.post_commands.extend(role.post_commands);
    }

    /// Returns true if the plan has nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.package_set.is_empty()
            && self.service_list.is_empty()
            && self.template_actions.is_empty()
            && self.post_commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::OsFamily;
    use crate::roles::definition::{RoleDefinition, ServiceState};

    fn builtin() -> RoleCatalog {
        RoleCatalog::builtin().unwrap()
    }

    fn role(name: &str, packages: &[&str], services: &[&str]) -> RoleDefinition {
        let mut role = RoleDefinition::new(name);
        role.packages = packages.iter().map(ToString::to_string).collect();
        role.services = services.iter().map(|s| ServiceSpec::started(*s)).collect();
        role
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let catalog = builtin();
        let resolver = RoleResolver::new(&catalog);
        let facts = NodeFacts::new("c1-frontend001", OsFamily::Debian, "stretch");
        let roles = ["nis_master", "nfs_server", "ceph_mon", "ceph_osd"];

        let first = resolver.resolve(&facts, roles).unwrap();
        let second = resolver.resolve(&facts, roles).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }

    #[test]
    fn test_packages_and_services_deduplicated() {
        let catalog = RoleCatalog::from_definitions([
            role("a", &["x", "y"], &["svc-a", "shared"]),
            role("b", &["z", "x"], &["shared", "svc-b"]),
        ]);
        let resolver = RoleResolver::new(&catalog);
        let facts = NodeFacts::new("n1", OsFamily::Debian, "stretch");

        let plan = resolver.resolve(&facts, ["a", "b"]).unwrap();
        let packages: Vec<&str> = plan.package_set.iter().map(String::as_str).collect();
        assert_eq!(packages, vec!["x", "y", "z"]);
        let services: Vec<&str> = plan.service_list.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(services, vec!["svc-a", "shared", "svc-b"]);

        let plan = resolver.resolve(&facts, ["b", "a"]).unwrap();
        let packages: Vec<&str> = plan.package_set.iter().map(String::as_str).collect();
        assert_eq!(packages, vec!["z", "x", "y"]);
    }

    #[test]
    fn test_unknown_role_fails() {
        let catalog = builtin();
        let resolver = RoleResolver::new(&catalog);
        let facts = NodeFacts::new("n1", OsFamily::Rhel, "7");

        let err = resolver.resolve(&facts, ["nfs_server", "ceph_rgw"]).unwrap_err();
        assert!(matches!(
            err,
            crate::error::ClusterError::Resolve(ResolveError::UnknownRole { ref role, .. }) if role == "ceph_rgw"
        ));
    }

    #[test]
    fn test_nis_master_rhel_deploys_yppasswdd() {
        let catalog = builtin();
        let resolver = RoleResolver::new(&catalog);

        let rhel = NodeFacts::new("n1", OsFamily::Rhel, "7");
        let plan = resolver.resolve(&rhel, ["nis_master"]).unwrap();
        assert!(plan.template_actions.iter().any(|t| t.dest == "/etc/sysconfig/yppasswdd"));
        assert!(plan.package_set.contains("ypserv"));

        let debian = NodeFacts::new("n1", OsFamily::Debian, "stretch");
        let plan = resolver.resolve(&debian, ["nis_master"]).unwrap();
        assert!(!plan.template_actions.iter().any(|t| t.dest == "/etc/sysconfig/yppasswdd"));
        assert!(plan.package_set.contains("nis"));
    }

    #[test]
    fn test_jessie_nis_service_restarted() {
        let catalog = builtin();
        let resolver = RoleResolver::new(&catalog);

        let jessie = NodeFacts::new("n1", OsFamily::Debian, "jessie");
        let plan = resolver.resolve(&jessie, ["nis_client"]).unwrap();
        let nis = plan.service_list.iter().find(|s| s.name == "nis").unwrap();
        assert_eq!(nis.state, ServiceState::Restarted);

        let stretch = NodeFacts::new("n1", OsFamily::Debian, "stretch");
        let plan = resolver.resolve(&stretch, ["nis_client"]).unwrap();
        let nis = plan.service_list.iter().find(|s| s.name == "nis").unwrap();
        assert_eq!(nis.state, ServiceState::Started);
    }

    #[test]
    fn test_shared_template_coalesced_by_destination() {
        let catalog = builtin();
        let resolver = RoleResolver::new(&catalog);
        let facts = NodeFacts::new("n1", OsFamily::Debian, "stretch");

        let plan = resolver.resolve(&facts, ["ceph_mon", "ceph_osd"]).unwrap();
        let confs: Vec<&TemplateSpec> = plan
            .template_actions
            .iter()
            .filter(|t| t.dest == "/etc/ceph/ceph.conf")
            .collect();
        assert_eq!(confs.len(), 1);
        assert_eq!(confs[0].notify, vec!["restart-ceph-mon", "restart-ceph-osd"]);
        assert_eq!(plan.handler_triggers.len(), 2);
    }

    #[test]
    fn test_duplicate_and_renamed_requests_merge_once() {
        let catalog = builtin();
        let resolver = RoleResolver::new(&catalog);
        let facts = NodeFacts::new("n1", OsFamily::Rhel, "7");

        let plan = resolver
            .resolve(&facts, ["slurm_worker", "slurm_workers", "slurm_worker"])
            .unwrap();
        assert_eq!(plan.roles, vec!["slurm_worker"]);
    }

    #[test]
    fn test_vars_copied_from_facts() {
        let catalog = builtin();
        let resolver = RoleResolver::new(&catalog);
        let facts = NodeFacts::new("n1", OsFamily::Rhel, "7")
            .with_roles(["ceph_client"])
            .with_vars(BTreeMap::from([(String::from("ceph_release"), String::from("luminous"))]));

        let plan = resolver.resolve_declared(&facts).unwrap();
        assert_eq!(plan.vars.get("ceph_release").map(String::as_str), Some("luminous"));
        assert!(plan.package_set.contains("ceph-fuse"));
        assert!(!plan.is_empty());
    }
}
