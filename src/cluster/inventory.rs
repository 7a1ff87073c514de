//! Cluster inventory.
//!
//! Expands a cluster profile into the concrete list of nodes the other
//! stages work on. Each node carries its group, the roles its group gets in
//! the setup profile, its variables and its provisioning options.

use indexmap::IndexSet;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::config::{ClusterConfig, DeclaredFacts, LoginProfile, SetupProfile};
use crate::error::{ConfigError, Result};
use crate::facts::{NodeFacts, OsFamily};
use crate::roles::{canonical_role_name, is_renamed_role};

/// Builds a node name from its cluster, group and 1-based index.
#[must_use]
pub fn node_name(cluster: &str, group: &str, index: u32) -> String {
    format!("{cluster}-{group}{index:03}")
}

/// A single node of a cluster.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NodeSpec {
    /// Node name, e.g. `slurm-frontend001`.
    pub name: String,
    /// Node group.
    pub group: String,
    /// 1-based index within the group.
    pub index: u32,
    /// Address used to reach the node.
    pub address: String,
    /// Roles of the node's group, with deprecated names replaced.
    pub roles: IndexSet<String>,
    /// Node variables after precedence is applied.
    pub vars: BTreeMap<String, String>,
    /// Provisioning options after group overrides.
    pub options: BTreeMap<String, String>,
    /// OS facts declared in the configuration, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared: Option<DeclaredFacts>,
}

impl NodeSpec {
    /// Builds the facts snapshot of this node for a detected OS.
    #[must_use]
    pub fn facts(&self, os_family: OsFamily, os_version: impl Into<String>) -> NodeFacts {
        NodeFacts::new(&self.name, os_family, os_version)
            .with_roles(self.roles.iter().cloned())
            .with_vars(self.vars.clone())
    }
}

/// The nodes of one cluster.
#[derive(Debug, Clone, Serialize)]
pub struct Inventory {
    /// Cluster name.
    pub cluster: String,
    /// Nodes in group declaration order, then index order.
    pub nodes: Vec<NodeSpec>,
    /// Name of the node users ssh to.
    pub frontend: Option<String>,
    /// Login profile shared by every node.
    pub login: LoginProfile,
}

impl Inventory {
    /// Expands a cluster profile.
    ///
    /// `env_vars` win over every variable coming from the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster, or the login or setup profile it
    /// references, does not exist.
    pub fn from_config(
        config: &ClusterConfig,
        cluster: &str,
        env_vars: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let profile = config.cluster(cluster).ok_or_else(|| ConfigError::UnknownProfile {
            kind: "cluster",
            name: cluster.to_string(),
        })?;
        let login = config.login.get(&profile.login).ok_or_else(|| ConfigError::UnknownProfile {
            kind: "login",
            name: profile.login.clone(),
        })?;
        let setup = config.setup.get(&profile.setup).ok_or_else(|| ConfigError::UnknownProfile {
            kind: "setup",
            name: profile.setup.clone(),
        })?;

        let base_options = profile.base_options();
        let mut nodes = Vec::new();

        for (group, count) in &profile.nodes {
            let roles = group_roles(setup, group);
            let vars = group_vars(setup, group, env_vars);
            let mut options = base_options.clone();
            if let Some(overrides) = profile.group_options.get(group) {
                options.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
            }

            for index in 1..=*count {
                let name = node_name(cluster, group, index);
                let address = config.hosts.get(&name).cloned().unwrap_or_else(|| name.clone());
                let declared = config.inventory.get(&name).cloned();
                nodes.push(NodeSpec {
                    name,
                    group: group.clone(),
                    index,
                    address,
                    roles: roles.clone(),
                    vars: vars.clone(),
                    options: options.clone(),
                    declared,
                });
            }
        }

        let frontend = profile.ssh_to.as_deref().and_then(|group| {
            let frontend = nodes
                .iter()
                .filter(|n| n.group == group)
                .map(|n| &n.name)
                .min()
                .cloned();
            if frontend.is_none() {
                warn!("ssh_to group '{group}' has no nodes in cluster {cluster}");
            }
            frontend
        });

        debug!("Cluster {cluster}: {} nodes, frontend {:?}", nodes.len(), frontend);

        Ok(Self {
            cluster: cluster.to_string(),
            nodes,
            frontend,
            login: login.clone(),
        })
    }

    /// Returns a node by name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Returns the frontend node.
    #[must_use]
    pub fn frontend_node(&self) -> Option<&NodeSpec> {
        self.frontend.as_deref().and_then(|name| self.node(name))
    }

    /// Returns node names in inventory order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    /// Returns every role any node requests, in first-request order.
    #[must_use]
    pub fn requested_roles(&self) -> IndexSet<&str> {
        self.nodes
            .iter()
            .flat_map(|n| n.roles.iter().map(String::as_str))
            .collect()
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the cluster has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Roles of a group, with deprecated names replaced.
fn group_roles(setup: &SetupProfile, group: &str) -> IndexSet<String> {
    let Some(roles) = setup.groups.get(group) else {
        warn!("Node group '{group}' has no roles in the setup profile");
        return IndexSet::new();
    };

    roles
        .iter()
        .map(|role| {
            if is_renamed_role(role) {
                warn!(
                    "Role '{role}' of group '{group}' is deprecated, using '{}'",
                    canonical_role_name(role)
                );
            }
            canonical_role_name(role).to_string()
        })
        .collect()
}

/// Variables of a group: global, then group, then Ceph, then environment.
fn group_vars(
    setup: &SetupProfile,
    group: &str,
    env_vars: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut vars = setup.global_vars.clone();
    if let Some(overrides) = setup.group_vars.get(group) {
        vars.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    if let Some(ceph) = &setup.ceph {
        vars.extend(ceph.as_vars());
    }
    vars.extend(env_vars.iter().map(|(k, v)| (k.clone(), v.clone())));
    vars
}
