//! Configuration file types.
//!
//! This module defines all the structs that map to the cluster
//! configuration file: login, setup and cluster profiles, static host
//! data and user role definitions.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::facts::OsFamily;
use crate::roles::RoleDefinition;

/// The root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ClusterConfig {
    /// Login profiles by name.
    #[serde(default)]
    pub login: BTreeMap<String, LoginProfile>,
    /// Setup profiles by name.
    #[serde(default)]
    pub setup: BTreeMap<String, SetupProfile>,
    /// Cluster profiles by name.
    #[serde(default)]
    pub cluster: BTreeMap<String, ClusterProfile>,
    /// Node name to address mapping.
    #[serde(default)]
    pub hosts: BTreeMap<String, String>,
    /// Statically declared OS facts by node name.
    #[serde(default)]
    pub inventory: BTreeMap<String, DeclaredFacts>,
    /// User role definitions, replacing built-in roles with the same name.
    #[serde(default)]
    pub roles: Vec<RoleDefinition>,
}

/// How to log into cluster nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginProfile {
    /// Remote user.
    pub image_user: String,
    /// Whether the remote user escalates with sudo.
    #[serde(default = "default_true")]
    pub image_sudo: bool,
    /// User to sudo to.
    #[serde(default = "default_sudo_user")]
    pub image_user_sudo: String,
    /// Name of the key pair registered with the cloud.
    #[serde(default)]
    pub user_key_name: Option<String>,
    /// Path to the private key.
    #[serde(default)]
    pub user_key_private: Option<String>,
    /// Path to the public key.
    #[serde(default)]
    pub user_key_public: Option<String>,
    /// SSH port.
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
}

/// Which roles each node group gets, plus shared variables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SetupProfile {
    /// Node group to roles mapping.
    #[serde(default)]
    pub groups: IndexMap<String, Vec<String>>,
    /// Variables for every node.
    #[serde(default)]
    pub global_vars: BTreeMap<String, String>,
    /// Variables per node group (win over global ones).
    #[serde(default)]
    pub group_vars: BTreeMap<String, BTreeMap<String, String>>,
    /// Ceph tunables.
    #[serde(default)]
    pub ceph: Option<CephTunables>,
}

/// Ceph-specific settings exposed to Ceph roles as variables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CephTunables {
    /// Ceph release name.
    #[serde(default = "default_ceph_release")]
    pub release: String,
    /// Default replica count of pools.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// Placement groups per pool.
    #[serde(default = "default_pg_num")]
    pub pg_num: u32,
    /// Placement groups for placement (defaults to `pg_num`).
    #[serde(default)]
    pub pgp_num: Option<u32>,
}

/// A cluster: node groups, counts and provisioning parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterProfile {
    /// Login profile name.
    pub login: String,
    /// Setup profile name.
    pub setup: String,
    /// Number of nodes per group, in declaration order.
    pub nodes: IndexMap<String, u32>,
    /// Group users log into.
    #[serde(default)]
    pub ssh_to: Option<String>,
    /// Cloud image.
    #[serde(default)]
    pub image_id: Option<String>,
    /// Instance flavor.
    #[serde(default)]
    pub flavor: Option<String>,
    /// Comma separated network ids.
    #[serde(default)]
    pub network_ids: Option<String>,
    /// Security group.
    #[serde(default)]
    pub security_group: Option<String>,
    /// Whether nodes get a floating IP.
    #[serde(default)]
    pub floating_ip: bool,
    /// Per-group option overrides (e.g. a bigger flavor for storage nodes).
    #[serde(default)]
    pub group_options: BTreeMap<String, BTreeMap<String, String>>,
}

/// OS facts declared instead of probed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeclaredFacts {
    /// OS family.
    pub os_family: OsFamily,
    /// OS version.
    pub os_version: String,
}

// Default value functions

const fn default_true() -> bool {
    true
}

const fn default_ssh_port() -> u16 {
    22
}

const fn default_pool_size() -> u32 {
    2
}

const fn default_pg_num() -> u32 {
    128
}

fn default_sudo_user() -> String {
    String::from("root")
}

fn default_ceph_release() -> String {
    String::from("luminous")
}

impl ClusterConfig {
    /// Returns a cluster profile by name.
    #[must_use]
    pub fn cluster(&self, name: &str) -> Option<&ClusterProfile> {
        self.cluster.get(name)
    }

    /// Returns cluster names.
    #[must_use]
    pub fn cluster_names(&self) -> Vec<&str> {
        self.cluster.keys().map(String::as_str).collect()
    }
}

impl ClusterProfile {
    /// Returns the total node count.
    #[must_use]
    pub fn total_nodes(&self) -> u32 {
        self.nodes.values().sum()
    }

    /// Returns the cluster-wide options, in the shape group overrides use.
    #[must_use]
    pub fn base_options(&self) -> BTreeMap<String, String> {
        let mut options = BTreeMap::new();
        let fields = [
            ("image_id", self.image_id.as_ref()),
            ("flavor", self.flavor.as_ref()),
            ("network_ids", self.network_ids.as_ref()),
            ("security_group", self.security_group.as_ref()),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                options.insert(key.to_string(), value.clone());
            }
        }
        options.insert(String::from("floating_ip"), self.floating_ip.to_string());
        options
    }
}

impl CephTunables {
    /// Returns the tunables as template variables.
    #[must_use]
    pub fn as_vars(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (String::from("ceph_release"), self.release.clone()),
            (String::from("ceph_pool_size"), self.pool_size.to_string()),
            (String::from("ceph_pg_num"), self.pg_num.to_string()),
            (
                String::from("ceph_pgp_num"),
                self.pgp_num.unwrap_or(self.pg_num).to_string(),
            ),
        ])
    }
}

impl LoginProfile {
    /// Creates a profile for a user with defaults for everything else.
    #[must_use]
    pub fn new(image_user: impl Into<String>) -> Self {
        Self {
            image_user: image_user.into(),
            image_sudo: true,
            image_user_sudo: default_sudo_user(),
            user_key_name: None,
            user_key_private: None,
            user_key_public: None,
            ssh_port: default_ssh_port(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceph_vars_default_pgp_num() {
        let ceph = CephTunables {
            release: String::from("mimic"),
            pool_size: 3,
            pg_num: 64,
            pgp_num: None,
        };
        let vars = ceph.as_vars();
        assert_eq!(vars["ceph_release"], "mimic");
        assert_eq!(vars["ceph_pool_size"], "3");
        assert_eq!(vars["ceph_pgp_num"], "64");
    }

    #[test]
    fn test_base_options() {
        let profile: ClusterProfile = serde_yaml::from_str(
            r"
login: ubuntu
setup: nis-nfs
nodes: {frontend: 1, compute: 4}
image_id: ami-123
flavor: m1.small
",
        )
        .unwrap();
        assert_eq!(profile.total_nodes(), 5);
        let options = profile.base_options();
        assert_eq!(options["flavor"], "m1.small");
        assert_eq!(options["floating_ip"], "false");
        assert!(!options.contains_key("security_group"));
    }
}
