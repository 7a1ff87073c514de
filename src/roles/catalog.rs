//! Role catalog: the read-only table of role definitions.
//!
//! The catalog is built once (built-in roles plus user roles from the
//! configuration file) and shared by every concurrent resolution.

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{ConfigError, Result};

use super::definition::RoleDefinition;

/// Built-in role definitions.
const BUILTIN_ROLES: &str = include_str!("../../share/roles.yaml");

/// Roles that were renamed; old names keep working.
pub const RENAMED_ROLES: &[(&str, &str)] = &[
    ("gluster_client", "glusterfs_client"),
    ("gluster_data", "glusterfs_server"),
    ("gridengine_clients", "gridengine_worker"),
    ("slurm_clients", "slurm_worker"),
    ("slurm_workers", "slurm_worker"),
];

/// Returns the current name of a role, following renames.
#[must_use]
pub fn canonical_role_name(name: &str) -> &str {
    RENAMED_ROLES
        .iter()
        .find(|(old, _)| *old == name)
        .map_or(name, |&(_, new)| new)
}

/// Returns true if the role name is a deprecated alias.
#[must_use]
pub fn is_renamed_role(name: &str) -> bool {
    RENAMED_ROLES.iter().any(|(old, _)| *old == name)
}

/// On-disk layout of a role file.
#[derive(Debug, Deserialize)]
struct RoleFile {
    #[serde(default)]
    roles: Vec<RoleDefinition>,
}

/// Table of role definitions keyed by name.
#[derive(Debug, Clone, Default)]
pub struct RoleCatalog {
    roles: IndexMap<String, RoleDefinition>,
}

impl RoleCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the built-in catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded role file is malformed.
    pub fn builtin() -> Result<Self> {
        let file: RoleFile = serde_yaml::from_str(BUILTIN_ROLES).map_err(|e| {
            ConfigError::ParseError {
                message: format!("Built-in role catalog is invalid: {e}"),
                location: Some(String::from("share/roles.yaml")),
            }
        })?;
        debug!("Loaded {} built-in roles", file.roles.len());
        Ok(Self::from_definitions(file.roles))
    }

    /// Builds a catalog from definitions. Later definitions replace earlier
    /// ones with the same name.
    #[must_use]
    pub fn from_definitions(definitions: impl IntoIterator<Item = RoleDefinition>) -> Self {
        let mut catalog = Self::new();
        for definition in definitions {
            catalog.insert(definition);
        }
        catalog
    }

    /// Adds user definitions on top of the current ones.
    #[must_use]
    pub fn with_overrides(mut self, definitions: impl IntoIterator<Item = RoleDefinition>) -> Self {
        for definition in definitions {
            if self.roles.contains_key(&definition.name) {
                info!("Role {} overridden by configuration", definition.name);
            }
            self.insert(definition);
        }
        self
    }

    /// Inserts or replaces a role, keeping the original position on replace.
    pub fn insert(&mut self, definition: RoleDefinition) {
        self.roles.insert(definition.name.clone(), definition);
    }

    /// Looks up a role, following renames.
    ///
    /// Deprecated names are reported once, when the inventory is built.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RoleDefinition> {
        self.roles.get(canonical_role_name(name))
    }

    /// Returns true if the role (or its renamed successor) is defined.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.roles.contains_key(canonical_role_name(name))
    }

    /// Iterates over role definitions in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &RoleDefinition> {
        self.roles.values()
    }

    /// Returns the role names in catalog order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.roles.keys().map(String::as_str).collect()
    }

    /// Returns the number of roles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Returns true if the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    /// Log sink shared between the subscriber and the test.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_builtin_catalog_parses() {
        let catalog = RoleCatalog::builtin().unwrap();
        for role in [
            "nis_master",
            "nis_client",
            "nfs_server",
            "nfs_client",
            "ceph_mon",
            "ceph_osd",
            "ceph_mds",
            "ceph_client",
        ] {
            assert!(catalog.contains(role), "missing built-in role {role}");
        }
        assert_eq!(catalog.names()[0], "nis_master");
    }

    #[test]
    fn test_renamed_roles_resolve() {
        let catalog = RoleCatalog::builtin().unwrap();
        assert_eq!(canonical_role_name("slurm_workers"), "slurm_worker");
        assert_eq!(canonical_role_name("nfs_server"), "nfs_server");
        assert!(is_renamed_role("gluster_data"));
        assert_eq!(catalog.get("gluster_data").map(|r| r.name.as_str()), Some("glusterfs_server"));
        assert!(!catalog.contains("gridengine_clients"));
    }

    #[test]
    fn test_lookup_by_renamed_role_is_silent() {
        let catalog = RoleCatalog::builtin().unwrap();
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::WARN)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            for _ in 0..3 {
                assert!(catalog.get("slurm_workers").is_some());
            }
        });
        assert!(logs.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_user_roles_override_builtin() {
        let mut custom = RoleDefinition::new("nfs_server");
        custom.packages = vec![String::from("my-nfs")];
        let catalog = RoleCatalog::builtin().unwrap().with_overrides([custom]);

        let role = catalog.get("nfs_server").unwrap();
        assert_eq!(role.packages, vec!["my-nfs"]);
        assert_eq!(catalog.names()[2], "nfs_server");
    }
}
