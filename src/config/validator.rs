//! Configuration validation for cluster configurations.
//!
//! This module checks a parsed configuration against the role catalog,
//! ensuring every profile reference resolves and every role is known before
//! any node is contacted.

use crate::error::{ConfigError, Result};
use crate::planner::ActionPlanner;
use crate::roles::{RoleCatalog, canonical_role_name, is_renamed_role};
use std::collections::HashSet;
use tracing::debug;

use super::spec::{CephTunables, ClusterConfig, ClusterProfile, SetupProfile};

/// Roles that read the Ceph tunables.
const CEPH_ROLES: &[&str] = &["ceph_mon", "ceph_osd", "ceph_mds", "ceph_client"];

/// Validator for cluster configurations.
#[derive(Debug)]
pub struct ConfigValidator<'a> {
    /// Roles the configuration may reference.
    catalog: &'a RoleCatalog,
}

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl<'a> ConfigValidator<'a> {
    /// Creates a validator checking role references against a catalog.
    #[must_use]
    pub const fn new(catalog: &'a RoleCatalog) -> Self {
        Self { catalog }
    }

    /// Validates a cluster configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn validate(&self, config: &ClusterConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        if result.errors.is_empty() {
            debug!("Configuration validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }
            .into())
        }
    }

    /// Runs every check and returns all findings, without failing.
    #[must_use]
    pub fn check(&self, config: &ClusterConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        if config.cluster.is_empty() {
            result.warnings.push(String::from("No clusters defined in configuration"));
        }

        for (name, login) in &config.login {
            if login.image_user.is_empty() {
                result.errors.push(ValidationError {
                    field: format!("login.{name}.image_user"),
                    message: String::from("Login user cannot be empty"),
                });
            }
            if login.ssh_port == 0 {
                result.errors.push(ValidationError {
                    field: format!("login.{name}.ssh_port"),
                    message: String::from("SSH port must be between 1 and 65535"),
                });
            }
        }

        for (name, setup) in &config.setup {
            self.validate_setup(name, setup, &mut result);
        }

        for (name, cluster) in &config.cluster {
            Self::validate_cluster(name, cluster, config, &mut result);
        }

        Self::validate_roles(config, &mut result);

        result
    }

    /// Validates a setup profile.
    fn validate_setup(&self, name: &str, setup: &SetupProfile, result: &mut ValidationResult) {
        let prefix = format!("setup.{name}");

        if setup.groups.is_empty() {
            result.warnings.push(format!("{prefix}: No node groups defined"));
        }

        for (group, roles) in &setup.groups {
            for (i, role) in roles.iter().enumerate() {
                let field = format!("{prefix}.groups.{group}[{i}]");
                if !self.catalog.contains(role) {
                    result.errors.push(ValidationError {
                        field,
                        message: format!("Unknown role '{role}'"),
                    });
                } else if is_renamed_role(role) {
                    result.warnings.push(format!(
                        "{field}: Role '{role}' is deprecated, use '{}'",
                        canonical_role_name(role)
                    ));
                }
            }
        }

        for group in setup.group_vars.keys() {
            if !setup.groups.contains_key(group) {
                result
                    .warnings
                    .push(format!("{prefix}.group_vars.{group}: Group has no roles in this setup"));
            }
        }

        if let Some(ceph) = &setup.ceph {
            Self::validate_ceph(&prefix, ceph, result);

            let uses_ceph = setup
                .groups
                .values()
                .flatten()
                .any(|role| CEPH_ROLES.contains(&canonical_role_name(role)));
            if !uses_ceph {
                result
                    .warnings
                    .push(format!("{prefix}.ceph: Ceph tunables set but no group has a Ceph role"));
            }
        }
    }

    /// Validates Ceph tunables.
    fn validate_ceph(prefix: &str, ceph: &CephTunables, result: &mut ValidationResult) {
        if ceph.pool_size == 0 {
            result.errors.push(ValidationError {
                field: format!("{prefix}.ceph.pool_size"),
                message: String::from("Pool size must be at least 1"),
            });
        }

        if ceph.pg_num == 0 {
            result.errors.push(ValidationError {
                field: format!("{prefix}.ceph.pg_num"),
                message: String::from("Placement group count must be at least 1"),
            });
        }

        if let Some(pgp_num) = ceph.pgp_num
            && pgp_num > ceph.pg_num
        {
            result.errors.push(ValidationError {
                field: format!("{prefix}.ceph.pgp_num"),
                message: format!("pgp_num ({pgp_num}) cannot exceed pg_num ({})", ceph.pg_num),
            });
        }

        if ceph.pool_size == 1 {
            result
                .warnings
                .push(format!("{prefix}.ceph.pool_size: A pool size of 1 keeps no replicas"));
        }
    }

    /// Validates a cluster profile.
    fn validate_cluster(
        name: &str,
        cluster: &ClusterProfile,
        config: &ClusterConfig,
        result: &mut ValidationResult,
    ) {
        let prefix = format!("cluster.{name}");

        if !is_valid_name(name) {
            result.errors.push(ValidationError {
                field: prefix.clone(),
                message: format!(
                    "Cluster name '{name}' is invalid. Must be lowercase alphanumeric with hyphens."
                ),
            });
        }

        if !config.login.contains_key(&cluster.login) {
            result.errors.push(ValidationError {
                field: format!("{prefix}.login"),
                message: format!("Unknown login profile '{}'", cluster.login),
            });
        }

        let setup = config.setup.get(&cluster.setup);
        if setup.is_none() {
            result.errors.push(ValidationError {
                field: format!("{prefix}.setup"),
                message: format!("Unknown setup profile '{}'", cluster.setup),
            });
        }

        if cluster.nodes.is_empty() {
            result.errors.push(ValidationError {
                field: format!("{prefix}.nodes"),
                message: String::from("Cluster must declare at least one node group"),
            });
        }

        for (group, count) in &cluster.nodes {
            if !is_valid_group(group) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.nodes.{group}"),
                    message: format!(
                        "Group name '{group}' is invalid. Must be lowercase alphanumeric."
                    ),
                });
            }
            if *count == 0 {
                result.warnings.push(format!("{prefix}.nodes.{group}: Group has no nodes"));
            }
            if let Some(setup) = setup
                && !setup.groups.contains_key(group)
            {
                result.warnings.push(format!(
                    "{prefix}.nodes.{group}: Group has no roles in setup '{}'",
                    cluster.setup
                ));
            }
        }

        if let Some(ssh_to) = &cluster.ssh_to
            && !cluster.nodes.contains_key(ssh_to)
        {
            result.errors.push(ValidationError {
                field: format!("{prefix}.ssh_to"),
                message: format!("ssh_to names unknown node group '{ssh_to}'"),
            });
        }

        for group in cluster.group_options.keys() {
            if !cluster.nodes.contains_key(group) {
                result
                    .warnings
                    .push(format!("{prefix}.group_options.{group}: Group has no nodes"));
            }
        }
    }

    /// Validates user role definitions.
    fn validate_roles(config: &ClusterConfig, result: &mut ValidationResult) {
        let mut seen_names = HashSet::new();

        for (i, role) in config.roles.iter().enumerate() {
            let prefix = format!("roles[{i}]");

            if !seen_names.insert(role.name.as_str()) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.name"),
                    message: format!("Duplicate role name: {}", role.name),
                });
            }

            if !is_valid_role_name(&role.name) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.name"),
                    message: format!(
                        "Role name '{}' is invalid. Must be lowercase alphanumeric with underscores.",
                        role.name
                    ),
                });
            }

            if is_renamed_role(&role.name) {
                result.warnings.push(format!(
                    "{prefix}.name: '{}' is a deprecated alias and can never be requested",
                    role.name
                ));
            }

            if let Err(e) = ActionPlanner::check_definition(role) {
                result.errors.push(ValidationError {
                    field: prefix,
                    message: e.to_string(),
                });
            }
        }
    }
}

/// Validates that a cluster name follows the naming convention.
/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    // First character must be a letter
    if !chars.next().is_some_and(|c| c.is_ascii_lowercase()) {
        return false;
    }

    // Rest must be lowercase alphanumeric or hyphen
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return false;
    }

    !name.ends_with('-') && !name.contains("--")
}

/// Group names end up inside node names, so no separators at all.
fn is_valid_group(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_lowercase())
        && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

fn is_valid_role_name(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_lowercase())
        && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;

    const VALID: &str = r"
login:
  ubuntu:
    image_user: ubuntu
setup:
  storage:
    groups:
      mon: [ceph_mon, ceph_mds]
      osd: [ceph_osd, gluster_data]
    ceph:
      pool_size: 3
cluster:
  ceph:
    login: ubuntu
    setup: storage
    ssh_to: mon
    nodes:
      mon: 1
      osd: 3
";

    fn parse(yaml: &str) -> ClusterConfig {
        ConfigParser::new().parse_yaml(yaml, None).unwrap()
    }

    #[test]
    fn test_valid_config_with_deprecation_warning() {
        let catalog = RoleCatalog::builtin().unwrap();
        let result = ConfigValidator::new(&catalog).validate(&parse(VALID)).unwrap();
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 1);
        assert!(result.warnings[0].contains("gluster_data"));
    }

    #[test]
    fn test_unknown_role_is_error() {
        let catalog = RoleCatalog::builtin().unwrap();
        let yaml = VALID.replace("ceph_mds", "ceph_rgw");
        let err = ConfigValidator::new(&catalog).validate(&parse(&yaml)).unwrap_err();
        assert!(err.to_string().contains("Unknown role 'ceph_rgw'"));
    }

    #[test]
    fn test_broken_references() {
        let catalog = RoleCatalog::builtin().unwrap();
        let yaml = VALID
            .replace("login: ubuntu", "login: centos")
            .replace("ssh_to: mon", "ssh_to: frontend");
        let result = ConfigValidator::new(&catalog).check(&parse(&yaml));
        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["cluster.ceph.login", "cluster.ceph.ssh_to"]);
    }

    #[test]
    fn test_ceph_pgp_num_bound() {
        let catalog = RoleCatalog::builtin().unwrap();
        let yaml = VALID.replace("pool_size: 3", "pool_size: 3\n      pg_num: 64\n      pgp_num: 128");
        let result = ConfigValidator::new(&catalog).check(&parse(&yaml));
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.errors[0].field, "setup.storage.ceph.pgp_num");
    }

    #[test]
    fn test_unplannable_user_role() {
        let catalog = RoleCatalog::builtin().unwrap();
        let yaml = format!(
            "{VALID}roles:\n  - name: yp_init\n    post_commands:\n      - command: ./ypinit -m\n"
        );
        let result = ConfigValidator::new(&catalog).check(&parse(&yaml));
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.errors[0].field, "roles[0]");
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("slurm"));
        assert!(is_valid_name("ceph-lab-2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Slurm"));
        assert!(!is_valid_name("2slurm"));
        assert!(!is_valid_name("slurm_lab"));
        assert!(!is_valid_name("slurm-"));
        assert!(!is_valid_name("slurm--lab"));
    }

    #[test]
    fn test_valid_group_and_role_names() {
        assert!(is_valid_group("compute"));
        assert!(!is_valid_group("compute-node"));
        assert!(is_valid_role_name("nis_master"));
        assert!(!is_valid_role_name("nis-master"));
    }

    #[test]
    fn test_example_config_is_valid() {
        let catalog = RoleCatalog::builtin().unwrap();
        let config = parse(include_str!("../../share/cluster.example.yaml"));
        let result = ConfigValidator::new(&catalog).check(&config);
        assert!(result.is_valid(), "{:?}", result.errors);
        assert_eq!(result.warning_count(), 0, "{:?}", result.warnings);
    }
}
