//! Configuration parser for loading cluster configuration files.
//!
//! This module handles loading configuration from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{ConfigError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::ClusterConfig;

/// Prefix of environment variables that override node variables.
pub const VAR_ENV_PREFIX: &str = "CLUSTER_ROLES_VAR_";

/// Configuration parser for loading cluster configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<ClusterConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ParseError {
            message: format!("Failed to read file: {e}"),
            location: Some(path.display().to_string()),
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<ClusterConfig> {
        debug!("Parsing YAML configuration");

        let config: ClusterConfig = serde_yaml::from_str(content).map_err(|e| {
            ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            }
        })?;

        debug!(
            "Parsed configuration: {} clusters, {} setups, {} user roles",
            config.cluster.len(),
            config.setup.len(),
            config.roles.len()
        );
        Ok(config)
    }

    /// Loads configuration with environment variable overrides.
    ///
    /// `CLUSTER_ROLES_SSH_USER` and `CLUSTER_ROLES_SSH_KEY` override the user
    /// and private key of every login profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<ClusterConfig> {
        let mut config = self.load_file(path)?;

        Self::apply_env_overrides(&mut config);

        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(config: &mut ClusterConfig) {
        if let Ok(user) = std::env::var("CLUSTER_ROLES_SSH_USER") {
            debug!("Overriding login image_user from environment");
            for login in config.login.values_mut() {
                login.image_user.clone_from(&user);
            }
        }

        if let Ok(key) = std::env::var("CLUSTER_ROLES_SSH_KEY") {
            debug!("Overriding login user_key_private from environment");
            for login in config.login.values_mut() {
                login.user_key_private = Some(key.clone());
            }
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| ConfigError::ParseError {
                message: format!("Failed to load .env file: {e}"),
                location: Some(env_path.display().to_string()),
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Collects node variable overrides from the process environment.
    #[must_use]
    pub fn var_overrides_from_env() -> BTreeMap<String, String> {
        var_overrides(std::env::vars())
    }
}

/// Extracts `CLUSTER_ROLES_VAR_<NAME>` entries as lower-cased variable names.
#[must_use]
pub fn var_overrides(vars: impl IntoIterator<Item = (String, String)>) -> BTreeMap<String, String> {
    vars.into_iter()
        .filter_map(|(key, value)| {
            let name = key.strip_prefix(VAR_ENV_PREFIX)?;
            (!name.is_empty()).then(|| (name.to_lowercase(), value))
        })
        .collect()
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["cluster.yaml", "cluster.yml", "cluster-roles.yaml"];

/// Finds the configuration file in the current directory or parent
/// directories, then in the user configuration directory.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    if let Some(config_path) = user_config_file().filter(|p| p.exists()) {
        info!("Found configuration file: {}", config_path.display());
        return Ok(config_path);
    }

    Err(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }
    .into())
}

/// Returns `<config_dir>/cluster-roles/config.yaml`.
#[must_use]
pub fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("cluster-roles").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r"
login:
  centos:
    image_user: centos
setup:
  nfs:
    groups:
      server: [nfs_server]
cluster:
  storage:
    login: centos
    setup: nfs
    nodes:
      server: 1
";
        let parser = ConfigParser::new();
        let config = parser.parse_yaml(yaml, None).unwrap();

        let login = &config.login["centos"];
        assert!(login.image_sudo);
        assert_eq!(login.image_user_sudo, "root");
        assert_eq!(login.ssh_port, 22);
        assert_eq!(config.cluster_names(), vec!["storage"]);
        assert!(config.roles.is_empty());
    }

    #[test]
    fn test_parse_user_roles() {
        let yaml = r"
roles:
  - name: monitoring
    packages: [collectd]
    services: [collectd]
    overrides:
      - when: {os_family: rhel}
        add_packages: [epel-release]
";
        let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        assert_eq!(config.roles.len(), 1);
        assert_eq!(config.roles[0].overrides.len(), 1);
    }

    #[test]
    fn test_parse_error_carries_location() {
        let err = ConfigParser::new()
            .parse_yaml("cluster: [", Some(Path::new("cluster.yaml")))
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::ClusterError::Config(ConfigError::ParseError { location: Some(ref l), .. }) if l == "cluster.yaml"
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigParser::new().load_file(dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(
            err,
            crate::error::ClusterError::Config(ConfigError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_find_config_file_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cluster.yml"), "cluster: {}\n").unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, dir.path().join("cluster.yml"));
    }

    #[test]
    fn test_var_overrides() {
        let vars = var_overrides([
            (String::from("CLUSTER_ROLES_VAR_NIS_DOMAIN"), String::from("lab")),
            (String::from("CLUSTER_ROLES_VAR_"), String::from("ignored")),
            (String::from("HOME"), String::from("/root")),
        ]);
        assert_eq!(vars.len(), 1);
        assert_eq!(vars["nis_domain"], "lab");
    }
}
