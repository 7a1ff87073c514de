//! Configuration module for the cluster role resolver.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `cluster.yaml`
//! - Environment overrides and `.env` loading
//! - Validation against the role catalog

mod parser;
mod spec;
mod validator;

pub use parser::{
    ConfigParser, DEFAULT_CONFIG_FILES, VAR_ENV_PREFIX, find_config_file, user_config_file,
    var_overrides,
};
pub use spec::{
    CephTunables, ClusterConfig, ClusterProfile, DeclaredFacts, LoginProfile, SetupProfile,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
