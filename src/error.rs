//! Error types for the cluster role resolver.
//!
//! This module provides the error hierarchy for every stage of a run:
//! configuration, fact collection, role resolution, planning and execution.
//! Configuration-class errors (`UnknownRole`, planning errors) abort a whole
//! run; fact and execution errors are scoped to a single node.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The main error type for the cluster role resolver.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Fact collection errors.
    #[error("Fact error: {0}")]
    Fact(#[from] FactError),

    /// Role resolution errors.
    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Execution errors.
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// A named profile or cluster does not exist.
    #[error("Unknown {kind} '{name}'")]
    UnknownProfile {
        /// Kind of profile (login, setup, cluster).
        kind: &'static str,
        /// The missing name.
        name: String,
    },
}

/// Fact collection errors.
#[derive(Debug, Error)]
pub enum FactError {
    /// OS detection could not be performed for the node.
    #[error("Facts unavailable for node '{node}': {reason}")]
    Unavailable {
        /// Node the facts were requested for.
        node: String,
        /// Why detection failed.
        reason: String,
    },
}

/// Role resolution errors.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// A requested role has no definition in the catalog.
    #[error("Unknown role '{role}' requested by node '{node}'")]
    UnknownRole {
        /// The undefined role name.
        role: String,
        /// Node (or group) that requested it.
        node: String,
    },
}

/// Planning errors raised for malformed role definitions.
#[derive(Debug, Error)]
pub enum PlanError {
    /// A post-install command needs a working directory but has none.
    #[error("Post-install command '{command}' requires a working directory")]
    MissingWorkingDirectory {
        /// The command line.
        command: String,
    },

    /// A working directory is not an absolute path.
    #[error("Working directory '{chdir}' of command '{command}' must be absolute")]
    RelativeWorkingDirectory {
        /// The command line.
        command: String,
        /// The offending directory.
        chdir: String,
    },

    /// A template notifies a handler nobody defines.
    #[error("Template '{dest}' notifies undefined handler '{handler}'")]
    UndefinedHandler {
        /// Destination of the template.
        dest: String,
        /// The unknown handler name.
        handler: String,
    },

    /// A template mode is not an octal permission.
    #[error("Template '{dest}' has invalid mode '{mode}'")]
    InvalidMode {
        /// Destination of the template.
        dest: String,
        /// The offending mode string.
        mode: String,
    },

    /// Any other malformed definition.
    #[error("Invalid definition for role '{role}': {message}")]
    InvalidDefinition {
        /// Role being planned.
        role: String,
        /// Description of the problem.
        message: String,
    },
}

/// Execution errors, scoped to a single node.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// An adapter call reported a failure.
    #[error("Action '{action}' failed on node '{node}': {reason}")]
    ActionFailed {
        /// Node the action ran on.
        node: String,
        /// Action description.
        action: String,
        /// Failure reason reported by the adapter.
        reason: String,
    },

    /// An adapter call exceeded its deadline.
    #[error("Action '{action}' on node '{node}' timed out after {timeout:?}")]
    Timeout {
        /// Node the action ran on.
        node: String,
        /// Action description.
        action: String,
        /// The deadline that was exceeded.
        timeout: Duration,
    },
}

/// Result type alias for cluster role operations.
pub type Result<T> = std::result::Result<T, ClusterError>;

impl ClusterError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true for errors that must abort the whole run before any
    /// node is touched.
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Resolve(_) | Self::Plan(_))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl FactError {
    /// Creates an unavailable-facts error.
    #[must_use]
    pub fn unavailable(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            node: node.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors_abort_run() {
        let err = ClusterError::from(ResolveError::UnknownRole {
            role: String::from("ceph_rgw"),
            node: String::from("c1-frontend001"),
        });
        assert!(err.is_configuration_error());

        let err = ClusterError::from(PlanError::MissingWorkingDirectory {
            command: String::from("./ypinit -m"),
        });
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_fact_errors_do_not_abort_run() {
        let err = ClusterError::from(FactError::unavailable("c1-compute001", "connection refused"));
        assert!(!err.is_configuration_error());
        assert_eq!(
            err.to_string(),
            "Fact error: Facts unavailable for node 'c1-compute001': connection refused"
        );
    }

    #[test]
    fn test_sub_second_timeout_message() {
        let err = ExecutionError::Timeout {
            node: String::from("c1-compute001"),
            action: String::from("install package nis"),
            timeout: Duration::from_millis(250),
        };
        assert_eq!(
            err.to_string(),
            "Action 'install package nis' on node 'c1-compute001' timed out after 250ms"
        );
    }
}
