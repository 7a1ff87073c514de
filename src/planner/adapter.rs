//! Execution backend boundary.
//!
//! The crate never installs packages or touches services itself; every
//! action goes through an [`ExecutorAdapter`]. The dry-run adapter shipped
//! here records what would be done.

use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

use super::plan::Action;

/// Result of one adapter call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The action completed.
    Success {
        /// Whether the node was modified. Only changed template
        /// deployments queue their handlers.
        changed: bool,
    },
    /// The action failed.
    Failure {
        /// Reason reported by the backend.
        reason: String,
    },
}

/// Backend executing actions on nodes.
#[async_trait]
pub trait ExecutorAdapter: Send + Sync {
    /// Executes one action on a node.
    async fn execute(&self, node: &str, action: &Action) -> ActionOutcome;

    /// Gets the backend name.
    fn backend_name(&self) -> &'static str;
}

/// A failure injected into the dry-run executor.
#[derive(Debug, Clone)]
struct InjectedFailure {
    /// Node the failure applies to, or every node.
    node: Option<String>,
    /// Substring of the action description.
    pattern: String,
}

/// Adapter that changes nothing and records every call.
#[derive(Debug, Default)]
pub struct DryRunExecutor {
    /// Actions to fail.
    failures: Vec<InjectedFailure>,
    /// Actions to report as unchanged.
    unchanged: Vec<String>,
    /// Simulated latency per action.
    delay: Option<Duration>,
    /// Recorded calls.
    calls: Mutex<Vec<(String, Action)>>,
}

impl DryRunExecutor {
    /// Creates a dry-run executor reporting every action as changed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every action whose description contains `pattern`.
    #[must_use]
    pub fn with_failure(mut self, pattern: impl Into<String>) -> Self {
        self.failures.push(InjectedFailure {
            node: None,
            pattern: pattern.into(),
        });
        self
    }

    /// Fails matching actions on one node only.
    #[must_use]
    pub fn with_node_failure(mut self, node: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.failures.push(InjectedFailure {
            node: Some(node.into()),
            pattern: pattern.into(),
        });
        self
    }

    /// Reports matching actions as unchanged.
    #[must_use]
    pub fn with_unchanged(mut self, pattern: impl Into<String>) -> Self {
        self.unchanged.push(pattern.into());
        self
    }

    /// Sleeps before answering each call.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the recorded calls in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, Action)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the descriptions of the calls made on one node.
    #[must_use]
    pub fn calls_for(&self, node: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(n, _)| n == node)
            .map(|(_, action)| action.to_string())
            .collect()
    }
}

#[async_trait]
impl ExecutorAdapter for DryRunExecutor {
    async fn execute(&self, node: &str, action: &Action) -> ActionOutcome {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((node.to_string(), action.clone()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let description = action.to_string();

        let failed = self.failures.iter().any(|f| {
            f.node.as_deref().is_none_or(|n| n == node) && description.contains(&f.pattern)
        });
        if failed {
            info!("[dry-run] {node}: {description} (injected failure)");
            return ActionOutcome::Failure {
                reason: String::from("injected failure"),
            };
        }

        let changed = !self.unchanged.iter().any(|p| description.contains(p));
        debug!("[dry-run] {node}: {description} (changed: {changed})");
        ActionOutcome::Success { changed }
    }

    fn backend_name(&self) -> &'static str {
        "dry-run"
    }
}

impl ActionOutcome {
    /// Returns true for a successful outcome.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}
