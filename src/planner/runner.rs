//! Per-node plan runner.
//!
//! Drives one node's action sequence through the adapter. The runner is a
//! forward-only state machine over the execution phases: the first failure
//! moves it to `Failed` and nothing after that runs. Handlers queued by
//! changed templates are fired once each at the flush barrier.

use indexmap::IndexSet;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::ExecutionError;
use crate::facts::NodeFacts;

use super::adapter::{ActionOutcome, ExecutorAdapter};
use super::plan::{Action, ActionSequence, Phase};

/// Runner state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Installing packages.
    Packages,
    /// Deploying templates.
    Templates,
    /// Firing queued handlers.
    HandlerFlush,
    /// Managing services.
    Services,
    /// Running post-install commands.
    PostCommands,
    /// Every action succeeded.
    Done,
    /// An action of the given phase failed.
    Failed(Phase),
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    /// The action succeeded.
    Ok {
        /// Whether the node changed.
        changed: bool,
    },
    /// The action's gate was false.
    Skipped {
        /// Why it was skipped.
        reason: String,
    },
    /// The action failed.
    Failed {
        /// Failure reason.
        reason: String,
    },
}

/// Record of one executed (or skipped) action.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    /// Phase of the action.
    pub phase: Phase,
    /// Action description.
    pub action: String,
    /// What happened.
    #[serde(flatten)]
    pub status: StepStatus,
}

/// Result of running one node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeRun {
    /// Node name.
    pub node: String,
    /// Final state, either `Done` or `Failed`.
    pub state: RunState,
    /// Steps in execution order.
    pub steps: Vec<StepRecord>,
    /// Handlers fired at the barrier, in queue order.
    pub fired_handlers: Vec<String>,
    /// Failure reason when `state` is `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Runs action sequences through an adapter.
#[derive(Clone)]
pub struct PlanRunner {
    /// Execution backend.
    adapter: Arc<dyn ExecutorAdapter>,
    /// Deadline per adapter call.
    action_timeout: Option<Duration>,
}

impl PlanRunner {
    /// Creates a runner without a per-action deadline.
    #[must_use]
    pub fn new(adapter: Arc<dyn ExecutorAdapter>) -> Self {
        Self {
            adapter,
            action_timeout: None,
        }
    }

    /// Sets the deadline of each adapter call.
    #[must_use]
    pub const fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = Some(timeout);
        self
    }

    /// Runs a node's sequence to completion or first failure.
    ///
    /// `facts` is the snapshot post-install command gates are evaluated
    /// against.
    pub async fn run(&self, sequence: &ActionSequence, facts: &NodeFacts) -> NodeRun {
        let node = sequence.node.as_str();
        let mut run = NodeRun {
            node: node.to_string(),
            state: RunState::Packages,
            steps: Vec::new(),
            fired_handlers: Vec::new(),
            failure: None,
        };
        let mut pending: IndexSet<String> = IndexSet::new();

        info!(
            "Running {} actions on {} via {}",
            sequence.len(),
            node,
            self.adapter.backend_name()
        );

        for planned in &sequence.actions {
            run.state.enter(planned.phase);

            let result = match &planned.action {
                Action::FlushHandlers { handlers } => {
                    let mut result = Ok(());
                    for name in pending.drain(..) {
                        let Some(handler) = handlers.get(&name) else {
                            result = Err(format!("handler {name} is not defined"));
                            break;
                        };
                        let action = Action::RunHandler {
                            name: name.clone(),
                            action: handler.clone(),
                        };
                        result = self.step(&mut run, planned.phase, &action).await.map(|_| ());
                        if result.is_err() {
                            break;
                        }
                        run.fired_handlers.push(name);
                    }
                    result
                }
                Action::RunCommand { when: Some(when), .. } if !when.evaluate(facts) => {
                    debug!("{node}: skipping {} (gate is false)", planned.action);
                    run.steps.push(StepRecord {
                        phase: planned.phase,
                        action: planned.action.to_string(),
                        status: StepStatus::Skipped {
                            reason: String::from("condition not met"),
                        },
                    });
                    Ok(())
                }
                Action::DeployTemplate { notify, .. } => {
                    self.step(&mut run, planned.phase, &planned.action)
                        .await
                        .map(|changed| {
                            if changed {
                                pending.extend(notify.iter().cloned());
                            }
                        })
                }
                action => self.step(&mut run, planned.phase, action).await.map(|_| ()),
            };

            if let Err(reason) = result {
                warn!("{node}: {} phase failed: {reason}", planned.phase);
                run.state = RunState::Failed(planned.phase);
                run.failure = Some(reason);
                return run;
            }
        }

        run.state = RunState::Done;
        info!("{node}: done ({} steps)", run.steps.len());
        run
    }

    /// Executes one action and records it. Returns whether the node changed.
    async fn step(
        &self,
        run: &mut NodeRun,
        phase: Phase,
        action: &Action,
    ) -> std::result::Result<bool, String> {
        let outcome = match self.action_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.adapter.execute(&run.node, action))
                .await
                .map_err(|_| ExecutionError::Timeout {
                    node: run.node.clone(),
                    action: action.to_string(),
                    timeout,
                }),
            None => Ok(self.adapter.execute(&run.node, action).await),
        };

        let (status, result) = match outcome {
            Ok(ActionOutcome::Success { changed }) => (StepStatus::Ok { changed }, Ok(changed)),
            Ok(ActionOutcome::Failure { reason }) => {
                let error = ExecutionError::ActionFailed {
                    node: run.node.clone(),
                    action: action.to_string(),
                    reason: reason.clone(),
                };
                (StepStatus::Failed { reason }, Err(error.to_string()))
            }
            Err(error) => (
                StepStatus::Failed {
                    reason: String::from("timed out"),
                },
                Err(error.to_string()),
            ),
        };

        run.steps.push(StepRecord {
            phase,
            action: action.to_string(),
            status,
        });
        result
    }
}

impl std::fmt::Debug for PlanRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanRunner")
            .field("adapter", &self.adapter.backend_name())
            .field("action_timeout", &self.action_timeout)
            .finish()
    }
}

impl RunState {
    /// Moves to the state of a phase. Never moves backwards.
    fn enter(&mut self, phase: Phase) {
        let next = Self::from(phase);
        match (self.phase(), next.phase()) {
            (Some(current), Some(target)) if target < current => {
                warn!("Ignoring backwards transition from {current} to {target}");
            }
            (Some(_), _) => *self = next,
            (None, _) => {}
        }
    }

    /// Returns the phase of an active state.
    #[must_use]
    pub const fn phase(&self) -> Option<Phase> {
        match self {
            Self::Packages => Some(Phase::Packages),
            Self::Templates => Some(Phase::Templates),
            Self::HandlerFlush => Some(Phase::HandlerFlush),
            Self::Services => Some(Phase::Services),
            Self::PostCommands => Some(Phase::PostCommands),
            Self::Done | Self::Failed(_) => None,
        }
    }

    /// Returns true for `Done` and `Failed`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }
}

impl From<Phase> for RunState {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Packages => Self::Packages,
            Phase::Templates => Self::Templates,
            Phase::HandlerFlush => Self::HandlerFlush,
            Phase::Services => Self::Services,
            Phase::PostCommands => Self::PostCommands,
        }
    }
}

impl NodeRun {
    /// Returns true if the node finished every action.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.state == RunState::Done
    }

    /// Returns the number of steps that changed the node.
    #[must_use]
    pub fn changed_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Ok { changed: true })
            .count()
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Done => write!(f, "done"),
            Self::Failed(phase) => write!(f, "failed in {phase}"),
            active => match active.phase() {
                Some(phase) => write!(f, "{phase}"),
                None => Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::OsFamily;
    use crate::planner::{ActionPlanner, DryRunExecutor};
    use crate::roles::{PostCommandSpec, Predicate, RoleCatalog, RoleResolver};

    fn sequence(roles: &[&str], facts: &NodeFacts) -> ActionSequence {
        let catalog = RoleCatalog::builtin().unwrap();
        let resolved = RoleResolver::new(&catalog).resolve(facts, roles).unwrap();
        ActionPlanner::new().plan(&resolved).unwrap()
    }

    fn rhel() -> NodeFacts {
        NodeFacts::new("n1", OsFamily::Rhel, "7")
    }

    #[tokio::test]
    async fn test_handler_fires_once_after_templates() {
        let facts = NodeFacts::new("n1", OsFamily::Debian, "stretch");
        let seq = sequence(&["ceph_mon", "ceph_osd", "ceph_mds"], &facts);
        let executor = Arc::new(DryRunExecutor::new());
        let runner = PlanRunner::new(executor.clone());

        let run = runner.run(&seq, &facts).await;
        assert!(run.succeeded());
        assert_eq!(
            run.fired_handlers,
            vec!["restart-ceph-mon", "restart-ceph-osd", "restart-ceph-mds"]
        );

        let calls = executor.calls_for("n1");
        let last_template = calls.iter().rposition(|c| c.starts_with("deploy")).unwrap();
        let first_handler = calls.iter().position(|c| c.starts_with("handler")).unwrap();
        let first_service = calls.iter().position(|c| c.starts_with("service")).unwrap();
        assert!(last_template < first_handler);
        assert!(first_handler < first_service);
        assert_eq!(calls.iter().filter(|c| c.starts_with("handler")).count(), 3);
    }

    #[tokio::test]
    async fn test_shared_handler_fires_once() {
        let facts = NodeFacts::new("n1", OsFamily::Debian, "stretch");
        let seq = sequence(&["nis_master"], &facts);
        let executor = Arc::new(DryRunExecutor::new());

        let run = PlanRunner::new(executor.clone()).run(&seq, &facts).await;
        assert!(run.succeeded());
        // Three templates notify restart-nis.
        assert_eq!(run.fired_handlers, vec!["restart-nis"]);
    }

    #[tokio::test]
    async fn test_unchanged_template_queues_nothing() {
        let facts = NodeFacts::new("n1", OsFamily::Debian, "stretch");
        let seq = sequence(&["nfs_server"], &facts);
        let executor = Arc::new(DryRunExecutor::new().with_unchanged("/etc/exports"));

        let run = PlanRunner::new(executor).run(&seq, &facts).await;
        assert!(run.succeeded());
        assert!(run.fired_handlers.is_empty());
    }

    #[tokio::test]
    async fn test_fail_fast_at_templates() {
        let facts = rhel();
        let seq = sequence(&["nis_master"], &facts);
        let executor = Arc::new(DryRunExecutor::new().with_failure("/etc/sysconfig/yppasswdd"));

        let run = PlanRunner::new(executor.clone()).run(&seq, &facts).await;
        assert_eq!(run.state, RunState::Failed(Phase::Templates));
        assert!(run.failure.as_deref().unwrap().contains("injected failure"));
        assert!(run.fired_handlers.is_empty());

        let calls = executor.calls_for("n1");
        assert!(calls.iter().any(|c| c.starts_with("install package")));
        assert!(!calls.iter().any(|c| c.starts_with("service") || c.starts_with("handler")));
        assert!(!calls.iter().any(|c| c.starts_with("run")));
    }

    #[tokio::test]
    async fn test_timeout_fails_node() {
        let facts = rhel();
        let seq = sequence(&["nfs_client"], &facts);
        let executor = Arc::new(DryRunExecutor::new().with_delay(Duration::from_millis(200)));
        let runner = PlanRunner::new(executor).with_action_timeout(Duration::from_millis(10));

        let run = runner.run(&seq, &facts).await;
        assert_eq!(run.state, RunState::Failed(Phase::Packages));
        assert!(run.failure.as_deref().unwrap().ends_with("timed out after 10ms"));
        assert_eq!(run.steps.len(), 1);
    }

    #[tokio::test]
    async fn test_post_command_gate_evaluated_at_run_time() {
        let mut resolved = crate::roles::ResolvedPlan::empty("n1");
        resolved.post_commands.push(PostCommandSpec {
            command: String::from("ceph-create-keys --id mon"),
            chdir: None,
            requires_chdir: false,
            when: Some(Predicate::Var {
                name: String::from("ceph_bootstrap"),
                equals: String::from("yes"),
            }),
        });
        let seq = ActionPlanner::new().plan(&resolved).unwrap();
        let executor = Arc::new(DryRunExecutor::new());
        let runner = PlanRunner::new(executor.clone());

        let run = runner.run(&seq, &rhel()).await;
        assert!(run.succeeded());
        assert!(matches!(run.steps[0].status, StepStatus::Skipped { .. }));
        assert!(executor.calls().is_empty());

        let bootstrap = rhel().with_vars(
            [(String::from("ceph_bootstrap"), String::from("yes"))]
                .into_iter()
                .collect(),
        );
        let run = runner.run(&seq, &bootstrap).await;
        assert_eq!(run.changed_count(), 1);
        assert_eq!(executor.calls().len(), 1);
    }

    #[test]
    fn test_state_never_moves_backwards() {
        let mut state = RunState::Packages;
        state.enter(Phase::Services);
        assert_eq!(state, RunState::Services);
        state.enter(Phase::Templates);
        assert_eq!(state, RunState::Services);

        let mut state = RunState::Failed(Phase::Packages);
        state.enter(Phase::Services);
        assert!(state.is_terminal());
    }
}
