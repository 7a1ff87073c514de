//! Orchestrator for configuring a whole cluster.
//!
//! This module runs the full pipeline for every node of a cluster:
//! pre-flight checks, fact collection, role resolution, planning and
//! execution. Nodes are handled concurrently; each node's actions run
//! strictly in sequence. Configuration errors abort the run before any node
//! is touched, while fact and execution failures only fail their own node.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cluster::Inventory;
use crate::error::{ClusterError, ConfigError, FactError, PlanError, ResolveError, Result};
use crate::facts::{FactCollector, NodeFacts};
use crate::planner::{
    ActionPlanner, ActionSequence, ExecutorAdapter, NodeRun, Phase, PlanRunner, RunState,
};
use crate::roles::{ResolvedPlan, RoleCatalog, RoleResolver};

/// Options of a run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Maximum number of nodes worked on at once.
    pub max_parallel: usize,
    /// Deadline per adapter call.
    pub action_timeout: Option<Duration>,
    /// Restrict the run to one node.
    pub only_node: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_parallel: 8,
            action_timeout: Some(Duration::from_secs(300)),
            only_node: None,
        }
    }
}

/// Everything planned for one node.
#[derive(Debug, Clone, Serialize)]
pub struct NodePlan {
    /// Facts snapshot.
    pub facts: NodeFacts,
    /// Merged role plan.
    pub resolved: ResolvedPlan,
    /// Ordered actions.
    pub sequence: ActionSequence,
}

/// A node after the planning stage.
#[derive(Debug, Clone)]
pub enum PreparedNode {
    /// Facts were collected and the node is planned.
    Ready(Box<NodePlan>),
    /// Facts could not be collected.
    FactsUnavailable {
        /// Node name.
        node: String,
        /// Why collection failed.
        reason: String,
    },
}

/// Where a node failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePoint {
    /// Fact collection.
    Facts,
    /// An execution phase.
    Phase(Phase),
}

/// Final outcome of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NodeOutcome {
    /// Every action succeeded.
    Succeeded,
    /// The node failed.
    Failed {
        /// Stage that failed.
        at: FailurePoint,
        /// Failure reason.
        reason: String,
    },
    /// Nothing applied to the node.
    Skipped {
        /// Why nothing ran.
        reason: String,
    },
}

/// Report of one node.
#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    /// Node name.
    pub node: String,
    /// Outcome.
    #[serde(flatten)]
    pub outcome: NodeOutcome,
    /// Plan fingerprint, when the node was planned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    /// Execution details, when the node ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<NodeRun>,
}

/// Report of a whole run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Run identifier.
    pub run_id: Uuid,
    /// Cluster name.
    pub cluster: String,
    /// Execution backend.
    pub backend: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// One report per node, in inventory order.
    pub nodes: Vec<NodeReport>,
}

/// Configures every node of a cluster.
pub struct Orchestrator {
    /// Role definitions.
    catalog: Arc<RoleCatalog>,
    /// Cluster nodes.
    inventory: Arc<Inventory>,
    /// Fact source.
    collector: Arc<dyn FactCollector>,
    /// Execution backend.
    adapter: Arc<dyn ExecutorAdapter>,
    /// Action planner.
    planner: ActionPlanner,
    /// Run options.
    options: RunOptions,
}

impl Orchestrator {
    /// Creates a new orchestrator.
    #[must_use]
    pub fn new(
        catalog: Arc<RoleCatalog>,
        inventory: Arc<Inventory>,
        collector: Arc<dyn FactCollector>,
        adapter: Arc<dyn ExecutorAdapter>,
    ) -> Self {
        Self {
            catalog,
            inventory,
            collector,
            adapter,
            planner: ActionPlanner::new(),
            options: RunOptions::default(),
        }
    }

    /// Sets the run options.
    #[must_use]
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Checks every requested role before any node is contacted.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::UnknownRole`] for a role with no definition,
    /// [`PlanError::UndefinedHandler`] for a notify no requested role can
    /// satisfy, or a planning error for a definition that can never be
    /// planned.
    pub fn preflight(&self) -> Result<()> {
        let mut definitions = Vec::new();
        for role in self.inventory.requested_roles() {
            let Some(definition) = self.catalog.get(role) else {
                let node = self
                    .inventory
                    .nodes
                    .iter()
                    .find(|n| n.roles.contains(role))
                    .map_or_else(String::new, |n| n.name.clone());
                return Err(ResolveError::UnknownRole {
                    role: role.to_string(),
                    node,
                }
                .into());
            };
            ActionPlanner::check_definition(definition)?;
            definitions.push(definition);
        }

        let handlers: HashSet<&str> = definitions
            .iter()
            .flat_map(|d| d.all_handlers())
            .map(|h| h.name.as_str())
            .collect();
        for template in definitions.iter().flat_map(|d| d.all_templates()) {
            if let Some(handler) = template.notify.iter().find(|n| !handlers.contains(n.as_str())) {
                return Err(PlanError::UndefinedHandler {
                    dest: template.dest.clone(),
                    handler: handler.clone(),
                }
                .into());
            }
        }

        debug!("Pre-flight passed for cluster {}", self.inventory.cluster);
        Ok(())
    }

    /// Number of nodes worked on at once, within what a semaphore can hold.
    fn permits(&self) -> usize {
        self.options.max_parallel.clamp(1, Semaphore::MAX_PERMITS)
    }

    /// Returns the names of the nodes this run covers.
    fn selected_nodes(&self) -> Result<Vec<String>> {
        match &self.options.only_node {
            Some(node) if self.inventory.node(node).is_none() => Err(ConfigError::validation(
                format!("Node '{node}' is not part of cluster {}", self.inventory.cluster),
                "node",
            )
            .into()),
            Some(node) => Ok(vec![node.clone()]),
            None => Ok(self.inventory.names().into_iter().map(String::from).collect()),
        }
    }

    /// Collects facts for every selected node concurrently.
    ///
    /// Results are in inventory order.
    ///
    /// # Errors
    ///
    /// Returns an error if `only_node` names an unknown node. Per-node
    /// collection failures are returned in the list.
    pub async fn collect_facts(&self) -> Result<Vec<(String, Result<NodeFacts>)>> {
        let nodes = self.selected_nodes()?;
        let semaphore = Arc::new(Semaphore::new(self.permits()));
        let mut tasks = JoinSet::new();

        for (index, node) in nodes.iter().enumerate() {
            let collector = Arc::clone(&self.collector);
            let semaphore = Arc::clone(&semaphore);
            let node = node.clone();
            tasks.spawn(async move {
                let facts = match semaphore.acquire_owned().await {
                    Ok(_permit) => collector.collect(&node).await,
                    Err(e) => Err(FactError::unavailable(&node, e.to_string()).into()),
                };
                (index, facts)
            });
        }

        let mut results: Vec<Option<Result<NodeFacts>>> = nodes.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, facts)) => results[index] = Some(facts),
                Err(e) => error!("Fact collection task failed: {e}"),
            }
        }

        Ok(nodes
            .into_iter()
            .zip(results)
            .map(|(node, facts)| {
                let facts = facts.unwrap_or_else(|| {
                    Err(FactError::unavailable(&node, "fact collection task aborted").into())
                });
                (node, facts)
            })
            .collect())
    }

    /// Runs pre-flight, collects facts and plans every selected node.
    ///
    /// # Errors
    ///
    /// Returns a configuration error (unknown role, unplannable definition)
    /// if any node cannot be planned. Fact failures do not abort.
    pub async fn prepare(&self) -> Result<Vec<PreparedNode>> {
        self.preflight()?;

        let resolver = RoleResolver::new(&self.catalog);
        let mut prepared = Vec::new();

        for (node, facts) in self.collect_facts().await? {
            let facts = match facts {
                Ok(facts) => facts,
                Err(ClusterError::Fact(FactError::Unavailable { reason, .. })) => {
                    warn!("Facts unavailable for {node}: {reason}");
                    prepared.push(PreparedNode::FactsUnavailable { node, reason });
                    continue;
                }
                Err(e) => return Err(e),
            };

            let resolved = resolver.resolve_declared(&facts)?;
            let sequence = self.planner.plan(&resolved)?;
            prepared.push(PreparedNode::Ready(Box::new(NodePlan {
                facts,
                resolved,
                sequence,
            })));
        }

        Ok(prepared)
    }

    /// Configures the cluster.
    ///
    /// # Errors
    ///
    /// Returns an error only for configuration problems detected before
    /// execution starts. Node failures are reported in the [`RunReport`].
    pub async fn run(&self) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            "Starting run {run_id} on cluster {} ({} nodes)",
            self.inventory.cluster,
            self.inventory.len()
        );

        let prepared = self.prepare().await?;

        let mut runner = PlanRunner::new(Arc::clone(&self.adapter));
        if let Some(timeout) = self.options.action_timeout {
            runner = runner.with_action_timeout(timeout);
        }

        let semaphore = Arc::new(Semaphore::new(self.permits()));
        let mut tasks = JoinSet::new();
        let mut reports: Vec<NodeReport> = Vec::with_capacity(prepared.len());

        for (index, node) in prepared.into_iter().enumerate() {
            match node {
                PreparedNode::FactsUnavailable { node, reason } => reports.push(NodeReport {
                    node,
                    outcome: NodeOutcome::Failed {
                        at: FailurePoint::Facts,
                        reason,
                    },
                    fingerprint: None,
                    run: None,
                }),
                PreparedNode::Ready(plan) if plan.sequence.is_empty() => {
                    info!("{}: no role applies, skipping", plan.facts.node);
                    reports.push(NodeReport {
                        node: plan.facts.node,
                        outcome: NodeOutcome::Skipped {
                            reason: String::from("no applicable actions"),
                        },
                        fingerprint: Some(plan.sequence.fingerprint),
                        run: None,
                    });
                }
                PreparedNode::Ready(plan) => {
                    reports.push(NodeReport {
                        node: plan.facts.node.clone(),
                        outcome: NodeOutcome::Succeeded,
                        fingerprint: Some(plan.sequence.fingerprint.clone()),
                        run: None,
                    });
                    let runner = runner.clone();
                    let semaphore = Arc::clone(&semaphore);
                    tasks.spawn(async move {
                        let run = match semaphore.acquire_owned().await {
                            Ok(_permit) => Some(runner.run(&plan.sequence, &plan.facts).await),
                            Err(e) => {
                                error!("Cannot schedule {}: {e}", plan.facts.node);
                                None
                            }
                        };
                        (index, run)
                    });
                }
            }
        }

        let mut runs: Vec<Option<NodeRun>> = reports.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, run)) => runs[index] = run,
                Err(e) => error!("Node execution task failed: {e}"),
            }
        }

        for (report, run) in reports.iter_mut().zip(runs) {
            if report.outcome != NodeOutcome::Succeeded {
                continue;
            }
            report.outcome = match &run {
                Some(run) => match run.state {
                    RunState::Failed(phase) => NodeOutcome::Failed {
                        at: FailurePoint::Phase(phase),
                        reason: run.failure.clone().unwrap_or_default(),
                    },
                    _ => NodeOutcome::Succeeded,
                },
                None => NodeOutcome::Failed {
                    at: FailurePoint::Phase(Phase::Packages),
                    reason: String::from("execution task aborted"),
                },
            };
            report.run = run;
        }

        let report = RunReport {
            run_id,
            cluster: self.inventory.cluster.clone(),
            backend: self.adapter.backend_name().to_string(),
            started_at,
            finished_at: Utc::now(),
            nodes: reports,
        };

        info!(
            "Run {run_id} finished: {} succeeded, {} failed, {} skipped",
            report.succeeded(),
            report.failed(),
            report.skipped()
        );

        Ok(report)
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("cluster", &self.inventory.cluster)
            .field("roles", &self.catalog.len())
            .field("backend", &self.adapter.backend_name())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl RunReport {
    /// Returns the number of succeeded nodes.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, NodeOutcome::Succeeded))
    }

    /// Returns the number of failed nodes.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, NodeOutcome::Failed { .. }))
    }

    /// Returns the number of skipped nodes.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, NodeOutcome::Skipped { .. }))
    }

    /// Returns true if no node failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Returns a node's report.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.node == name)
    }

    /// Returns the run duration.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    fn count(&self, pred: impl Fn(&NodeOutcome) -> bool) -> usize {
        self.nodes.iter().filter(|n| pred(&n.outcome)).count()
    }
}

impl PreparedNode {
    /// Returns the node name.
    #[must_use]
    pub fn node(&self) -> &str {
        match self {
            Self::Ready(plan) => &plan.facts.node,
            Self::FactsUnavailable { node, .. } => node,
        }
    }
}

impl std::fmt::Display for FailurePoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Facts => write!(f, "facts"),
            Self::Phase(phase) => write!(f, "{phase}"),
        }
    }
}

impl std::fmt::Display for NodeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed { at, reason } => write!(f, "failed ({at}): {reason}"),
            Self::Skipped { reason } => write!(f, "skipped: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;
    use crate::facts::{InventoryFactCollector, LocalProbe, MockFactProbe};
    use crate::planner::DryRunExecutor;
    use std::collections::BTreeMap;

    const CONFIG: &str = r"
login:
  admin:
    image_user: admin
setup:
  nis-nfs:
    groups:
      frontend: [nis_master, nfs_server]
      compute: [nis_client, nfs_client]
      spare: []
cluster:
  lab:
    login: admin
    setup: nis-nfs
    ssh_to: frontend
    nodes: {frontend: 1, compute: 3, spare: 1}
inventory:
  lab-frontend001: {os_family: rhel, os_version: '7'}
  lab-compute001: {os_family: debian, os_version: jessie}
  lab-compute002: {os_family: debian, os_version: stretch}
  lab-spare001: {os_family: debian, os_version: stretch}
";

    struct Fixture {
        catalog: Arc<RoleCatalog>,
        inventory: Arc<Inventory>,
        probe_dir: tempfile::TempDir,
    }

    fn fixture(yaml: &str) -> Fixture {
        let config = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        let inventory = Inventory::from_config(&config, "lab", &BTreeMap::new()).unwrap();
        let catalog = RoleCatalog::builtin().unwrap().with_overrides(config.roles);
        Fixture {
            catalog: Arc::new(catalog),
            inventory: Arc::new(inventory),
            // lab-compute003 has no declared facts and no os-release file.
            probe_dir: tempfile::tempdir().unwrap(),
        }
    }

    fn orchestrator(fixture: &Fixture, adapter: Arc<DryRunExecutor>) -> Orchestrator {
        let collector = InventoryFactCollector::new(
            Arc::clone(&fixture.inventory),
            LocalProbe::new(fixture.probe_dir.path()),
        );
        Orchestrator::new(
            Arc::clone(&fixture.catalog),
            Arc::clone(&fixture.inventory),
            Arc::new(collector),
            adapter,
        )
    }

    #[tokio::test]
    async fn test_run_reports_one_outcome_per_node() {
        let fixture = fixture(CONFIG);
        let adapter = Arc::new(DryRunExecutor::new());
        let report = orchestrator(&fixture, adapter).run().await.unwrap();

        assert_eq!(report.nodes.len(), 5);
        assert_eq!(report.cluster, "lab");
        assert_eq!(report.backend, "dry-run");
        assert_eq!(report.succeeded(), 3);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failed(), 1);

        let missing = report.node("lab-compute003").unwrap();
        assert!(matches!(
            missing.outcome,
            NodeOutcome::Failed {
                at: FailurePoint::Facts,
                ..
            }
        ));
        assert!(matches!(
            report.node("lab-spare001").unwrap().outcome,
            NodeOutcome::Skipped { .. }
        ));
        assert!(report.finished_at >= report.started_at);
    }

    #[tokio::test]
    async fn test_node_failures_are_isolated() {
        let fixture = fixture(CONFIG);
        let adapter =
            Arc::new(DryRunExecutor::new().with_node_failure("lab-compute001", "package nis"));
        let report = orchestrator(&fixture, adapter.clone()).run().await.unwrap();

        let failed = report.node("lab-compute001").unwrap();
        assert_eq!(
            failed.outcome,
            NodeOutcome::Failed {
                at: FailurePoint::Phase(Phase::Packages),
                reason: failed.run.as_ref().unwrap().failure.clone().unwrap(),
            }
        );
        assert!(!adapter
            .calls_for("lab-compute001")
            .iter()
            .any(|c| c.starts_with("deploy")));

        assert_eq!(
            report.node("lab-compute002").unwrap().outcome,
            NodeOutcome::Succeeded
        );
        assert_eq!(
            report.node("lab-frontend001").unwrap().outcome,
            NodeOutcome::Succeeded
        );
    }

    #[tokio::test]
    async fn test_unknown_role_aborts_before_any_node() {
        let fixture = fixture(&CONFIG.replace("nfs_client]", "nfs_client, ceph_rgw]"));
        let adapter = Arc::new(DryRunExecutor::new());
        let err = orchestrator(&fixture, adapter.clone()).run().await.unwrap_err();

        assert!(matches!(
            err,
            ClusterError::Resolve(ResolveError::UnknownRole { ref role, ref node })
                if role == "ceph_rgw" && node == "lab-compute001"
        ));
        assert!(adapter.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unplannable_user_role_aborts() {
        let yaml = format!(
            "{CONFIG}roles:\n  - name: nfs_client\n    post_commands:\n      - command: ./mount-all\n"
        );
        let fixture = fixture(&yaml);
        let adapter = Arc::new(DryRunExecutor::new());
        let err = orchestrator(&fixture, adapter.clone()).run().await.unwrap_err();

        assert!(err.is_configuration_error());
        assert!(adapter.calls().is_empty());
    }

    #[tokio::test]
    async fn test_undefined_handler_aborts_before_fact_collection() {
        let yaml = format!(
            "{CONFIG}roles:
  - name: nfs_server
    packages: [nfs-kernel-server]
    templates:
      - source: nfs/exports.j2
        dest: /etc/exports
        notify: [reload-exports]
"
        );
        let fixture = fixture(&yaml);
        let mut probe = MockFactProbe::new();
        probe.expect_read_os_release().never();
        let adapter = Arc::new(DryRunExecutor::new());
        let orchestrator = Orchestrator::new(
            Arc::clone(&fixture.catalog),
            Arc::clone(&fixture.inventory),
            Arc::new(InventoryFactCollector::new(Arc::clone(&fixture.inventory), probe)),
            adapter.clone(),
        );

        let err = orchestrator.run().await.unwrap_err();
        assert!(matches!(
            err,
            ClusterError::Plan(PlanError::UndefinedHandler { ref dest, ref handler })
                if dest == "/etc/exports" && handler == "reload-exports"
        ));
        assert!(adapter.calls().is_empty());
    }

    #[test]
    fn test_handler_from_another_role_passes_preflight() {
        let yaml = format!(
            "{CONFIG}roles:
  - name: nfs_server
    packages: [nfs-kernel-server]
    templates:
      - source: nfs/exports.j2
        dest: /etc/exports
        notify: [restart-nis]
"
        );
        let fixture = fixture(&yaml);
        let orchestrator = orchestrator(&fixture, Arc::new(DryRunExecutor::new()));
        assert!(orchestrator.preflight().is_ok());
    }

    #[tokio::test]
    async fn test_unbounded_parallelism_is_clamped() {
        let fixture = fixture(CONFIG);
        let options = RunOptions {
            max_parallel: usize::MAX,
            ..RunOptions::default()
        };
        let orchestrator =
            orchestrator(&fixture, Arc::new(DryRunExecutor::new())).with_options(options);
        assert_eq!(orchestrator.permits(), Semaphore::MAX_PERMITS);

        let report = orchestrator.run().await.unwrap();
        assert_eq!(report.nodes.len(), 5);
        assert_eq!(report.succeeded(), 3);

        let orchestrator = orchestrator.with_options(RunOptions {
            max_parallel: 0,
            ..RunOptions::default()
        });
        assert_eq!(orchestrator.permits(), 1);
    }

    #[tokio::test]
    async fn test_timeout_fails_only_that_node() {
        let fixture = fixture(CONFIG);
        let adapter = Arc::new(DryRunExecutor::new().with_delay(Duration::from_millis(50)));
        let options = RunOptions {
            max_parallel: 4,
            action_timeout: Some(Duration::from_millis(5)),
            only_node: Some(String::from("lab-compute002")),
        };
        let report = orchestrator(&fixture, adapter)
            .with_options(options)
            .run()
            .await
            .unwrap();

        assert_eq!(report.nodes.len(), 1);
        let node = &report.nodes[0];
        assert!(matches!(node.outcome, NodeOutcome::Failed { .. }));
        assert!(node.outcome.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_prepare_is_deterministic() {
        let fixture = fixture(CONFIG);
        let first = orchestrator(&fixture, Arc::new(DryRunExecutor::new()))
            .prepare()
            .await
            .unwrap();
        let second = orchestrator(&fixture, Arc::new(DryRunExecutor::new()))
            .prepare()
            .await
            .unwrap();

        let fingerprints = |nodes: &[PreparedNode]| -> Vec<Option<String>> {
            nodes
                .iter()
                .map(|n| match n {
                    PreparedNode::Ready(plan) => Some(plan.sequence.fingerprint.clone()),
                    PreparedNode::FactsUnavailable { .. } => None,
                })
                .collect()
        };
        assert_eq!(fingerprints(&first), fingerprints(&second));
        assert_eq!(first[0].node(), "lab-frontend001");
    }

    #[tokio::test]
    async fn test_unknown_only_node() {
        let fixture = fixture(CONFIG);
        let options = RunOptions {
            only_node: Some(String::from("lab-compute999")),
            ..RunOptions::default()
        };
        let err = orchestrator(&fixture, Arc::new(DryRunExecutor::new()))
            .with_options(options)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::Config(_)));
    }
}
