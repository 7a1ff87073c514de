//! Planning module for node configuration.
//!
//! This module turns resolved plans into phased action sequences and drives
//! them through an execution backend:
//! - Phase ordering and plan-time validation
//! - The executor adapter boundary and the dry-run backend
//! - The per-node runner with fail-fast and handler flush semantics

mod adapter;
mod fingerprint;
mod plan;
mod runner;

pub use adapter::{ActionOutcome, DryRunExecutor, ExecutorAdapter};
pub use fingerprint::PlanHasher;
pub use plan::{Action, ActionPlanner, ActionSequence, Phase, PlannedAction};
pub use runner::{NodeRun, PlanRunner, RunState, StepRecord, StepStatus};
