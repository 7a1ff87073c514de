//! Facts module: per-node observations taken once per run.
//!
//! This module provides:
//! - The immutable [`NodeFacts`] snapshot and os-release parsing
//! - Probes reading os-release over SSH or from local files
//! - The collector joining inventory data with probed OS facts

mod collector;
mod probe;
mod types;

pub use collector::{FactCollector, InventoryFactCollector};
pub use probe::{FactProbe, LocalProbe, SshProbe};
pub use types::{NodeFacts, OsFamily, OsRelease};

#[cfg(test)]
pub(crate) use probe::MockFactProbe;
