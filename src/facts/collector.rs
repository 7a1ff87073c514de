//! Fact collection.
//!
//! The collector combines what the inventory knows about a node (roles,
//! variables, statically declared OS facts) with what a probe reads from
//! the node itself.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cluster::Inventory;
use crate::error::{ClusterError, FactError, Result};

use super::probe::FactProbe;
use super::types::{NodeFacts, OsRelease};

/// Gathers the facts of a node.
#[async_trait]
pub trait FactCollector: Send + Sync {
    /// Collects a facts snapshot for a node.
    ///
    /// Fails with [`FactError::Unavailable`] when OS detection cannot be
    /// performed.
    async fn collect(&self, node: &str) -> Result<NodeFacts>;
}

/// Collector backed by the cluster inventory and an OS probe.
#[derive(Debug)]
pub struct InventoryFactCollector<P> {
    /// Nodes of the cluster.
    inventory: Arc<Inventory>,
    /// Probe used for nodes without declared facts.
    probe: P,
}

impl<P: FactProbe> InventoryFactCollector<P> {
    /// Creates a collector.
    #[must_use]
    pub const fn new(inventory: Arc<Inventory>, probe: P) -> Self {
        Self { inventory, probe }
    }
}

#[async_trait]
impl<P: FactProbe> FactCollector for InventoryFactCollector<P> {
    async fn collect(&self, node: &str) -> Result<NodeFacts> {
        let spec = self
            .inventory
            .node(node)
            .ok_or_else(|| FactError::unavailable(node, "node is not in the inventory"))?;

        if let Some(declared) = &spec.declared {
            debug!("Using declared facts for {node}");
            return Ok(spec.facts(declared.os_family, &declared.os_version));
        }

        let content = self.probe.read_os_release(spec).await.map_err(|e| match e {
            ClusterError::Fact(e) => e,
            other => FactError::unavailable(node, other.to_string()),
        })?;

        let release = OsRelease::parse(&content).map_err(|e| FactError::unavailable(node, e))?;
        let version = release
            .os_version()
            .ok_or_else(|| FactError::unavailable(node, "os-release has no version"))?;
        let family = release.family();

        info!("Node {node}: {family} {version}");
        Ok(spec.facts(family, version))
    }
}
