//! Cluster module: expansion of cluster profiles into concrete nodes.

mod inventory;

pub use inventory::{Inventory, NodeSpec, node_name};
