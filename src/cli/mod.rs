//! CLI module for the cluster role tool.
//!
//! This module provides the command-line interface for validating cluster
//! configurations and inspecting node plans.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
