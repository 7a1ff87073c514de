//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Cluster roles - resolve node roles and plan their configuration.
#[derive(Parser, Debug)]
#[command(name = "cluster-roles")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "CLUSTER_ROLES_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write an example cluster configuration.
    Init {
        /// Directory to initialize (defaults to current directory).
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Force overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the cluster configuration.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// List the known roles.
    Roles,

    /// List the nodes of a cluster.
    Nodes {
        /// Cluster profile name.
        cluster: String,
    },

    /// Collect the facts of a cluster's nodes.
    Facts {
        /// Cluster profile name.
        cluster: String,

        /// Only this node.
        #[arg(short, long)]
        node: Option<String>,

        /// Read os-release files from this path instead of over ssh.
        ///
        /// A directory holds one file per node name.
        #[arg(long)]
        os_release: Option<PathBuf>,
    },

    /// Show the action plan of a cluster's nodes.
    Plan {
        /// Cluster profile name.
        cluster: String,

        /// Only this node.
        #[arg(short, long)]
        node: Option<String>,

        /// Show every action, not just the phase summary.
        #[arg(short, long)]
        detailed: bool,

        /// Read os-release files from this path instead of over ssh.
        #[arg(long)]
        os_release: Option<PathBuf>,
    },

    /// Run the plan through the dry-run backend.
    Simulate {
        /// Cluster profile name.
        cluster: String,

        /// Only this node.
        #[arg(short, long)]
        node: Option<String>,

        /// Fail actions whose description contains this text.
        #[arg(long)]
        fail: Vec<String>,

        /// Report actions whose description contains this text as unchanged.
        #[arg(long)]
        unchanged: Vec<String>,

        /// Deadline per action, in seconds.
        #[arg(long, default_value = "300")]
        timeout_secs: u64,

        /// Maximum number of nodes worked on at once.
        #[arg(long, default_value = "8")]
        max_parallel: usize,

        /// Read os-release files from this path instead of over ssh.
        #[arg(long)]
        os_release: Option<PathBuf>,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
