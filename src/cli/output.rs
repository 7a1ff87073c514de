//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::cluster::Inventory;
use crate::config::ValidationResult;
use crate::error::Result;
use crate::facts::NodeFacts;
use crate::orchestrator::{NodeOutcome, PreparedNode, RunReport};
use crate::planner::{PlanHasher, StepStatus};
use crate::roles::{RENAMED_ROLES, RoleCatalog};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Role row for table display.
#[derive(Tabled)]
struct RoleRow {
    #[tabled(rename = "Role")]
    name: String,
    #[tabled(rename = "Packages")]
    packages: usize,
    #[tabled(rename = "Services")]
    services: usize,
    #[tabled(rename = "Templates")]
    templates: usize,
    #[tabled(rename = "Overrides")]
    overrides: usize,
    #[tabled(rename = "Description")]
    description: String,
}

/// Node row for table display.
#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Node")]
    name: String,
    #[tabled(rename = "Group")]
    group: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Roles")]
    roles: String,
}

/// Facts row for table display.
#[derive(Tabled)]
struct FactsRow {
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "OS")]
    os: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Roles")]
    roles: String,
}

/// Plan summary row for table display.
#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Packages")]
    packages: usize,
    #[tabled(rename = "Templates")]
    templates: usize,
    #[tabled(rename = "Handlers")]
    handlers: usize,
    #[tabled(rename = "Services")]
    services: usize,
    #[tabled(rename = "Commands")]
    commands: usize,
    #[tabled(rename = "Fingerprint")]
    fingerprint: String,
}

/// Run outcome row for table display.
#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
    #[tabled(rename = "Steps")]
    steps: usize,
    #[tabled(rename = "Changed")]
    changed: usize,
    #[tabled(rename = "Handlers")]
    handlers: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = ValidationJson {
                    valid: result.is_valid(),
                    errors: result.errors.iter().map(ToString::to_string).collect(),
                    warnings: result.warnings.clone(),
                };
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();
                if result.is_valid() {
                    let _ = writeln!(output, "{} Configuration is valid", "✓".green());
                } else {
                    let _ = writeln!(
                        output,
                        "{} Configuration has {} error(s):",
                        "✗".red(),
                        result.error_count()
                    );
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                }

                if warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                } else if result.warning_count() > 0 {
                    let _ = writeln!(
                        output,
                        "   {} warning(s), use --warnings to show them",
                        result.warning_count()
                    );
                }
                output
            }
        }
    }

    /// Formats the role catalog.
    #[must_use]
    pub fn format_roles(&self, catalog: &RoleCatalog) -> String {
        match self.format {
            OutputFormat::Json => {
                let roles: Vec<_> = catalog.iter().collect();
                serde_json::to_string_pretty(&roles).unwrap_or_default()
            }
            OutputFormat::Text => {
                let rows: Vec<RoleRow> = catalog
                    .iter()
                    .map(|r| RoleRow {
                        name: r.name.clone(),
                        packages: r.packages.len(),
                        services: r.services.len(),
                        templates: r.templates.len(),
                        overrides: r.overrides.len(),
                        description: Self::truncate(r.description.as_deref().unwrap_or(""), 48),
                    })
                    .collect();

                let mut output = Table::new(rows).to_string();
                output.push_str("\n\nRenamed roles:\n");
                for (old, new) in RENAMED_ROLES {
                    let _ = writeln!(output, "   {} -> {new}", old.dimmed());
                }
                output
            }
        }
    }

    /// Formats the nodes of a cluster.
    #[must_use]
    pub fn format_nodes(&self, inventory: &Inventory) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&inventory.nodes).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();
                let _ = write!(
                    output,
                    "\nCluster: {} ({} nodes)\n\n",
                    inventory.cluster.bold(),
                    inventory.len()
                );

                let rows: Vec<NodeRow> = inventory
                    .nodes
                    .iter()
                    .map(|n| {
                        let frontend = inventory.frontend.as_deref() == Some(n.name.as_str());
                        NodeRow {
                            name: if frontend {
                                format!("{} *", n.name)
                            } else {
                                n.name.clone()
                            },
                            group: n.group.clone(),
                            address: n.address.clone(),
                            roles: Self::join_or_dash(n.roles.iter()),
                        }
                    })
                    .collect();

                output.push_str(&Table::new(rows).to_string());
                output.push('\n');
                if inventory.frontend.is_some() {
                    output.push_str("   * frontend\n");
                }
                output
            }
        }
    }

    /// Formats collected facts.
    #[must_use]
    pub fn format_facts(&self, facts: &[(String, Result<NodeFacts>)]) -> String {
        match self.format {
            OutputFormat::Json => {
                let entries: Vec<FactsJson<'_>> = facts
                    .iter()
                    .map(|(node, result)| match result {
                        Ok(facts) => FactsJson {
                            node,
                            facts: Some(facts),
                            error: None,
                        },
                        Err(e) => FactsJson {
                            node,
                            facts: None,
                            error: Some(e.to_string()),
                        },
                    })
                    .collect();
                serde_json::to_string_pretty(&entries).unwrap_or_default()
            }
            OutputFormat::Text => {
                let rows: Vec<FactsRow> = facts
                    .iter()
                    .map(|(node, result)| match result {
                        Ok(facts) => FactsRow {
                            node: node.clone(),
                            os: facts.os_family.to_string(),
                            version: facts.os_version.clone(),
                            roles: Self::join_or_dash(facts.roles.iter()),
                        },
                        Err(e) => FactsRow {
                            node: node.clone(),
                            os: "unavailable".red().to_string(),
                            version: String::from("-"),
                            roles: Self::truncate(&e.to_string(), 48),
                        },
                    })
                    .collect();
                format!("{}\n", Table::new(rows))
            }
        }
    }

    /// Formats node plans.
    #[must_use]
    pub fn format_plans(&self, nodes: &[PreparedNode], detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                let entries: Vec<PlanJson<'_>> = nodes
                    .iter()
                    .map(|n| match n {
                        PreparedNode::Ready(plan) => PlanJson {
                            node: n.node(),
                            plan: Some(&**plan),
                            error: None,
                        },
                        PreparedNode::FactsUnavailable { reason, .. } => PlanJson {
                            node: n.node(),
                            plan: None,
                            error: Some(reason.as_str()),
                        },
                    })
                    .collect();
                serde_json::to_string_pretty(&entries).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_plans_text(nodes, detailed),
        }
    }

    /// Formats node plans as text.
    fn format_plans_text(nodes: &[PreparedNode], detailed: bool) -> String {
        let mut output = String::new();
        let _ = writeln!(output, "\nAction plan\n");

        let rows: Vec<PlanRow> = nodes
            .iter()
            .filter_map(|n| match n {
                PreparedNode::Ready(plan) => {
                    let counts = plan.sequence.phase_counts();
                    let count = |i: usize| counts.get(i).map_or(0, |(_, c)| *c);
                    Some(PlanRow {
                        node: plan.facts.node.clone(),
                        packages: count(0),
                        templates: count(1),
                        handlers: plan.resolved.handler_triggers.len(),
                        services: count(3),
                        commands: count(4),
                        fingerprint: PlanHasher::short(&plan.sequence.fingerprint).to_string(),
                    })
                }
                PreparedNode::FactsUnavailable { .. } => None,
            })
            .collect();

        if !rows.is_empty() {
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        for node in nodes {
            if let PreparedNode::FactsUnavailable { node, reason } = node {
                let _ = writeln!(output, "{} {node}: facts unavailable: {reason}", "✗".red());
            }
        }

        if detailed {
            for node in nodes {
                if let PreparedNode::Ready(plan) = node {
                    let _ = write!(output, "\n{}\n", plan.sequence);
                }
            }
        }

        output
    }

    /// Formats a run report.
    #[must_use]
    pub fn format_report(&self, report: &RunReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => Self::format_report_text(report),
        }
    }

    /// Formats a run report as text.
    fn format_report_text(report: &RunReport) -> String {
        let mut output = String::new();
        let _ = write!(
            output,
            "\nRun {} on {} via {}\n\n",
            report.run_id,
            report.cluster.bold(),
            report.backend
        );

        let rows: Vec<OutcomeRow> = report
            .nodes
            .iter()
            .map(|n| OutcomeRow {
                node: n.node.clone(),
                outcome: Self::format_outcome(&n.outcome),
                steps: n.run.as_ref().map_or(0, |r| r.steps.len()),
                changed: n.run.as_ref().map_or(0, crate::planner::NodeRun::changed_count),
                handlers: n
                    .run
                    .as_ref()
                    .map_or_else(|| String::from("-"), |r| Self::join_or_dash(r.fired_handlers.iter())),
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        for node in &report.nodes {
            if let NodeOutcome::Failed { at, reason } = &node.outcome {
                let _ = writeln!(output, "{} {} ({at}): {reason}", "✗".red(), node.node);
                let skipped = node.run.as_ref().map_or(0, |r| {
                    r.steps
                        .iter()
                        .filter(|s| matches!(s.status, StepStatus::Skipped { .. }))
                        .count()
                });
                if skipped > 0 {
                    let _ = writeln!(output, "   {skipped} gated command(s) skipped");
                }
            }
        }

        let status = if report.is_success() {
            "success".green().to_string()
        } else {
            "failed".red().to_string()
        };
        let _ = write!(
            output,
            "\nResult: {status} ({} succeeded, {} failed, {} skipped) in {}ms\n",
            report.succeeded(),
            report.failed(),
            report.skipped(),
            report.duration().num_milliseconds()
        );

        output
    }

    /// Formats a node outcome with color.
    fn format_outcome(outcome: &NodeOutcome) -> String {
        match outcome {
            NodeOutcome::Succeeded => "succeeded".green().to_string(),
            NodeOutcome::Failed { at, .. } => format!("failed ({at})").red().to_string(),
            NodeOutcome::Skipped { .. } => "skipped".dimmed().to_string(),
        }
    }

    /// Joins names with commas, or returns a dash.
    fn join_or_dash<'a>(items: impl Iterator<Item = &'a String>) -> String {
        let joined = items.map(String::as_str).collect::<Vec<_>>().join(", ");
        if joined.is_empty() {
            String::from("-")
        } else {
            joined
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{head}...")
        }
    }
}

// JSON serialization helpers

#[derive(serde::Serialize)]
struct ValidationJson {
    valid: bool,
    errors: Vec<String>,
    warnings: Vec<String>,
}

#[derive(serde::Serialize)]
struct FactsJson<'a> {
    node: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    facts: Option<&'a NodeFacts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(serde::Serialize)]
struct PlanJson<'a> {
    node: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    plan: Option<&'a crate::orchestrator::NodePlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FactError;
    use crate::facts::OsFamily;

    #[test]
    fn test_truncate() {
        assert_eq!(OutputFormatter::truncate("short", 10), "short");
        assert_eq!(OutputFormatter::truncate("a much longer text", 10), "a much ...");
    }

    #[test]
    fn test_roles_text_lists_renames() {
        let catalog = RoleCatalog::builtin().unwrap();
        let output = OutputFormatter::new(OutputFormat::Text)
            .format_roles(&catalog);
        assert!(output.contains("nis_master"));
        assert!(output.contains("glusterfs_client"));
        assert!(output.contains("Renamed roles"));
    }

    #[test]
    fn test_facts_json_reports_errors() {
        let facts = vec![
            (
                String::from("n1"),
                Ok(NodeFacts::new("n1", OsFamily::Debian, "stretch")),
            ),
            (
                String::from("n2"),
                Err(FactError::unavailable("n2", "connection refused").into()),
            ),
        ];
        let output = OutputFormatter::new(OutputFormat::Json)
            .format_facts(&facts);
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value[0]["facts"]["os_version"], "stretch");
        assert!(value[0].get("error").is_none());
        assert!(
            value[1]["error"]
                .as_str()
                .unwrap()
                .contains("connection refused")
        );
    }
}
