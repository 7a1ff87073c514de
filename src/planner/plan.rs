//! Action sequences and their construction.
//!
//! This module defines the phases a node goes through and turns a
//! [`ResolvedPlan`] into the ordered list of actions the runner executes.

use indexmap::IndexMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::error::{PlanError, Result};
use crate::roles::{
    HandlerAction, PostCommandSpec, Predicate, ResolvedPlan, RoleDefinition, ServiceState,
    TemplateSpec,
};

use super::fingerprint::PlanHasher;

/// Execution phases, in the only order they may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Package installation.
    Packages,
    /// Template deployment.
    Templates,
    /// Barrier firing queued handlers.
    HandlerFlush,
    /// Service start and enable.
    Services,
    /// Post-install commands.
    PostCommands,
}

/// A single unit of work for the execution backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Install a package.
    InstallPackage {
        /// Package name.
        name: String,
    },
    /// Render and deploy a template.
    DeployTemplate {
        /// Template source.
        source: String,
        /// Destination path.
        dest: String,
        /// Permission bits.
        mode: u32,
        /// Handlers queued if the file changes.
        notify: Vec<String>,
        /// Variables available to the template.
        vars: BTreeMap<String, String>,
    },
    /// Fire every queued handler once.
    FlushHandlers {
        /// Handlers that may be queued, by name.
        handlers: IndexMap<String, HandlerAction>,
    },
    /// Run one handler.
    RunHandler {
        /// Handler name.
        name: String,
        /// What it does.
        action: HandlerAction,
    },
    /// Bring a service to a state.
    ManageService {
        /// Service name.
        name: String,
        /// Desired state.
        state: ServiceState,
        /// Whether it starts at boot.
        enabled: bool,
    },
    /// Run a post-install command.
    RunCommand {
        /// Command line.
        command: String,
        /// Working directory.
        #[serde(skip_serializing_if = "Option::is_none")]
        chdir: Option<String>,
        /// Gate evaluated right before running.
        #[serde(skip_serializing_if = "Option::is_none")]
        when: Option<Predicate>,
    },
}

/// An action tagged with its phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedAction {
    /// Phase the action belongs to.
    pub phase: Phase,
    /// The action.
    #[serde(flatten)]
    pub action: Action,
}

/// The ordered actions of one node.
#[derive(Debug, Clone, Serialize)]
pub struct ActionSequence {
    /// Node name.
    pub node: String,
    /// Fingerprint of the resolved plan.
    pub fingerprint: String,
    /// Actions in execution order.
    pub actions: Vec<PlannedAction>,
}

/// Builds action sequences from resolved plans.
#[derive(Debug, Default, Clone, Copy)]
pub struct ActionPlanner {
    /// Fingerprint hasher.
    hasher: PlanHasher,
}

impl ActionPlanner {
    /// Creates a new planner.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hasher: PlanHasher::new(),
        }
    }

    /// Expands a resolved plan into an action sequence.
    ///
    /// # Errors
    ///
    /// Returns a [`PlanError`] if a post-install command lacks a usable
    /// working directory, a template mode is not octal, or a template
    /// notifies a handler no role defines.
    pub fn plan(&self, resolved: &ResolvedPlan) -> Result<ActionSequence> {
        for command in &resolved.post_commands {
            check_command(command)?;
        }
        for template in &resolved.template_actions {
            for handler in &template.notify {
                if !resolved.handlers.contains_key(handler) {
                    return Err(PlanError::UndefinedHandler {
                        dest: template.dest.clone(),
                        handler: handler.clone(),
                    }
                    .into());
                }
            }
        }

        let mut actions = Vec::new();

        // Packages
        for name in &resolved.package_set {
            actions.push(PlannedAction {
                phase: Phase::Packages,
                action: Action::InstallPackage { name: name.clone() },
            });
        }

        // Templates
        for template in &resolved.template_actions {
            actions.push(PlannedAction {
                phase: Phase::Templates,
                action: Action::DeployTemplate {
                    source: template.source.clone(),
                    dest: template.dest.clone(),
                    mode: mode_bits(template)?,
                    notify: template.notify.clone(),
                    vars: resolved.vars.clone(),
                },
            });
        }

        // Handler flush barrier
        if !resolved.handler_triggers.is_empty() {
            let handlers = resolved
                .handler_triggers
                .iter()
                .filter_map(|name| Some((name.clone(), resolved.handlers.get(name)?.clone())))
                .collect();
            actions.push(PlannedAction {
                phase: Phase::HandlerFlush,
                action: Action::FlushHandlers { handlers },
            });
        }

        // Services
        for service in &resolved.service_list {
            actions.push(PlannedAction {
                phase: Phase::Services,
                action: Action::ManageService {
                    name: service.name.clone(),
                    state: service.state,
                    enabled: service.enabled,
                },
            });
        }

        // Post-install commands
        for command in &resolved.post_commands {
            actions.push(PlannedAction {
                phase: Phase::PostCommands,
                action: Action::RunCommand {
                    command: command.command.clone(),
                    chdir: command.chdir.clone(),
                    when: command.when.clone(),
                },
            });
        }

        let fingerprint = self.hasher.hash_plan(resolved)?;
        debug!(
            "Planned {} actions for {} ({})",
            actions.len(),
            resolved.node,
            PlanHasher::short(&fingerprint)
        );

        Ok(ActionSequence {
            node: resolved.node.clone(),
            fingerprint,
            actions,
        })
    }

    /// Checks the parts of a role definition that do not depend on facts:
    /// every post-install command and template any override could produce.
    ///
    /// # Errors
    ///
    /// Returns a [`PlanError`] for the first malformed entry.
    pub fn check_definition(role: &RoleDefinition) -> Result<()> {
        for command in role.all_post_commands() {
            if command.command.trim().is_empty() {
                return Err(PlanError::InvalidDefinition {
                    role: role.name.clone(),
                    message: String::from("post-install command is empty"),
                }
                .into());
            }
            check_command(command)?;
        }

        for template in role.all_templates() {
            if !Path::new(&template.dest).is_absolute() {
                return Err(PlanError::InvalidDefinition {
                    role: role.name.clone(),
                    message: format!("template destination '{}' is not absolute", template.dest),
                }
                .into());
            }
            mode_bits(template)?;
        }

        Ok(())
    }
}

/// Checks the working directory of a post-install command.
fn check_command(command: &PostCommandSpec) -> std::result::Result<(), PlanError> {
    match &command.chdir {
        None if command.needs_chdir() => Err(PlanError::MissingWorkingDirectory {
            command: command.command.clone(),
        }),
        Some(chdir) if !Path::new(chdir).is_absolute() => Err(PlanError::RelativeWorkingDirectory {
            command: command.command.clone(),
            chdir: chdir.clone(),
        }),
        _ => Ok(()),
    }
}

fn mode_bits(template: &TemplateSpec) -> std::result::Result<u32, PlanError> {
    template.mode_bits().ok_or_else(|| PlanError::InvalidMode {
        dest: template.dest.clone(),
        mode: template.mode.clone(),
    })
}

impl ActionSequence {
    /// Returns true if there is nothing to run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Returns the number of actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns the actions of one phase.
    pub fn phase_actions(&self, phase: Phase) -> impl Iterator<Item = &Action> {
        self.actions
            .iter()
            .filter(move |a| a.phase == phase)
            .map(|a| &a.action)
    }

    /// Returns the number of actions per phase, in phase order.
    #[must_use]
    pub fn phase_counts(&self) -> Vec<(Phase, usize)> {
        Phase::ALL
            .iter()
            .map(|phase| (*phase, self.phase_actions(*phase).count()))
            .collect()
    }
}

impl Phase {
    /// Every phase, in execution order.
    pub const ALL: [Self; 5] = [
        Self::Packages,
        Self::Templates,
        Self::HandlerFlush,
        Self::Services,
        Self::PostCommands,
    ];
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Packages => "packages",
            Self::Templates => "templates",
            Self::HandlerFlush => "handler_flush",
            Self::Services => "services",
            Self::PostCommands => "post_commands",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InstallPackage { name } => write!(f, "install package {name}"),
            Self::DeployTemplate {
                source, dest, mode, ..
            } => write!(f, "deploy {source} -> {dest} ({mode:04o})"),
            Self::FlushHandlers { handlers } => write!(f, "flush handlers ({})", handlers.len()),
            Self::RunHandler { name, action } => write!(f, "handler {name}: {action}"),
            Self::ManageService {
                name,
                state,
                enabled,
            } => {
                write!(f, "service {name} {state}")?;
                if *enabled {
                    write!(f, ", enabled")?;
                }
                Ok(())
            }
            Self::RunCommand { command, chdir, .. } => {
                write!(f, "run `{command}`")?;
                if let Some(chdir) = chdir {
                    write!(f, " in {chdir}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.phase, self.action)
    }
}

impl std::fmt::Display for ActionSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.actions.is_empty() {
            return write!(f, "{}: nothing to do", self.node);
        }

        writeln!(
            f,
            "{} ({} actions, plan {}):",
            self.node,
            self.actions.len(),
            PlanHasher::short(&self.fingerprint)
        )?;
        for (i, action) in self.actions.iter().enumerate() {
            writeln!(f, "  {i}. {action}")?;
        }
        Ok(())
    }
}
