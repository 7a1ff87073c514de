//! Role definition types.
//!
//! A role is a base record (packages, services, templates, handlers,
//! post-install commands) plus an ordered list of predicate-gated patches.
//! Patches are applied in declaration order against a node's facts; a later
//! patch wins over an earlier one for the same field.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::facts::{NodeFacts, OsFamily};

/// Static definition of a cluster role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleDefinition {
    /// Role name (e.g. `nis_master`).
    pub name: String,
    /// Human readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Packages to install.
    #[serde(default)]
    pub packages: Vec<String>,
    /// Services to start and enable.
    #[serde(default)]
    pub services: Vec<ServiceSpec>,
    /// Configuration templates to deploy.
    #[serde(default)]
    pub templates: Vec<TemplateSpec>,
    /// Handlers templates may notify.
    #[serde(default)]
    pub handlers: Vec<HandlerSpec>,
    /// Commands run after services are up.
    #[serde(default)]
    pub post_commands: Vec<PostCommandSpec>,
    /// Predicate-gated patches, applied in order.
    #[serde(default)]
    pub overrides: Vec<ConditionalOverride>,
}

/// A service managed by a role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "ServiceRepr")]
pub struct ServiceSpec {
    /// Service unit name.
    pub name: String,
    /// Desired state.
    pub state: ServiceState,
    /// Whether the service starts at boot.
    pub enabled: bool,
}

/// Desired state of a service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// Running.
    #[default]
    Started,
    /// Restarted unconditionally.
    Restarted,
    /// Reloaded.
    Reloaded,
    /// Not running.
    Stopped,
}

/// A configuration template deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplateSpec {
    /// Template source, relative to the template root.
    pub source: String,
    /// Absolute destination path on the node.
    pub dest: String,
    /// Octal permission string.
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Handlers queued when the deployment changes the file.
    #[serde(default)]
    pub notify: Vec<String>,
}

/// A deferred action fired at the handler flush point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "HandlerRepr")]
pub struct HandlerSpec {
    /// Handler name referenced by `notify`.
    pub name: String,
    /// What the handler does.
    pub action: HandlerAction,
}

/// Action performed by a handler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HandlerAction {
    /// Restart a service.
    Restart(String),
    /// Reload a service.
    Reload(String),
    /// Run a shell command.
    Command(String),
}

/// A command run after all services are started.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostCommandSpec {
    /// Command line.
    pub command: String,
    /// Working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chdir: Option<String>,
    /// Whether the command must run from `chdir`.
    #[serde(default)]
    pub requires_chdir: bool,
    /// Gate evaluated at execution time.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "serde_yaml::with::singleton_map_recursive"
    )]
    pub when: Option<Predicate>,
}

/// A predicate over node facts.
///
/// Written as a single-key map, e.g. `{os_family: debian}` or
/// `{all: [{os_family: debian}, {os_version: jessie}]}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Always true.
    Always,
    /// OS family equals.
    OsFamily(OsFamily),
    /// OS version equals (case-insensitive).
    OsVersion(String),
    /// Node declares the role.
    HasRole(String),
    /// Variable equals a value.
    Var {
        /// Variable name.
        name: String,
        /// Expected value.
        equals: String,
    },
    /// All sub-predicates hold.
    All(Vec<Predicate>),
    /// At least one sub-predicate holds.
    Any(Vec<Predicate>),
    /// Negation.
    Not(Box<Predicate>),
}

/// A patch applied when its predicate holds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConditionalOverride {
    /// Gate.
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub when: Predicate,
    /// Fields merged into the role when the gate holds.
    #[serde(flatten)]
    pub patch: RolePatch,
}

/// Field-level changes to a role. `Option` fields replace, `add_*` fields append.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RolePatch {
    /// Replaces the package list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packages: Option<Vec<String>>,
    /// Appended to the package list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_packages: Vec<String>,
    /// Replaces the service list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<ServiceSpec>>,
    /// Appended to the service list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_services: Vec<ServiceSpec>,
    /// Replaces the state of named services.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub service_state: IndexMap<String, ServiceState>,
    /// Replaces the template list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<Vec<TemplateSpec>>,
    /// Appended to the template list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_templates: Vec<TemplateSpec>,
    /// Added to the handlers, replacing any handler with the same name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_handlers: Vec<HandlerSpec>,
    /// Appended to the post-install commands.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_post_commands: Vec<PostCommandSpec>,
}

/// A role with every applicable override merged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveRole {
    /// Role name.
    pub name: String,
    /// Packages to install.
    pub packages: Vec<String>,
    /// Services to manage.
    pub services: Vec<ServiceSpec>,
    /// Templates to deploy.
    pub templates: Vec<TemplateSpec>,
    /// Handlers.
    pub handlers: Vec<HandlerSpec>,
    /// Post-install commands.
    pub post_commands: Vec<PostCommandSpec>,
}

impl RoleDefinition {
    /// Creates an empty role.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            packages: vec![],
            services: vec![],
            templates: vec![],
            handlers: vec![],
            post_commands: vec![],
            overrides: vec![],
        }
    }

    /// Computes the effective definition for a node.
    ///
    /// Overrides never gate inclusion of the role: a role whose overrides
    /// all fail still contributes its base fields.
    #[must_use]
    pub fn effective(&self, facts: &NodeFacts) -> EffectiveRole {
        let mut role = EffectiveRole {
            name: self.name.clone(),
            packages: self.packages.clone(),
            services: self.services.clone(),
            templates: self.templates.clone(),
            handlers: self.handlers.clone(),
            post_commands: self.post_commands.clone(),
        };

        for (i, over) in self.overrides.iter().enumerate() {
            if over.when.evaluate(facts) {
                debug!("Role {}: override #{} applies to {}", self.name, i, facts.node);
                over.patch.apply(&mut role);
            }
        }

        role
    }

    /// Iterates over every template the role can ever deploy.
    pub fn all_templates(&self) -> impl Iterator<Item = &TemplateSpec> {
        self.templates.iter().chain(self.overrides.iter().flat_map(|o| {
            o.patch
                .templates
                .iter()
                .flatten()
                .chain(o.patch.add_templates.iter())
        }))
    }

    /// Iterates over every post-install command the role can ever run.
    pub fn all_post_commands(&self) -> impl Iterator<Item = &PostCommandSpec> {
        self.post_commands
            .iter()
            .chain(self.overrides.iter().flat_map(|o| o.patch.add_post_commands.iter()))
    }

    /// Iterates over every handler the role can ever define.
    pub fn all_handlers(&self) -> impl Iterator<Item = &HandlerSpec> {
        self.handlers
            .iter()
            .chain(self.overrides.iter().flat_map(|o| o.patch.add_handlers.iter()))
    }
}

impl RolePatch {
    /// Merges this patch into an effective role.
    pub fn apply(&self, role: &mut EffectiveRole) {
        if let Some(packages) = &self.packages {
            role.packages.clone_from(packages);
        }
        role.packages.extend(self.add_packages.iter().cloned());

        if let Some(services) = &self.services {
            role.services.clone_from(services);
        }
        role.services.extend(self.add_services.iter().cloned());

        for (name, state) in &self.service_state {
            match role.services.iter_mut().find(|s| &s.name == name) {
                Some(service) => service.state = *state,
                None => debug!("Role {}: service_state for undeclared service {}", role.name, name),
            }
        }

        if let Some(templates) = &self.templates {
            role.templates.clone_from(templates);
        }
        role.templates.extend(self.add_templates.iter().cloned());

        for handler in &self.add_handlers {
            match role.handlers.iter_mut().find(|h| h.name == handler.name) {
                Some(existing) => existing.action = handler.action.clone(),
                None => role.handlers.push(handler.clone()),
            }
        }

        role.post_commands.extend(self.add_post_commands.iter().cloned());
    }
}

impl Predicate {
    /// Evaluates the predicate against a node's facts.
    #[must_use]
    pub fn evaluate(&self, facts: &NodeFacts) -> bool {
        match self {
            Self::Always => true,
            Self::OsFamily(family) => facts.os_family == *family,
            Self::OsVersion(version) => facts.os_version.eq_ignore_ascii_case(version),
            Self::HasRole(role) => facts.has_role(role),
            Self::Var { name, equals } => facts.var(name) == Some(equals.as_str()),
            Self::All(preds) => preds.iter().all(|p| p.evaluate(facts)),
            Self::Any(preds) => preds.iter().any(|p| p.evaluate(facts)),
            Self::Not(pred) => !pred.evaluate(facts),
        }
    }
}

impl ServiceSpec {
    /// Creates a started, enabled service.
    #[must_use]
    pub fn started(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ServiceState::Started,
            enabled: true,
        }
    }
}

impl TemplateSpec {
    /// Parses the octal mode.
    ///
    /// Returns `None` unless the mode is an octal permission no wider
    /// than `07777`.
    #[must_use]
    pub fn mode_bits(&self) -> Option<u32> {
        let digits = self.mode.strip_prefix("0o").unwrap_or(&self.mode);
        if digits.is_empty() || digits.len() > 4 {
            return None;
        }
        u32::from_str_radix(digits, 8).ok().filter(|bits| *bits <= 0o7777)
    }
}

impl PostCommandSpec {
    /// Returns true if the command cannot run without a working directory.
    ///
    /// That is the case when explicitly requested, or when the program is a
    /// relative path such as `./configure`.
    #[must_use]
    pub fn needs_chdir(&self) -> bool {
        self.requires_chdir
            || self
                .command
                .split_whitespace()
                .next()
                .is_some_and(|program| program.starts_with("./") || program.starts_with("../"))
    }
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Started => "started",
            Self::Restarted => "restarted",
            Self::Reloaded => "reloaded",
            Self::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for HandlerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Restart(service) => write!(f, "restart {service}"),
            Self::Reload(service) => write!(f, "reload {service}"),
            Self::Command(command) => write!(f, "run `{command}`"),
        }
    }
}

// Serde representations

/// A service written either as a bare name or as a full record.
#[derive(Deserialize)]
#[serde(untagged)]
enum ServiceRepr {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        state: ServiceState,
        #[serde(default = "default_enabled")]
        enabled: bool,
    },
}

impl From<ServiceRepr> for ServiceSpec {
    fn from(repr: ServiceRepr) -> Self {
        match repr {
            ServiceRepr::Name(name) => Self::started(name),
            ServiceRepr::Full { name, state, enabled } => Self { name, state, enabled },
        }
    }
}

/// A handler written as `{ name, restart | reload | command }`.
#[derive(Deserialize)]
struct HandlerRepr {
    name: String,
    #[serde(default)]
    restart: Option<String>,
    #[serde(default)]
    reload: Option<String>,
    #[serde(default)]
    command: Option<String>,
}

impl TryFrom<HandlerRepr> for HandlerSpec {
    type Error = String;

    fn try_from(repr: HandlerRepr) -> Result<Self, Self::Error> {
        let action = match (repr.restart, repr.reload, repr.command) {
            (Some(service), None, None) => HandlerAction::Restart(service),
            (None, Some(service), None) => HandlerAction::Reload(service),
            (None, None, Some(command)) => HandlerAction::Command(command),
            _ => {
                return Err(format!(
                    "handler '{}' must set exactly one of restart, reload or command",
                    repr.name
                ));
            }
        };
        Ok(Self {
            name: repr.name,
            action,
        })
    }
}

fn default_mode() -> String {
    String::from("0644")
}

const fn default_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const NIS_ROLE: &str = r"
name: nis_master
packages: [rpcbind]
services:
  - rpcbind
  - name: nis
    enabled: true
handlers:
  - name: restart-nis
    restart: nis
overrides:
  - when: {os_family: debian}
    add_packages: [nis]
  - when:
      all:
        - {os_family: debian}
        - {os_version: jessie}
    service_state: {nis: restarted}
  - when: {os_family: rhel}
    add_packages: [ypserv]
    add_templates:
      - source: nis/yppasswdd.j2
        dest: /etc/sysconfig/yppasswdd
        notify: [restart-yppasswdd]
    add_handlers:
      - name: restart-nis
        restart: ypserv
      - name: restart-yppasswdd
        restart: yppasswdd
";

    fn nis_role() -> RoleDefinition {
        serde_yaml::from_str(NIS_ROLE).unwrap()
    }

    #[test]
    fn test_parse_service_shorthand() {
        let role = nis_role();
        assert_eq!(role.services[0], ServiceSpec::started("rpcbind"));
        assert_eq!(role.services[1].state, ServiceState::Started);
    }

    #[test]
    fn test_override_precedence_jessie() {
        let role = nis_role();
        let jessie = NodeFacts::new("n1", OsFamily::Debian, "jessie");
        let stretch = NodeFacts::new("n1", OsFamily::Debian, "stretch");

        let eff = role.effective(&jessie);
        let nis = eff.services.iter().find(|s| s.name == "nis").unwrap();
        assert_eq!(nis.state, ServiceState::Restarted);

        let eff = role.effective(&stretch);
        let nis = eff.services.iter().find(|s| s.name == "nis").unwrap();
        assert_eq!(nis.state, ServiceState::Started);
        assert_eq!(eff.packages, vec!["rpcbind", "nis"]);
    }

    #[test]
    fn test_unmatched_overrides_keep_base_fields() {
        let role = nis_role();
        let other = NodeFacts::new("n1", OsFamily::Other, "3.19");
        let eff = role.effective(&other);
        assert_eq!(eff.packages, vec!["rpcbind"]);
        assert_eq!(eff.services.len(), 2);
        assert!(eff.templates.is_empty());
    }

    #[test]
    fn test_add_handlers_replaces_by_name() {
        let role = nis_role();
        let rhel = NodeFacts::new("n1", OsFamily::Rhel, "7");
        let eff = role.effective(&rhel);
        assert_eq!(eff.handlers.len(), 2);
        assert_eq!(eff.handlers[0].action, HandlerAction::Restart(String::from("ypserv")));
        assert_eq!(eff.templates[0].dest, "/etc/sysconfig/yppasswdd");
    }

    #[test]
    fn test_later_override_wins_same_field() {
        let mut role = RoleDefinition::new("web");
        role.packages = vec![String::from("base")];
        role.overrides = vec![
            ConditionalOverride {
                when: Predicate::Always,
                patch: RolePatch {
                    packages: Some(vec![String::from("first")]),
                    ..RolePatch::default()
                },
            },
            ConditionalOverride {
                when: Predicate::OsFamily(OsFamily::Debian),
                patch: RolePatch {
                    packages: Some(vec![String::from("second")]),
                    ..RolePatch::default()
                },
            },
        ];

        let debian = NodeFacts::new("n1", OsFamily::Debian, "stretch");
        assert_eq!(role.effective(&debian).packages, vec!["second"]);
        let rhel = NodeFacts::new("n1", OsFamily::Rhel, "7");
        assert_eq!(role.effective(&rhel).packages, vec!["first"]);
    }

    #[test]
    fn test_handler_requires_exactly_one_action() {
        let yaml = "name: broken\nrestart: nis\ncommand: 'exportfs -ra'\n";
        assert!(serde_yaml::from_str::<HandlerSpec>(yaml).is_err());
    }

    #[test]
    fn test_predicates() {
        let facts = NodeFacts::new("n1", OsFamily::Debian, "Jessie")
            .with_roles(["nfs_server"])
            .with_vars([(String::from("site"), String::from("zh"))].into_iter().collect());

        assert!(Predicate::OsVersion(String::from("jessie")).evaluate(&facts));
        assert!(Predicate::HasRole(String::from("nfs_server")).evaluate(&facts));
        assert!(Predicate::Var {
            name: String::from("site"),
            equals: String::from("zh"),
        }
        .evaluate(&facts));
        assert!(Predicate::Not(Box::new(Predicate::OsFamily(OsFamily::Rhel))).evaluate(&facts));
        assert!(!Predicate::Any(vec![]).evaluate(&facts));
        assert!(Predicate::All(vec![]).evaluate(&facts));
    }

    #[test]
    fn test_predicate_yaml_forms() {
        let pred: Predicate = serde_yaml::from_str("always").unwrap();
        assert_eq!(pred, Predicate::Always);
        let pred: Predicate = serde_yaml::from_str("not: {os_family: rhel}").unwrap();
        assert_eq!(pred, Predicate::Not(Box::new(Predicate::OsFamily(OsFamily::Rhel))));
    }

    #[test]
    fn test_role_predicates_parse_from_map_form() {
        let yaml = r#"
name: ceph_osd
packages: [ceph]
post_commands:
  - command: ceph-volume lvm activate --all
    when: {var: {name: ceph_bootstrap, equals: "yes"}}
  - command: ceph osd pool create rbd
    when:
      any:
        - {has_role: ceph_mon}
        - {not: {os_family: rhel}}
overrides:
  - when: {os_family: debian}
    add_packages: [ceph-osd]
  - when:
      all:
        - {os_family: debian}
        - {os_version: jessie}
    add_packages: [ceph-deploy]
"#;
        let role: RoleDefinition = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(role.overrides[0].when, Predicate::OsFamily(OsFamily::Debian));
        assert_eq!(
            role.overrides[1].when,
            Predicate::All(vec![
                Predicate::OsFamily(OsFamily::Debian),
                Predicate::OsVersion(String::from("jessie")),
            ])
        );
        assert_eq!(
            role.post_commands[0].when,
            Some(Predicate::Var {
                name: String::from("ceph_bootstrap"),
                equals: String::from("yes"),
            })
        );
        assert_eq!(
            role.post_commands[1].when,
            Some(Predicate::Any(vec![
                Predicate::HasRole(String::from("ceph_mon")),
                Predicate::Not(Box::new(Predicate::OsFamily(OsFamily::Rhel))),
            ]))
        );

        let jessie = NodeFacts::new("n1", OsFamily::Debian, "jessie");
        assert_eq!(role.effective(&jessie).packages, vec!["ceph", "ceph-osd", "ceph-deploy"]);
    }

    #[test]
    fn test_mode_bits() {
        let mut template = TemplateSpec {
            source: String::from("a.j2"),
            dest: String::from("/etc/a"),
            mode: String::from("0644"),
            notify: vec![],
        };
        assert_eq!(template.mode_bits(), Some(0o644));
        template.mode = String::from("0o600");
        assert_eq!(template.mode_bits(), Some(0o600));
        template.mode = String::from("0999");
        assert_eq!(template.mode_bits(), None);
        template.mode = String::from("rw-r--r--");
        assert_eq!(template.mode_bits(), None);
    }

    #[test]
    fn test_needs_chdir() {
        let cmd = |command: &str, requires_chdir: bool| PostCommandSpec {
            command: command.to_string(),
            chdir: None,
            requires_chdir,
            when: None,
        };
        assert!(cmd("./ypinit -m", false).needs_chdir());
        assert!(cmd("../bin/setup", false).needs_chdir());
        assert!(cmd("make", true).needs_chdir());
        assert!(!cmd("exportfs -ra", false).needs_chdir());
    }
}
