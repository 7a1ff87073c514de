//! Fact types describing a single node.
//!
//! A [`NodeFacts`] value is an immutable snapshot taken once per run; every
//! predicate in a role definition is evaluated against it.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Operating system family of a node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    /// Debian and derivatives (Ubuntu).
    Debian,
    /// Red Hat Enterprise Linux and derivatives (`CentOS`, Rocky, Fedora).
    Rhel,
    /// Anything else.
    #[default]
    Other,
}

/// Observed properties of a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeFacts {
    /// Node name.
    pub node: String,
    /// OS family.
    pub os_family: OsFamily,
    /// OS version (codename on Debian, release number elsewhere).
    pub os_version: String,
    /// Declared cluster roles, in declaration order.
    pub roles: IndexSet<String>,
    /// Environment-provided variables.
    pub vars: BTreeMap<String, String>,
}

impl NodeFacts {
    /// Creates facts for a node with no roles and no variables.
    #[must_use]
    pub fn new(node: impl Into<String>, os_family: OsFamily, os_version: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            os_family,
            os_version: os_version.into(),
            roles: IndexSet::new(),
            vars: BTreeMap::new(),
        }
    }

    /// Sets the declared roles.
    #[must_use]
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the environment-provided variables.
    #[must_use]
    pub fn with_vars(mut self, vars: BTreeMap<String, String>) -> Self {
        self.vars = vars;
        self
    }

    /// Returns true if the node declares the given role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Returns a variable value.
    #[must_use]
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}

/// Parsed subset of `/etc/os-release`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsRelease {
    /// `ID` field.
    pub id: String,
    /// `ID_LIKE` field, split on whitespace.
    pub id_like: Vec<String>,
    /// `VERSION_ID` field.
    pub version_id: Option<String>,
    /// `VERSION_CODENAME` field.
    pub version_codename: Option<String>,
    /// `VERSION` field.
    pub version: Option<String>,
}

const DEBIAN_IDS: &[&str] = &["debian", "ubuntu", "raspbian"];
const RHEL_IDS: &[&str] = &["rhel", "centos", "fedora", "rocky", "almalinux", "ol", "scientific"];

impl OsRelease {
    /// Parses the contents of an os-release file.
    ///
    /// # Errors
    ///
    /// Returns an error message if the `ID` field is missing.
    pub fn parse(content: &str) -> Result<Self, String> {
        let fields: HashMap<&str, String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim(), unquote(value.trim())))
            .collect();

        let id = fields
            .get("ID")
            .filter(|id| !id.is_empty())
            .map(|id| id.to_lowercase())
            .ok_or_else(|| String::from("os-release has no ID field"))?;

        Ok(Self {
            id,
            id_like: fields
                .get("ID_LIKE")
                .map(|v| v.split_whitespace().map(str::to_lowercase).collect())
                .unwrap_or_default(),
            version_id: fields.get("VERSION_ID").filter(|v| !v.is_empty()).cloned(),
            version_codename: fields
                .get("VERSION_CODENAME")
                .filter(|v| !v.is_empty())
                .map(|v| v.to_lowercase()),
            version: fields.get("VERSION").filter(|v| !v.is_empty()).cloned(),
        })
    }

    /// Determines the OS family from `ID`, falling back to `ID_LIKE`.
    #[must_use]
    pub fn family(&self) -> OsFamily {
        std::iter::once(&self.id)
            .chain(self.id_like.iter())
            .find_map(|id| {
                if DEBIAN_IDS.contains(&id.as_str()) {
                    Some(OsFamily::Debian)
                } else if RHEL_IDS.contains(&id.as_str()) {
                    Some(OsFamily::Rhel)
                } else {
                    None
                }
            })
            .unwrap_or(OsFamily::Other)
    }

    /// Determines the OS version.
    ///
    /// Debian-family systems are identified by codename (`jessie`,
    /// `stretch`); old releases only carry it in parentheses inside
    /// `VERSION`. Other families use `VERSION_ID`.
    #[must_use]
    pub fn os_version(&self) -> Option<String> {
        let codename = || {
            self.version_codename.clone().or_else(|| {
                let version = self.version.as_deref()?;
                let start = version.find('(')?;
                let end = version[start..].find(')')? + start;
                let inner = version[start + 1..end].trim();
                inner
                    .split_whitespace()
                    .next()
                    .map(|word| word.trim_matches(',').to_lowercase())
            })
        };

        match self.family() {
            OsFamily::Debian => codename().or_else(|| self.version_id.clone()),
            OsFamily::Rhel | OsFamily::Other => self.version_id.clone().or_else(codename),
        }
    }
}

fn unquote(value: &str) -> String {
    let trimmed = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);
    trimmed.to_string()
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Debian => "debian",
            Self::Rhel => "rhel",
            Self::Other => "other",
        };
        write!(f, "{s}")
    }
}
