//! OS release probes.
//!
//! A probe fetches the raw `/etc/os-release` of a node. The SSH probe reads
//! it remotely; the local probe reads files from disk, which is what
//! simulations and tests use.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::cluster::NodeSpec;
use crate::config::LoginProfile;
use crate::error::{FactError, Result};

/// Source of raw os-release content for a node.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FactProbe: Send + Sync {
    /// Returns the contents of the node's `/etc/os-release`.
    async fn read_os_release(&self, node: &NodeSpec) -> Result<String>;
}

/// Default SSH connect timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Reads os-release over `ssh`, using a login profile.
#[derive(Debug, Clone)]
pub struct SshProbe {
    /// Remote user.
    user: String,
    /// SSH port.
    port: u16,
    /// Private key, with `~` expanded.
    identity: Option<PathBuf>,
    /// Connection timeout.
    connect_timeout: Duration,
}

impl SshProbe {
    /// Creates a probe for a login profile.
    #[must_use]
    pub fn from_login(login: &LoginProfile) -> Self {
        Self {
            user: login.image_user.clone(),
            port: login.ssh_port,
            identity: login.user_key_private.as_deref().map(expand_tilde),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builds the `ssh` argument list for a node.
    fn args(&self, node: &NodeSpec) -> Vec<String> {
        let mut args = vec![
            String::from("-o"),
            String::from("BatchMode=yes"),
            String::from("-o"),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
            String::from("-o"),
            String::from("StrictHostKeyChecking=accept-new"),
            String::from("-p"),
            self.port.to_string(),
        ];
        if let Some(identity) = &self.identity {
            args.push(String::from("-i"));
            args.push(identity.display().to_string());
        }
        args.push(format!("{}@{}", self.user, node.address));
        args.push(String::from("cat /etc/os-release"));
        args
    }
}

#[async_trait]
impl FactProbe for SshProbe {
    async fn read_os_release(&self, node: &NodeSpec) -> Result<String> {
        debug!("Reading os-release of {} at {}", node.name, node.address);

        let output = Command::new("ssh")
            .args(self.args(node))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        // Leave room for the remote command after the connection is up.
        let deadline = self.connect_timeout * 2;
        let output = tokio::time::timeout(deadline, output)
            .await
            .map_err(|_| {
                FactError::unavailable(
                    &node.name,
                    format!("ssh timed out after {}s", deadline.as_secs()),
                )
            })?
            .map_err(|e| FactError::unavailable(&node.name, format!("failed to run ssh: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("ssh to {} failed: {}", node.name, stderr.trim());
            return Err(FactError::unavailable(
                &node.name,
                format!("ssh exited with {}: {}", output.status, stderr.trim()),
            )
            .into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Reads os-release content from the local filesystem.
///
/// If the path is a directory, each node reads `<dir>/<node name>`;
/// otherwise every node reads the same file.
#[derive(Debug, Clone)]
pub struct LocalProbe {
    /// File or directory.
    path: PathBuf,
}

impl LocalProbe {
    /// Creates a local probe.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FactProbe for LocalProbe {
    async fn read_os_release(&self, node: &NodeSpec) -> Result<String> {
        let path = if self.path.is_dir() {
            self.path.join(&node.name)
        } else {
            self.path.clone()
        };

        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            FactError::unavailable(&node.name, format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(content)
    }
}

/// Expands a leading `~` to the home directory.
fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().map_or_else(|| PathBuf::from(path), |home| home.join(rest)),
        None => Path::new(path).to_path_buf(),
    }
}
