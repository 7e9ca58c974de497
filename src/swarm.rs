//! Swarm bootstrap protocol
//!
//! Once every node group has converged addresses, this module turns the
//! independent machines into one swarm:
//!
//! 1. `docker swarm init` on the manager group's first node
//! 2. derive the worker and manager join tokens from that primary
//! 3. join the remaining managers with the manager token
//! 4. join the workers with the worker token
//!
//! Init and join are idempotent: a node that answers "already part of a
//! swarm" is told to leave with force and the command is retried exactly
//! once. A failed join on one node never aborts its siblings; the protocol
//! reports the AND across all of them.

use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::ClusterState;
use crate::{Error, Result, SWARM_PORT};

/// Marker docker prints when a node is already part of a swarm
const ALREADY_IN_SWARM: &str = "docker swarm leave";

const LEAVE_COMMAND: &str = "docker swarm leave --force";

/// Output of one remote command, reduced to what the protocol inspects.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Whether the command exited successfully
    pub success: bool,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

impl CommandOutput {
    fn already_in_swarm(&self) -> bool {
        self.stdout.contains(ALREADY_IN_SWARM) || self.stderr.contains(ALREADY_IN_SWARM)
    }
}

/// Trait for running a command on a remote host (allows mocking in tests)
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run `command` on `host` and capture its output
    async fn run(&self, host: &str, command: &str) -> Result<CommandOutput>;
}

/// Executor that runs commands over `ssh` with the cluster's key file.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    user: String,
    key_path: PathBuf,
}

impl SshExecutor {
    /// Create an executor authenticating with the given private key
    pub fn new(key_path: impl Into<PathBuf>) -> Self {
        Self {
            user: "root".to_string(),
            key_path: key_path.into(),
        }
    }

    /// Override the remote user (default `root`)
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// The key file this executor authenticates with
    pub fn key_path(&self) -> &Path {
        &self.key_path
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run(&self, host: &str, command: &str) -> Result<CommandOutput> {
        debug!(host = %host, command = %command, "running remote command");
        let output = tokio::process::Command::new("ssh")
            .arg("-i")
            .arg(&self.key_path)
            .args(["-o", "StrictHostKeyChecking=no", "-o", "BatchMode=yes"])
            .arg(format!("{}@{}", self.user, host))
            .arg(command)
            .output()
            .await
            .map_err(|e| Error::bootstrap(format!("ssh to {host} failed: {e}")))?;
        Ok(output.into())
    }
}

/// Drives the join-token bootstrap across a converged cluster.
pub struct SwarmBootstrap<E: RemoteExecutor = SshExecutor> {
    executor: E,
}

impl SwarmBootstrap<SshExecutor> {
    /// Bootstrap over ssh with the given private key
    pub fn new(key_path: impl Into<PathBuf>) -> Self {
        Self {
            executor: SshExecutor::new(key_path),
        }
    }
}

impl<E: RemoteExecutor> SwarmBootstrap<E> {
    /// Bootstrap with a custom executor
    pub fn with_executor(executor: E) -> Self {
        Self { executor }
    }

    /// Run the full bootstrap against the addresses recorded in `state`.
    ///
    /// Fails fast when the primary manager cannot be initialized or the
    /// join tokens cannot be derived (nothing can join without them); after
    /// that, per-node join failures only show up in the aggregate.
    pub async fn bootstrap(&self, state: &ClusterState) -> Result<bool> {
        let managers: Vec<&str> = state
            .manager
            .nodes
            .iter()
            .filter_map(|n| n.public_ip.as_deref())
            .collect();
        let primary = *managers
            .first()
            .ok_or_else(|| Error::bootstrap("manager group has no addressed nodes"))?;

        self.init_primary(primary).await?;

        let worker_token = self.join_token(primary, "worker").await?;
        let manager_token = self.join_token(primary, "manager").await?;

        let mut ok = true;
        for host in managers.iter().skip(1) {
            ok &= self.join_node(host, &manager_token, primary).await;
        }
        for node in &state.worker.nodes {
            match node.public_ip.as_deref() {
                Some(host) => ok &= self.join_node(host, &worker_token, primary).await,
                None => {
                    warn!(node = %node.label, "worker has no address, skipping join");
                    ok = false;
                }
            }
        }

        if ok {
            info!(
                managers = state.manager.nodes.len(),
                workers = state.worker.nodes.len(),
                "swarm bootstrap complete"
            );
        }
        Ok(ok)
    }

    /// `docker swarm init` on the primary, with the leave-then-retry-once
    /// rule when the node is already part of a swarm.
    async fn init_primary(&self, primary: &str) -> Result<()> {
        let command = format!("docker swarm init --advertise-addr {primary}");
        let out = self.executor.run(primary, &command).await?;

        if out.already_in_swarm() {
            info!(host = %primary, "primary already in a swarm, leaving and retrying init");
            self.executor.run(primary, LEAVE_COMMAND).await?;
            let retry = self.executor.run(primary, &command).await?;
            if !retry.success {
                return Err(Error::bootstrap(format!(
                    "swarm init retry failed on {primary}: {}",
                    retry.stderr.trim()
                )));
            }
        } else if !out.success {
            return Err(Error::bootstrap(format!(
                "swarm init failed on {primary}: {}",
                out.stderr.trim()
            )));
        }

        info!(host = %primary, "swarm initialized");
        Ok(())
    }

    /// Ask the primary for a join token; it must be non-empty.
    async fn join_token(&self, primary: &str, role: &str) -> Result<String> {
        let command = format!("docker swarm join-token --quiet {role}");
        let out = self.executor.run(primary, &command).await?;

        let token = out
            .stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default()
            .to_string();

        if !out.success || token.is_empty() {
            return Err(Error::bootstrap(format!(
                "could not derive {role} join token from {primary}"
            )));
        }
        debug!(role = %role, "join token derived");
        Ok(token)
    }

    /// Join one node, applying the leave-then-retry-once rule. Returns the
    /// node's individual outcome; never aborts siblings.
    async fn join_node(&self, host: &str, token: &str, primary: &str) -> bool {
        let command = format!("docker swarm join --token {token} {primary}:{SWARM_PORT}");
        let out = match self.executor.run(host, &command).await {
            Ok(out) => out,
            Err(e) => {
                warn!(host = %host, error = %e, "join command failed to run");
                return false;
            }
        };

        if out.already_in_swarm() {
            info!(host = %host, "node already in a swarm, leaving and retrying join");
            if let Err(e) = self.executor.run(host, LEAVE_COMMAND).await {
                warn!(host = %host, error = %e, "leave command failed to run");
                return false;
            }
            return match self.executor.run(host, &command).await {
                Ok(retry) => {
                    if !retry.success {
                        warn!(host = %host, stderr = %retry.stderr.trim(), "join retry failed");
                    }
                    retry.success
                }
                Err(e) => {
                    warn!(host = %host, error = %e, "join retry failed to run");
                    false
                }
            };
        }

        if !out.success {
            warn!(host = %host, stderr = %out.stderr.trim(), "join failed");
            return false;
        }
        info!(host = %host, "node joined the swarm");
        true
    }
}
