//! Whole-cluster lifecycle
//!
//! The orchestrator sits above the provisioner: it decides which groups to
//! create or destroy, gates destructive operations behind operator
//! confirmation, and manages singleton roles (a load balancer, a dedicated
//! master) that live outside the replica groups.
//!
//! Confirmation is an injectable seam so tests can script operator decisions;
//! the real [`StdinConfirmer`] reads a `y`/`N` line. Declining is a normal
//! early return with zero side effects, not an error.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::{ConfigStore, NodeGroupSpec, MANAGER_TAG, WORKER_TAG};
use crate::provider::ProviderGateway;
use crate::provision::NodeProvisioner;
use crate::Result;

/// Zone a fresh singleton node defaults to
const SINGLETON_ZONE: &str = "SILICON_VALLEY";

/// Plan a fresh singleton node defaults to (1 GB RAM / 1 CPU)
const SINGLETON_PLAN: u32 = 201;

/// What the operator is being asked to approve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    /// A cluster already has nodes; create more anyway
    RecreateCluster,
    /// Destroy every node in the cluster
    DestroyCluster,
    /// A singleton node already exists and has an address; replace it
    RecreateSingleton,
}

/// Operator confirmation seam.
#[async_trait]
pub trait Confirmer: Send + Sync {
    /// Ask the operator to approve `prompt`; anything but an explicit yes
    /// declines.
    async fn confirm(&self, prompt: Prompt) -> bool;
}

/// Confirmer that asks on the terminal and reads a `y`/`N` line.
#[derive(Debug, Default, Clone)]
pub struct StdinConfirmer;

#[async_trait]
impl Confirmer for StdinConfirmer {
    async fn confirm(&self, prompt: Prompt) -> bool {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

        let question = match prompt {
            Prompt::RecreateCluster => "You already have a cluster. Create more nodes anyway?",
            Prompt::DestroyCluster => "Destroy cluster, are you sure?",
            Prompt::RecreateSingleton => "This node already exists. Re-create it?",
        };
        print!("{question} [y/N] ");
        if tokio::io::stdout().flush().await.is_err() {
            return false;
        }

        let mut input = String::new();
        let mut reader = tokio::io::BufReader::new(tokio::io::stdin());
        if reader.read_line(&mut input).await.is_err() {
            return false;
        }
        input.trim().eq_ignore_ascii_case("y")
    }
}

/// Top-level cluster lifecycle driver.
pub struct ClusterOrchestrator<G: ProviderGateway, C: Confirmer = StdinConfirmer> {
    provisioner: NodeProvisioner<G>,
    confirmer: C,
}

impl<G: ProviderGateway> ClusterOrchestrator<G, StdinConfirmer> {
    /// Create an orchestrator that confirms on the terminal
    pub fn new(provisioner: NodeProvisioner<G>) -> Self {
        Self {
            provisioner,
            confirmer: StdinConfirmer,
        }
    }
}

impl<G: ProviderGateway, C: Confirmer> ClusterOrchestrator<G, C> {
    /// Create an orchestrator with a custom confirmer
    pub fn with_confirmer(provisioner: NodeProvisioner<G>, confirmer: C) -> Self {
        Self {
            provisioner,
            confirmer,
        }
    }

    /// The provisioner this orchestrator delegates group operations to
    pub fn provisioner(&self) -> &NodeProvisioner<G> {
        &self.provisioner
    }

    fn store(&self) -> &ConfigStore {
        self.provisioner.store()
    }

    /// Whether a cluster exists: both the worker and the manager group must
    /// be populated.
    pub fn exists(&self) -> Result<bool> {
        Ok(self.store().load()?.exists_cluster())
    }

    /// Create the cluster's replica groups.
    ///
    /// If any group already has nodes the operator must confirm before more
    /// are created; a fresh document gets its node lists initialized empty.
    /// Nothing is created without a registered SSH key. The result is the
    /// AND across the per-group outcomes.
    pub async fn create(&self) -> Result<bool> {
        let state = self.store().load()?;

        if state.has_any_nodes() {
            if !self.confirmer.confirm(Prompt::RecreateCluster).await {
                info!("cluster creation aborted by operator");
                return Ok(false);
            }
        } else {
            let mut worker = state.worker.clone();
            worker.nodes.clear();
            let mut manager = state.manager.clone();
            manager.nodes.clear();
            self.store().commit_group(WORKER_TAG, &worker)?;
            self.store().commit_group(MANAGER_TAG, &manager)?;
        }

        if state.ssh_key.is_empty() {
            warn!("no SSH key registered; run `armada keys create` first");
            return Ok(false);
        }

        let mut ok = true;
        for tag in [WORKER_TAG, MANAGER_TAG] {
            // groups are validated present at load
            let replicas = match state.group(tag) {
                Some(group) => group.replicas,
                None => continue,
            };
            if replicas > 0 {
                ok &= self.provisioner.create_group(tag, replicas).await?;
            }
        }

        if ok {
            info!("cluster created; bootstrap it with `armada cluster setup`");
        }
        Ok(ok)
    }

    /// Destroy both replica groups, after confirmation.
    pub async fn destroy(&self) -> Result<bool> {
        let state = self.store().load()?;
        if !state.exists_cluster() {
            info!("no cluster recorded in the config document");
            return Ok(false);
        }
        if !self.confirmer.confirm(Prompt::DestroyCluster).await {
            info!("cluster destruction aborted by operator");
            return Ok(false);
        }

        let worker_ok = self.provisioner.destroy_group(WORKER_TAG).await?;
        let manager_ok = self.provisioner.destroy_group(MANAGER_TAG).await?;
        Ok(worker_ok && manager_ok)
    }

    /// Create (or re-create) a singleton node under `tag`, e.g. a load
    /// balancer.
    ///
    /// Re-creating a singleton whose node already has an address requires
    /// confirmation; the old instance record is replaced. zone/plan/os come
    /// from any previously stored spec for the tag, else fixed defaults.
    pub async fn add_singleton(&self, tag: &str) -> Result<bool> {
        let state = self.store().load()?;
        let existing = state.group(tag);

        if let Some(group) = &existing {
            if group.nodes.iter().any(|n| n.public_ip.is_some()) {
                if !self.confirmer.confirm(Prompt::RecreateSingleton).await {
                    info!(group = %tag, "singleton re-creation aborted by operator");
                    return Ok(false);
                }
                warn!(
                    group = %tag,
                    "replacing the recorded node; the previous instance is no longer tracked"
                );
            }
        }

        let mut spec = existing.unwrap_or_else(singleton_defaults);
        spec.replicas = 1;
        spec.nodes.clear();
        self.store().commit_group(tag, &spec)?;

        self.provisioner.create_group(tag, 1).await
    }

    /// Destroy the singleton node under `tag`.
    pub async fn remove_singleton(&self, tag: &str) -> Result<bool> {
        let state = self.store().load()?;
        match state.group(tag) {
            Some(group) if !group.nodes.is_empty() => self.provisioner.destroy_group(tag).await,
            _ => {
                warn!(group = %tag, "no such node is recorded");
                Ok(false)
            }
        }
    }

    /// Move one instance to a new plan. Purely a provider-side effect: the
    /// plan is not tracked per node, so no state is committed.
    pub async fn resize_node(&self, id: &str, plan: u32) -> Result<()> {
        self.provisioner.gateway().resize_instance(id, plan).await?;
        info!(id = %id, plan, "instance resized");
        Ok(())
    }

    /// Destroy a single node by instance id, wherever it lives among the
    /// replica groups.
    pub async fn remove_node(&self, id: &str) -> Result<bool> {
        let state = self.store().load()?;
        for tag in [WORKER_TAG, MANAGER_TAG] {
            let mut group = match state.group(tag) {
                Some(g) => g,
                None => continue,
            };
            let Some(pos) = group.nodes.iter().position(|n| n.id == id) else {
                continue;
            };
            match self.provisioner.gateway().destroy_instance(id).await {
                Ok(()) => {
                    let node = group.nodes.remove(pos);
                    self.store().commit_group(tag, &group)?;
                    info!(group = %tag, node = %node.label, id = %id, "node removed");
                    return Ok(true);
                }
                Err(e) => {
                    warn!(id = %id, error = %e, "node destruction failed");
                    return Ok(false);
                }
            }
        }
        warn!(id = %id, "node not found in any group");
        Ok(false)
    }

    /// Enable private networking on every cluster node, then re-poll until
    /// all of them report a private address.
    pub async fn enable_private_network(&self) -> Result<bool> {
        let state = self.store().load()?;

        let mut ok = true;
        for tag in [MANAGER_TAG, WORKER_TAG] {
            let group = match state.group(tag) {
                Some(g) => g,
                None => continue,
            };
            for node in &group.nodes {
                match self
                    .provisioner
                    .gateway()
                    .enable_private_network(&node.id)
                    .await
                {
                    Ok(()) => info!(node = %node.label, "private network enabled"),
                    Err(e) => {
                        warn!(node = %node.label, error = %e, "enabling private network failed");
                        ok = false;
                    }
                }
            }
        }

        if ok {
            self.provisioner.refresh_addresses(MANAGER_TAG, true).await?;
            self.provisioner.refresh_addresses(WORKER_TAG, true).await?;
        }
        Ok(ok)
    }
}

fn singleton_defaults() -> NodeGroupSpec {
    NodeGroupSpec {
        zone: SINGLETON_ZONE.to_string(),
        plan: SINGLETON_PLAN,
        os: crate::catalog::DEFAULT_OS.to_string(),
        replicas: 1,
        nodes: Vec::new(),
    }
}
