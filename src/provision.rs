//! Node group provisioning
//!
//! Converges a named group of instances to its desired replica count and
//! polls the provider until every member has a routable address.
//!
//! Creation is sequential with a fixed pacing delay between requests, and
//! each successful creation is committed to the store before the next one is
//! issued: a process that dies mid-batch leaves the partial batch visible in
//! the document, and a re-run continues from there.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{ConfigStore, Node, NodeGroupSpec};
use crate::provider::ProviderGateway;
use crate::retry::RetryPolicy;
use crate::{Error, Result, CREATE_PACING};

/// Derive the deterministic label for the node at `index` in a group.
///
/// A batch of one into an empty group gets the bare `{label}-{tag}` form;
/// otherwise indices below ten are zero-padded to two digits.
pub fn derive_label(cluster_label: &str, tag: &str, index: usize, single: bool) -> String {
    if single {
        format!("{cluster_label}-{tag}")
    } else if index < 10 {
        format!("{cluster_label}-{tag}0{index}")
    } else {
        format!("{cluster_label}-{tag}{index}")
    }
}

/// Creates and destroys the members of a node group and drives
/// address-convergence polling.
pub struct NodeProvisioner<G> {
    store: ConfigStore,
    gateway: G,
    pacing: Duration,
    poll: RetryPolicy,
}

impl<G: ProviderGateway> NodeProvisioner<G> {
    /// Create a provisioner with the default pacing and polling policy
    pub fn new(store: ConfigStore, gateway: G) -> Self {
        Self {
            store,
            gateway,
            pacing: CREATE_PACING,
            poll: RetryPolicy::default(),
        }
    }

    /// Override the pause between instance-creation requests
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Override the address-polling policy
    pub fn with_poll_policy(mut self, poll: RetryPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// The store this provisioner commits to
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// The gateway this provisioner calls
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Grow the group by `replicas` instances and poll until every member
    /// has a public address.
    ///
    /// A failed creation does not abort the rest of the batch: it is
    /// recorded, the remaining creations are attempted, and the aggregate
    /// comes back `false`. Convergence polling only runs when every
    /// creation succeeded.
    pub async fn create_group(&self, tag: &str, replicas: u32) -> Result<bool> {
        if replicas == 0 {
            return Err(Error::config(format!(
                "group [{tag}] needs at least 1 replica"
            )));
        }

        let state = self.store.load()?;
        let mut group = self.store_group(&state, tag)?;
        let single = replicas == 1 && group.nodes.is_empty();
        let base = group.nodes.len();

        info!(group = %tag, replicas, existing = base, "creating instances");

        let mut ok = true;
        for i in 0..replicas as usize {
            let label = self.free_label(&state.label, tag, base + i, single, &group);
            match self
                .gateway
                .create_instance(&group.zone, group.plan, &group.os, &label)
                .await
            {
                Ok(id) => {
                    info!(group = %tag, node = %label, id = %id, "instance created");
                    group.nodes.push(Node::new(id, label));
                    self.store.commit_group(tag, &group)?;
                }
                Err(e) => {
                    warn!(group = %tag, node = %label, error = %e, "instance creation failed");
                    ok = false;
                }
            }
            if !self.pacing.is_zero() {
                sleep(self.pacing).await;
            }
        }

        if ok {
            self.converge(tag, false).await?;

            // reconcile the desired count with what actually exists, so a
            // later run can grow the group additively
            let state = self.store.load()?;
            let mut group = self.store_group(&state, tag)?;
            group.replicas = group.nodes.len() as u32;
            self.store.commit_group(tag, &group)?;
            info!(group = %tag, nodes = group.replicas, "group created");
        }

        Ok(ok)
    }

    /// Destroy every member of the group.
    ///
    /// A node is removed from the list (and the removal committed) only on
    /// confirmed destruction. An empty group is vacuous success with zero
    /// provider calls.
    pub async fn destroy_group(&self, tag: &str) -> Result<bool> {
        let state = self.store.load()?;
        let group = self.store_group(&state, tag)?;
        if group.nodes.is_empty() {
            return Ok(true);
        }

        let mut remaining = group.clone();
        let mut ok = true;
        for node in &group.nodes {
            match self.gateway.destroy_instance(&node.id).await {
                Ok(()) => {
                    info!(group = %tag, node = %node.label, id = %node.id, "instance destroyed");
                    remaining.nodes.retain(|n| n.id != node.id);
                    self.store.commit_group(tag, &remaining)?;
                }
                Err(e) => {
                    warn!(group = %tag, node = %node.label, error = %e, "instance destruction failed");
                    ok = false;
                }
            }
        }

        if ok {
            info!(group = %tag, "group destroyed");
        }
        Ok(ok)
    }

    /// Re-poll one group until it converges, optionally requiring private
    /// addresses too (used after enabling private networking).
    pub async fn refresh_addresses(&self, tag: &str, require_private: bool) -> Result<()> {
        self.converge(tag, require_private).await
    }

    /// Poll `list_addresses` for every node lacking an address, writing any
    /// newly assigned non-placeholder address back to the group, until the
    /// group converges or the polling bound is exhausted.
    async fn converge(&self, tag: &str, require_private: bool) -> Result<()> {
        for attempt in 1..=self.poll.max_attempts {
            let state = self.store.load()?;
            let mut group = self.store_group(&state, tag)?;
            if group.nodes.is_empty() {
                return Ok(());
            }

            let mut changed = false;
            for node in group.nodes.iter_mut() {
                let missing_public = node.public_ip.is_none();
                let missing_private = require_private && node.private_ip.is_none();
                if !missing_public && !missing_private {
                    continue;
                }
                match self.gateway.list_addresses(&node.id).await {
                    Ok(addrs) => {
                        if missing_public {
                            if let Some(ip) = addrs.public_ip {
                                info!(node = %node.label, ip = %ip, "public address assigned");
                                node.public_ip = Some(ip);
                                changed = true;
                            }
                        }
                        if missing_private {
                            if let Some(ip) = addrs.private_ip {
                                info!(node = %node.label, ip = %ip, "private address assigned");
                                node.private_ip = Some(ip);
                                changed = true;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(node = %node.label, error = %e, "address lookup failed");
                    }
                }
            }

            if changed {
                self.store.commit_group(tag, &group)?;
            }
            if group.converged(require_private) {
                debug!(group = %tag, attempts = attempt, "addresses converged");
                return Ok(());
            }
            debug!(group = %tag, attempt, "waiting for address assignment");
            sleep(self.poll.delay).await;
        }

        Err(Error::ConvergenceTimeout {
            group: tag.to_string(),
            attempts: self.poll.max_attempts,
        })
    }

    fn store_group(
        &self,
        state: &crate::config::ClusterState,
        tag: &str,
    ) -> Result<NodeGroupSpec> {
        state
            .group(tag)
            .ok_or_else(|| Error::config(format!("group [{tag}] is not configured")))
    }

    /// Smallest index >= `index` whose derived label is not already taken.
    /// Only matters when a partially failed batch left index gaps.
    fn free_label(
        &self,
        cluster_label: &str,
        tag: &str,
        mut index: usize,
        single: bool,
        group: &NodeGroupSpec,
    ) -> String {
        if single {
            return derive_label(cluster_label, tag, 0, true);
        }
        loop {
            let label = derive_label(cluster_label, tag, index, false);
            if !group.nodes.iter().any(|n| n.label == label) {
                return label;
            }
            index += 1;
        }
    }
}
