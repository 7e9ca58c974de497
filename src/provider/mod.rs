//! Cloud provider abstraction layer
//!
//! This module provides a trait-based abstraction over the cloud API:
//! instance lifecycle, address lookup, SSH key lifecycle, and private
//! networking. The orchestration core only talks to [`ProviderGateway`];
//! [`VultrGateway`] is the one adapter shipped.
//!
//! Every operation returns a [`crate::Result`]: a non-success provider
//! response maps to [`crate::Error::Provider`] for that single operation and
//! is folded into the caller's batch aggregate rather than aborting it.

mod vultr;

pub use vultr::VultrGateway;

use async_trait::async_trait;

use crate::Result;

/// Addresses the provider reports for one instance.
///
/// Fields stay `None` until the provider assigns real addresses; the
/// all-zero placeholder is mapped to `None` by adapters, never surfaced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Addresses {
    /// Routable public address
    pub public_ip: Option<String>,
    /// Private-network address, if private networking is enabled
    pub private_ip: Option<String>,
}

/// One SSH key registered with the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshKeyInfo {
    /// Provider-assigned key id
    pub id: String,
    /// Human-readable key name
    pub name: String,
}

/// Request/response contract a cloud provider adapter must satisfy.
///
/// Symbolic `zone`/`os` identifiers are resolved to provider codes inside
/// the adapter (see [`crate::catalog`]); an unresolved symbol substitutes a
/// logged default instead of failing the batch.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Create an instance and return its provider-assigned id
    async fn create_instance(&self, zone: &str, plan: u32, os: &str, label: &str)
        -> Result<String>;

    /// Destroy an instance by id
    async fn destroy_instance(&self, id: &str) -> Result<()>;

    /// Move an instance to a different plan
    async fn resize_instance(&self, id: &str, plan: u32) -> Result<()>;

    /// Look up the addresses currently assigned to an instance
    async fn list_addresses(&self, id: &str) -> Result<Addresses>;

    /// Register an SSH public key and return its id
    async fn create_ssh_key(&self, name: &str, public_key: &str) -> Result<String>;

    /// Remove a registered SSH key
    async fn destroy_ssh_key(&self, id: &str) -> Result<()>;

    /// List registered SSH keys
    async fn list_ssh_keys(&self) -> Result<Vec<SshKeyInfo>>;

    /// Enable the private network interface on an instance
    async fn enable_private_network(&self, id: &str) -> Result<()>;
}
