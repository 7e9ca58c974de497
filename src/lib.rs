//! Armada - Docker Swarm cluster provisioning on Vultr
//!
//! Armada turns a JSON description of a cluster (`swarm.json`) into a set of
//! cloud instances and bootstraps Docker Swarm across them. The persisted
//! document is the sole source of truth: every instance creation is committed
//! back to it immediately, so a crashed run can be resumed.
//!
//! # Flow
//!
//! 1. [`config::ConfigStore`] loads and validates the cluster document
//! 2. [`orchestrator::ClusterOrchestrator`] drives whole-cluster operations
//! 3. [`provision::NodeProvisioner`] creates node groups and polls until
//!    every node has a routable address
//! 4. [`swarm::SwarmBootstrap`] initializes the primary manager, derives
//!    join tokens, and joins the remaining managers and workers
//!
//! # Modules
//!
//! - [`config`] - Persisted cluster state and the single-key commit store
//! - [`catalog`] - Symbolic zone/OS identifiers and their provider codes
//! - [`provider`] - Cloud provider gateway trait and the Vultr adapter
//! - [`provision`] - Node group creation, destruction, address convergence
//! - [`orchestrator`] - Cluster lifecycle, singleton nodes, confirmations
//! - [`swarm`] - Join-token bootstrap over a remote executor
//! - [`keys`] - SSH key generation and provider registration
//! - [`retry`] - Bounded polling policy
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod keys;
pub mod orchestrator;
pub mod provider;
pub mod provision;
pub mod retry;
pub mod swarm;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Default path of the persisted cluster document
pub const DEFAULT_CONFIG_FILE: &str = "swarm.json";

/// Address reported by the provider before a real one is assigned.
/// Never accepted as a valid node address.
pub const PLACEHOLDER_ADDR: &str = "0.0.0.0";

/// Port the swarm primary manager listens on for joins
pub const SWARM_PORT: u16 = 2377;

/// Pause between consecutive instance-creation requests, to stay under the
/// provider's request-rate limits
pub const CREATE_PACING: std::time::Duration = std::time::Duration::from_secs(2);
