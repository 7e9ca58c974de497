//! Persisted cluster state.
//!
//! The whole cluster lives in one JSON document (`swarm.json` by default).
//! [`ConfigStore::load`] validates it once at the start of a command and
//! every mutation goes through [`ConfigStore::commit`], which replaces a
//! single top-level key and rewrites the document. Keys unknown to this
//! schema pass through commits untouched, so older or richer documents keep
//! working.
//!
//! Commits are not transactional across keys: callers needing multi-key
//! consistency sequence individual commits and tolerate a torn document if
//! interrupted mid-sequence. Two processes must not drive the same document
//! concurrently; interleaved read-modify-write cycles would lose updates.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::{catalog, Error, Result};

/// Tag of the horizontally scaled worker group
pub const WORKER_TAG: &str = "worker";

/// Tag of the horizontally scaled manager group
pub const MANAGER_TAG: &str = "manager";

/// Document key holding the registered SSH key id
pub const SSH_KEY_KEY: &str = "ssh-key";

/// Document key holding the provider API credential
pub const API_KEY_KEY: &str = "api-key";

/// Current schema version written by this binary
pub const SCHEMA_VERSION: u32 = 1;

/// One provisioned instance inside a node group.
///
/// `id` is assigned by the provider exactly once, at creation, and is the
/// join key for every later lookup (destroy, resize, address registration).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Provider-assigned instance identifier
    pub id: String,
    /// Derived name, unique within the group
    pub label: String,
    /// Routable public address; absent until the provider assigns one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
    /// Private-network address; present only when private networking is on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_ip: Option<String>,
}

impl Node {
    /// Create a freshly provisioned node with no addresses yet
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            public_ip: None,
            private_ip: None,
        }
    }
}

/// Desired and observed shape of one node group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeGroupSpec {
    /// Symbolic zone identifier, resolved through [`crate::catalog`]
    #[serde(default = "default_zone")]
    pub zone: String,
    /// Provider plan code (memory/CPU tier)
    #[serde(default = "default_plan")]
    pub plan: u32,
    /// Symbolic OS identifier, resolved through [`crate::catalog`]
    #[serde(default = "default_os")]
    pub os: String,
    /// Desired replica count; reconciled to the actual node count after a
    /// successful create
    #[serde(default = "default_replicas")]
    pub replicas: u32,
    /// Provisioned members, in creation order
    #[serde(default)]
    pub nodes: Vec<Node>,
}

fn default_zone() -> String {
    catalog::DEFAULT_ZONE.to_string()
}

fn default_plan() -> u32 {
    201
}

fn default_os() -> String {
    catalog::DEFAULT_OS.to_string()
}

fn default_replicas() -> u32 {
    1
}

impl Default for NodeGroupSpec {
    fn default() -> Self {
        Self {
            zone: default_zone(),
            plan: default_plan(),
            os: default_os(),
            replicas: default_replicas(),
            nodes: Vec::new(),
        }
    }
}

impl NodeGroupSpec {
    /// Whether every member has a public address (and a private one too when
    /// `require_private` is set). An empty group has not converged.
    pub fn converged(&self, require_private: bool) -> bool {
        !self.nodes.is_empty()
            && self.nodes.iter().all(|n| {
                n.public_ip.is_some() && (!require_private || n.private_ip.is_some())
            })
    }
}

/// An application registered for deployment onto the cluster.
///
/// Stored and round-tripped here; deployment collaborators consume it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSpec {
    /// Application name (slug)
    pub name: String,
    /// Contact address of the owner
    pub contact: String,
    /// Domain the app is served under
    pub domain: String,
    /// Port the app's service listens on
    pub port: u16,
    /// Whether the app is served over TLS
    #[serde(default)]
    pub tls: bool,
}

/// The validated cluster document.
///
/// Loaded fresh at the start of every orchestrator invocation and threaded
/// explicitly through the components; nothing reads it from globals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterState {
    /// Cluster name, used to derive node labels
    pub label: String,
    /// Provider API credential reference
    #[serde(rename = "api-key")]
    pub api_key: String,
    /// Registered SSH key id; empty means no key registered yet
    #[serde(rename = "ssh-key")]
    pub ssh_key: String,
    /// Worker group
    pub worker: NodeGroupSpec,
    /// Manager group
    pub manager: NodeGroupSpec,
    /// Registered applications
    #[serde(default)]
    pub apps: Vec<AppSpec>,
    /// Schema version of the document
    #[serde(default = "default_version")]
    pub version: u32,
    /// Singleton groups (e.g. `loadbalancer`) and any keys unknown to this
    /// schema, preserved verbatim across commits
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

fn default_version() -> u32 {
    SCHEMA_VERSION
}

impl ClusterState {
    /// Look up a group by tag. `worker` and `manager` are typed fields;
    /// singleton tags deserialize out of the passthrough overlay.
    pub fn group(&self, tag: &str) -> Option<NodeGroupSpec> {
        match tag {
            WORKER_TAG => Some(self.worker.clone()),
            MANAGER_TAG => Some(self.manager.clone()),
            _ => self
                .extra
                .get(tag)
                .and_then(|v| serde_json::from_value(v.clone()).ok()),
        }
    }

    /// Whether any replica group has at least one node
    pub fn has_any_nodes(&self) -> bool {
        !self.worker.nodes.is_empty() || !self.manager.nodes.is_empty()
    }

    /// A cluster exists only when both the worker and the manager group are
    /// populated; a half-provisioned document does not count.
    pub fn exists_cluster(&self) -> bool {
        !self.worker.nodes.is_empty() && !self.manager.nodes.is_empty()
    }
}

/// Durable store for the cluster document.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Create a store over the given document path
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the persisted document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate the document.
    ///
    /// Fatal on a missing/unparseable file or when a required key
    /// (`label`, `api-key`, `ssh-key`, `worker`, `manager`) is absent.
    /// A legacy `workers` group key is migrated to `worker` and the
    /// migrated document written back.
    pub fn load(&self) -> Result<ClusterState> {
        let mut doc = self.read_document()?;
        let obj = doc
            .as_object_mut()
            .ok_or_else(|| Error::config(format!("{} must hold a JSON object", self.display())))?;

        if !obj.contains_key(WORKER_TAG) {
            if let Some(legacy) = obj.remove("workers") {
                info!(path = %self.display(), "migrating legacy [workers] group to [worker]");
                obj.insert(WORKER_TAG.to_string(), legacy);
                let pretty = serde_json::to_string_pretty(&doc)?;
                std::fs::write(&self.path, pretty)?;
            }
        }

        let obj = doc
            .as_object()
            .ok_or_else(|| Error::config(format!("{} must hold a JSON object", self.display())))?;
        for key in ["label", API_KEY_KEY, SSH_KEY_KEY, WORKER_TAG, MANAGER_TAG] {
            if !obj.contains_key(key) {
                return Err(Error::config(format!(
                    "{} must contain the `{}` attribute",
                    self.display(),
                    key
                )));
            }
        }

        serde_json::from_value(doc)
            .map_err(|e| Error::config(format!("invalid {}: {}", self.display(), e)))
    }

    /// Replace one top-level key and rewrite the document, leaving every
    /// other key untouched.
    pub fn commit(&self, key: &str, value: Value) -> Result<()> {
        let mut doc = self.read_document()?;
        let obj = doc
            .as_object_mut()
            .ok_or_else(|| Error::config(format!("{} must hold a JSON object", self.display())))?;
        obj.insert(key.to_string(), value);
        let pretty = serde_json::to_string_pretty(&doc)?;
        std::fs::write(&self.path, pretty)?;
        Ok(())
    }

    /// Commit one node group under its tag
    pub fn commit_group(&self, tag: &str, group: &NodeGroupSpec) -> Result<()> {
        self.commit(tag, serde_json::to_value(group)?)
    }

    /// Commit the registered SSH key id (empty string unregisters)
    pub fn commit_ssh_key(&self, id: &str) -> Result<()> {
        self.commit(SSH_KEY_KEY, Value::String(id.to_string()))
    }

    fn read_document(&self) -> Result<Value> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::config(format!("a valid {} file is required: {}", self.display(), e))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::config(format!("cannot parse {}: {}", self.display(), e)))
    }

    fn display(&self) -> std::path::Display<'_> {
        self.path.display()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn store_with(contents: &str) -> (NamedTempFile, ConfigStore) {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        let store = ConfigStore::open(file.path());
        (file, store)
    }

    fn minimal_doc() -> String {
        serde_json::json!({
            "label": "demo",
            "api-key": "SECRET",
            "ssh-key": "",
            "worker": {"zone": "NEW_JERSEY", "plan": 201, "os": "COREOS", "replicas": 3},
            "manager": {"zone": "NEW_JERSEY", "plan": 202, "os": "COREOS", "replicas": 1},
        })
        .to_string()
    }

    #[test]
    fn load_validates_required_keys() {
        let (_file, store) = store_with(&minimal_doc());
        let state = store.load().unwrap();
        assert_eq!(state.label, "demo");
        assert_eq!(state.worker.replicas, 3);
        assert_eq!(state.manager.plan, 202);
        assert!(state.ssh_key.is_empty());
    }

    #[test]
    fn load_rejects_missing_group() {
        let doc = serde_json::json!({
            "label": "demo",
            "api-key": "SECRET",
            "ssh-key": "",
            "worker": {},
        })
        .to_string();
        let (_file, store) = store_with(&doc);
        let err = store.load().unwrap_err();
        assert!(err.to_string().contains("`manager`"));
    }

    #[test]
    fn load_rejects_unparseable_document() {
        let (_file, store) = store_with("not json {");
        assert!(matches!(store.load(), Err(Error::Config(_))));
    }

    #[test]
    fn commit_round_trips_one_key_and_preserves_the_rest() {
        let doc = serde_json::json!({
            "label": "demo",
            "api-key": "SECRET",
            "ssh-key": "KEY01",
            "worker": {"replicas": 2},
            "manager": {"replicas": 1},
            "some-future-key": {"nested": [1, 2, 3]},
        })
        .to_string();
        let (_file, store) = store_with(&doc);

        let group = NodeGroupSpec {
            zone: "LONDON".to_string(),
            plan: 203,
            os: "UBUNTU_16_04".to_string(),
            replicas: 2,
            nodes: vec![Node::new("576965", "demo-worker00")],
        };
        store.commit_group(WORKER_TAG, &group).unwrap();

        let state = store.load().unwrap();
        assert_eq!(state.worker, group);
        // untouched keys survive, including ones this schema doesn't know
        assert_eq!(state.ssh_key, "KEY01");
        assert_eq!(
            state.extra.get("some-future-key"),
            Some(&serde_json::json!({"nested": [1, 2, 3]}))
        );
    }

    #[test]
    fn legacy_workers_key_migrates_to_worker() {
        let doc = serde_json::json!({
            "label": "old",
            "api-key": "SECRET",
            "ssh-key": "",
            "workers": {"zone": "DALLAS", "plan": 201, "replicas": 4},
            "manager": {"replicas": 1},
        })
        .to_string();
        let (_file, store) = store_with(&doc);

        let state = store.load().unwrap();
        assert_eq!(state.worker.zone, "DALLAS");
        assert_eq!(state.worker.replicas, 4);

        // the migration is persisted: a reload sees the new key directly
        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.worker.zone, "DALLAS");
        assert!(!reloaded.extra.contains_key("workers"));
    }

    #[test]
    fn singleton_groups_deserialize_from_the_overlay() {
        let doc = serde_json::json!({
            "label": "demo",
            "api-key": "SECRET",
            "ssh-key": "KEY01",
            "worker": {"replicas": 1},
            "manager": {"replicas": 1},
            "loadbalancer": {
                "zone": "SILICON_VALLEY", "plan": 201, "os": "UBUNTU_16_04",
                "replicas": 1,
                "nodes": [{"id": "42", "label": "demo-loadbalancer", "publicIp": "203.0.113.9"}]
            },
        })
        .to_string();
        let (_file, store) = store_with(&doc);

        let state = store.load().unwrap();
        let lb = state.group("loadbalancer").unwrap();
        assert_eq!(lb.nodes.len(), 1);
        assert_eq!(lb.nodes[0].public_ip.as_deref(), Some("203.0.113.9"));
        assert!(state.group("nonexistent").is_none());
    }

    #[test]
    fn exists_cluster_requires_both_groups_populated() {
        let mut state: ClusterState =
            serde_json::from_str(&minimal_doc()).expect("minimal doc parses");
        assert!(!state.exists_cluster());

        state.worker.nodes.push(Node::new("1", "demo-worker00"));
        assert!(!state.exists_cluster());
        assert!(state.has_any_nodes());

        state.manager.nodes.push(Node::new("2", "demo-manager"));
        assert!(state.exists_cluster());
    }

    #[test]
    fn converged_excludes_empty_groups_and_missing_addresses() {
        let mut group = NodeGroupSpec::default();
        assert!(!group.converged(false));

        group.nodes.push(Node::new("1", "a"));
        group.nodes.push(Node::new("2", "b"));
        assert!(!group.converged(false));

        group.nodes[0].public_ip = Some("203.0.113.1".to_string());
        assert!(!group.converged(false));

        group.nodes[1].public_ip = Some("203.0.113.2".to_string());
        assert!(group.converged(false));
        assert!(!group.converged(true));

        group.nodes[0].private_ip = Some("10.0.0.1".to_string());
        group.nodes[1].private_ip = Some("10.0.0.2".to_string());
        assert!(group.converged(true));
    }
}
