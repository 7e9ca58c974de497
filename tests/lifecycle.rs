//! End-to-end cluster lifecycle against an in-memory provider.
//!
//! Drives the real orchestrator, provisioner, store, and bootstrap protocol
//! with a simulated cloud: instances get placeholder addresses for a couple
//! of polling cycles before a real one appears, as the provider behaves in
//! practice.

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;

use armada::config::{ConfigStore, WORKER_TAG};
use armada::orchestrator::{ClusterOrchestrator, Confirmer, Prompt};
use armada::provider::{Addresses, ProviderGateway, SshKeyInfo};
use armada::provision::NodeProvisioner;
use armada::retry::RetryPolicy;
use armada::swarm::{CommandOutput, RemoteExecutor, SwarmBootstrap};

/// In-memory cloud: instances exist in a map, and an instance's address
/// becomes real only after it has been polled `polls_until_ip` times.
struct FakeCloud {
    next_id: AtomicU32,
    instances: Mutex<HashMap<String, u32>>, // id -> times polled
    polls_until_ip: u32,
}

impl FakeCloud {
    fn new(polls_until_ip: u32) -> Self {
        Self {
            next_id: AtomicU32::new(0),
            instances: Mutex::new(HashMap::new()),
            polls_until_ip,
        }
    }

    fn instance_count(&self) -> usize {
        self.instances.lock().unwrap().len()
    }
}

/// Local handle wrapping `Arc<FakeCloud>` so the trait impl below satisfies
/// the orphan rules from this integration test's own crate (implementing a
/// foreign trait for `Arc<Foreign>` is not allowed; a local newtype is).
#[derive(Clone)]
struct CloudHandle(Arc<FakeCloud>);

impl std::ops::Deref for CloudHandle {
    type Target = FakeCloud;
    fn deref(&self) -> &FakeCloud {
        &self.0
    }
}

#[async_trait]
impl ProviderGateway for CloudHandle {
    async fn create_instance(
        &self,
        _zone: &str,
        _plan: u32,
        _os: &str,
        _label: &str,
    ) -> armada::Result<String> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("{}", 576960 + n);
        self.instances.lock().unwrap().insert(id.clone(), 0);
        Ok(id)
    }

    async fn destroy_instance(&self, id: &str) -> armada::Result<()> {
        match self.instances.lock().unwrap().remove(id) {
            Some(_) => Ok(()),
            None => Err(armada::Error::provider(format!("no such instance {id}"))),
        }
    }

    async fn resize_instance(&self, _id: &str, _plan: u32) -> armada::Result<()> {
        Ok(())
    }

    async fn list_addresses(&self, id: &str) -> armada::Result<Addresses> {
        let mut instances = self.instances.lock().unwrap();
        let polls = instances
            .get_mut(id)
            .ok_or_else(|| armada::Error::provider(format!("no such instance {id}")))?;
        *polls += 1;
        if *polls <= self.polls_until_ip {
            // the provider reports the placeholder until the address exists
            Ok(Addresses::default())
        } else {
            let octet: u32 = id.parse::<u32>().unwrap_or(0) % 250;
            Ok(Addresses {
                public_ip: Some(format!("203.0.113.{octet}")),
                private_ip: None,
            })
        }
    }

    async fn create_ssh_key(&self, _name: &str, _public_key: &str) -> armada::Result<String> {
        Ok("KEY01".to_string())
    }

    async fn destroy_ssh_key(&self, _id: &str) -> armada::Result<()> {
        Ok(())
    }

    async fn list_ssh_keys(&self) -> armada::Result<Vec<SshKeyInfo>> {
        Ok(Vec::new())
    }

    async fn enable_private_network(&self, _id: &str) -> armada::Result<()> {
        Ok(())
    }
}

struct AlwaysYes;

#[async_trait]
impl Confirmer for AlwaysYes {
    async fn confirm(&self, _prompt: Prompt) -> bool {
        true
    }
}

/// Executor simulating healthy docker hosts.
struct FakeSwarmHosts {
    log: Mutex<Vec<(String, String)>>,
}

/// Local handle wrapping `Arc<FakeSwarmHosts>`; see [`CloudHandle`] for why
/// this indirection is needed instead of implementing directly on the `Arc`.
#[derive(Clone)]
struct HostsHandle(Arc<FakeSwarmHosts>);

impl std::ops::Deref for HostsHandle {
    type Target = FakeSwarmHosts;
    fn deref(&self) -> &FakeSwarmHosts {
        &self.0
    }
}

#[async_trait]
impl RemoteExecutor for HostsHandle {
    async fn run(&self, host: &str, command: &str) -> armada::Result<CommandOutput> {
        self.log
            .lock()
            .unwrap()
            .push((host.to_string(), command.to_string()));
        let stdout = if command.contains("join-token --quiet worker") {
            "SWMTKN-1-wwwww\n"
        } else if command.contains("join-token --quiet manager") {
            "SWMTKN-1-mmmmm\n"
        } else {
            ""
        };
        Ok(CommandOutput {
            success: true,
            stdout: stdout.to_string(),
            stderr: String::new(),
        })
    }
}

fn demo_config() -> (NamedTempFile, ConfigStore) {
    let doc = serde_json::json!({
        "label": "demo",
        "api-key": "SECRET",
        "ssh-key": "KEY01",
        "worker": {"zone": "NEW_JERSEY", "plan": 201, "os": "COREOS", "replicas": 3},
        "manager": {"zone": "NEW_JERSEY", "plan": 202, "os": "COREOS", "replicas": 1},
        "apps": [
            {"name": "blog", "contact": "ops@demo.io", "domain": "blog.demo.io", "port": 8000, "tls": true}
        ],
    })
    .to_string();
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(doc.as_bytes()).unwrap();
    let store = ConfigStore::open(file.path());
    (file, store)
}

fn build_orchestrator(
    store: &ConfigStore,
    cloud: CloudHandle,
) -> ClusterOrchestrator<CloudHandle, AlwaysYes> {
    let provisioner = NodeProvisioner::new(store.clone(), cloud)
        .with_pacing(Duration::ZERO)
        .with_poll_policy(RetryPolicy::new(20, Duration::from_millis(1)));
    ClusterOrchestrator::with_confirmer(provisioner, AlwaysYes)
}

#[tokio::test]
async fn full_lifecycle_create_bootstrap_destroy() {
    let (_file, store) = demo_config();
    let cloud = CloudHandle(Arc::new(FakeCloud::new(2)));
    let orch = build_orchestrator(&store, cloud.clone());

    // --- create ---
    assert!(!orch.exists().unwrap());
    let ok = orch.create().await.unwrap();
    assert!(ok);
    assert_eq!(cloud.instance_count(), 4);

    let state = store.load().unwrap();
    let worker_labels: Vec<&str> = state.worker.nodes.iter().map(|n| n.label.as_str()).collect();
    assert_eq!(worker_labels, ["demo-worker00", "demo-worker01", "demo-worker02"]);
    assert_eq!(state.manager.nodes[0].label, "demo-manager");
    assert!(state.worker.converged(false));
    assert!(state.manager.converged(false));
    assert_eq!(state.worker.replicas, 3);
    assert!(orch.exists().unwrap());

    // apps and credentials rode through every commit untouched
    assert_eq!(state.apps.len(), 1);
    assert_eq!(state.apps[0].domain, "blog.demo.io");
    assert_eq!(state.api_key, "SECRET");

    // --- bootstrap ---
    let hosts = HostsHandle(Arc::new(FakeSwarmHosts {
        log: Mutex::new(Vec::new()),
    }));
    let bootstrap = SwarmBootstrap::with_executor(hosts.clone());
    let ok = bootstrap.bootstrap(&state).await.unwrap();
    assert!(ok);

    let log = hosts.log.lock().unwrap();
    let primary = state.manager.nodes[0].public_ip.clone().unwrap();
    assert_eq!(log[0].0, primary, "init targets the primary manager");
    assert!(log[0].1.starts_with("docker swarm init"));
    let joins = log
        .iter()
        .filter(|(_, c)| c.starts_with("docker swarm join --token SWMTKN-1-wwwww"))
        .count();
    assert_eq!(joins, 3, "every worker joins with the worker token");
    drop(log);

    // --- destroy ---
    let ok = orch.destroy().await.unwrap();
    assert!(ok);
    assert_eq!(cloud.instance_count(), 0);

    let state = store.load().unwrap();
    assert!(state.worker.nodes.is_empty());
    assert!(state.manager.nodes.is_empty());
    assert!(!orch.exists().unwrap());
}

#[tokio::test]
async fn convergence_waits_out_the_placeholder_cycles() {
    let (_file, store) = demo_config();
    // four polls of placeholder before the address shows up
    let cloud = CloudHandle(Arc::new(FakeCloud::new(4)));
    let orch = build_orchestrator(&store, cloud);

    let ok = orch.create().await.unwrap();
    assert!(ok);

    let state = store.load().unwrap();
    for node in state.worker.nodes.iter().chain(state.manager.nodes.iter()) {
        let ip = node.public_ip.as_deref().expect("converged");
        assert_ne!(ip, "0.0.0.0");
    }
}

#[tokio::test]
async fn growth_after_create_extends_the_group() {
    let (_file, store) = demo_config();
    let cloud = CloudHandle(Arc::new(FakeCloud::new(0)));
    let orch = build_orchestrator(&store, cloud.clone());

    orch.create().await.unwrap();
    let ok = orch
        .provisioner()
        .create_group(WORKER_TAG, 2)
        .await
        .unwrap();
    assert!(ok);

    let state = store.load().unwrap();
    assert_eq!(state.worker.nodes.len(), 5);
    assert_eq!(state.worker.replicas, 5);
    assert_eq!(state.worker.nodes[4].label, "demo-worker04");
    assert_eq!(state.manager.nodes.len(), 1);
    assert_eq!(cloud.instance_count(), 6);
}
