//! Armada CLI - provision and bootstrap a Docker Swarm cluster on Vultr

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use armada::config::{ConfigStore, MANAGER_TAG, WORKER_TAG};
use armada::keys::{key_path, KeyManager};
use armada::orchestrator::ClusterOrchestrator;
use armada::provider::VultrGateway;
use armada::provision::NodeProvisioner;
use armada::swarm::SwarmBootstrap;
use armada::DEFAULT_CONFIG_FILE;

/// Armada - Docker Swarm clusters on Vultr
#[derive(Parser, Debug)]
#[command(name = "armada", version, about, long_about = None)]
struct Cli {
    /// Path of the cluster config document
    #[arg(short = 'f', long = "config", global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Cluster lifecycle: create, bootstrap, grow, destroy
    Cluster {
        #[command(subcommand)]
        cmd: ClusterCommands,
    },
    /// Single-node operations
    Node {
        #[command(subcommand)]
        cmd: NodeCommands,
    },
    /// SSH key management
    Keys {
        #[command(subcommand)]
        cmd: KeyCommands,
    },
    /// Dedicated load balancer node
    Loadbalancer {
        #[command(subcommand)]
        cmd: LoadbalancerCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ClusterCommands {
    /// Create the worker and manager groups described in the config
    Create,
    /// Bootstrap Docker Swarm across the created nodes
    Setup,
    /// Destroy every node in the cluster
    Destroy,
    /// Add workers to the cluster
    AddWorker(CountArgs),
    /// Add managers to the cluster
    AddManager(CountArgs),
    /// Enable private networking on every cluster node
    PrivateNet,
}

#[derive(Args, Debug)]
struct CountArgs {
    /// How many nodes to add
    #[arg(default_value_t = 1)]
    count: u32,
}

#[derive(Subcommand, Debug)]
enum NodeCommands {
    /// List the nodes recorded in the config
    List,
    /// Move a node to a different plan
    Resize(ResizeArgs),
    /// Destroy a node by instance id
    Delete(IdArgs),
}

#[derive(Args, Debug)]
struct ResizeArgs {
    /// Provider instance id
    #[arg(short, long)]
    id: String,
    /// Target plan code
    #[arg(short, long)]
    plan: u32,
}

#[derive(Args, Debug)]
struct IdArgs {
    /// Provider instance id
    #[arg(short, long)]
    id: String,
}

#[derive(Subcommand, Debug)]
enum KeyCommands {
    /// Generate a keypair and register it with the provider
    Create,
    /// List the keys registered at the provider
    Show,
    /// Unregister the cluster key
    Delete,
    /// Use an existing provider key id
    Register(KeyIdArgs),
}

#[derive(Args, Debug)]
struct KeyIdArgs {
    /// Provider key id
    id: String,
}

#[derive(Subcommand, Debug)]
enum LoadbalancerCommands {
    /// Create the load balancer node
    Create,
    /// Destroy the load balancer node
    Delete,
}

const LOADBALANCER_TAG: &str = "loadbalancer";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let store = ConfigStore::open(&cli.config);

    // every command starts from a validated document; a broken one is fatal
    // before any provider call
    let state = store.load()?;
    let gateway = VultrGateway::new(&state.api_key).with_ssh_key(&state.ssh_key);

    let outcome = match cli.command {
        Commands::Cluster { cmd } => run_cluster(cmd, &store, gateway).await?,
        Commands::Node { cmd } => run_node(cmd, &store, gateway).await?,
        Commands::Keys { cmd } => run_keys(cmd, &store, gateway).await?,
        Commands::Loadbalancer { cmd } => run_loadbalancer(cmd, &store, gateway).await?,
    };

    if !outcome {
        anyhow::bail!("operation completed with failures");
    }
    Ok(())
}

fn orchestrator(
    store: &ConfigStore,
    gateway: VultrGateway,
) -> ClusterOrchestrator<VultrGateway> {
    ClusterOrchestrator::new(NodeProvisioner::new(store.clone(), gateway))
}

async fn run_cluster(
    cmd: ClusterCommands,
    store: &ConfigStore,
    gateway: VultrGateway,
) -> anyhow::Result<bool> {
    let orch = orchestrator(store, gateway);
    let ok = match cmd {
        ClusterCommands::Create => orch.create().await?,
        ClusterCommands::Setup => {
            let state = store.load()?;
            let bootstrap = SwarmBootstrap::new(key_path(&state.label));
            bootstrap.bootstrap(&state).await?
        }
        ClusterCommands::Destroy => orch.destroy().await?,
        ClusterCommands::AddWorker(args) => {
            orch.provisioner().create_group(WORKER_TAG, args.count).await?
        }
        ClusterCommands::AddManager(args) => {
            orch.provisioner().create_group(MANAGER_TAG, args.count).await?
        }
        ClusterCommands::PrivateNet => orch.enable_private_network().await?,
    };
    Ok(ok)
}

async fn run_node(
    cmd: NodeCommands,
    store: &ConfigStore,
    gateway: VultrGateway,
) -> anyhow::Result<bool> {
    let orch = orchestrator(store, gateway);
    let ok = match cmd {
        NodeCommands::List => {
            let state = store.load()?;
            println!(
                "{:<10} {:<20} {:<16} {:<16}",
                "ID", "LABEL", "PUBLIC", "PRIVATE"
            );
            for tag in [WORKER_TAG, MANAGER_TAG] {
                if let Some(group) = state.group(tag) {
                    for n in &group.nodes {
                        println!(
                            "{:<10} {:<20} {:<16} {:<16}",
                            n.id,
                            n.label,
                            n.public_ip.as_deref().unwrap_or("-"),
                            n.private_ip.as_deref().unwrap_or("-"),
                        );
                    }
                }
            }
            true
        }
        NodeCommands::Resize(args) => {
            orch.resize_node(&args.id, args.plan).await?;
            true
        }
        NodeCommands::Delete(args) => orch.remove_node(&args.id).await?,
    };
    Ok(ok)
}

async fn run_keys(
    cmd: KeyCommands,
    store: &ConfigStore,
    gateway: VultrGateway,
) -> anyhow::Result<bool> {
    let keys = KeyManager::new(store.clone(), gateway);
    let ok = match cmd {
        KeyCommands::Create => {
            keys.generate_and_register().await?;
            true
        }
        KeyCommands::Show => {
            let registered = keys.list().await?;
            if registered.is_empty() {
                println!("no keys registered at the provider");
            } else {
                println!("{:<12} {}", "ID", "NAME");
                for key in registered {
                    println!("{:<12} {}", key.id, key.name);
                }
            }
            true
        }
        KeyCommands::Delete => keys.destroy().await?,
        KeyCommands::Register(args) => {
            keys.register(&args.id)?;
            true
        }
    };
    Ok(ok)
}

async fn run_loadbalancer(
    cmd: LoadbalancerCommands,
    store: &ConfigStore,
    gateway: VultrGateway,
) -> anyhow::Result<bool> {
    let orch = orchestrator(store, gateway);
    let ok = match cmd {
        LoadbalancerCommands::Create => orch.add_singleton(LOADBALANCER_TAG).await?,
        LoadbalancerCommands::Delete => orch.remove_singleton(LOADBALANCER_TAG).await?,
    };
    Ok(ok)
}
