use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use distributed_cache::cache::{CacheNode, HttpPeerPool, handlers};
use distributed_cache::config::{self, NodeConfig, RegistryConfig};
use distributed_cache::registry::{self, Registry, RegistryClient};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "distributed_cache", about = "Distributed in-memory key/value cache")]
struct Cli {
    /// Maximum log level (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a cache node.
    Node(NodeArgs),
    /// Run the membership registry.
    Registry(RegistryArgs),
}

#[derive(Debug, Args)]
struct NodeArgs {
    #[arg(long, default_value = "127.0.0.1:8100")]
    bind: SocketAddr,

    /// Base URL peers and the registry use to reach this node. Defaults to http://<bind>.
    #[arg(long)]
    advertise: Option<String>,

    #[arg(long, default_value_t = config::DEFAULT_CACHE_BYTES)]
    cache_bytes: usize,

    /// Registry base URL, e.g. http://127.0.0.1:8088.
    #[arg(long)]
    registry: Option<String>,

    /// Static peer base URLs, used when no registry is given.
    #[arg(long, value_delimiter = ',')]
    peers: Vec<String>,

    #[arg(long, default_value_t = config::DEFAULT_PEER_REPLICAS)]
    peer_replicas: usize,

    #[arg(long, default_value_t = config::DEFAULT_PEER_TIMEOUT.as_millis() as u64)]
    peer_timeout_ms: u64,

    #[arg(long, default_value_t = config::DEFAULT_PEER_SYNC_INTERVAL.as_millis() as u64)]
    peer_sync_ms: u64,
}

#[derive(Debug, Args)]
struct RegistryArgs {
    #[arg(long, default_value = "127.0.0.1:8088")]
    bind: SocketAddr,

    #[arg(long, default_value_t = config::DEFAULT_HEARTBEAT_INTERVAL.as_millis() as u64)]
    heartbeat_ms: u64,

    #[arg(long, default_value_t = config::DEFAULT_PROBE_TIMEOUT.as_millis() as u64)]
    probe_timeout_ms: u64,

    #[arg(long, default_value_t = config::DEFAULT_FAILURE_THRESHOLD)]
    failure_threshold: u32,
}

impl From<NodeArgs> for NodeConfig {
    fn from(args: NodeArgs) -> Self {
        let mut config = NodeConfig::new(args.bind);
        if let Some(advertise) = args.advertise {
            config.advertise = advertise.trim_end_matches('/').to_string();
        }
        config.cache_bytes = args.cache_bytes;
        config.registry = args.registry;
        config.peer_replicas = args.peer_replicas;
        config.peer_timeout = Duration::from_millis(args.peer_timeout_ms);
        config.peer_sync_interval = Duration::from_millis(args.peer_sync_ms);
        config
    }
}

impl From<&RegistryArgs> for RegistryConfig {
    fn from(args: &RegistryArgs) -> Self {
        RegistryConfig {
            heartbeat_interval: Duration::from_millis(args.heartbeat_ms),
            probe_timeout: Duration::from_millis(args.probe_timeout_ms),
            failure_threshold: args.failure_threshold,
            ..RegistryConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .init();

    match cli.command {
        Command::Node(args) => run_node(args).await,
        Command::Registry(args) => run_registry(args).await,
    }
}

async fn run_node(args: NodeArgs) -> anyhow::Result<()> {
    let static_peers = args.peers.clone();
    let config = NodeConfig::from(args);

    tracing::info!(
        "Starting cache node {} ({} bytes)",
        config.advertise,
        config.cache_bytes
    );

    let node = CacheNode::with_peer_timeout(
        &config.advertise,
        config.cache_bytes,
        None,
        config.peer_timeout,
    );

    let pool = Arc::new(HttpPeerPool::new(
        &config.advertise,
        config.peer_replicas,
        config.peer_timeout,
    ));
    node.register_peer_picker(pool.clone())?;

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    if let Some(registry_url) = &config.registry {
        let client = RegistryClient::new(registry_url);
        pool.set_peers(&[config.advertise.as_str()]);

        // Registered after binding so the registry's heartbeats can reach us.
        client.register(&config.advertise).await?;
        tokio::spawn(client.sync_peers(pool.clone(), config.peer_sync_interval));
    } else {
        let mut peers = static_peers;
        peers.push(config.advertise.clone());
        pool.set_peers(&peers);
    }

    tracing::info!("HTTP server listening on {}", config.bind);
    axum::serve(listener, handlers::router(node)).await?;

    Ok(())
}

async fn run_registry(args: RegistryArgs) -> anyhow::Result<()> {
    let registry = Registry::new(RegistryConfig::from(&args));
    registry.start();

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;

    tracing::info!("Registry listening on {}", args.bind);
    axum::serve(listener, registry::handlers::router(registry)).await?;

    Ok(())
}
