#![forbid(unsafe_code)]
//! Timechain node: mines, gossips and serves the read-only query surface.

use clap::Parser;
use std::path::PathBuf;
use timechain::config::{load_config, Config, StorageBackend};
use timechain::node::Node;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "timechain-node", version, about = "Timechain replicated ledger node")]
struct Cli {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Data directory
    #[arg(long)]
    datadir: Option<String>,
    /// Genesis unix time; 0 means now. Ignored once the data directory has one.
    #[arg(long)]
    genesis: Option<i64>,
    /// Mining interval such as 2s or 500ms; 0 disables mining
    #[arg(long)]
    interval: Option<String>,
    /// P2P listen address; empty disables inbound connections
    #[arg(long = "p2p-listen")]
    p2p_listen: Option<String>,
    /// Comma separated bootstrap peers (host:port)
    #[arg(long, value_delimiter = ',')]
    peers: Option<Vec<String>>,
    /// Query surface listen address; empty disables it
    #[arg(long = "rpc-listen")]
    rpc_listen: Option<String>,
    /// extraData written into mined headers
    #[arg(long)]
    extra: Option<String>,
    /// Storage backend
    #[arg(long, value_enum)]
    storage: Option<StorageBackend>,
}

impl Cli {
    fn apply(self, mut config: Config) -> Config {
        if let Some(datadir) = self.datadir {
            config.node.data_dir = datadir;
        }
        if let Some(genesis) = self.genesis {
            config.node.genesis_time = Some(genesis);
        }
        if let Some(interval) = self.interval {
            config.miner.interval = interval;
        }
        if let Some(listen) = self.p2p_listen {
            config.network.p2p_listen = listen;
        }
        if let Some(peers) = self.peers {
            config.network.bootstrap_peers = peers
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
        }
        if let Some(listen) = self.rpc_listen {
            config.network.rpc_listen = listen;
        }
        if let Some(extra) = self.extra {
            config.node.extra_data = extra;
        }
        if let Some(storage) = self.storage {
            config.storage.backend = storage;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let config = cli.apply(config);

    info!(
        "starting timechain node data_dir={} storage={:?}",
        config.node.data_dir, config.storage.backend
    );
    let node = Node::init(config)?;
    node.run().await?;
    info!("node stopped");
    Ok(())
}
