//! Node orchestration: bootstrap, startup order and shutdown.

use crate::blockchain::ChainState;
use crate::config::Config;
use crate::error::{ChainError, Result};
use crate::metrics::NodeMetrics;
use crate::miner::Miner;
use crate::network::NetworkNode;
use crate::persistence::{open_backend, GenesisConfig, Persistence};
use chrono::Utc;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeState {
    Booting,
    Ready,
    Stopping,
}

/// Addresses actually bound by [`Node::start`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundAddrs {
    pub p2p: Option<SocketAddr>,
    pub rpc: Option<SocketAddr>,
}

pub struct Node {
    pub config: Config,
    pub chain: Arc<ChainState>,
    pub network: Arc<NetworkNode>,
    pub metrics: Arc<NodeMetrics>,
    pub state: Arc<RwLock<NodeState>>,
    shutdown: CancellationToken,
}

/// Genesis time recorded in `store`, writing `override_time` (or `now`) on
/// first start. A stored value always wins.
pub fn bootstrap_genesis_time(
    store: &dyn Persistence,
    override_time: Option<i64>,
    now: i64,
) -> Result<i64> {
    if let Some(config) = store.load_genesis_config()? {
        if let Some(requested) = override_time.filter(|t| *t != config.genesis_time) {
            warn!(
                "ignoring genesis time {}: data directory already uses {}",
                requested, config.genesis_time
            );
        }
        return Ok(config.genesis_time);
    }

    let config = GenesisConfig { genesis_time: override_time.unwrap_or(now) };
    store.save_genesis_config(&config)?;
    info!("recorded genesis time {}", config.genesis_time);
    Ok(config.genesis_time)
}

impl Node {
    /// Open the data directory and chain. Any failure here is fatal.
    pub fn init(config: Config) -> Result<Self> {
        config.validate()?;
        let data_dir = Path::new(&config.node.data_dir);
        fs::create_dir_all(data_dir).map_err(|e| {
            ChainError::IoError(format!("create data dir {}: {}", data_dir.display(), e))
        })?;

        let store = open_backend(config.storage.backend, data_dir)?;
        let genesis_time =
            bootstrap_genesis_time(store.as_ref(), config.genesis_override(), Utc::now().timestamp())?;
        let chain = Arc::new(ChainState::open(store, genesis_time, &config.node.extra_data)?);

        let shutdown = CancellationToken::new();
        let network = Arc::new(NetworkNode::with_shutdown(chain.clone(), shutdown.child_token()));

        NodeMetrics::init();
        let metrics = Arc::new(NodeMetrics::new());
        Ok(Self {
            config,
            chain,
            network,
            metrics,
            state: Arc::new(RwLock::new(NodeState::Booting)),
            shutdown,
        })
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Bind listeners, then start gossip, the miner and the query surface.
    pub async fn start(&self) -> Result<BoundAddrs> {
        self.start_head_tracker();
        let head = self.chain.current_head().await;
        self.metrics.set_head_sequence(head.header.sequence);

        // Both listeners are bound before gossip, mining or the API start.
        let rpc_listener = match self.config.network.rpc_listen.trim() {
            "" => None,
            addr => Some(tokio::net::TcpListener::bind(addr).await.map_err(|e| {
                ChainError::NetworkError(format!("rpc listen {}: {}", addr, e))
            })?),
        };
        let p2p = self
            .network
            .start(&self.config.network.p2p_listen, &self.config.network.bootstrap_peers)
            .await?;

        let miner = Miner::new(
            self.chain.clone(),
            self.config.miner.interval()?,
            self.config.node.extra_data.clone(),
            self.metrics.clone(),
            self.shutdown.child_token(),
        );
        miner.start();

        let rpc = match rpc_listener {
            Some(listener) => Some(self.start_api(listener)?),
            None => None,
        };

        *self.state.write().await = NodeState::Ready;
        info!("node ready head sequence={} hash={}", head.header.sequence, head.hash);
        Ok(BoundAddrs { p2p, rpc })
    }

    /// Mirror every new head into the metrics, whatever produced it.
    fn start_head_tracker(&self) -> JoinHandle<()> {
        let chain = self.chain.clone();
        let metrics = self.metrics.clone();
        let shutdown = self.shutdown.child_token();
        let mut events = chain.subscribe();
        tokio::spawn(async move {
            loop {
                let sequence = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(block) => block.header.sequence,
                        Err(RecvError::Lagged(_)) => chain.current_head().await.header.sequence,
                        Err(RecvError::Closed) => break,
                    },
                };
                metrics.set_head_sequence(sequence);
            }
        })
    }

    #[cfg(feature = "api")]
    fn start_api(&self, listener: tokio::net::TcpListener) -> Result<SocketAddr> {
        let addr = listener.local_addr()?;
        let state = crate::api::ApiState::new(
            self.network.clone(),
            self.metrics.clone(),
            Some(self.state.clone()),
        );
        let shutdown = self.shutdown.child_token();
        tokio::spawn(async move {
            if let Err(e) = crate::api::run_api_server(state, listener, shutdown).await {
                error!("API server failed: {}", e);
            }
        });
        Ok(addr)
    }

    #[cfg(not(feature = "api"))]
    fn start_api(&self, listener: tokio::net::TcpListener) -> Result<SocketAddr> {
        let addr = listener.local_addr()?;
        warn!("rpc_listen {} set but this build has no API support", addr);
        Ok(addr)
    }

    /// Start the node and run until ctrl-c or [`Node::shutdown`].
    pub async fn run(&self) -> Result<()> {
        self.start().await?;

        let mut status = tokio::time::interval(STATUS_LOG_INTERVAL);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                signal = tokio::signal::ctrl_c() => {
                    if let Err(e) = signal {
                        error!("cannot listen for ctrl-c: {}", e);
                    }
                    info!("shutdown requested");
                    break;
                }
                _ = status.tick() => {
                    let head = self.chain.current_head().await;
                    info!(
                        "node running head sequence={} peers={}",
                        head.header.sequence,
                        self.network.peers().len().await
                    );
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    pub async fn shutdown(&self) {
        *self.state.write().await = NodeState::Stopping;
        self.shutdown.cancel();
        self.metrics.report();
    }
}
