//! Peer-to-peer gossip for Timechain
//!
//! Peers speak newline-delimited JSON over TCP (see [`wire`]). On connect
//! each side announces its head; an announcement of a higher sequence is
//! answered with a block request, and every block that becomes head is
//! announced to all connected peers.

pub mod peers;
pub mod wire;

use crate::blockchain::{Block, ChainState};
use crate::error::{ChainError, Result};
use crate::persistence::Persistence;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{AnyDelimiterCodec, FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use peers::{Direction, PeerHandle, PeerInfo, PeerRegistry};
pub use wire::{Message, MessageType, WireRecord};

/// Delay between failed dial attempts to a bootstrap peer.
pub const DIAL_RETRY_DELAY: Duration = Duration::from_secs(2);
/// Longest accepted line; longer records are a framing error.
pub const MAX_RECORD_LEN: usize = 4 * 1024 * 1024;
/// Record separator on the wire.
pub const RECORD_DELIMITER: u8 = b'\n';
/// Messages buffered per peer before new ones are dropped.
pub const OUTBOUND_QUEUE: usize = 256;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);
const WRITER_DRAIN: Duration = Duration::from_secs(1);

pub struct NetworkNode {
    chain: Arc<ChainState>,
    peers: PeerRegistry,
    shutdown: CancellationToken,
}

impl NetworkNode {
    pub fn new(chain: Arc<ChainState>) -> Self {
        Self::with_shutdown(chain, CancellationToken::new())
    }

    /// Stop every task of this node once `shutdown` is cancelled.
    pub fn with_shutdown(chain: Arc<ChainState>, shutdown: CancellationToken) -> Self {
        Self { chain, peers: PeerRegistry::new(), shutdown }
    }

    pub fn chain(&self) -> &Arc<ChainState> {
        &self.chain
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    pub async fn list_peers(&self) -> Vec<PeerInfo> {
        self.peers.list().await
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Start the relay, optionally listen on `listen`, and dial every seed.
    /// Returns the bound listen address.
    pub async fn start(self: &Arc<Self>, listen: &str, seeds: &[String]) -> Result<Option<SocketAddr>> {
        self.start_relay();
        let bound = if listen.trim().is_empty() {
            None
        } else {
            Some(self.start_server(listen).await?)
        };
        for seed in seeds.iter().filter(|s| !s.trim().is_empty()) {
            self.connect_peer(seed.trim().to_string());
        }
        Ok(bound)
    }

    /// Bind `addr` and accept connections in the background.
    pub async fn start_server(self: &Arc<Self>, addr: &str) -> Result<SocketAddr> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ChainError::NetworkError(format!("p2p listen {}: {}", addr, e)))?;
        let local = listener.local_addr()?;
        info!("P2P listening on {}", local);

        let node = self.clone();
        tokio::spawn(async move { node.accept_loop(listener).await });
        Ok(local)
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, remote)) => {
                    debug!("inbound connection from {}", remote);
                    let node = self.clone();
                    tokio::spawn(async move {
                        node.handle_connection(stream, remote, Direction::Inbound).await
                    });
                }
                Err(e) => {
                    warn!("accept failed: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
        debug!("P2P listener stopped");
    }

    /// Dial `addr` in the background until it answers. A connection that
    /// later drops is not re-dialled.
    pub fn connect_peer(self: &Arc<Self>, addr: String) -> JoinHandle<()> {
        let node = self.clone();
        tokio::spawn(async move { node.dial_loop(addr).await })
    }

    async fn dial_loop(self: Arc<Self>, addr: String) {
        loop {
            let attempt = tokio::select! {
                _ = self.shutdown.cancelled() => return,
                attempt = TcpStream::connect(&addr) => attempt,
            };
            let failure = match attempt {
                Ok(stream) => match stream.peer_addr() {
                    Ok(remote) => {
                        info!("connected to peer {}", addr);
                        self.handle_connection(stream, remote, Direction::Outbound).await;
                        return;
                    }
                    Err(e) => e,
                },
                Err(e) => e,
            };
            debug!("dial {} failed: {}; retrying in {:?}", addr, failure, DIAL_RETRY_DELAY);
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = tokio::time::sleep(DIAL_RETRY_DELAY) => {}
            }
        }
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream, remote: SocketAddr, direction: Direction) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay on {}: {}", remote, e);
        }
        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        let peer = self.peers.register(remote.to_string(), direction, tx).await;
        let mut writer = tokio::spawn(write_loop(write_half, rx, remote));

        let head = self.chain.current_head().await;
        peer.send(Message::announce(&head));

        let mut reader = FramedRead::new(read_half, record_codec());
        loop {
            let next = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                next = reader.next() => next,
            };
            match next {
                None => {
                    debug!("peer {} closed the connection", remote);
                    break;
                }
                Some(Err(e)) => {
                    warn!("framing error from {}: {}", remote, e);
                    break;
                }
                Some(Ok(record)) => {
                    if record.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    match Message::decode_bytes(&record) {
                        Ok(msg) => self.handle_message(&peer, msg).await,
                        Err(e) => warn!("dropping record from {}: {}", remote, e),
                    }
                }
            }
        }

        self.peers.deregister(&peer).await;
        drop(peer);
        if tokio::time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
            writer.abort();
        }
        info!("disconnected from {}", remote);
    }

    /// Apply one inbound message from `peer`.
    pub async fn handle_message(&self, peer: &PeerHandle, msg: Message) {
        match msg {
            Message::Announce { hash, sequence } => {
                let head = self.chain.current_head().await;
                if hash == head.hash || sequence <= head.header.sequence {
                    return;
                }
                debug!("peer {} announced sequence={} hash={}, requesting", peer.addr(), sequence, hash);
                peer.send(Message::GetBlock { want_hash: hash });
            }
            Message::GetBlock { want_hash } => match self.chain.store().load_block_by_hash(&want_hash) {
                Ok(block) => {
                    peer.send(Message::Block(Box::new(block)));
                }
                Err(e) if e.is_not_found() => {
                    debug!("peer {} asked for unknown block {}", peer.addr(), want_hash)
                }
                Err(e) => warn!("cannot serve block {} to {}: {}", want_hash, peer.addr(), e),
            },
            Message::Block(block) => {
                let hash = block.hash.clone();
                let sequence = block.header.sequence;
                match self.chain.try_accept(*block).await {
                    Ok(true) => info!(
                        "accepted block from {} sequence={} hash={}",
                        peer.addr(),
                        sequence,
                        hash
                    ),
                    Ok(false) => debug!("ignored block from {} sequence={}", peer.addr(), sequence),
                    Err(e) => warn!("rejected block {} from {}: {}", hash, peer.addr(), e),
                }
            }
        }
    }

    /// Announce every new head to all peers until shutdown.
    pub fn start_relay(self: &Arc<Self>) -> JoinHandle<()> {
        let node = self.clone();
        let mut events = self.chain.subscribe();
        tokio::spawn(async move {
            loop {
                let block = tokio::select! {
                    _ = node.shutdown.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(block) => block,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!("relay skipped {} head events", skipped);
                            node.chain.current_head().await
                        }
                        Err(RecvError::Closed) => break,
                    },
                };
                node.broadcast_announce(&block).await;
            }
        })
    }

    pub async fn broadcast_announce(&self, block: &Block) -> usize {
        self.peers.broadcast(&Message::announce(block)).await
    }
}

/// Newline-split raw records. UTF-8 is checked by the decoder, not here.
fn record_codec() -> AnyDelimiterCodec {
    AnyDelimiterCodec::new_with_max_length(
        vec![RECORD_DELIMITER],
        vec![RECORD_DELIMITER],
        MAX_RECORD_LEN,
    )
}

async fn write_loop(write_half: OwnedWriteHalf, mut rx: mpsc::Receiver<Message>, remote: SocketAddr) {
    let mut sink = FramedWrite::new(write_half, LinesCodec::new());
    while let Some(msg) = rx.recv().await {
        let line = match msg.encode() {
            Ok(line) => line,
            Err(e) => {
                warn!("cannot encode {:?} for {}: {}", msg.kind(), remote, e);
                continue;
            }
        };
        if let Err(e) = sink.send(line).await {
            debug!("write to {} failed: {}", remote, e);
            break;
        }
    }
}
