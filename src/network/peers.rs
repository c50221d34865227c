//! Connected peer tracking
//!
//! Every live connection owns a bounded outbound queue drained by its writer
//! task. Sends never block: a full queue drops the message.

use super::wire::Message;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub addr: String,
    pub direction: Direction,
    pub connected_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PeerHandle {
    id: u64,
    info: PeerInfo,
    sender: mpsc::Sender<Message>,
}

impl PeerHandle {
    pub fn addr(&self) -> &str {
        &self.info.addr
    }

    pub fn info(&self) -> &PeerInfo {
        &self.info
    }

    /// Queue `msg` for this peer. Returns false if it was dropped.
    pub fn send(&self, msg: Message) -> bool {
        match self.sender.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(msg)) => {
                warn!("outbound queue to {} full, dropping {:?}", self.info.addr, msg.kind());
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("peer {} writer gone", self.info.addr);
                false
            }
        }
    }
}

/// Live connections keyed by remote address.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: RwLock<HashMap<String, PeerHandle>>,
    next_id: AtomicU64,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. A previous entry for the same address is replaced.
    pub async fn register(
        &self,
        addr: String,
        direction: Direction,
        sender: mpsc::Sender<Message>,
    ) -> PeerHandle {
        let handle = PeerHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            info: PeerInfo { addr: addr.clone(), direction, connected_at: Utc::now() },
            sender,
        };
        let mut peers = self.peers.write().await;
        if peers.insert(addr.clone(), handle.clone()).is_some() {
            debug!("replaced existing connection to {}", addr);
        }
        handle
    }

    /// Remove `handle` if it is still the registered connection for its address.
    pub async fn deregister(&self, handle: &PeerHandle) -> bool {
        let mut peers = self.peers.write().await;
        match peers.get(handle.addr()) {
            Some(current) if current.id == handle.id => {
                peers.remove(handle.addr());
                true
            }
            _ => false,
        }
    }

    pub async fn list(&self) -> Vec<PeerInfo> {
        let peers = self.peers.read().await;
        let mut infos: Vec<PeerInfo> = peers.values().map(|p| p.info.clone()).collect();
        infos.sort_by(|a, b| a.addr.cmp(&b.addr));
        infos
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }

    /// Queue `msg` to every peer; returns how many accepted it.
    pub async fn broadcast(&self, msg: &Message) -> usize {
        let handles: Vec<PeerHandle> = self.peers.read().await.values().cloned().collect();
        handles.iter().filter(|peer| peer.send(msg.clone())).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn announce(seq: u64) -> Message {
        Message::Announce { hash: format!("0x{:02}", seq), sequence: seq }
    }

    #[tokio::test]
    async fn test_register_and_list() {
        let registry = PeerRegistry::new();
        let (tx, _rx) = mpsc::channel(4);
        registry.register("10.0.0.2:1".to_string(), Direction::Outbound, tx.clone()).await;
        registry.register("10.0.0.1:1".to_string(), Direction::Inbound, tx).await;

        let peers = registry.list().await;
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].addr, "10.0.0.1:1");
        assert_eq!(peers[0].direction, Direction::Inbound);
        let json = serde_json::to_value(&peers[0]).unwrap();
        assert_eq!(json["direction"], "inbound");
        assert!(json.get("connectedAt").is_some());
    }

    #[tokio::test]
    async fn test_stale_handle_does_not_remove_replacement() {
        let registry = PeerRegistry::new();
        let (tx, _rx) = mpsc::channel(4);
        let old = registry.register("a:1".to_string(), Direction::Inbound, tx.clone()).await;
        let new = registry.register("a:1".to_string(), Direction::Inbound, tx).await;

        assert!(!registry.deregister(&old).await);
        assert_eq!(registry.len().await, 1);
        assert!(registry.deregister(&new).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_full_queue_drops() {
        let registry = PeerRegistry::new();
        let (tx, mut rx) = mpsc::channel(1);
        let peer = registry.register("a:1".to_string(), Direction::Inbound, tx).await;

        assert!(peer.send(announce(1)));
        assert!(!peer.send(announce(2)));
        assert_eq!(rx.recv().await, Some(announce(1)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_peer() {
        let registry = PeerRegistry::new();
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        let (tx_c, rx_c) = mpsc::channel(4);
        registry.register("a:1".to_string(), Direction::Inbound, tx_a).await;
        registry.register("b:1".to_string(), Direction::Outbound, tx_b).await;
        registry.register("c:1".to_string(), Direction::Outbound, tx_c).await;
        drop(rx_c);

        assert_eq!(registry.broadcast(&announce(3)).await, 2);
        assert_eq!(rx_a.recv().await, Some(announce(3)));
        assert_eq!(rx_b.recv().await, Some(announce(3)));
    }
}
