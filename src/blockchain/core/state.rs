use crate::error::{ChainError, Result};
use crate::persistence::{HeadPointer, Persistence};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use super::chain::{Block, Roots};
use super::validation::check_integrity;

/// Buffered head-change notifications per subscriber.
pub const HEAD_EVENT_CAPACITY: usize = 64;

/// Result of one production step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MineOutcome {
    /// The block became the new head and is durable.
    Accepted(Block),
    /// The block did not beat the current head and was discarded.
    Rejected(Block),
}

#[derive(Debug)]
struct Head {
    block: Block,
    pointer: HeadPointer,
}

/// Owner of the current head.
///
/// Every head change is persisted (block, then head pointer) while the write
/// lock is held, so readers only ever observe durable heads.
pub struct ChainState {
    store: Arc<dyn Persistence>,
    genesis_time: i64,
    head: RwLock<Head>,
    events: broadcast::Sender<Block>,
}

impl ChainState {
    /// Resume the chain stored in `store`, creating the genesis block when the
    /// store holds none.
    pub fn open(store: Arc<dyn Persistence>, genesis_time: i64, extra_data: &str) -> Result<Self> {
        let genesis = match store.load_block_by_sequence(0) {
            Ok(block) => Some(block),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        let head = match genesis {
            None => {
                let block = Block::genesis(genesis_time, extra_data, &Roots::default());
                let locations = store.save_block(&block)?;
                let pointer = HeadPointer::new(&block, locations);
                store.save_head(&pointer)?;
                info!("genesis created hash={} sequence={}", block.hash, block.header.sequence);
                Head { block, pointer }
            }
            Some(genesis) => Self::resume_head(store.as_ref(), genesis)?,
        };
        info!("loaded head hash={} sequence={}", head.block.hash, head.block.header.sequence);

        let (events, _) = broadcast::channel(HEAD_EVENT_CAPACITY);
        Ok(Self {
            store,
            genesis_time,
            head: RwLock::new(head),
            events,
        })
    }

    fn resume_head(store: &dyn Persistence, genesis: Block) -> Result<Head> {
        let recorded = match store.load_head() {
            Ok(pointer) => pointer,
            Err(e) => {
                warn!("unreadable head record, falling back to genesis: {}", e);
                None
            }
        };

        if let Some(pointer) = recorded {
            match store.load_block_by_hash(&pointer.hash) {
                Ok(block) => return Ok(Head { block, pointer }),
                Err(e) => warn!("head block {} unavailable, falling back to genesis: {}", pointer.hash, e),
            }
        }

        let pointer = HeadPointer::new(&genesis, store.locations(&genesis));
        store.save_head(&pointer)?;
        Ok(Head { block: genesis, pointer })
    }

    pub fn genesis_time(&self) -> i64 {
        self.genesis_time
    }

    pub fn store(&self) -> &Arc<dyn Persistence> {
        &self.store
    }

    /// Receive every block that becomes head from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Block> {
        self.events.subscribe()
    }

    pub async fn current_head(&self) -> Block {
        self.head.read().await.block.clone()
    }

    pub async fn head_pointer(&self) -> HeadPointer {
        self.head.read().await.pointer.clone()
    }

    /// Offer a block received from elsewhere.
    ///
    /// Returns `Ok(true)` when it replaced the head. Candidates whose sequence
    /// is not strictly above the head's are ignored (`Ok(false)`). Parent
    /// linkage is not checked, and neither is the sequence against the
    /// timestamp.
    pub async fn try_accept(&self, candidate: Block) -> Result<bool> {
        check_integrity(&candidate)?;
        if candidate.is_genesis() && candidate.header.sequence != 0 {
            return Err(ChainError::IntegrityError {
                have: candidate.hash.clone(),
                want: candidate.header.hash(),
            });
        }

        let mut head = self.head.write().await;
        self.accept_locked(&mut head, candidate)
    }

    /// Build a child of the current head stamped `max(now, head.timestamp)`
    /// and offer it under the same write lock.
    pub async fn mine_next(&self, now: i64, roots: &Roots, extra_data: &str) -> Result<MineOutcome> {
        let mut head = self.head.write().await;
        let parent = &head.block;
        let timestamp = now.max(parent.header.timestamp);
        let block = Block::child(Some(parent), timestamp, self.genesis_time, roots, extra_data)?;

        if self.accept_locked(&mut head, block.clone())? {
            Ok(MineOutcome::Accepted(block))
        } else {
            Ok(MineOutcome::Rejected(block))
        }
    }

    fn accept_locked(&self, head: &mut Head, candidate: Block) -> Result<bool> {
        if candidate.header.sequence <= head.block.header.sequence {
            debug!(
                "fork choice kept head sequence={} over candidate sequence={} hash={}",
                head.block.header.sequence, candidate.header.sequence, candidate.hash
            );
            return Ok(false);
        }

        let locations = self.store.save_block(&candidate)?;
        let pointer = HeadPointer::new(&candidate, locations);
        self.store.save_head(&pointer)?;

        *head = Head { block: candidate.clone(), pointer };
        // No subscribers is fine; relays attach later.
        let _ = self.events.send(candidate);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::core::chain::GENESIS_HASH;
    use crate::persistence::InMemoryPersistence;
    use std::time::Duration;

    const GENESIS_TIME: i64 = 1_000;

    fn open(store: &InMemoryPersistence) -> ChainState {
        ChainState::open(Arc::new(store.clone()), GENESIS_TIME, "test").unwrap()
    }

    fn child_of(parent: &Block, ts: i64, extra: &str) -> Block {
        Block::child(Some(parent), ts, GENESIS_TIME, &Roots::default(), extra).unwrap()
    }

    #[tokio::test]
    async fn test_open_creates_genesis_head() {
        let store = InMemoryPersistence::new();
        let chain = open(&store);

        let head = chain.current_head().await;
        assert_eq!(head.hash, GENESIS_HASH);
        assert_eq!(head.header.timestamp, GENESIS_TIME);
        let pointer = store.load_head().unwrap().unwrap();
        assert_eq!(pointer, chain.head_pointer().await);
        assert_eq!(pointer.sequence, 0);
    }

    #[tokio::test]
    async fn test_reopen_resumes_recorded_head() {
        let store = InMemoryPersistence::new();
        let tip = {
            let chain = open(&store);
            match chain.mine_next(1_007, &Roots::default(), "m").await.unwrap() {
                MineOutcome::Accepted(block) => block,
                other => panic!("unexpected {:?}", other),
            }
        };

        let chain = open(&store);
        assert_eq!(chain.current_head().await, tip);
        assert_eq!(store.block_count(), 2);
    }

    #[tokio::test]
    async fn test_reopen_falls_back_when_head_block_missing() {
        let store = InMemoryPersistence::new();
        {
            let chain = open(&store);
            let genesis = chain.current_head().await;
            let orphan = child_of(&genesis, 1_003, "lost");
            let pointer = HeadPointer::new(&orphan, Default::default());
            store.save_head(&pointer).unwrap();
        }

        let chain = open(&store);
        assert_eq!(chain.current_head().await.hash, GENESIS_HASH);
        assert_eq!(store.load_head().unwrap().unwrap().hash, GENESIS_HASH);
    }

    #[tokio::test]
    async fn test_try_accept_requires_strictly_higher_sequence() {
        let store = InMemoryPersistence::new();
        let chain = open(&store);
        let genesis = chain.current_head().await;

        let five = child_of(&genesis, 1_005, "a");
        assert!(chain.try_accept(five.clone()).await.unwrap());
        let recorded = store.load_head().unwrap();

        let tie = child_of(&genesis, 1_005, "b");
        let lower = child_of(&genesis, 1_002, "c");
        for candidate in [tie, lower, five.clone()] {
            assert!(!chain.try_accept(candidate).await.unwrap());
            assert_eq!(chain.current_head().await, five);
            assert_eq!(store.load_head().unwrap(), recorded);
        }
        assert_eq!(store.block_count(), 2);
    }

    #[tokio::test]
    async fn test_try_accept_does_not_check_linkage() {
        let store = InMemoryPersistence::new();
        let chain = open(&store);
        let genesis = chain.current_head().await;

        let unrelated_parent = child_of(&genesis, 1_001, "elsewhere");
        let candidate = child_of(&unrelated_parent, 1_009, "x");
        assert!(chain.try_accept(candidate.clone()).await.unwrap());
        assert_eq!(chain.current_head().await, candidate);
    }

    #[tokio::test]
    async fn test_try_accept_trusts_header_sequence() {
        let store = InMemoryPersistence::new();
        let chain = open(&store);
        let genesis = chain.current_head().await;

        let mut pinned = child_of(&genesis, 1_003, "far");
        pinned.header.sequence = u64::MAX;
        pinned.hash = pinned.header.hash();
        assert!(chain.try_accept(pinned.clone()).await.unwrap());
        assert_eq!(chain.current_head().await.header.sequence, u64::MAX);

        // Nothing built from the wall clock can outrank it.
        match chain.mine_next(1_900, &Roots::default(), "m").await.unwrap() {
            MineOutcome::Rejected(block) => assert_eq!(block.header.sequence, 900),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(chain.current_head().await, pinned);
    }

    #[tokio::test]
    async fn test_try_accept_rejects_corrupt_blocks() {
        let store = InMemoryPersistence::new();
        let chain = open(&store);
        let genesis = chain.current_head().await;

        let mut forged = child_of(&genesis, 1_010, "x");
        forged.header.extra_data = "forged".to_string();
        let err = chain.try_accept(forged).await.unwrap_err();
        assert!(matches!(err, ChainError::IntegrityError { .. }));

        let mut fake_genesis = genesis.clone();
        fake_genesis.header.sequence = 50;
        let err = chain.try_accept(fake_genesis).await.unwrap_err();
        assert!(matches!(err, ChainError::IntegrityError { .. }));

        assert_eq!(chain.current_head().await, genesis);
        assert_eq!(store.block_count(), 1);
    }

    #[tokio::test]
    async fn test_mine_clamps_skewed_clock_and_rejects_tie() {
        let store = InMemoryPersistence::new();
        let chain = open(&store);

        let first = match chain.mine_next(1_005, &Roots::default(), "m").await.unwrap() {
            MineOutcome::Accepted(block) => block,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(first.header.sequence, 5);

        // Clock went backwards: timestamp is clamped to the parent's.
        match chain.mine_next(1_003, &Roots::default(), "m").await.unwrap() {
            MineOutcome::Rejected(block) => {
                assert_eq!(block.header.timestamp, 1_005);
                assert_eq!(block.header.sequence, 5);
                assert_eq!(block.header.parent_hash, first.hash);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(chain.current_head().await, first);
        assert_eq!(store.block_count(), 2);
        assert_eq!(store.load_head().unwrap().unwrap().hash, first.hash);
    }

    #[tokio::test]
    async fn test_accepted_heads_are_announced() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let store = InMemoryPersistence::new();
            let chain = open(&store);
            let mut events = chain.subscribe();
            let genesis = chain.current_head().await;

            let block = child_of(&genesis, 1_004, "e");
            assert!(chain.try_accept(block.clone()).await.unwrap());
            assert!(!chain.try_accept(child_of(&genesis, 1_001, "old")).await.unwrap());

            assert_eq!(events.recv().await.unwrap(), block);
            assert!(events.try_recv().is_err());
        })
        .await
        .expect("test_accepted_heads_are_announced timed out");
    }
}
