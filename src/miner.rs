//! Periodic block production
//!
//! On every tick the miner builds a child of the current head stamped with
//! the wall clock and offers it to the chain state. Rejections and failures
//! are logged and the next tick proceeds.

use crate::blockchain::{ChainState, MineOutcome, Roots};
use crate::error::Result;
use crate::metrics::NodeMetrics;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Ticks between metric reports.
pub const REPORT_EVERY: u64 = 30;

pub struct Miner {
    chain: Arc<ChainState>,
    interval: Duration,
    extra_data: String,
    roots: Roots,
    metrics: Arc<NodeMetrics>,
    shutdown: CancellationToken,
}

impl Miner {
    pub fn new(
        chain: Arc<ChainState>,
        interval: Duration,
        extra_data: impl Into<String>,
        metrics: Arc<NodeMetrics>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            chain,
            interval,
            extra_data: extra_data.into(),
            roots: Roots::default(),
            metrics,
            shutdown,
        }
    }

    /// A zero interval disables mining.
    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Produce one block as if the clock read `now` (unix seconds).
    pub async fn tick_at(&self, now: i64) -> Result<MineOutcome> {
        let started = Instant::now();
        let outcome = self.chain.mine_next(now, &self.roots, &self.extra_data).await?;
        self.metrics.record_mine_duration(started.elapsed());

        match &outcome {
            MineOutcome::Accepted(block) => {
                self.metrics.inc_blocks_mined();
                self.metrics.set_head_sequence(block.header.sequence);
                info!("mined block sequence={} hash={}", block.header.sequence, block.hash);
            }
            MineOutcome::Rejected(block) => {
                let head = self.chain.current_head().await;
                debug!(
                    "mined block sequence={} not above head sequence={}",
                    block.header.sequence, head.header.sequence
                );
            }
        }
        Ok(outcome)
    }

    pub async fn tick(&self) -> Result<MineOutcome> {
        self.tick_at(Utc::now().timestamp()).await
    }

    /// Spawn the mining loop, or return `None` when mining is disabled.
    pub fn start(self) -> Option<JoinHandle<()>> {
        if !self.is_enabled() {
            info!("mining disabled");
            return None;
        }
        Some(tokio::spawn(self.run()))
    }

    async fn run(self) {
        info!("mining every {:?}", self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately; wait a full interval before mining.
        ticker.tick().await;

        let mut ticks: u64 = 0;
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("miner stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.tick().await {
                warn!("mining failed: {}", e);
            }
            ticks += 1;
            if ticks % REPORT_EVERY == 0 {
                self.metrics.report();
            }
        }
    }
}
