//! Node statistics.
//!
//! Every value is recorded through the [`metrics`] facade, so any installed
//! recorder (Prometheus or otherwise) sees it. A local mirror backs the
//! `/status` snapshot and the periodic log report.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

/// Durations recorded since the last report.
#[derive(Debug, Default)]
struct MineWindow {
    total: Duration,
    samples: u32,
}

/// Statistics shared by the miner, the head tracker and the query surface.
#[derive(Debug, Default)]
pub struct NodeMetrics {
    head_sequence: AtomicU64,
    blocks_mined: AtomicU64,
    mine_window: Mutex<MineWindow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub head_sequence: u64,
    pub blocks_mined: u64,
    pub pending_mine_samples: u32,
}

impl NodeMetrics {
    pub const HEAD_SEQUENCE: &'static str = "timechain_head_sequence";
    pub const BLOCKS_MINED_TOTAL: &'static str = "timechain_blocks_mined_total";
    pub const MINE_DURATION_SECONDS: &'static str = "timechain_mine_duration_seconds";

    pub fn new() -> Self {
        Self::default()
    }

    /// Describe every metric to the installed recorder. Call once at startup.
    pub fn init() {
        metrics::describe_gauge!(
            Self::HEAD_SEQUENCE,
            metrics::Unit::Count,
            "Sequence number of the current chain head",
        );
        metrics::describe_counter!(
            Self::BLOCKS_MINED_TOTAL,
            metrics::Unit::Count,
            "Blocks produced locally that became head",
        );
        metrics::describe_histogram!(
            Self::MINE_DURATION_SECONDS,
            metrics::Unit::Seconds,
            "Time spent producing and offering one block",
        );
    }

    pub fn set_head_sequence(&self, sequence: u64) {
        self.head_sequence.store(sequence, Ordering::Relaxed);
        metrics::gauge!(Self::HEAD_SEQUENCE).set(sequence as f64);
    }

    pub fn inc_blocks_mined(&self) {
        self.blocks_mined.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(Self::BLOCKS_MINED_TOTAL).increment(1);
    }

    pub fn record_mine_duration(&self, elapsed: Duration) {
        {
            let mut window = self.mine_window.lock();
            window.total += elapsed;
            window.samples = window.samples.saturating_add(1);
        }
        metrics::histogram!(Self::MINE_DURATION_SECONDS).record(elapsed.as_secs_f64());
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            head_sequence: self.head_sequence.load(Ordering::Relaxed),
            blocks_mined: self.blocks_mined.load(Ordering::Relaxed),
            pending_mine_samples: self.mine_window.lock().samples,
        }
    }

    /// Average mining time since the last call, clearing the window. Zero
    /// when nothing was recorded.
    pub fn take_mine_average(&self) -> Duration {
        let window = std::mem::take(&mut *self.mine_window.lock());
        if window.samples == 0 {
            return Duration::ZERO;
        }
        window.total / window.samples
    }

    /// Log the current values and the average mining time since the last report.
    pub fn report(&self) {
        let snap = self.snapshot();
        info!(
            head_sequence = snap.head_sequence,
            blocks_mined = snap.blocks_mined,
            mine_avg = ?self.take_mine_average(),
            "node.metrics"
        );
    }
}
