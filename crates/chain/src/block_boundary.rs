//! Tracks chain head and estimates time remaining in the current block.
//!
//! HyperLiquid EVM produces blocks roughly every 200ms (see the startup
//! banner log in `src/main.rs`). The submitter needs to know: is there
//! enough of this block left to plausibly land a transaction, or should it
//! wait for the next one? This module answers that from observed block
//! timestamps rather than hardcoding the interval, since block time varies.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Rolling estimate of block production cadence.
pub struct BlockBoundaryController {
    last_block_number: AtomicU64,
    last_block_seen_at: parking_lot::RwLock<Option<Instant>>,
    /// Exponentially-weighted average block interval, in milliseconds.
    avg_interval_ms: AtomicU64,
    default_interval_ms: u64,
}

const EWMA_ALPHA_PCT: u64 = 20; // 20% weight on the newest sample

impl BlockBoundaryController {
    pub fn new(default_interval_ms: u64) -> Self {
        Self {
            last_block_number: AtomicU64::new(0),
            last_block_seen_at: parking_lot::RwLock::new(None),
            avg_interval_ms: AtomicU64::new(default_interval_ms),
            default_interval_ms,
        }
    }

    /// Call every time a new block is observed (new head from WS or a poll).
    pub fn observe_block(&self, block_number: u64) {
        let prev = self.last_block_number.swap(block_number, Ordering::SeqCst);
        let now = Instant::now();
        let mut last_seen = self.last_block_seen_at.write();

        if let Some(prev_time) = *last_seen {
            if block_number > prev {
                let elapsed_ms = now.duration_since(prev_time).as_millis() as u64;
                let blocks_advanced = block_number - prev;
                let per_block_ms = elapsed_ms / blocks_advanced.max(1);

                let current_avg = self.avg_interval_ms.load(Ordering::Relaxed);
                let new_avg = (current_avg * (100 - EWMA_ALPHA_PCT) + per_block_ms * EWMA_ALPHA_PCT) / 100;
                self.avg_interval_ms.store(new_avg, Ordering::Relaxed);

                debug!(
                    block = block_number,
                    per_block_ms,
                    avg_interval_ms = new_avg,
                    "Block boundary observed"
                );
            }
        }

        *last_seen = Some(now);
    }

    /// Current block number we last observed.
    pub fn current_block(&self) -> u64 {
        self.last_block_number.load(Ordering::SeqCst)
    }

    /// Estimated average block interval.
    pub fn avg_interval(&self) -> Duration {
        Duration::from_millis(self.avg_interval_ms.load(Ordering::Relaxed))
    }

    /// Estimated time remaining until the next block, based on the EWMA
    /// interval and time elapsed since the last observed block. Returns the
    /// configured default if we haven't observed a block yet.
    pub fn time_remaining_in_block(&self) -> Duration {
        let interval = self.avg_interval();
        let last_seen = *self.last_block_seen_at.read();

        match last_seen {
            Some(t) => {
                let elapsed = t.elapsed();
                interval.checked_sub(elapsed).unwrap_or(Duration::ZERO)
            }
            None => Duration::from_millis(self.default_interval_ms),
        }
    }

    /// Whether there is "enough" of the current block left to plausibly
    /// submit and land a transaction before it closes.
    pub fn has_time_to_submit(&self, min_remaining: Duration) -> bool {
        self.time_remaining_in_block() >= min_remaining
    }
}

impl Default for BlockBoundaryController {
    fn default() -> Self {
        Self::new(200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_initial_state_uses_default_interval() {
        let controller = BlockBoundaryController::new(200);
        assert_eq!(controller.avg_interval(), Duration::from_millis(200));
        assert_eq!(controller.current_block(), 0);
    }

    #[test]
    fn test_observe_block_updates_current() {
        let controller = BlockBoundaryController::new(200);
        controller.observe_block(100);
        assert_eq!(controller.current_block(), 100);
        controller.observe_block(101);
        assert_eq!(controller.current_block(), 101);
    }

    #[test]
    fn test_time_remaining_decreases_after_observation() {
        let controller = BlockBoundaryController::new(200);
        controller.observe_block(100);
        let remaining_immediately = controller.time_remaining_in_block();
        sleep(Duration::from_millis(50));
        let remaining_later = controller.time_remaining_in_block();
        assert!(remaining_later < remaining_immediately);
    }

    #[test]
    fn test_has_time_to_submit() {
        let controller = BlockBoundaryController::new(200);
        controller.observe_block(100);
        assert!(controller.has_time_to_submit(Duration::from_millis(1)));
    }
}
