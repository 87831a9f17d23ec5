//! Bounded rolling window of recent prices per asset, for volatility
//! estimation feeding the predictive layer.
//!
//! `OracleMonitor` (in `liquidator-chain`) only ever holds the *latest*
//! price per asset. The predictive orchestrator's scenario weighting needs
//! a sense of how much an asset actually moves, not just where it is right
//! now — this is a small addition the teacher never needed because its
//! sensitivity estimate only looks at the current price delta.

use alloy::primitives::{Address, U256};
use arrayvec::ArrayVec;
use dashmap::DashMap;
use std::time::Instant;

use crate::u256_math;

/// Max samples retained per asset. Sized for roughly an hour of history at
/// one sample per oracle heartbeat (HyperLend oracles post every few
/// minutes at the fast end).
const WINDOW_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy)]
struct Sample {
    price: U256,
    at: Instant,
}

/// Rolling window for a single asset.
#[derive(Debug, Clone, Default)]
struct AssetWindow {
    samples: ArrayVec<Sample, WINDOW_CAPACITY>,
}

impl AssetWindow {
    fn push(&mut self, price: U256) {
        if self.samples.is_full() {
            self.samples.remove(0);
        }
        self.samples.push(Sample {
            price,
            at: Instant::now(),
        });
    }

    /// Largest absolute basis-point move between any two consecutive samples.
    fn max_step_bps(&self) -> u64 {
        self.samples
            .windows(2)
            .map(|w| u256_math::pct_diff_bps(w[0].price, w[1].price).unsigned_abs())
            .max()
            .unwrap_or(0)
    }

    /// Basis-point move from the oldest retained sample to the newest.
    fn total_move_bps(&self) -> i64 {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => u256_math::pct_diff_bps(first.price, last.price),
            _ => 0,
        }
    }
}

/// Per-asset rolling price windows, used to estimate a volatility factor for
/// the predictive orchestrator's Adverse/Extreme scenario sizing.
pub struct PriceWindowTracker {
    windows: DashMap<Address, AssetWindow>,
}

impl PriceWindowTracker {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }

    /// Record a new observed price for an asset.
    pub fn record(&self, asset: Address, price: U256) {
        self.windows.entry(asset).or_default().push(price);
    }

    /// Largest single-step basis-point move observed for this asset within
    /// the retained window. Returns 0 if we have fewer than 2 samples.
    pub fn max_step_bps(&self, asset: &Address) -> u64 {
        self.windows
            .get(asset)
            .map(|w| w.max_step_bps())
            .unwrap_or(0)
    }

    /// Net basis-point move across the retained window.
    pub fn total_move_bps(&self, asset: &Address) -> i64 {
        self.windows
            .get(asset)
            .map(|w| w.total_move_bps())
            .unwrap_or(0)
    }

    /// Number of samples retained for an asset.
    pub fn sample_count(&self, asset: &Address) -> usize {
        self.windows.get(asset).map(|w| w.samples.len()).unwrap_or(0)
    }

    /// Suggested scenario move size in basis points, derived from observed
    /// volatility: Adverse = 2x the largest recent step, Extreme = 4x,
    /// floored at a sane minimum so illiquid/rarely-updated assets still get
    /// a meaningful stress test.
    pub fn scenario_bps(&self, asset: &Address) -> (u64, u64) {
        const MIN_ADVERSE_BPS: u64 = 200; // 2%
        const MIN_EXTREME_BPS: u64 = 500; // 5%

        let step = self.max_step_bps(asset);
        (step.saturating_mul(2).max(MIN_ADVERSE_BPS), step.saturating_mul(4).max(MIN_EXTREME_BPS))
    }
}

impl Default for PriceWindowTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_window_has_zero_move() {
        let tracker = PriceWindowTracker::new();
        let asset = Address::ZERO;
        assert_eq!(tracker.max_step_bps(&asset), 0);
        assert_eq!(tracker.total_move_bps(&asset), 0);
    }

    #[test]
    fn test_records_and_tracks_moves() {
        let tracker = PriceWindowTracker::new();
        let asset = Address::repeat_byte(1);

        tracker.record(asset, U256::from(100_000_000u64));
        tracker.record(asset, U256::from(110_000_000u64)); // +10%
        tracker.record(asset, U256::from(104_500_000u64)); // -~5%

        assert_eq!(tracker.sample_count(&asset), 3);
        assert!(tracker.max_step_bps(&asset) >= 900);
    }

    #[test]
    fn test_window_capacity_evicts_oldest() {
        let tracker = PriceWindowTracker::new();
        let asset = Address::repeat_byte(2);
        for i in 0..(WINDOW_CAPACITY + 5) {
            tracker.record(asset, U256::from(100_000_000u64 + i as u64));
        }
        assert_eq!(tracker.sample_count(&asset), WINDOW_CAPACITY);
    }

    #[test]
    fn test_scenario_bps_has_floor() {
        let tracker = PriceWindowTracker::new();
        let asset = Address::repeat_byte(3);
        tracker.record(asset, U256::from(100_000_000u64));
        let (adverse, extreme) = tracker.scenario_bps(&asset);
        assert!(adverse >= 200);
        assert!(extreme >= 500);
        assert!(extreme > adverse);
    }
}
