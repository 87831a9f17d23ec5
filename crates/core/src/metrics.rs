//! In-process metrics registry.
//!
//! There's no external metrics sink wired into this crate (no Prometheus
//! exporter, no StatsD client) — counters and gauges live in-process and
//! are surfaced through `tracing`, the same way
//! [`rpc_pool::RpcPool`](liquidator_chain::RpcPool) tracks per-endpoint
//! health in `AtomicU64`s rather than a dedicated metrics crate.
//! `MetricsRegistry` is the one place those counters accumulate so a
//! supervisor can periodically snapshot and log them.

use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tracing::info;

/// A monotonically increasing named counter.
#[derive(Default)]
struct Counter(AtomicU64);

/// A named gauge that can move in either direction.
#[derive(Default)]
struct Gauge(AtomicI64);

/// Process-wide counters and gauges for the liquidation pipeline. Cheap to
/// clone-share via `Arc`; every method is lock-free past the `DashMap`
/// shard lock.
#[derive(Default)]
pub struct MetricsRegistry {
    counters: DashMap<&'static str, Counter>,
    gauges: DashMap<&'static str, Gauge>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a named counter by `delta`, creating it at zero first if
    /// this is the first observation.
    pub fn incr(&self, name: &'static str, delta: u64) {
        self.counters
            .entry(name)
            .or_insert_with(Counter::default)
            .0
            .fetch_add(delta, Ordering::Relaxed);
    }

    pub fn counter(&self, name: &'static str) -> u64 {
        self.counters
            .get(name)
            .map(|c| c.0.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Set a named gauge to an absolute value.
    pub fn set_gauge(&self, name: &'static str, value: i64) {
        self.gauges
            .entry(name)
            .or_insert_with(Gauge::default)
            .0
            .store(value, Ordering::Relaxed);
    }

    pub fn gauge(&self, name: &'static str) -> i64 {
        self.gauges
            .get(name)
            .map(|g| g.0.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Emit every tracked counter and gauge as a single structured
    /// `tracing` event. Intended to be called on a fixed interval by the
    /// supervisor rather than per-update, so log volume stays bounded
    /// regardless of how hot the counters themselves are.
    pub fn log_snapshot(&self) {
        let counters: Vec<(String, u64)> = self
            .counters
            .iter()
            .map(|e| (e.key().to_string(), e.value().0.load(Ordering::Relaxed)))
            .collect();
        let gauges: Vec<(String, i64)> = self
            .gauges
            .iter()
            .map(|e| (e.key().to_string(), e.value().0.load(Ordering::Relaxed)))
            .collect();
        info!(?counters, ?gauges, "metrics snapshot");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incr_accumulates() {
        let metrics = MetricsRegistry::new();
        metrics.incr("positions_evaluated", 3);
        metrics.incr("positions_evaluated", 2);
        assert_eq!(metrics.counter("positions_evaluated"), 5);
    }

    #[test]
    fn test_unknown_counter_defaults_to_zero() {
        let metrics = MetricsRegistry::new();
        assert_eq!(metrics.counter("never_touched"), 0);
    }

    #[test]
    fn test_gauge_set_overwrites() {
        let metrics = MetricsRegistry::new();
        metrics.set_gauge("hotlist_size", 4);
        metrics.set_gauge("hotlist_size", 7);
        assert_eq!(metrics.gauge("hotlist_size"), 7);
    }
}
