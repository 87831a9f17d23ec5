//! Cached, tiered health-factor resolution with hysteresis-gated edge triggers.
//!
//! [`TieredPositionTracker`] holds the borrower index; [`RiskEngine`] knows
//! how to compute an authoritative HF from one position. `HealthResolver`
//! sits between them: a short-TTL cache so a burst of price ticks inside one
//! block doesn't recompute the same position's HF from scratch on every
//! tick, and an edge-trigger layer that reports a Safe -> Liquidatable
//! crossing or a Worsened move exactly once per (user, block) — the same
//! anti-flap discipline [`TriggerEntry`](crate::trigger_index::TriggerEntry)
//! applies to raw trigger prices, applied here to the execution threshold.

use alloy::primitives::Address;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::config::HealthResolverConfig;
use crate::position::{CollateralData, DebtData, PositionTier, TrackedPosition};
use crate::position_tracker::TieredPositionTracker;
use crate::reserve_catalog::ReserveCatalog;
use crate::risk_engine::RiskEngine;
use liquidator_chain::MicroMulticall;

/// A cached HF read for one user, as of `computed_at`.
#[derive(Debug, Clone, Copy)]
pub struct HealthSnapshot {
    pub user: Address,
    pub hf_bps: u64,
    pub tier: PositionTier,
    pub is_zero_debt: bool,
    pub computed_at: Instant,
}

impl HealthSnapshot {
    pub fn age(&self) -> std::time::Duration {
        self.computed_at.elapsed()
    }
}

/// Why an [`EdgeTrigger`] fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    /// First time this user's HF has been observed at or below the
    /// execution threshold.
    SafeToLiq,
    /// Already below threshold, and HF dropped by at least the hysteresis
    /// band since the last emission.
    Worsened,
}

/// A report that a user's HF has crossed `executionHfThresholdBps`, or
/// worsened meaningfully while already below it. Emitted at most once per
/// `(user, block)`.
#[derive(Debug, Clone, Copy)]
pub struct EdgeTrigger {
    pub user: Address,
    pub hf_bps: u64,
    pub block: u64,
    pub reason: TriggerReason,
}

/// What's remembered about the last emission for a user: the HF it fired
/// at and the block it fired in, so a second snapshot in the same block
/// can't emit a duplicate.
#[derive(Debug, Clone, Copy)]
struct EmittedState {
    hf_bps: u64,
    block: u64,
}

/// On-chain endpoints needed to reverify a single user's balances via a
/// batched `aggregate3` call, rather than trusting whatever's already in
/// the tracker.
struct OnchainRefresh {
    multicall: Arc<MicroMulticall>,
    balances_reader: Address,
    pool: Address,
    reserve_catalog: Arc<ReserveCatalog>,
}

/// Resolves HF for a borrower, caching short-lived snapshots and
/// deduplicating edge-trigger emission per user.
pub struct HealthResolver {
    tracker: Arc<TieredPositionTracker>,
    cache: DashMap<Address, HealthSnapshot>,
    last_emitted: DashMap<Address, EmittedState>,
    cfg: HealthResolverConfig,
    onchain: Option<OnchainRefresh>,
}

impl HealthResolver {
    pub fn new(tracker: Arc<TieredPositionTracker>, cfg: HealthResolverConfig) -> Self {
        Self {
            tracker,
            cache: DashMap::new(),
            last_emitted: DashMap::new(),
            cfg,
            onchain: None,
        }
    }

    /// Enable `refresh_onchain`: a stale snapshot will be reverified via a
    /// `MicroMulticall` batch against `BalancesReader` rather than just
    /// re-read from whatever the tracker already holds.
    pub fn with_onchain_refresh(
        mut self,
        multicall: Arc<MicroMulticall>,
        balances_reader: Address,
        pool: Address,
        reserve_catalog: Arc<ReserveCatalog>,
    ) -> Self {
        self.onchain = Some(OnchainRefresh {
            multicall,
            balances_reader,
            pool,
            reserve_catalog,
        });
        self
    }

    /// Resolve HF for `user`, reusing a cached snapshot younger than
    /// `cache_ttl` rather than recomputing from the tracked position.
    pub fn resolve(&self, user: Address) -> Option<HealthSnapshot> {
        if let Some(cached) = self.cache.get(&user) {
            if cached.age() < self.cfg.cache_ttl() {
                return Some(*cached);
            }
        }
        self.refresh(user)
    }

    /// Force a fresh computation, bypassing the cache. Used after a
    /// position's raw collateral/debt data has changed (a pool event, a
    /// micro-multicall refresh) rather than just a price tick.
    pub fn refresh(&self, user: Address) -> Option<HealthSnapshot> {
        let position = self.tracker.get(&user)?;
        let hf_bps = RiskEngine::hf_bps(&position);
        let snapshot = HealthSnapshot {
            user,
            hf_bps,
            tier: position.tier,
            is_zero_debt: position.has_zero_debt(),
            computed_at: Instant::now(),
        };
        self.cache.insert(user, snapshot);
        Some(snapshot)
    }

    pub fn invalidate(&self, user: &Address) {
        self.cache.remove(user);
    }

    /// Whether on-chain reverification is configured for this resolver.
    pub fn has_onchain_refresh(&self) -> bool {
        self.onchain.is_some()
    }

    /// Reverify `user`'s balances directly on-chain via a batched
    /// `aggregate3` call and recompute HF from the result, bypassing
    /// whatever the tracker currently holds. Used when a snapshot's age
    /// exceeds `snapshotTtlMs` right before an execution decision, per
    /// SPEC_FULL.md's health-resolver and critical-lane snapshot steps.
    /// Falls back to [`Self::refresh`] (no-op if `with_onchain_refresh`
    /// was never called).
    pub async fn refresh_onchain(&self, user: Address) -> anyhow::Result<Option<HealthSnapshot>> {
        let Some(onchain) = &self.onchain else {
            return Ok(self.refresh(user));
        };

        let (supplied, borrowed) = onchain
            .multicall
            .fetch_user_balances(onchain.balances_reader, onchain.pool, user)
            .await?;

        let mut position = TrackedPosition::new(user);
        for entry in supplied {
            let liquidation_threshold = onchain
                .reserve_catalog
                .get(&entry.underlying)
                .map(|r| r.liquidation_threshold_bps)
                .unwrap_or(0);
            let collateral = CollateralData {
                asset: entry.underlying,
                amount: entry.amount,
                price: entry.price,
                decimals: entry.decimals,
                value_usd: CollateralData::calculate_usd_value(
                    entry.amount,
                    entry.price,
                    entry.decimals,
                ),
                liquidation_threshold,
                enabled: true,
            };
            position.collaterals.push((entry.underlying, collateral));
        }
        for entry in borrowed {
            let debt = DebtData {
                asset: entry.underlying,
                amount: entry.amount,
                price: entry.price,
                decimals: entry.decimals,
                value_usd: DebtData::calculate_usd_value(
                    entry.amount,
                    entry.price,
                    entry.decimals,
                ),
            };
            position.debts.push((entry.underlying, debt));
        }

        position.health_factor = position.calculate_health_factor();
        position.update_tier();
        position.state_hash = position.compute_state_hash();
        self.tracker.upsert(position);

        Ok(self.refresh(user))
    }

    /// Whether a snapshot is fresh enough to gate an execution decision on,
    /// stricter than the general `cache_ttl` used for read-path dedup.
    pub fn is_execution_fresh(&self, snapshot: &HealthSnapshot) -> bool {
        snapshot.age() < self.cfg.snapshot_ttl()
    }

    /// Whether HF is at or below the configured execution threshold
    /// (nominally 1.0, i.e. 10_000 bps).
    pub fn is_below_execution_threshold(&self, snapshot: &HealthSnapshot) -> bool {
        snapshot.hf_bps <= self.cfg.execution_hf_threshold_bps
    }

    /// Report a Safe -> Liquidatable crossing, or a Worsened move while
    /// already below the execution threshold, for `block`. Gated strictly
    /// on `executionHfThresholdBps` — tier is a scheduling concept and
    /// plays no part here.
    ///
    /// A zero-debt borrower can never be liquidated (HF is infinite by
    /// definition) and never emits, regardless of its reported tier.
    /// Recovering back above the threshold clears the emitted state rather
    /// than emitting anything, so the position re-arms cleanly the next
    /// time it crosses down. At most one emission fires per `(user,
    /// block)`, even if `refresh`/`resolve` is called more than once for
    /// the same user in the same block.
    pub fn check_edge_trigger(&self, snapshot: HealthSnapshot, block: u64) -> Option<EdgeTrigger> {
        if snapshot.is_zero_debt {
            self.last_emitted.remove(&snapshot.user);
            return None;
        }

        let threshold = self.cfg.execution_hf_threshold_bps;
        if snapshot.hf_bps > threshold {
            // Safe (or recovered): clear any remembered emission so the
            // next downward crossing is treated as a fresh Safe -> Liq.
            self.last_emitted.remove(&snapshot.user);
            return None;
        }

        let prior = self.last_emitted.get(&snapshot.user).map(|e| *e);

        let reason = match prior {
            None => TriggerReason::SafeToLiq,
            Some(prev) => {
                if prev.block == block {
                    return None;
                }
                let worsened = snapshot.hf_bps < prev.hf_bps
                    && prev.hf_bps - snapshot.hf_bps >= self.cfg.hysteresis_bps;
                if !worsened {
                    return None;
                }
                TriggerReason::Worsened
            }
        };

        self.last_emitted.insert(
            snapshot.user,
            EmittedState {
                hf_bps: snapshot.hf_bps,
                block,
            },
        );

        Some(EdgeTrigger {
            user: snapshot.user,
            hf_bps: snapshot.hf_bps,
            block,
            reason,
        })
    }

    pub fn forget(&self, user: &Address) {
        self.cache.remove(user);
        self.last_emitted.remove(user);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> HealthResolver {
        HealthResolver::new(
            Arc::new(TieredPositionTracker::new()),
            HealthResolverConfig::default(),
        )
    }

    fn snapshot(user: Address, hf_bps: u64, is_zero_debt: bool) -> HealthSnapshot {
        HealthSnapshot {
            user,
            hf_bps,
            tier: PositionTier::Hot,
            is_zero_debt,
            computed_at: Instant::now(),
        }
    }

    #[test]
    fn test_resolve_returns_none_for_unknown_user() {
        let resolver = resolver();
        assert!(resolver.resolve(Address::repeat_byte(9)).is_none());
    }

    #[test]
    fn test_safe_snapshot_never_emits() {
        let resolver = resolver();
        // HF 1.005, safely above the 1.0 threshold.
        let snap = snapshot(Address::repeat_byte(1), 10_050, false);
        assert!(resolver.check_edge_trigger(snap, 100).is_none());
    }

    #[test]
    fn test_first_crossing_emits_safe_to_liq() {
        let resolver = resolver();
        let user = Address::repeat_byte(1);
        let snap = snapshot(user, 9_950, false);
        let trigger = resolver.check_edge_trigger(snap, 100).expect("must emit");
        assert_eq!(trigger.reason, TriggerReason::SafeToLiq);
        assert_eq!(trigger.block, 100);
    }

    #[test]
    fn test_zero_debt_never_emits_even_below_threshold_bps() {
        let resolver = resolver();
        // hf_bps wraps to u64::MAX for zero debt upstream, but even a
        // pathological low value must not fire while is_zero_debt is set.
        let snap = snapshot(Address::repeat_byte(1), 1, true);
        assert!(resolver.check_edge_trigger(snap, 100).is_none());
    }

    #[test]
    fn test_at_most_one_emission_per_user_per_block() {
        let resolver = resolver();
        let user = Address::repeat_byte(1);
        let first = snapshot(user, 9_950, false);
        assert!(resolver.check_edge_trigger(first, 100).is_some());

        // Same block, HF worsened a lot — must still not re-emit.
        let second = snapshot(user, 9_000, false);
        assert!(resolver.check_edge_trigger(second, 100).is_none());
    }

    #[test]
    fn test_edge_trigger_suppressed_within_hysteresis_band() {
        let resolver = resolver();
        let user = Address::repeat_byte(1);

        let first = snapshot(user, 9_950, false);
        assert!(resolver.check_edge_trigger(first, 100).is_some());

        // Next block, HF moved by less than the default 20 bps hysteresis.
        let second = snapshot(user, 9_945, false);
        assert!(resolver.check_edge_trigger(second, 101).is_none());
    }

    #[test]
    fn test_edge_trigger_fires_as_worsened_past_hysteresis_band() {
        let resolver = resolver();
        let user = Address::repeat_byte(1);

        let first = snapshot(user, 9_950, false);
        assert!(resolver.check_edge_trigger(first, 100).is_some());

        let second = snapshot(user, 9_900, false);
        let trigger = resolver
            .check_edge_trigger(second, 101)
            .expect("worsening past hysteresis band must emit");
        assert_eq!(trigger.reason, TriggerReason::Worsened);
    }

    #[test]
    fn test_edge_trigger_not_reemitted_on_improvement() {
        let resolver = resolver();
        let user = Address::repeat_byte(1);

        let first = snapshot(user, 9_900, false);
        assert!(resolver.check_edge_trigger(first, 100).is_some());

        // Still below threshold but improved — must not re-trigger, only
        // worsening does.
        let second = snapshot(user, 9_980, false);
        assert!(resolver.check_edge_trigger(second, 101).is_none());
    }

    #[test]
    fn test_recovery_above_threshold_clears_state_and_rearms() {
        let resolver = resolver();
        let user = Address::repeat_byte(1);

        let first = snapshot(user, 9_900, false);
        assert!(resolver.check_edge_trigger(first, 100).is_some());

        // Recovers fully above threshold: no emission, state cleared.
        let recovered = snapshot(user, 10_100, false);
        assert!(resolver.check_edge_trigger(recovered, 101).is_none());

        // Crosses back down later: treated as a fresh Safe -> Liq, not
        // suppressed by the old hysteresis state.
        let crossed_again = snapshot(user, 9_995, false);
        let trigger = resolver
            .check_edge_trigger(crossed_again, 102)
            .expect("re-crossing after recovery must emit");
        assert_eq!(trigger.reason, TriggerReason::SafeToLiq);
    }
}
