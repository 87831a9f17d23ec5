//! Critical-lane execution: the direct Aave-native liquidation path, gated
//! by a per-user attempt lock and a block-boundary submission window.
//!
//! [`Liquidator`] already builds and executes the swap-routed path through
//! the custom executor contract, but SPEC_FULL.md describes exactly one
//! execution architecture for this lane: IntentBuilder -> direct
//! `Pool.liquidationCall` (see
//! [`contracts::pool`](liquidator_chain::PoolLiquidationParams)) -> race
//! through [`TxSubmitter`]. A `DashSet`-backed attempt lock keeps two
//! concurrent triggers for the same user (a price tick and a pool event
//! landing in the same tick) from submitting two transactions against the
//! same position. Each attempt walks a fixed sequence of phases — snapshot,
//! plan, latency gate, submit — with per-phase timing reported to tracing,
//! mirroring the `[E2E TIMING]` logging `Liquidator::execute_with_retry`
//! already does for the swap-routed path.

use alloy::primitives::{Address, B256, U256};
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::config::{CloseFactorPolicy, DispatchConfig, IntentConfig};
use crate::errors::{LiquidatorError, UnbuildableReason};
use crate::health_resolver::HealthResolver;
use crate::position::{DebtData, TrackedPosition};
use crate::position_tracker::TieredPositionTracker;
use crate::reserve_catalog::ReserveCatalog;
use crate::risk_engine::RiskEngine;

/// bps denominator for liquidation-bonus profit math, as an f64 — the
/// profit estimate here is a priority/gating heuristic (see FixedPoint's
/// rule that float is only for scoring, never contract inputs), so it
/// doesn't need `u256_math::BPS_DENOMINATOR`'s fixed-point precision.
const BPS_F64: f64 = 10_000.0;

/// A price is considered to have "moved" for intent-revalidation purposes
/// once it drifts by this many basis points (5%) from the price an intent
/// was built against.
const PRICE_REVALIDATION_BPS: u64 = 500;

use liquidator_chain::{
    encode_liquidation_call, BlockBoundaryController, PoolLiquidationParams, SubmissionMode,
    SubmitError, TxSubmitter, MAX_DEBT_TO_COVER,
};

/// Outcome of one critical-lane attempt for a user.
#[derive(Debug, Clone)]
pub struct CriticalLaneOutcome {
    pub user: Address,
    pub attempted: bool,
    pub tx_hash: Option<B256>,
    pub skipped_reason: Option<String>,
}

impl CriticalLaneOutcome {
    fn skipped(user: Address, reason: impl Into<String>) -> Self {
        Self {
            user,
            attempted: false,
            tx_hash: None,
            skipped_reason: Some(reason.into()),
        }
    }

    fn unbuildable(user: Address, err: LiquidatorError) -> Self {
        Self::skipped(user, err.to_string())
    }
}

/// Releases a user's attempt lock when dropped, so an early return (not
/// liquidatable, out of time, submission error) can't leak the lock.
struct AttemptGuard<'a> {
    in_flight: &'a DashSet<Address>,
    user: Address,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.user);
    }
}

/// A built-and-cached liquidation plan, keyed by `(user, debtAsset,
/// collateralAsset)`. Reused across attempts within `maxIntentAgeMs` as
/// long as neither the debt nor the collateral price has moved more than
/// `PRICE_REVALIDATION_BPS` since it was built.
#[derive(Debug, Clone)]
struct CachedIntent {
    calldata: alloy::primitives::Bytes,
    debt_to_cover: U256,
    collateral_price: U256,
    debt_price: U256,
    built_at: Instant,
}

fn price_moved_past(old: U256, new: U256, threshold_bps: u64) -> bool {
    if old.is_zero() {
        return !new.is_zero();
    }
    let diff = if new > old { new - old } else { old - new };
    diff.saturating_mul(U256::from(10_000u64)) / old >= U256::from(threshold_bps)
}

/// Direct Aave-native liquidation path: builds a `liquidationCall` against
/// the protocol's own Pool contract and races it through the submitter,
/// bypassing the swap-routing custom executor entirely.
pub struct CriticalLane {
    pool_address: Address,
    tx_submitter: Arc<TxSubmitter>,
    block_boundary: Arc<BlockBoundaryController>,
    reserve_catalog: Arc<ReserveCatalog>,
    tracker: Arc<TieredPositionTracker>,
    health_resolver: Arc<HealthResolver>,
    dispatch_cfg: DispatchConfig,
    intent_cfg: IntentConfig,
    in_flight: DashSet<Address>,
    intent_cache: DashMap<(Address, Address, Address), CachedIntent>,
}

impl CriticalLane {
    pub fn new(
        pool_address: Address,
        tx_submitter: Arc<TxSubmitter>,
        block_boundary: Arc<BlockBoundaryController>,
        reserve_catalog: Arc<ReserveCatalog>,
        tracker: Arc<TieredPositionTracker>,
        health_resolver: Arc<HealthResolver>,
        dispatch_cfg: DispatchConfig,
        intent_cfg: IntentConfig,
    ) -> Self {
        Self {
            pool_address,
            tx_submitter,
            block_boundary,
            reserve_catalog,
            tracker,
            health_resolver,
            dispatch_cfg,
            intent_cfg,
            in_flight: DashSet::new(),
            intent_cache: DashMap::new(),
        }
    }

    /// Attempt a direct liquidation for `user`, whose edge trigger (or
    /// critical-cycle sweep) fired at `triggered_at`. Acquires the per-user
    /// attempt lock for the duration of the call, reverifies the snapshot
    /// if stale, checks the position is actually liquidatable under the
    /// authoritative fixed-point HF, aborts if too much time has elapsed
    /// since the trigger or too little remains in the block, builds (or
    /// reuses a cached) close-factor-appropriate calldata, and submits it
    /// racing across the public and relay pools.
    #[instrument(skip(self), fields(user = %user))]
    pub async fn try_execute(&self, user: Address, triggered_at: Instant) -> CriticalLaneOutcome {
        let total_start = Instant::now();

        if !self.in_flight.insert(user) {
            return CriticalLaneOutcome::skipped(user, "already in flight for this user");
        }
        let _guard = AttemptGuard {
            in_flight: &self.in_flight,
            user,
        };

        // Phase 1: snapshot. Reverify on-chain if the cached snapshot is
        // older than `snapshotTtlMs` rather than trusting a possibly-stale
        // in-memory position.
        let micro_start = Instant::now();
        let position = match self.snapshot(user).await {
            Ok(Some(position)) => position,
            Ok(None) => return CriticalLaneOutcome::skipped(user, "position not tracked"),
            Err(e) => return CriticalLaneOutcome::skipped(user, format!("snapshot refresh failed: {e}")),
        };
        let micro_ms = micro_start.elapsed().as_millis();

        if !RiskEngine::is_liquidatable(&position) {
            return CriticalLaneOutcome::skipped(user, "not liquidatable under authoritative HF");
        }

        // Latency gate: abort if too much time has passed since the
        // trigger fired to plausibly still be worth racing.
        let since_trigger = triggered_at.elapsed();
        if since_trigger > self.dispatch_cfg.latency_abort() {
            warn!(
                user = %user,
                elapsed_ms = since_trigger.as_millis(),
                limit_ms = self.dispatch_cfg.latency_abort_ms,
                "Critical lane aborting: latency budget exceeded since trigger"
            );
            return CriticalLaneOutcome::skipped(user, "latency_abort");
        }

        let min_remaining = self.dispatch_cfg.send_before();
        if !self.block_boundary.has_time_to_submit(min_remaining) {
            return CriticalLaneOutcome::skipped(user, "insufficient time remaining in block");
        }

        // Phase 2: plan. Build (or reuse a cached, still-valid) intent.
        let plan_start = Instant::now();
        let plan = match self.build_or_reuse_intent(&position) {
            Ok(plan) => plan,
            Err(e) => return CriticalLaneOutcome::unbuildable(user, e),
        };
        let plan_build_ms = plan_start.elapsed().as_millis();

        // Phase 3: submit (gas pricing is fused into `TxSubmitter::submit`
        // itself, so priceGas and submit report as one combined phase).
        let submit_start = Instant::now();
        let outcome = self
            .tx_submitter
            .submit(self.pool_address, plan.calldata, SubmissionMode::Race, true)
            .await;
        let submit_ms = submit_start.elapsed().as_millis();
        let total_ms = total_start.elapsed().as_millis();

        info!(
            user = %user,
            micro_ms,
            plan_build_ms,
            submit_ms,
            total_ms,
            "Critical lane phase timing"
        );

        match outcome {
            Ok(outcome) => CriticalLaneOutcome {
                user,
                attempted: true,
                tx_hash: Some(outcome.tx_hash),
                skipped_reason: None,
            },
            Err(SubmitError::RevertBudgetExhausted) => {
                CriticalLaneOutcome::skipped(user, "revert budget exhausted, refusing optimistic submission")
            }
            Err(e) => CriticalLaneOutcome {
                user,
                attempted: true,
                tx_hash: None,
                skipped_reason: Some(e.to_string()),
            },
        }
    }

    /// Resolve the position to act on, reverifying via `HealthResolver`'s
    /// on-chain refresh if the cached snapshot has aged past
    /// `snapshotTtlMs`.
    async fn snapshot(&self, user: Address) -> anyhow::Result<Option<Arc<TrackedPosition>>> {
        if let Some(snap) = self.health_resolver.resolve(user) {
            if !self.health_resolver.is_execution_fresh(&snap) && self.health_resolver.has_onchain_refresh() {
                debug!(user = %user, age_ms = snap.age().as_millis(), "Snapshot stale, refreshing via micro-multicall");
                self.health_resolver.refresh_onchain(user).await?;
            }
        }
        Ok(self.tracker.get(&user))
    }

    /// Select the debt/collateral pair, apply the close-factor policy, run
    /// the debt/profit economic gates, and return ready-to-submit calldata
    /// — reusing a cached intent if one exists for this `(user, debtAsset,
    /// collateralAsset)` within `maxIntentAgeMs` and neither price has
    /// moved more than 5% since it was built.
    fn build_or_reuse_intent(&self, position: &TrackedPosition) -> Result<CachedIntent, LiquidatorError> {
        let user = position.user;

        let Some((collateral_asset, collateral)) = position.largest_collateral() else {
            return Err(LiquidatorError::Unbuildable {
                user: user.to_string(),
                reason: UnbuildableReason::NoViablePlan,
            });
        };
        let allow_list = self.intent_cfg.preferred_debt_addresses();
        let Some((debt_asset, debt)) = position.preferred_debt(&allow_list) else {
            return Err(LiquidatorError::Unbuildable {
                user: user.to_string(),
                reason: UnbuildableReason::NoViablePlan,
            });
        };

        let key = (user, *debt_asset, *collateral_asset);
        if let Some(cached) = self.intent_cache.get(&key) {
            let fresh_enough = cached.built_at.elapsed() < self.intent_cfg.max_intent_age();
            let prices_stable = !price_moved_past(cached.collateral_price, collateral.price, PRICE_REVALIDATION_BPS)
                && !price_moved_past(cached.debt_price, debt.price, PRICE_REVALIDATION_BPS);
            if fresh_enough && prices_stable {
                return Ok(cached.clone());
            }
        }

        let plan = self.build_intent(user, *collateral_asset, collateral, *debt_asset, debt)?;
        self.intent_cache.insert(key, plan.clone());
        Ok(plan)
    }

    fn build_intent(
        &self,
        user: Address,
        collateral_asset: Address,
        collateral: &crate::position::CollateralData,
        debt_asset: Address,
        debt: &DebtData,
    ) -> Result<CachedIntent, LiquidatorError> {
        let (debt_to_cover, debt_to_cover_usd) = match self.intent_cfg.close_factor_policy {
            CloseFactorPolicy::Fixed50 => (debt.amount / U256::from(2u8), debt.value_usd * 0.5),
            CloseFactorPolicy::Full => (MAX_DEBT_TO_COVER, debt.value_usd),
        };

        if debt_to_cover_usd < self.intent_cfg.min_debt_usd {
            return Err(LiquidatorError::Unbuildable {
                user: user.to_string(),
                reason: UnbuildableReason::DebtBelowThreshold,
            });
        }

        // Profit estimate is the liquidation-bonus premium on the covered
        // debt (SPEC_FULL S4.13's `expectedCollateralOut` formula collapses
        // to this once both sides are valued in USD), ignoring gas — gas is
        // accounted for by `TxSubmitter`'s own pricing, not this gate.
        let bonus_bps = self
            .reserve_catalog
            .get(&collateral_asset)
            .map(|r| r.liquidation_bonus_bps)
            .unwrap_or(0);
        let expected_profit_usd = debt_to_cover_usd * bonus_bps as f64 / BPS_F64;
        if expected_profit_usd < self.intent_cfg.min_profit_usd {
            return Err(LiquidatorError::Unbuildable {
                user: user.to_string(),
                reason: UnbuildableReason::ProfitBelowThreshold,
            });
        }

        let params = PoolLiquidationParams {
            collateral_asset,
            debt_asset,
            user,
            debt_to_cover,
            receive_atoken: self.intent_cfg.receive_atoken,
        };
        let calldata = encode_liquidation_call(&params);

        Ok(CachedIntent {
            calldata,
            debt_to_cover,
            collateral_price: collateral.price,
            debt_price: debt.price,
            built_at: Instant::now(),
        })
    }

    pub fn is_in_flight(&self, user: &Address) -> bool {
        self.in_flight.contains(user)
    }

    /// Drop any cached intent for `user` — called when the position
    /// closes or its raw state changes enough that a cached plan can no
    /// longer be trusted.
    pub fn forget(&self, user: &Address) {
        self.intent_cache.retain(|(u, _, _), _| u != user);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skipped_outcome_has_no_tx_hash() {
        let outcome = CriticalLaneOutcome::skipped(Address::ZERO, "test reason");
        assert!(!outcome.attempted);
        assert!(outcome.tx_hash.is_none());
        assert_eq!(outcome.skipped_reason.as_deref(), Some("test reason"));
    }

    #[test]
    fn test_price_moved_past_detects_five_percent_move() {
        let old = U256::from(100_000_000u64);
        let moved = U256::from(106_000_000u64); // +6%
        let not_moved = U256::from(102_000_000u64); // +2%
        assert!(price_moved_past(old, moved, PRICE_REVALIDATION_BPS));
        assert!(!price_moved_past(old, not_moved, PRICE_REVALIDATION_BPS));
    }

    #[test]
    fn test_price_moved_past_handles_zero_old_price() {
        assert!(!price_moved_past(U256::ZERO, U256::ZERO, PRICE_REVALIDATION_BPS));
        assert!(price_moved_past(U256::ZERO, U256::from(1u64), PRICE_REVALIDATION_BPS));
    }
}
