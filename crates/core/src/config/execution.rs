//! Execution-pipeline configuration: health resolution, intent building,
//! gas bumping, dispatch timing, backfill, and predictive tiering.
//!
//! [`BotConfig`](super::BotConfig) already covers position filtering, tier
//! thresholds, and basic liquidation parameters. This module holds the
//! knobs for the faster, more specialized pipeline stages that sit on top
//! of that: the ones that decide *when* to recompute a health factor, *how*
//! to size and race a transaction, and *how far ahead* to look for a price
//! move that would flip a position liquidatable.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Health resolution caching and edge-trigger behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResolverConfig {
    /// How long a cached snapshot is trusted before a tier-1 read is forced.
    #[serde(default = "default_snapshot_ttl_ms")]
    pub snapshot_ttl_ms: u64,

    /// TTL for the micro-multicall tier before falling back to a full refresh.
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    /// HF threshold (in bps of 1.0, i.e. 10_000 = HF 1.0) below which a
    /// position is considered execution-eligible.
    #[serde(default = "default_execution_hf_threshold_bps")]
    pub execution_hf_threshold_bps: u64,

    /// Hysteresis band around the threshold to avoid flapping re-triggers
    /// on noisy price updates.
    #[serde(default = "default_hysteresis_bps")]
    pub hysteresis_bps: u64,
}

fn default_snapshot_ttl_ms() -> u64 {
    250
}
fn default_cache_ttl_ms() -> u64 {
    1_000
}
fn default_execution_hf_threshold_bps() -> u64 {
    10_000
}
fn default_hysteresis_bps() -> u64 {
    20
}

impl Default for HealthResolverConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl_ms: default_snapshot_ttl_ms(),
            cache_ttl_ms: default_cache_ttl_ms(),
            execution_hf_threshold_bps: default_execution_hf_threshold_bps(),
            hysteresis_bps: default_hysteresis_bps(),
        }
    }
}

impl HealthResolverConfig {
    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_millis(self.snapshot_ttl_ms)
    }
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

/// How much of a position's debt a liquidation intent targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloseFactorPolicy {
    /// Cover at most 50% of the user's debt, the Aave V3 default close factor.
    Fixed50,
    /// Cover up to the full debt (post-HEALTHY_DEBT close-factor-100 forks).
    Full,
}

impl Default for CloseFactorPolicy {
    fn default() -> Self {
        CloseFactorPolicy::Fixed50
    }
}

/// Intent-building parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentConfig {
    #[serde(default)]
    pub close_factor_policy: CloseFactorPolicy,

    /// Minimum outstanding debt (USD) for a position to be worth building
    /// an intent for, independent of the profitability gate.
    #[serde(default = "default_min_debt_usd")]
    pub min_debt_usd: f64,

    /// Minimum expected profit (USD, liquidation bonus on the covered debt)
    /// for an intent to be worth submitting.
    #[serde(default = "default_min_profit_usd")]
    pub min_profit_usd: f64,

    /// Whether to request the aToken instead of the underlying on
    /// liquidation (skips an extra withdraw step for some deployments).
    #[serde(default)]
    pub receive_atoken: bool,

    /// Maximum age of a staged intent before it must be rebuilt rather
    /// than dispatched as-is.
    #[serde(default = "default_max_intent_age_ms")]
    pub max_intent_age_ms: u64,

    /// Debt assets (as hex strings), in priority order, that the operator
    /// wants covered when a user holds one of them — overrides the default
    /// pick-the-largest-USD-debt selection. Empty means no preference.
    #[serde(default)]
    pub preferred_debt_assets: Vec<String>,
}

fn default_min_debt_usd() -> f64 {
    1.0
}
fn default_min_profit_usd() -> f64 {
    1.0
}
fn default_max_intent_age_ms() -> u64 {
    2_000
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            close_factor_policy: CloseFactorPolicy::default(),
            min_debt_usd: default_min_debt_usd(),
            min_profit_usd: default_min_profit_usd(),
            receive_atoken: false,
            max_intent_age_ms: default_max_intent_age_ms(),
            preferred_debt_assets: Vec::new(),
        }
    }
}

impl IntentConfig {
    pub fn max_intent_age(&self) -> Duration {
        Duration::from_millis(self.max_intent_age_ms)
    }

    /// Parsed allow-list, skipping any entry that doesn't parse as an
    /// address rather than failing config load over one bad string.
    pub fn preferred_debt_addresses(&self) -> Vec<alloy::primitives::Address> {
        self.preferred_debt_assets
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect()
    }
}

/// RPC hedged-read behavior, shared by the Read and Relay pools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcHedgeConfig {
    /// Delay before firing a hedge request alongside the primary one.
    #[serde(default = "default_hedge_delay_ms")]
    pub hedge_delay_ms: u64,

    /// Skip hedging entirely for batches at or below this call count — the
    /// overhead of a second round trip isn't worth it for a handful of calls.
    #[serde(default = "default_hedge_min_calls")]
    pub hedge_min_calls: usize,
}

fn default_hedge_delay_ms() -> u64 {
    80
}
fn default_hedge_min_calls() -> usize {
    5
}

impl Default for RpcHedgeConfig {
    fn default() -> Self {
        Self {
            hedge_delay_ms: default_hedge_delay_ms(),
            hedge_min_calls: default_hedge_min_calls(),
        }
    }
}

impl RpcHedgeConfig {
    pub fn hedge_delay(&self) -> Duration {
        Duration::from_millis(self.hedge_delay_ms)
    }
}

/// Gas bump / replace-by-fee scheduling for in-flight submissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasBumpConfig {
    #[serde(default = "default_first_bump_delay_ms")]
    pub first_bump_delay_ms: u64,
    #[serde(default = "default_second_bump_delay_ms")]
    pub second_bump_delay_ms: u64,
    /// Multiplier applied on the first bump (e.g. 1.125 = +12.5%, the
    /// minimum most clients require to accept a replacement).
    #[serde(default = "default_first_bump_factor")]
    pub first_bump_factor: f64,
    #[serde(default = "default_max_bumps")]
    pub max_bumps: u32,
    /// Daily cap on bumps across all submissions, to bound gas spend from a
    /// runaway repricing loop.
    #[serde(default = "default_max_bumps_per_day")]
    pub max_bumps_per_day: u32,
    /// Whether the daily optimistic-revert budget (and `max_bumps_per_day`)
    /// is shared across every rotating executor key, or tracked separately
    /// per key. Spec leaves this ambiguous; default is per-key (`false`),
    /// matching `maxBumpsPerDay`'s "per executor key" wording.
    #[serde(default)]
    pub revert_budget_shared: bool,
}

fn default_first_bump_delay_ms() -> u64 {
    600
}
fn default_second_bump_delay_ms() -> u64 {
    1_200
}
fn default_first_bump_factor() -> f64 {
    1.125
}
fn default_max_bumps() -> u32 {
    3
}
fn default_max_bumps_per_day() -> u32 {
    200
}

impl Default for GasBumpConfig {
    fn default() -> Self {
        Self {
            first_bump_delay_ms: default_first_bump_delay_ms(),
            second_bump_delay_ms: default_second_bump_delay_ms(),
            first_bump_factor: default_first_bump_factor(),
            max_bumps: default_max_bumps(),
            max_bumps_per_day: default_max_bumps_per_day(),
            revert_budget_shared: false,
        }
    }
}

impl GasBumpConfig {
    pub fn first_bump_delay(&self) -> Duration {
        Duration::from_millis(self.first_bump_delay_ms)
    }
    pub fn second_bump_delay(&self) -> Duration {
        Duration::from_millis(self.second_bump_delay_ms)
    }
}

/// Block-boundary dispatch limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum number of distinct transactions to submit within one block.
    #[serde(default = "default_max_dispatches_per_block")]
    pub max_dispatches_per_block: u32,

    /// How long before the estimated block boundary to prefer sending.
    #[serde(default = "default_send_ms_before")]
    pub send_ms_before: u64,

    /// Abort a critical-lane attempt if end-to-end latency exceeds this.
    #[serde(default = "default_latency_abort_ms")]
    pub latency_abort_ms: u64,
}

fn default_max_dispatches_per_block() -> u32 {
    4
}
fn default_send_ms_before() -> u64 {
    40
}
fn default_latency_abort_ms() -> u64 {
    1_500
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_dispatches_per_block: default_max_dispatches_per_block(),
            send_ms_before: default_send_ms_before(),
            latency_abort_ms: default_latency_abort_ms(),
        }
    }
}

impl DispatchConfig {
    pub fn send_before(&self) -> Duration {
        Duration::from_millis(self.send_ms_before)
    }
    pub fn latency_abort(&self) -> Duration {
        Duration::from_millis(self.latency_abort_ms)
    }
}

/// Historical log backfill limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillConfig {
    /// How many blocks back to scan on a cold start.
    #[serde(default = "default_backfill_blocks")]
    pub backfill_blocks: u64,
    /// Chunk size for each `eth_getLogs` call.
    #[serde(default = "default_backfill_chunk_blocks")]
    pub backfill_chunk_blocks: u64,
    /// Abandon a chunk (and shrink) if it would return more than this many
    /// logs, to stay under provider response-size limits.
    #[serde(default = "default_backfill_max_logs")]
    pub backfill_max_logs: usize,
}

fn default_backfill_blocks() -> u64 {
    50_000
}
fn default_backfill_chunk_blocks() -> u64 {
    2_000
}
fn default_backfill_max_logs() -> usize {
    10_000
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            backfill_blocks: default_backfill_blocks(),
            backfill_chunk_blocks: default_backfill_chunk_blocks(),
            backfill_max_logs: default_backfill_max_logs(),
        }
    }
}

/// Predictive orchestrator scenario and near-band tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictiveConfig {
    /// Width of the "near" band above 1.0 (in bps) within which a position
    /// is watched even though it hasn't crossed the threshold yet. Upper
    /// edge of the near-band window.
    #[serde(default = "default_near_band_bps")]
    pub near_band_bps: u64,

    /// Whether the near-band comparison is inclusive (<=) of the boundary.
    #[serde(default = "default_near_band_inclusive")]
    pub near_band_inclusive: bool,

    /// How far below `executionHfThresholdBps` (in bps) the near band's
    /// lower edge sits, e.g. 200 = 2%. Positions between this floor and
    /// `near_band_bps` above 1.0 are in the watched window even when not
    /// yet execution-eligible; positions below the floor are already the
    /// critical lane's problem.
    #[serde(default = "default_lower_band_bps")]
    pub lower_band_bps: u64,

    /// Minimum and maximum dynamic volatility buffer, in bps, used to widen
    /// the near band during turbulent markets.
    #[serde(default = "default_vol_min_bps")]
    pub vol_min_bps: u64,
    #[serde(default = "default_vol_max_bps")]
    pub vol_max_bps: u64,

    /// Fallback-timer cadence: the predictive scan also runs unconditionally
    /// every `fallback_interval_ms` or `fallback_interval_blocks`, whichever
    /// elapses first, independent of block/event-driven triggers.
    #[serde(default = "default_fallback_interval_ms")]
    pub fallback_interval_ms: u64,
    #[serde(default = "default_fallback_interval_blocks")]
    pub fallback_interval_blocks: u64,

    /// Dynamic per-tick cap on scanned/emitted candidates:
    /// `max(lowHfCount * dynamic_cap_multiplier, dynamic_cap_floor)`,
    /// capped by `dynamic_cap_ceiling`.
    #[serde(default = "default_dynamic_cap_multiplier")]
    pub dynamic_cap_multiplier: u64,
    #[serde(default = "default_dynamic_cap_floor")]
    pub dynamic_cap_floor: usize,
    #[serde(default = "default_dynamic_cap_ceiling")]
    pub dynamic_cap_ceiling: usize,

    /// Priority-score weights: `rawScore = hfDelta * w_hf * (1/etaSec *
    /// w_eta) * log10(debtUsd+1) * w_debt * scenarioWeight`.
    #[serde(default = "default_weight")]
    pub w_hf: f64,
    #[serde(default = "default_weight")]
    pub w_eta: f64,
    #[serde(default = "default_weight")]
    pub w_debt: f64,

    /// Per-scenario weight multipliers and assumed time-to-impact (seconds)
    /// used as `etaSec` in the priority formula — a larger shock is assumed
    /// to be a faster-moving event, so `Extreme` gets the shortest eta and
    /// the largest weight.
    #[serde(default = "default_scenario_weight_baseline")]
    pub scenario_weight_baseline: f64,
    #[serde(default = "default_scenario_weight_adverse")]
    pub scenario_weight_adverse: f64,
    #[serde(default = "default_scenario_weight_extreme")]
    pub scenario_weight_extreme: f64,
    #[serde(default = "default_scenario_eta_baseline_sec")]
    pub scenario_eta_baseline_sec: f64,
    #[serde(default = "default_scenario_eta_adverse_sec")]
    pub scenario_eta_adverse_sec: f64,
    #[serde(default = "default_scenario_eta_extreme_sec")]
    pub scenario_eta_extreme_sec: f64,
}

fn default_near_band_bps() -> u64 {
    150
}
fn default_near_band_inclusive() -> bool {
    true
}
fn default_lower_band_bps() -> u64 {
    200
}
fn default_vol_min_bps() -> u64 {
    50
}
fn default_vol_max_bps() -> u64 {
    500
}
fn default_fallback_interval_ms() -> u64 {
    5_000
}
fn default_fallback_interval_blocks() -> u64 {
    20
}
fn default_dynamic_cap_multiplier() -> u64 {
    4
}
fn default_dynamic_cap_floor() -> usize {
    100
}
fn default_dynamic_cap_ceiling() -> usize {
    2_000
}
fn default_weight() -> f64 {
    1.0
}
fn default_scenario_weight_baseline() -> f64 {
    1.0
}
fn default_scenario_weight_adverse() -> f64 {
    1.5
}
fn default_scenario_weight_extreme() -> f64 {
    2.5
}
fn default_scenario_eta_baseline_sec() -> f64 {
    300.0
}
fn default_scenario_eta_adverse_sec() -> f64 {
    60.0
}
fn default_scenario_eta_extreme_sec() -> f64 {
    15.0
}

impl Default for PredictiveConfig {
    fn default() -> Self {
        Self {
            near_band_bps: default_near_band_bps(),
            near_band_inclusive: default_near_band_inclusive(),
            lower_band_bps: default_lower_band_bps(),
            vol_min_bps: default_vol_min_bps(),
            vol_max_bps: default_vol_max_bps(),
            fallback_interval_ms: default_fallback_interval_ms(),
            fallback_interval_blocks: default_fallback_interval_blocks(),
            dynamic_cap_multiplier: default_dynamic_cap_multiplier(),
            dynamic_cap_floor: default_dynamic_cap_floor(),
            dynamic_cap_ceiling: default_dynamic_cap_ceiling(),
            w_hf: default_weight(),
            w_eta: default_weight(),
            w_debt: default_weight(),
            scenario_weight_baseline: default_scenario_weight_baseline(),
            scenario_weight_adverse: default_scenario_weight_adverse(),
            scenario_weight_extreme: default_scenario_weight_extreme(),
            scenario_eta_baseline_sec: default_scenario_eta_baseline_sec(),
            scenario_eta_adverse_sec: default_scenario_eta_adverse_sec(),
            scenario_eta_extreme_sec: default_scenario_eta_extreme_sec(),
        }
    }
}

impl PredictiveConfig {
    pub fn fallback_interval(&self) -> Duration {
        Duration::from_millis(self.fallback_interval_ms)
    }
}

/// Price-service staleness and poll-fallback behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceServiceConfig {
    /// A feed older than this is considered stale and excluded from HF math.
    #[serde(default = "default_staleness_seconds")]
    pub staleness_seconds: u64,

    /// Disable a feed's push subscription and fall back to polling after
    /// this many consecutive decode/connection errors.
    #[serde(default = "default_poll_disable_after_errors")]
    pub poll_disable_after_errors: u32,
}

fn default_staleness_seconds() -> u64 {
    120
}
fn default_poll_disable_after_errors() -> u32 {
    5
}

impl Default for PriceServiceConfig {
    fn default() -> Self {
        Self {
            staleness_seconds: default_staleness_seconds(),
            poll_disable_after_errors: default_poll_disable_after_errors(),
        }
    }
}

impl PriceServiceConfig {
    pub fn staleness(&self) -> Duration {
        Duration::from_secs(self.staleness_seconds)
    }
}

/// Bounded queue capacities for the dirty-set / hotlist pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirtySetConfig {
    #[serde(default = "default_dirty_set_capacity")]
    pub dirty_set_capacity: usize,
    #[serde(default = "default_hotlist_capacity")]
    pub hotlist_capacity: usize,
}

fn default_dirty_set_capacity() -> usize {
    2_048
}
fn default_hotlist_capacity() -> usize {
    64
}

impl Default for DirtySetConfig {
    fn default() -> Self {
        Self {
            dirty_set_capacity: default_dirty_set_capacity(),
            hotlist_capacity: default_hotlist_capacity(),
        }
    }
}

/// Top-level execution-pipeline configuration, nested under [`BotConfig`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub health_resolver: HealthResolverConfig,
    #[serde(default)]
    pub intent: IntentConfig,
    #[serde(default)]
    pub rpc_hedge: RpcHedgeConfig,
    #[serde(default)]
    pub gas_bump: GasBumpConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub backfill: BackfillConfig,
    #[serde(default)]
    pub predictive: PredictiveConfig,
    #[serde(default)]
    pub price_service: PriceServiceConfig,
    #[serde(default)]
    pub dirty_set: DirtySetConfig,
    /// Number of rotating keys available to the submitter's executor pool.
    #[serde(default = "default_executor_key_count")]
    pub executor_key_count: u32,
}

fn default_executor_key_count() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_config_defaults_roundtrip_toml() {
        let config = ExecutionConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: ExecutionConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(
            parsed.health_resolver.execution_hf_threshold_bps,
            config.health_resolver.execution_hf_threshold_bps
        );
    }

    #[test]
    fn test_close_factor_policy_default_is_fixed50() {
        assert_eq!(CloseFactorPolicy::default(), CloseFactorPolicy::Fixed50);
    }

    #[test]
    fn test_hedge_min_calls_skips_small_batches() {
        let cfg = RpcHedgeConfig::default();
        assert!(cfg.hedge_min_calls >= 1);
    }
}
