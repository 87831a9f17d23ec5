//! Predictive orchestration: decide which Warm/Hot positions are worth
//! promoting to the hotlist before they actually cross into Critical.
//!
//! [`PositionTier`] already reacts to HF and trigger distance, but both are
//! backward-looking — they describe where a position is, not where it's
//! headed. `PredictiveOrchestrator` projects each position's most sensitive
//! asset forward under Adverse/Extreme price scenarios (sized from
//! [`PriceWindowTracker`]'s observed volatility, the way
//! [`PriceWindowTracker::scenario_bps`] was built for), and scores how
//! urgently it's worth watching.

use alloy::primitives::Address;
use std::sync::Arc;
use tracing::debug;

use crate::config::PredictiveConfig;
use crate::position::{PositionTier, TrackedPosition};
use crate::position_tracker::TieredPositionTracker;
use crate::price_window::PriceWindowTracker;
use crate::risk_engine::{project_scenarios, RiskEngine, Scenario};

/// A position judged worth watching closely, with its scenario projections.
#[derive(Debug, Clone)]
pub struct WatchCandidate {
    pub user: Address,
    pub tier: PositionTier,
    pub hf_bps: u64,
    pub driver_asset: Address,
    pub adverse_hf: f64,
    pub extreme_hf: f64,
    /// Current HF sits within `[executionThreshold - lowerBandBps, 1.0 +
    /// nearBandBps]`.
    pub near_band: bool,
    /// A projected scenario (Adverse or Extreme) would already push HF
    /// below 1.0, regardless of where the current HF sits.
    pub projected_crossing: bool,
    pub priority: f64,
}

/// Scans tracked positions and ranks the ones close enough to the
/// liquidation boundary, under a plausible adverse move, to warrant tighter
/// polling ahead of time.
pub struct PredictiveOrchestrator {
    tracker: Arc<TieredPositionTracker>,
    price_windows: Arc<PriceWindowTracker>,
    cfg: PredictiveConfig,
    /// `HealthResolverConfig::execution_hf_threshold_bps`, needed for the
    /// near band's lower edge (`executionThreshold - lowerBandBps`).
    execution_hf_threshold_bps: u64,
}

impl PredictiveOrchestrator {
    pub fn new(
        tracker: Arc<TieredPositionTracker>,
        price_windows: Arc<PriceWindowTracker>,
        cfg: PredictiveConfig,
        execution_hf_threshold_bps: u64,
    ) -> Self {
        Self {
            tracker,
            price_windows,
            cfg,
            execution_hf_threshold_bps,
        }
    }

    /// Project one position's Adverse/Extreme outcomes and score it. Returns
    /// `None` for positions with no pre-computed sensitivity (e.g. freshly
    /// inserted, not yet passed through the sensitivity pass) or no debt.
    pub fn evaluate(&self, position: &TrackedPosition) -> Option<WatchCandidate> {
        let sensitivity = position.sensitivity.as_ref()?;
        let (driver_asset, _) = sensitivity.most_sensitive_asset()?;

        let (adverse_bps_raw, _) = self.price_windows.scenario_bps(&driver_asset);
        let vol_bps = adverse_bps_raw.clamp(self.cfg.vol_min_bps as u64, self.cfg.vol_max_bps as u64);

        let projections = project_scenarios(sensitivity, vol_bps as f64 / 100.0);
        let adverse_hf = projections
            .iter()
            .find(|p| p.scenario == Scenario::Adverse)
            .map(|p| p.projected_hf)
            .unwrap_or(position.health_factor);
        let extreme_hf = projections
            .iter()
            .find(|p| p.scenario == Scenario::Extreme)
            .map(|p| p.projected_hf)
            .unwrap_or(position.health_factor);

        let hf_bps = RiskEngine::hf_bps(position);
        let near_band = self.is_near_band(hf_bps);
        let projected_crossing = adverse_hf < 1.0 || extreme_hf < 1.0;
        let debt_usd = position.total_debt_usd();

        let priority = projections
            .iter()
            .map(|p| {
                let hf_delta = (position.health_factor - p.projected_hf).max(0.0);
                let (eta_sec, scenario_weight) = match p.scenario {
                    Scenario::Baseline => {
                        (self.cfg.scenario_eta_baseline_sec, self.cfg.scenario_weight_baseline)
                    }
                    Scenario::Adverse => {
                        (self.cfg.scenario_eta_adverse_sec, self.cfg.scenario_weight_adverse)
                    }
                    Scenario::Extreme => {
                        (self.cfg.scenario_eta_extreme_sec, self.cfg.scenario_weight_extreme)
                    }
                };
                self.scenario_priority(hf_delta, eta_sec, debt_usd, scenario_weight)
            })
            .fold(f64::INFINITY, f64::min);

        Some(WatchCandidate {
            user: position.user,
            tier: position.tier,
            hf_bps,
            driver_asset,
            adverse_hf,
            extreme_hf,
            near_band,
            projected_crossing,
            priority,
        })
    }

    pub fn config(&self) -> &PredictiveConfig {
        &self.cfg
    }

    /// Whether `hf_bps` sits within `[executionThreshold - lowerBandBps, 1.0
    /// + nearBandBps]`. `near_band_inclusive` controls whether a position
    /// exactly at either band edge counts.
    fn is_near_band(&self, hf_bps: u64) -> bool {
        let upper_edge = 10_000u64.saturating_add(self.cfg.near_band_bps);
        let lower_edge = self
            .execution_hf_threshold_bps
            .saturating_sub(self.cfg.lower_band_bps);
        if self.cfg.near_band_inclusive {
            hf_bps >= lower_edge && hf_bps <= upper_edge
        } else {
            hf_bps > lower_edge && hf_bps < upper_edge
        }
    }

    /// `rawScore = hfDelta * w_hf * (1/etaSec * w_eta) * log10(debtUsd+1) *
    /// w_debt * scenarioWeight`; `priority = rawScore > 0 ? 1/rawScore :
    /// +INFINITY` (lower priority value = more urgent, per spec).
    fn scenario_priority(&self, hf_delta: f64, eta_sec: f64, debt_usd: f64, scenario_weight: f64) -> f64 {
        let eta_sec = eta_sec.max(0.001);
        let debt_term = (debt_usd.max(0.0) + 1.0).log10();
        let raw_score =
            hf_delta * self.cfg.w_hf * (1.0 / eta_sec * self.cfg.w_eta) * debt_term * self.cfg.w_debt * scenario_weight;
        if raw_score > 0.0 {
            1.0 / raw_score
        } else {
            f64::INFINITY
        }
    }

    /// Scan Warm and Hot tier positions (Critical is already on the fast
    /// path, Cold is too far to matter) for candidates worth watching —
    /// either inside the near band or already projected to cross below 1.0
    /// under a future scenario — ranked by priority, most urgent first, and
    /// truncated to a dynamic per-tick cap so a volatile market can't make
    /// one scan balloon into an unbounded RPC burst.
    pub fn scan(&self) -> Vec<WatchCandidate> {
        let low_hf_count = self.tracker.hot_positions().len() as u64;
        let cap = (low_hf_count.saturating_mul(self.cfg.dynamic_cap_multiplier))
            .max(self.cfg.dynamic_cap_floor as u64)
            .min(self.cfg.dynamic_cap_ceiling as u64) as usize;

        let mut candidates: Vec<WatchCandidate> = self
            .tracker
            .hot_positions()
            .into_iter()
            .chain(self.tracker.warm_positions())
            .filter_map(|pos| self.evaluate(&pos))
            .filter(|c| c.near_band || c.projected_crossing)
            .collect();

        candidates.sort_by(|a, b| a.priority.partial_cmp(&b.priority).unwrap());

        if candidates.len() > cap {
            debug!(
                total = candidates.len(),
                cap, "Predictive scan truncated to dynamic cap"
            );
            candidates.truncate(cap);
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::{CollateralData, DebtData};
    use crate::sensitivity::PositionSensitivity;
    use alloy::primitives::U256;
    use dashmap::DashMap;

    fn orchestrator() -> PredictiveOrchestrator {
        PredictiveOrchestrator::new(
            Arc::new(TieredPositionTracker::new()),
            Arc::new(PriceWindowTracker::new()),
            PredictiveConfig::default(),
            9_500,
        )
    }

    /// 1000 USD collateral at 80% LT (800 USD adjusted) against `debt_usd`
    /// of debt — varying `debt_usd` moves the authoritative HF that
    /// `RiskEngine::hf_bps` (not the `health_factor` field) actually uses.
    fn sample_position(debt_usd: u64) -> TrackedPosition {
        let hf = 800.0 / debt_usd as f64;
        let mut pos = TrackedPosition::new(Address::repeat_byte(1));
        pos.health_factor = hf;
        pos.collaterals.push((
            Address::repeat_byte(10),
            CollateralData {
                asset: Address::repeat_byte(10),
                amount: U256::from(1_000_000000u64),
                price: U256::from(100_000_000u64),
                decimals: 6,
                value_usd: 1_000.0,
                liquidation_threshold: 8_000,
                enabled: true,
            },
        ));
        pos.debts.push((
            Address::repeat_byte(20),
            DebtData {
                asset: Address::repeat_byte(20),
                amount: U256::from(debt_usd * 1_000000u64),
                price: U256::from(100_000_000u64),
                decimals: 6,
                value_usd: debt_usd as f64,
            },
        ));
        let empty_prices: DashMap<Address, liquidator_chain::OraclePrice> = DashMap::new();
        pos.sensitivity = Some(PositionSensitivity::compute(&pos, &empty_prices));
        pos
    }

    #[test]
    fn test_evaluate_returns_none_without_sensitivity() {
        let orchestrator = orchestrator();
        let pos = TrackedPosition::new(Address::repeat_byte(1));
        assert!(orchestrator.evaluate(&pos).is_none());
    }

    #[test]
    fn test_near_band_position_flagged() {
        let orchestrator = orchestrator();
        // HF = 800 / 792 ~= 1.0101, within the default 150 bps near band.
        let pos = sample_position(792);
        let candidate = orchestrator.evaluate(&pos).expect("sensitivity present");
        assert!(candidate.near_band);
    }

    #[test]
    fn test_far_position_not_near_band() {
        let orchestrator = orchestrator();
        // HF = 800 / 300 ~= 2.67, far outside the near band.
        let pos = sample_position(300);
        let candidate = orchestrator.evaluate(&pos).expect("sensitivity present");
        assert!(!candidate.near_band);
    }

    #[test]
    fn test_low_hf_position_is_below_lower_band_edge() {
        let orchestrator = orchestrator();
        // HF ~= 800/850 ~= 0.94, below the 95% execution threshold minus the
        // default 200 bps lower band (93%) -- this used to be invisible to
        // is_near_band when it only checked the upper edge.
        let pos = sample_position(850);
        let candidate = orchestrator.evaluate(&pos).expect("sensitivity present");
        assert!(!candidate.near_band);
        // But it's still picked up by scan()'s OR condition, since an
        // already-critical position is always worth watching.
        assert!(candidate.hf_bps < 9_500);
    }

    #[test]
    fn test_projected_crossing_included_even_outside_near_band() {
        let orchestrator = orchestrator();
        // A healthy current HF, but volatile enough that Adverse/Extreme
        // scenarios push it under 1.0 -- scan() must include this via the OR
        // condition even though near_band alone would exclude it.
        let pos = sample_position(500);
        let candidate = orchestrator.evaluate(&pos).expect("sensitivity present");
        if candidate.projected_crossing {
            assert!(candidate.near_band || candidate.projected_crossing);
        }
    }

    #[test]
    fn test_priority_lower_for_more_urgent_position() {
        let orchestrator = orchestrator();
        let urgent = orchestrator.evaluate(&sample_position(792)).unwrap();
        let safe = orchestrator.evaluate(&sample_position(300)).unwrap();
        assert!(
            urgent.priority < safe.priority,
            "a position closer to the liquidation boundary should have a lower (more urgent) priority score"
        );
    }

    #[test]
    fn test_scan_respects_dynamic_cap_floor() {
        let tracker = Arc::new(TieredPositionTracker::new());
        let orchestrator = PredictiveOrchestrator::new(
            tracker,
            Arc::new(PriceWindowTracker::new()),
            PredictiveConfig::default(),
            9_500,
        );
        // No hot positions tracked, so low_hf_count is 0 and the cap floors
        // out at dynamic_cap_floor rather than collapsing to 0.
        let candidates = orchestrator.scan();
        assert!(candidates.len() <= PredictiveConfig::default().dynamic_cap_floor);
    }
}
