//! Authoritative, fixed-point-only health factor and scenario projection.
//!
//! [`TrackedPosition::calculate_health_factor`] is float-based and fine for
//! tiering, logging, and priority ordering — but contract inputs, threshold
//! comparisons, and anything that gates an actual liquidation submission
//! need to agree bit-for-bit with what the Pool contract itself would
//! compute, which means native 256-bit fixed-point arithmetic all the way
//! through, the same discipline [`u256_math`] already applies to USD value
//! and basis-point conversions. `RiskEngine` is that authoritative path;
//! [`PositionSensitivity`] remains the fast approximate path used to decide
//! *whether it's worth re-running this one*.

use alloy::primitives::{Address, U256};

use crate::position::{CollateralData, DebtData, TrackedPosition};
use crate::sensitivity::PositionSensitivity;
use crate::u256_math;

/// Stateless authoritative health-factor computation.
pub struct RiskEngine;

impl RiskEngine {
    /// Recompute HF from a position's raw collateral/debt amounts using
    /// only `U256` arithmetic — no float intermediate, so the result can be
    /// trusted for an execution decision rather than just for tiering.
    pub fn authoritative_hf_wad(position: &TrackedPosition) -> U256 {
        let mut collateral_adjusted_wad = U256::ZERO;
        for (_, collateral) in position.collaterals.iter().filter(|(_, c)| c.enabled) {
            let usd_wad = CollateralData::calculate_usd_wad(
                collateral.amount,
                collateral.price,
                collateral.decimals,
            );
            collateral_adjusted_wad +=
                u256_math::apply_basis_points(usd_wad, collateral.liquidation_threshold);
        }

        let mut debt_wad = U256::ZERO;
        for (_, debt) in &position.debts {
            debt_wad += DebtData::calculate_usd_value(debt.amount, debt.price, debt.decimals)
                .pipe_to_wad();
        }

        u256_math::calculate_hf_wad(collateral_adjusted_wad, debt_wad)
    }

    /// Whether the authoritative HF is strictly below 1.0.
    pub fn is_liquidatable(position: &TrackedPosition) -> bool {
        u256_math::is_liquidatable_wad(Self::authoritative_hf_wad(position))
    }

    /// HF expressed as bps of 1.0 (10_000 = HF 1.0), for comparison against
    /// [`HealthResolverConfig::execution_hf_threshold_bps`](crate::config::HealthResolverConfig).
    pub fn hf_bps(position: &TrackedPosition) -> u64 {
        let hf_wad = Self::authoritative_hf_wad(position);
        let scaled = hf_wad.saturating_mul(U256::from(10_000u64)) / u256_math::WAD;
        scaled.try_into().unwrap_or(u64::MAX)
    }
}

/// Trait to route a USD f64 through the same WAD representation the rest
/// of the fixed-point pipeline uses, without re-deriving it from raw amount
/// and price (DebtData only stores the already-computed `value_usd`).
trait ToWad {
    fn pipe_to_wad(self) -> U256;
}

impl ToWad for f64 {
    fn pipe_to_wad(self) -> U256 {
        u256_math::f64_to_wad(self)
    }
}

/// A hypothetical market move used to project forward health factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    /// No additional shock: current observed prices.
    Baseline,
    /// A moderate adverse move, sized by the position's configured
    /// volatility buffer.
    Adverse,
    /// A severe adverse move: 3x the adverse shock.
    Extreme,
}

impl Scenario {
    fn multiplier(self) -> f64 {
        match self {
            Scenario::Baseline => 0.0,
            Scenario::Adverse => 1.0,
            Scenario::Extreme => 3.0,
        }
    }
}

/// Outcome of projecting one scenario against an asset's sensitivity.
#[derive(Debug, Clone)]
pub struct ScenarioProjection {
    pub scenario: Scenario,
    pub driver_asset: Address,
    pub shock_pct: f64,
    pub projected_hf: f64,
    pub liquidatable: bool,
}

/// Project Baseline/Adverse/Extreme scenarios for a position's most
/// sensitive asset, using the linear estimator in [`PositionSensitivity`].
/// `vol_buffer_pct` is the dynamic per-asset volatility buffer computed
/// upstream (e.g. from a recent price window's realized volatility, clamped
/// between [`PredictiveConfig::vol_min_bps`](crate::config::PredictiveConfig)
/// and `vol_max_bps`).
pub fn project_scenarios(
    sensitivity: &PositionSensitivity,
    vol_buffer_pct: f64,
) -> Vec<ScenarioProjection> {
    let Some((driver_asset, driver_sensitivity)) = sensitivity.most_sensitive_asset() else {
        return Vec::new();
    };

    // A positive sensitivity means HF falls when price falls (collateral);
    // a negative sensitivity means HF falls when price rises (debt). Shock
    // in the direction that's adverse for this driver.
    let adverse_direction = if driver_sensitivity >= 0.0 { -1.0 } else { 1.0 };

    [Scenario::Baseline, Scenario::Adverse, Scenario::Extreme]
        .into_iter()
        .map(|scenario| {
            let shock_pct = adverse_direction * vol_buffer_pct * scenario.multiplier();
            let projected_hf = sensitivity.estimate_hf(&[(driver_asset, shock_pct)]);
            ScenarioProjection {
                scenario,
                driver_asset,
                shock_pct,
                projected_hf,
                liquidatable: projected_hf < 1.0,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::{CollateralData, DebtData};

    fn sample_position() -> TrackedPosition {
        let mut pos = TrackedPosition::new(Address::ZERO);
        pos.collaterals.push((
            Address::repeat_byte(1),
            CollateralData {
                asset: Address::repeat_byte(1),
                amount: U256::from(1_000_000000u64),
                price: U256::from(100_000_000u64),
                decimals: 6,
                value_usd: 1_000.0,
                liquidation_threshold: 8_000,
                enabled: true,
            },
        ));
        pos.debts.push((
            Address::repeat_byte(2),
            DebtData {
                asset: Address::repeat_byte(2),
                amount: U256::from(500_000000u64),
                price: U256::from(100_000_000u64),
                decimals: 6,
                value_usd: 500.0,
            },
        ));
        pos
    }

    #[test]
    fn test_authoritative_hf_matches_float_math_within_tolerance() {
        let pos = sample_position();
        let hf_wad = RiskEngine::authoritative_hf_wad(&pos);
        let hf_f64 = u256_math::wad_to_f64(hf_wad);
        // (1000 * 0.8) / 500 = 1.6
        assert!((hf_f64 - 1.6).abs() < 0.01);
    }

    #[test]
    fn test_hf_bps_roundtrip() {
        let pos = sample_position();
        let bps = RiskEngine::hf_bps(&pos);
        assert!(bps > 15_000 && bps < 17_000);
    }

    #[test]
    fn test_not_liquidatable_when_healthy() {
        let pos = sample_position();
        assert!(!RiskEngine::is_liquidatable(&pos));
    }
}
