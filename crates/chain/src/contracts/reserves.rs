//! On-chain reserve enumeration for the dynamic reserve catalog.
//!
//! Mirrors the read half of [`super::pool`]'s write path: instead of
//! encoding a call, this decodes `Pool.getReservesList()` +
//! `Pool.getConfiguration(asset)` into the liquidation-relevant fields the
//! core crate's reserve catalog needs, using Aave V3's packed
//! `ReserveConfigurationMap` bit layout (`ReserveConfiguration.sol`:
//! bits 0-15 LTV, 16-31 liquidation threshold, 32-47 liquidation bonus,
//! 48-55 decimals, bit 56 active, bit 57 frozen).

use alloy::primitives::{Address, U256};
use alloy::providers::ProviderBuilder;
use alloy::sol;
use anyhow::Result;
use tracing::warn;

sol! {
    #[sol(rpc)]
    interface IPoolView {
        function getReservesList() external view returns (address[] memory);
        function getConfiguration(address asset) external view returns (uint256);
    }
}

/// One reserve's liquidation-relevant configuration, decoded from the
/// packed word `Pool.getConfiguration` returns. Deliberately a plain struct
/// (not `liquidator_core`'s `OnChainReserve`) so this crate doesn't need a
/// dependency back on `liquidator-core` just to describe chain data.
#[derive(Debug, Clone, Copy)]
pub struct OnChainReserveRaw {
    pub token: Address,
    pub decimals: u8,
    pub liquidation_threshold_bps: u16,
    pub liquidation_bonus_bps: u16,
    pub active: bool,
}

/// Decode the packed `ReserveConfigurationMap` word. Only the low 64 bits
/// carry fields this catalog cares about, so reading a single limb is
/// enough.
fn decode_configuration(data: U256) -> (u16, u16, u8, bool) {
    let word: u64 = data.as_limbs()[0];
    let liquidation_threshold = ((word >> 16) & 0xFFFF) as u16;
    let liquidation_bonus = ((word >> 32) & 0xFFFF) as u16;
    let decimals = ((word >> 48) & 0xFF) as u8;
    let active = (word >> 56) & 0x1 != 0;
    (liquidation_threshold, liquidation_bonus, decimals, active)
}

/// Enumerate every listed reserve and decode its liquidation-relevant
/// configuration. Best-effort per reserve: one reserve whose
/// `getConfiguration` call reverts or times out is logged and skipped
/// rather than aborting the whole refresh, the same partial-failure
/// discipline `Backfiller` applies to a bad log chunk.
pub async fn fetch_onchain_reserves(
    rpc_url: &str,
    pool_address: Address,
) -> Result<Vec<OnChainReserveRaw>> {
    let provider = ProviderBuilder::new().on_http(rpc_url.parse()?);
    let pool = IPoolView::new(pool_address, &provider);

    let reserves = pool.getReservesList().call().await?._0;
    let mut out = Vec::with_capacity(reserves.len());

    for token in reserves {
        match pool.getConfiguration(token).call().await {
            Ok(config) => {
                let (liquidation_threshold_bps, liquidation_bonus_bps, decimals, active) =
                    decode_configuration(config._0);
                out.push(OnChainReserveRaw {
                    token,
                    decimals,
                    liquidation_threshold_bps,
                    liquidation_bonus_bps,
                    active,
                });
            }
            Err(e) => {
                warn!(token = %token, error = %e, "failed to fetch reserve configuration, skipping");
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_configuration_extracts_expected_fields() {
        let mut data: u64 = 0;
        data |= 8_500u64 << 16;
        data |= 10_500u64 << 32;
        data |= 18u64 << 48;
        data |= 1u64 << 56;

        let (lt, bonus, decimals, active) = decode_configuration(U256::from(data));
        assert_eq!(lt, 8_500);
        assert_eq!(bonus, 10_500);
        assert_eq!(decimals, 18);
        assert!(active);
    }

    #[test]
    fn test_decode_configuration_inactive_reserve() {
        let data: u64 = 5_000u64 << 16;
        let (_, _, _, active) = decode_configuration(U256::from(data));
        assert!(!active);
    }
}
