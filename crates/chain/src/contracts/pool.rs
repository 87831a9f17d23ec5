//! Direct Aave V3 Pool liquidation interface.
//!
//! Unlike [`super::ILiquidator`], which routes through a custom executor
//! contract that swaps seized collateral before repaying debt, this module
//! encodes calls directly against the protocol's own `Pool` contract using
//! its native `liquidationCall`. No swap step, no custom contract: the
//! liquidator receives either the underlying collateral or the aToken and
//! is responsible for doing whatever it wants with it afterwards.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

sol! {
    /// Native Aave V3 Pool liquidation entrypoint.
    interface IPoolLiquidation {
        function liquidationCall(
            address collateralAsset,
            address debtAsset,
            address user,
            uint256 debtToCover,
            bool receiveAToken
        ) external;
    }
}

/// Parameters for a direct `Pool.liquidationCall`.
#[derive(Debug, Clone)]
pub struct PoolLiquidationParams {
    pub collateral_asset: Address,
    pub debt_asset: Address,
    pub user: Address,
    pub debt_to_cover: U256,
    pub receive_atoken: bool,
}

/// Encode a direct `liquidationCall` against the Pool contract.
pub fn encode_liquidation_call(params: &PoolLiquidationParams) -> Bytes {
    let call = IPoolLiquidation::liquidationCallCall {
        collateralAsset: params.collateral_asset,
        debtAsset: params.debt_asset,
        user: params.user,
        debtToCover: params.debt_to_cover,
        receiveAToken: params.receive_atoken,
    };
    Bytes::from(call.abi_encode())
}

/// Sentinel for "cover the maximum the close factor allows".
/// Aave's Pool treats any debtToCover greater than the user's actual debt
/// as "cover everything the close factor permits" — passing U256::MAX is
/// the idiomatic way to say "take the max".
pub const MAX_DEBT_TO_COVER: U256 = U256::MAX;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_liquidation_call_selector() {
        let params = PoolLiquidationParams {
            collateral_asset: Address::ZERO,
            debt_asset: Address::ZERO,
            user: Address::ZERO,
            debt_to_cover: U256::from(1000u64),
            receive_atoken: false,
        };

        let encoded = encode_liquidation_call(&params);
        assert!(!encoded.is_empty());
        // function liquidationCall(address,address,address,uint256,bool) = 0x00a718a9
        assert_eq!(hex::encode(&encoded[0..4]), "00a718a9");
    }

    #[test]
    fn test_max_debt_to_cover_is_max_u256() {
        assert_eq!(MAX_DEBT_TO_COVER, U256::MAX);
    }
}
