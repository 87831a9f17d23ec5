//! Micro-batching of read calls via Multicall3's `aggregate3`.
//!
//! [`ProviderManager::get_positions_batch`](crate::provider::ProviderManager)
//! already batches *position* fetches with bounded concurrency over separate
//! RPC calls. During bootstrap and backfill we also need to batch many
//! *small, independent* `eth_call`s (reserve data, balances, single prices)
//! into as few round trips as possible — that's what `aggregate3` is for.

use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::sol;
use alloy::sol_types::SolCall;
use anyhow::Result;
use tracing::{debug, warn};

sol! {
    #[derive(Debug)]
    struct Call3 {
        address target;
        bool allowFailure;
        bytes callData;
    }

    #[derive(Debug)]
    struct Result3 {
        bool success;
        bytes returnData;
    }

    #[sol(rpc)]
    interface IMulticall3 {
        function aggregate3(Call3[] calldata calls) external payable returns (Result3[] memory returnData);
    }
}

sol! {
    #[derive(Debug)]
    struct ReaderBalanceEntry {
        address underlying;
        uint256 amount;
        uint256 price;
        uint256 decimals;
    }

    interface IBalancesReaderBatch {
        function getAllSuppliedBalancesWithPrices(address pool, address user) external view returns (ReaderBalanceEntry[] memory);
        function getAllBorrowedBalancesWithPrices(address pool, address user) external view returns (ReaderBalanceEntry[] memory);
    }
}

/// Supply or borrow balance entry read back from a batched
/// `BalancesReader` call, independent of the `ProviderManager`'s own
/// `BalanceData` (this module has no dependency on `crate::provider`).
#[derive(Debug, Clone)]
pub struct ReaderBalance {
    pub underlying: Address,
    pub amount: U256,
    pub price: U256,
    pub decimals: u8,
}

impl From<ReaderBalanceEntry> for ReaderBalance {
    fn from(entry: ReaderBalanceEntry) -> Self {
        Self {
            underlying: entry.underlying,
            amount: entry.amount,
            price: entry.price,
            decimals: entry.decimals.to::<u8>(),
        }
    }
}

/// Canonical Multicall3 deployment address (same on every EVM chain that has
/// deployed it via the deterministic CREATE2 factory, HyperLiquid EVM included).
pub const MULTICALL3_ADDRESS: Address = Address::new([
    0xca, 0x11, 0xbd, 0xe0, 0x59, 0x77, 0xb3, 0x63, 0x11, 0x67, 0x02, 0x88, 0x62, 0xbe, 0x2a, 0x17,
    0x39, 0x76, 0xca, 0x11,
]);

/// One queued call awaiting batching.
#[derive(Debug, Clone)]
pub struct PendingCall {
    pub target: Address,
    pub calldata: Bytes,
    /// If false, a revert in this call aborts the whole aggregate3 batch.
    pub allow_failure: bool,
}

/// Outcome of a single call within a batch.
#[derive(Debug, Clone)]
pub struct CallResult {
    pub success: bool,
    pub return_data: Bytes,
}

/// Thin wrapper around a deployed Multicall3 contract.
pub struct MicroMulticall {
    address: Address,
    rpc_url: String,
}

impl MicroMulticall {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            address: MULTICALL3_ADDRESS,
            rpc_url: rpc_url.into(),
        }
    }

    pub fn with_address(rpc_url: impl Into<String>, address: Address) -> Self {
        Self {
            address,
            rpc_url: rpc_url.into(),
        }
    }

    /// Execute a batch of calls in a single `eth_call`, preserving order.
    pub async fn aggregate(&self, calls: Vec<PendingCall>) -> Result<Vec<CallResult>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let contract = IMulticall3::new(self.address, &provider);

        let sol_calls: Vec<Call3> = calls
            .iter()
            .map(|c| Call3 {
                target: c.target,
                allowFailure: c.allow_failure,
                callData: c.calldata.clone(),
            })
            .collect();

        let batch_len = sol_calls.len();
        debug!(batch_len, multicall = %self.address, "Submitting aggregate3 batch");

        let results = contract.aggregate3(sol_calls).call().await?;

        let failed = results._0.iter().filter(|r| !r.success).count();
        if failed > 0 {
            warn!(failed, batch_len, "Some calls in multicall batch failed");
        }

        Ok(results
            ._0
            .into_iter()
            .map(|r| CallResult {
                success: r.success,
                return_data: r.returnData,
            })
            .collect())
    }

    /// Split an arbitrarily large call list into chunks and aggregate each,
    /// to stay under typical RPC payload/gas limits for `eth_call`.
    pub async fn aggregate_chunked(
        &self,
        calls: Vec<PendingCall>,
        chunk_size: usize,
    ) -> Result<Vec<CallResult>> {
        let chunk_size = chunk_size.max(1);
        let mut all_results = Vec::with_capacity(calls.len());
        for chunk in calls.chunks(chunk_size) {
            let results = self.aggregate(chunk.to_vec()).await?;
            all_results.extend(results);
        }
        Ok(all_results)
    }

    /// Batch a user's supplied and borrowed balances from `BalancesReader`
    /// into a single `aggregate3` round trip — the reverification read used
    /// by `HealthResolver::refresh`/`CriticalLane::try_execute` before
    /// acting on a position, instead of the two separate `eth_call`s
    /// `ProviderManager::get_position_data` issues concurrently.
    pub async fn fetch_user_balances(
        &self,
        balances_reader: Address,
        pool: Address,
        user: Address,
    ) -> Result<(Vec<ReaderBalance>, Vec<ReaderBalance>)> {
        let supplied_call = IBalancesReaderBatch::getAllSuppliedBalancesWithPricesCall { pool, user };
        let borrowed_call = IBalancesReaderBatch::getAllBorrowedBalancesWithPricesCall { pool, user };

        let calls = vec![
            PendingCall {
                target: balances_reader,
                calldata: Bytes::from(supplied_call.abi_encode()),
                allow_failure: false,
            },
            PendingCall {
                target: balances_reader,
                calldata: Bytes::from(borrowed_call.abi_encode()),
                allow_failure: false,
            },
        ];

        let results = self.aggregate(calls).await?;
        if results.len() != 2 {
            anyhow::bail!(
                "expected 2 results from balances-reader multicall batch, got {}",
                results.len()
            );
        }
        if !results[0].success || !results[1].success {
            anyhow::bail!("balances-reader multicall batch reverted for user {user}");
        }

        let supplied = IBalancesReaderBatch::getAllSuppliedBalancesWithPricesCall::abi_decode_returns(
            &results[0].return_data,
            true,
        )?;
        let borrowed = IBalancesReaderBatch::getAllBorrowedBalancesWithPricesCall::abi_decode_returns(
            &results[1].return_data,
            true,
        )?;

        Ok((
            supplied._0.into_iter().map(ReaderBalance::from).collect(),
            borrowed._0.into_iter().map(ReaderBalance::from).collect(),
        ))
    }

    /// Encode an ERC20 `balanceOf(address)` call — a common multicall target.
    pub fn encode_balance_of(holder: Address) -> Bytes {
        sol! {
            function balanceOf(address account) external view returns (uint256);
        }
        Bytes::from(balanceOfCall { account: holder }.abi_encode())
    }

    /// Decode a `uint256` return value (e.g. from `balanceOf`).
    pub fn decode_uint256(data: &Bytes) -> Option<U256> {
        if data.len() < 32 {
            return None;
        }
        Some(U256::from_be_slice(&data[..32]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multicall3_address_is_canonical() {
        assert_eq!(
            format!("{:?}", MULTICALL3_ADDRESS).to_lowercase(),
            "0xca11bde05977b3631167028862be2a173976ca11"
        );
    }

    #[test]
    fn test_encode_balance_of_nonempty() {
        let encoded = MicroMulticall::encode_balance_of(Address::ZERO);
        assert_eq!(encoded.len(), 4 + 32);
    }

    #[test]
    fn test_decode_uint256_roundtrip() {
        let value = U256::from(123456u64);
        let data = Bytes::from(value.to_be_bytes_vec());
        assert_eq!(MicroMulticall::decode_uint256(&data), Some(value));
    }
}
