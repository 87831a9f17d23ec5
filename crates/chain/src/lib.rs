//! HyperLend chain interaction layer.
//!
//! This crate provides:
//! - Provider management for HTTP and WebSocket connections
//! - Contract bindings for Pool, BalancesReader, Oracle, Liquidator
//! - Event listeners for real-time oracle and pool events
//! - Oracle price monitoring and caching
//! - DualOracle tier tracking for LST assets
//! - Transaction signing and sending

mod backfiller;
mod block_boundary;
pub mod contracts;
mod dual_oracle;
mod event_listener;
mod multicall;
mod oracle_monitor;
pub mod protocol;
mod provider;
mod rpc_pool;
mod signer;
mod tx_submitter;

pub use backfiller::{BackfillRange, BackfillReport, Backfiller};
pub use block_boundary::BlockBoundaryController;
pub use contracts::{
    encode_liquidation_call, event_signatures, fetch_onchain_reserves, LiquidatorContract,
    OnChainReserveRaw, OracleAggregator, PoolContract, PoolLiquidationParams, SwapAllocation,
    MAX_DEBT_TO_COVER,
};
pub use dual_oracle::{DualOracleMonitor, DualOracleTier, TierTransition};
pub use event_listener::{EventListener, OracleType, OracleUpdate, PoolEvent};
pub use multicall::{CallResult, MicroMulticall, PendingCall, ReaderBalance, MULTICALL3_ADDRESS};
pub use oracle_monitor::{OracleMonitor, OraclePrice};
pub use provider::{BalanceData, ProviderManager};
pub use rpc_pool::{
    mask_url, EndpointHealth, EndpointRole, RpcError, RpcPool, RpcPoolStats, SubmissionFailure,
};
pub use signer::{NonceManager, TransactionSender};
pub use tx_submitter::{
    describe_pool, GasBumpSchedule, RevertBudget, SubmissionMode, SubmissionOutcome, SubmitError,
    TxSubmitter,
};
