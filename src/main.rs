//! HyperLend Liquidation Bot
//!
//! High-performance liquidation bot for HyperLend (Aave V3 fork) on HyperLiquid EVM.
//! Features:
//! - Event-driven architecture via WebSocket subscriptions
//! - Tiered position tracking (Critical/Hot/Warm/Cold)
//! - Pre-staged transactions for sub-100ms latency
//! - DualOracle monitoring for LST arbitrage opportunities

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use liquidator_api::{BlockAnaliticaClient, LiqdClient};
use liquidator_chain::{
    Backfiller, BlockBoundaryController, DualOracleMonitor, EndpointRole, EventListener,
    GasBumpSchedule, LiquidatorContract, OracleMonitor, OracleType, ProviderManager, RpcPool,
    TransactionSender, TxSubmitter,
};
use liquidator_core::{
    AssetRegistry, BotConfig, CriticalLane, DirtySet, HealthResolver, HeartbeatPredictor, Hotlist,
    Liquidator, LiquidationAuditor, MetricsRegistry, PreStager, PredictiveOrchestrator,
    PriceWindowTracker, ReserveCatalog, Scanner, ScannerConfig, Supervisor, TieredPositionTracker,
    ASSETS, exit_code, init_config,
};

/// Environment variable names.
mod env {
    pub const ALCHEMY_WS_URL: &str = "ALCHEMY_WS_URL";
    pub const ALCHEMY_HTTP_URL: &str = "ALCHEMY_HTTP_URL";
    pub const ARCHIVE_RPC: &str = "ARCHIVE_RPC";
    pub const SEND_RPC: &str = "SEND_RPC";
    pub const PRIVATE_KEY: &str = "PRIVATE_KEY";
    pub const PROFIT_RECEIVER: &str = "PROFIT_RECEIVER";
    pub const POOL: &str = "POOL";
    pub const BALANCES_READER: &str = "BALANCES_READER";
    pub const LIQUIDATOR: &str = "LIQUIDATOR";
    /// Comma-separated additional public write endpoints, beyond `SEND_RPC`.
    pub const WRITE_RPC_EXTRA: &str = "WRITE_RPC_EXTRA";
    /// Comma-separated private relay endpoints (e.g. a builder-submission
    /// RPC). Optional — `TxSubmitter` falls back to the write pool without one.
    pub const RELAY_RPC: &str = "RELAY_RPC";
    /// Additional executor keys: `PRIVATE_KEY_2`, `PRIVATE_KEY_3`, ... up to
    /// `execution.executor_key_count` from the bot config.
    pub fn private_key_n(n: u32) -> String {
        format!("PRIVATE_KEY_{n}")
    }
}

/// Safety ceiling on optimistic (unsimulated) reverts the critical lane is
/// allowed to eat in a rolling 24h window before it stops submitting new
/// attempts and relies on the simulated swap-routed path only.
const MAX_REVERTS_PER_DAY: u32 = 50;

#[tokio::main]
async fn main() -> Result<()> {
    // Print startup banner
    print_banner();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,liquidator_core=debug,liquidator_chain=debug")),
        )
        .init();

    // Load and initialize bot config (MUST be done before any core module usage)
    // Use BOT_PROFILE env var to select: testing, production, aggressive, or file path
    let bot_config = BotConfig::from_env();
    bot_config.log_config();
    init_config(bot_config);

    info!("Starting HyperLend Liquidation Bot");
    info!("Chain: HyperLiquid EVM (999)");
    info!("Block time: 200ms");

    // Load RPC/contract configuration
    let config = load_config()?;

    // Initialize components
    let (scanner, metrics, mut supervisor) = match initialize_components(config).await {
        Ok(parts) => parts,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize components");
            std::process::exit(exit_code::CONFIG_ERROR);
        }
    };

    // Bootstrap
    info!("Bootstrapping...");
    scanner.bootstrap().await?;

    // Run the main event loop under supervision: a fatal error anywhere in
    // the scanner's spawned tasks trips the shared shutdown signal rather
    // than taking down the process silently.
    info!("Starting main event loop...");
    let run_handle = tokio::spawn(async move {
        if let Err(e) = scanner.run().await {
            tracing::error!(error = %e, "Scanner run loop exited with error");
        }
    });
    supervisor.supervise("scanner-run", run_handle);

    let code = supervisor.run_until_shutdown(std::time::Duration::from_secs(30)).await;
    metrics.log_snapshot();
    std::process::exit(code);
}

/// Configuration loaded from environment.
struct Config {
    ws_url: String,
    http_url: String,
    archive_url: String,
    send_url: String,
    pool: alloy::primitives::Address,
    balances_reader: alloy::primitives::Address,
    liquidator_contract: alloy::primitives::Address,
    profit_receiver: alloy::primitives::Address,
    private_key: String,
}

fn load_config() -> Result<Config> {
    let get_env = |name: &str| -> Result<String> {
        std::env::var(name).map_err(|_| anyhow::anyhow!("Missing env var: {}", name))
    };

    let get_address = |name: &str| -> Result<alloy::primitives::Address> {
        get_env(name)?
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid address for {}: {}", name, e))
    };

    Ok(Config {
        ws_url: get_env(env::ALCHEMY_WS_URL)?,
        http_url: get_env(env::ALCHEMY_HTTP_URL)
            .unwrap_or_else(|_| "https://rpc.hyperlend.finance".to_string()),
        archive_url: get_env(env::ARCHIVE_RPC)
            .unwrap_or_else(|_| "https://rpc.hyperlend.finance/archive".to_string()),
        send_url: get_env(env::SEND_RPC)
            .unwrap_or_else(|_| "https://rpc.hyperliquid.xyz/evm".to_string()),
        pool: get_address(env::POOL)
            .unwrap_or_else(|_| "0x00A89d7a5A02160f20150EbEA7a2b5E4879A1A8b".parse().unwrap()),
        balances_reader: get_address(env::BALANCES_READER)
            .unwrap_or_else(|_| "0xE17ea42a8d61e50a26bec1829399071d2129845b".parse().unwrap()),
        liquidator_contract: get_address(env::LIQUIDATOR)?,
        profit_receiver: get_address(env::PROFIT_RECEIVER)?,
        private_key: get_env(env::PRIVATE_KEY)?,
    })
}

async fn initialize_components(
    config: Config,
) -> Result<(Scanner, Arc<MetricsRegistry>, Supervisor)> {
    info!("Initializing components...");

    // Provider manager
    let provider = Arc::new(
        ProviderManager::new(
            &config.http_url,
            &config.archive_url,
            &config.send_url,
            &config.ws_url,
            config.pool,
            config.balances_reader,
        )
        .await?,
    );

    info!(
        pool = %config.pool,
        balances_reader = %config.balances_reader,
        "Provider initialized"
    );

    // Asset registry
    let assets = Arc::new(AssetRegistry::new());
    info!(asset_count = ASSETS.len(), "Asset registry loaded");

    // Build oracle configs for event listener
    let oracle_configs: Vec<_> = ASSETS
        .iter()
        .filter(|a| a.active)
        .map(|a| {
            let oracle_type = match a.oracle_type {
                liquidator_core::OracleType::Standard => OracleType::Standard,
                liquidator_core::OracleType::RedStone => OracleType::RedStone,
                liquidator_core::OracleType::Pyth => OracleType::Pyth,
                liquidator_core::OracleType::DualOracle => OracleType::DualOracle,
                liquidator_core::OracleType::PendlePT => OracleType::PendlePT,
            };
            (a.oracle, a.token, oracle_type)
        })
        .collect();

    // Event listener
    let event_listener = Arc::new(EventListener::new(
        &config.ws_url,
        config.pool,
        oracle_configs,
    ));
    info!("Event listener configured");

    // Position tracker
    let tracker = Arc::new(TieredPositionTracker::new());

    // Oracle monitor
    let oracle_monitor = Arc::new(OracleMonitor::new(provider.clone()));

    // Register oracle-asset mappings
    for asset in ASSETS.iter().filter(|a| a.active) {
        oracle_monitor.register_oracle(asset.oracle, asset.token);
    }

    // DualOracle monitor (LST assets)
    let dual_oracle_addrs: Vec<_> = assets
        .dual_oracle_assets()
        .map(|a| a.oracle)
        .collect();
    let dual_oracle_monitor = Arc::new(DualOracleMonitor::new(dual_oracle_addrs));
    info!(
        lst_count = assets.dual_oracle_assets().count(),
        "DualOracle monitor initialized"
    );

    // Heartbeat predictor
    let heartbeat_predictor = Arc::new(HeartbeatPredictor::new());

    // Pre-stager
    let pre_stager = Arc::new(PreStager::new());

    // API clients
    let blockanalitica = Arc::new(BlockAnaliticaClient::new());
    let liqd_client = Arc::new(LiqdClient::new());

    // Transaction sender (for signing and sending liquidation transactions)
    let tx_sender = Arc::new(TransactionSender::new(
        &config.private_key,
        &config.send_url,
        999, // HyperLiquid EVM chain ID
    ).await?);
    info!(
        address = %tx_sender.address,
        "Transaction sender initialized"
    );

    // Additional executor keys, if the bot config asks for more than one and
    // the matching PRIVATE_KEY_n env vars are present. Missing keys are
    // logged and skipped rather than treated as fatal, since rotation across
    // N keys degrades gracefully to rotation across however many loaded.
    let cfg = liquidator_core::config();
    let mut executor_senders = vec![tx_sender.clone()];
    for n in 2..=cfg.execution.executor_key_count {
        match std::env::var(env::private_key_n(n)) {
            Ok(key) => match TransactionSender::new(&key, &config.send_url, 999).await {
                Ok(sender) => {
                    info!(address = %sender.address, key_index = n, "Additional executor key loaded");
                    executor_senders.push(Arc::new(sender));
                }
                Err(e) => warn_skip_key(n, &e),
            },
            Err(_) => warn!(key_index = n, "no PRIVATE_KEY_n env var set, skipping"),
        }
    }
    let executor_addresses: Vec<_> = executor_senders.iter().map(|s| s.address).collect();

    // Liquidator contract (with the primary sender, for the swap-routed path)
    let liquidator_contract = LiquidatorContract::with_sender(
        config.liquidator_contract,
        tx_sender.clone(),
    );

    // Liquidator
    let liquidator = Arc::new(Liquidator::new(
        provider.clone(),
        liquidator_contract,
        liqd_client,
        config.profit_receiver,
    ));

    // RPC pools backing the critical lane's direct submission path.
    let mut write_urls = vec![config.send_url.clone()];
    if let Ok(extra) = std::env::var(env::WRITE_RPC_EXTRA) {
        write_urls.extend(extra.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from));
    }
    let write_pool = Arc::new(RpcPool::new(EndpointRole::Write, write_urls));
    let relay_pool = std::env::var(env::RELAY_RPC).ok().and_then(|csv| {
        let urls: Vec<String> = csv.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect();
        if urls.is_empty() {
            None
        } else {
            Some(Arc::new(RpcPool::new(EndpointRole::Relay, urls)))
        }
    });
    info!(
        writers = write_pool.healthy_count(),
        relay = relay_pool.is_some(),
        "RPC submission pools initialized"
    );

    let gas_bump = GasBumpSchedule {
        first_bump_delay: std::time::Duration::from_millis(cfg.execution.gas_bump.first_bump_delay_ms),
        second_bump_delay: std::time::Duration::from_millis(cfg.execution.gas_bump.second_bump_delay_ms),
        first_bump_factor: cfg.execution.gas_bump.first_bump_factor,
        max_bumps: cfg.execution.gas_bump.max_bumps,
    };
    let tx_submitter = Arc::new(TxSubmitter::new_with_budget_policy(
        executor_senders,
        write_pool,
        relay_pool,
        gas_bump,
        MAX_REVERTS_PER_DAY,
        cfg.execution.gas_bump.max_bumps_per_day,
        cfg.execution.gas_bump.revert_budget_shared,
    ));

    // Block-boundary tracking (HyperLiquid EVM targets ~200ms blocks).
    let block_boundary = Arc::new(BlockBoundaryController::new(200));

    let reserve_catalog = Arc::new(ReserveCatalog::new(assets.clone(), std::time::Duration::from_secs(300)));

    let micro_multicall = Arc::new(liquidator_chain::MicroMulticall::new(config.http_url.clone()));
    let health_resolver = Arc::new(
        HealthResolver::new(tracker.clone(), cfg.execution.health_resolver.clone()).with_onchain_refresh(
            micro_multicall,
            config.balances_reader,
            config.pool,
            reserve_catalog.clone(),
        ),
    );

    let critical_lane = Arc::new(CriticalLane::new(
        config.pool,
        tx_submitter,
        block_boundary.clone(),
        reserve_catalog.clone(),
        tracker.clone(),
        health_resolver.clone(),
        cfg.execution.dispatch.clone(),
        cfg.execution.intent.clone(),
    ));
    let dirty_set = Arc::new(DirtySet::new(cfg.execution.dirty_set.dirty_set_capacity));
    let hotlist = Arc::new(Hotlist::new(cfg.execution.dirty_set.hotlist_capacity));
    let price_windows = Arc::new(PriceWindowTracker::new());
    let predictive = Arc::new(PredictiveOrchestrator::new(
        tracker.clone(),
        price_windows.clone(),
        cfg.execution.predictive.clone(),
        cfg.execution.health_resolver.execution_hf_threshold_bps,
    ));
    let auditor = Arc::new(LiquidationAuditor::new(
        executor_addresses,
        dirty_set.clone(),
        cfg.execution.intent.min_debt_usd,
        std::time::Duration::from_secs(60),
    ));
    let backfiller = Arc::new(Backfiller::new(
        config.http_url.clone(),
        config.pool,
        cfg.execution.backfill.backfill_chunk_blocks,
        cfg.execution.backfill.backfill_max_logs,
    ));
    let metrics = Arc::new(MetricsRegistry::new());

    // Scanner config
    let scanner_config = ScannerConfig::default();

    // Scanner
    let scanner = Scanner::new(
        tracker,
        oracle_monitor,
        dual_oracle_monitor,
        heartbeat_predictor,
        pre_stager,
        price_windows,
        liquidator,
        event_listener,
        blockanalitica,
        provider,
        assets,
        health_resolver.clone(),
        dirty_set,
        hotlist,
        predictive,
        critical_lane,
        block_boundary,
        auditor,
        reserve_catalog,
        metrics.clone(),
        backfiller,
        scanner_config,
    );

    let supervisor = Supervisor::new(metrics.clone()).with_health_resolver(health_resolver);

    info!("All components initialized");

    Ok((scanner, metrics, supervisor))
}

/// Log a non-fatal failure loading one of the optional additional executor
/// keys. A broken key beyond the first should degrade rotation capacity,
/// not abort startup.
fn warn_skip_key(n: u32, err: &anyhow::Error) {
    tracing::warn!(key_index = n, error = %err, "Failed to load additional executor key, skipping");
}

/// Print startup banner.
fn print_banner() {
    println!(r#"
    ╦ ╦┬ ┬┌─┐┌─┐┬─┐╦  ┌─┐┌┐┌┌┬┐
    ╠═╣└┬┘├─┘├┤ ├┬┘║  ├┤ │││ ││
    ╩ ╩ ┴ ┴  └─┘┴└─╩═╝└─┘┘└┘─┴┘
    Liquidation Bot v0.1.0
    "#);
}
