//! Scanner orchestration for the liquidation bot.
//!
//! Coordinates all components: event listening, position tracking,
//! pre-staging, and liquidation execution.

use alloy::primitives::{Address, U256};
use anyhow::Result;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use crate::assets::AssetRegistry;
use crate::auditor::{AuditOutcome, LiquidationAuditor};
use crate::config::config;
use crate::critical_lane::CriticalLane;
use crate::dirty_set::{DirtySet, Hotlist};
use crate::health_resolver::HealthResolver;
use crate::heartbeat::HeartbeatPredictor;
use crate::liquidator::Liquidator;
use crate::metrics::MetricsRegistry;
use crate::position::{CollateralData, DebtData, PositionTier, TrackedPosition};
use crate::position_tracker::TieredPositionTracker;
use crate::pre_staging::PreStager;
use crate::predictive::PredictiveOrchestrator;
use crate::price_window::PriceWindowTracker;
use crate::reserve_catalog::{OnChainReserve, ReserveCatalog};
use crate::sensitivity::PositionSensitivity;
use liquidator_api::BlockAnaliticaClient;
use liquidator_chain::{
    BlockBoundaryController, DualOracleMonitor, EventListener, OnChainReserveRaw, OracleMonitor,
    OracleUpdate, PoolEvent, ProviderManager,
};

/// Scanner configuration.
/// Uses values from global BotConfig by default.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Maximum health factor for initial seeding
    pub seed_hf_max: f64,
    /// Maximum wallets to seed
    pub seed_limit: usize,
    /// Bootstrap resync interval
    pub bootstrap_interval: Duration,
    /// Critical tier update interval
    pub critical_interval: Duration,
    /// Hot tier update interval
    pub hot_interval: Duration,
    /// Warm tier update interval
    pub warm_interval: Duration,
    /// Cold tier update interval
    pub cold_interval: Duration,
    /// DualOracle check interval
    pub dual_oracle_interval: Duration,
    /// Heartbeat check interval
    pub heartbeat_interval: Duration,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        // Read from global config
        let cfg = config();
        Self {
            seed_hf_max: cfg.position.seed_hf_max,
            seed_limit: cfg.position.seed_limit,
            bootstrap_interval: cfg.scanner.bootstrap_interval(),
            critical_interval: cfg.scanner.critical_interval(),
            hot_interval: cfg.scanner.hot_interval(),
            warm_interval: cfg.scanner.warm_interval(),
            cold_interval: cfg.scanner.cold_interval(),
            dual_oracle_interval: cfg.scanner.dual_oracle_interval(),
            heartbeat_interval: cfg.scanner.heartbeat_interval(),
        }
    }
}

/// Main scanner orchestrating all liquidation bot components.
pub struct Scanner {
    /// Position tracker
    tracker: Arc<TieredPositionTracker>,
    /// Oracle monitor
    oracle_monitor: Arc<OracleMonitor>,
    /// DualOracle monitor for LST assets
    dual_oracle_monitor: Arc<DualOracleMonitor>,
    /// Heartbeat predictor
    heartbeat_predictor: Arc<HeartbeatPredictor>,
    /// Pre-staging pipeline
    pre_stager: Arc<PreStager>,
    /// Per-asset observed price volatility, feeding predictive scenario sizing
    price_windows: Arc<PriceWindowTracker>,
    /// Liquidation executor
    liquidator: Arc<Liquidator>,
    /// Event listener
    event_listener: Arc<EventListener>,
    /// BlockAnalitica API client
    blockanalitica: Arc<BlockAnaliticaClient>,
    /// Provider manager
    provider: Arc<ProviderManager>,
    /// Asset registry
    assets: Arc<AssetRegistry>,
    /// Cached HF resolution with hysteresis-gated edge triggers
    health_resolver: Arc<HealthResolver>,
    /// Bounded re-evaluation / priority-polling queues feeding the critical lane
    dirty_set: Arc<DirtySet>,
    hotlist: Arc<Hotlist>,
    /// Forward-looking scenario scoring for Warm/Hot positions
    predictive: Arc<PredictiveOrchestrator>,
    /// Direct Pool.liquidationCall execution path
    critical_lane: Arc<CriticalLane>,
    /// Rolling block-time estimate gating critical-lane submission windows
    block_boundary: Arc<BlockBoundaryController>,
    /// Post-trade classification of LiquidationCall events
    auditor: Arc<LiquidationAuditor>,
    /// Dynamic reserve parameters with static fallback
    reserve_catalog: Arc<ReserveCatalog>,
    /// Process-wide counters
    metrics: Arc<MetricsRegistry>,
    /// Chunked historical log recovery for the cold-start window
    backfiller: Arc<liquidator_chain::Backfiller>,
    /// Configuration
    config: ScannerConfig,
}

impl Scanner {
    /// Create a new scanner.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tracker: Arc<TieredPositionTracker>,
        oracle_monitor: Arc<OracleMonitor>,
        dual_oracle_monitor: Arc<DualOracleMonitor>,
        heartbeat_predictor: Arc<HeartbeatPredictor>,
        pre_stager: Arc<PreStager>,
        price_windows: Arc<PriceWindowTracker>,
        liquidator: Arc<Liquidator>,
        event_listener: Arc<EventListener>,
        blockanalitica: Arc<BlockAnaliticaClient>,
        provider: Arc<ProviderManager>,
        assets: Arc<AssetRegistry>,
        health_resolver: Arc<HealthResolver>,
        dirty_set: Arc<DirtySet>,
        hotlist: Arc<Hotlist>,
        predictive: Arc<PredictiveOrchestrator>,
        critical_lane: Arc<CriticalLane>,
        block_boundary: Arc<BlockBoundaryController>,
        auditor: Arc<LiquidationAuditor>,
        reserve_catalog: Arc<ReserveCatalog>,
        metrics: Arc<MetricsRegistry>,
        backfiller: Arc<liquidator_chain::Backfiller>,
        config: ScannerConfig,
    ) -> Self {
        Self {
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
            health_resolver,
            dirty_set,
            hotlist,
            predictive,
            critical_lane,
            block_boundary,
            auditor,
            reserve_catalog,
            metrics,
            backfiller,
            config,
        }
    }

    /// Bootstrap the scanner with initial data.
    #[instrument(skip(self))]
    pub async fn bootstrap(&self) -> Result<()> {
        info!("Starting bootstrap...");

        // 0a. Recover pool events missed while the bot was down, over the
        // configured trailing window, before BlockAnalitica seeding below.
        match self.provider.block_number().await {
            Ok(head) => {
                let window = config().execution.backfill.backfill_blocks;
                let range = liquidator_chain::BackfillRange::trailing(head, window);
                match self.backfiller.backfill(range).await {
                    Ok(report) => {
                        info!(
                            events = report.events.len(),
                            chunks_attempted = report.chunks_attempted,
                            chunks_skipped = report.chunks_skipped,
                            "Backfill recovered historical pool events"
                        );
                        for event in report.events {
                            if let Err(e) = self.on_pool_event(event).await {
                                debug!(error = %e, "Failed to apply backfilled pool event");
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "Backfill failed, continuing with live-only data"),
                }
            }
            Err(e) => warn!(error = %e, "Failed to fetch chain head for backfill"),
        }

        // 0. Log wallet stats to show how many positions exist in total
        match self.blockanalitica.get_wallet_stats().await {
            Ok(stats) => {
                info!(
                    bad_debt_wallets = stats.bad_debt_total,
                    at_risk_wallets = stats.at_risk_total,
                    total = stats.bad_debt_total + stats.at_risk_total,
                    min_collateral_threshold = format!("${:.2}", stats.min_collateral_threshold),
                    "BlockAnalitica wallet inventory"
                );

                // Also analyze position size distribution on first bootstrap
                if let Err(e) = self.blockanalitica.analyze_position_distribution().await {
                    debug!(error = %e, "Failed to analyze position distribution");
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch wallet stats");
            }
        }

        // 1. Fetch at-risk wallets from BlockAnalitica (bad debt + approaching liquidation)
        let bad_debt_wallets = self
            .blockanalitica
            .fetch_at_risk_wallets(self.config.seed_hf_max, self.config.seed_limit)
            .await?;

        // Also fetch wallets approaching liquidation (HF 1.0-1.25 range)
        let approaching_wallets = self
            .blockanalitica
            .fetch_wallets_at_risk(1.0, 1.25, self.config.seed_limit)
            .await
            .unwrap_or_default();

        // Combine and dedupe
        let mut wallets = bad_debt_wallets;
        for wallet in approaching_wallets {
            if !wallets.iter().any(|w| w.wallet_address == wallet.wallet_address) {
                wallets.push(wallet);
            }
        }

        info!(
            total = wallets.len(),
            "Fetched combined at-risk wallets (bad-debt + approaching)"
        );

        // 2. Fetch full position data and classify
        // OPTIMIZATION: Process wallets in parallel with bounded concurrency (5-10x faster)
        let total_wallets = wallets.len();
        info!(total = total_wallets, "Processing wallets in parallel...");

        // Collect valid addresses
        let addresses: Vec<Address> = wallets
            .iter()
            .filter_map(|w| w.address())
            .collect();

        // Use the batch method with bounded parallelism (20 concurrent)
        let results = self.provider.get_positions_batch(&addresses, 20).await;

        // Process results
        let mut success_count = 0;
        let mut error_count = 0;

        for (user, result) in results {
            match result {
                Ok((supplies, borrows)) => {
                    if supplies.is_empty() && borrows.is_empty() {
                        self.tracker.remove(&user);
                        continue;
                    }

                    // Build and track position (inline version of process_wallet logic)
                    if let Err(e) = self.update_position_from_data(&user, supplies, borrows).await {
                        warn!(user = %user, error = %e, "Failed to process position");
                        error_count += 1;
                    } else {
                        success_count += 1;
                    }
                }
                Err(e) => {
                    warn!(user = %user, error = %e, "Failed to fetch position data");
                    error_count += 1;
                }
            }
        }

        info!(
            total = total_wallets,
            success = success_count,
            errors = error_count,
            "Finished processing all wallets"
        );

        // Log tracker stats after wallet processing
        let stats = self.tracker.stats();
        info!(
            critical = stats.critical_count,
            hot = stats.hot_count,
            warm = stats.warm_count,
            cold = stats.cold_count,
            total = stats.total_positions(),
            "Tracker stats after wallet processing"
        );

        // 3. Rebuild trigger index
        self.tracker.rebuild_trigger_index();

        // 4. Pre-stage critical positions
        let critical = self.tracker.critical_positions();
        info!(count = critical.len(), "Pre-staging critical positions");

        for position in critical {
            if let Err(e) = self.stage_position(&position).await {
                warn!(user = %position.user, error = %e, "Failed to pre-stage position");
            }
        }

        // 5. Initialize oracle prices
        self.oracle_monitor.refresh_all_prices().await?;

        // 6. Execute liquidations for positions that are ALREADY liquidatable
        let critical_for_liq = self.tracker.critical_positions();
        info!(
            critical_count = critical_for_liq.len(),
            "Step 6: Checking critical positions for immediate liquidation"
        );

        let mut liquidated_count = 0;
        for position in critical_for_liq {
            let is_liq = position.is_liquidatable();
            let is_bad = position.is_bad_debt();

            info!(
                user = %position.user,
                hf = %position.health_factor,
                is_liquidatable = is_liq,
                is_bad_debt = is_bad,
                collateral_usd = %position.total_collateral_usd(),
                debt_usd = %position.total_debt_usd(),
                "Evaluating critical position for immediate liquidation"
            );

            if is_liq && !is_bad {
                info!(
                    user = %position.user,
                    hf = %position.health_factor,
                    collateral_usd = %position.total_collateral_usd(),
                    debt_usd = %position.total_debt_usd(),
                    "Executing immediate liquidation (already below HF 1.0)"
                );

                match self.execute_liquidation(&position.user).await {
                    Ok(_) => {
                        liquidated_count += 1;
                        info!(user = %position.user, "Liquidation executed successfully");
                    }
                    Err(e) => {
                        error!(user = %position.user, error = %e, "Liquidation execution failed");
                    }
                }
            } else {
                info!(
                    user = %position.user,
                    reason = if !is_liq { "not liquidatable (HF >= 1.0)" } else { "bad debt" },
                    "Skipping position"
                );
            }
        }

        if liquidated_count > 0 {
            info!(count = liquidated_count, "Immediate liquidations completed");
        } else {
            info!("No positions qualified for immediate liquidation");
        }

        info!("Bootstrap complete");
        Ok(())
    }

    /// Run the main event loop.
    pub async fn run(&self) -> Result<()> {
        info!("Starting scanner event loop...");

        // Create channels for internal events
        let (liquidation_tx, mut liquidation_rx) = mpsc::channel::<Address>(100);

        // Spawn event handlers
        let scanner = Arc::new(self.clone_refs());

        // Oracle update handler (with reconnection)
        let oracle_scanner = scanner.clone();
        let oracle_liq_tx = liquidation_tx.clone();
        tokio::spawn(async move {
            loop {
                match oracle_scanner.oracle_event_loop(oracle_liq_tx.clone()).await {
                    Ok(_) => {
                        warn!("Oracle event loop ended, reconnecting in 5s...");
                    }
                    Err(e) => {
                        error!(error = %e, "Oracle event loop failed, reconnecting in 5s...");
                    }
                }
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            }
        });

        // Pool event handler (with reconnection)
        let pool_scanner = scanner.clone();
        tokio::spawn(async move {
            loop {
                match pool_scanner.pool_event_loop().await {
                    Ok(_) => {
                        warn!("Pool event loop ended, reconnecting in 5s...");
                    }
                    Err(e) => {
                        error!(error = %e, "Pool event loop failed, reconnecting in 5s...");
                    }
                }
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            }
        });

        // Background cycles
        let critical_scanner = scanner.clone();
        tokio::spawn(async move {
            critical_scanner.critical_cycle().await;
        });

        let hot_scanner = scanner.clone();
        tokio::spawn(async move {
            hot_scanner.hot_cycle().await;
        });

        let warm_scanner = scanner.clone();
        tokio::spawn(async move {
            warm_scanner.warm_cycle().await;
        });

        let cold_scanner = scanner.clone();
        tokio::spawn(async move {
            cold_scanner.cold_cycle().await;
        });

        let bootstrap_scanner = scanner.clone();
        tokio::spawn(async move {
            bootstrap_scanner.bootstrap_cycle().await;
        });

        let dual_scanner = scanner.clone();
        tokio::spawn(async move {
            dual_scanner.dual_oracle_cycle().await;
        });

        let heartbeat_scanner = scanner.clone();
        tokio::spawn(async move {
            heartbeat_scanner.heartbeat_cycle().await;
        });

        let predictive_scanner = scanner.clone();
        tokio::spawn(async move {
            predictive_scanner.predictive_cycle().await;
        });

        let dirty_scanner = scanner.clone();
        tokio::spawn(async move {
            dirty_scanner.dirty_cycle().await;
        });

        let reserve_scanner = scanner.clone();
        tokio::spawn(async move {
            reserve_scanner.reserve_refresh_cycle().await;
        });

        // Block-boundary tracking (with reconnection)
        let block_scanner = scanner.clone();
        tokio::spawn(async move {
            loop {
                match block_scanner.block_boundary_cycle().await {
                    Ok(_) => warn!("Block head subscription ended, reconnecting in 5s..."),
                    Err(e) => error!(error = %e, "Block head subscription failed, reconnecting in 5s..."),
                }
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            }
        });

        // Liquidation processor
        while let Some(user) = liquidation_rx.recv().await {
            if let Err(e) = self.execute_liquidation(&user).await {
                error!(user = %user, error = %e, "Liquidation failed");
            }
        }

        Ok(())
    }

    /// Handle oracle update events.
    async fn oracle_event_loop(&self, liq_tx: mpsc::Sender<Address>) -> Result<()> {
        info!("Starting oracle event loop - subscribing to WebSocket...");
        let mut stream = self.event_listener.subscribe_oracle_updates().await?;
        info!("Oracle WebSocket subscription active - waiting for AnswerUpdated events...");

        while let Some(update) = stream.next().await {
            if let Err(e) = self.on_oracle_update(update, &liq_tx).await {
                warn!(error = %e, "Failed to process oracle update");
            }
        }

        warn!("Oracle event stream ended");
        Ok(())
    }

    /// Handle pool events.
    async fn pool_event_loop(&self) -> Result<()> {
        info!("Starting pool event loop - subscribing to WebSocket...");
        let mut stream = self.event_listener.subscribe_pool_events().await?;
        info!("Pool WebSocket subscription active - waiting for pool events...");

        while let Some(event) = stream.next().await {
            info!(event_type = %event.event_type(), user = %event.user(), block = event.block_number(), "Pool event received");
            if let Err(e) = self.on_pool_event(event).await {
                warn!(error = %e, "Failed to process pool event");
            }
        }

        warn!("Pool event stream ended");
        Ok(())
    }

    /// Process an oracle price update.
    #[instrument(skip(self, liq_tx), fields(asset = %update.asset))]
    async fn on_oracle_update(
        &self,
        update: OracleUpdate,
        liq_tx: &mpsc::Sender<Address>,
    ) -> Result<()> {
        // Log every oracle update received
        info!(
            oracle = %update.oracle,
            asset = %update.asset,
            price = %update.price,
            block = update.block_number,
            "Oracle update received"
        );

        let old_price = self
            .tracker
            .get_price(&update.asset)
            .map(|p| p.price)
            .unwrap_or(U256::ZERO);

        // Update price cache
        self.oracle_monitor.update_price(update.clone());
        self.tracker.update_price(
            update.asset,
            liquidator_chain::OraclePrice {
                price: update.price,
                updated_at: update.timestamp,
                block_number: update.block_number,
                oracle_type: update.oracle_type,
            },
        );

        // Update heartbeat predictor
        self.heartbeat_predictor.record_update(
            update.oracle,
            update.timestamp,
            update.block_number,
        );

        // Check for liquidatable positions via trigger index
        let liquidatable = self
            .tracker
            .trigger_index()
            .get_liquidatable_at(update.asset, update.price, old_price);

        for user in liquidatable {
            // Skip bad debt / dust positions
            if let Some(position) = self.tracker.get(&user) {
                if position.is_bad_debt() {
                    debug!(user = %user, "Skipping bad debt position");
                    continue;
                }
                info!(user = %user, asset = %update.asset, "Position crossed liquidation threshold");
                let _ = liq_tx.send(user).await;
            }
        }

        // Update affected positions
        let affected = self.tracker.users_affected_by_asset(&update.asset);
        for user in &affected {
            let user = *user; // Copy the address
            if let Some(position) = self.tracker.get(&user) {
                // Use sensitivity for fast HF estimation
                if let Some(sensitivity) = &position.sensitivity {
                    let new_hf = sensitivity.estimate_hf_from_prices(&[(update.asset, update.price)]);

                    // Re-tier if needed
                    let new_tier = PositionTier::from_health_factor(new_hf);
                    if new_tier != position.tier {
                        self.tracker.re_tier(&user, new_hf, position.min_trigger_distance_pct);
                    }

                    // Check for liquidation (skip bad debt)
                    if new_hf < 1.0 && !position.is_bad_debt() {
                        let _ = liq_tx.send(user).await;
                    }
                }
            }
        }

        // Invalidate stale pre-staged transactions
        self.pre_stager.invalidate_by_asset(&update.asset, &affected);

        Ok(())
    }

    /// Process a pool event.
    #[instrument(skip(self), fields(event_type = ?event.event_type()))]
    async fn on_pool_event(&self, event: PoolEvent) -> Result<()> {
        let user = event.user();
        let was_tracked = self.tracker.get(&user).is_some();

        if let PoolEvent::LiquidationCall {
            collateral_asset,
            debt_asset,
            debt_to_cover,
            liquidated_collateral,
            ..
        } = &event
        {
            let debt_usd = self.usd_value(*debt_asset, *debt_to_cover);
            let collateral_usd = self.usd_value(*collateral_asset, *liquidated_collateral);

            if let Some(record) = self.auditor.audit(&event, was_tracked, debt_usd, collateral_usd) {
                match record.outcome {
                    AuditOutcome::OwnSuccess => {
                        self.metrics.incr("liquidations_own_success", 1);
                        info!(user = %user, "Audited own liquidation success");
                    }
                    AuditOutcome::Raced => {
                        self.metrics.incr("liquidations_raced", 1);
                        warn!(user = %user, "Raced: a competing liquidator landed first");
                    }
                    AuditOutcome::NotInWatchSet => {
                        self.metrics.incr("liquidations_desync", 1);
                        warn!(user = %user, "Liquidated user was outside tracked set, re-syncing");
                    }
                }
                if record.info_min_debt {
                    self.metrics.incr("liquidations_info_min_debt", 1);
                    debug!(user = %user, "Liquidation below min-debt threshold, informational");
                }
                if record.suspicious_scaling {
                    warn!(user = %user, "Suspicious collateral/debt scaling in liquidation event");
                }
            }
        } else {
            self.health_resolver.invalidate(&user);
            self.dirty_set.mark_dirty(user);
        }

        // Re-fetch position data
        if let Err(e) = self.process_wallet(&user).await {
            warn!(user = %user, error = %e, "Failed to update position after pool event");
        }

        // Invalidate pre-staged transaction
        self.pre_stager.invalidate(&user);

        if let Some(snapshot) = self.health_resolver.refresh(user) {
            let block = self.block_boundary.current_block();
            if let Some(edge) = self.health_resolver.check_edge_trigger(snapshot, block) {
                info!(user = %user, hf_bps = edge.hf_bps, reason = ?edge.reason, block = edge.block, "Edge trigger after pool event");
                if self.health_resolver.is_below_execution_threshold(&snapshot) {
                    if let Err(e) = self.execute_liquidation(&user).await {
                        error!(user = %user, error = %e, "Liquidation after pool event failed");
                    }
                }
            }
        }

        Ok(())
    }

    /// Best-effort USD value for an amount of `asset`, using the last cached
    /// oracle price and the asset's registered decimals. Returns 0.0 for an
    /// unknown asset or price rather than failing the caller — used only for
    /// audit classification, not for execution decisions.
    fn usd_value(&self, asset: Address, amount: U256) -> f64 {
        let Some(price) = self.tracker.get_price(&asset) else {
            return 0.0;
        };
        let decimals = self
            .assets
            .get_by_token(&asset)
            .map(|a| a.decimals)
            .unwrap_or(18);
        CollateralData::calculate_usd_value(amount, price.price, decimals)
    }

    /// Execute a liquidation for a user via the direct Pool.liquidationCall
    /// critical lane — the only execution path: IntentBuilder ->
    /// `Pool.liquidationCall` -> `TxSubmitter`, no swap step. A skip or
    /// submission failure is logged and counted, not retried through a
    /// second execution architecture; the next edge trigger or tier cycle
    /// will attempt again against a fresh snapshot.
    #[instrument(skip(self), fields(user = %user))]
    async fn execute_liquidation(&self, user: &Address) -> Result<()> {
        if self.tracker.get(user).is_none() {
            debug!(user = %user, "Liquidation requested for untracked user, skipping");
            return Ok(());
        }

        // The trigger that led here fired immediately before this call in
        // every caller (edge trigger, critical-cycle sweep) — there's no
        // queueing between detection and dispatch, so "now" is the trigger
        // time the critical lane's latency gate measures against.
        let outcome = self.critical_lane.try_execute(*user, std::time::Instant::now()).await;
        if outcome.tx_hash.is_some() {
            info!(user = %user, tx_hash = ?outcome.tx_hash, "Critical lane liquidation landed");
            self.metrics.incr("critical_lane_success", 1);
            self.tracker.remove(user);
            self.health_resolver.forget(user);
            self.hotlist.remove(user);
            return Ok(());
        }

        if outcome.attempted {
            self.metrics.incr("critical_lane_attempt_failed", 1);
            warn!(user = %user, reason = ?outcome.skipped_reason, "Critical lane submission did not land");
        } else if let Some(reason) = &outcome.skipped_reason {
            self.metrics.incr("critical_lane_skipped", 1);
            debug!(user = %user, reason, "Critical lane skipped");
        }

        Ok(())
    }

    // Background cycles

    async fn critical_cycle(&self) {
        let mut ticker = interval(self.config.critical_interval);
        loop {
            ticker.tick().await;

            // Validate and refresh pre-staged transactions
            for position in self.tracker.critical_positions() {
                if !self.pre_stager.has_valid_staged(&position.user) {
                    if let Err(e) = self.stage_position(&position).await {
                        debug!(user = %position.user, error = %e, "Failed to re-stage");
                    }
                }
            }
        }
    }

    async fn hot_cycle(&self) {
        let mut ticker = interval(self.config.hot_interval);
        loop {
            ticker.tick().await;

            // Update sensitivities and check swap routes
            for position in self.tracker.hot_positions() {
                if position.needs_update() {
                    let sensitivity = PositionSensitivity::compute(&position, self.tracker.prices());
                    // Update would require mutable access - simplified here
                }
            }
        }
    }

    async fn warm_cycle(&self) {
        let mut ticker = interval(self.config.warm_interval);
        loop {
            ticker.tick().await;

            // Recalculate trigger prices for warm tier
            for position in self.tracker.warm_positions() {
                if position.needs_update() {
                    self.tracker.trigger_index().update_position(&position);
                }
            }
        }
    }

    async fn cold_cycle(&self) {
        let mut ticker = interval(self.config.cold_interval);
        loop {
            ticker.tick().await;

            // Full position refresh for cold tier
            for position in self.tracker.cold_positions() {
                if position.needs_update() {
                    if let Err(e) = self.process_wallet(&position.user).await {
                        debug!(user = %position.user, error = %e, "Failed to refresh cold position");
                    }
                }
            }
        }
    }

    async fn bootstrap_cycle(&self) {
        let mut ticker = interval(self.config.bootstrap_interval);
        loop {
            ticker.tick().await;

            // Resync with BlockAnalitica
            if let Err(e) = self.bootstrap().await {
                warn!(error = %e, "Bootstrap resync failed");
            }
        }
    }

    async fn dual_oracle_cycle(&self) {
        let mut ticker = interval(self.config.dual_oracle_interval);
        loop {
            ticker.tick().await;

            // Check for tier transitions in DualOracle assets
            for asset in self.assets.dual_oracle_assets() {
                if let Some(transition) = self.dual_oracle_monitor.check_transition(asset.oracle) {
                    info!(
                        asset = asset.symbol,
                        from = ?transition.from,
                        to = ?transition.to,
                        "DualOracle tier transition detected"
                    );
                }
            }
        }
    }

    async fn heartbeat_cycle(&self) {
        let mut ticker = interval(self.config.heartbeat_interval);
        loop {
            ticker.tick().await;

            // Check for imminent oracle updates
            let imminent = self
                .heartbeat_predictor
                .imminent_updates(Duration::from_millis(500));

            for oracle in imminent {
                if let Some(asset) = self.assets.get_by_oracle(&oracle) {
                    debug!(asset = asset.symbol, "Oracle update imminent");
                }
            }

            // Log stale oracles
            for oracle in self.heartbeat_predictor.stale_oracles() {
                if let Some(asset) = self.assets.get_by_oracle(&oracle) {
                    warn!(asset = asset.symbol, "Oracle is stale");
                }
            }
        }
    }

    /// Score Warm/Hot positions for proximity to the liquidation boundary
    /// under adverse price scenarios and feed the winners into the hotlist
    /// ahead of them actually crossing into Critical.
    ///
    /// This is the fallback timer half of the predictive trigger: it fires
    /// on its own cadence (`fallback_interval_ms`/`fallback_interval_blocks`,
    /// whichever elapses first) independent of block traffic, so predictive
    /// coverage doesn't stall if new-block events go quiet. The other half —
    /// running on new blocks while the stream is busy — lives in
    /// `block_boundary_cycle`/`dispatch_top_hotlist`, both funneling through
    /// `run_predictive_scan` so a tick from either source does the same work.
    async fn predictive_cycle(&self) {
        let fallback = self.predictive.config().fallback_interval_ms;
        let fallback_blocks = self.predictive.config().fallback_interval_blocks;
        // Poll frequently enough to catch whichever of the two fallback
        // conditions (time or blocks) elapses first without waiting a full
        // `fallback_interval_ms` past it.
        let mut ticker = interval(Duration::from_millis(100).min(self.config.hot_interval));
        let mut last_run = std::time::Instant::now();
        let mut last_run_block = self.block_boundary.current_block();
        loop {
            ticker.tick().await;

            let current_block = self.block_boundary.current_block();
            let due_by_time = last_run.elapsed() >= Duration::from_millis(fallback);
            let due_by_blocks = current_block.saturating_sub(last_run_block) >= fallback_blocks;
            if !due_by_time && !due_by_blocks {
                continue;
            }

            self.run_predictive_scan("fallback_timer").await;
            last_run = std::time::Instant::now();
            last_run_block = current_block;
        }
    }

    /// Run one predictive scan and fan its candidates out to the hotlist /
    /// dirty set. `trigger` is logged so it's possible to tell a
    /// block-driven scan from the fallback-timer one.
    async fn run_predictive_scan(&self, trigger: &str) {
        let candidates = self.predictive.scan();
        for candidate in &candidates {
            // Hotlist orders by *descending* priority (highest = most
            // urgent). The predictive priority score is spec-defined the
            // other way around (lower = more urgent, `+INFINITY` for "not
            // urgent at all"), so invert it here at the boundary.
            let hotlist_priority = if candidate.priority.is_finite() {
                -candidate.priority
            } else {
                f64::NEG_INFINITY
            };
            self.hotlist.upsert(candidate.user, hotlist_priority);
            if candidate.projected_crossing {
                self.dirty_set.mark_dirty(candidate.user);
            }
        }
        if !candidates.is_empty() {
            debug!(count = candidates.len(), trigger, "Predictive scan updated hotlist");
        }
    }

    /// Drain the dirty set and reconcile each flagged user against fresh
    /// on-chain data, executing immediately if reconciliation reveals it's
    /// already liquidatable.
    async fn dirty_cycle(&self) {
        let mut ticker = interval(self.config.critical_interval);
        loop {
            ticker.tick().await;

            for user in self.dirty_set.take_all() {
                if let Err(e) = self.process_wallet(&user).await {
                    debug!(user = %user, error = %e, "Failed to reconcile dirty-set entry");
                    continue;
                }
                if let Some(position) = self.tracker.get(&user) {
                    if position.is_liquidatable() && !position.is_bad_debt() {
                        if let Err(e) = self.execute_liquidation(&user).await {
                            error!(user = %user, error = %e, "Dirty-set liquidation failed");
                        }
                    }
                }
            }
        }
    }

    /// Periodically re-enumerate on-chain reserves so governance-tuned
    /// liquidation thresholds/bonuses and newly-listed reserves show up
    /// without a redeploy.
    async fn reserve_refresh_cycle(&self) {
        let mut ticker = interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;

            if !self.reserve_catalog.refresh_due() {
                continue;
            }

            match liquidator_chain::fetch_onchain_reserves(
                self.provider.http_url(),
                self.provider.pool_address(),
            )
            .await
            {
                Ok(raw) => {
                    let reserves: Vec<OnChainReserve> = raw
                        .into_iter()
                        .map(|r: OnChainReserveRaw| OnChainReserve {
                            token: r.token,
                            decimals: r.decimals,
                            liquidation_threshold_bps: r.liquidation_threshold_bps,
                            liquidation_bonus_bps: r.liquidation_bonus_bps,
                            active: r.active,
                        })
                        .collect();
                    self.reserve_catalog.refresh(reserves);
                }
                Err(e) => {
                    warn!(error = %e, "Failed to refresh on-chain reserve catalog");
                }
            }
        }
    }

    /// Track chain head via the new-heads subscription, feeding the
    /// block-boundary estimator and dispatching the top of the hotlist each
    /// time a new block lands.
    async fn block_boundary_cycle(&self) -> Result<()> {
        let mut stream = self.event_listener.subscribe_new_heads().await?;
        while let Some(block_number) = stream.next().await {
            self.block_boundary.observe_block(block_number);
            self.dispatch_top_hotlist().await;
            // While the chain is "busy" -- the dirty set or hotlist already
            // has work queued -- run a predictive scan on every block
            // instead of waiting for the next fallback-timer tick, so the
            // watch list keeps pace with a market that's already moving.
            if !self.dirty_set.is_empty() || self.hotlist.len() > 0 {
                self.run_predictive_scan("block_boundary_busy").await;
            }
        }
        warn!("Block head stream ended");
        Ok(())
    }

    /// Attempt the critical lane for the top-priority hotlist entries,
    /// capped at the configured per-block dispatch limit.
    async fn dispatch_top_hotlist(&self) {
        let max = config().execution.dispatch.max_dispatches_per_block as usize;
        for user in self.hotlist.top(max) {
            if self.critical_lane.is_in_flight(&user) {
                continue;
            }
            let Some(position) = self.tracker.get(&user) else {
                self.hotlist.remove(&user);
                continue;
            };
            if !position.is_liquidatable() || position.is_bad_debt() {
                continue;
            }

            let outcome = self
                .critical_lane
                .try_execute(user, std::time::Instant::now())
                .await;
            if outcome.tx_hash.is_some() {
                info!(user = %user, tx_hash = ?outcome.tx_hash, "Hotlist dispatch landed");
                self.tracker.remove(&user);
                self.health_resolver.forget(&user);
                self.hotlist.remove(&user);
            }
        }
    }

    // Helper methods

    async fn process_wallet(&self, user: &Address) -> Result<()> {
        // Fetch position data from chain
        let (supplies, borrows) = self.provider.get_position_data(*user).await?;

        if supplies.is_empty() && borrows.is_empty() {
            self.tracker.remove(user);
            return Ok(());
        }

        let mut position = TrackedPosition::new(*user);

        // Process supplies
        for supply in supplies {
            let collateral = CollateralData {
                asset: supply.underlying,
                amount: supply.amount,
                price: supply.price,
                decimals: supply.decimals,
                value_usd: CollateralData::calculate_usd_value(
                    supply.amount,
                    supply.price,
                    supply.decimals,
                ),
                liquidation_threshold: supply.liquidation_threshold,
                enabled: true,
            };
            position.collaterals.push((supply.underlying, collateral));
        }

        // Process borrows
        for borrow in borrows {
            let debt = DebtData {
                asset: borrow.underlying,
                amount: borrow.amount,
                price: borrow.price,
                decimals: borrow.decimals,
                value_usd: DebtData::calculate_usd_value(
                    borrow.amount,
                    borrow.price,
                    borrow.decimals,
                ),
            };
            position.debts.push((borrow.underlying, debt));
        }

        // Calculate health factor and tier
        position.health_factor = position.calculate_health_factor();
        position.update_tier();
        position.state_hash = position.compute_state_hash();

        // Debug: Log calculated position values
        debug!(
            user = %user,
            hf = %position.health_factor,
            tier = ?position.tier,
            collateral_usd = %position.total_collateral_usd(),
            debt_usd = %position.total_debt_usd(),
            collateral_count = position.collaterals.iter().filter(|(_, c)| c.value_usd > 0.0).count(),
            debt_count = position.debts.iter().filter(|(_, d)| d.value_usd > 0.0).count(),
            is_bad_debt = position.is_bad_debt(),
            "Position calculated"
        );

        // Log important positions
        if position.is_liquidatable() {
            if position.is_bad_debt() {
                // Skip logging dust/bad debt - too much noise
                debug!(
                    user = %user,
                    hf = %position.health_factor,
                    collateral_usd = %position.total_collateral_usd(),
                    debt_usd = %position.total_debt_usd(),
                    "BAD DEBT (dust position, skipping)"
                );
            } else {
                // Real liquidation opportunity!
                warn!(
                    user = %user,
                    hf = %position.health_factor,
                    tier = ?position.tier,
                    collateral_usd = %position.total_collateral_usd(),
                    debt_usd = %position.total_debt_usd(),
                    "LIQUIDATABLE position detected - will be added to tracker"
                );
            }
        } else if matches!(position.tier, PositionTier::Critical) {
            info!(
                user = %user,
                hf = %position.health_factor,
                tier = ?position.tier,
                "Critical position tracked"
            );
        }

        // Skip tracking bad debt positions entirely - they waste resources
        // and will never be liquidatable profitably
        if position.is_bad_debt() {
            return Ok(());
        }

        // Compute sensitivity for critical/hot tiers
        if matches!(position.tier, PositionTier::Critical | PositionTier::Hot) {
            position.sensitivity =
                Some(PositionSensitivity::compute(&position, self.tracker.prices()));
        }

        self.tracker.upsert(position);

        Ok(())
    }

    /// Update position from pre-fetched data (for batch processing).
    /// Same logic as process_wallet but without fetching.
    async fn update_position_from_data(
        &self,
        user: &Address,
        supplies: Vec<liquidator_chain::BalanceData>,
        borrows: Vec<liquidator_chain::BalanceData>,
    ) -> Result<()> {
        let mut position = TrackedPosition::new(*user);

        // Process supplies
        for supply in supplies {
            let collateral = CollateralData {
                asset: supply.underlying,
                amount: supply.amount,
                price: supply.price,
                decimals: supply.decimals,
                value_usd: CollateralData::calculate_usd_value(
                    supply.amount,
                    supply.price,
                    supply.decimals,
                ),
                liquidation_threshold: supply.liquidation_threshold,
                enabled: true,
            };
            position.collaterals.push((supply.underlying, collateral));
        }

        // Process borrows
        for borrow in borrows {
            let debt = DebtData {
                asset: borrow.underlying,
                amount: borrow.amount,
                price: borrow.price,
                decimals: borrow.decimals,
                value_usd: DebtData::calculate_usd_value(
                    borrow.amount,
                    borrow.price,
                    borrow.decimals,
                ),
            };
            position.debts.push((borrow.underlying, debt));
        }

        // Calculate health factor and tier
        position.health_factor = position.calculate_health_factor();
        position.update_tier();
        position.state_hash = position.compute_state_hash();

        // Skip tracking bad debt positions entirely
        if position.is_bad_debt() {
            return Ok(());
        }

        // Compute sensitivity for critical/hot tiers
        if matches!(position.tier, PositionTier::Critical | PositionTier::Hot) {
            position.sensitivity =
                Some(PositionSensitivity::compute(&position, self.tracker.prices()));
        }

        self.tracker.upsert(position);

        Ok(())
    }

    async fn stage_position(&self, position: &TrackedPosition) -> Result<()> {
        if !self.pre_stager.should_stage(position) {
            debug!(
                user = %position.user,
                hf = %position.health_factor,
                debt_usd = %position.total_debt_usd(),
                "Skipping pre-stage (dust or low debt)"
            );
            return Ok(());
        }

        info!(
            user = %position.user,
            hf = %position.health_factor,
            collateral_usd = %position.total_collateral_usd(),
            debt_usd = %position.total_debt_usd(),
            "Pre-staging position"
        );

        let (collateral_asset, collateral) = position
            .largest_collateral()
            .ok_or_else(|| anyhow::anyhow!("No collateral"))?;

        let (debt_asset, debt) = position
            .largest_debt()
            .ok_or_else(|| anyhow::anyhow!("No debt"))?;

        // Fetch the swap route through the same Liqd.ag client the
        // executor itself uses, falling back to a direct (no intermediate
        // hop) route if the API call fails — mirrors
        // `Liquidator::build_and_execute`'s route resolution.
        let collateral_amount = collateral.amount / U256::from(2); // 50% close factor
        let swap_route = match self
            .liquidator
            .liqd_client()
            .get_swap_route(*collateral_asset, *debt_asset, collateral_amount, collateral.decimals, true)
            .await
        {
            Ok(route) => route,
            Err(e) => {
                warn!(
                    user = %position.user,
                    error = %e,
                    "Swap API failed, using direct route fallback"
                );
                liquidator_api::LiqdClient::create_direct_route(
                    *collateral_asset,
                    *debt_asset,
                    collateral_amount,
                )
            }
        };

        // Create price snapshot
        let mut price_snapshot = smallvec::SmallVec::new();
        if let Some(price) = self.tracker.get_price(collateral_asset) {
            price_snapshot.push((*collateral_asset, price.price));
        }
        if let Some(price) = self.tracker.get_price(debt_asset) {
            price_snapshot.push((*debt_asset, price.price));
        }

        let debt_to_cover = debt.amount;
        let expected_collateral = collateral.amount / U256::from(2);

        self.pre_stager.stage(
            position,
            swap_route,
            debt_to_cover,
            expected_collateral,
            price_snapshot,
        );
        info!(user = %position.user, "Position pre-staged");

        Ok(())
    }

    fn clone_refs(&self) -> Self {
        Self {
            tracker: self.tracker.clone(),
            oracle_monitor: self.oracle_monitor.clone(),
            dual_oracle_monitor: self.dual_oracle_monitor.clone(),
            heartbeat_predictor: self.heartbeat_predictor.clone(),
            pre_stager: self.pre_stager.clone(),
            price_windows: self.price_windows.clone(),
            liquidator: self.liquidator.clone(),
            event_listener: self.event_listener.clone(),
            blockanalitica: self.blockanalitica.clone(),
            provider: self.provider.clone(),
            assets: self.assets.clone(),
            health_resolver: self.health_resolver.clone(),
            dirty_set: self.dirty_set.clone(),
            hotlist: self.hotlist.clone(),
            predictive: self.predictive.clone(),
            critical_lane: self.critical_lane.clone(),
            block_boundary: self.block_boundary.clone(),
            auditor: self.auditor.clone(),
            reserve_catalog: self.reserve_catalog.clone(),
            metrics: self.metrics.clone(),
            backfiller: self.backfiller.clone(),
            config: self.config.clone(),
        }
    }
}
