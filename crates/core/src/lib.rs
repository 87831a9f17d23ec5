//! HyperLend core liquidation logic.
//!
//! This crate provides the core liquidation bot functionality:
//! - Asset registry with oracle configurations
//! - Tiered position tracking (Critical/Hot/Warm/Cold)
//! - Trigger-based position index for instant liquidation detection
//! - Health factor sensitivity estimation
//! - Transaction pre-staging for critical positions
//! - Heartbeat prediction for oracle updates
//! - Scanner orchestration

mod assets;
pub mod config;
mod dirty_set;
pub mod errors;
mod auditor;
mod critical_lane;
mod health_resolver;
mod heartbeat;
mod liquidator;
mod metrics;
mod position;
mod position_tracker;
mod pre_staging;
mod predictive;
mod price_window;
mod reserve_catalog;
mod risk_engine;
mod scanner;
mod sensitivity;
mod supervisor;
mod trigger_index;
pub mod u256_math;

pub use assets::{Asset, AssetRegistry, OracleType, ASSETS, REGISTRY};
pub use auditor::{AuditOutcome, LiquidationAuditor, LiquidationAuditRecord};
pub use config::{BotConfig, config, init_config};
pub use critical_lane::{CriticalLane, CriticalLaneOutcome};
pub use dirty_set::{DirtySet, Hotlist};
pub use errors::{LiquidatorError, UnbuildableReason};
pub use health_resolver::{EdgeTrigger, HealthResolver, HealthSnapshot, TriggerReason};
pub use heartbeat::HeartbeatPredictor;
pub use liquidator::{Liquidator, LiquidationResult, ProfitEstimate};
pub use metrics::MetricsRegistry;
pub use position::{CollateralData, DebtData, PositionTier, TrackedPosition};
pub use position_tracker::TieredPositionTracker;
pub use pre_staging::{PreStager, StagedLiquidation};
pub use predictive::{PredictiveOrchestrator, WatchCandidate};
pub use price_window::PriceWindowTracker;
pub use reserve_catalog::{OnChainReserve, ReserveCatalog, ReserveInfo, ReserveSource};
pub use risk_engine::{project_scenarios, RiskEngine, Scenario, ScenarioProjection};
pub use scanner::{Scanner, ScannerConfig};
pub use sensitivity::PositionSensitivity;
pub use supervisor::{exit_code, Supervisor};
pub use trigger_index::{PriceDirection, TriggerEntry, TriggerIndex};
