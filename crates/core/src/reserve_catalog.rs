//! Dynamic reserve catalog with a static fallback.
//!
//! [`AssetRegistry`] hardcodes 17 assets for one specific HyperLend
//! deployment — accurate today, stale the moment a reserve is added or its
//! liquidation bonus is tuned by governance. `ReserveCatalog` wraps it as a
//! fallback layer and refreshes from on-chain reserve data on an interval,
//! so a new or reconfigured reserve shows up without a bot redeploy.

use alloy::primitives::Address;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::assets::{Asset, AssetRegistry};

/// A reserve's liquidation-relevant parameters, as read from the protocol
/// (or, when unavailable, copied from the static fallback).
#[derive(Debug, Clone)]
pub struct ReserveInfo {
    pub token: Address,
    pub decimals: u8,
    pub liquidation_threshold_bps: u16,
    pub liquidation_bonus_bps: u16,
    pub active: bool,
    pub source: ReserveSource,
    pub refreshed_at: Instant,
}

/// Where a `ReserveInfo` entry's data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveSource {
    /// Read live from the protocol's reserve listing.
    OnChain,
    /// Fell back to the static, hardcoded asset table.
    StaticFallback,
}

/// A single on-chain reserve record, as produced by whatever enumerates
/// `Pool.getReservesList()` + `getReserveData()` for the active deployment.
/// Kept deliberately decoupled from any specific protocol binding so the
/// catalog doesn't have to depend on `liquidator-chain`'s protocol trait
/// directly — callers adapt their protocol client's response into this.
#[derive(Debug, Clone)]
pub struct OnChainReserve {
    pub token: Address,
    pub decimals: u8,
    pub liquidation_threshold_bps: u16,
    pub liquidation_bonus_bps: u16,
    pub active: bool,
}

/// Catalog of reserves, refreshed from on-chain data with a static fallback.
pub struct ReserveCatalog {
    fallback: Arc<AssetRegistry>,
    reserves: DashMap<Address, ReserveInfo>,
    refresh_interval: Duration,
    last_refresh: parking_lot::RwLock<Option<Instant>>,
}

impl ReserveCatalog {
    /// Build a catalog seeded entirely from the static fallback registry.
    /// Call [`Self::refresh`] once on-chain data is available.
    pub fn new(fallback: Arc<AssetRegistry>, refresh_interval: Duration) -> Self {
        let reserves = DashMap::new();
        for asset in fallback.active_assets() {
            reserves.insert(asset.token, reserve_info_from_static(asset));
        }

        Self {
            fallback,
            reserves,
            refresh_interval,
            last_refresh: parking_lot::RwLock::new(None),
        }
    }

    /// Merge freshly-fetched on-chain reserve data into the catalog.
    /// Reserves present on-chain overwrite the static fallback entry;
    /// reserves in the static fallback but absent on-chain (e.g. an RPC that
    /// only returned a partial list) are left untouched rather than dropped,
    /// since a transient partial refresh shouldn't blind the bot to assets
    /// it already knew were liquidatable.
    pub fn refresh(&self, onchain: Vec<OnChainReserve>) {
        let now = Instant::now();
        let count = onchain.len();

        for reserve in onchain {
            self.reserves.insert(
                reserve.token,
                ReserveInfo {
                    token: reserve.token,
                    decimals: reserve.decimals,
                    liquidation_threshold_bps: reserve.liquidation_threshold_bps,
                    liquidation_bonus_bps: reserve.liquidation_bonus_bps,
                    active: reserve.active,
                    source: ReserveSource::OnChain,
                    refreshed_at: now,
                },
            );
        }

        *self.last_refresh.write() = Some(now);
        info!(count, total = self.reserves.len(), "Reserve catalog refreshed from chain");
    }

    /// Whether a refresh is due per the configured interval.
    pub fn refresh_due(&self) -> bool {
        match *self.last_refresh.read() {
            Some(t) => t.elapsed() >= self.refresh_interval,
            None => true,
        }
    }

    pub fn get(&self, token: &Address) -> Option<ReserveInfo> {
        self.reserves.get(token).map(|r| r.clone())
    }

    /// Fall back to the static registry by symbol lookup (useful for
    /// config/deployment files that reference assets by symbol).
    pub fn get_by_symbol(&self, symbol: &str) -> Option<ReserveInfo> {
        let asset = self.fallback.get_by_symbol(symbol)?;
        self.get(&asset.token)
    }

    pub fn all(&self) -> Vec<ReserveInfo> {
        self.reserves.iter().map(|e| e.value().clone()).collect()
    }

    pub fn active(&self) -> Vec<ReserveInfo> {
        self.reserves
            .iter()
            .filter(|e| e.value().active)
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.reserves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reserves.is_empty()
    }

    /// Count of reserves currently served from the static fallback rather
    /// than live on-chain data — a healthy steady state is 0 once the first
    /// refresh completes.
    pub fn stale_fallback_count(&self) -> usize {
        self.reserves
            .iter()
            .filter(|e| e.value().source == ReserveSource::StaticFallback)
            .count()
    }
}

fn reserve_info_from_static(asset: &Asset) -> ReserveInfo {
    ReserveInfo {
        token: asset.token,
        decimals: asset.decimals,
        liquidation_threshold_bps: 8000,
        liquidation_bonus_bps: asset.liquidation_bonus_bps,
        active: asset.active,
        source: ReserveSource::StaticFallback,
        refreshed_at: Instant::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::REGISTRY;

    fn fallback() -> Arc<AssetRegistry> {
        Arc::new(AssetRegistry::new())
    }

    #[test]
    fn test_seeded_from_static_fallback() {
        let catalog = ReserveCatalog::new(fallback(), Duration::from_secs(300));
        assert!(!catalog.is_empty());
        assert_eq!(catalog.stale_fallback_count(), catalog.len());
    }

    #[test]
    fn test_refresh_overwrites_with_onchain_source() {
        let catalog = ReserveCatalog::new(fallback(), Duration::from_secs(300));
        let some_token = REGISTRY.active_assets().next().unwrap().token;

        catalog.refresh(vec![OnChainReserve {
            token: some_token,
            decimals: 18,
            liquidation_threshold_bps: 8500,
            liquidation_bonus_bps: 450,
            active: true,
        }]);

        let info = catalog.get(&some_token).unwrap();
        assert_eq!(info.source, ReserveSource::OnChain);
        assert_eq!(info.liquidation_threshold_bps, 8500);
    }

    #[test]
    fn test_refresh_due_initially_true() {
        let catalog = ReserveCatalog::new(fallback(), Duration::from_secs(300));
        assert!(catalog.refresh_due());
    }
}
