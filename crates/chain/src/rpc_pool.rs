//! Multi-endpoint RPC pool: hedged reads, racing writes, per-endpoint health.
//!
//! [`ProviderManager`](crate::provider::ProviderManager) wires exactly four
//! named endpoints (http/read/archive/send). That's fine for a single
//! deployment but doesn't generalize to "however many RPC providers the
//! operator configured, with failover." `RpcPool` sits one layer above it:
//! a named set of HTTP endpoints per role (Read / Write), each tracked for
//! health and latency, with hedged read calls and racing write submission.

use alloy::providers::{Provider, ProviderBuilder};
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors an [`RpcPool`] caller needs to distinguish: per-endpoint
/// transport failures a caller can retry on the next endpoint, versus
/// pool-wide exhaustion the caller must not retry through this pool again
/// without backing off.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("network error calling {endpoint}: {source}")]
    Network {
        endpoint: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("rate limited by {endpoint}")]
    RateLimit { endpoint: String },
    #[error("call reverted: {reason}")]
    CallReverted { reason: String },
    #[error("call to {endpoint} timed out after {elapsed_ms}ms")]
    Timeout { endpoint: String, elapsed_ms: u64 },
    #[error("no healthy endpoint available in {role:?} pool")]
    NoHealthyEndpoint { role: EndpointRole },
    #[error("failed to decode response from {endpoint}: {source}")]
    DecodeError {
        endpoint: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("price feed for {asset} is stale")]
    StaleFeed { asset: String },
    #[error("submission failed: {0}")]
    SubmissionFailed(#[from] SubmissionFailure),
}

/// The specific way a broadcast transaction failed once it actually landed
/// somewhere, as opposed to a transport-level [`RpcError`]. Kept as its own
/// type since [`crate::tx_submitter::TxSubmitter`] is the layer that
/// observes confirmation, not `RpcPool` itself.
#[derive(Debug, Error)]
pub enum SubmissionFailure {
    #[error("transaction reverted on-chain: {0}")]
    Reverted(alloy::primitives::B256),
    #[error("replaced by a higher-fee resubmission before confirming")]
    ReplacedUnderpriced,
    #[error("raced out: a competing liquidator's transaction landed first")]
    Raced,
}

/// Classify an opaque transport error from a provider call against one
/// endpoint. Providers don't expose a structured error taxonomy over HTTP,
/// so this matches on the error's rendered message the way a pool with
/// many upstream vendors (each with its own error shapes) has to.
fn classify_transport_error(endpoint: &str, elapsed: Duration, err: anyhow::Error) -> RpcError {
    let msg = err.to_string().to_lowercase();
    if msg.contains("429") || msg.contains("rate limit") || msg.contains("too many requests") {
        RpcError::RateLimit {
            endpoint: mask_url(endpoint),
        }
    } else if msg.contains("timed out") || msg.contains("timeout") {
        RpcError::Timeout {
            endpoint: mask_url(endpoint),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    } else if msg.contains("revert") {
        RpcError::CallReverted {
            reason: err.to_string(),
        }
    } else {
        RpcError::Network {
            endpoint: mask_url(endpoint),
            source: err,
        }
    }
}

/// The role an endpoint plays in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointRole {
    /// Used for eth_call / log queries — hedged, read-only.
    Read,
    /// Used for eth_sendRawTransaction — raced, write-path.
    Write,
    /// Private orderflow relay (e.g. a builder-submission endpoint) used
    /// instead of, or alongside, the public Write pool to avoid mempool
    /// visibility before inclusion.
    Relay,
}

/// Redact an RPC URL for logging: keep the scheme and host, drop path
/// segments and query parameters, since most providers embed an API key in
/// one of those (`https://eth.provider.com/v2/<key>`,
/// `?apikey=<key>`).
pub fn mask_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return "***".to_string();
    };
    let host = rest.split(['/', '?']).next().unwrap_or("unknown-host");
    format!("{scheme}://{host}/***")
}

/// Observed health of a single endpoint.
#[derive(Debug, Clone)]
pub struct EndpointHealth {
    pub url: String,
    pub consecutive_failures: u64,
    pub last_latency_ms: u64,
    pub last_success: Option<Instant>,
    pub healthy: bool,
}

struct Endpoint {
    url: String,
    consecutive_failures: AtomicU64,
    last_latency_ms: AtomicU64,
    last_success: parking_lot::RwLock<Option<Instant>>,
}

impl Endpoint {
    fn new(url: String) -> Self {
        Self {
            url,
            consecutive_failures: AtomicU64::new(0),
            last_latency_ms: AtomicU64::new(0),
            last_success: parking_lot::RwLock::new(None),
        }
    }

    fn record_success(&self, latency: Duration) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.last_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
        *self.last_success.write() = Some(Instant::now());
    }

    fn record_failure(&self) {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn is_healthy(&self, max_consecutive_failures: u64) -> bool {
        self.consecutive_failures.load(Ordering::Relaxed) < max_consecutive_failures
    }

    fn snapshot(&self) -> EndpointHealth {
        EndpointHealth {
            url: self.url.clone(),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            last_latency_ms: self.last_latency_ms.load(Ordering::Relaxed),
            last_success: *self.last_success.read(),
            healthy: self.is_healthy(DEFAULT_MAX_CONSECUTIVE_FAILURES),
        }
    }
}

const DEFAULT_MAX_CONSECUTIVE_FAILURES: u64 = 5;

/// A pool of RPC endpoints for a single role, with health tracking.
pub struct RpcPool {
    role: EndpointRole,
    endpoints: Vec<Endpoint>,
    /// Round-robin cursor for picking the next endpoint to try first.
    cursor: AtomicU64,
    max_consecutive_failures: u64,
}

impl RpcPool {
    /// Build a pool from a list of HTTP(S) RPC URLs. Must be non-empty.
    pub fn new(role: EndpointRole, urls: Vec<String>) -> Self {
        assert!(!urls.is_empty(), "RpcPool requires at least one endpoint");
        Self {
            role,
            endpoints: urls.into_iter().map(Endpoint::new).collect(),
            cursor: AtomicU64::new(0),
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
        }
    }

    pub fn role(&self) -> EndpointRole {
        self.role
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Ordered list of endpoints to try, healthy ones first, starting from
    /// the round-robin cursor so load spreads across the pool over time.
    fn ordered_endpoints(&self) -> Vec<&Endpoint> {
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) as usize % self.endpoints.len();
        let mut ordered: Vec<&Endpoint> = (0..self.endpoints.len())
            .map(|i| &self.endpoints[(start + i) % self.endpoints.len()])
            .collect();
        ordered.sort_by_key(|e| !e.is_healthy(self.max_consecutive_failures));
        ordered
    }

    /// Hedged read: fire the call against the first `hedge_count` healthy
    /// endpoints concurrently, return whichever answers first.
    pub async fn get_block_number_hedged(&self, hedge_count: usize) -> Result<u64, RpcError> {
        debug_assert_eq!(self.role, EndpointRole::Read);
        let candidates = self.ordered_endpoints();
        if candidates.is_empty() {
            return Err(RpcError::NoHealthyEndpoint { role: self.role });
        }
        let hedge_count = hedge_count.max(1).min(candidates.len());

        let futures: Vec<_> = candidates
            .into_iter()
            .take(hedge_count)
            .map(|endpoint| async move {
                let start = Instant::now();
                let parsed_url = match endpoint.url.parse() {
                    Ok(url) => url,
                    Err(e) => {
                        return Err(classify_transport_error(
                            &endpoint.url,
                            start.elapsed(),
                            anyhow::anyhow!("bad url: {e}"),
                        ))
                    }
                };
                let provider = ProviderBuilder::new().on_http(parsed_url);
                let result = provider.get_block_number().await;
                let latency = start.elapsed();
                match &result {
                    Ok(_) => endpoint.record_success(latency),
                    Err(_) => endpoint.record_failure(),
                }
                result.map_err(|e| classify_transport_error(&endpoint.url, latency, e.into()))
            })
            .collect();

        // First success wins; if all fail, surface the last error.
        let mut last_err = None;
        let mut pending = futures;
        while !pending.is_empty() {
            let (result, _index, remaining) = futures::future::select_all(pending).await;
            match result {
                Ok(block) => return Ok(block),
                Err(e) => {
                    last_err = Some(e);
                    pending = remaining;
                }
            }
        }

        Err(last_err.unwrap_or(RpcError::NoHealthyEndpoint { role: self.role }))
    }

    /// Generic hedged call: run `make_call(url)` against the ordered
    /// endpoint list, staggering each subsequent attempt by `hedge_delay`
    /// rather than firing all of them at once — the common case is the
    /// primary answering before the hedge timer ever fires. Skips hedging
    /// (uses only the primary endpoint) when `call_count` is at or below
    /// `hedge_min_calls`, since a batch that small isn't worth a second
    /// round trip even if the primary is a little slow.
    pub async fn hedged_call<F, Fut, T>(
        &self,
        call_count: usize,
        hedge_delay: Duration,
        hedge_min_calls: usize,
        make_call: F,
    ) -> Result<T, RpcError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let candidates = self.ordered_endpoints();
        if candidates.is_empty() {
            return Err(RpcError::NoHealthyEndpoint { role: self.role });
        }

        let hedge_count = if call_count <= hedge_min_calls {
            1
        } else {
            candidates.len().min(2)
        };

        let mut pending = futures::stream::FuturesUnordered::new();
        for (i, endpoint) in candidates.into_iter().take(hedge_count).enumerate() {
            let delay = hedge_delay * i as u32;
            let url = endpoint.url.clone();
            let fut = make_call(url.clone());
            pending.push(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let start = Instant::now();
                let result = fut.await;
                (url, result, start.elapsed())
            });
        }

        let mut last_err = None;
        while let Some((url, result, latency)) = futures::StreamExt::next(&mut pending).await {
            self.record_outcome(&url, result.is_ok(), latency);
            match result {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(url = %mask_url(&url), error = %e, "hedged call attempt failed");
                    last_err = Some(classify_transport_error(&url, latency, e));
                }
            }
        }

        Err(last_err.unwrap_or(RpcError::NoHealthyEndpoint { role: self.role }))
    }

    /// Broadcast a raw transaction to every healthy endpoint in this pool
    /// concurrently (racing submission), returning as soon as any endpoint
    /// accepts it. Intended for [`EndpointRole::Write`] and
    /// [`EndpointRole::Relay`] pools, where landing the transaction on *any*
    /// builder/mempool path is what matters, not which one answered first.
    pub async fn broadcast_raw_transaction(
        &self,
        raw_tx: alloy::primitives::Bytes,
    ) -> Result<alloy::primitives::B256, RpcError> {
        let candidates = self.ordered_endpoints();
        if candidates.is_empty() {
            return Err(RpcError::NoHealthyEndpoint { role: self.role });
        }

        let targets: Vec<&Endpoint> = candidates
            .into_iter()
            .filter(|e| e.is_healthy(self.max_consecutive_failures))
            .collect();
        if targets.is_empty() {
            warn!(
                role = ?self.role,
                "Refusing to broadcast: every endpoint in pool is unhealthy"
            );
            return Err(RpcError::NoHealthyEndpoint { role: self.role });
        }

        debug!(
            count = targets.len(),
            role = ?self.role,
            "Broadcasting raw transaction to write pool"
        );

        let futures: Vec<_> = targets
            .into_iter()
            .map(|endpoint| {
                let raw_tx = raw_tx.clone();
                async move {
                    let start = Instant::now();
                    let url = match endpoint.url.parse() {
                        Ok(url) => url,
                        Err(e) => {
                            return Err(classify_transport_error(
                                &endpoint.url,
                                start.elapsed(),
                                anyhow::anyhow!("bad url: {e}"),
                            ))
                        }
                    };
                    let provider = ProviderBuilder::new().on_http(url);
                    let result = provider.send_raw_transaction(&raw_tx).await;
                    let latency = start.elapsed();
                    match &result {
                        Ok(_) => endpoint.record_success(latency),
                        Err(_) => endpoint.record_failure(),
                    }
                    result
                        .map(|pending| *pending.tx_hash())
                        .map_err(|e| classify_transport_error(&endpoint.url, latency, e.into()))
                }
            })
            .collect();

        let mut last_err = None;
        let mut pending = futures;
        while !pending.is_empty() {
            let (result, _index, remaining) = futures::future::select_all(pending).await;
            match result {
                Ok(hash) => return Ok(hash),
                Err(e) => {
                    last_err = Some(e);
                    pending = remaining;
                }
            }
        }

        Err(last_err.unwrap_or(RpcError::NoHealthyEndpoint { role: self.role }))
    }

    /// Health snapshot for every endpoint in this pool.
    pub fn health(&self) -> Vec<EndpointHealth> {
        self.endpoints.iter().map(Endpoint::snapshot).collect()
    }

    /// Number of endpoints currently considered healthy.
    pub fn healthy_count(&self) -> usize {
        self.endpoints
            .iter()
            .filter(|e| e.is_healthy(self.max_consecutive_failures))
            .count()
    }

    /// Record the outcome of an out-of-band call made against a specific URL
    /// (used by callers that make typed contract calls directly rather than
    /// through [`Self::get_block_number_hedged`]).
    pub fn record_outcome(&self, url: &str, success: bool, latency: Duration) {
        if let Some(endpoint) = self.endpoints.iter().find(|e| e.url == url) {
            if success {
                endpoint.record_success(latency);
            } else {
                endpoint.record_failure();
            }
        }
    }

    /// Pick the best single URL to use for a one-off call (lowest latency
    /// among healthy endpoints, falling back to any endpoint if all unhealthy).
    pub fn best_url(&self) -> &str {
        self.endpoints
            .iter()
            .filter(|e| e.is_healthy(self.max_consecutive_failures))
            .min_by_key(|e| e.last_latency_ms.load(Ordering::Relaxed))
            .or_else(|| self.endpoints.first())
            .map(|e| e.url.as_str())
            .unwrap_or_default()
    }
}

/// Aggregate stats across read and write pools, exposed for the Supervisor's
/// health endpoint.
pub struct RpcPoolStats {
    stats: DashMap<EndpointRole, usize>,
}

impl RpcPoolStats {
    pub fn from_pools(pools: &[&RpcPool]) -> Self {
        let stats = DashMap::new();
        for pool in pools {
            stats.insert(pool.role(), pool.healthy_count());
        }
        Self { stats }
    }

    pub fn healthy_count(&self, role: EndpointRole) -> usize {
        self.stats.get(&role).map(|v| *v).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_requires_nonempty() {
        let pool = RpcPool::new(EndpointRole::Read, vec!["http://localhost:8545".into()]);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.healthy_count(), 1);
    }

    #[test]
    fn test_endpoint_health_degrades_after_failures() {
        let endpoint = Endpoint::new("http://localhost:8545".into());
        assert!(endpoint.is_healthy(DEFAULT_MAX_CONSECUTIVE_FAILURES));
        for _ in 0..DEFAULT_MAX_CONSECUTIVE_FAILURES {
            endpoint.record_failure();
        }
        assert!(!endpoint.is_healthy(DEFAULT_MAX_CONSECUTIVE_FAILURES));
        endpoint.record_success(Duration::from_millis(10));
        assert!(endpoint.is_healthy(DEFAULT_MAX_CONSECUTIVE_FAILURES));
    }

    #[test]
    fn test_best_url_prefers_lower_latency() {
        let pool = RpcPool::new(
            EndpointRole::Read,
            vec!["http://a:8545".into(), "http://b:8545".into()],
        );
        pool.record_outcome("http://a:8545", true, Duration::from_millis(50));
        pool.record_outcome("http://b:8545", true, Duration::from_millis(5));
        assert_eq!(pool.best_url(), "http://b:8545");
    }

    #[test]
    #[should_panic]
    fn test_pool_panics_on_empty() {
        RpcPool::new(EndpointRole::Write, vec![]);
    }

    #[test]
    fn test_mask_url_strips_path_and_query() {
        assert_eq!(
            mask_url("https://eth-mainnet.g.alchemy.com/v2/super-secret-key"),
            "https://eth-mainnet.g.alchemy.com/***"
        );
        assert_eq!(
            mask_url("https://rpc.example.com?apikey=abc123"),
            "https://rpc.example.com/***"
        );
        assert_eq!(mask_url("not a url"), "***");
    }

    #[tokio::test]
    async fn test_hedged_call_skips_hedge_for_small_batches() {
        let pool = RpcPool::new(
            EndpointRole::Read,
            vec!["http://a:8545".into(), "http://b:8545".into()],
        );
        let attempts = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let attempts_clone = attempts.clone();
        let result = pool
            .hedged_call(1, Duration::from_millis(50), 5, move |_url| {
                let attempts = attempts_clone.clone();
                async move {
                    attempts.fetch_add(1, Ordering::Relaxed);
                    Ok::<u64, anyhow::Error>(42)
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 42);
        assert_eq!(attempts.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_broadcast_fails_with_no_healthy_endpoint_instead_of_falling_back() {
        let pool = RpcPool::new(
            EndpointRole::Write,
            vec!["http://a:8545".into(), "http://b:8545".into()],
        );
        for endpoint in &pool.endpoints {
            for _ in 0..DEFAULT_MAX_CONSECUTIVE_FAILURES {
                endpoint.record_failure();
            }
        }

        let result = pool
            .broadcast_raw_transaction(alloy::primitives::Bytes::from_static(&[0x01]))
            .await;

        assert!(matches!(result, Err(RpcError::NoHealthyEndpoint { role: EndpointRole::Write })));
    }

    #[test]
    fn test_classify_transport_error_detects_rate_limit_and_timeout() {
        let rate_limited = classify_transport_error(
            "http://a:8545",
            Duration::from_millis(10),
            anyhow::anyhow!("HTTP 429 Too Many Requests"),
        );
        assert!(matches!(rate_limited, RpcError::RateLimit { .. }));

        let timed_out = classify_transport_error(
            "http://a:8545",
            Duration::from_millis(5_000),
            anyhow::anyhow!("operation timed out"),
        );
        assert!(matches!(timed_out, RpcError::Timeout { elapsed_ms: 5_000, .. }));
    }
}
