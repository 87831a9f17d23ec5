//! Historical log backfill: chunked `eth_getLogs` over a cold-start window.
//!
//! [`EventListener`](crate::event_listener::EventListener) only sees pool
//! events from the moment its WebSocket subscription opens. Anything that
//! happened while the bot was down — a Borrow, a Repay, a liquidation by a
//! competitor — has to be recovered by walking `eth_getLogs` backwards from
//! the current head in bounded chunks, the same chunked-range idiom
//! [`MicroMulticall::aggregate_chunked`](crate::multicall::MicroMulticall)
//! uses for batching: do the largest safe unit of work per round trip, and
//! keep going if a unit fails rather than aborting the whole backfill.

use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::Filter;
use anyhow::Result;
use std::time::Duration;
use tracing::{debug, warn};

use crate::contracts::event_signatures;
use crate::event_listener::{parse_pool_event, PoolEvent};

/// One gap between the block the tracker was last caught up to and the
/// current chain head, to be filled via chunked backfill.
#[derive(Debug, Clone, Copy)]
pub struct BackfillRange {
    pub from_block: u64,
    pub to_block: u64,
}

impl BackfillRange {
    /// Build a range covering `window_blocks` behind `head`, clamped at 0.
    pub fn trailing(head: u64, window_blocks: u64) -> Self {
        Self {
            from_block: head.saturating_sub(window_blocks),
            to_block: head,
        }
    }

    pub fn len(&self) -> u64 {
        self.to_block.saturating_sub(self.from_block)
    }
}

/// Outcome of a single backfill pass.
#[derive(Debug, Default)]
pub struct BackfillReport {
    pub events: Vec<PoolEvent>,
    pub chunks_attempted: u64,
    pub chunks_skipped: u64,
}

/// Chunked, best-effort historical scanner for Pool events.
pub struct Backfiller {
    rpc_url: String,
    pool_address: Address,
    chunk_blocks: u64,
    max_logs_per_chunk: usize,
}

const MAX_RETRIES_PER_CHUNK: u32 = 3;
const BASE_BACKOFF_MS: u64 = 200;

impl Backfiller {
    pub fn new(rpc_url: impl Into<String>, pool_address: Address, chunk_blocks: u64, max_logs_per_chunk: usize) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            pool_address,
            chunk_blocks: chunk_blocks.max(1),
            max_logs_per_chunk,
        }
    }

    /// Scan `range` in `chunk_blocks`-sized windows, oldest first, skipping
    /// (not aborting on) chunks that exhaust their retry budget. Shrinks a
    /// chunk in half and retries once if its log count would exceed
    /// `max_logs_per_chunk` — a proxy for "the provider is about to reject
    /// this as too large," without actually knowing the provider's cap.
    pub async fn backfill(&self, range: BackfillRange) -> Result<BackfillReport> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.parse()?);
        let mut report = BackfillReport::default();

        let mut cursor = range.from_block;
        let mut window = self.chunk_blocks;

        while cursor <= range.to_block {
            let end = (cursor + window).min(range.to_block);
            report.chunks_attempted += 1;

            match self.fetch_chunk(&provider, cursor, end).await {
                Ok(logs) => {
                    if logs.len() > self.max_logs_per_chunk && window > 1 {
                        // Too dense: shrink the window and redo this span
                        // without advancing the cursor.
                        window = (window / 2).max(1);
                        debug!(cursor, end, log_count = logs.len(), new_window = window, "shrinking backfill window");
                        continue;
                    }

                    for log in logs {
                        if let Some(event) = parse_pool_event(log) {
                            report.events.push(event);
                        }
                    }
                    cursor = end + 1;
                    // Gradually grow the window back toward the configured
                    // default as density allows.
                    window = (window * 2).min(self.chunk_blocks);
                }
                Err(e) => {
                    warn!(cursor, end, error = %e, "backfill chunk exhausted retries, skipping");
                    report.chunks_skipped += 1;
                    cursor = end + 1;
                }
            }
        }

        Ok(report)
    }

    async fn fetch_chunk(
        &self,
        provider: &impl Provider,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<alloy::rpc::types::Log>> {
        let filter = Filter::new()
            .address(self.pool_address)
            .event_signature(event_signatures::pool_signatures())
            .from_block(from_block)
            .to_block(to_block);

        let mut attempt = 0u32;
        loop {
            match provider.get_logs(&filter).await {
                Ok(logs) => return Ok(logs),
                Err(e) => {
                    attempt += 1;
                    if attempt >= MAX_RETRIES_PER_CHUNK {
                        return Err(anyhow::anyhow!(e));
                    }
                    let backoff = BASE_BACKOFF_MS * (1 << attempt) + jitter_ms(attempt);
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
            }
        }
    }
}

/// Small deterministic-ish jitter so retries across many concurrent chunk
/// fetches don't all wake up on the same tick.
fn jitter_ms(attempt: u32) -> u64 {
    (attempt as u64 * 37) % 97
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_range_clamps_at_zero() {
        let range = BackfillRange::trailing(100, 500);
        assert_eq!(range.from_block, 0);
        assert_eq!(range.to_block, 100);
    }

    #[test]
    fn test_trailing_range_normal() {
        let range = BackfillRange::trailing(10_000, 2_000);
        assert_eq!(range.from_block, 8_000);
        assert_eq!(range.to_block, 10_000);
        assert_eq!(range.len(), 2_000);
    }

    #[test]
    fn test_jitter_is_bounded() {
        for attempt in 0..10 {
            assert!(jitter_ms(attempt) < 97);
        }
    }
}
