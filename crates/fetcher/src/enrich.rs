//! Deadline-bounded trader enrichment.
//!
//! Per-trader detail lookups run in small concurrent batches under a hard
//! wall-clock budget, sized for short serverless-style request deadlines.
//! When the budget is exhausted the partial result is returned; a slow
//! platform degrades a leaderboard, it does not fail it.

use crate::fetch::PlatformFetcher;
use std::time::Duration;
use tokio::time::Instant;
use truthbounty_core::TraderStats;

/// Caps for one enrichment call.
#[derive(Debug, Clone, Copy)]
pub struct EnrichLimits {
    /// Concurrent detail lookups per batch.
    pub batch_size: usize,
    /// Hard ceiling on traders enriched per call.
    pub max_traders: usize,
    /// Wall-clock budget for the whole call.
    pub budget: Duration,
}

impl Default for EnrichLimits {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_traders: 30,
            budget: Duration::from_secs(8),
        }
    }
}

/// Resolves detailed stats for up to `max_traders` addresses in batches of
/// `batch_size`, stopping early once `budget` has elapsed.
///
/// Failed or missing lookups are skipped; the order of returned stats
/// follows the input addresses.
pub async fn enrich_traders(
    fetcher: &dyn PlatformFetcher,
    addresses: &[String],
    limits: EnrichLimits,
) -> Vec<TraderStats> {
    let started = Instant::now();
    let capped = &addresses[..addresses.len().min(limits.max_traders)];
    let mut enriched = Vec::with_capacity(capped.len());

    for batch in capped.chunks(limits.batch_size.max(1)) {
        if started.elapsed() >= limits.budget {
            tracing::warn!(
                platform = %fetcher.platform(),
                enriched = enriched.len(),
                requested = capped.len(),
                "enrichment budget exhausted, returning partial"
            );
            break;
        }

        let lookups = batch.iter().map(|address| async move {
            match fetcher.fetch_trader_detail(address).await {
                Ok(detail) => detail,
                Err(err) => {
                    tracing::debug!(
                        platform = %fetcher.platform(),
                        address = %address,
                        error = %err,
                        "trader detail lookup failed"
                    );
                    None
                }
            }
        });

        enriched.extend(
            futures_util::future::join_all(lookups)
                .await
                .into_iter()
                .flatten(),
        );
    }

    enriched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::fetch::{Cursor, PageResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use truthbounty_core::Platform;

    struct DetailFetcher {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl PlatformFetcher for DetailFetcher {
        fn platform(&self) -> Platform {
            Platform::SxBet
        }

        async fn fetch_page(&self, _cursor: Option<Cursor>, _limit: u32) -> Result<PageResult> {
            Ok(PageResult::last(Vec::new()))
        }

        fn supports_trader_stats(&self) -> bool {
            true
        }

        async fn fetch_trader_detail(&self, address: &str) -> Result<Option<TraderStats>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let mut stats = TraderStats::new(address, Platform::SxBet);
            stats.total_bets = 10;
            Ok(Some(stats))
        }
    }

    fn addresses(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("0x{i:04x}")).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_enrich_caps_total_traders() {
        let fetcher = DetailFetcher {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        };
        let enriched = enrich_traders(&fetcher, &addresses(100), EnrichLimits::default()).await;

        assert_eq!(enriched.len(), 30);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enrich_stops_at_deadline_with_partial() {
        // Each batch takes ~1s; a 2.5s budget admits three batches
        // (checked at 0s, 1s, 2s) of five lookups each.
        let fetcher = DetailFetcher {
            calls: AtomicUsize::new(0),
            delay: Duration::from_secs(1),
        };
        let limits = EnrichLimits {
            batch_size: 5,
            max_traders: 30,
            budget: Duration::from_millis(2_500),
        };
        let enriched = enrich_traders(&fetcher, &addresses(30), limits).await;

        assert_eq!(enriched.len(), 15);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enrich_preserves_input_order() {
        let fetcher = DetailFetcher {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        };
        let input = addresses(8);
        let enriched = enrich_traders(&fetcher, &input, EnrichLimits::default()).await;
        let got: Vec<&str> = enriched.iter().map(|s| s.address.as_str()).collect();
        let want: Vec<String> = input.iter().map(|a| a.to_lowercase()).collect();
        assert_eq!(got, want);
    }
}
