//! The platform fetcher trait and the shared pagination driver.
//!
//! Each upstream implements [`PlatformFetcher::fetch_page`] for its own
//! pagination idiom and schema; [`FetchDriver::fetch_all`] provides the
//! generic cache-checked, rate-limited, page-bounded accumulation loop that
//! every platform shares.

use crate::cache::MemoryCache;
use crate::error::{FetchError, Result};
use crate::ratelimit::RateLimiter;
use crate::sink::PersistenceSink;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use truthbounty_core::{FetchConfig, Platform, TraderStats, UnifiedMarket};

/// Pagination position across the three idioms real upstreams use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cursor {
    /// Numeric offset into the result set (Polymarket, Metaculus, Azuro).
    Offset(u64),
    /// 1-based page number (Limitless, SX Bet).
    Page(u64),
    /// Opaque continuation token (Kalshi, Manifold).
    Token(String),
}

/// One page of normalized markets from an upstream.
#[derive(Debug, Clone)]
pub struct PageResult {
    /// Markets on this page, in upstream order.
    pub markets: Vec<UnifiedMarket>,
    /// Whether the upstream reports more pages.
    pub has_more: bool,
    /// Position of the next page, when `has_more`.
    pub next_cursor: Option<Cursor>,
    /// Total result count, when the upstream reports one.
    pub total_count: Option<u64>,
}

impl PageResult {
    /// A terminal page with no further data.
    #[must_use]
    pub fn last(markets: Vec<UnifiedMarket>) -> Self {
        Self {
            markets,
            has_more: false,
            next_cursor: None,
            total_count: None,
        }
    }
}

/// Options for a full multi-page fetch.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Skip the cache and hit upstream.
    pub force_refresh: bool,
    /// Page size requested from upstream.
    pub limit: u32,
    /// Override for the safety page ceiling.
    pub max_pages: Option<u32>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            force_refresh: false,
            limit: 100,
            max_pages: None,
        }
    }
}

/// A platform-specific adapter: fetches one page of raw upstream data and
/// normalizes it into [`UnifiedMarket`].
///
/// Implementations must tolerate partial upstream failure (a single
/// malformed record is skipped, not fatal) and carry explicit HTTP
/// timeouts.
#[async_trait]
pub trait PlatformFetcher: Send + Sync {
    /// The platform this fetcher serves.
    fn platform(&self) -> Platform;

    /// Fetches and normalizes one page.
    async fn fetch_page(&self, cursor: Option<Cursor>, limit: u32) -> Result<PageResult>;

    /// Whether this platform exposes per-trader statistics.
    fn supports_trader_stats(&self) -> bool {
        false
    }

    /// Coarse trader stats (leaderboard-level) for this platform.
    async fn fetch_trader_stats(&self, _limit: u32) -> Result<Vec<TraderStats>> {
        Ok(Vec::new())
    }

    /// Detailed stats for one wallet, if the platform can resolve them.
    async fn fetch_trader_detail(&self, _address: &str) -> Result<Option<TraderStats>> {
        Ok(None)
    }
}

/// Shared multi-page fetch driver.
///
/// Owns the process-wide rate limiter, cache, and persistence sink; all
/// fetchers run through one driver instance.
pub struct FetchDriver {
    limiter: Arc<RateLimiter>,
    cache: Arc<MemoryCache<Vec<UnifiedMarket>>>,
    sink: Arc<dyn PersistenceSink>,
    config: FetchConfig,
}

impl FetchDriver {
    #[must_use]
    pub fn new(
        limiter: Arc<RateLimiter>,
        cache: Arc<MemoryCache<Vec<UnifiedMarket>>>,
        sink: Arc<dyn PersistenceSink>,
        config: FetchConfig,
    ) -> Self {
        Self {
            limiter,
            cache,
            sink,
            config,
        }
    }

    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<MemoryCache<Vec<UnifiedMarket>>> {
        &self.cache
    }

    /// Cache key for a platform's full market snapshot.
    #[must_use]
    pub fn cache_key(platform: Platform) -> String {
        format!("{}:markets", platform.slug())
    }

    /// Fetches all pages for one platform.
    ///
    /// Checks the cache first unless `force_refresh`, then loops
    /// `fetch_page` advancing the cursor until the upstream reports no more
    /// data or the safety page ceiling is reached. A page error after the
    /// first page logs and returns the partial accumulation; an error on
    /// the first page propagates so the orchestrator can record it. The
    /// final aggregate is cached and written to the persistence sink
    /// without blocking or failing the read path.
    ///
    /// # Errors
    /// Returns the underlying [`FetchError`] only when no page could be
    /// fetched at all.
    pub async fn fetch_all(
        &self,
        fetcher: &dyn PlatformFetcher,
        options: &FetchOptions,
    ) -> Result<Vec<UnifiedMarket>> {
        let platform = fetcher.platform();
        let key = Self::cache_key(platform);

        if !options.force_refresh {
            if let Some(cached) = self.cache.get(&key) {
                tracing::debug!(platform = %platform, count = cached.len(), "cache hit");
                return Ok(cached);
            }
        }

        let max_pages = options.max_pages.unwrap_or(self.config.max_pages);
        let mut all: Vec<UnifiedMarket> = Vec::new();
        let mut cursor: Option<Cursor> = None;
        let mut page = 0u32;

        loop {
            if page >= max_pages {
                tracing::warn!(
                    platform = %platform,
                    max_pages,
                    "page ceiling reached, stopping fetch"
                );
                break;
            }

            let result = self
                .limiter
                .execute_with_retry(platform, || fetcher.fetch_page(cursor.clone(), options.limit))
                .await;

            let page_result = match result {
                Ok(r) => r,
                Err(err) if page == 0 => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        platform = %platform,
                        page,
                        error = %err,
                        "page fetch failed, keeping partial progress"
                    );
                    break;
                }
            };

            page += 1;
            all.extend(page_result.markets);

            if !page_result.has_more {
                break;
            }
            cursor = page_result.next_cursor;
            if cursor.is_none() {
                tracing::warn!(platform = %platform, "has_more without cursor, stopping");
                break;
            }

            // Small inter-page delay to avoid bursting upstream.
            if self.config.page_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.page_delay_ms)).await;
            }
        }

        tracing::info!(platform = %platform, pages = page, markets = all.len(), "fetch complete");

        self.cache.set(
            key,
            all.clone(),
            Duration::from_secs(self.config.full_fetch_ttl_secs),
        );

        // Persistence is a side effect, not part of the fetch contract.
        let sink = Arc::clone(&self.sink);
        let snapshot = all.clone();
        tokio::spawn(async move {
            if let Err(err) = sink.store_markets(&snapshot).await {
                tracing::warn!(platform = %platform, error = %err, "persist failed");
            }
        });

        Ok(all)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use truthbounty_core::{AppConfig, MarketStatus};

    pub(crate) fn market(platform: Platform, external_id: &str) -> UnifiedMarket {
        UnifiedMarket {
            id: UnifiedMarket::qualified_id(platform, external_id),
            platform,
            external_id: external_id.to_string(),
            title: format!("market {external_id}"),
            description: None,
            category: None,
            outcomes: vec![],
            yes_price: None,
            no_price: None,
            volume: None,
            volume_24h: None,
            liquidity: None,
            closes_at: None,
            expires_at: None,
            resolved_at: None,
            winning_outcome: None,
            status: MarketStatus::Open,
            chain: None,
            currency: "USD".to_string(),
            fetched_at: Utc::now(),
            metadata: None,
        }
    }

    /// Serves a fixed script of page results, one per call.
    struct ScriptedFetcher {
        platform: Platform,
        script: Mutex<std::collections::VecDeque<Result<PageResult>>>,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn new(platform: Platform, script: Vec<Result<PageResult>>) -> Self {
            Self {
                platform,
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PlatformFetcher for ScriptedFetcher {
        fn platform(&self) -> Platform {
            self.platform
        }

        async fn fetch_page(&self, _cursor: Option<Cursor>, _limit: u32) -> Result<PageResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::Configuration("script exhausted".into())))
        }
    }

    /// Always reports another page; exercises the safety ceiling.
    struct EndlessFetcher {
        platform: Platform,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PlatformFetcher for EndlessFetcher {
        fn platform(&self) -> Platform {
            self.platform
        }

        async fn fetch_page(&self, _cursor: Option<Cursor>, _limit: u32) -> Result<PageResult> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as u64;
            Ok(PageResult {
                markets: vec![market(self.platform, &format!("m{n}"))],
                has_more: true,
                next_cursor: Some(Cursor::Offset(n + 1)),
                total_count: None,
            })
        }
    }

    fn driver(sink: Arc<dyn PersistenceSink>) -> FetchDriver {
        let config = AppConfig::default();
        FetchDriver::new(
            Arc::new(RateLimiter::new(&config)),
            Arc::new(MemoryCache::new()),
            sink,
            FetchConfig {
                page_delay_ms: 0,
                ..FetchConfig::default()
            },
        )
    }

    fn page(platform: Platform, ids: &[&str], has_more: bool, next: Option<Cursor>) -> PageResult {
        PageResult {
            markets: ids.iter().map(|id| market(platform, id)).collect(),
            has_more,
            next_cursor: next,
            total_count: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_all_accumulates_pages_in_order() {
        let platform = Platform::Limitless;
        let fetcher = ScriptedFetcher::new(
            platform,
            vec![
                Ok(page(platform, &["a", "b"], true, Some(Cursor::Page(2)))),
                Ok(page(platform, &["c", "d"], true, Some(Cursor::Page(3)))),
                Ok(page(platform, &["e", "f"], false, None)),
            ],
        );
        let driver = driver(Arc::new(MemorySink::new()));

        let markets = driver
            .fetch_all(&fetcher, &FetchOptions::default())
            .await
            .unwrap();

        let ids: Vec<&str> = markets.iter().map(|m| m.external_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d", "e", "f"]);

        // The cache holds the same six markets after the call.
        let cached = driver.cache().get(&FetchDriver::cache_key(platform)).unwrap();
        assert_eq!(cached.len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_all_stops_at_page_ceiling() {
        // Upstream never reports has_more = false.
        let platform = Platform::Polymarket;
        let fetcher = EndlessFetcher {
            platform,
            calls: AtomicUsize::new(0),
        };
        let driver = driver(Arc::new(MemorySink::new()));

        let markets = driver
            .fetch_all(
                &fetcher,
                &FetchOptions {
                    max_pages: Some(7),
                    ..FetchOptions::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 7);
        assert_eq!(markets.len(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_all_returns_partial_on_mid_loop_error() {
        let platform = Platform::Manifold;
        let fetcher = ScriptedFetcher::new(
            platform,
            vec![
                Ok(page(
                    platform,
                    &["a", "b"],
                    true,
                    Some(Cursor::Token("b".into())),
                )),
                Err(FetchError::api(400, "bad cursor")),
            ],
        );
        let driver = driver(Arc::new(MemorySink::new()));

        let markets = driver
            .fetch_all(&fetcher, &FetchOptions::default())
            .await
            .unwrap();
        assert_eq!(markets.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_all_propagates_first_page_error() {
        let platform = Platform::Kalshi;
        let fetcher =
            ScriptedFetcher::new(platform, vec![Err(FetchError::api(400, "bad request"))]);
        let driver = driver(Arc::new(MemorySink::new()));

        let result = driver.fetch_all(&fetcher, &FetchOptions::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_all_serves_from_cache() {
        let platform = Platform::SxBet;
        let fetcher = ScriptedFetcher::new(
            platform,
            vec![
                Ok(page(platform, &["a"], false, None)),
                Ok(page(platform, &["a"], false, None)),
            ],
        );
        let driver = driver(Arc::new(MemorySink::new()));

        driver
            .fetch_all(&fetcher, &FetchOptions::default())
            .await
            .unwrap();
        driver
            .fetch_all(&fetcher, &FetchOptions::default())
            .await
            .unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        // force_refresh bypasses the cache.
        driver
            .fetch_all(
                &fetcher,
                &FetchOptions {
                    force_refresh: true,
                    ..FetchOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_all_writes_to_sink() {
        let platform = Platform::Metaculus;
        let fetcher =
            ScriptedFetcher::new(platform, vec![Ok(page(platform, &["a", "b"], false, None))]);
        let sink = Arc::new(MemorySink::new());
        let driver = driver(sink.clone() as Arc<dyn PersistenceSink>);

        driver
            .fetch_all(&fetcher, &FetchOptions::default())
            .await
            .unwrap();

        // Sink write is spawned; yield so it runs.
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(sink.markets().len(), 2);
    }
}
