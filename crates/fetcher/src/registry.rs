//! Fetcher registry and cross-platform orchestration.
//!
//! The orchestrator fans out across platforms concurrently and isolates
//! failures: one platform erroring or timing out never cancels or blocks
//! the others. Its result carries a per-platform error string instead.

use crate::fetch::{FetchDriver, FetchOptions, PlatformFetcher};
use crate::ratelimit::RateLimiter;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use truthbounty_core::{Platform, UnifiedMarket};

/// Holds all registered platform fetchers.
#[derive(Default)]
pub struct FetcherRegistry {
    fetchers: RwLock<BTreeMap<Platform, Arc<dyn PlatformFetcher>>>,
}

impl FetcherRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fetcher, replacing any previous one for the platform.
    pub fn register(&self, fetcher: Arc<dyn PlatformFetcher>) {
        let platform = fetcher.platform();
        tracing::debug!(platform = %platform, "registering fetcher");
        self.fetchers.write().insert(platform, fetcher);
    }

    /// Looks up the fetcher for a platform.
    #[must_use]
    pub fn get(&self, platform: Platform) -> Option<Arc<dyn PlatformFetcher>> {
        self.fetchers.read().get(&platform).cloned()
    }

    /// All registered platforms, in stable order.
    #[must_use]
    pub fn platforms(&self) -> Vec<Platform> {
        self.fetchers.read().keys().copied().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fetchers.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fetchers.read().is_empty()
    }
}

/// One platform's slot in an orchestrated fetch.
#[derive(Debug, Clone)]
pub struct PlatformFetchResult {
    pub platform: Platform,
    /// Markets fetched; empty when the platform failed entirely.
    pub markets: Vec<UnifiedMarket>,
    /// Error string when the platform's fetch failed.
    pub error: Option<String>,
}

/// Drives full fetches across all registered platforms.
pub struct Orchestrator {
    registry: Arc<FetcherRegistry>,
    driver: Arc<FetchDriver>,
    sync_task: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(registry: Arc<FetcherRegistry>, driver: Arc<FetchDriver>) -> Self {
        Self {
            registry,
            driver,
            sync_task: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<FetcherRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn driver(&self) -> &Arc<FetchDriver> {
        &self.driver
    }

    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        self.driver.limiter()
    }

    /// Runs every requested platform's full fetch concurrently.
    ///
    /// Platforms without a registered fetcher get a configuration error in
    /// their slot. Failures are isolated per slot; the call itself never
    /// fails.
    pub async fn fetch_all_platform_markets(
        &self,
        platforms: &[Platform],
        options: &FetchOptions,
    ) -> Vec<PlatformFetchResult> {
        let tasks = platforms.iter().map(|platform| {
            let platform = *platform;
            let options = options.clone();
            async move {
                let Some(fetcher) = self.registry.get(platform) else {
                    return PlatformFetchResult {
                        platform,
                        markets: Vec::new(),
                        error: Some(format!("no fetcher registered for {platform}")),
                    };
                };

                match self.driver.fetch_all(fetcher.as_ref(), &options).await {
                    Ok(markets) => PlatformFetchResult {
                        platform,
                        markets,
                        error: None,
                    },
                    Err(err) => {
                        tracing::warn!(platform = %platform, error = %err, "platform fetch failed");
                        PlatformFetchResult {
                            platform,
                            markets: Vec::new(),
                            error: Some(err.to_string()),
                        }
                    }
                }
            }
        });

        futures_util::future::join_all(tasks).await
    }

    /// Fetches every registered platform.
    pub async fn fetch_all_registered(&self, options: &FetchOptions) -> Vec<PlatformFetchResult> {
        let platforms = self.registry.platforms();
        self.fetch_all_platform_markets(&platforms, options).await
    }

    /// Starts the background sync loop re-fetching every platform with
    /// `force_refresh` on a fixed interval. Returns false (and does
    /// nothing) if already running.
    pub fn start_background_sync(self: &Arc<Self>, interval: Duration) -> bool {
        let mut guard = self.sync_task.lock();
        if guard.as_ref().is_some_and(|task| !task.is_finished()) {
            tracing::debug!("background sync already running");
            return false;
        }

        let orchestrator = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it so starting the
            // loop does not trigger an extra fetch cycle.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let options = FetchOptions {
                    force_refresh: true,
                    ..FetchOptions::default()
                };
                let results = orchestrator.fetch_all_registered(&options).await;
                let failed = results.iter().filter(|r| r.error.is_some()).count();
                let total: usize = results.iter().map(|r| r.markets.len()).sum();
                tracing::info!(
                    platforms = results.len(),
                    failed,
                    markets = total,
                    "background sync cycle complete"
                );
            }
        });
        *guard = Some(handle);
        true
    }

    /// Stops the background sync loop, releasing its timer. Idempotent.
    pub fn stop_background_sync(&self) {
        if let Some(task) = self.sync_task.lock().take() {
            task.abort();
            tracing::debug!("background sync stopped");
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Some(task) = self.sync_task.lock().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::error::FetchError;
    use crate::fetch::tests::market;
    use crate::fetch::{Cursor, PageResult};
    use crate::sink::MemorySink;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use truthbounty_core::{AppConfig, FetchConfig};

    struct StaticFetcher {
        platform: Platform,
        count: usize,
    }

    #[async_trait]
    impl PlatformFetcher for StaticFetcher {
        fn platform(&self) -> Platform {
            self.platform
        }

        async fn fetch_page(
            &self,
            _cursor: Option<Cursor>,
            _limit: u32,
        ) -> crate::error::Result<PageResult> {
            let markets = (0..self.count)
                .map(|i| market(self.platform, &format!("m{i}")))
                .collect();
            Ok(PageResult::last(markets))
        }
    }

    struct FailingFetcher {
        platform: Platform,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PlatformFetcher for FailingFetcher {
        fn platform(&self) -> Platform {
            self.platform
        }

        async fn fetch_page(
            &self,
            _cursor: Option<Cursor>,
            _limit: u32,
        ) -> crate::error::Result<PageResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(FetchError::api(502, "upstream down"))
        }
    }

    fn orchestrator() -> Arc<Orchestrator> {
        let config = AppConfig::default();
        let driver = Arc::new(FetchDriver::new(
            Arc::new(RateLimiter::new(&config)),
            Arc::new(MemoryCache::new()),
            Arc::new(MemorySink::new()),
            FetchConfig {
                page_delay_ms: 0,
                ..FetchConfig::default()
            },
        ));
        Arc::new(Orchestrator::new(Arc::new(FetcherRegistry::new()), driver))
    }

    #[test]
    fn test_registry_register_and_get() {
        let registry = FetcherRegistry::new();
        assert!(registry.is_empty());

        registry.register(Arc::new(StaticFetcher {
            platform: Platform::Polymarket,
            count: 1,
        }));

        assert_eq!(registry.len(), 1);
        assert!(registry.get(Platform::Polymarket).is_some());
        assert!(registry.get(Platform::Kalshi).is_none());
        assert_eq!(registry.platforms(), vec![Platform::Polymarket]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_failing_platform_does_not_poison_others() {
        let orch = orchestrator();
        orch.registry().register(Arc::new(StaticFetcher {
            platform: Platform::Polymarket,
            count: 3,
        }));
        orch.registry().register(Arc::new(FailingFetcher {
            platform: Platform::Overtime,
            calls: AtomicUsize::new(0),
        }));
        orch.registry().register(Arc::new(StaticFetcher {
            platform: Platform::SxBet,
            count: 2,
        }));

        let results = orch
            .fetch_all_platform_markets(
                &[Platform::Polymarket, Platform::Overtime, Platform::SxBet],
                &FetchOptions::default(),
            )
            .await;

        assert_eq!(results.len(), 3);

        let poly = &results[0];
        assert_eq!(poly.markets.len(), 3);
        assert!(poly.error.is_none());

        let overtime = &results[1];
        assert!(overtime.markets.is_empty());
        let error = overtime.error.as_deref().unwrap();
        assert!(!error.is_empty());
        assert!(error.contains("502"));

        let sxbet = &results[2];
        assert_eq!(sxbet.markets.len(), 2);
        assert!(sxbet.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregistered_platform_reports_error() {
        let orch = orchestrator();
        let results = orch
            .fetch_all_platform_markets(&[Platform::Drift], &FetchOptions::default())
            .await;
        assert_eq!(results.len(), 1);
        assert!(results[0].error.as_deref().unwrap().contains("no fetcher"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sync_start_is_idempotent() {
        let orch = orchestrator();
        assert!(orch.start_background_sync(Duration::from_secs(300)));
        assert!(!orch.start_background_sync(Duration::from_secs(300)));
        orch.stop_background_sync();
        // Stopping again is a no-op.
        orch.stop_background_sync();
        assert!(orch.start_background_sync(Duration::from_secs(300)));
        orch.stop_background_sync();
    }
}
