//! Per-platform sliding-window rate limiting with backoff.
//!
//! Each platform gets its own request budget (`max_requests` per
//! `window_ms`). A 429 from upstream blocks the platform until the
//! Retry-After deadline, or for a full window when the header is absent.
//! State lives behind one mutex so a slot check and its recording form a
//! single critical section; two concurrent callers can never both pass the
//! check before either records.

use crate::error::{FetchError, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use truthbounty_core::{AppConfig, Platform, PlatformLimitConfig};

#[derive(Debug, Default)]
struct PlatformState {
    /// Timestamps of requests inside the current window.
    window: VecDeque<Instant>,
    /// Platform is blocked until this instant after an upstream 429.
    blocked_until: Option<Instant>,
}

/// Sliding-window rate limiter, one budget per platform.
///
/// One instance per process; under multi-instance deployments each instance
/// limits independently against upstream.
pub struct RateLimiter {
    states: Mutex<HashMap<Platform, PlatformState>>,
    configs: HashMap<Platform, PlatformLimitConfig>,
}

impl RateLimiter {
    /// Builds a limiter with per-platform budgets from the app config.
    #[must_use]
    pub fn new(config: &AppConfig) -> Self {
        let configs = Platform::all()
            .iter()
            .map(|p| (*p, config.limit_for(*p)))
            .collect();
        Self {
            states: Mutex::new(HashMap::new()),
            configs,
        }
    }

    /// Effective budget for a platform.
    #[must_use]
    pub fn config(&self, platform: Platform) -> PlatformLimitConfig {
        self.configs
            .get(&platform)
            .copied()
            .unwrap_or_else(|| PlatformLimitConfig::default_for(platform))
    }

    /// Returns true if a request could be made right now.
    pub fn can_make_request(&self, platform: Platform) -> bool {
        let config = self.config(platform);
        let now = Instant::now();
        let mut states = self.states.lock();
        let state = states.entry(platform).or_default();

        Self::evict(state, now, config.window_ms);

        if state.blocked_until.is_some_and(|until| until > now) {
            return false;
        }
        (state.window.len() as u32) < config.max_requests
    }

    /// Records one request against the platform's window.
    pub fn record_request(&self, platform: Platform) {
        let mut states = self.states.lock();
        states.entry(platform).or_default().window.push_back(Instant::now());
    }

    /// Marks the platform blocked after an upstream rate-limit response.
    ///
    /// Without a Retry-After hint the block lasts a full window.
    pub fn record_rate_limit(&self, platform: Platform, retry_after_ms: Option<u64>) {
        let config = self.config(platform);
        let delay = Duration::from_millis(retry_after_ms.unwrap_or(config.window_ms));
        let until = Instant::now() + delay;

        tracing::warn!(
            platform = %platform,
            blocked_ms = delay.as_millis() as u64,
            "platform rate limited, blocking"
        );

        let mut states = self.states.lock();
        states.entry(platform).or_default().blocked_until = Some(until);
    }

    /// Suspends until a slot is free, then claims it.
    ///
    /// Check and claim happen under one lock; the wait between polls is the
    /// only suspension point.
    pub async fn wait_for_slot(&self, platform: Platform) {
        let config = self.config(platform);
        loop {
            let wait = {
                let now = Instant::now();
                let mut states = self.states.lock();
                let state = states.entry(platform).or_default();
                Self::evict(state, now, config.window_ms);

                if let Some(until) = state.blocked_until.filter(|until| *until > now) {
                    until - now
                } else if (state.window.len() as u32) < config.max_requests {
                    state.window.push_back(now);
                    return;
                } else {
                    // Oldest entry ages out of the window first.
                    let oldest = state.window.front().copied().unwrap_or(now);
                    (oldest + Duration::from_millis(config.window_ms)).saturating_duration_since(now)
                }
            };
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }

    /// Runs `operation` under the platform's budget, retrying transient
    /// failures with exponential backoff (`backoff_multiplier^attempt`
    /// seconds) up to the configured attempt count.
    ///
    /// # Errors
    /// Propagates the last error once retries are exhausted, or immediately
    /// for non-transient failures. Callers treat this as "platform
    /// temporarily unavailable" and degrade to an empty result.
    pub async fn execute_with_retry<T, F, Fut>(&self, platform: Platform, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let config = self.config(platform);
        let mut attempt: u32 = 1;

        loop {
            self.wait_for_slot(platform).await;

            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if let FetchError::RateLimited { retry_after_ms } = &err {
                        self.record_rate_limit(platform, Some(*retry_after_ms));
                    }

                    if !err.is_transient() || attempt >= config.retry_attempts {
                        return Err(err);
                    }

                    let delay = config.backoff_multiplier.powi(attempt as i32);
                    tracing::warn!(
                        platform = %platform,
                        attempt,
                        delay_secs = delay,
                        error = %err,
                        "fetch failed, backing off"
                    );
                    tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                    attempt += 1;
                }
            }
        }
    }

    fn evict(state: &mut PlatformState, now: Instant, window_ms: u64) {
        let window = Duration::from_millis(window_ms);
        while let Some(front) = state.window.front() {
            if now.saturating_duration_since(*front) >= window {
                state.window.pop_front();
            } else {
                break;
            }
        }
        if state.blocked_until.is_some_and(|until| until <= now) {
            state.blocked_until = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn limiter_with(max_requests: u32, window_ms: u64) -> RateLimiter {
        let mut config = AppConfig::default();
        config.limits.insert(
            Platform::Polymarket.slug().to_string(),
            PlatformLimitConfig {
                max_requests,
                window_ms,
                retry_attempts: 3,
                backoff_multiplier: 2.0,
            },
        );
        RateLimiter::new(&config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_fills_and_evicts() {
        let limiter = limiter_with(3, 60_000);

        for _ in 0..3 {
            assert!(limiter.can_make_request(Platform::Polymarket));
            limiter.record_request(Platform::Polymarket);
        }
        assert!(!limiter.can_make_request(Platform::Polymarket));

        // After a full window with no new requests the budget resets.
        tokio::time::advance(Duration::from_millis(60_000)).await;
        assert!(limiter.can_make_request(Platform::Polymarket));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_block_honors_retry_after() {
        let limiter = limiter_with(10, 60_000);

        limiter.record_rate_limit(Platform::Polymarket, Some(5_000));
        assert!(!limiter.can_make_request(Platform::Polymarket));

        tokio::time::advance(Duration::from_millis(5_001)).await;
        assert!(limiter.can_make_request(Platform::Polymarket));
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_defaults_to_full_window() {
        let limiter = limiter_with(10, 60_000);

        limiter.record_rate_limit(Platform::Polymarket, None);
        tokio::time::advance(Duration::from_millis(30_000)).await;
        assert!(!limiter.can_make_request(Platform::Polymarket));
        tokio::time::advance(Duration::from_millis(30_001)).await;
        assert!(limiter.can_make_request(Platform::Polymarket));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_slot_claims_atomically() {
        let limiter = limiter_with(2, 60_000);

        limiter.wait_for_slot(Platform::Polymarket).await;
        limiter.wait_for_slot(Platform::Polymarket).await;
        assert!(!limiter.can_make_request(Platform::Polymarket));
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_platforms_unaffected() {
        let limiter = limiter_with(1, 60_000);
        limiter.record_request(Platform::Polymarket);
        assert!(!limiter.can_make_request(Platform::Polymarket));
        assert!(limiter.can_make_request(Platform::Kalshi));
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_with_retry_recovers_from_transient() {
        let limiter = limiter_with(10, 60_000);
        let calls = AtomicU32::new(0);

        let result: Result<u32> = limiter
            .execute_with_retry(Platform::Polymarket, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(FetchError::Network("flaky".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_with_retry_exhausts_attempts() {
        let limiter = limiter_with(10, 60_000);
        let calls = AtomicU32::new(0);

        let result: Result<u32> = limiter
            .execute_with_retry(Platform::Polymarket, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FetchError::Timeout("slow upstream".into())) }
            })
            .await;

        assert!(matches!(result, Err(FetchError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_with_retry_fails_fast_on_permanent() {
        let limiter = limiter_with(10, 60_000);
        let calls = AtomicU32::new(0);

        let result: Result<u32> = limiter
            .execute_with_retry(Platform::Polymarket, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FetchError::api(400, "bad request")) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
