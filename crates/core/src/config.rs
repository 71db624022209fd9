//! Application configuration.

use crate::market::Platform;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub fetch: FetchConfig,
    /// Per-platform rate-limit overrides, keyed by platform slug.
    #[serde(default)]
    pub limits: BTreeMap<String, PlatformLimitConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres connection URL. Empty disables persistence.
    pub url: String,
    pub max_connections: u32,
}

/// Tuning for the fetch framework.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// TTL for generic cache entries, seconds.
    pub cache_ttl_secs: u64,
    /// TTL for full multi-page fetch results, seconds.
    pub full_fetch_ttl_secs: u64,
    /// Safety ceiling on pages fetched per platform per cycle.
    pub max_pages: u32,
    /// Delay between page fetches, milliseconds.
    pub page_delay_ms: u64,
    /// Background sync interval, seconds.
    pub sync_interval_secs: u64,
    /// Wall-clock budget for trader enrichment, milliseconds.
    pub enrich_budget_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 60,
            full_fetch_ttl_secs: 300,
            max_pages: 50,
            page_delay_ms: 200,
            sync_interval_secs: 300,
            enrich_budget_ms: 8_000,
        }
    }
}

/// Rate-limit budget for one platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlatformLimitConfig {
    /// Requests allowed per window.
    pub max_requests: u32,
    /// Sliding window length, milliseconds.
    pub window_ms: u64,
    /// Retry attempts before a call is surfaced as failed.
    pub retry_attempts: u32,
    /// Exponential backoff base; delay is `backoff_multiplier^attempt` seconds.
    pub backoff_multiplier: f64,
}

impl Default for PlatformLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window_ms: 60_000,
            retry_attempts: 3,
            backoff_multiplier: 2.0,
        }
    }
}

impl PlatformLimitConfig {
    /// Default budget for a platform, reflecting observed upstream
    /// generosity (5/min for The Odds API behind Overtime, up to 100/min
    /// for permissive REST APIs).
    #[must_use]
    pub fn default_for(platform: Platform) -> Self {
        let max_requests = match platform {
            Platform::Overtime => 5,
            Platform::PancakeSwap | Platform::Azuro => 30,
            Platform::Kalshi | Platform::Metaculus | Platform::Drift | Platform::Seer => 60,
            Platform::Polymarket | Platform::Limitless | Platform::Manifold | Platform::SxBet => {
                100
            }
        };
        Self {
            max_requests,
            ..Self::default()
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: String::new(),
                max_connections: 10,
            },
            fetch: FetchConfig::default(),
            limits: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// Effective rate-limit config for a platform: explicit override if
    /// present, otherwise the per-platform default.
    #[must_use]
    pub fn limit_for(&self, platform: Platform) -> PlatformLimitConfig {
        self.limits
            .get(platform.slug())
            .copied()
            .unwrap_or_else(|| PlatformLimitConfig::default_for(platform))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overtime_has_lowest_budget() {
        let overtime = PlatformLimitConfig::default_for(Platform::Overtime);
        for platform in Platform::all() {
            assert!(PlatformLimitConfig::default_for(*platform).max_requests >= overtime.max_requests);
        }
        assert_eq!(overtime.max_requests, 5);
    }

    #[test]
    fn test_limit_override_wins() {
        let mut config = AppConfig::default();
        config.limits.insert(
            "polymarket".to_string(),
            PlatformLimitConfig {
                max_requests: 7,
                ..PlatformLimitConfig::default()
            },
        );
        assert_eq!(config.limit_for(Platform::Polymarket).max_requests, 7);
        assert_eq!(config.limit_for(Platform::Kalshi).max_requests, 60);
    }
}
