//! Request handlers.
//!
//! When a database is configured, reads are served from it; otherwise the
//! handlers go through the rate-limited fetch path and the in-process
//! cache. Either way the response shapes are identical.

use crate::context::AppContext;
use crate::error::ApiError;
use axum::extract::{Path, Query, State};
use axum::Json;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use truthbounty_core::{
    rank_leaderboard, AggregatedUserStats, LeaderboardEntry, MarketStatus, Platform,
    ScoringStrategy, TraderStats, UnifiedMarket,
};
use truthbounty_fetcher::FetchOptions;

const MAX_LIMIT: u32 = 500;
const DEFAULT_LIMIT: u32 = 50;
/// How many traders to pull per platform on the live (database-less) path.
const LIVE_STATS_LIMIT: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub platform: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Serialize)]
pub struct LeaderboardResponse {
    pub entries: Vec<LeaderboardEntry>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct MarketsQuery {
    pub platform: Option<String>,
    pub status: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Serialize)]
pub struct MarketsResponse {
    pub markets: Vec<UnifiedMarket>,
    pub count: usize,
}

#[derive(Serialize)]
pub struct SimulatedSummary {
    pub total_trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub volume_usd: f64,
    pub pnl_usd: f64,
}

#[derive(Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub aggregated: AggregatedUserStats,
    pub simulated: Option<SimulatedSummary>,
}

fn parse_platform(value: Option<&str>) -> Result<Option<Platform>, ApiError> {
    match value {
        None => Ok(None),
        Some(slug) => Platform::from_slug(slug)
            .map(Some)
            .ok_or_else(|| ApiError::bad_request(format!("unknown platform: {slug}"))),
    }
}

fn parse_status(value: Option<&str>) -> Result<Option<MarketStatus>, ApiError> {
    match value {
        None => Ok(None),
        Some("open") => Ok(Some(MarketStatus::Open)),
        Some("closed") => Ok(Some(MarketStatus::Closed)),
        Some("resolved") => Ok(Some(MarketStatus::Resolved)),
        Some("cancelled") => Ok(Some(MarketStatus::Cancelled)),
        Some(other) => Err(ApiError::bad_request(format!("unknown status: {other}"))),
    }
}

fn clamp_limit(limit: Option<u32>) -> Result<u32, ApiError> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    if limit == 0 {
        return Err(ApiError::bad_request("limit must be positive"));
    }
    Ok(limit.min(MAX_LIMIT))
}

/// Trader stats for the requested platforms, from the database when one is
/// configured and live otherwise. Returns 503 only when every queried
/// platform failed; partial failure degrades silently.
async fn gather_trader_stats(
    ctx: &AppContext,
    platform: Option<Platform>,
) -> Result<Vec<TraderStats>, ApiError> {
    if let Some(db) = &ctx.db {
        return db
            .query_trader_stats(platform, i64::from(MAX_LIMIT) * 10)
            .await
            .map_err(ApiError::from);
    }

    let registry = ctx.orchestrator.registry();
    let platforms = match platform {
        Some(p) => vec![p],
        None => registry.platforms(),
    };
    let fetchers: Vec<_> = platforms
        .iter()
        .filter_map(|p| registry.get(*p))
        .filter(|f| f.supports_trader_stats())
        .collect();
    if fetchers.is_empty() {
        return Ok(Vec::new());
    }

    let limiter = ctx.orchestrator.limiter();
    let tasks = fetchers.iter().map(|fetcher| {
        let fetcher = Arc::clone(fetcher);
        async move {
            let platform = fetcher.platform();
            let result = limiter
                .execute_with_retry(platform, || fetcher.fetch_trader_stats(LIVE_STATS_LIMIT))
                .await;
            (platform, result)
        }
    });

    let mut stats = Vec::new();
    let mut failures = 0usize;
    let results = join_all(tasks).await;
    let attempted = results.len();
    for (platform, result) in results {
        match result {
            Ok(chunk) => stats.extend(chunk),
            Err(e) => {
                tracing::warn!(platform = %platform, error = %e, "trader stats fetch failed");
                failures += 1;
            }
        }
    }
    if failures == attempted {
        return Err(ApiError::unavailable("all platforms failed"));
    }
    Ok(stats)
}

fn aggregate(stats: &[TraderStats], strategy: ScoringStrategy) -> Vec<AggregatedUserStats> {
    let mut seen = HashSet::new();
    let mut addresses = Vec::new();
    for s in stats {
        if seen.insert(s.address.clone()) {
            addresses.push(s.address.clone());
        }
    }
    addresses
        .iter()
        .map(|addr| AggregatedUserStats::from_platform_stats(addr, stats, strategy))
        .collect()
}

/// GET /api/leaderboard?platform=&limit=
pub async fn leaderboard(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>, ApiError> {
    let platform = parse_platform(query.platform.as_deref())?;
    let limit = clamp_limit(query.limit)?;

    let stats = gather_trader_stats(&ctx, platform).await?;
    let mut entries = rank_leaderboard(aggregate(&stats, ScoringStrategy::OddsBased));
    entries.truncate(limit as usize);

    let count = entries.len();
    Ok(Json(LeaderboardResponse { entries, count }))
}

/// GET /api/profile/:address
pub async fn profile(
    State(ctx): State<Arc<AppContext>>,
    Path(address): Path<String>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let address = address.trim().to_lowercase();
    if address.is_empty() {
        return Err(ApiError::bad_request("address must not be empty"));
    }

    let (stats, simulated) = if let Some(db) = &ctx.db {
        let stats = db.query_profile_stats(&address).await?;
        let simulated = db.query_simulated_summary(&address).await?.map(|row| {
            SimulatedSummary {
                total_trades: u64::try_from(row.total_trades).unwrap_or(0),
                wins: u64::try_from(row.wins).unwrap_or(0),
                losses: u64::try_from(row.losses).unwrap_or(0),
                volume_usd: row.volume_usd,
                pnl_usd: row.pnl_usd,
            }
        });
        (stats, simulated)
    } else {
        let registry = ctx.orchestrator.registry();
        let limiter = ctx.orchestrator.limiter();
        let fetchers: Vec<_> = registry
            .platforms()
            .iter()
            .filter_map(|p| registry.get(*p))
            .filter(|f| f.supports_trader_stats())
            .collect();

        let tasks = fetchers.iter().map(|fetcher| {
            let fetcher = Arc::clone(fetcher);
            let address = address.clone();
            async move {
                limiter
                    .execute_with_retry(fetcher.platform(), || fetcher.fetch_trader_detail(&address))
                    .await
            }
        });
        let stats = join_all(tasks)
            .await
            .into_iter()
            .filter_map(|result| match result {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!(error = %e, "trader detail fetch failed");
                    None
                }
            })
            .collect();
        (stats, None)
    };

    if stats.is_empty() && simulated.is_none() {
        return Err(ApiError::not_found(format!("no stats for {address}")));
    }

    let aggregated =
        AggregatedUserStats::from_platform_stats(&address, &stats, ScoringStrategy::OddsBased);
    Ok(Json(ProfileResponse {
        aggregated,
        simulated,
    }))
}

/// GET /api/markets?platform=&status=&limit=
pub async fn markets(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<MarketsQuery>,
) -> Result<Json<MarketsResponse>, ApiError> {
    let platform = parse_platform(query.platform.as_deref())?;
    let status = parse_status(query.status.as_deref())?;
    let limit = clamp_limit(query.limit)?;

    let mut markets: Vec<UnifiedMarket> = if let Some(db) = &ctx.db {
        let status_str = status.map(|s| match s {
            MarketStatus::Open => "open",
            MarketStatus::Closed => "closed",
            MarketStatus::Resolved => "resolved",
            MarketStatus::Cancelled => "cancelled",
        });
        db.query_markets(platform, status_str, i64::from(limit)).await?
    } else {
        let platforms = match platform {
            Some(p) => vec![p],
            None => ctx.orchestrator.registry().platforms(),
        };
        let results = ctx
            .orchestrator
            .fetch_all_platform_markets(&platforms, &FetchOptions::default())
            .await;
        if !results.is_empty() && results.iter().all(|r| r.error.is_some()) {
            return Err(ApiError::unavailable("all platforms failed"));
        }
        results.into_iter().flat_map(|r| r.markets).collect()
    };

    if let Some(status) = status {
        markets.retain(|m| m.status == status);
    }
    markets.truncate(limit as usize);

    let count = markets.len();
    Ok(Json(MarketsResponse { markets, count }))
}

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
