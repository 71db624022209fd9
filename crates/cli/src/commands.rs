//! Subcommand implementations.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use truthbounty_core::{calculate_indexer_score, is_usd_par, AppConfig, ConfigLoader, TraderStats};
use truthbounty_data::DatabaseClient;
use truthbounty_fetcher::{
    FetchDriver, FetchOptions, FetcherRegistry, MemoryCache, NullSink, Orchestrator,
    PersistenceSink, RateLimiter,
};
use truthbounty_platforms::oracle::PriceOracle;
use truthbounty_platforms::register_default_fetchers;
use truthbounty_web_api::{ApiServer, AppContext};

/// Fixed indexer defaults. The snapshot job is not interactive.
const INDEX_TOP_N: usize = 500;
const INDEX_MIN_BETS: u64 = 5;
const INDEX_MIN_PLATFORMS: usize = 1;
const INDEX_STATS_PER_PLATFORM: u32 = 500;

struct Stack {
    config: AppConfig,
    registry: Arc<FetcherRegistry>,
    orchestrator: Arc<Orchestrator>,
    db: Option<Arc<DatabaseClient>>,
}

async fn build_stack(config_path: &str) -> Result<Stack> {
    let config = ConfigLoader::load_from(config_path)?;

    let registry = Arc::new(FetcherRegistry::new());
    register_default_fetchers(&registry);

    let db = if config.database.url.is_empty() {
        None
    } else {
        let client = DatabaseClient::new(&config.database.url)
            .await
            .context("connecting to database")?;
        Some(Arc::new(client))
    };

    let sink: Arc<dyn PersistenceSink> = match &db {
        Some(client) => Arc::clone(client) as Arc<dyn PersistenceSink>,
        None => Arc::new(NullSink),
    };
    let driver = Arc::new(FetchDriver::new(
        Arc::new(RateLimiter::new(&config)),
        Arc::new(MemoryCache::new()),
        sink,
        config.fetch.clone(),
    ));
    let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&registry), driver));

    Ok(Stack {
        config,
        registry,
        orchestrator,
        db,
    })
}

pub async fn run_serve(addr: Option<&str>, config_path: &str) -> Result<()> {
    let stack = build_stack(config_path).await?;
    let addr = addr.map_or_else(
        || format!("{}:{}", stack.config.server.host, stack.config.server.port),
        str::to_string,
    );

    stack.orchestrator.start_background_sync(std::time::Duration::from_secs(
        stack.config.fetch.sync_interval_secs,
    ));

    let context = Arc::new(AppContext::new(
        Arc::clone(&stack.orchestrator),
        stack.db.clone(),
        stack.config.clone(),
    ));
    ApiServer::new(context).serve(&addr).await
}

pub async fn run_sync(config_path: &str, force: bool) -> Result<()> {
    let stack = build_stack(config_path).await?;
    let options = FetchOptions {
        force_refresh: force,
        ..FetchOptions::default()
    };

    let results = stack.orchestrator.fetch_all_registered(&options).await;
    let mut total = 0usize;
    for result in &results {
        match &result.error {
            Some(error) => {
                tracing::warn!(platform = %result.platform, error, "platform sync failed");
            }
            None => {
                tracing::info!(
                    platform = %result.platform,
                    markets = result.markets.len(),
                    "platform synced"
                );
                total += result.markets.len();
            }
        }
    }
    tracing::info!(platforms = results.len(), markets = total, "sync complete");
    Ok(())
}

#[derive(Serialize)]
struct SnapshotEntry {
    rank: u32,
    address: String,
    score: u32,
    total_bets: u64,
    wins: u64,
    losses: u64,
    win_rate: f64,
    volume_usd: f64,
    platforms: Vec<String>,
    estimated: bool,
}

#[derive(Serialize)]
struct Snapshot {
    generated_at: chrono::DateTime<Utc>,
    strategy: &'static str,
    min_bets: u64,
    min_platforms: usize,
    entries: Vec<SnapshotEntry>,
}

/// Converts each wallet's non-USD volume buckets into USD using spot
/// prices. Unpriceable currencies are left out of the USD total rather
/// than guessed at.
fn usd_volume(buckets: &HashMap<String, f64>, prices: &HashMap<String, f64>) -> f64 {
    buckets
        .iter()
        .map(|(currency, volume)| {
            if is_usd_par(currency) {
                *volume
            } else {
                prices.get(currency).map_or(0.0, |price| volume * price)
            }
        })
        .sum()
}

pub async fn run_index(config_path: &str, output: &str) -> Result<()> {
    let stack = build_stack(config_path).await?;
    if stack.registry.is_empty() {
        bail!("no platform adapters registered");
    }

    // Pull stats from every platform that has them; a failing platform is
    // logged and skipped, it never kills the snapshot.
    let limiter = stack.orchestrator.limiter();
    let mut all_stats: Vec<TraderStats> = Vec::new();
    for platform in stack.registry.platforms() {
        let Some(fetcher) = stack.registry.get(platform) else {
            continue;
        };
        if !fetcher.supports_trader_stats() {
            continue;
        }
        match limiter
            .execute_with_retry(platform, || {
                fetcher.fetch_trader_stats(INDEX_STATS_PER_PLATFORM)
            })
            .await
        {
            Ok(stats) => {
                tracing::info!(platform = %platform, traders = stats.len(), "stats fetched");
                all_stats.extend(stats);
            }
            Err(e) => {
                tracing::warn!(platform = %platform, error = %e, "stats fetch failed");
            }
        }
    }

    // Group per wallet.
    let mut by_address: HashMap<String, Vec<TraderStats>> = HashMap::new();
    for stats in all_stats {
        by_address.entry(stats.address.clone()).or_default().push(stats);
    }

    // One spot-price lookup per non-USD currency, shared by all wallets.
    let currencies: Vec<String> = by_address
        .values()
        .flatten()
        .map(|s| s.currency.clone())
        .filter(|c| !is_usd_par(c))
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    let oracle = PriceOracle::new();
    let mut prices: HashMap<String, f64> = HashMap::new();
    for currency in currencies {
        match oracle.spot_price_usd(&currency).await {
            Ok(price) => {
                if let Some(price) = price.to_f64() {
                    prices.insert(currency, price);
                }
            }
            Err(e) => {
                tracing::warn!(currency = %currency, error = %e, "no spot price, bucket stays unconverted");
            }
        }
    }

    let mut entries = Vec::new();
    for (address, stats) in &by_address {
        let total_bets: u64 = stats.iter().map(|s| s.total_bets).sum();
        if total_bets < INDEX_MIN_BETS {
            continue;
        }
        let mut platforms: Vec<String> =
            stats.iter().map(|s| s.platform.slug().to_string()).collect();
        platforms.sort_unstable();
        platforms.dedup();
        if platforms.len() < INDEX_MIN_PLATFORMS {
            continue;
        }

        let wins: u64 = stats.iter().map(|s| s.wins).sum();
        let losses: u64 = stats.iter().map(|s| s.losses).sum();
        let mut buckets: HashMap<String, f64> = HashMap::new();
        for s in stats {
            *buckets.entry(s.currency.clone()).or_default() += s.volume;
        }
        let volume_usd = usd_volume(&buckets, &prices);

        let score = calculate_indexer_score(total_bets, wins, losses, volume_usd, platforms.len());
        let settled = wins + losses;
        let win_rate = if settled == 0 {
            0.0
        } else {
            wins as f64 / settled as f64 * 100.0
        };

        entries.push(SnapshotEntry {
            rank: 0,
            address: address.clone(),
            score,
            total_bets,
            wins,
            losses,
            win_rate,
            volume_usd,
            platforms,
            estimated: stats.iter().any(|s| s.estimated),
        });
    }

    entries.sort_by(|a, b| b.score.cmp(&a.score).then(a.address.cmp(&b.address)));
    entries.truncate(INDEX_TOP_N);
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.rank = i as u32 + 1;
    }

    let snapshot = Snapshot {
        generated_at: Utc::now(),
        strategy: "indexer",
        min_bets: INDEX_MIN_BETS,
        min_platforms: INDEX_MIN_PLATFORMS,
        entries,
    };

    let json = serde_json::to_string_pretty(&snapshot)?;
    std::fs::write(output, json).with_context(|| format!("writing snapshot to {output}"))?;
    tracing::info!(
        output,
        traders = snapshot.entries.len(),
        "snapshot written"
    );

    // Persist alongside the snapshot when a database is configured.
    if let Some(db) = &stack.db {
        let flattened: Vec<TraderStats> = by_address.into_values().flatten().collect();
        db.upsert_trader_stats(&flattened).await?;
    }

    Ok(())
}
