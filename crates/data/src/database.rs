//! Postgres persistence for markets, trader stats and simulated trades.

use crate::models::{
    status_to_str, MarketRow, SimulatedSummaryRow, SimulatedTrade, TraderStatsRow,
};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use truthbounty_core::{Platform, TraderStats, UnifiedMarket};
use truthbounty_fetcher::PersistenceSink;

/// Markets are upserted in chunks so one bad batch does not hold a long
/// transaction over the whole fetch result.
const UPSERT_CHUNK: usize = 100;

pub struct DatabaseClient {
    pool: PgPool,
}

impl DatabaseClient {
    /// Connects to Postgres and runs pending migrations.
    ///
    /// # Errors
    /// Returns an error if the connection or a migration fails.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upserts a batch of markets keyed by the stable platform-qualified id,
    /// so refetches replace rather than duplicate.
    ///
    /// # Errors
    /// Returns an error if any chunk's transaction fails.
    pub async fn upsert_markets(&self, markets: &[UnifiedMarket]) -> Result<()> {
        for chunk in markets.chunks(UPSERT_CHUNK) {
            let mut tx = self.pool.begin().await?;
            for market in chunk {
                sqlx::query(
                    r"
                    INSERT INTO markets
                    (id, platform, external_id, title, description, category, outcomes,
                     yes_price, no_price, volume, volume_24h, liquidity,
                     closes_at, expires_at, resolved_at, winning_outcome, status,
                     chain, currency, fetched_at, metadata)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                            $13, $14, $15, $16, $17, $18, $19, $20, $21)
                    ON CONFLICT (id) DO UPDATE
                    SET title = EXCLUDED.title,
                        description = EXCLUDED.description,
                        category = EXCLUDED.category,
                        outcomes = EXCLUDED.outcomes,
                        yes_price = EXCLUDED.yes_price,
                        no_price = EXCLUDED.no_price,
                        volume = EXCLUDED.volume,
                        volume_24h = EXCLUDED.volume_24h,
                        liquidity = EXCLUDED.liquidity,
                        closes_at = EXCLUDED.closes_at,
                        expires_at = EXCLUDED.expires_at,
                        resolved_at = EXCLUDED.resolved_at,
                        winning_outcome = EXCLUDED.winning_outcome,
                        status = EXCLUDED.status,
                        fetched_at = EXCLUDED.fetched_at,
                        metadata = EXCLUDED.metadata
                    ",
                )
                .bind(&market.id)
                .bind(market.platform.slug())
                .bind(&market.external_id)
                .bind(&market.title)
                .bind(&market.description)
                .bind(&market.category)
                .bind(serde_json::to_value(&market.outcomes)?)
                .bind(market.yes_price)
                .bind(market.no_price)
                .bind(market.volume)
                .bind(market.volume_24h)
                .bind(market.liquidity)
                .bind(market.closes_at)
                .bind(market.expires_at)
                .bind(market.resolved_at)
                .bind(&market.winning_outcome)
                .bind(status_to_str(market.status))
                .bind(&market.chain)
                .bind(&market.currency)
                .bind(market.fetched_at)
                .bind(&market.metadata)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
        }
        Ok(())
    }

    /// Upserts trader stats keyed `(address, platform)`.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn upsert_trader_stats(&self, stats: &[TraderStats]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for s in stats {
            sqlx::query(
                r"
                INSERT INTO trader_stats
                (address, platform, total_bets, wins, losses, volume, pnl, currency, estimated, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())
                ON CONFLICT (address, platform) DO UPDATE
                SET total_bets = EXCLUDED.total_bets,
                    wins = EXCLUDED.wins,
                    losses = EXCLUDED.losses,
                    volume = EXCLUDED.volume,
                    pnl = EXCLUDED.pnl,
                    currency = EXCLUDED.currency,
                    estimated = EXCLUDED.estimated,
                    updated_at = now()
                ",
            )
            .bind(&s.address)
            .bind(s.platform.slug())
            .bind(i64::try_from(s.total_bets).unwrap_or(i64::MAX))
            .bind(i64::try_from(s.wins).unwrap_or(i64::MAX))
            .bind(i64::try_from(s.losses).unwrap_or(i64::MAX))
            .bind(s.volume)
            .bind(s.pnl)
            .bind(&s.currency)
            .bind(s.estimated)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Markets, optionally filtered by platform and status. Rows written by
    /// an incompatible schema version are skipped.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query_markets(
        &self,
        platform: Option<Platform>,
        status: Option<&str>,
        limit: i64,
    ) -> Result<Vec<UnifiedMarket>> {
        let rows = sqlx::query_as::<_, MarketRow>(
            r"
            SELECT id, platform, external_id, title, description, category, outcomes,
                   yes_price, no_price, volume, volume_24h, liquidity,
                   closes_at, expires_at, resolved_at, winning_outcome, status,
                   chain, currency, fetched_at, metadata
            FROM markets
            WHERE ($1::TEXT IS NULL OR platform = $1)
              AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY volume DESC NULLS LAST
            LIMIT $3
            ",
        )
        .bind(platform.map(|p| p.slug()))
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(MarketRow::into_unified).collect())
    }

    /// Stored stats for every trader, optionally one platform only.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query_trader_stats(
        &self,
        platform: Option<Platform>,
        limit: i64,
    ) -> Result<Vec<TraderStats>> {
        let rows = sqlx::query_as::<_, TraderStatsRow>(
            r"
            SELECT address, platform, total_bets, wins, losses, volume, pnl, currency, estimated
            FROM trader_stats
            WHERE ($1::TEXT IS NULL OR platform = $1)
            ORDER BY wins DESC
            LIMIT $2
            ",
        )
        .bind(platform.map(|p| p.slug()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(TraderStatsRow::into_stats).collect())
    }

    /// All stored per-platform stats for one wallet.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query_profile_stats(&self, address: &str) -> Result<Vec<TraderStats>> {
        let rows = sqlx::query_as::<_, TraderStatsRow>(
            r"
            SELECT address, platform, total_bets, wins, losses, volume, pnl, currency, estimated
            FROM trader_stats
            WHERE address = $1
            ",
        )
        .bind(address.to_lowercase())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(TraderStatsRow::into_stats).collect())
    }

    /// Records one simulated trade.
    ///
    /// # Errors
    /// Returns an error if the insertion fails.
    pub async fn insert_simulated_trade(&self, trade: &SimulatedTrade) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO simulated_trades
            (address, asset, direction, amount_usd, strike_price, maturity, outcome, pnl_usd)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(trade.address.to_lowercase())
        .bind(&trade.asset)
        .bind(&trade.direction)
        .bind(trade.amount_usd)
        .bind(trade.strike_price)
        .bind(trade.maturity)
        .bind(trade.outcome.as_str())
        .bind(trade.pnl_usd)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Rollup of one wallet's simulated trades. Pending trades count toward
    /// the total but not wins/losses.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query_simulated_summary(
        &self,
        address: &str,
    ) -> Result<Option<SimulatedSummaryRow>> {
        let row = sqlx::query_as::<_, SimulatedSummaryRow>(
            r"
            SELECT address,
                   COUNT(*) AS total_trades,
                   COUNT(*) FILTER (WHERE outcome = 'win') AS wins,
                   COUNT(*) FILTER (WHERE outcome = 'loss') AS losses,
                   COALESCE(SUM(amount_usd), 0) AS volume_usd,
                   COALESCE(SUM(pnl_usd), 0) AS pnl_usd
            FROM simulated_trades
            WHERE address = $1
            GROUP BY address
            ",
        )
        .bind(address.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[async_trait]
impl PersistenceSink for DatabaseClient {
    async fn store_markets(&self, markets: &[UnifiedMarket]) -> Result<()> {
        tracing::debug!(count = markets.len(), "persisting markets");
        self.upsert_markets(markets).await
    }

    async fn store_trader_stats(&self, stats: &[TraderStats]) -> Result<()> {
        tracing::debug!(count = stats.len(), "persisting trader stats");
        self.upsert_trader_stats(stats).await
    }
}
