//! Row types mapping database records to and from the domain model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use truthbounty_core::{MarketStatus, Platform, TraderStats, UnifiedMarket};

/// Lowercase status column value.
pub(crate) fn status_to_str(status: MarketStatus) -> &'static str {
    match status {
        MarketStatus::Open => "open",
        MarketStatus::Closed => "closed",
        MarketStatus::Resolved => "resolved",
        MarketStatus::Cancelled => "cancelled",
    }
}

pub(crate) fn status_from_str(s: &str) -> Option<MarketStatus> {
    match s {
        "open" => Some(MarketStatus::Open),
        "closed" => Some(MarketStatus::Closed),
        "resolved" => Some(MarketStatus::Resolved),
        "cancelled" => Some(MarketStatus::Cancelled),
        _ => None,
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct MarketRow {
    pub id: String,
    pub platform: String,
    pub external_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub outcomes: serde_json::Value,
    pub yes_price: Option<Decimal>,
    pub no_price: Option<Decimal>,
    pub volume: Option<Decimal>,
    pub volume_24h: Option<Decimal>,
    pub liquidity: Option<Decimal>,
    pub closes_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub winning_outcome: Option<String>,
    pub status: String,
    pub chain: Option<String>,
    pub currency: String,
    pub fetched_at: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

impl MarketRow {
    /// Rebuilds the domain market. Rows with an unknown platform or status
    /// slug (written by a newer version) are dropped rather than erroring.
    pub fn into_unified(self) -> Option<UnifiedMarket> {
        let platform = Platform::from_slug(&self.platform)?;
        let status = status_from_str(&self.status)?;
        let outcomes = serde_json::from_value(self.outcomes).unwrap_or_default();
        Some(UnifiedMarket {
            id: self.id,
            platform,
            external_id: self.external_id,
            title: self.title,
            description: self.description,
            category: self.category,
            outcomes,
            yes_price: self.yes_price,
            no_price: self.no_price,
            volume: self.volume,
            volume_24h: self.volume_24h,
            liquidity: self.liquidity,
            closes_at: self.closes_at,
            expires_at: self.expires_at,
            resolved_at: self.resolved_at,
            winning_outcome: self.winning_outcome,
            status,
            chain: self.chain,
            currency: self.currency,
            fetched_at: self.fetched_at,
            metadata: self.metadata,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TraderStatsRow {
    pub address: String,
    pub platform: String,
    pub total_bets: i64,
    pub wins: i64,
    pub losses: i64,
    pub volume: f64,
    pub pnl: f64,
    pub currency: String,
    pub estimated: bool,
}

impl TraderStatsRow {
    pub fn into_stats(self) -> Option<TraderStats> {
        let platform = Platform::from_slug(&self.platform)?;
        let mut stats = TraderStats::new(&self.address, platform);
        stats.total_bets = u64::try_from(self.total_bets).unwrap_or(0);
        stats.wins = u64::try_from(self.wins).unwrap_or(0);
        stats.losses = u64::try_from(self.losses).unwrap_or(0);
        stats.volume = self.volume;
        stats.pnl = self.pnl;
        stats.currency = self.currency;
        stats.estimated = self.estimated;
        Some(stats)
    }
}

/// Outcome of a simulated (paper) trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeOutcome {
    Pending,
    Win,
    Loss,
}

impl TradeOutcome {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            TradeOutcome::Pending => "pending",
            TradeOutcome::Win => "win",
            TradeOutcome::Loss => "loss",
        }
    }
}

/// A paper trade placed against a market, settled later by price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedTrade {
    pub address: String,
    pub asset: String,
    /// "up" or "down".
    pub direction: String,
    pub amount_usd: f64,
    pub strike_price: Option<f64>,
    pub maturity: Option<DateTime<Utc>>,
    pub outcome: TradeOutcome,
    pub pnl_usd: Option<f64>,
}

/// Aggregate over one wallet's simulated trades, usable as one more stats
/// source alongside the platform adapters.
#[derive(Debug, Clone, FromRow)]
pub struct SimulatedSummaryRow {
    pub address: String,
    pub total_trades: i64,
    pub wins: i64,
    pub losses: i64,
    pub volume_usd: f64,
    pub pnl_usd: f64,
}
