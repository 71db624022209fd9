//! Per-trader statistics and leaderboard aggregation.
//!
//! [`TraderStats`] is the per-wallet, per-platform aggregate produced by the
//! platform adapters. [`AggregatedUserStats`] rolls one wallet up across
//! platforms; volume is only ever summed within a currency bucket.

use crate::market::Platform;
use crate::score::ScoringStrategy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Currency codes counted 1:1 as USD when scoring.
pub const USD_PAR_CURRENCIES: [&str; 3] = ["USD", "USDC", "USDT"];

/// True for currencies treated at par with USD.
///
/// Dollar stablecoins count toward USD volume without a price lookup;
/// everything else needs an explicit conversion before it can score.
#[must_use]
pub fn is_usd_par(currency: &str) -> bool {
    USD_PAR_CURRENCIES.contains(&currency)
}

/// Aggregate trading statistics for one wallet on one platform.
///
/// Invariant: `wins + losses <= total_bets`. Pending or voided trades are
/// counted in `total_bets` but excluded from wins/losses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraderStats {
    /// Wallet address, lower-cased for equality.
    pub address: String,
    /// Source platform.
    pub platform: Platform,
    /// Total bets placed, including unsettled.
    pub total_bets: u64,
    /// Settled winning bets.
    pub wins: u64,
    /// Settled losing bets.
    pub losses: u64,
    /// Traded volume in `currency` units.
    pub volume: f64,
    /// Signed profit and loss in `currency` units.
    pub pnl: f64,
    /// Currency unit for `volume` and `pnl`.
    pub currency: String,
    /// True when wins/losses are derived from the rank heuristic rather
    /// than real settlement data.
    pub estimated: bool,
}

impl TraderStats {
    /// Creates stats with a normalized (lower-cased) address.
    #[must_use]
    pub fn new(address: &str, platform: Platform) -> Self {
        Self {
            address: address.to_lowercase(),
            platform,
            total_bets: 0,
            wins: 0,
            losses: 0,
            volume: 0.0,
            pnl: 0.0,
            currency: "USD".to_string(),
            estimated: false,
        }
    }

    /// Win rate as a percentage (0–100); 0 when nothing has settled.
    #[must_use]
    pub fn win_rate(&self) -> f64 {
        let settled = self.wins + self.losses;
        if settled == 0 {
            0.0
        } else {
            self.wins as f64 / settled as f64 * 100.0
        }
    }
}

/// One platform's contribution to an aggregated profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformBreakdown {
    pub platform: Platform,
    pub total_bets: u64,
    pub wins: u64,
    pub losses: u64,
    pub volume: f64,
    pub pnl: f64,
    pub currency: String,
    pub win_rate: f64,
    pub estimated: bool,
}

impl From<&TraderStats> for PlatformBreakdown {
    fn from(stats: &TraderStats) -> Self {
        Self {
            platform: stats.platform,
            total_bets: stats.total_bets,
            wins: stats.wins,
            losses: stats.losses,
            volume: stats.volume,
            pnl: stats.pnl,
            currency: stats.currency.clone(),
            win_rate: stats.win_rate(),
            estimated: stats.estimated,
        }
    }
}

/// Cross-platform rollup for one wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedUserStats {
    /// Wallet address, lower-cased.
    pub address: String,
    /// Platforms this wallet has traded on.
    pub platforms: Vec<Platform>,
    /// Total bets across all platforms.
    pub total_bets: u64,
    /// Settled wins across all platforms.
    pub wins: u64,
    /// Settled losses across all platforms.
    pub losses: u64,
    /// Volume per currency bucket. Never summed across currencies.
    pub volume_by_currency: BTreeMap<String, f64>,
    /// PnL per currency bucket.
    pub pnl_by_currency: BTreeMap<String, f64>,
    /// Per-platform breakdown.
    pub breakdown: Vec<PlatformBreakdown>,
    /// True if any contributing platform's stats were estimated.
    pub any_estimated: bool,
    /// TruthScore for this wallet.
    pub truth_score: u32,
}

impl AggregatedUserStats {
    /// Rolls up one wallet's per-platform stats and scores the result.
    ///
    /// Scoring sums the dollar-par buckets (see [`is_usd_par`]); other
    /// currencies are reported in the breakdown but never silently
    /// converted.
    #[must_use]
    pub fn from_platform_stats(address: &str, stats: &[TraderStats], strategy: ScoringStrategy) -> Self {
        let address = address.to_lowercase();
        let mut platforms = Vec::new();
        let mut total_bets = 0u64;
        let mut wins = 0u64;
        let mut losses = 0u64;
        let mut volume_by_currency: BTreeMap<String, f64> = BTreeMap::new();
        let mut pnl_by_currency: BTreeMap<String, f64> = BTreeMap::new();
        let mut breakdown = Vec::new();
        let mut any_estimated = false;

        for s in stats.iter().filter(|s| s.address == address) {
            if !platforms.contains(&s.platform) {
                platforms.push(s.platform);
            }
            total_bets += s.total_bets;
            wins += s.wins;
            losses += s.losses;
            *volume_by_currency.entry(s.currency.clone()).or_default() += s.volume;
            *pnl_by_currency.entry(s.currency.clone()).or_default() += s.pnl;
            any_estimated |= s.estimated;
            breakdown.push(PlatformBreakdown::from(s));
        }

        let usd_volume: f64 = volume_by_currency
            .iter()
            .filter(|(currency, _)| is_usd_par(currency))
            .map(|(_, volume)| volume)
            .sum();
        let usd_pnl: f64 = pnl_by_currency
            .iter()
            .filter(|(currency, _)| is_usd_par(currency))
            .map(|(_, pnl)| pnl)
            .sum();
        let truth_score = strategy.score(total_bets, wins, losses, usd_volume, usd_pnl, platforms.len());

        Self {
            address,
            platforms,
            total_bets,
            wins,
            losses,
            volume_by_currency,
            pnl_by_currency,
            breakdown,
            any_estimated,
            truth_score,
        }
    }

    /// Overall win rate as a percentage.
    #[must_use]
    pub fn win_rate(&self) -> f64 {
        let settled = self.wins + self.losses;
        if settled == 0 {
            0.0
        } else {
            self.wins as f64 / settled as f64 * 100.0
        }
    }
}

/// A ranked, presentation-ready leaderboard row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// 1-based dense rank by descending TruthScore.
    pub rank: u32,
    #[serde(flatten)]
    pub stats: AggregatedUserStats,
}

/// Ranks aggregated stats into leaderboard entries.
///
/// Sorting is stable: ties keep the original iteration order.
#[must_use]
pub fn rank_leaderboard(mut entries: Vec<AggregatedUserStats>) -> Vec<LeaderboardEntry> {
    entries.sort_by(|a, b| b.truth_score.cmp(&a.truth_score));
    entries
        .into_iter()
        .enumerate()
        .map(|(i, stats)| LeaderboardEntry {
            rank: i as u32 + 1,
            stats,
        })
        .collect()
}
