//! TruthScore engine.
//!
//! Turns aggregate trade statistics into a bounded reputation score. Two
//! formula families coexist and are deliberately kept distinct: the
//! odds-based variant (Wilson-score skill + log-scaled activity/profit,
//! capped at 1300) used by leaderboard surfaces, and the simplified indexer
//! variant (capped at 10000) used by the snapshot indexer. Callers must name
//! the strategy they use via [`ScoringStrategy`].

use serde::{Deserialize, Serialize};

/// Minimum settled bets before a wallet can rank at all.
pub const MIN_BETS_FOR_LEADERBOARD: u64 = 5;

/// Bets required before the sample-size multiplier reaches 1.0.
pub const MIN_BETS_FOR_FULL_SCORE: u64 = 50;

/// Cap for the odds-based formula.
pub const MAX_ODDS_SCORE: u32 = 1300;

/// Cap for the simplified indexer formula.
pub const MAX_INDEXER_SCORE: u32 = 10_000;

/// z for a 95% one-sided confidence bound.
const WILSON_Z: f64 = 1.96;

/// Computes the Wilson score lower bound of a win rate.
///
/// Given `p = wins/trials`:
/// ```text
/// center = p + z²/(2n)
/// spread = z * sqrt((p(1-p) + z²/(4n)) / n)
/// lower  = max(0, (center - spread) / (1 + z²/n))
/// ```
///
/// This systematically discounts small samples: 3/3 wins bounds near 0.44
/// while 650/1000 bounds near 0.62 despite the lower raw rate.
///
/// # Examples
/// ```
/// use truthbounty_core::score::wilson_lower_bound;
///
/// let small = wilson_lower_bound(3, 3, 1.96);
/// let large = wilson_lower_bound(650, 1000, 1.96);
/// assert!(small < large);
/// ```
#[must_use]
pub fn wilson_lower_bound(wins: u64, trials: u64, z: f64) -> f64 {
    if trials == 0 {
        return 0.0;
    }

    let n = trials as f64;
    let p = wins as f64 / n;
    let z_sq = z * z;

    let center = p + z_sq / (2.0 * n);
    let spread = z * ((p * (1.0 - p) + z_sq / (4.0 * n)) / n).sqrt();
    let denominator = 1.0 + z_sq / n;

    ((center - spread) / denominator).max(0.0)
}

/// Component breakdown of an odds-based score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Wilson skill component, 0–500 (fractional).
    pub skill: f64,
    /// Volume activity component, 0–500 (floored).
    pub activity: f64,
    /// Profit bonus component, 0–200 (floored).
    pub bonus: f64,
    /// Sample-size multiplier, 0–1.
    pub sample_multiplier: f64,
    /// Final capped score.
    pub score: u32,
}

impl ScoreBreakdown {
    const fn zero() -> Self {
        Self {
            skill: 0.0,
            activity: 0.0,
            bonus: 0.0,
            sample_multiplier: 0.0,
            score: 0,
        }
    }
}

/// Computes the odds-based TruthScore with component breakdown.
///
/// * Skill (0–500): Wilson lower bound of the win rate at z = 1.96, ×500.
/// * Activity (0–500): `floor(log10(volume) * 65)` when volume > 0.
/// * Bonus (0–200): `floor(log10(pnl) * 50)` when pnl > 0.
/// * Sample multiplier: `min(1, trades / 50)`.
/// * Final: `min(1300, floor((skill + activity + bonus) * multiplier))`.
///
/// Wallets with fewer than [`MIN_BETS_FOR_LEADERBOARD`] trades score 0.
#[must_use]
pub fn calculate_odds_score(trades: u64, wins: u64, volume: f64, pnl: f64) -> ScoreBreakdown {
    if trades < MIN_BETS_FOR_LEADERBOARD {
        return ScoreBreakdown::zero();
    }

    let skill = wilson_lower_bound(wins, trades, WILSON_Z) * 500.0;

    let activity = if volume > 0.0 {
        (volume.log10() * 65.0).floor().clamp(0.0, 500.0)
    } else {
        0.0
    };

    let bonus = if pnl > 0.0 {
        (pnl.log10() * 50.0).floor().clamp(0.0, 200.0)
    } else {
        0.0
    };

    let sample_multiplier = (trades as f64 / MIN_BETS_FOR_FULL_SCORE as f64).min(1.0);

    let raw = ((skill + activity + bonus) * sample_multiplier).floor();
    let score = (raw as u32).min(MAX_ODDS_SCORE);

    ScoreBreakdown {
        skill,
        activity,
        bonus,
        sample_multiplier,
        score,
    }
}

/// Computes the simplified indexer-variant score.
///
/// `floor(win_rate * 1000 + total_bets * 2 + volume_usd / 10 +
/// platform_count * 100)`, capped to `[0, 10000]`. `win_rate` is the settled
/// win fraction (0–1).
#[must_use]
pub fn calculate_indexer_score(
    total_bets: u64,
    wins: u64,
    losses: u64,
    volume_usd: f64,
    platform_count: usize,
) -> u32 {
    let settled = wins + losses;
    let win_rate = if settled == 0 {
        0.0
    } else {
        wins as f64 / settled as f64
    };

    let raw = win_rate * 1000.0
        + total_bets as f64 * 2.0
        + volume_usd.max(0.0) / 10.0
        + platform_count as f64 * 100.0;

    (raw.floor().max(0.0) as u32).min(MAX_INDEXER_SCORE)
}

/// Named scoring strategy. Every call site must pick one explicitly; the
/// two formulas are never merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringStrategy {
    /// Wilson-based formula used by leaderboard and profile surfaces.
    OddsBased,
    /// Simplified formula used by the snapshot indexer.
    Indexer,
}

impl ScoringStrategy {
    /// Scores one wallet's aggregate stats under this strategy.
    #[must_use]
    pub fn score(
        &self,
        total_bets: u64,
        wins: u64,
        losses: u64,
        volume_usd: f64,
        pnl_usd: f64,
        platform_count: usize,
    ) -> u32 {
        match self {
            Self::OddsBased => calculate_odds_score(total_bets, wins, volume_usd, pnl_usd).score,
            Self::Indexer => {
                calculate_indexer_score(total_bets, wins, losses, volume_usd, platform_count)
            }
        }
    }

    /// Maximum score this strategy can produce.
    #[must_use]
    pub const fn max_score(&self) -> u32 {
        match self {
            Self::OddsBased => MAX_ODDS_SCORE,
            Self::Indexer => MAX_INDEXER_SCORE,
        }
    }
}

/// A win rate derived from leaderboard position rather than settlement data.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WinRateEstimate {
    /// Estimated win rate as a percentage.
    pub win_rate: f64,
    /// Always true; distinguishes heuristic output from measured stats.
    pub estimated: bool,
}

/// Estimates a win rate from a 1-based leaderboard position.
///
/// Fallback heuristic for platforms that expose rankings but no bet-level
/// settlement data. The output is an estimate, not a measurement, and is
/// tagged as such.
#[must_use]
pub fn estimate_win_rate_from_rank(position: u64) -> WinRateEstimate {
    let position = position.max(1);
    let win_rate = if position <= 100 {
        75.0 + (100 - position) as f64 * 0.1
    } else if position <= 1000 {
        65.0 + (1000 - position) as f64 * 0.01
    } else if position <= 10_000 {
        55.0 + (10_000 - position) as f64 * 0.001
    } else {
        50.0 + (50_000.0 / position as f64).min(5.0)
    };

    WinRateEstimate {
        win_rate,
        estimated: true,
    }
}
