pub mod config;
pub mod config_loader;
pub mod market;
pub mod score;
pub mod stats;

pub use config::{AppConfig, DatabaseConfig, FetchConfig, PlatformLimitConfig, ServerConfig};
pub use config_loader::ConfigLoader;
pub use market::{MarketOutcome, MarketStatus, Platform, UnifiedMarket};
pub use score::{
    calculate_indexer_score, calculate_odds_score, estimate_win_rate_from_rank,
    wilson_lower_bound, ScoreBreakdown, ScoringStrategy, WinRateEstimate, MAX_INDEXER_SCORE,
    MAX_ODDS_SCORE, MIN_BETS_FOR_FULL_SCORE, MIN_BETS_FOR_LEADERBOARD,
};
pub use stats::{
    is_usd_par, rank_leaderboard, AggregatedUserStats, LeaderboardEntry, PlatformBreakdown,
    TraderStats, USD_PAR_CURRENCIES,
};
