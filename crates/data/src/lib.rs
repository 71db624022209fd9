//! Durable storage for TruthBounty.
//!
//! [`DatabaseClient`] implements the fetcher's `PersistenceSink` over
//! Postgres; row types live in [`models`].

pub mod database;
pub mod models;

pub use database::DatabaseClient;
pub use models::{MarketRow, SimulatedSummaryRow, SimulatedTrade, TradeOutcome, TraderStatsRow};
