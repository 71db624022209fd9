//! Persistence seam for fetched data.
//!
//! Persistence is fire-and-forget relative to the read path: the fetch
//! driver spawns the write and a sink failure is logged, never propagated.

use async_trait::async_trait;
use parking_lot::Mutex;
use truthbounty_core::{TraderStats, UnifiedMarket};

/// Durable storage for normalized records. Upserts must be idempotent,
/// keyed by `id` for markets and `(address, platform)` for stats.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn store_markets(&self, markets: &[UnifiedMarket]) -> anyhow::Result<()>;
    async fn store_trader_stats(&self, stats: &[TraderStats]) -> anyhow::Result<()>;
}

/// Sink that discards everything. Used when no database is configured.
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl PersistenceSink for NullSink {
    async fn store_markets(&self, _markets: &[UnifiedMarket]) -> anyhow::Result<()> {
        Ok(())
    }

    async fn store_trader_stats(&self, _stats: &[TraderStats]) -> anyhow::Result<()> {
        Ok(())
    }
}

/// In-memory sink for tests and the dry-run indexer.
#[derive(Default)]
pub struct MemorySink {
    markets: Mutex<Vec<UnifiedMarket>>,
    stats: Mutex<Vec<TraderStats>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn markets(&self) -> Vec<UnifiedMarket> {
        self.markets.lock().clone()
    }

    pub fn stats(&self) -> Vec<TraderStats> {
        self.stats.lock().clone()
    }
}

#[async_trait]
impl PersistenceSink for MemorySink {
    async fn store_markets(&self, markets: &[UnifiedMarket]) -> anyhow::Result<()> {
        self.markets.lock().extend_from_slice(markets);
        Ok(())
    }

    async fn store_trader_stats(&self, stats: &[TraderStats]) -> anyhow::Result<()> {
        self.stats.lock().extend_from_slice(stats);
        Ok(())
    }
}
