//! Shared request state.
//!
//! One explicit context object built at startup and handed to the router;
//! nothing in the API reaches for ambient globals.

use std::sync::Arc;
use truthbounty_core::AppConfig;
use truthbounty_data::DatabaseClient;
use truthbounty_fetcher::Orchestrator;

pub struct AppContext {
    pub orchestrator: Arc<Orchestrator>,
    /// Absent when running without a database; reads then go straight to
    /// the upstream platforms through the cache.
    pub db: Option<Arc<DatabaseClient>>,
    pub config: AppConfig,
}

impl AppContext {
    #[must_use]
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        db: Option<Arc<DatabaseClient>>,
        config: AppConfig,
    ) -> Self {
        Self {
            orchestrator,
            db,
            config,
        }
    }
}
