//! Platform adapters for TruthBounty.
//!
//! One module per upstream market source. Each adapter owns its upstream
//! schema, pagination idiom, and the transform into
//! [`truthbounty_core::UnifiedMarket`]; everything else (rate limits,
//! caching, page loops, persistence) lives in `truthbounty-fetcher`.

pub mod azuro;
pub mod drift;
pub mod kalshi;
pub mod limitless;
pub mod manifold;
pub mod metaculus;
pub mod oracle;
pub mod overtime;
pub mod pancakeswap;
pub mod polymarket;
pub mod seer;
pub mod sxbet;

mod util;

use std::sync::Arc;
use truthbounty_fetcher::FetcherRegistry;

/// Registers one fetcher per supported platform with default endpoints.
pub fn register_default_fetchers(registry: &FetcherRegistry) {
    registry.register(Arc::new(polymarket::PolymarketFetcher::new()));
    registry.register(Arc::new(limitless::LimitlessFetcher::new()));
    registry.register(Arc::new(manifold::ManifoldFetcher::new()));
    registry.register(Arc::new(kalshi::KalshiFetcher::new()));
    registry.register(Arc::new(azuro::AzuroFetcher::new()));
    registry.register(Arc::new(sxbet::SxBetFetcher::new()));
    registry.register(Arc::new(metaculus::MetaculusFetcher::new()));
    registry.register(Arc::new(overtime::OvertimeFetcher::new()));
    registry.register(Arc::new(pancakeswap::PancakeSwapFetcher::new()));
    registry.register(Arc::new(drift::DriftFetcher::new()));
    registry.register(Arc::new(seer::SeerFetcher::new()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use truthbounty_core::Platform;

    #[test]
    fn test_every_platform_has_a_default_fetcher() {
        let registry = FetcherRegistry::new();
        register_default_fetchers(&registry);
        for platform in Platform::all() {
            assert!(
                registry.get(*platform).is_some(),
                "missing fetcher for {platform}"
            );
        }
    }
}
