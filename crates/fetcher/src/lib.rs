//! Fetch framework for TruthBounty.
//!
//! Pulls market and trader data from heterogeneous upstreams through one
//! shared pipeline: per-platform sliding-window rate limiting, short-TTL
//! caching, a generic pagination driver over the [`PlatformFetcher`] trait,
//! and a concurrent orchestrator that isolates per-platform failures.

pub mod cache;
pub mod enrich;
pub mod error;
pub mod fetch;
pub mod ratelimit;
pub mod registry;
pub mod sink;

pub use cache::MemoryCache;
pub use enrich::{enrich_traders, EnrichLimits};
pub use error::FetchError;
pub use fetch::{Cursor, FetchDriver, FetchOptions, PageResult, PlatformFetcher};
pub use ratelimit::RateLimiter;
pub use registry::{FetcherRegistry, Orchestrator, PlatformFetchResult};
pub use sink::{MemorySink, NullSink, PersistenceSink};
