//! REST surface for TruthBounty.

pub mod context;
pub mod error;
pub mod handlers;
pub mod server;

pub use context::AppContext;
pub use error::ApiError;
pub use server::ApiServer;
