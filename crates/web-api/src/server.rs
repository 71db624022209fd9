//! Router assembly and serving.

use crate::context::AppContext;
use crate::handlers;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub struct ApiServer {
    context: Arc<AppContext>,
}

impl ApiServer {
    #[must_use]
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/api/leaderboard", get(handlers::leaderboard))
            .route("/api/profile/:address", get(handlers::profile))
            .route("/api/markets", get(handlers::markets))
            .route("/health", get(handlers::health))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(self.context.clone())
    }

    /// Binds and serves until the process exits.
    ///
    /// # Errors
    /// Returns an error if the listener cannot bind or serving fails.
    pub async fn serve(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("web API listening on {addr}");

        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}
