//! API Server - HTTP server for the JSON API

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::handlers::{self, AppState};

/// API Server configuration
pub struct ApiServer {
    state: Arc<AppState>,
    addr: String,
}

impl ApiServer {
    pub fn new(state: AppState, addr: String) -> Self {
        Self {
            state: Arc::new(state),
            addr,
        }
    }

    /// Build the router with all routes
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let api_routes = Router::new()
            .route("/health", get(handlers::health))
            .route("/domains", get(handlers::list_domains))
            .route("/domains/:name", put(handlers::toggle_domain))
            .route("/emails", get(handlers::list_emails))
            .route(
                "/emails/:id",
                get(handlers::get_email).delete(handlers::delete_email),
            )
            .route("/emails/:id/read", post(handlers::mark_read))
            .route("/stats", get(handlers::stats))
            .route("/generate-email", get(handlers::generate_email));

        Router::new()
            .nest("/api", api_routes)
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .with_state(self.state.clone())
    }

    /// Serve until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) -> std::io::Result<()> {
        let router = self.router();

        info!("Starting API server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("API server stopped");
        Ok(())
    }
}
