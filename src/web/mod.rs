//! Web server module.

mod handlers;

pub use handlers::*;

use crate::config::ServerConfig;
use crate::db::Store;
use crate::report::ReportManager;

use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<Store>,
    pub reports: Arc<ReportManager>,
}

/// Web server for storepulse.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(config: ServerConfig, store: Arc<Store>, reports: Arc<ReportManager>) -> Self {
        Self {
            state: AppState {
                config,
                store,
                reports,
            },
        }
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Serve on the configured port until `shutdown` resolves.
    pub async fn start(
        &self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

/// Router for the report API.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

    Router::new()
        .route("/trigger_report", post(handlers::handle_trigger_report))
        .route("/get_report", get(handlers::handle_get_report))
        .route("/api/reports/{id}", get(handlers::handle_report_status))
        .route("/health", get(handlers::handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
