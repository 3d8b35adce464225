//! JSON HTTP API.
//!
//! A thin layer over the services for the office's web front end. The
//! single SQLite connection is shared behind a mutex and every service
//! call runs on tokio's blocking pool.

pub mod error;
pub mod handlers;

use crate::config::AppConfig;
use crate::error::Result;
use crate::storage::SqliteStorage;
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Mutex<SqliteStorage>>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(storage: SqliteStorage, config: AppConfig) -> Self {
        Self {
            storage: Arc::new(Mutex::new(storage)),
            config: Arc::new(config),
        }
    }
}

/// All API routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/violation-types", get(handlers::list_violation_types))
        .route("/api/drivers", get(handlers::list_drivers))
        .route("/api/drivers/:id/duplicates", get(handlers::driver_duplicates))
        .route("/api/citations", get(handlers::list_citations).post(handlers::create_citation))
        .route("/api/citations/:id", get(handlers::get_citation))
        .route("/api/fines/preview", get(handlers::fine_preview))
        .route("/api/payments", post(handlers::record_payment))
        .route("/api/payments/check-or/:or", get(handlers::check_or))
        .route("/api/payments/next-or", get(handlers::next_or))
        .route("/api/payments/:id/confirm", post(handlers::confirm_payment))
        .route("/api/payments/:id/void", post(handlers::void_payment))
        .route("/api/reports/summary", get(handlers::report_summary))
        .with_state(state)
}

/// Serve the API until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(state: AppState, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "API listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; run until the process is killed.
        std::future::pending::<()>().await;
    }
}
