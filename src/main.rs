//! Takedown Gateway — files legal takedown reports against uploaded wiki
//! media, tracks each submission's lifecycle, and notifies affected users.
//!
//! The core is the four-stage submission pipeline against the external
//! reporting service (open report → upload file → file metadata → close),
//! each stage keyed by an identifier returned by the previous one.
//!
//! ## Endpoints
//!
//! - `GET  /health`            — Health check
//! - `POST /takedown`          — File a takedown report
//! - `POST /takedown/retract`  — Withdraw a previously opened report
//! - `GET  /audit`             — List recent audit log entries
//! - `POST /notify/user-talk`  — Post a removal notice to a user's talk page
//! - `POST /notify/commons`    — Post a takedown notice to a central wiki page

mod audit;
mod config;
mod error;
mod handlers;
mod models;
mod pipeline;
mod reporting;
mod schema;
mod state;
mod wiki;
mod xml;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use state::AppState;

/// Evidence files are media; allow up to 100 MiB per submission.
const MAX_BODY_BYTES: usize = 100 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "takedown_gateway=debug,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let state = AppState::from_env().await?;
    let state = Arc::new(state);

    // Run migrations when an audit database is configured
    if let Some(pool) = state.audit.pool() {
        sqlx::migrate!("./migrations").run(pool).await?;
        tracing::info!("Migrations applied");
    }

    let app = Router::new()
        .route("/health", get(handlers::health))
        .route("/takedown", post(handlers::submit_takedown))
        .route("/takedown/retract", post(handlers::retract_report))
        .route("/audit", get(handlers::list_audit))
        .route("/notify/user-talk", post(handlers::notify_user_talk))
        .route("/notify/commons", post(handlers::notify_commons))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:3200".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Takedown Gateway listening on http://{addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
