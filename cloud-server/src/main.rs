//! Watchpost Collector
//!
//! Receives activity reports from endpoint agents, scores them and raises
//! alerts for high-risk windows.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   WATCHPOST COLLECTOR                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌───────────┐  ┌─────────────────────────┐ │
//! │  │  Ingest   │  │  Admin    │  │  Services               │ │
//! │  │  API      │  │  API      │  │  registry / ingest /    │ │
//! │  │  (Axum)   │  │  (JWT)    │  │  alert engine           │ │
//! │  └─────┬─────┘  └─────┬─────┘  └────────────┬────────────┘ │
//! │        └──────────────┼──────────────────────┘              │
//! │                       ▼                                     │
//! │            ┌──────────────────────┐                        │
//! │            │ Store (PG / memory)  │                        │
//! │            └──────────────────────┘                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod db;
mod models;
mod handlers;
mod middleware;
mod services;
mod store;
mod error;

use axum::{
    Router,
    routing::{get, post, put},
    middleware as axum_middleware,
    http::HeaderValue,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
    compression::CompressionLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use std::net::SocketAddr;
use std::sync::Arc;

pub use error::{AppError, AppResult};

use store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env()?;

    init_tracing(config.json_logs);

    tracing::info!("Watchpost Collector starting...");
    tracing::info!("Credential policy: {}", config.credential_policy.as_str());

    let store: Arc<dyn Store> = if config.uses_memory_store() {
        tracing::warn!("Using in-memory store; data is lost on exit");
        Arc::new(MemoryStore::new())
    } else {
        tracing::info!("Database: {}", config.database_url.split('@').last().unwrap_or("***"));

        let pool = db::create_pool(&config.database_url).await?;

        tracing::info!("Running database migrations...");
        db::run_migrations(&pool).await?;

        Arc::new(PgStore::new(pool))
    };

    services::accounts::ensure_admin(store.as_ref(), &config.admin_email, &config.admin_password)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bootstrap admin: {}", e))?;

    let state = AppState {
        store,
        config: config.clone(),
    };

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "watchpost_cloud=debug,tower_http=debug".into());

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: config::Config,
}

fn cors_layer(origins: &str) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.trim() == "*" {
        return base.allow_origin(Any);
    }

    let list: Vec<HeaderValue> = origins
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| o.parse().ok())
        .collect();

    base.allow_origin(AllowOrigin::list(list))
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(handlers::health::check))
        .route("/api/health", get(handlers::health::check))
        .route("/api/auth/login", post(handlers::auth::login))
        // Reporter ingest; credential checked by the source registry
        .route("/api/activity", post(handlers::activity::ingest))
        .route("/api/activity/log", post(handlers::activity::ingest));

    // Management routes (user JWT auth)
    let management_routes = Router::new()
        .route("/api/auth/me", get(handlers::auth::me))

        // Sources
        .route("/api/sources", get(handlers::sources::list).post(handlers::sources::create))
        .route(
            "/api/sources/:id",
            get(handlers::sources::get)
                .put(handlers::sources::update)
                .delete(handlers::sources::delete),
        )

        // Activity
        .route(
            "/api/activity/records",
            get(handlers::activity::list).post(handlers::activity::create),
        )
        .route("/api/activity/records/:id", get(handlers::activity::get))
        .route("/api/activity/stats", get(handlers::activity::stats))
        .route("/api/activity/high-risk", get(handlers::activity::high_risk))

        // Alerts
        .route("/api/alerts", get(handlers::alerts::list).post(handlers::alerts::create))
        .route("/api/alerts/active", get(handlers::alerts::active))
        .route("/api/alerts/stats", get(handlers::alerts::stats))
        .route("/api/alerts/:id", get(handlers::alerts::get).delete(handlers::alerts::delete))
        .route("/api/alerts/:id/resolve", put(handlers::alerts::resolve))

        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_user_auth
        ));

    let cors = cors_layer(&state.config.cors_origins);

    // Combine all routes
    Router::new()
        .merge(public_routes)
        .merge(management_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
