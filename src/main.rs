use std::{net::SocketAddr, sync::Arc};

use axum::{
    http::StatusCode,
    routing::{delete, get, post},
    Router,
};
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cache;
mod config;
mod db;
mod error;
mod generator;
mod geo;
mod handlers;
mod models;
mod shortener;
#[cfg(test)]
mod test_util;

use shortener::UrlShortener;

// ── Shared application state ───────────────────────────────────────────────

pub struct AppState {
    pub config: config::AppConfig,
    pub service: UrlShortener,
}

// ── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (ignore error if file is absent — env vars may already be set)
    dotenvy::dotenv().ok();

    // Initialise structured logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shortly=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = config::AppConfig::from_env()?;
    tracing::info!("Starting Shortly on {}:{}", config.host, config.port);
    tracing::info!("Base URL: {}", config.base_url);

    // Open SQLite connection pool
    // CREATE the file if it doesn't exist yet
    let db = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(
            config
                .database_url
                .parse::<sqlx::sqlite::SqliteConnectOptions>()?
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .foreign_keys(true),
        )
        .await?;

    // Run embedded migrations (files in migrations/)
    sqlx::migrate!("./migrations").run(&db).await?;
    tracing::info!("Database migrations applied");

    // Build shared state
    let geo = geo::GeoResolver::new(config.geo_api_url.clone());
    let service = UrlShortener::new(db, config.base_url.clone(), geo);
    let state = Arc::new(AppState { config, service });

    // ── Router ─────────────────────────────────────────────────────────────
    let api_router = Router::new()
        .route("/shorten", post(handlers::api::shorten))
        .route("/history/:code", get(handlers::api::history))
        .route("/visitor-details", get(handlers::api::visitor_details))
        .route("/cache/clear", post(handlers::cache_admin::clear))
        .route("/cache/keys", get(handlers::cache_admin::keys))
        .route("/cache/keys/:key", delete(handlers::cache_admin::remove));

    let app = Router::new()
        // Health check — returns 200 OK for load balancers
        .route("/health", get(|| async { StatusCode::OK }))
        // JSON API (all under /api/*)
        .nest("/api", api_router)
        // Short-link redirect — must come LAST so /api/* and /health take
        // priority
        .route("/:code", get(handlers::redirect::redirect))
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http());

    // ── Serve ──────────────────────────────────────────────────────────────
    let bind_addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
