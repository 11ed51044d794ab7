mod config;

use std::sync::Arc;

use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use parley_api::auth::AppStateInner;
use parley_api::bot::GeminiClient;
use parley_db::Database;
use parley_gateway::{DeliveryCoordinator, RoomRouter};

use crate::config::{Config, DEFAULT_JWT_SECRET};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    if config.jwt_secret == DEFAULT_JWT_SECRET {
        warn!("PARLEY_JWT_SECRET is not set; using the development secret");
    }
    if config.gemini_api_key.is_none() {
        warn!("GEMINI_API_KEY is not set; /api/ask will fail");
    }

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);

    // Shared state
    let rooms = RoomRouter::new();
    let delivery = DeliveryCoordinator::new(db.clone(), rooms.clone(), config.delivery_mode);
    let state = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        token_ttl_days: config.token_ttl_days,
        delivery,
        bot: Arc::new(GeminiClient::new(config.gemini_api_key.clone(), &config.bot_model)),
    });

    let cors = match &config.allowed_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    };

    let app = parley_api::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!(
        "Parley server listening on {} (delivery mode: {})",
        addr, config.delivery_mode
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(rooms))
        .await?;

    info!("Parley server stopped");
    Ok(())
}

/// Waits for Ctrl-C, then closes every gateway session so the graceful
/// shutdown is not held open by live sockets.
async fn shutdown_signal(rooms: RoomRouter) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested, closing gateway sessions");
    rooms.shutdown().await;
}
