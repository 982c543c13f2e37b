mod api;
mod app;
mod auth;
mod config;
mod db;
mod domain;
mod error;
mod logging;
mod middleware;
mod routes;
mod services;

use anyhow::Result;

use services::{MediaClient, RealtimeHub, RedisCache};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = config::Settings::from_env()?;

    logging::init_logging(&settings.env);

    tracing::info!(
        env = ?settings.env,
        server_addr = %settings.server_addr,
        "Starting InteriorQuote backend"
    );

    let pool = db::create_pool(&settings).await?;
    db::run_migrations(&pool).await?;

    let cache =
        RedisCache::connect(&settings.redis_url, settings.redis_cache_ttl_seconds).await?;

    let media = MediaClient::new(&settings)?;

    // Reachability only; uploads retry on their own
    tokio::spawn({
        let media = media.clone();
        async move {
            match media.health_check().await {
                Ok(()) => tracing::info!("Media host is reachable"),
                Err(e) => tracing::warn!(error = %e, "Media host health check failed"),
            }
        }
    });

    let jwt = auth::JwtKeys::new(
        &settings.jwt_secret,
        &settings.jwt_issuer,
        settings.jwt_expiry_hours,
    );

    let hub = RealtimeHub::new();

    let state = app::AppState::new(pool, settings.clone(), jwt, cache, media, hub.clone());
    let app = app::create_app(state);

    let listener = tokio::net::TcpListener::bind(&settings.server_addr).await?;
    tracing::info!("Listening on {}", settings.server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM, then close live WebSocket connections so the
/// server can drain.
async fn shutdown_signal(hub: RealtimeHub) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    hub.shutdown_all();
}
