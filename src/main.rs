//! Visitor Kiosk Server
//!
//! Reception desk REST API: check-in, QR checkout, host links and escalation.

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kiosk_server::{
    config::AppConfig,
    create_router,
    repository::Repository,
    services::{redis::RedisService, scheduler::SweepScheduler, Services},
    with_rate_limit, AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("kiosk_server={},tower_http=debug", config.logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting Kiosk Server v{}", env!("CARGO_PKG_VERSION"));

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Database migrations completed");

    // Redis only backs login throttling
    let redis_service = match config.redis.url.as_deref() {
        Some(url) => {
            let service = RedisService::new(url)
                .await
                .context("Failed to connect to Redis")?;
            tracing::info!("Connected to Redis");
            Some(service)
        }
        None => {
            tracing::warn!("No Redis URL configured, admin login throttling disabled");
            None
        }
    };

    let server_host = config.server.host.clone();
    let server_port = config.server.port;

    // Create repository and services
    let repository = Arc::new(Repository::new(pool));
    let dispatcher = Services::dispatcher_for(&config);
    let services = Services::new(repository, dispatcher, &config, redis_service)
        .context("Failed to create services")?;

    let shutdown = CancellationToken::new();

    // Background reminder and escalation sweeps
    if config.sweep.enabled {
        let scheduler = SweepScheduler::new(
            services.sweep.clone(),
            services.lifecycle.policy().clone(),
            config.sweep.interval_minutes,
            shutdown.clone(),
        );
        tokio::spawn(scheduler.run());
    } else {
        tracing::warn!("Sweep scheduler disabled; use the admin sweep endpoints");
    }

    let rate_limit = config.rate_limit.clone();

    // Create application state
    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    let app = with_rate_limit(create_router(state), &rate_limit)
        .context("Invalid rate limit configuration")?;

    // Start server
    let addr = SocketAddr::new(
        server_host.parse().context("Invalid host address")?,
        server_port,
    );

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown))
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM and stop the scheduler
async fn shutdown_signal(shutdown: CancellationToken) {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }

    shutdown.cancel();
}
