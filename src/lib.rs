//! Visitor Kiosk Server
//!
//! Visitors check in at a kiosk, receive a QR badge and check out by
//! rescanning it or by name lookup. Hosts confirm departures through single-use
//! email links, and visits still open at the end of the day are escalated to
//! supervisors.

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::{AppConfig, RateLimitConfig};
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Kiosk
        .route("/visits/check-in", post(api::visits::check_in))
        .route("/visits/verify", get(api::visits::verify))
        .route("/visits/check-out", post(api::visits::check_out))
        .route("/hosts", get(api::hosts::list_hosts))
        // Admin
        .route("/admin/login", post(api::admin::login))
        .route("/admin/visits", get(api::admin::list_visits))
        .route("/admin/visits/:id/check-out", post(api::admin::check_out))
        .route("/admin/hosts", put(api::hosts::upsert_host))
        .route("/admin/dashboard", get(api::admin::dashboard))
        .route("/admin/export", get(api::admin::export))
        .route("/admin/sweep/reminders", post(api::admin::run_reminders))
        .route("/admin/sweep/escalation", post(api::admin::run_escalation))
        .with_state(state.clone());

    // Host links are mailed as absolute URLs outside the API prefix
    let host_links = Router::new()
        .route("/host-action", get(api::host_action::apply))
        .with_state(state);

    // OpenAPI documentation
    let openapi = api::openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(host_links)
        .merge(openapi)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Wrap the router in per-IP rate limiting.
///
/// Keys on the peer address, so the router must be served with
/// `into_make_service_with_connect_info::<SocketAddr>()`. The governor config
/// is leaked because the layer borrows it for the lifetime of the server.
pub fn with_rate_limit(router: Router, config: &RateLimitConfig) -> AppResult<Router> {
    let governor_conf = GovernorConfigBuilder::default()
        .per_second(config.per_second)
        .burst_size(config.burst_size)
        .finish()
        .ok_or_else(|| {
            AppError::Internal("Rate limit period and burst size must be non-zero".to_string())
        })?;
    let governor_conf = Box::leak(Box::new(governor_conf));

    Ok(router.layer(GovernorLayer {
        config: &*governor_conf,
    }))
}
