//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{admin, health, host_action, hosts, visits};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Visitor Kiosk API",
        version = "1.0.0",
        description = "Visitor check-in and check-out REST API"
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Kiosk
        visits::check_in,
        visits::verify,
        visits::check_out,
        hosts::list_hosts,
        // Host links
        host_action::apply,
        // Admin
        admin::login,
        admin::list_visits,
        admin::dashboard,
        admin::export,
        admin::check_out,
        admin::run_reminders,
        admin::run_escalation,
        hosts::upsert_host,
    ),
    components(
        schemas(
            // Visits
            crate::models::visit::Visit,
            crate::models::visit::VisitStatus,
            crate::models::visit::CheckinMethod,
            crate::models::visit::CheckoutMethod,
            crate::models::visit::CheckInForm,
            crate::models::visit::VisitSummary,
            crate::models::visit::DashboardStats,
            crate::models::host::Host,
            crate::models::host::HostForm,
            visits::CheckInResponse,
            visits::CheckoutBody,
            visits::CheckoutResponse,
            // Host links
            crate::models::action_token::HostDecision,
            crate::models::action_token::HostDecisionResult,
            crate::models::action_token::HostDecisionOutcome,
            host_action::HostActionResponse,
            // Admin
            crate::models::admin::LoginRequest,
            crate::models::admin::LoginResponse,
            crate::services::sweep::ReminderReport,
            crate::services::sweep::EscalationReport,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "visits", description = "Kiosk check-in and check-out"),
        (name = "host", description = "Host action links"),
        (name = "admin", description = "Reception administration")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
