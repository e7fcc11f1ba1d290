//! Admin endpoints

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use validator::Validate;

use super::{visits::CheckoutResponse, AdminUser};
use crate::{
    error::{AppError, AppResult},
    models::{
        admin::{LoginRequest, LoginResponse},
        visit::{CheckoutRequest, CheckoutTarget, DashboardStats, Visit, VisitQuery},
    },
    services::sweep::{EscalationReport, ReminderReport},
};

/// Log in with the shared admin credential
#[utoipa::path(
    post,
    path = "/api/v1/admin/login",
    tag = "admin",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorResponse),
        (status = 429, description = "Too many failed attempts", body = crate::error::ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<crate::AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let response = state
        .services
        .admin
        .login(&request.username, &request.password)
        .await?;
    Ok(Json(response))
}

/// List visits
#[utoipa::path(
    get,
    path = "/api/v1/admin/visits",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(VisitQuery),
    responses(
        (status = 200, description = "Visits, most recent arrival first", body = Vec<Visit>),
        (status = 400, description = "Invalid filter", body = crate::error::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_visits(
    State(state): State<crate::AppState>,
    AdminUser(_claims): AdminUser,
    Query(query): Query<VisitQuery>,
) -> AppResult<Json<Vec<Visit>>> {
    let visits = state.services.admin.list_visits(&query).await?;
    Ok(Json(visits))
}

/// Dashboard counters
#[utoipa::path(
    get,
    path = "/api/v1/admin/dashboard",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Counters for today and this week", body = DashboardStats),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn dashboard(
    State(state): State<crate::AppState>,
    AdminUser(_claims): AdminUser,
) -> AppResult<Json<DashboardStats>> {
    let stats = state.services.admin.dashboard(Utc::now()).await?;
    Ok(Json(stats))
}

/// Export visits as CSV
#[utoipa::path(
    get,
    path = "/api/v1/admin/export",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(VisitQuery),
    responses(
        (status = 200, description = "CSV file", content_type = "text/csv"),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn export(
    State(state): State<crate::AppState>,
    AdminUser(_claims): AdminUser,
    Query(query): Query<VisitQuery>,
) -> AppResult<impl IntoResponse> {
    let csv = state.services.admin.export_csv(&query).await?;
    let filename = format!(
        "attachment; filename=\"visits-{}.csv\"",
        state
            .services
            .lifecycle
            .policy()
            .format_local(Utc::now(), "%Y-%m-%d")
    );

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, filename),
        ],
        csv,
    ))
}

/// Close a visit from the admin panel, including unconfirmed ones
#[utoipa::path(
    post,
    path = "/api/v1/admin/visits/{id}/check-out",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Visit ID")
    ),
    responses(
        (status = 200, description = "Visitor checked out", body = CheckoutResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse),
        (status = 404, description = "Visit not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Visit already checked out", body = crate::error::ErrorResponse)
    )
)]
pub async fn check_out(
    State(state): State<crate::AppState>,
    AdminUser(claims): AdminUser,
    Path(id): Path<i64>,
) -> AppResult<Json<CheckoutResponse>> {
    let outcome = state
        .services
        .lifecycle
        .check_out(CheckoutRequest::new(CheckoutTarget::VisitId(id)), Utc::now())
        .await?;

    tracing::info!(target: "audit", event = "admin_check_out", visit_id = id, admin = %claims.sub);
    Ok(Json(outcome.into()))
}

/// Run the reminder sweep now
#[utoipa::path(
    post,
    path = "/api/v1/admin/sweep/reminders",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Reminder sweep report", body = ReminderReport),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn run_reminders(
    State(state): State<crate::AppState>,
    AdminUser(_claims): AdminUser,
) -> AppResult<Json<ReminderReport>> {
    let report = state.services.sweep.run_reminders(Utc::now()).await?;
    Ok(Json(report))
}

/// Run the end-of-day escalation now
#[utoipa::path(
    post,
    path = "/api/v1/admin/sweep/escalation",
    tag = "admin",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Escalation report; empty before end of day", body = EscalationReport),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn run_escalation(
    State(state): State<crate::AppState>,
    AdminUser(_claims): AdminUser,
) -> AppResult<Json<EscalationReport>> {
    let now = Utc::now();
    let report = state.services.sweep.run_escalation(now).await?;
    state.services.sweep.purge_expired(now).await?;
    Ok(Json(report))
}
