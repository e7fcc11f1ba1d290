//! Host directory endpoints

use axum::{extract::State, Json};
use chrono::Utc;

use super::AdminUser;
use crate::{
    error::AppResult,
    models::host::{Host, HostForm},
};

/// List active hosts for the kiosk picker
#[utoipa::path(
    get,
    path = "/api/v1/hosts",
    tag = "visits",
    responses(
        (status = 200, description = "Active hosts by name", body = Vec<Host>)
    )
)]
pub async fn list_hosts(State(state): State<crate::AppState>) -> AppResult<Json<Vec<Host>>> {
    let hosts = state.services.hosts.list_active().await?;
    Ok(Json(hosts))
}

/// Create or update a host
#[utoipa::path(
    put,
    path = "/api/v1/admin/hosts",
    tag = "admin",
    security(("bearer_auth" = [])),
    request_body = HostForm,
    responses(
        (status = 200, description = "Host saved", body = Host),
        (status = 400, description = "Invalid host", body = crate::error::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn upsert_host(
    State(state): State<crate::AppState>,
    AdminUser(_claims): AdminUser,
    Json(form): Json<HostForm>,
) -> AppResult<Json<Host>> {
    let host = state.services.hosts.upsert(form, Utc::now()).await?;
    Ok(Json(host))
}
