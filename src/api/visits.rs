//! Kiosk endpoints: check-in, QR verification and checkout

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::{AppError, AppResult},
    models::visit::{
        CheckInForm, CheckoutMethod, CheckoutOutcome, CheckoutRequest, CheckoutTarget,
        VisitSummary, VisitorIdentity,
    },
};

#[derive(Serialize, ToSchema)]
pub struct CheckInResponse {
    pub visit_id: i64,
    pub qr_token: String,
    /// URL encoded in the visitor badge QR code
    pub checkout_url: String,
    pub arrival_time: DateTime<Utc>,
    pub expected_duration: i32,
    pub expected_departure_time: DateTime<Utc>,
}

/// Register a visitor arrival
#[utoipa::path(
    post,
    path = "/api/v1/visits/check-in",
    tag = "visits",
    request_body = CheckInForm,
    responses(
        (status = 201, description = "Visitor checked in", body = CheckInResponse),
        (status = 400, description = "Missing or invalid fields", body = crate::error::ErrorResponse),
        (status = 503, description = "Store unavailable", body = crate::error::ErrorResponse)
    )
)]
pub async fn check_in(
    State(state): State<crate::AppState>,
    Json(form): Json<CheckInForm>,
) -> AppResult<(StatusCode, Json<CheckInResponse>)> {
    let receipt = state.services.lifecycle.check_in(form, Utc::now()).await?;
    let visit = receipt.visit;

    Ok((
        StatusCode::CREATED,
        Json(CheckInResponse {
            visit_id: visit.id,
            expected_departure_time: visit.expected_departure(),
            qr_token: visit.qr_token,
            checkout_url: receipt.checkout_url,
            arrival_time: visit.arrival_time,
            expected_duration: visit.expected_duration,
        }),
    ))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct VerifyQuery {
    /// QR token scanned from the badge
    pub token: String,
}

/// Show the visit behind a scanned QR code
#[utoipa::path(
    get,
    path = "/api/v1/visits/verify",
    tag = "visits",
    params(VerifyQuery),
    responses(
        (status = 200, description = "Visit on site", body = VisitSummary),
        (status = 404, description = "Unknown QR code", body = crate::error::ErrorResponse),
        (status = 409, description = "Visit already closed or unconfirmed", body = crate::error::ErrorResponse)
    )
)]
pub async fn verify(
    State(state): State<crate::AppState>,
    Query(query): Query<VerifyQuery>,
) -> AppResult<Json<VisitSummary>> {
    let summary = state
        .services
        .lifecycle
        .verify_qr(&query.token, Utc::now())
        .await?;
    Ok(Json(summary))
}

/// Checkout by QR token, or by name and company when the badge is lost
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CheckoutBody {
    pub qr_token: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
}

impl CheckoutBody {
    fn target(self) -> AppResult<CheckoutTarget> {
        if let Some(token) = self.qr_token.filter(|t| !t.trim().is_empty()) {
            return Ok(CheckoutTarget::QrToken(token));
        }
        match (self.first_name, self.last_name, self.company) {
            (Some(first_name), Some(last_name), Some(company))
                if !first_name.trim().is_empty()
                    && !last_name.trim().is_empty()
                    && !company.trim().is_empty() =>
            {
                Ok(CheckoutTarget::Identity(VisitorIdentity {
                    first_name,
                    last_name,
                    company,
                }))
            }
            _ => Err(AppError::BadRequest(
                "Provide qr_token, or first_name, last_name and company".to_string(),
            )),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub visit_id: i64,
    pub full_name: String,
    pub arrival_time: DateTime<Utc>,
    pub departure_time: Option<DateTime<Utc>>,
    pub duration_minutes: i64,
    pub checkout_method: Option<CheckoutMethod>,
}

impl From<CheckoutOutcome> for CheckoutResponse {
    fn from(outcome: CheckoutOutcome) -> Self {
        Self {
            visit_id: outcome.visit.id,
            full_name: outcome.visit.full_name(),
            arrival_time: outcome.visit.arrival_time,
            departure_time: outcome.visit.departure_time,
            duration_minutes: outcome.duration_minutes,
            checkout_method: outcome.visit.checkout_method,
        }
    }
}

/// Record a visitor departure
#[utoipa::path(
    post,
    path = "/api/v1/visits/check-out",
    tag = "visits",
    request_body = CheckoutBody,
    responses(
        (status = 200, description = "Visitor checked out", body = CheckoutResponse),
        (status = 400, description = "No checkout target given", body = crate::error::ErrorResponse),
        (status = 404, description = "No matching visit", body = crate::error::ErrorResponse),
        (status = 409, description = "Visit already closed or unconfirmed", body = crate::error::ErrorResponse)
    )
)]
pub async fn check_out(
    State(state): State<crate::AppState>,
    Json(body): Json<CheckoutBody>,
) -> AppResult<Json<CheckoutResponse>> {
    let request = CheckoutRequest::new(body.target()?);
    let outcome = state
        .services
        .lifecycle
        .check_out(request, Utc::now())
        .await?;
    Ok(Json(outcome.into()))
}
