//! Host action links sent by email

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::{AppError, AppResult},
    models::action_token::{HostDecision, HostDecisionOutcome, HostDecisionResult},
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct HostActionQuery {
    pub token: String,
    /// `still_here` or `left`
    pub action: String,
}

#[derive(Serialize, ToSchema)]
pub struct HostActionResponse {
    pub message: String,
    #[serde(flatten)]
    pub outcome: HostDecisionOutcome,
}

fn message_for(outcome: &HostDecisionOutcome) -> String {
    let name = outcome.visit.full_name();
    match outcome.result {
        HostDecisionResult::CheckedOut => format!("{} has been checked out.", name),
        HostDecisionResult::DurationExtended => format!(
            "Noted, {} is still on site. Expected duration is now {} minutes.",
            name, outcome.visit.expected_duration
        ),
        HostDecisionResult::DurationAtMaximum => format!(
            "Noted, {} is still on site. Expected duration is already at the maximum of {} minutes.",
            name, outcome.visit.expected_duration
        ),
        HostDecisionResult::AlreadyResolved => {
            format!("The visit of {} is already closed.", name)
        }
    }
}

/// Apply a host decision from an email link
#[utoipa::path(
    get,
    path = "/host-action",
    tag = "host",
    params(HostActionQuery),
    responses(
        (status = 200, description = "Decision applied", body = HostActionResponse),
        (status = 400, description = "Unknown action", body = crate::error::ErrorResponse),
        (status = 404, description = "Invalid link", body = crate::error::ErrorResponse),
        (status = 409, description = "Link already used", body = crate::error::ErrorResponse),
        (status = 410, description = "Link expired", body = crate::error::ErrorResponse)
    )
)]
pub async fn apply(
    State(state): State<crate::AppState>,
    Query(query): Query<HostActionQuery>,
) -> AppResult<Json<HostActionResponse>> {
    let decision: HostDecision = query.action.parse().map_err(AppError::BadRequest)?;

    let outcome = state
        .services
        .lifecycle
        .apply_host_decision(&query.token, decision, Utc::now())
        .await?;

    Ok(Json(HostActionResponse {
        message: message_for(&outcome),
        outcome,
    }))
}
