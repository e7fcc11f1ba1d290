//! API handlers for the kiosk REST endpoints

pub mod admin;
pub mod health;
pub mod host_action;
pub mod hosts;
pub mod openapi;
pub mod visits;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::{error::AppError, models::admin::AdminClaims, AppState};

/// Extractor for the authenticated admin session
pub struct AdminUser(pub AdminClaims);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Authentication("Invalid authorization header format".to_string()))?;

        let claims = AdminClaims::from_token(token, &state.config.admin.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        Ok(AdminUser(claims))
    }
}
