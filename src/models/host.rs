//! Host directory shown on the kiosk form

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// Employee who can receive visitors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Host {
    pub id: i64,
    /// Lowercase, unique
    pub email: String,
    pub name: String,
    pub department: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Create or update a host, keyed by email
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct HostForm {
    #[validate(email(message = "Invalid host email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    pub department: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}
