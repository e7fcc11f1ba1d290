//! Host action tokens embedded in notification links

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::visit::Visit;

/// Single-use host confirmation credential. Only the SHA-256 digest is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ActionToken {
    pub id: i64,
    pub visit_id: i64,
    pub token_hash: String,
    pub purpose: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ActionToken {
    pub const HOST_ACTION: &'static str = "host_action";

    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.is_used() && !self.is_expired(now)
    }
}

/// Host answer carried by an action link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HostDecision {
    StillHere,
    Left,
}

impl HostDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostDecision::StillHere => "still_here",
            HostDecision::Left => "left",
        }
    }
}

impl std::str::FromStr for HostDecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "still_here" => Ok(HostDecision::StillHere),
            "left" => Ok(HostDecision::Left),
            _ => Err(format!("Invalid host action: {}", s)),
        }
    }
}

/// Visit mutation applied together with token consumption
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostMutation {
    CheckOut,
    ExtendDuration { minutes: i32, cap: i32 },
}

/// What the store did when redeeming a token
#[derive(Debug, Clone, PartialEq)]
pub enum Redemption {
    /// Token consumed and the visit mutated
    Applied(Visit),
    /// Token consumed, visit was no longer checked in and is returned unchanged
    AlreadyResolved(Visit),
    /// Another request consumed the token first
    TokenAlreadyUsed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HostDecisionResult {
    CheckedOut,
    DurationExtended,
    /// Still here, but the expected duration already sits at the cap
    DurationAtMaximum,
    AlreadyResolved,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HostDecisionOutcome {
    pub result: HostDecisionResult,
    pub visit: Visit,
}
