//! Visit model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

/// Lifecycle status of a visit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "visit_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    CheckedIn,
    CheckedOut,
    Unconfirmed,
}

impl VisitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitStatus::CheckedIn => "checked_in",
            VisitStatus::CheckedOut => "checked_out",
            VisitStatus::Unconfirmed => "unconfirmed",
        }
    }
}

impl std::fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for VisitStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checked_in" => Ok(VisitStatus::CheckedIn),
            "checked_out" => Ok(VisitStatus::CheckedOut),
            "unconfirmed" => Ok(VisitStatus::Unconfirmed),
            _ => Err(format!("Invalid visit status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "checkin_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CheckinMethod {
    Kiosk,
}

impl CheckinMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckinMethod::Kiosk => "kiosk",
        }
    }
}

/// How a visit was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "checkout_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CheckoutMethod {
    QrRescan,
    ManualLookup,
    HostConfirmed,
    ManualAdmin,
}

impl CheckoutMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutMethod::QrRescan => "qr_rescan",
            CheckoutMethod::ManualLookup => "manual_lookup",
            CheckoutMethod::HostConfirmed => "host_confirmed",
            CheckoutMethod::ManualAdmin => "manual_admin",
        }
    }
}

/// Visit record from the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Visit {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub company: String,
    pub reason: String,
    pub host_email: String,
    pub host_name: Option<String>,
    pub visitor_email: Option<String>,
    pub arrival_time: DateTime<Utc>,
    /// Expected duration in minutes
    pub expected_duration: i32,
    pub departure_time: Option<DateTime<Utc>>,
    pub status: VisitStatus,
    pub checkin_method: CheckinMethod,
    pub checkout_method: Option<CheckoutMethod>,
    pub qr_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Visit {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Whole minutes between arrival and `until`
    pub fn elapsed_minutes(&self, until: DateTime<Utc>) -> i64 {
        (until - self.arrival_time).num_minutes()
    }

    /// Whole minutes between arrival and departure, if departed
    pub fn duration_minutes(&self) -> Option<i64> {
        self.departure_time.map(|d| self.elapsed_minutes(d))
    }

    pub fn expected_departure(&self) -> DateTime<Utc> {
        self.arrival_time + chrono::Duration::minutes(self.expected_duration as i64)
    }
}

/// Validated visit ready to be persisted
#[derive(Debug, Clone)]
pub struct NewVisit {
    pub first_name: String,
    pub last_name: String,
    pub company: String,
    pub reason: String,
    pub host_email: String,
    pub host_name: Option<String>,
    pub visitor_email: Option<String>,
    pub arrival_time: DateTime<Utc>,
    pub expected_duration: i32,
    pub qr_token: String,
}

/// Kiosk check-in form
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct CheckInForm {
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,
    #[validate(length(min = 1, message = "Company is required"))]
    pub company: String,
    #[validate(length(min = 1, message = "Reason is required"))]
    pub reason: String,
    #[validate(email(message = "Invalid host email address"))]
    pub host_email: String,
    pub host_name: Option<String>,
    #[validate(email(message = "Invalid visitor email address"))]
    pub visitor_email: Option<String>,
    /// Expected duration in minutes; out-of-range values fall back to the default
    pub expected_duration: Option<i32>,
}

/// Visitor identity used for manual checkout lookup
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct VisitorIdentity {
    pub first_name: String,
    pub last_name: String,
    pub company: String,
}

/// What a checkout resolves against
#[derive(Debug, Clone)]
pub enum CheckoutTarget {
    QrToken(String),
    Identity(VisitorIdentity),
    VisitId(i64),
}

impl CheckoutTarget {
    pub fn default_method(&self) -> CheckoutMethod {
        match self {
            CheckoutTarget::QrToken(_) => CheckoutMethod::QrRescan,
            CheckoutTarget::Identity(_) => CheckoutMethod::ManualLookup,
            CheckoutTarget::VisitId(_) => CheckoutMethod::ManualAdmin,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub target: CheckoutTarget,
    pub method: CheckoutMethod,
}

impl CheckoutRequest {
    pub fn new(target: CheckoutTarget) -> Self {
        let method = target.default_method();
        Self { target, method }
    }
}

/// Result of a successful checkout
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckoutOutcome {
    pub visit: Visit,
    pub duration_minutes: i64,
}

/// Visit details shown when a QR code is scanned
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VisitSummary {
    pub id: i64,
    pub full_name: String,
    pub company: String,
    pub reason: String,
    pub host_email: String,
    pub host_name: Option<String>,
    pub arrival_time: DateTime<Utc>,
    pub expected_duration_minutes: i32,
    pub expected_departure_time: DateTime<Utc>,
    pub current_duration_minutes: i64,
}

impl VisitSummary {
    pub fn from_visit(visit: &Visit, now: DateTime<Utc>) -> Self {
        Self {
            id: visit.id,
            full_name: visit.full_name(),
            company: visit.company.clone(),
            reason: visit.reason.clone(),
            host_email: visit.host_email.clone(),
            host_name: visit.host_name.clone(),
            arrival_time: visit.arrival_time,
            expected_duration_minutes: visit.expected_duration,
            expected_departure_time: visit.expected_departure(),
            current_duration_minutes: visit.elapsed_minutes(now),
        }
    }
}

/// Half-open UTC interval `[start, end)` covering one local calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// Admin visit list filters
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct VisitQuery {
    /// Start date (YYYY-MM-DD), inclusive
    pub date_from: Option<String>,
    /// End date (YYYY-MM-DD), inclusive
    pub date_to: Option<String>,
    pub status: Option<VisitStatus>,
    /// Matches first name, last name, company or host email
    pub search: Option<String>,
    pub limit: Option<i64>,
}

/// Resolved admin filter handed to the store
#[derive(Debug, Clone, Default)]
pub struct VisitFilter {
    pub arrived_from: Option<DateTime<Utc>>,
    pub arrived_before: Option<DateTime<Utc>>,
    pub status: Option<VisitStatus>,
    pub search: Option<String>,
    pub limit: Option<i64>,
}

impl VisitFilter {
    pub fn matches(&self, visit: &Visit) -> bool {
        if let Some(from) = self.arrived_from {
            if visit.arrival_time < from {
                return false;
            }
        }
        if let Some(before) = self.arrived_before {
            if visit.arrival_time >= before {
                return false;
            }
        }
        if let Some(status) = self.status {
            if visit.status != status {
                return false;
            }
        }
        if let Some(ref search) = self.search {
            let needle = search.to_lowercase();
            let haystacks = [&visit.first_name, &visit.last_name, &visit.company, &visit.host_email];
            if !haystacks.iter().any(|h| h.to_lowercase().contains(&needle)) {
                return false;
            }
        }
        true
    }
}

/// Admin dashboard counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, FromRow, ToSchema)]
pub struct DashboardStats {
    pub visitors_today: i64,
    pub currently_on_site: i64,
    pub unconfirmed_today: i64,
    /// Average dwell time of today's departed visits, in minutes
    pub average_dwell_minutes: i64,
    pub visitors_this_week: i64,
}
