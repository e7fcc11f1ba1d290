//! Admin surface: shared-credential login, visit listing, dashboard and CSV export

use argon2::{
    password_hash::{PasswordHash, PasswordVerifier},
    Argon2,
};
use chrono::{DateTime, NaiveDate, Utc};

use super::{lifecycle::LifecycleService, policy::LifecyclePolicy, redis::RedisService};
use crate::{
    config::AdminConfig,
    error::{AppError, AppResult},
    models::{
        admin::{AdminClaims, LoginResponse},
        visit::{CheckoutMethod, DashboardStats, Visit, VisitFilter, VisitQuery},
    },
};

const DEFAULT_LIST_LIMIT: i64 = 200;
const MAX_LIST_LIMIT: i64 = 1000;

const CSV_HEADER: [&str; 13] = [
    "Date",
    "Last name",
    "First name",
    "Company",
    "Host",
    "Host email",
    "Reason",
    "Arrival",
    "Departure",
    "Duration (min)",
    "Status",
    "Check-in method",
    "Checkout method",
];

#[derive(Clone)]
pub struct AdminService {
    lifecycle: LifecycleService,
    config: AdminConfig,
    redis: Option<RedisService>,
}

impl AdminService {
    pub fn new(lifecycle: LifecycleService, config: AdminConfig, redis: Option<RedisService>) -> Self {
        Self {
            lifecycle,
            config,
            redis,
        }
    }

    /// Check the shared admin credential and issue a JWT
    pub async fn login(&self, username: &str, password: &str) -> AppResult<LoginResponse> {
        if let Some(ref redis) = self.redis {
            let (attempts, retry_after) = redis.failed_attempts(username).await?;
            if attempts >= self.config.max_login_attempts {
                tracing::warn!(username, attempts, "Admin login locked out");
                return Err(AppError::TooManyAttempts(retry_after));
            }
        }

        if !self.verify_credentials(username, password)? {
            if let Some(ref redis) = self.redis {
                redis
                    .record_failure(username, self.config.lockout_seconds)
                    .await?;
            }
            tracing::warn!(username, "Admin login failed");
            return Err(AppError::Authentication(
                "Invalid username or password".to_string(),
            ));
        }

        if let Some(ref redis) = self.redis {
            redis.clear_failures(username).await?;
        }

        let now = Utc::now().timestamp();
        let expires_in = self.config.jwt_expiration_hours as i64 * 3600;
        let claims = AdminClaims {
            sub: self.config.username.clone(),
            exp: now + expires_in,
            iat: now,
        };
        let token = claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))?;

        tracing::info!(target: "audit", event = "admin_login", username, "Admin logged in");
        Ok(LoginResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_in,
        })
    }

    fn verify_credentials(&self, username: &str, password: &str) -> AppResult<bool> {
        if self.config.password_hash.is_empty() {
            return Err(AppError::Authentication(
                "Admin login is not configured".to_string(),
            ));
        }
        let parsed_hash = PasswordHash::new(&self.config.password_hash)
            .map_err(|_| AppError::Internal("Invalid admin password hash".to_string()))?;
        let password_valid = Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok();
        Ok(password_valid && username == self.config.username)
    }

    pub async fn list_visits(&self, query: &VisitQuery) -> AppResult<Vec<Visit>> {
        let mut filter = resolve_filter(query, self.lifecycle.policy())?;
        filter.limit = Some(
            query
                .limit
                .unwrap_or(DEFAULT_LIST_LIMIT)
                .clamp(1, MAX_LIST_LIMIT),
        );
        self.lifecycle.store().list_visits(&filter).await
    }

    pub async fn dashboard(&self, now: DateTime<Utc>) -> AppResult<DashboardStats> {
        let policy = self.lifecycle.policy();
        self.lifecycle
            .store()
            .dashboard(policy.day_window(now), policy.week_start(now))
            .await
    }

    /// CSV export of every visit matching the query, UTF-8 with BOM
    pub async fn export_csv(&self, query: &VisitQuery) -> AppResult<String> {
        let filter = resolve_filter(query, self.lifecycle.policy())?;
        let visits = self.lifecycle.store().list_visits(&filter).await?;
        Ok(render_csv(&visits, self.lifecycle.policy()))
    }
}

fn parse_date(value: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("Invalid date format: {}", value)))
}

/// Turn inclusive local dates into the UTC arrival range the store filters on
pub fn resolve_filter(query: &VisitQuery, policy: &LifecyclePolicy) -> AppResult<VisitFilter> {
    let from = query.date_from.as_deref().map(parse_date).transpose()?;
    let to = query.date_to.as_deref().map(parse_date).transpose()?;
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(AppError::Validation(
                "date_from must not be after date_to".to_string(),
            ));
        }
    }

    Ok(VisitFilter {
        arrived_from: from.map(|d| policy.date_window(d).start),
        arrived_before: to.map(|d| policy.date_window(d).end),
        status: query.status,
        search: query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        limit: None,
    })
}

/// Neutralise spreadsheet formulas, then quote a field when it holds a
/// separator, a quote or a line break
pub fn csv_escape(field: &str) -> String {
    let field = if field.starts_with(&['=', '+', '-', '@'][..]) {
        format!("'{}", field)
    } else {
        field.to_string()
    };

    if field.contains(&[',', '"', '\r', '\n'][..]) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field
    }
}

fn checkout_label(method: Option<CheckoutMethod>) -> &'static str {
    method.map(|m| m.as_str()).unwrap_or("")
}

pub fn render_csv(visits: &[Visit], policy: &LifecyclePolicy) -> String {
    let mut out = String::from("\u{feff}");
    out.push_str(&CSV_HEADER.join(","));
    out.push_str("\r\n");

    for visit in visits {
        let row = [
            policy.format_local(visit.arrival_time, "%Y-%m-%d"),
            visit.last_name.clone(),
            visit.first_name.clone(),
            visit.company.clone(),
            visit.host_name.clone().unwrap_or_default(),
            visit.host_email.clone(),
            visit.reason.clone(),
            policy.format_local(visit.arrival_time, "%H:%M"),
            visit
                .departure_time
                .map(|d| policy.format_local(d, "%H:%M"))
                .unwrap_or_default(),
            visit
                .duration_minutes()
                .map(|d| d.to_string())
                .unwrap_or_default(),
            visit.status.to_string(),
            visit.checkin_method.as_str().to_string(),
            checkout_label(visit.checkout_method).to_string(),
        ];
        let line: Vec<String> = row.iter().map(|f| csv_escape(f)).collect();
        out.push_str(&line.join(","));
        out.push_str("\r\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::visit::{CheckinMethod, VisitStatus};
    use chrono::TimeZone;

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("Acme"), "Acme");
        assert_eq!(csv_escape("Acme, Inc."), "\"Acme, Inc.\"");
        assert_eq!(csv_escape("The \"Big\" One"), "\"The \"\"Big\"\" One\"");
        assert_eq!(csv_escape("line\nbreak"), "\"line\nbreak\"");
    }

    #[test]
    fn test_csv_escape_neutralises_formulas() {
        assert_eq!(csv_escape("=HYPERLINK(\"http://x\")"), "\"'=HYPERLINK(\"\"http://x\"\")\"");
        assert_eq!(csv_escape("+1+1"), "'+1+1");
        assert_eq!(csv_escape("-2"), "'-2");
        assert_eq!(csv_escape("@SUM(A1)"), "'@SUM(A1)");
        assert_eq!(csv_escape("Jean-Luc"), "Jean-Luc");
    }

    #[test]
    fn test_render_csv_rows() {
        let arrival = Utc.with_ymd_and_hms(2026, 3, 10, 10, 0, 0).unwrap();
        let visit = Visit {
            id: 1,
            first_name: "Ana".to_string(),
            last_name: "Smith".to_string(),
            company: "Acme, Inc.".to_string(),
            reason: "Audit".to_string(),
            host_email: "host@example.com".to_string(),
            host_name: Some("Bob".to_string()),
            visitor_email: None,
            arrival_time: arrival,
            expected_duration: 180,
            departure_time: Some(arrival + chrono::Duration::minutes(90)),
            status: VisitStatus::CheckedOut,
            checkin_method: CheckinMethod::Kiosk,
            checkout_method: Some(CheckoutMethod::ManualLookup),
            qr_token: "qr".to_string(),
            created_at: arrival,
            updated_at: arrival,
        };

        let csv = render_csv(&[visit], &LifecyclePolicy::default());
        assert!(csv.starts_with('\u{feff}'));
        let lines: Vec<&str> = csv.trim_start_matches('\u{feff}').split("\r\n").collect();
        assert!(lines[0].starts_with("Date,Last name,First name"));
        assert_eq!(
            lines[1],
            "2026-03-10,Smith,Ana,\"Acme, Inc.\",Bob,host@example.com,Audit,10:00,11:30,90,checked_out,kiosk,manual_lookup"
        );
    }

    #[test]
    fn test_filter_dates_are_inclusive() {
        let policy = LifecyclePolicy::default();
        let query = VisitQuery {
            date_from: Some("2026-03-09".to_string()),
            date_to: Some("2026-03-10".to_string()),
            search: Some("  ".to_string()),
            ..Default::default()
        };
        let filter = resolve_filter(&query, &policy).unwrap();
        assert_eq!(filter.arrived_from, Some(Utc.with_ymd_and_hms(2026, 3, 9, 0, 0, 0).unwrap()));
        assert_eq!(filter.arrived_before, Some(Utc.with_ymd_and_hms(2026, 3, 11, 0, 0, 0).unwrap()));
        assert!(filter.search.is_none());

        let reversed = VisitQuery {
            date_from: Some("2026-03-11".to_string()),
            date_to: Some("2026-03-10".to_string()),
            ..Default::default()
        };
        assert!(matches!(resolve_filter(&reversed, &policy), Err(AppError::Validation(_))));
    }
}
