//! In-process store used by tests and database-less runs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tokio::sync::Mutex;

use super::VisitStore;
use crate::{
    error::{AppError, AppResult},
    models::{
        action_token::{ActionToken, HostMutation, Redemption},
        host::{Host, HostForm},
        notification::{DeliveryStatus, NewNotification, NotificationKind, NotificationRecord},
        visit::{
            CheckinMethod, CheckoutMethod, DashboardStats, DayWindow, NewVisit, Visit,
            VisitFilter, VisitStatus, VisitorIdentity,
        },
    },
};

#[derive(Default)]
struct Tables {
    visits: Vec<Visit>,
    action_tokens: Vec<ActionToken>,
    notifications: Vec<NotificationRecord>,
    hosts: Vec<Host>,
    next_visit_id: i64,
    next_host_id: i64,
    next_token_id: i64,
    next_notification_id: i64,
}

impl Tables {
    fn visit_mut(&mut self, id: i64) -> Option<&mut Visit> {
        self.visits.iter_mut().find(|v| v.id == id)
    }

    fn push_notification(&mut self, record: NewNotification) -> i64 {
        self.next_notification_id += 1;
        let id = self.next_notification_id;
        self.notifications.push(NotificationRecord {
            id,
            visit_id: record.visit_id,
            kind: record.kind,
            recipient: record.recipient,
            status: record.status,
            sent_at: record.sent_at,
        });
        id
    }
}

/// Store keeping every table behind a single async mutex, so each
/// operation is atomic with respect to the others.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the notification log
    pub async fn notifications(&self) -> Vec<NotificationRecord> {
        self.tables.lock().await.notifications.clone()
    }

    /// Snapshot of the action tokens issued so far
    pub async fn action_tokens(&self) -> Vec<ActionToken> {
        self.tables.lock().await.action_tokens.clone()
    }
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

#[async_trait]
impl VisitStore for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn qr_token_exists(&self, token: &str) -> AppResult<bool> {
        let tables = self.tables.lock().await;
        Ok(tables.visits.iter().any(|v| v.qr_token == token))
    }

    async fn insert_visit(&self, visit: NewVisit) -> AppResult<Visit> {
        let mut tables = self.tables.lock().await;
        if tables.visits.iter().any(|v| v.qr_token == visit.qr_token) {
            return Err(AppError::Internal("Duplicate QR token".to_string()));
        }
        tables.next_visit_id += 1;
        let row = Visit {
            id: tables.next_visit_id,
            first_name: visit.first_name,
            last_name: visit.last_name,
            company: visit.company,
            reason: visit.reason,
            host_email: visit.host_email,
            host_name: visit.host_name,
            visitor_email: visit.visitor_email,
            arrival_time: visit.arrival_time,
            expected_duration: visit.expected_duration,
            departure_time: None,
            status: VisitStatus::CheckedIn,
            checkin_method: CheckinMethod::Kiosk,
            checkout_method: None,
            qr_token: visit.qr_token,
            created_at: visit.arrival_time,
            updated_at: visit.arrival_time,
        };
        tables.visits.push(row.clone());
        Ok(row)
    }

    async fn get_visit(&self, id: i64) -> AppResult<Option<Visit>> {
        let tables = self.tables.lock().await;
        Ok(tables.visits.iter().find(|v| v.id == id).cloned())
    }

    async fn find_by_qr_token(&self, token: &str) -> AppResult<Option<Visit>> {
        let tables = self.tables.lock().await;
        Ok(tables.visits.iter().find(|v| v.qr_token == token).cloned())
    }

    async fn find_active_by_identity(
        &self,
        identity: &VisitorIdentity,
        day: DayWindow,
    ) -> AppResult<Option<Visit>> {
        let tables = self.tables.lock().await;
        let found = tables
            .visits
            .iter()
            .filter(|v| {
                v.status == VisitStatus::CheckedIn
                    && day.contains(v.arrival_time)
                    && eq_ignore_case(&v.first_name, &identity.first_name)
                    && eq_ignore_case(&v.last_name, &identity.last_name)
                    && eq_ignore_case(&v.company, &identity.company)
            })
            .max_by_key(|v| (v.arrival_time, v.id))
            .cloned();
        Ok(found)
    }

    async fn list_checked_in_before(&self, threshold: DateTime<Utc>) -> AppResult<Vec<Visit>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<Visit> = tables
            .visits
            .iter()
            .filter(|v| v.status == VisitStatus::CheckedIn && v.arrival_time <= threshold)
            .cloned()
            .collect();
        rows.sort_by_key(|v| v.arrival_time);
        Ok(rows)
    }

    async fn check_out(
        &self,
        id: i64,
        from: &[VisitStatus],
        method: CheckoutMethod,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Visit>> {
        let mut tables = self.tables.lock().await;
        let Some(visit) = tables.visit_mut(id) else {
            return Ok(None);
        };
        if visit.status == VisitStatus::CheckedOut || !from.contains(&visit.status) {
            return Ok(None);
        }
        visit.status = VisitStatus::CheckedOut;
        visit.departure_time = Some(now);
        visit.checkout_method = Some(method);
        visit.updated_at = now;
        Ok(Some(visit.clone()))
    }

    async fn escalate_day(&self, day: DayWindow, now: DateTime<Utc>) -> AppResult<Vec<Visit>> {
        let mut tables = self.tables.lock().await;
        let mut flipped = Vec::new();
        for visit in tables.visits.iter_mut() {
            if visit.status == VisitStatus::CheckedIn && day.contains(visit.arrival_time) {
                visit.status = VisitStatus::Unconfirmed;
                visit.updated_at = now;
                flipped.push(visit.clone());
            }
        }
        Ok(flipped)
    }

    async fn insert_action_token(
        &self,
        visit_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<ActionToken> {
        let mut tables = self.tables.lock().await;
        if tables.action_tokens.iter().any(|t| t.token_hash == token_hash) {
            return Err(AppError::Internal("Duplicate action token".to_string()));
        }
        tables.next_token_id += 1;
        let token = ActionToken {
            id: tables.next_token_id,
            visit_id,
            token_hash: token_hash.to_string(),
            purpose: ActionToken::HOST_ACTION.to_string(),
            expires_at,
            used_at: None,
            created_at: now,
        };
        tables.action_tokens.push(token.clone());
        Ok(token)
    }

    async fn find_action_token(&self, token_hash: &str) -> AppResult<Option<ActionToken>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .action_tokens
            .iter()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn latest_valid_action_token(
        &self,
        visit_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<Option<ActionToken>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .action_tokens
            .iter()
            .filter(|t| t.visit_id == visit_id && t.is_valid(now))
            .max_by_key(|t| (t.created_at, t.id))
            .cloned())
    }

    async fn redeem_action_token(
        &self,
        token: &ActionToken,
        mutation: HostMutation,
        now: DateTime<Utc>,
    ) -> AppResult<Redemption> {
        let mut tables = self.tables.lock().await;

        let Some(stored) = tables.action_tokens.iter().find(|t| t.id == token.id) else {
            return Err(AppError::InvalidToken);
        };
        if stored.is_used() {
            return Ok(Redemption::TokenAlreadyUsed);
        }

        // Resolve the visit before claiming so a missing row leaves the token untouched
        let Some(visit) = tables.visits.iter().find(|v| v.id == token.visit_id).cloned() else {
            return Err(AppError::NotFound(format!("Visit {} not found", token.visit_id)));
        };

        if let Some(stored) = tables.action_tokens.iter_mut().find(|t| t.id == token.id) {
            stored.used_at = Some(now);
        }

        if visit.status != VisitStatus::CheckedIn {
            return Ok(Redemption::AlreadyResolved(visit));
        }

        let Some(visit) = tables.visit_mut(token.visit_id) else {
            return Err(AppError::NotFound(format!("Visit {} not found", token.visit_id)));
        };
        match mutation {
            HostMutation::CheckOut => {
                visit.status = VisitStatus::CheckedOut;
                visit.departure_time = Some(now);
                visit.checkout_method = Some(CheckoutMethod::HostConfirmed);
            }
            HostMutation::ExtendDuration { minutes, cap } => {
                visit.expected_duration = (visit.expected_duration + minutes).min(cap);
            }
        }
        visit.updated_at = now;
        Ok(Redemption::Applied(visit.clone()))
    }

    async fn log_notification(&self, record: NewNotification) -> AppResult<()> {
        self.tables.lock().await.push_notification(record);
        Ok(())
    }

    async fn claim_notification(
        &self,
        record: NewNotification,
        since: DateTime<Utc>,
    ) -> AppResult<Option<i64>> {
        let mut tables = self.tables.lock().await;
        let taken = tables.notifications.iter().any(|n| {
            n.visit_id == record.visit_id && n.kind == record.kind && n.sent_at > since
        });
        if taken {
            return Ok(None);
        }
        Ok(Some(tables.push_notification(record)))
    }

    async fn complete_notification(&self, id: i64, status: DeliveryStatus) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        if let Some(row) = tables.notifications.iter_mut().find(|n| n.id == id) {
            row.status = status;
        }
        Ok(())
    }

    async fn visits_notified_since(
        &self,
        kind: NotificationKind,
        since: DateTime<Utc>,
    ) -> AppResult<HashSet<i64>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .notifications
            .iter()
            .filter(|n| n.kind == kind && n.sent_at > since)
            .map(|n| n.visit_id)
            .collect())
    }

    async fn list_active_hosts(&self) -> AppResult<Vec<Host>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<Host> = tables.hosts.iter().filter(|h| h.is_active).cloned().collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.email.cmp(&b.email)));
        Ok(rows)
    }

    async fn find_host_by_email(&self, email: &str) -> AppResult<Option<Host>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .hosts
            .iter()
            .find(|h| eq_ignore_case(&h.email, email))
            .cloned())
    }

    async fn upsert_host(&self, host: &HostForm, now: DateTime<Utc>) -> AppResult<Host> {
        let mut tables = self.tables.lock().await;
        let email = host.email.to_lowercase();
        if let Some(row) = tables.hosts.iter_mut().find(|h| h.email == email) {
            row.name = host.name.clone();
            row.department = host.department.clone();
            row.is_active = host.is_active;
            return Ok(row.clone());
        }
        tables.next_host_id += 1;
        let row = Host {
            id: tables.next_host_id,
            email,
            name: host.name.clone(),
            department: host.department.clone(),
            is_active: host.is_active,
            created_at: now,
        };
        tables.hosts.push(row.clone());
        Ok(row)
    }

    async fn list_visits(&self, filter: &VisitFilter) -> AppResult<Vec<Visit>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<Visit> = tables
            .visits
            .iter()
            .filter(|v| filter.matches(v))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.arrival_time.cmp(&a.arrival_time));
        if let Some(limit) = filter.limit {
            rows.truncate(limit.max(0) as usize);
        }
        Ok(rows)
    }

    async fn dashboard(
        &self,
        today: DayWindow,
        week_start: DateTime<Utc>,
    ) -> AppResult<DashboardStats> {
        let tables = self.tables.lock().await;
        let mut stats = DashboardStats::default();
        let mut dwell_seconds = Vec::new();

        for visit in &tables.visits {
            let arrived_today = today.contains(visit.arrival_time);
            if arrived_today {
                stats.visitors_today += 1;
                if visit.status == VisitStatus::Unconfirmed {
                    stats.unconfirmed_today += 1;
                }
                if let Some(departure) = visit.departure_time {
                    dwell_seconds.push((departure - visit.arrival_time).num_seconds());
                }
            }
            if visit.status == VisitStatus::CheckedIn {
                stats.currently_on_site += 1;
            }
            if visit.arrival_time >= week_start {
                stats.visitors_this_week += 1;
            }
        }

        if !dwell_seconds.is_empty() {
            let total: i64 = dwell_seconds.iter().sum();
            let avg_minutes = total as f64 / dwell_seconds.len() as f64 / 60.0;
            stats.average_dwell_minutes = avg_minutes.round() as i64;
        }
        Ok(stats)
    }

    async fn purge_departed_before(&self, threshold: DateTime<Utc>) -> AppResult<u64> {
        let mut tables = self.tables.lock().await;
        let purged: HashSet<i64> = tables
            .visits
            .iter()
            .filter(|v| {
                v.status == VisitStatus::CheckedOut
                    && v.departure_time.map_or(false, |d| d < threshold)
            })
            .map(|v| v.id)
            .collect();
        tables.visits.retain(|v| !purged.contains(&v.id));
        tables.action_tokens.retain(|t| !purged.contains(&t.visit_id));
        tables.notifications.retain(|n| !purged.contains(&n.visit_id));
        Ok(purged.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, hour, minute, 0).unwrap()
    }

    fn new_visit(first: &str, token: &str, arrival: DateTime<Utc>) -> NewVisit {
        NewVisit {
            first_name: first.to_string(),
            last_name: "Durand".to_string(),
            company: "Acme".to_string(),
            reason: "Meeting".to_string(),
            host_email: "host@example.com".to_string(),
            host_name: None,
            visitor_email: None,
            arrival_time: arrival,
            expected_duration: 180,
            qr_token: token.to_string(),
        }
    }

    #[tokio::test]
    async fn test_check_out_only_from_allowed_status() {
        let store = MemoryStore::new();
        let visit = store.insert_visit(new_visit("Ana", "t1", at(9, 0))).await.unwrap();

        let first = store
            .check_out(visit.id, &[VisitStatus::CheckedIn], CheckoutMethod::QrRescan, at(10, 0))
            .await
            .unwrap();
        assert!(first.is_some());

        let second = store
            .check_out(visit.id, &[VisitStatus::CheckedIn], CheckoutMethod::QrRescan, at(10, 5))
            .await
            .unwrap();
        assert!(second.is_none());

        let stored = store.get_visit(visit.id).await.unwrap().unwrap();
        assert_eq!(stored.departure_time, Some(at(10, 0)));
    }

    #[tokio::test]
    async fn test_redeem_consumes_token_once() {
        let store = MemoryStore::new();
        let visit = store.insert_visit(new_visit("Ana", "t1", at(9, 0))).await.unwrap();
        let token = store
            .insert_action_token(visit.id, "hash", at(9, 0) + Duration::days(7), at(9, 0))
            .await
            .unwrap();

        let first = store
            .redeem_action_token(&token, HostMutation::CheckOut, at(12, 0))
            .await
            .unwrap();
        assert!(matches!(first, Redemption::Applied(ref v) if v.status == VisitStatus::CheckedOut));

        let second = store
            .redeem_action_token(&token, HostMutation::CheckOut, at(12, 1))
            .await
            .unwrap();
        assert_eq!(second, Redemption::TokenAlreadyUsed);
    }

    #[tokio::test]
    async fn test_purge_cascades_to_tokens() {
        let store = MemoryStore::new();
        let visit = store.insert_visit(new_visit("Ana", "t1", at(9, 0))).await.unwrap();
        store
            .insert_action_token(visit.id, "hash", at(9, 0) + Duration::days(7), at(9, 0))
            .await
            .unwrap();
        store
            .check_out(visit.id, &[VisitStatus::CheckedIn], CheckoutMethod::QrRescan, at(10, 0))
            .await
            .unwrap();

        let purged = store.purge_departed_before(at(11, 0)).await.unwrap();
        assert_eq!(purged, 1);
        assert!(store.action_tokens().await.is_empty());
    }
}
