//! Repository layer for database operations

pub mod action_tokens;
pub mod hosts;
pub mod memory;
pub mod notifications;
pub mod visits;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use std::collections::HashSet;

use crate::{
    error::AppResult,
    models::{
        action_token::{ActionToken, HostMutation, Redemption},
        host::{Host, HostForm},
        notification::{DeliveryStatus, NewNotification, NotificationKind},
        visit::{
            CheckoutMethod, DashboardStats, DayWindow, NewVisit, Visit, VisitFilter, VisitStatus,
            VisitorIdentity,
        },
    },
};

pub use memory::MemoryStore;

/// Persistence seam of the visit lifecycle.
///
/// Every state transition is expressed as a conditional write so that
/// concurrent callers cannot both win: a `None` from [`VisitStore::check_out`]
/// means the visit was no longer in one of the accepted statuses.
#[async_trait]
pub trait VisitStore: Send + Sync {
    async fn ping(&self) -> AppResult<()>;

    async fn qr_token_exists(&self, token: &str) -> AppResult<bool>;
    async fn insert_visit(&self, visit: NewVisit) -> AppResult<Visit>;
    async fn get_visit(&self, id: i64) -> AppResult<Option<Visit>>;
    async fn find_by_qr_token(&self, token: &str) -> AppResult<Option<Visit>>;
    async fn find_active_by_identity(
        &self,
        identity: &VisitorIdentity,
        day: DayWindow,
    ) -> AppResult<Option<Visit>>;
    async fn list_checked_in_before(&self, threshold: DateTime<Utc>) -> AppResult<Vec<Visit>>;
    async fn check_out(
        &self,
        id: i64,
        from: &[VisitStatus],
        method: CheckoutMethod,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Visit>>;
    async fn escalate_day(&self, day: DayWindow, now: DateTime<Utc>) -> AppResult<Vec<Visit>>;

    async fn insert_action_token(
        &self,
        visit_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<ActionToken>;
    async fn find_action_token(&self, token_hash: &str) -> AppResult<Option<ActionToken>>;
    async fn latest_valid_action_token(
        &self,
        visit_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<Option<ActionToken>>;
    async fn redeem_action_token(
        &self,
        token: &ActionToken,
        mutation: HostMutation,
        now: DateTime<Utc>,
    ) -> AppResult<Redemption>;

    async fn log_notification(&self, record: NewNotification) -> AppResult<()>;
    /// Insert `record` unless a notification of the same kind was logged for
    /// the visit after `since`. Returns the new record id when the claim won.
    async fn claim_notification(
        &self,
        record: NewNotification,
        since: DateTime<Utc>,
    ) -> AppResult<Option<i64>>;
    async fn complete_notification(&self, id: i64, status: DeliveryStatus) -> AppResult<()>;
    async fn visits_notified_since(
        &self,
        kind: NotificationKind,
        since: DateTime<Utc>,
    ) -> AppResult<HashSet<i64>>;

    async fn list_active_hosts(&self) -> AppResult<Vec<Host>>;
    /// Case-insensitive lookup, inactive hosts included
    async fn find_host_by_email(&self, email: &str) -> AppResult<Option<Host>>;
    async fn upsert_host(&self, host: &HostForm, now: DateTime<Utc>) -> AppResult<Host>;

    async fn list_visits(&self, filter: &VisitFilter) -> AppResult<Vec<Visit>>;
    async fn dashboard(&self, today: DayWindow, week_start: DateTime<Utc>)
        -> AppResult<DashboardStats>;
    async fn purge_departed_before(&self, threshold: DateTime<Utc>) -> AppResult<u64>;
}

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub visits: visits::VisitsRepository,
    pub action_tokens: action_tokens::ActionTokensRepository,
    pub notifications: notifications::NotificationsRepository,
    pub hosts: hosts::HostsRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            visits: visits::VisitsRepository::new(pool.clone()),
            action_tokens: action_tokens::ActionTokensRepository::new(pool.clone()),
            notifications: notifications::NotificationsRepository::new(pool.clone()),
            hosts: hosts::HostsRepository::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl VisitStore for Repository {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn qr_token_exists(&self, token: &str) -> AppResult<bool> {
        self.visits.qr_token_exists(token).await
    }

    async fn insert_visit(&self, visit: NewVisit) -> AppResult<Visit> {
        self.visits.create(&visit).await
    }

    async fn get_visit(&self, id: i64) -> AppResult<Option<Visit>> {
        self.visits.get_by_id(id).await
    }

    async fn find_by_qr_token(&self, token: &str) -> AppResult<Option<Visit>> {
        self.visits.get_by_qr_token(token).await
    }

    async fn find_active_by_identity(
        &self,
        identity: &VisitorIdentity,
        day: DayWindow,
    ) -> AppResult<Option<Visit>> {
        self.visits.find_active_by_identity(identity, day).await
    }

    async fn list_checked_in_before(&self, threshold: DateTime<Utc>) -> AppResult<Vec<Visit>> {
        self.visits.list_checked_in_before(threshold).await
    }

    async fn check_out(
        &self,
        id: i64,
        from: &[VisitStatus],
        method: CheckoutMethod,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Visit>> {
        self.visits.check_out(id, from, method, now).await
    }

    async fn escalate_day(&self, day: DayWindow, now: DateTime<Utc>) -> AppResult<Vec<Visit>> {
        self.visits.escalate_day(day, now).await
    }

    async fn insert_action_token(
        &self,
        visit_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<ActionToken> {
        self.action_tokens
            .create(visit_id, token_hash, expires_at, now)
            .await
    }

    async fn find_action_token(&self, token_hash: &str) -> AppResult<Option<ActionToken>> {
        self.action_tokens.get_by_hash(token_hash).await
    }

    async fn latest_valid_action_token(
        &self,
        visit_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<Option<ActionToken>> {
        self.action_tokens.latest_valid(visit_id, now).await
    }

    async fn redeem_action_token(
        &self,
        token: &ActionToken,
        mutation: HostMutation,
        now: DateTime<Utc>,
    ) -> AppResult<Redemption> {
        self.action_tokens
            .redeem(token.id, token.visit_id, mutation, now)
            .await
    }

    async fn log_notification(&self, record: NewNotification) -> AppResult<()> {
        self.notifications.create(&record).await
    }

    async fn claim_notification(
        &self,
        record: NewNotification,
        since: DateTime<Utc>,
    ) -> AppResult<Option<i64>> {
        self.notifications.claim(&record, since).await
    }

    async fn complete_notification(&self, id: i64, status: DeliveryStatus) -> AppResult<()> {
        self.notifications.set_status(id, status).await
    }

    async fn visits_notified_since(
        &self,
        kind: NotificationKind,
        since: DateTime<Utc>,
    ) -> AppResult<HashSet<i64>> {
        self.notifications.visits_notified_since(kind, since).await
    }

    async fn list_active_hosts(&self) -> AppResult<Vec<Host>> {
        self.hosts.list_active().await
    }

    async fn find_host_by_email(&self, email: &str) -> AppResult<Option<Host>> {
        self.hosts.get_by_email(email).await
    }

    async fn upsert_host(&self, host: &HostForm, now: DateTime<Utc>) -> AppResult<Host> {
        self.hosts.upsert(host, now).await
    }

    async fn list_visits(&self, filter: &VisitFilter) -> AppResult<Vec<Visit>> {
        self.visits.list(filter).await
    }

    async fn dashboard(
        &self,
        today: DayWindow,
        week_start: DateTime<Utc>,
    ) -> AppResult<DashboardStats> {
        self.visits.dashboard(today, week_start).await
    }

    async fn purge_departed_before(&self, threshold: DateTime<Utc>) -> AppResult<u64> {
        self.visits.purge_departed_before(threshold).await
    }
}
