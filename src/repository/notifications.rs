//! Notification log repository

use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use std::collections::HashSet;

use crate::{
    error::AppResult,
    models::notification::{DeliveryStatus, NewNotification, NotificationKind},
};

#[derive(Clone)]
pub struct NotificationsRepository {
    pool: Pool<Postgres>,
}

impl NotificationsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn create(&self, record: &NewNotification) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (visit_id, kind, recipient, status, sent_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.visit_id)
        .bind(record.kind)
        .bind(&record.recipient)
        .bind(record.status)
        .bind(record.sent_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Conditional insert serialized per visit with a transaction-scoped
    /// advisory lock, so two sweeps cannot both claim the same reminder.
    pub async fn claim(
        &self,
        record: &NewNotification,
        since: DateTime<Utc>,
    ) -> AppResult<Option<i64>> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(record.visit_id)
            .execute(&mut *tx)
            .await?;

        let id: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO notifications (visit_id, kind, recipient, status, sent_at)
            SELECT $1, $2, $3, $4, $5
            WHERE NOT EXISTS (
                SELECT 1 FROM notifications
                WHERE visit_id = $1 AND kind = $2 AND sent_at > $6
            )
            RETURNING id
            "#,
        )
        .bind(record.visit_id)
        .bind(record.kind)
        .bind(&record.recipient)
        .bind(record.status)
        .bind(record.sent_at)
        .bind(since)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    pub async fn set_status(&self, id: i64, status: DeliveryStatus) -> AppResult<()> {
        sqlx::query("UPDATE notifications SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Visits with a notification of `kind` logged strictly after `since`
    pub async fn visits_notified_since(
        &self,
        kind: NotificationKind,
        since: DateTime<Utc>,
    ) -> AppResult<HashSet<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT DISTINCT visit_id FROM notifications WHERE kind = $1 AND sent_at > $2",
        )
        .bind(kind)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().collect())
    }
}
