//! Visits repository for database operations

use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::visit::{
        CheckoutMethod, DashboardStats, DayWindow, NewVisit, Visit, VisitFilter, VisitStatus,
        VisitorIdentity,
    },
};

#[derive(Clone)]
pub struct VisitsRepository {
    pool: Pool<Postgres>,
}

impl VisitsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Check whether a QR token is already issued
    pub async fn qr_token_exists(&self, token: &str) -> AppResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM visits WHERE qr_token = $1)")
                .bind(token)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    /// Insert a checked-in visit
    pub async fn create(&self, visit: &NewVisit) -> AppResult<Visit> {
        let row = sqlx::query_as::<_, Visit>(
            r#"
            INSERT INTO visits (
                first_name, last_name, company, reason, host_email, host_name,
                visitor_email, arrival_time, expected_duration, status,
                checkin_method, qr_token, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'checked_in', 'kiosk', $10, $8, $8)
            RETURNING *
            "#,
        )
        .bind(&visit.first_name)
        .bind(&visit.last_name)
        .bind(&visit.company)
        .bind(&visit.reason)
        .bind(&visit.host_email)
        .bind(&visit.host_name)
        .bind(&visit.visitor_email)
        .bind(visit.arrival_time)
        .bind(visit.expected_duration)
        .bind(&visit.qr_token)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn get_by_id(&self, id: i64) -> AppResult<Option<Visit>> {
        let row = sqlx::query_as::<_, Visit>("SELECT * FROM visits WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn get_by_qr_token(&self, token: &str) -> AppResult<Option<Visit>> {
        let row = sqlx::query_as::<_, Visit>("SELECT * FROM visits WHERE qr_token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Most recent checked-in visit matching the identity within the day
    pub async fn find_active_by_identity(
        &self,
        identity: &VisitorIdentity,
        day: DayWindow,
    ) -> AppResult<Option<Visit>> {
        let row = sqlx::query_as::<_, Visit>(
            r#"
            SELECT * FROM visits
            WHERE lower(first_name) = lower($1)
              AND lower(last_name) = lower($2)
              AND lower(company) = lower($3)
              AND status = 'checked_in'
              AND arrival_time >= $4 AND arrival_time < $5
            ORDER BY arrival_time DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(&identity.first_name)
        .bind(&identity.last_name)
        .bind(&identity.company)
        .bind(day.start)
        .bind(day.end)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_checked_in_before(&self, threshold: DateTime<Utc>) -> AppResult<Vec<Visit>> {
        let rows = sqlx::query_as::<_, Visit>(
            "SELECT * FROM visits WHERE status = 'checked_in' AND arrival_time <= $1 ORDER BY arrival_time",
        )
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Conditional checkout: only rows still in one of the allowed statuses are updated
    pub async fn check_out(
        &self,
        id: i64,
        from: &[VisitStatus],
        method: CheckoutMethod,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Visit>> {
        let row = sqlx::query_as::<_, Visit>(
            r#"
            UPDATE visits
            SET status = 'checked_out',
                departure_time = $2,
                checkout_method = $3,
                updated_at = $2
            WHERE id = $1
              AND ((status = 'checked_in' AND $4) OR (status = 'unconfirmed' AND $5))
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(method)
        .bind(from.contains(&VisitStatus::CheckedIn))
        .bind(from.contains(&VisitStatus::Unconfirmed))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Flip every checked-in visit that arrived within the day to unconfirmed
    pub async fn escalate_day(&self, day: DayWindow, now: DateTime<Utc>) -> AppResult<Vec<Visit>> {
        let rows = sqlx::query_as::<_, Visit>(
            r#"
            UPDATE visits
            SET status = 'unconfirmed', updated_at = $3
            WHERE status = 'checked_in'
              AND arrival_time >= $1 AND arrival_time < $2
            RETURNING *
            "#,
        )
        .bind(day.start)
        .bind(day.end)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// List visits for the admin panel
    pub async fn list(&self, filter: &VisitFilter) -> AppResult<Vec<Visit>> {
        let mut conditions = Vec::new();
        let mut idx = 1;

        if filter.arrived_from.is_some() {
            conditions.push(format!("arrival_time >= ${}", idx));
            idx += 1;
        }
        if filter.arrived_before.is_some() {
            conditions.push(format!("arrival_time < ${}", idx));
            idx += 1;
        }
        if filter.status.is_some() {
            conditions.push(format!("status = ${}", idx));
            idx += 1;
        }
        if filter.search.is_some() {
            conditions.push(format!(
                "(first_name ILIKE ${0} OR last_name ILIKE ${0} OR company ILIKE ${0} OR host_email ILIKE ${0})",
                idx
            ));
            idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let limit_clause = if filter.limit.is_some() {
            format!("LIMIT ${}", idx)
        } else {
            String::new()
        };

        let query = format!(
            "SELECT * FROM visits {} ORDER BY arrival_time DESC {}",
            where_clause, limit_clause
        );

        let mut builder = sqlx::query_as::<_, Visit>(&query);
        if let Some(from) = filter.arrived_from {
            builder = builder.bind(from);
        }
        if let Some(before) = filter.arrived_before {
            builder = builder.bind(before);
        }
        if let Some(status) = filter.status {
            builder = builder.bind(status);
        }
        if let Some(ref search) = filter.search {
            builder = builder.bind(format!("%{}%", search));
        }
        if let Some(limit) = filter.limit {
            builder = builder.bind(limit);
        }

        let rows = builder.fetch_all(&self.pool).await?;
        Ok(rows)
    }

    pub async fn dashboard(
        &self,
        today: DayWindow,
        week_start: DateTime<Utc>,
    ) -> AppResult<DashboardStats> {
        let stats = sqlx::query_as::<_, DashboardStats>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE arrival_time >= $1 AND arrival_time < $2) AS visitors_today,
                COUNT(*) FILTER (WHERE status = 'checked_in') AS currently_on_site,
                COUNT(*) FILTER (
                    WHERE status = 'unconfirmed' AND arrival_time >= $1 AND arrival_time < $2
                ) AS unconfirmed_today,
                COALESCE(ROUND(AVG(EXTRACT(EPOCH FROM (departure_time - arrival_time)) / 60) FILTER (
                    WHERE departure_time IS NOT NULL AND arrival_time >= $1 AND arrival_time < $2
                )), 0)::bigint AS average_dwell_minutes,
                COUNT(*) FILTER (WHERE arrival_time >= $3) AS visitors_this_week
            FROM visits
            "#,
        )
        .bind(today.start)
        .bind(today.end)
        .bind(week_start)
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }

    /// Delete departed visits (and their tokens/notifications) older than the threshold
    pub async fn purge_departed_before(&self, threshold: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            "DELETE FROM visits WHERE status = 'checked_out' AND departure_time < $1",
        )
        .bind(threshold)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
