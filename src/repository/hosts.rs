//! Host directory repository

use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::host::{Host, HostForm},
};

#[derive(Clone)]
pub struct HostsRepository {
    pool: Pool<Postgres>,
}

impl HostsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn list_active(&self) -> AppResult<Vec<Host>> {
        let rows = sqlx::query_as::<_, Host>(
            "SELECT * FROM hosts WHERE is_active ORDER BY name, email",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_by_email(&self, email: &str) -> AppResult<Option<Host>> {
        let row = sqlx::query_as::<_, Host>("SELECT * FROM hosts WHERE email = lower($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Insert or update by email
    pub async fn upsert(&self, host: &HostForm, now: DateTime<Utc>) -> AppResult<Host> {
        let row = sqlx::query_as::<_, Host>(
            r#"
            INSERT INTO hosts (email, name, department, is_active, created_at)
            VALUES (lower($1), $2, $3, $4, $5)
            ON CONFLICT (email) DO UPDATE
            SET name = EXCLUDED.name,
                department = EXCLUDED.department,
                is_active = EXCLUDED.is_active
            RETURNING *
            "#,
        )
        .bind(&host.email)
        .bind(&host.name)
        .bind(&host.department)
        .bind(host.is_active)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}
