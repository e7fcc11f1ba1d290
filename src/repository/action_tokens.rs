//! Action tokens repository

use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{
        action_token::{ActionToken, HostMutation, Redemption},
        visit::Visit,
    },
};

#[derive(Clone)]
pub struct ActionTokensRepository {
    pool: Pool<Postgres>,
}

impl ActionTokensRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        visit_id: i64,
        token_hash: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<ActionToken> {
        let row = sqlx::query_as::<_, ActionToken>(
            r#"
            INSERT INTO action_tokens (visit_id, token_hash, purpose, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(visit_id)
        .bind(token_hash)
        .bind(ActionToken::HOST_ACTION)
        .bind(expires_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_by_hash(&self, token_hash: &str) -> AppResult<Option<ActionToken>> {
        let row = sqlx::query_as::<_, ActionToken>(
            "SELECT * FROM action_tokens WHERE token_hash = $1 AND purpose = $2",
        )
        .bind(token_hash)
        .bind(ActionToken::HOST_ACTION)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Latest unused, unexpired token of a visit
    pub async fn latest_valid(
        &self,
        visit_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<Option<ActionToken>> {
        let row = sqlx::query_as::<_, ActionToken>(
            r#"
            SELECT * FROM action_tokens
            WHERE visit_id = $1 AND purpose = $2 AND used_at IS NULL AND expires_at > $3
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(visit_id)
        .bind(ActionToken::HOST_ACTION)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Consume the token and apply the visit mutation in one transaction.
    ///
    /// The token is claimed with a compare-and-swap on `used_at`; the visit is
    /// only touched while it is still checked in. Either both writes commit or
    /// neither does.
    pub async fn redeem(
        &self,
        token_id: i64,
        visit_id: i64,
        mutation: HostMutation,
        now: DateTime<Utc>,
    ) -> AppResult<Redemption> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            "UPDATE action_tokens SET used_at = $2 WHERE id = $1 AND used_at IS NULL",
        )
        .bind(token_id)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            tx.rollback().await?;
            return Ok(Redemption::TokenAlreadyUsed);
        }

        let updated = match mutation {
            HostMutation::CheckOut => {
                sqlx::query_as::<_, Visit>(
                    r#"
                    UPDATE visits
                    SET status = 'checked_out',
                        departure_time = $2,
                        checkout_method = 'host_confirmed',
                        updated_at = $2
                    WHERE id = $1 AND status = 'checked_in'
                    RETURNING *
                    "#,
                )
                .bind(visit_id)
                .bind(now)
                .fetch_optional(&mut *tx)
                .await?
            }
            HostMutation::ExtendDuration { minutes, cap } => {
                sqlx::query_as::<_, Visit>(
                    r#"
                    UPDATE visits
                    SET expected_duration = LEAST(expected_duration + $3, $4),
                        updated_at = $2
                    WHERE id = $1 AND status = 'checked_in'
                    RETURNING *
                    "#,
                )
                .bind(visit_id)
                .bind(now)
                .bind(minutes)
                .bind(cap)
                .fetch_optional(&mut *tx)
                .await?
            }
        };

        let redemption = match updated {
            Some(visit) => Redemption::Applied(visit),
            None => {
                let visit = sqlx::query_as::<_, Visit>("SELECT * FROM visits WHERE id = $1")
                    .bind(visit_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Visit {} not found", visit_id)))?;
                Redemption::AlreadyResolved(visit)
            }
        };

        tx.commit().await?;
        Ok(redemption)
    }
}
