//! Redis-backed failed login counter for the admin credential

use redis::{AsyncCommands, Client};

use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct RedisService {
    client: Client,
}

impl RedisService {
    /// Create a new Redis service
    pub async fn new(url: &str) -> AppResult<Self> {
        let client = Client::open(url)
            .map_err(|e| AppError::Internal(format!("Failed to create Redis client: {}", e)))?;

        // Test connection
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to connect to Redis: {}", e)))?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Redis connection test failed: {}", e)))?;

        Ok(Self { client })
    }

    fn attempts_key(login: &str) -> String {
        format!("login_attempts:{}", login.to_lowercase())
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get Redis connection: {}", e)))
    }

    /// Failed attempts recorded for a login, and seconds until they reset
    pub async fn failed_attempts(&self, login: &str) -> AppResult<(u32, u64)> {
        let mut conn = self.connection().await?;
        let key = Self::attempts_key(login);

        let count: Option<u32> = conn
            .get(&key)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read login attempts: {}", e)))?;
        let Some(count) = count else {
            return Ok((0, 0));
        };

        let ttl: i64 = conn
            .ttl(&key)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read login lockout: {}", e)))?;
        Ok((count, ttl.max(0) as u64))
    }

    /// Count a failed attempt; the counter expires `lockout_seconds` after the last failure
    pub async fn record_failure(&self, login: &str, lockout_seconds: u64) -> AppResult<u32> {
        let mut conn = self.connection().await?;
        let key = Self::attempts_key(login);

        let count: u32 = conn
            .incr(&key, 1)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to record login attempt: {}", e)))?;
        conn.expire::<_, ()>(&key, lockout_seconds as i64)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to set login lockout: {}", e)))?;
        Ok(count)
    }

    pub async fn clear_failures(&self, login: &str) -> AppResult<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(Self::attempts_key(login))
            .await
            .map_err(|e| AppError::Internal(format!("Failed to clear login attempts: {}", e)))?;
        Ok(())
    }
}
