//! Postgres-backed store shared by every server instance
//!
//! Counters use a single `INSERT ... ON CONFLICT ... RETURNING` statement so
//! the increment and the window reset happen under one row lock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;

use super::{KeyValueStore, StoreError, WindowCount};

#[derive(Clone)]
pub struct PgStore {
    db_pool: PgPool,
}

impl PgStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

fn deadline_after(ttl: Duration) -> Result<DateTime<Utc>, StoreError> {
    let ttl = chrono::Duration::from_std(ttl)
        .map_err(|e| StoreError::Backend(format!("ttl out of range: {}", e)))?;
    Ok(Utc::now() + ttl)
}

#[async_trait]
impl KeyValueStore for PgStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT value FROM kv_entries
            WHERE key = $1 AND (expires_at IS NULL OR expires_at > $2)
            "#,
        )
        .bind(key)
        .bind(Utc::now())
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at = ttl.map(deadline_after).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO kv_entries (key, value, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn incr_window(&self, key: &str, window: Duration) -> Result<WindowCount, StoreError> {
        let now = Utc::now();
        let reset_at = deadline_after(window)?;

        let (count, window_end): (i64, Option<DateTime<Utc>>) = sqlx::query_as(
            r#"
            INSERT INTO kv_counters (key, count, reset_at)
            VALUES ($1, 1, $2)
            ON CONFLICT (key) DO UPDATE
            SET count = CASE
                    WHEN kv_counters.reset_at IS NOT NULL AND kv_counters.reset_at <= $3 THEN 1
                    ELSE kv_counters.count + 1
                END,
                reset_at = CASE
                    WHEN kv_counters.reset_at IS NOT NULL AND kv_counters.reset_at <= $3 THEN EXCLUDED.reset_at
                    ELSE kv_counters.reset_at
                END
            RETURNING count, reset_at
            "#,
        )
        .bind(key)
        .bind(reset_at)
        .bind(now)
        .fetch_one(&self.db_pool)
        .await?;

        let resets_in = window_end
            .and_then(|end| (end - now).to_std().ok())
            .unwrap_or(window);

        Ok(WindowCount {
            count: count.max(0) as u64,
            resets_in,
        })
    }

    async fn incr(&self, key: &str) -> Result<u64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO kv_counters (key, count, reset_at)
            VALUES ($1, 1, NULL)
            ON CONFLICT (key) DO UPDATE SET count = kv_counters.count + 1
            RETURNING count
            "#,
        )
        .bind(key)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn push_capped(&self, key: &str, value: &str, cap: usize) -> Result<(), StoreError> {
        let mut tx = self.db_pool.begin().await?;

        sqlx::query("INSERT INTO kv_lists (key, value) VALUES ($1, $2)")
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            DELETE FROM kv_lists
            WHERE key = $1 AND id NOT IN (
                SELECT id FROM kv_lists WHERE key = $1 ORDER BY id DESC LIMIT $2
            )
            "#,
        )
        .bind(key)
        .bind(cap as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT value FROM kv_lists WHERE key = $1 ORDER BY id ASC")
                .bind(key)
                .fetch_all(&self.db_pool)
                .await?;

        Ok(rows.into_iter().map(|(value,)| value).collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        crate::db::check_health(&self.db_pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}
