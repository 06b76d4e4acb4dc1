//! Screen Registry Repository
//!
//! MySQL access for the `screens` table. Status transitions are single
//! UPDATE statements so a toggle racing a heartbeat cannot lose either.

use super::types::*;
use super::ScreenBackend;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;

/// Screen repository for database operations
#[derive(Clone)]
pub struct ScreenRepository {
    pool: MySqlPool,
}

impl ScreenRepository {
    /// Create new repository
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn require(&self, screen_id: &str) -> Result<Screen> {
        self.get_screen(screen_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Screen {} not found", screen_id)))
    }
}

#[async_trait]
impl ScreenBackend for ScreenRepository {
    async fn get_screen(&self, screen_id: &str) -> Result<Option<Screen>> {
        let screen = sqlx::query_as::<_, Screen>(
            "SELECT id, name, status, last_ping FROM screens WHERE id = ?",
        )
        .bind(screen_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(screen)
    }

    async fn list_screens(&self) -> Result<Vec<Screen>> {
        let screens = sqlx::query_as::<_, Screen>(
            "SELECT id, name, status, last_ping FROM screens ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(screens)
    }

    async fn heartbeat(&self, screen_id: &str, now: DateTime<Utc>) -> Result<Screen> {
        sqlx::query(
            r#"
            UPDATE screens
            SET last_ping = ?,
                status = CASE status WHEN 'paused' THEN 'paused' ELSE 'online' END
            WHERE id = ?
            "#,
        )
        .bind(now)
        .bind(screen_id)
        .execute(&self.pool)
        .await?;

        self.require(screen_id).await
    }

    async fn set_status(&self, screen_id: &str, status: ScreenStatus) -> Result<Screen> {
        sqlx::query("UPDATE screens SET status = ? WHERE id = ?")
            .bind(status)
            .bind(screen_id)
            .execute(&self.pool)
            .await?;

        self.require(screen_id).await
    }

    async fn toggle_pause(&self, screen_id: &str) -> Result<Screen> {
        sqlx::query(
            r#"
            UPDATE screens
            SET status = CASE status WHEN 'paused' THEN 'online' ELSE 'paused' END
            WHERE id = ?
            "#,
        )
        .bind(screen_id)
        .execute(&self.pool)
        .await?;

        self.require(screen_id).await
    }
}
