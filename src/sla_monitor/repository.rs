//! SLA Monitor Repository
//!
//! Reads pending photos and the moderation action log.

use super::{ModerationSample, ModerationSource, PendingPhoto};
use crate::error::Result;
use async_trait::async_trait;
use sqlx::MySqlPool;

#[derive(Clone)]
pub struct SlaRepository {
    pool: MySqlPool,
}

impl SlaRepository {
    /// Create new repository
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ModerationSource for SlaRepository {
    async fn pending_photos(&self) -> Result<Vec<PendingPhoto>> {
        let rows = sqlx::query_as::<_, PendingPhoto>(
            "SELECT id AS photo_id, created_at FROM photos WHERE status = 'pending'",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn recent_moderation(&self, limit: usize) -> Result<Vec<ModerationSample>> {
        let rows = sqlx::query_as::<_, ModerationSample>(
            r#"
            SELECT m.photo_id, p.created_at AS photo_created_at, m.moderated_at
            FROM moderation_actions m
            JOIN photos p ON p.id = m.photo_id
            ORDER BY m.moderated_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
