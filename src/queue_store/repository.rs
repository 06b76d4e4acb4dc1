//! Queue Store Repository
//!
//! MySQL access layer. Each mutation runs inside one transaction that first
//! takes a row lock on the scope's `queue_locks` row, so concurrent admin
//! edits and display consumption of the same queue serialize. Position
//! shifts are ranged UPDATEs ordered so the unique `(screen_key, position)`
//! index never sees a transient duplicate.

use super::backend::QueueBackend;
use super::ordering::{self, PositionShift};
use super::types::*;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{MySql, MySqlPool, Transaction};
use uuid::Uuid;

/// Joined queue_entries + photos row
#[derive(Debug, sqlx::FromRow)]
struct QueuedPhotoRow {
    entry_id: String,
    screen_id: Option<String>,
    photo_id: String,
    position: i32,
    displayed_at: Option<DateTime<Utc>>,
    entry_created_at: DateTime<Utc>,
    claimed_by: Option<String>,
    claim_expires_at: Option<DateTime<Utc>>,
    source: PhotoSource,
    status: PhotoStatus,
    file_url: String,
    thumbnail_url: Option<String>,
    displayed_count: i64,
    photo_created_at: DateTime<Utc>,
    approved_at: Option<DateTime<Utc>>,
}

impl From<QueuedPhotoRow> for QueuedPhoto {
    fn from(r: QueuedPhotoRow) -> Self {
        QueuedPhoto {
            entry: QueueEntry {
                id: r.entry_id,
                screen_id: r.screen_id,
                photo_id: r.photo_id.clone(),
                position: r.position,
                displayed_at: r.displayed_at,
                created_at: r.entry_created_at,
                claimed_by: r.claimed_by,
                claim_expires_at: r.claim_expires_at,
            },
            photo: Photo {
                id: r.photo_id,
                source: r.source,
                status: r.status,
                file_url: r.file_url,
                thumbnail_url: r.thumbnail_url,
                displayed_count: r.displayed_count,
                created_at: r.photo_created_at,
                approved_at: r.approved_at,
            },
        }
    }
}

const LOCK_SCOPE_SQL: &str =
    "INSERT INTO queue_locks (screen_key) VALUES (?) ON DUPLICATE KEY UPDATE screen_key = screen_key";

/// Queue repository for database operations
#[derive(Clone)]
pub struct QueueRepository {
    pool: MySqlPool,
}

impl QueueRepository {
    /// Create new repository
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    const ENTRY_COLUMNS: &'static str = r#"
        id, screen_id, photo_id, position, displayed_at, created_at,
        claimed_by, claim_expires_at
    "#;

    const PHOTO_COLUMNS: &'static str = r#"
        id, source, status, file_url, thumbnail_url, displayed_count,
        created_at, approved_at
    "#;

    const JOINED_COLUMNS: &'static str = r#"
        q.id AS entry_id, q.screen_id, q.photo_id, q.position, q.displayed_at,
        q.created_at AS entry_created_at, q.claimed_by, q.claim_expires_at,
        p.source, p.status, p.file_url, p.thumbnail_url, p.displayed_count,
        p.created_at AS photo_created_at, p.approved_at
    "#;

    // ========================================
    // Transaction helpers
    // ========================================

    /// Serialize all writers of one scope behind a single row lock.
    ///
    /// One upsert takes the exclusive record lock whether or not the row
    /// exists; no shared lock is ever held on it.
    async fn lock_scope(tx: &mut Transaction<'_, MySql>, scope: &QueueScope) -> Result<()> {
        sqlx::query(LOCK_SCOPE_SQL)
            .bind(scope.key())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn scope_len(tx: &mut Transaction<'_, MySql>, scope: &QueueScope) -> Result<usize> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM queue_entries WHERE screen_key = ?")
                .bind(scope.key())
                .fetch_one(&mut **tx)
                .await?;
        Ok(count as usize)
    }

    async fn entry_in_tx(
        tx: &mut Transaction<'_, MySql>,
        scope: &QueueScope,
        entry_id: &str,
    ) -> Result<Option<QueueEntry>> {
        let query = format!(
            "SELECT {} FROM queue_entries WHERE id = ? AND screen_key = ?",
            Self::ENTRY_COLUMNS
        );
        let entry = sqlx::query_as::<_, QueueEntry>(&query)
            .bind(entry_id)
            .bind(scope.key())
            .fetch_optional(&mut **tx)
            .await?;
        Ok(entry)
    }

    /// Ranged position shift; rows move in the direction that keeps the unique index satisfied
    async fn apply_shift(
        tx: &mut Transaction<'_, MySql>,
        scope: &QueueScope,
        shift: PositionShift,
    ) -> Result<u64> {
        let mut sql = String::from(
            "UPDATE queue_entries SET position = position + ? WHERE screen_key = ? AND position >= ?",
        );
        if shift.end.is_some() {
            sql.push_str(" AND position <= ?");
        }
        sql.push_str(if shift.delta > 0 {
            " ORDER BY position DESC"
        } else {
            " ORDER BY position ASC"
        });

        let mut query = sqlx::query(&sql)
            .bind(shift.delta)
            .bind(scope.key())
            .bind(shift.start);
        if let Some(end) = shift.end {
            query = query.bind(end);
        }

        let result = query.execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }

    /// Delete an entry that is already locked and compact the remainder
    async fn delete_and_compact(
        tx: &mut Transaction<'_, MySql>,
        entry: &QueueEntry,
    ) -> Result<()> {
        let scope = entry.scope();
        let len = Self::scope_len(tx, &scope).await?;

        sqlx::query("DELETE FROM queue_entries WHERE id = ?")
            .bind(&entry.id)
            .execute(&mut **tx)
            .await?;

        if let Some(shift) = ordering::plan_remove(len, entry.position).shift {
            Self::apply_shift(tx, &scope, shift).await?;
        }
        Ok(())
    }

    async fn fetch_entry(&self, entry_id: &str) -> Result<Option<QueueEntry>> {
        let query = format!(
            "SELECT {} FROM queue_entries WHERE id = ?",
            Self::ENTRY_COLUMNS
        );
        let entry = sqlx::query_as::<_, QueueEntry>(&query)
            .bind(entry_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(entry)
    }
}

#[async_trait]
impl QueueBackend for QueueRepository {
    async fn add(
        &self,
        scope: &QueueScope,
        photo_id: &str,
        position: Option<i32>,
    ) -> Result<QueueEntry> {
        let mut tx = self.pool.begin().await?;
        Self::lock_scope(&mut tx, scope).await?;

        let status: Option<PhotoStatus> =
            sqlx::query_scalar("SELECT status FROM photos WHERE id = ?")
                .bind(photo_id)
                .fetch_optional(&mut *tx)
                .await?;
        match status {
            None => return Err(Error::NotFound(format!("Photo {} not found", photo_id))),
            Some(PhotoStatus::Approved) => {}
            Some(_) => {
                return Err(Error::Validation(format!(
                    "Photo {} is not approved",
                    photo_id
                )))
            }
        }

        let duplicate: Option<String> = sqlx::query_scalar(
            "SELECT id FROM queue_entries WHERE screen_key = ? AND photo_id = ?",
        )
        .bind(scope.key())
        .bind(photo_id)
        .fetch_optional(&mut *tx)
        .await?;
        if duplicate.is_some() {
            return Err(Error::AlreadyQueued {
                photo_id: photo_id.to_string(),
                scope: scope.to_string(),
            });
        }

        let len = Self::scope_len(&mut tx, scope).await?;
        let plan = ordering::plan_insert(len, position)?;
        if let Some(shift) = plan.shift {
            Self::apply_shift(&mut tx, scope, shift).await?;
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO queue_entries (id, screen_id, photo_id, position, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(scope.screen_id())
        .bind(photo_id)
        .bind(plan.position)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => Error::AlreadyQueued {
                photo_id: photo_id.to_string(),
                scope: scope.to_string(),
            },
            _ => Error::from(e),
        })?;

        tx.commit().await?;

        tracing::debug!(
            scope = %scope,
            entry_id = %id,
            photo_id = %photo_id,
            position = plan.position,
            "Queue entry inserted"
        );

        self.fetch_entry(&id)
            .await?
            .ok_or_else(|| Error::NotFound("Entry not found after insert".to_string()))
    }

    async fn remove(&self, scope: &QueueScope, entry_id: &str) -> Result<QueueEntry> {
        let mut tx = self.pool.begin().await?;
        Self::lock_scope(&mut tx, scope).await?;

        let entry = Self::entry_in_tx(&mut tx, scope, entry_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Entry {} not in {}", entry_id, scope)))?;
        Self::delete_and_compact(&mut tx, &entry).await?;

        tx.commit().await?;
        Ok(entry)
    }

    async fn reorder(
        &self,
        scope: &QueueScope,
        entry_id: &str,
        new_position: i32,
    ) -> Result<Reordered> {
        let mut tx = self.pool.begin().await?;
        Self::lock_scope(&mut tx, scope).await?;

        let mut entry = Self::entry_in_tx(&mut tx, scope, entry_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Entry {} not in {}", entry_id, scope)))?;
        let len = Self::scope_len(&mut tx, scope).await?;
        let previous_position = entry.position;

        let plan = match ordering::plan_reorder(len, previous_position, new_position)? {
            Some(plan) => plan,
            None => {
                tx.commit().await?;
                return Ok(Reordered {
                    entry,
                    previous_position,
                });
            }
        };

        // park the moved row outside 0..len while the others shift
        sqlx::query("UPDATE queue_entries SET position = -1 WHERE id = ?")
            .bind(&entry.id)
            .execute(&mut *tx)
            .await?;
        Self::apply_shift(&mut tx, scope, plan.shift).await?;
        sqlx::query("UPDATE queue_entries SET position = ? WHERE id = ?")
            .bind(plan.to)
            .bind(&entry.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        entry.position = plan.to;
        Ok(Reordered {
            entry,
            previous_position,
        })
    }

    async fn skip_current(&self, scope: &QueueScope) -> Result<QueueEntry> {
        let mut tx = self.pool.begin().await?;
        Self::lock_scope(&mut tx, scope).await?;

        let query = format!(
            "SELECT {} FROM queue_entries WHERE screen_key = ? AND position = 0",
            Self::ENTRY_COLUMNS
        );
        let head = sqlx::query_as::<_, QueueEntry>(&query)
            .bind(scope.key())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::EmptyQueue(format!("Nothing to skip in {}", scope)))?;
        Self::delete_and_compact(&mut tx, &head).await?;

        tx.commit().await?;
        Ok(head)
    }

    async fn list(&self, scope: &QueueScope, limit: usize) -> Result<Vec<QueuedPhoto>> {
        let query = format!(
            r#"
            SELECT {} FROM queue_entries q
            JOIN photos p ON p.id = q.photo_id
            WHERE q.screen_key = ?
            ORDER BY q.position ASC
            LIMIT ?
            "#,
            Self::JOINED_COLUMNS
        );
        let rows = sqlx::query_as::<_, QueuedPhotoRow>(&query)
            .bind(scope.key())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count(&self, scope: &QueueScope) -> Result<usize> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM queue_entries WHERE screen_key = ?")
                .bind(scope.key())
                .fetch_one(&self.pool)
                .await?;
        Ok(count as usize)
    }

    async fn claim_global(
        &self,
        screen_id: &str,
        limit: usize,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueuedPhoto>> {
        // single-statement compare-and-swap on the lease columns
        let claimed = sqlx::query(
            r#"
            UPDATE queue_entries
            SET claimed_by = ?, claim_expires_at = ?
            WHERE screen_key = ?
              AND (claimed_by IS NULL OR claimed_by = ? OR claim_expires_at <= ?)
            ORDER BY position ASC
            LIMIT ?
            "#,
        )
        .bind(screen_id)
        .bind(now + ttl)
        .bind(GLOBAL_SCREEN_KEY)
        .bind(screen_id)
        .bind(now)
        .bind(limit as i64)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if claimed == 0 {
            return Ok(Vec::new());
        }

        let query = format!(
            r#"
            SELECT {} FROM queue_entries q
            JOIN photos p ON p.id = q.photo_id
            WHERE q.screen_key = ? AND q.claimed_by = ? AND q.claim_expires_at > ?
            ORDER BY q.position ASC
            LIMIT ?
            "#,
            Self::JOINED_COLUMNS
        );
        let rows = sqlx::query_as::<_, QueuedPhotoRow>(&query)
            .bind(GLOBAL_SCREEN_KEY)
            .bind(screen_id)
            .bind(now)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!(screen_id = %screen_id, claimed = rows.len(), "Global pool entries leased");
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn consume(&self, entry_id: &str, now: DateTime<Utc>) -> Result<QueueEntry> {
        let scope = self
            .fetch_entry(entry_id)
            .await?
            .map(|e| e.scope())
            .ok_or_else(|| Error::NotFound(format!("Entry {} not found", entry_id)))?;

        let mut tx = self.pool.begin().await?;
        Self::lock_scope(&mut tx, &scope).await?;

        // set-once: a concurrent consumer loses here
        let marked = sqlx::query(
            "UPDATE queue_entries SET displayed_at = ? WHERE id = ? AND displayed_at IS NULL",
        )
        .bind(now)
        .bind(entry_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if marked == 0 {
            return Err(Error::NotFound(format!("Entry {} not found", entry_id)));
        }

        let mut entry = Self::entry_in_tx(&mut tx, &scope, entry_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Entry {} not found", entry_id)))?;
        entry.displayed_at = Some(now);

        sqlx::query(
            r#"
            INSERT INTO display_history (entry_id, screen_id, photo_id, position, queued_at, displayed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.screen_id)
        .bind(&entry.photo_id)
        .bind(entry.position)
        .bind(entry.created_at)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        Self::delete_and_compact(&mut tx, &entry).await?;
        tx.commit().await?;

        Ok(entry)
    }

    async fn available_photos(&self, scope: &QueueScope, limit: usize) -> Result<Vec<Photo>> {
        let query = format!(
            r#"
            SELECT {} FROM photos p
            WHERE p.status = 'approved'
              AND NOT EXISTS (
                SELECT 1 FROM queue_entries q
                WHERE q.photo_id = p.id AND q.screen_key = ?
              )
            ORDER BY p.approved_at DESC
            LIMIT ?
            "#,
            Self::PHOTO_COLUMNS
        );
        let photos = sqlx::query_as::<_, Photo>(&query)
            .bind(scope.key())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(photos)
    }

    async fn increment_displayed_count(&self, photo_id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE photos SET displayed_count = displayed_count + 1 WHERE id = ?")
            .bind(photo_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Photo {} not found", photo_id)));
        }
        Ok(())
    }

    async fn get_photo(&self, photo_id: &str) -> Result<Option<Photo>> {
        let query = format!("SELECT {} FROM photos WHERE id = ?", Self::PHOTO_COLUMNS);
        let photo = sqlx::query_as::<_, Photo>(&query)
            .bind(photo_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(photo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_lock_is_exclusive_upsert() {
        let sql = LOCK_SCOPE_SQL.to_ascii_uppercase();
        assert!(sql.starts_with("INSERT INTO QUEUE_LOCKS"));
        assert!(sql.contains("ON DUPLICATE KEY UPDATE"));
        assert!(!sql.contains("IGNORE"));
        assert!(!sql.contains("LOCK IN SHARE MODE"));
    }
}
