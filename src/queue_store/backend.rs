//! Storage seam for the Queue Store
//!
//! Each mutating method is one atomic unit: implementations must hold
//! whatever lock or transaction they need so that positions in the touched
//! scope are `0..N` again before anyone else can observe them.

use super::types::*;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Insert `photo_id` into `scope`; append when `position` is None
    async fn add(
        &self,
        scope: &QueueScope,
        photo_id: &str,
        position: Option<i32>,
    ) -> Result<QueueEntry>;

    /// Delete `entry_id` from `scope` and compact the tail
    async fn remove(&self, scope: &QueueScope, entry_id: &str) -> Result<QueueEntry>;

    /// Move `entry_id` to `new_position`
    async fn reorder(
        &self,
        scope: &QueueScope,
        entry_id: &str,
        new_position: i32,
    ) -> Result<Reordered>;

    /// Remove the entry at position 0
    async fn skip_current(&self, scope: &QueueScope) -> Result<QueueEntry>;

    /// Entries ordered by position ascending, joined with their photos
    async fn list(&self, scope: &QueueScope, limit: usize) -> Result<Vec<QueuedPhoto>>;

    /// Number of entries in `scope`
    async fn count(&self, scope: &QueueScope) -> Result<usize>;

    /// Lease up to `limit` unclaimed (or expired) global-pool entries to `screen_id`
    async fn claim_global(
        &self,
        screen_id: &str,
        limit: usize,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueuedPhoto>>;

    /// Set `displayed_at` (only if unset), archive, delete and compact.
    ///
    /// A second consume of the same id fails with `NotFound`.
    async fn consume(&self, entry_id: &str, now: DateTime<Utc>) -> Result<QueueEntry>;

    /// Approved photos without an entry in `scope`, newest approval first
    async fn available_photos(&self, scope: &QueueScope, limit: usize) -> Result<Vec<Photo>>;

    /// Best-effort `displayed_count += 1`
    async fn increment_displayed_count(&self, photo_id: &str) -> Result<()>;

    async fn get_photo(&self, photo_id: &str) -> Result<Option<Photo>>;
}
