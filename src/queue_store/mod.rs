//! QueueStore - canonical per-screen photo queues
//!
//! ## Responsibilities
//!
//! - Ordered queue per screen plus the shared global pool
//! - add / remove / reorder / skip / consume, each one atomic unit
//! - Change notifications to the RealtimeHub after every committed mutation
//!
//! ## Design Principles
//!
//! - Sole writer of positions: Display Clients and the Control Panel both
//!   mutate through here
//! - Positions in a scope are always `0..N` between operations
//! - Notifications are published after commit and only as hints

mod backend;
mod memory;
pub mod ordering;
mod repository;
mod types;

pub use backend::QueueBackend;
pub use memory::{approved_photo, pending_photo, MemoryQueueBackend};
pub use repository::QueueRepository;
pub use types::*;

use crate::error::Result;
use crate::realtime_hub::{ChangeEvent, ChangeNotification, ChangeTable, RealtimeHub};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// QueueStore instance
pub struct QueueStore {
    backend: Arc<dyn QueueBackend>,
    realtime: Arc<RealtimeHub>,
}

impl QueueStore {
    /// Create new QueueStore
    pub fn new(backend: Arc<dyn QueueBackend>, realtime: Arc<RealtimeHub>) -> Self {
        Self { backend, realtime }
    }

    async fn notify(&self, event: ChangeEvent, entry: &QueueEntry) {
        self.realtime
            .publish(ChangeNotification::new(
                ChangeTable::QueueEntries,
                event,
                entry.id.clone(),
                entry.screen_id.as_deref(),
            ))
            .await;
    }

    /// Add a photo to a queue; append when `position` is None
    pub async fn add_to_queue(
        &self,
        scope: &QueueScope,
        photo_id: &str,
        position: Option<i32>,
    ) -> Result<QueueEntry> {
        let entry = self.backend.add(scope, photo_id, position).await?;
        tracing::info!(
            scope = %scope,
            entry_id = %entry.id,
            photo_id = %photo_id,
            position = entry.position,
            "Photo queued"
        );
        self.notify(ChangeEvent::Insert, &entry).await;
        Ok(entry)
    }

    /// Remove an entry and compact the queue
    pub async fn remove_from_queue(&self, scope: &QueueScope, entry_id: &str) -> Result<QueueEntry> {
        let entry = self.backend.remove(scope, entry_id).await?;
        tracing::info!(scope = %scope, entry_id = %entry_id, position = entry.position, "Queue entry removed");
        self.notify(ChangeEvent::Delete, &entry).await;
        Ok(entry)
    }

    /// Move an entry; no-op (and no notification) when the position is unchanged
    pub async fn reorder_queue_item(
        &self,
        scope: &QueueScope,
        entry_id: &str,
        new_position: i32,
    ) -> Result<Reordered> {
        let reordered = self.backend.reorder(scope, entry_id, new_position).await?;
        if reordered.moved() {
            tracing::info!(
                scope = %scope,
                entry_id = %entry_id,
                from = reordered.previous_position,
                to = reordered.entry.position,
                "Queue entry reordered"
            );
            self.notify(ChangeEvent::Update, &reordered.entry).await;
        }
        Ok(reordered)
    }

    /// Drop whatever is at position 0
    pub async fn skip_current_photo(&self, scope: &QueueScope) -> Result<QueueEntry> {
        let entry = self.backend.skip_current(scope).await?;
        tracing::info!(scope = %scope, entry_id = %entry.id, "Current photo skipped");
        self.notify(ChangeEvent::Delete, &entry).await;
        Ok(entry)
    }

    /// Queue ordered by position ascending
    pub async fn get_screen_queue(&self, scope: &QueueScope, limit: usize) -> Result<Vec<QueuedPhoto>> {
        self.backend.list(scope, limit).await
    }

    pub async fn queue_length(&self, scope: &QueueScope) -> Result<usize> {
        self.backend.count(scope).await
    }

    /// Approved photos not yet queued in `scope`, newest approval first
    pub async fn get_available_photos(&self, scope: &QueueScope, limit: usize) -> Result<Vec<Photo>> {
        self.backend.available_photos(scope, limit).await
    }

    /// Lease global-pool entries to a screen
    pub async fn claim_global(
        &self,
        screen_id: &str,
        limit: usize,
        ttl: Duration,
    ) -> Result<Vec<QueuedPhoto>> {
        self.backend.claim_global(screen_id, limit, ttl, Utc::now()).await
    }

    /// Mark an entry displayed and remove it
    pub async fn consume_entry(&self, entry_id: &str, now: DateTime<Utc>) -> Result<QueueEntry> {
        let entry = self.backend.consume(entry_id, now).await?;
        tracing::debug!(
            entry_id = %entry_id,
            screen_id = ?entry.screen_id,
            photo_id = %entry.photo_id,
            "Queue entry consumed"
        );
        self.notify(ChangeEvent::Delete, &entry).await;
        Ok(entry)
    }

    /// Best-effort display counter bump; lost updates under races are tolerated
    pub async fn increment_displayed_count(&self, photo_id: &str) -> Result<()> {
        self.backend.increment_displayed_count(photo_id).await
    }

    pub async fn get_photo(&self, photo_id: &str) -> Result<Option<Photo>> {
        self.backend.get_photo(photo_id).await
    }
}
