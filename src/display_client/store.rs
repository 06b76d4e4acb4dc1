//! Display Client collaborators
//!
//! What a display needs from the rest of the system: queue reads and
//! consumption, screen heartbeat, and the realtime change feed.

use super::machine::FetchOrigin;
use crate::error::Result;
use crate::queue_store::{QueueScope, QueueStore, QueuedPhoto};
use crate::realtime_hub::{ChangeNotification, RealtimeHub, Subscription};
use crate::screen_registry::{Screen, ScreenRegistry};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Queue and screen access for one display
#[async_trait]
pub trait DisplayStore: Send + Sync {
    /// Up to `limit` entries, position ascending; global pool reads lease
    /// the returned entries to `screen_id`
    async fn fetch(
        &self,
        screen_id: &str,
        origin: FetchOrigin,
        limit: usize,
    ) -> Result<Vec<QueuedPhoto>>;

    /// Consume the entry, then bump the photo's counter (best-effort)
    async fn mark_displayed(&self, displayed: &QueuedPhoto) -> Result<()>;

    async fn heartbeat(&self, screen_id: &str) -> Result<Screen>;

    async fn go_offline(&self, screen_id: &str) -> Result<()>;

    async fn screen(&self, screen_id: &str) -> Result<Screen>;
}

/// Change feed as seen by a display
#[async_trait]
pub trait RealtimeSource: Send + Sync {
    async fn subscribe(
        &self,
        label: &str,
        subscriptions: Vec<Subscription>,
    ) -> Result<(Uuid, mpsc::UnboundedReceiver<ChangeNotification>)>;

    async fn unsubscribe(&self, id: &Uuid);
}

#[async_trait]
impl RealtimeSource for RealtimeHub {
    async fn subscribe(
        &self,
        label: &str,
        subscriptions: Vec<Subscription>,
    ) -> Result<(Uuid, mpsc::UnboundedReceiver<ChangeNotification>)> {
        Ok(RealtimeHub::subscribe(self, label, subscriptions).await)
    }

    async fn unsubscribe(&self, id: &Uuid) {
        RealtimeHub::unsubscribe(self, id).await
    }
}

/// DisplayStore backed by in-process QueueStore + ScreenRegistry
pub struct LocalDisplayStore {
    queue: Arc<QueueStore>,
    screens: Arc<ScreenRegistry>,
    claim_ttl: Duration,
}

impl LocalDisplayStore {
    pub fn new(queue: Arc<QueueStore>, screens: Arc<ScreenRegistry>, claim_ttl: Duration) -> Self {
        Self {
            queue,
            screens,
            claim_ttl,
        }
    }
}

#[async_trait]
impl DisplayStore for LocalDisplayStore {
    async fn fetch(
        &self,
        screen_id: &str,
        origin: FetchOrigin,
        limit: usize,
    ) -> Result<Vec<QueuedPhoto>> {
        match origin {
            FetchOrigin::Screen => {
                self.queue
                    .get_screen_queue(&QueueScope::Screen(screen_id.to_string()), limit)
                    .await
            }
            FetchOrigin::GlobalPool => {
                self.queue
                    .claim_global(screen_id, limit, self.claim_ttl)
                    .await
            }
        }
    }

    async fn mark_displayed(&self, displayed: &QueuedPhoto) -> Result<()> {
        self.queue
            .consume_entry(&displayed.entry.id, Utc::now())
            .await?;

        if let Err(e) = self
            .queue
            .increment_displayed_count(&displayed.photo.id)
            .await
        {
            tracing::warn!(
                photo_id = %displayed.photo.id,
                error = %e,
                "Failed to increment displayed_count"
            );
        }
        Ok(())
    }

    async fn heartbeat(&self, screen_id: &str) -> Result<Screen> {
        self.screens.heartbeat(screen_id, Utc::now()).await
    }

    async fn go_offline(&self, screen_id: &str) -> Result<()> {
        self.screens.go_offline(screen_id).await.map(|_| ())
    }

    async fn screen(&self, screen_id: &str) -> Result<Screen> {
        self.screens.get_screen(screen_id).await
    }
}
