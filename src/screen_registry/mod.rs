//! ScreenRegistry - screen liveness and pause state
//!
//! ## Responsibilities
//!
//! - Heartbeat writes (`last_ping`, status online unless paused)
//! - Best-effort offline write on clean display shutdown
//! - Pause/resume toggle
//! - Derived liveness: a stale `last_ping` reads as offline
//!
//! Every stored status change is announced on the `screens` table of the
//! RealtimeHub so display clients re-read their screen.

mod memory;
mod repository;
mod types;

pub use memory::MemoryScreenRegistry;
pub use repository::ScreenRepository;
pub use types::*;

use crate::error::{Error, Result};
use crate::realtime_hub::{ChangeEvent, ChangeNotification, ChangeTable, RealtimeHub};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Storage seam for screen records
#[async_trait]
pub trait ScreenBackend: Send + Sync {
    async fn get_screen(&self, screen_id: &str) -> Result<Option<Screen>>;

    async fn list_screens(&self) -> Result<Vec<Screen>>;

    /// `last_ping = now`; status becomes online unless paused
    async fn heartbeat(&self, screen_id: &str, now: DateTime<Utc>) -> Result<Screen>;

    async fn set_status(&self, screen_id: &str, status: ScreenStatus) -> Result<Screen>;

    /// online/offline -> paused, paused -> online, in one atomic write
    async fn toggle_pause(&self, screen_id: &str) -> Result<Screen>;
}

/// ScreenRegistry instance
pub struct ScreenRegistry {
    backend: Arc<dyn ScreenBackend>,
    realtime: Arc<RealtimeHub>,
    stale_after: Duration,
}

impl ScreenRegistry {
    /// Create new ScreenRegistry
    pub fn new(
        backend: Arc<dyn ScreenBackend>,
        realtime: Arc<RealtimeHub>,
        stale_after: Duration,
    ) -> Self {
        Self {
            backend,
            realtime,
            stale_after,
        }
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    async fn notify(&self, screen: &Screen) {
        self.realtime
            .publish(ChangeNotification::new(
                ChangeTable::Screens,
                ChangeEvent::Update,
                screen.id.clone(),
                Some(&screen.id),
            ))
            .await;
    }

    pub async fn get_screen(&self, screen_id: &str) -> Result<Screen> {
        self.backend
            .get_screen(screen_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Screen {} not found", screen_id)))
    }

    /// Screen with its derived liveness
    pub async fn view(&self, screen_id: &str, now: DateTime<Utc>) -> Result<ScreenView> {
        let screen = self.get_screen(screen_id).await?;
        Ok(ScreenView::new(screen, now, self.stale_after))
    }

    pub async fn list_views(&self, now: DateTime<Utc>) -> Result<Vec<ScreenView>> {
        let screens = self.backend.list_screens().await?;
        Ok(screens
            .into_iter()
            .map(|s| ScreenView::new(s, now, self.stale_after))
            .collect())
    }

    /// Heartbeat from a display; publishes only when the stored status changed
    pub async fn heartbeat(&self, screen_id: &str, now: DateTime<Utc>) -> Result<Screen> {
        let before = self.get_screen(screen_id).await?;
        let screen = self.backend.heartbeat(screen_id, now).await?;
        tracing::debug!(screen_id = %screen_id, status = screen.status.as_str(), "Screen heartbeat");
        if before.status != screen.status {
            tracing::info!(
                screen_id = %screen_id,
                from = before.status.as_str(),
                to = screen.status.as_str(),
                "Screen status changed"
            );
            self.notify(&screen).await;
        }
        Ok(screen)
    }

    /// Clean shutdown write
    pub async fn go_offline(&self, screen_id: &str) -> Result<Screen> {
        let screen = self
            .backend
            .set_status(screen_id, ScreenStatus::Offline)
            .await?;
        tracing::info!(screen_id = %screen_id, "Screen went offline");
        self.notify(&screen).await;
        Ok(screen)
    }

    pub async fn toggle_pause(&self, screen_id: &str) -> Result<Screen> {
        let screen = self.backend.toggle_pause(screen_id).await?;
        tracing::info!(screen_id = %screen_id, status = screen.status.as_str(), "Screen pause toggled");
        self.notify(&screen).await;
        Ok(screen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime_hub::{ScreenFilter, Subscription};

    async fn registry() -> (ScreenRegistry, Arc<RealtimeHub>) {
        let backend = Arc::new(MemoryScreenRegistry::new());
        backend.insert_screen(Screen::new("s1", "Lobby")).await;
        let hub = Arc::new(RealtimeHub::new());
        (
            ScreenRegistry::new(backend, hub.clone(), Duration::seconds(90)),
            hub,
        )
    }

    #[tokio::test]
    async fn test_heartbeat_brings_online_and_keeps_pause() {
        let (registry, _) = registry().await;
        let now = Utc::now();

        let screen = registry.heartbeat("s1", now).await.unwrap();
        assert_eq!(screen.status, ScreenStatus::Online);
        assert_eq!(screen.last_ping, Some(now));

        registry.toggle_pause("s1").await.unwrap();
        let screen = registry.heartbeat("s1", now).await.unwrap();
        assert_eq!(screen.status, ScreenStatus::Paused);
    }

    #[tokio::test]
    async fn test_toggle_publishes_screen_update() {
        let (registry, hub) = registry().await;
        let (_, mut rx) = hub
            .subscribe(
                "panel",
                vec![Subscription::new(
                    ChangeTable::Screens,
                    ChangeEvent::Update,
                    ScreenFilter::Screen("s1".into()),
                )],
            )
            .await;

        let screen = registry.toggle_pause("s1").await.unwrap();
        assert_eq!(screen.status, ScreenStatus::Paused);
        assert_eq!(rx.try_recv().unwrap().record_id, "s1");
    }

    #[tokio::test]
    async fn test_repeat_heartbeat_is_quiet() {
        let (registry, hub) = registry().await;
        let now = Utc::now();
        registry.heartbeat("s1", now).await.unwrap();
        let published = hub.published_count();
        registry
            .heartbeat("s1", now + Duration::seconds(30))
            .await
            .unwrap();
        assert_eq!(hub.published_count(), published);
    }

    #[tokio::test]
    async fn test_view_reports_stale_screen_offline() {
        let (registry, _) = registry().await;
        let now = Utc::now();
        registry.heartbeat("s1", now).await.unwrap();

        let view = registry.view("s1", now + Duration::seconds(60)).await.unwrap();
        assert_eq!(view.effective_status, ScreenStatus::Online);

        let view = registry
            .view("s1", now + Duration::seconds(120))
            .await
            .unwrap();
        assert_eq!(view.screen.status, ScreenStatus::Online);
        assert_eq!(view.effective_status, ScreenStatus::Offline);
    }

    #[tokio::test]
    async fn test_unknown_screen() {
        let (registry, _) = registry().await;
        assert!(matches!(
            registry.toggle_pause("nope").await,
            Err(Error::NotFound(_))
        ));
    }
}
