//! ControlPanel Service
//!
//! Administrative queue operations and monitoring reads. Mutations come
//! back as [`MutationResult`] values so an operator session never sees a
//! failure as anything but a transient notice.

use super::types::*;
use crate::error::Result;
use crate::models::MutationResult;
use crate::queue_store::{Photo, QueueEntry, QueueScope, QueueStore, QueuedPhoto, Reordered};
use crate::ratio_monitor;
use crate::screen_registry::{Screen, ScreenRegistry, ScreenStatus, ScreenView};
use crate::sla_monitor::SlaMonitor;
use chrono::Utc;
use std::sync::Arc;

/// Most entries the ratio is computed over
pub const RATIO_WINDOW: usize = 500;

/// ControlPanel instance
pub struct ControlPanel {
    queue: Arc<QueueStore>,
    screens: Arc<ScreenRegistry>,
    sla: Arc<SlaMonitor>,
    authorizer: Arc<dyn Authorizer>,
}

impl ControlPanel {
    /// Create new ControlPanel
    pub fn new(
        queue: Arc<QueueStore>,
        screens: Arc<ScreenRegistry>,
        sla: Arc<SlaMonitor>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        Self {
            queue,
            screens,
            sla,
            authorizer,
        }
    }

    fn finish<T>(operation: &str, caller: &Caller, result: Result<T>) -> MutationResult<T> {
        if let Err(e) = &result {
            tracing::warn!(
                operation = operation,
                user_id = %caller.user_id,
                error_code = e.code(),
                error = %e,
                "Control panel mutation failed"
            );
        }
        result.into()
    }

    async fn require_screen(&self, scope: &QueueScope) -> Result<()> {
        if let QueueScope::Screen(id) = scope {
            self.screens.get_screen(id).await?;
        }
        Ok(())
    }

    // ========================================
    // Mutations
    // ========================================

    pub async fn add_to_queue(
        &self,
        caller: &Caller,
        screen_id: Option<&str>,
        photo_id: &str,
        position: Option<i32>,
    ) -> MutationResult<QueueEntry> {
        let scope = QueueScope::from_screen_id(screen_id);
        let result = async {
            self.authorizer
                .authorize(caller, PanelAction::ManageQueue)
                .await?;
            self.require_screen(&scope).await?;
            self.queue.add_to_queue(&scope, photo_id, position).await
        }
        .await;
        Self::finish("add_to_queue", caller, result)
    }

    pub async fn remove_from_queue(
        &self,
        caller: &Caller,
        screen_id: Option<&str>,
        entry_id: &str,
    ) -> MutationResult<QueueEntry> {
        let scope = QueueScope::from_screen_id(screen_id);
        let result = async {
            self.authorizer
                .authorize(caller, PanelAction::ManageQueue)
                .await?;
            self.queue.remove_from_queue(&scope, entry_id).await
        }
        .await;
        Self::finish("remove_from_queue", caller, result)
    }

    pub async fn reorder_queue_item(
        &self,
        caller: &Caller,
        screen_id: Option<&str>,
        entry_id: &str,
        new_position: i32,
    ) -> MutationResult<Reordered> {
        let scope = QueueScope::from_screen_id(screen_id);
        let result = async {
            self.authorizer
                .authorize(caller, PanelAction::ManageQueue)
                .await?;
            self.queue
                .reorder_queue_item(&scope, entry_id, new_position)
                .await
        }
        .await;
        Self::finish("reorder_queue_item", caller, result)
    }

    pub async fn skip_current_photo(
        &self,
        caller: &Caller,
        screen_id: Option<&str>,
    ) -> MutationResult<QueueEntry> {
        let scope = QueueScope::from_screen_id(screen_id);
        let result = async {
            self.authorizer
                .authorize(caller, PanelAction::ManageQueue)
                .await?;
            self.queue.skip_current_photo(&scope).await
        }
        .await;
        Self::finish("skip_current_photo", caller, result)
    }

    pub async fn toggle_pause(&self, caller: &Caller, screen_id: &str) -> MutationResult<Screen> {
        let result = async {
            self.authorizer
                .authorize(caller, PanelAction::ManageScreens)
                .await?;
            self.screens.toggle_pause(screen_id).await
        }
        .await;
        Self::finish("toggle_pause", caller, result)
    }

    // ========================================
    // Reads
    // ========================================

    pub async fn get_screen_queue(
        &self,
        caller: &Caller,
        screen_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<QueuedPhoto>> {
        self.authorizer
            .authorize(caller, PanelAction::ViewStats)
            .await?;
        self.queue
            .get_screen_queue(&QueueScope::from_screen_id(screen_id), limit)
            .await
    }

    pub async fn get_available_photos(
        &self,
        caller: &Caller,
        screen_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Photo>> {
        self.authorizer
            .authorize(caller, PanelAction::ViewStats)
            .await?;
        self.queue
            .get_available_photos(&QueueScope::from_screen_id(screen_id), limit)
            .await
    }

    pub async fn list_screens(&self, caller: &Caller) -> Result<Vec<ScreenView>> {
        self.authorizer
            .authorize(caller, PanelAction::ViewStats)
            .await?;
        self.screens.list_views(Utc::now()).await
    }

    pub async fn get_screen_queue_stats(
        &self,
        caller: &Caller,
        screen_id: &str,
    ) -> Result<ScreenQueueStats> {
        self.authorizer
            .authorize(caller, PanelAction::ViewStats)
            .await?;

        let view = self.screens.view(screen_id, Utc::now()).await?;
        let scope = QueueScope::Screen(screen_id.to_string());
        let queue_length = self.queue.queue_length(&scope).await?;
        let window = self.queue.get_screen_queue(&scope, RATIO_WINDOW).await?;

        Ok(ScreenQueueStats {
            screen_id: view.screen.id,
            name: view.screen.name,
            status: view.screen.status,
            effective_status: view.effective_status,
            last_ping: view.screen.last_ping,
            queue_length,
            ratio: ratio_monitor::compute_for_queue(&window),
            current: window.into_iter().next(),
        })
    }

    pub async fn get_global_screen_stats(&self, caller: &Caller) -> Result<GlobalScreenStats> {
        self.authorizer
            .authorize(caller, PanelAction::ViewStats)
            .await?;

        let now = Utc::now();
        let views = self.screens.list_views(now).await?;

        let mut total_queued = 0;
        for view in &views {
            total_queued += self
                .queue
                .queue_length(&QueueScope::Screen(view.screen.id.clone()))
                .await?;
        }
        let global_pool_size = self.queue.queue_length(&QueueScope::Global).await?;
        let count = |status: ScreenStatus| views.iter().filter(|v| v.effective_status == status).count();

        Ok(GlobalScreenStats {
            total_screens: views.len(),
            online: count(ScreenStatus::Online),
            paused: count(ScreenStatus::Paused),
            offline: count(ScreenStatus::Offline),
            total_queued: total_queued + global_pool_size,
            global_pool_size,
            sla: self.sla.report(now).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::queue_store::{approved_photo, pending_photo, MemoryQueueBackend, PhotoSource};
    use crate::ratio_monitor::RatioStatus;
    use crate::realtime_hub::RealtimeHub;
    use crate::screen_registry::MemoryScreenRegistry;
    use chrono::Duration;

    struct Fixture {
        panel: ControlPanel,
        backend: Arc<MemoryQueueBackend>,
        screens: Arc<ScreenRegistry>,
    }

    async fn fixture(authorizer: Arc<dyn Authorizer>) -> Fixture {
        let backend = Arc::new(MemoryQueueBackend::new());
        let now = Utc::now();
        for i in 0..7 {
            backend
                .insert_photo(approved_photo(&format!("pro{}", i), PhotoSource::Photographer, now))
                .await;
        }
        for i in 0..3 {
            backend
                .insert_photo(approved_photo(&format!("guest{}", i), PhotoSource::User, now))
                .await;
        }

        let registry = Arc::new(MemoryScreenRegistry::new());
        registry.insert_screen(Screen::new("s1", "Stage")).await;
        registry.insert_screen(Screen::new("s2", "Bar")).await;

        let hub = Arc::new(RealtimeHub::new());
        let queue = Arc::new(QueueStore::new(backend.clone(), hub.clone()));
        let screens = Arc::new(ScreenRegistry::new(registry, hub, Duration::seconds(90)));
        let sla = Arc::new(SlaMonitor::new(backend.clone()));

        Fixture {
            panel: ControlPanel::new(queue, screens.clone(), sla, authorizer),
            backend,
            screens,
        }
    }

    #[tokio::test]
    async fn test_mutations_return_structured_failures() {
        let fx = fixture(Arc::new(AllowAll)).await;
        let caller = Caller::system();

        let added = fx.panel.add_to_queue(&caller, Some("s1"), "pro0", None).await;
        assert!(added.success);

        let dup = fx.panel.add_to_queue(&caller, Some("s1"), "pro0", None).await;
        assert!(!dup.success);
        assert!(dup.is_error_code("ALREADY_QUEUED"));

        let skipped = fx.panel.skip_current_photo(&caller, Some("s2")).await;
        assert!(skipped.is_error_code("EMPTY_QUEUE"));

        let missing = fx.panel.remove_from_queue(&caller, Some("s1"), "nope").await;
        assert!(missing.is_error_code("NOT_FOUND"));

        let unknown_screen = fx.panel.add_to_queue(&caller, Some("s9"), "pro1", None).await;
        assert!(unknown_screen.is_error_code("NOT_FOUND"));
    }

    #[tokio::test]
    async fn test_unauthorized_caller() {
        let fx = fixture(Arc::new(RoleAuthorizer::default())).await;
        let guest = Caller::new("guest", &[]);

        let result = fx.panel.toggle_pause(&guest, "s1").await;
        assert!(result.is_error_code("UNAUTHORIZED"));
        assert_eq!(
            fx.screens.get_screen("s1").await.unwrap().status,
            ScreenStatus::Offline
        );

        let err = fx.panel.get_global_screen_stats(&guest).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_screen_queue_stats() {
        let fx = fixture(Arc::new(AllowAll)).await;
        let caller = Caller::new("mod", &["moderator"]);
        for i in 0..7 {
            fx.panel
                .add_to_queue(&caller, Some("s1"), &format!("pro{}", i), None)
                .await;
        }
        for i in 0..3 {
            fx.panel
                .add_to_queue(&caller, Some("s1"), &format!("guest{}", i), None)
                .await;
        }
        fx.screens.heartbeat("s1", Utc::now()).await.unwrap();

        let stats = fx.panel.get_screen_queue_stats(&caller, "s1").await.unwrap();
        assert_eq!(stats.queue_length, 10);
        assert_eq!(stats.ratio.photographer_percentage, 70);
        assert_eq!(stats.ratio.user_percentage, 30);
        assert_eq!(stats.ratio.status, RatioStatus::OnTarget);
        assert_eq!(stats.effective_status, ScreenStatus::Online);
        assert_eq!(stats.current.unwrap().photo.id, "pro0");
    }

    #[tokio::test]
    async fn test_global_stats() {
        let fx = fixture(Arc::new(AllowAll)).await;
        let caller = Caller::system();
        let now = Utc::now();

        fx.panel.add_to_queue(&caller, Some("s1"), "pro0", None).await;
        fx.panel.add_to_queue(&caller, None, "pro1", None).await;
        fx.panel.add_to_queue(&caller, None, "pro2", None).await;

        fx.screens.heartbeat("s1", now).await.unwrap();
        // s2 pinged long ago: stored online, effectively offline
        fx.screens
            .heartbeat("s2", now - Duration::minutes(10))
            .await
            .unwrap();
        fx.backend
            .insert_photo(pending_photo("late", PhotoSource::User, now - Duration::minutes(6)))
            .await;

        let stats = fx.panel.get_global_screen_stats(&caller).await.unwrap();
        assert_eq!(stats.total_screens, 2);
        assert_eq!(stats.online, 1);
        assert_eq!(stats.offline, 1);
        assert_eq!(stats.global_pool_size, 2);
        assert_eq!(stats.total_queued, 3);
        assert_eq!(stats.sla.violation_count, 1);
    }

    #[tokio::test]
    async fn test_reorder_and_toggle() {
        let fx = fixture(Arc::new(AllowAll)).await;
        let caller = Caller::system();
        let first = fx
            .panel
            .add_to_queue(&caller, Some("s1"), "pro0", None)
            .await
            .data
            .unwrap();
        fx.panel.add_to_queue(&caller, Some("s1"), "pro1", None).await;

        let moved = fx
            .panel
            .reorder_queue_item(&caller, Some("s1"), &first.id, 5)
            .await;
        assert!(moved.success);
        assert_eq!(moved.data.unwrap().entry.position, 1);

        let paused = fx.panel.toggle_pause(&caller, "s1").await;
        assert_eq!(paused.data.unwrap().status, ScreenStatus::Paused);
    }
}
