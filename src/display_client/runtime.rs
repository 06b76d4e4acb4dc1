//! Display Client runtime
//!
//! Drives a [`DisplayMachine`] with real timers: display timer, heartbeat
//! interval, reconnect timer and the realtime notification stream, all in
//! one `tokio::select!` loop. Effects are executed here; the machine never
//! touches I/O.

use super::machine::{
    Command, Connectivity, DisplayMachine, Effect, FetchOrigin, MachineConfig, Phase,
};
use super::prefetch::ImagePrefetch;
use super::store::{DisplayStore, RealtimeSource};
use crate::queue_store::QueuedPhoto;
use crate::realtime_hub::{ChangeNotification, ChangeTable};
use crate::state::QueuePolicy;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

/// Runtime settings for one display
#[derive(Debug, Clone)]
pub struct DisplayClientConfig {
    pub machine: MachineConfig,
    pub heartbeat_interval: Duration,
    /// Subscribe calls slower than this count as a failure
    pub subscribe_timeout: Duration,
}

impl DisplayClientConfig {
    pub fn from_policy(policy: &QueuePolicy) -> Self {
        Self {
            machine: MachineConfig {
                display_time: Duration::from_millis(policy.display_time_ms),
                prefetch_count: policy.prefetch_count,
                reconnect_base_delay: Duration::from_millis(policy.reconnect_base_delay_ms),
                reconnect_max_delay: Duration::from_millis(policy.reconnect_max_delay_ms),
            },
            heartbeat_interval: Duration::from_millis(policy.heartbeat_interval_ms),
            subscribe_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for DisplayClientConfig {
    fn default() -> Self {
        Self::from_policy(&QueuePolicy::default())
    }
}

/// Observable state of a running display
#[derive(Debug, Clone, Serialize)]
pub struct DisplaySnapshot {
    pub screen_id: String,
    pub phase: Phase,
    pub connectivity: Connectivity,
    pub current: Option<QueuedPhoto>,
    pub buffered: usize,
    pub origin: Option<FetchOrigin>,
    pub paused: bool,
    pub reconnect_attempt: u32,
    /// Entries this client has consumed
    pub displayed: u64,
}

impl DisplaySnapshot {
    fn of(machine: &DisplayMachine, displayed: u64) -> Self {
        Self {
            screen_id: machine.screen_id().to_string(),
            phase: machine.phase(),
            connectivity: machine.connectivity(),
            current: machine.current().cloned(),
            buffered: machine.buffered(),
            origin: machine.origin(),
            paused: machine.is_paused(),
            reconnect_attempt: machine.reconnect_attempt(),
            displayed,
        }
    }
}

enum Control {
    Advance,
    Stop,
}

/// Loop-owned timers and subscription
#[derive(Default)]
struct LoopState {
    display_deadline: Option<Instant>,
    reconnect_deadline: Option<Instant>,
    subscription: Option<(Uuid, mpsc::UnboundedReceiver<ChangeNotification>)>,
}

/// Display Client for one screen
pub struct DisplayClient {
    machine: DisplayMachine,
    config: DisplayClientConfig,
    store: Arc<dyn DisplayStore>,
    realtime: Arc<dyn RealtimeSource>,
    prefetcher: Arc<dyn ImagePrefetch>,
    snapshot: Arc<RwLock<DisplaySnapshot>>,
    displayed: u64,
}

impl DisplayClient {
    /// Create new DisplayClient
    pub fn new(
        screen_id: impl Into<String>,
        config: DisplayClientConfig,
        store: Arc<dyn DisplayStore>,
        realtime: Arc<dyn RealtimeSource>,
        prefetcher: Arc<dyn ImagePrefetch>,
    ) -> Self {
        let machine = DisplayMachine::new(screen_id, config.machine.clone());
        let snapshot = Arc::new(RwLock::new(DisplaySnapshot::of(&machine, 0)));
        Self {
            machine,
            config,
            store,
            realtime,
            prefetcher,
            snapshot,
            displayed: 0,
        }
    }

    /// Run on the tokio runtime until stopped
    pub fn spawn(self) -> DisplayHandle {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let snapshot = self.snapshot.clone();
        let screen_id = self.machine.screen_id().to_string();
        let task = tokio::spawn(self.run(control_rx));
        DisplayHandle {
            screen_id,
            control: control_tx,
            snapshot,
            task,
        }
    }

    async fn run(mut self, mut control_rx: mpsc::UnboundedReceiver<Control>) {
        let screen_id = self.machine.screen_id().to_string();
        tracing::info!(screen_id = %screen_id, "Display client starting");

        let mut state = LoopState::default();
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.dispatch(Command::Start, &mut state).await;

        while self.machine.phase() != Phase::Stopped {
            tokio::select! {
                control = control_rx.recv() => {
                    let command = match control {
                        Some(Control::Advance) => Command::Advance,
                        Some(Control::Stop) | None => Command::Stop,
                    };
                    self.dispatch(command, &mut state).await;
                }
                _ = sleep_until(state.display_deadline) => {
                    state.display_deadline = None;
                    self.dispatch(Command::Tick, &mut state).await;
                }
                _ = sleep_until(state.reconnect_deadline) => {
                    state.reconnect_deadline = None;
                    self.dispatch(Command::ReconnectDue, &mut state).await;
                }
                _ = heartbeat.tick() => {
                    self.heartbeat(&mut state).await;
                }
                notification = next_notification(&mut state.subscription) => {
                    match notification {
                        Some(n) => self.on_notification(n, &mut state).await,
                        None => {
                            tracing::warn!(screen_id = %screen_id, "Realtime channel closed");
                            state.subscription = None;
                            self.dispatch(Command::ConnectionLost, &mut state).await;
                        }
                    }
                }
            }
        }

        if let Some((id, _)) = state.subscription.take() {
            self.realtime.unsubscribe(&id).await;
        }
        tracing::info!(screen_id = %screen_id, "Display client stopped");
    }

    /// Feed a command and everything its effects produce through the machine
    async fn dispatch(&mut self, command: Command, state: &mut LoopState) {
        let mut commands = VecDeque::from([command]);
        while let Some(command) = commands.pop_front() {
            for effect in self.machine.handle(command) {
                commands.extend(self.execute(effect, state).await);
            }
        }
        *self.snapshot.write().await = DisplaySnapshot::of(&self.machine, self.displayed);
    }

    async fn execute(&mut self, effect: Effect, state: &mut LoopState) -> Vec<Command> {
        let screen_id = self.machine.screen_id().to_string();

        match effect {
            Effect::Subscribe(subscriptions) => {
                if let Some((old, _)) = state.subscription.take() {
                    self.realtime.unsubscribe(&old).await;
                }
                let result = tokio::time::timeout(
                    self.config.subscribe_timeout,
                    self.realtime.subscribe(&screen_id, subscriptions),
                )
                .await;
                match result {
                    Ok(Ok(subscription)) => {
                        tracing::info!(screen_id = %screen_id, "Realtime subscription established");
                        state.subscription = Some(subscription);
                        let mut next = vec![Command::Subscribed];
                        // pause changes may have been missed while unsubscribed
                        if let Ok(screen) = self.store.screen(&screen_id).await {
                            next.push(Command::PauseChanged(screen.is_paused()));
                        }
                        next
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(screen_id = %screen_id, error = %e, "Realtime subscribe failed");
                        vec![Command::ConnectionLost]
                    }
                    Err(_) => {
                        tracing::warn!(screen_id = %screen_id, "Realtime subscribe timed out");
                        vec![Command::ConnectionLost]
                    }
                }
            }
            Effect::ScheduleReconnect(delay) => {
                tracing::info!(
                    screen_id = %screen_id,
                    delay_ms = delay.as_millis() as u64,
                    attempt = self.machine.reconnect_attempt(),
                    "Scheduling realtime reconnect"
                );
                state.reconnect_deadline = Some(Instant::now() + delay);
                Vec::new()
            }
            Effect::Fetch(origin) => {
                let limit = self.machine.config().prefetch_count;
                match self.store.fetch(&screen_id, origin, limit).await {
                    Ok(entries) => vec![Command::FetchCompleted { entries, origin }],
                    Err(e) => {
                        tracing::warn!(
                            screen_id = %screen_id,
                            origin = ?origin,
                            error = %e,
                            "Queue fetch failed, showing placeholder"
                        );
                        vec![Command::FetchFailed]
                    }
                }
            }
            Effect::Render(queued) => {
                tracing::info!(
                    screen_id = %screen_id,
                    entry_id = %queued.entry.id,
                    photo_id = %queued.photo.id,
                    "Displaying photo"
                );
                Vec::new()
            }
            Effect::ShowPlaceholder => {
                tracing::debug!(screen_id = %screen_id, "Nothing to display, showing placeholder");
                Vec::new()
            }
            Effect::MarkDisplayed(queued) => {
                match self.store.mark_displayed(&queued).await {
                    Ok(()) => self.displayed += 1,
                    Err(e) => {
                        tracing::warn!(
                            screen_id = %screen_id,
                            entry_id = %queued.entry.id,
                            error = %e,
                            "Failed to mark entry displayed"
                        );
                    }
                }
                Vec::new()
            }
            Effect::Prefetch(urls) => {
                let prefetcher = self.prefetcher.clone();
                tokio::spawn(async move { prefetcher.prefetch(urls).await });
                Vec::new()
            }
            Effect::ArmDisplayTimer(duration) => {
                state.display_deadline = Some(Instant::now() + duration);
                Vec::new()
            }
            Effect::WriteOffline => {
                state.display_deadline = None;
                state.reconnect_deadline = None;
                if let Err(e) = self.store.go_offline(&screen_id).await {
                    tracing::warn!(screen_id = %screen_id, error = %e, "Offline write failed");
                }
                Vec::new()
            }
        }
    }

    async fn heartbeat(&mut self, state: &mut LoopState) {
        let screen_id = self.machine.screen_id().to_string();
        match self.store.heartbeat(&screen_id).await {
            Ok(screen) => {
                self.dispatch(Command::PauseChanged(screen.is_paused()), state)
                    .await
            }
            Err(e) => {
                tracing::warn!(screen_id = %screen_id, error = %e, "Heartbeat failed");
            }
        }
    }

    /// Only the arrival matters; the payload picks which re-read to do
    async fn on_notification(&mut self, notification: ChangeNotification, state: &mut LoopState) {
        match notification.table {
            ChangeTable::QueueEntries => {
                self.dispatch(Command::NotificationReceived, state).await;
            }
            ChangeTable::Screens => {
                let screen_id = self.machine.screen_id().to_string();
                match self.store.screen(&screen_id).await {
                    Ok(screen) => {
                        self.dispatch(Command::PauseChanged(screen.is_paused()), state)
                            .await
                    }
                    Err(e) => {
                        tracing::warn!(screen_id = %screen_id, error = %e, "Screen re-read failed");
                    }
                }
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn next_notification(
    subscription: &mut Option<(Uuid, mpsc::UnboundedReceiver<ChangeNotification>)>,
) -> Option<ChangeNotification> {
    match subscription {
        Some((_, rx)) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Handle to a spawned DisplayClient
pub struct DisplayHandle {
    screen_id: String,
    control: mpsc::UnboundedSender<Control>,
    snapshot: Arc<RwLock<DisplaySnapshot>>,
    task: JoinHandle<()>,
}

impl DisplayHandle {
    pub fn screen_id(&self) -> &str {
        &self.screen_id
    }

    /// Skip the rest of the current display period
    pub fn advance(&self) {
        let _ = self.control.send(Control::Advance);
    }

    pub async fn snapshot(&self) -> DisplaySnapshot {
        self.snapshot.read().await.clone()
    }

    /// Cancel all timers, write offline (best-effort) and wait for the loop
    pub async fn stop(self) {
        let _ = self.control.send(Control::Stop);
        if let Err(e) = self.task.await {
            tracing::error!(screen_id = %self.screen_id, error = %e, "Display client task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display_client::LocalDisplayStore;
    use crate::queue_store::{approved_photo, MemoryQueueBackend, PhotoSource, QueueScope, QueueStore};
    use crate::realtime_hub::RealtimeHub;
    use crate::screen_registry::{MemoryScreenRegistry, Screen, ScreenRegistry, ScreenStatus};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPrefetcher {
        urls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ImagePrefetch for RecordingPrefetcher {
        async fn prefetch(&self, urls: Vec<String>) {
            self.urls.lock().unwrap().extend(urls);
        }

        async fn is_cached(&self, url: &str) -> bool {
            self.urls.lock().unwrap().iter().any(|u| u == url)
        }
    }

    struct Fixture {
        backend: Arc<MemoryQueueBackend>,
        queue: Arc<QueueStore>,
        screens: Arc<ScreenRegistry>,
        hub: Arc<RealtimeHub>,
        prefetcher: Arc<RecordingPrefetcher>,
    }

    impl Fixture {
        async fn new(photos: &[&str]) -> Self {
            let backend = Arc::new(MemoryQueueBackend::new());
            let now = Utc::now();
            for id in photos {
                backend
                    .insert_photo(approved_photo(id, PhotoSource::Photographer, now))
                    .await;
            }
            let hub = Arc::new(RealtimeHub::new());
            let queue = Arc::new(QueueStore::new(backend.clone(), hub.clone()));
            let registry = Arc::new(MemoryScreenRegistry::new());
            registry.insert_screen(Screen::new("s1", "Stage")).await;
            let screens = Arc::new(ScreenRegistry::new(
                registry,
                hub.clone(),
                chrono::Duration::seconds(90),
            ));
            Self {
                backend,
                queue,
                screens,
                hub,
                prefetcher: Arc::new(RecordingPrefetcher::default()),
            }
        }

        fn spawn(&self) -> DisplayHandle {
            let store = Arc::new(LocalDisplayStore::new(
                self.queue.clone(),
                self.screens.clone(),
                chrono::Duration::seconds(30),
            ));
            DisplayClient::new(
                "s1",
                DisplayClientConfig::default(),
                store,
                self.hub.clone(),
                self.prefetcher.clone(),
            )
            .spawn()
        }
    }

    fn current_photo(snapshot: &DisplaySnapshot) -> Option<String> {
        snapshot.current.as_ref().map(|q| q.photo.id.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_advances_and_consumes_head() {
        let fx = Fixture::new(&["a", "b", "c"]).await;
        let scope = QueueScope::Screen("s1".into());
        for id in ["a", "b", "c"] {
            fx.queue.add_to_queue(&scope, id, None).await.unwrap();
        }

        let handle = fx.spawn();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let snapshot = handle.snapshot().await;
        assert_eq!(current_photo(&snapshot).as_deref(), Some("a"));
        assert_eq!(snapshot.connectivity, Connectivity::Connected);

        tokio::time::sleep(Duration::from_millis(5000)).await;
        let snapshot = handle.snapshot().await;
        assert_eq!(current_photo(&snapshot).as_deref(), Some("b"));
        assert_eq!(snapshot.displayed, 1);

        let history = fx.backend.display_history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].photo_id, "a");
        assert!(history[0].displayed_at.is_some());
        let a = fx.queue.get_photo("a").await.unwrap().unwrap();
        assert_eq!(a.displayed_count, 1);

        let queue = fx.queue.get_screen_queue(&scope, 10).await.unwrap();
        assert_eq!(queue[0].photo.id, "b");
        assert_eq!(queue[0].entry.position, 0);

        let prefetched = fx.prefetcher.urls.lock().unwrap().clone();
        assert!(prefetched.iter().any(|u| u.ends_with("/c.jpg")));

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_pool_fallback_leases_entries() {
        let fx = Fixture::new(&["g1", "g2"]).await;
        fx.queue
            .add_to_queue(&QueueScope::Global, "g1", None)
            .await
            .unwrap();
        fx.queue
            .add_to_queue(&QueueScope::Global, "g2", None)
            .await
            .unwrap();

        let handle = fx.spawn();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let snapshot = handle.snapshot().await;
        assert_eq!(current_photo(&snapshot).as_deref(), Some("g1"));
        assert_eq!(snapshot.origin, Some(FetchOrigin::GlobalPool));
        assert_eq!(snapshot.buffered, 2);

        let pool = fx.backend.entries(&QueueScope::Global).await;
        assert!(pool.iter().all(|e| e.claimed_by.as_deref() == Some("s1")));

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_while_empty_fetches_immediately() {
        let fx = Fixture::new(&["a"]).await;
        let handle = fx.spawn();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(handle.snapshot().await.phase, Phase::Empty);

        fx.queue
            .add_to_queue(&QueueScope::Screen("s1".into()), "a", None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let snapshot = handle.snapshot().await;
        assert_eq!(snapshot.phase, Phase::Displaying);
        assert_eq!(current_photo(&snapshot).as_deref(), Some("a"));

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_loss_reconnects_after_backoff() {
        let fx = Fixture::new(&[]).await;
        let handle = fx.spawn();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fx.hub.subscriber_count(), 1);

        fx.hub.disconnect_all().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        let snapshot = handle.snapshot().await;
        assert_eq!(snapshot.connectivity, Connectivity::Reconnecting);
        assert_eq!(snapshot.reconnect_attempt, 1);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        let snapshot = handle.snapshot().await;
        assert_eq!(snapshot.connectivity, Connectivity::Connected);
        assert_eq!(snapshot.reconnect_attempt, 0);
        assert_eq!(fx.hub.subscriber_count(), 1);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_and_stop_write_screen_status() {
        let fx = Fixture::new(&[]).await;
        let handle = fx.spawn();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let screen = fx.screens.get_screen("s1").await.unwrap();
        assert_eq!(screen.status, ScreenStatus::Online);
        assert!(screen.last_ping.is_some());

        handle.stop().await;
        let screen = fx.screens.get_screen("s1").await.unwrap();
        assert_eq!(screen.status, ScreenStatus::Offline);
        assert_eq!(fx.hub.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_holds_photo_until_resumed() {
        let fx = Fixture::new(&["a", "b"]).await;
        let scope = QueueScope::Screen("s1".into());
        fx.queue.add_to_queue(&scope, "a", None).await.unwrap();
        fx.queue.add_to_queue(&scope, "b", None).await.unwrap();

        let handle = fx.spawn();
        tokio::time::sleep(Duration::from_millis(100)).await;
        fx.screens.toggle_pause("s1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10_000)).await;

        let snapshot = handle.snapshot().await;
        assert!(snapshot.paused);
        assert_eq!(current_photo(&snapshot).as_deref(), Some("a"));
        assert_eq!(fx.queue.queue_length(&scope).await.unwrap(), 2);

        fx.screens.toggle_pause("s1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5100)).await;
        let snapshot = handle.snapshot().await;
        assert_eq!(current_photo(&snapshot).as_deref(), Some("b"));

        handle.stop().await;
    }
}
