//! Display state machine
//!
//! Owned, timer-free state for one screen. Every input is a [`Command`] and
//! every side effect the runtime must perform comes back as an [`Effect`],
//! so the whole playback and connectivity logic is testable synchronously.
//!
//! Notifications never carry state into the machine: `NotificationReceived`
//! has no payload and can at most cause a re-fetch.

use super::backoff::Backoff;
use crate::queue_store::QueuedPhoto;
use crate::realtime_hub::{ChangeEvent, ChangeTable, ScreenFilter, Subscription};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Playback phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Not started
    Idle,
    /// Started, first fetch outstanding
    Connecting,
    Displaying,
    /// Head consumed, waiting on a fetch
    Transitioning,
    /// Nothing to show; placeholder up
    Empty,
    Stopped,
}

/// Realtime channel sub-state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connectivity {
    Connected,
    Disconnected,
    Reconnecting,
}

/// Which queue a fetch reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchOrigin {
    Screen,
    GlobalPool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    /// Subscription acknowledged
    Subscribed,
    /// Subscribe error, timeout or channel closed
    ConnectionLost,
    ReconnectDue,
    /// Display timer fired
    Tick,
    /// Operator or device asked to move on now
    Advance,
    NotificationReceived,
    FetchCompleted {
        entries: Vec<QueuedPhoto>,
        origin: FetchOrigin,
    },
    FetchFailed,
    PauseChanged(bool),
    Stop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Subscribe(Vec<Subscription>),
    ScheduleReconnect(Duration),
    Fetch(FetchOrigin),
    Render(QueuedPhoto),
    ShowPlaceholder,
    /// Consume the entry and bump its photo's display counter
    MarkDisplayed(QueuedPhoto),
    Prefetch(Vec<String>),
    ArmDisplayTimer(Duration),
    WriteOffline,
}

/// Engine constants the machine needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    pub display_time: Duration,
    pub prefetch_count: usize,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            display_time: Duration::from_millis(5000),
            prefetch_count: 3,
            reconnect_base_delay: Duration::from_millis(1000),
            reconnect_max_delay: Duration::from_millis(30000),
        }
    }
}

/// Display state machine for one screen
#[derive(Debug, Clone)]
pub struct DisplayMachine {
    screen_id: String,
    config: MachineConfig,
    phase: Phase,
    connectivity: Connectivity,
    backoff: Backoff,
    buffer: VecDeque<QueuedPhoto>,
    origin: Option<FetchOrigin>,
    paused: bool,
    fetch_in_flight: bool,
    /// A notification arrived while a fetch was outstanding
    refetch_requested: bool,
    reconnect_pending: bool,
}

impl DisplayMachine {
    pub fn new(screen_id: impl Into<String>, config: MachineConfig) -> Self {
        let backoff = Backoff::new(config.reconnect_base_delay, config.reconnect_max_delay);
        Self {
            screen_id: screen_id.into(),
            config,
            phase: Phase::Idle,
            connectivity: Connectivity::Disconnected,
            backoff,
            buffer: VecDeque::new(),
            origin: None,
            paused: false,
            fetch_in_flight: false,
            refetch_requested: false,
            reconnect_pending: false,
        }
    }

    pub fn screen_id(&self) -> &str {
        &self.screen_id
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity
    }

    /// Entry on screen right now
    pub fn current(&self) -> Option<&QueuedPhoto> {
        match self.phase {
            Phase::Displaying => self.buffer.front(),
            _ => None,
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn origin(&self) -> Option<FetchOrigin> {
        self.origin
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn reconnect_attempt(&self) -> u32 {
        self.backoff.attempt()
    }

    /// Insert events for this screen and the global pool, plus updates to
    /// the screen record itself (pause/resume)
    pub fn subscriptions(&self) -> Vec<Subscription> {
        vec![
            Subscription::new(
                ChangeTable::QueueEntries,
                ChangeEvent::Insert,
                ScreenFilter::Screen(self.screen_id.clone()),
            ),
            Subscription::new(
                ChangeTable::QueueEntries,
                ChangeEvent::Insert,
                ScreenFilter::GlobalPool,
            ),
            Subscription::new(
                ChangeTable::Screens,
                ChangeEvent::Update,
                ScreenFilter::Screen(self.screen_id.clone()),
            ),
        ]
    }

    /// Apply one command
    pub fn handle(&mut self, command: Command) -> Vec<Effect> {
        if self.phase == Phase::Stopped {
            return Vec::new();
        }

        match command {
            Command::Start => self.on_start(),
            _ if self.phase == Phase::Idle => Vec::new(),
            Command::Subscribed => self.on_subscribed(),
            Command::ConnectionLost => self.on_connection_lost(),
            Command::ReconnectDue => self.on_reconnect_due(),
            Command::Tick | Command::Advance => self.on_advance(),
            Command::NotificationReceived => self.on_notification(),
            Command::FetchCompleted { entries, origin } => self.on_fetch_completed(entries, origin),
            Command::FetchFailed => self.on_fetch_failed(),
            Command::PauseChanged(paused) => self.on_pause_changed(paused),
            Command::Stop => self.on_stop(),
        }
    }

    fn on_start(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Idle {
            return Vec::new();
        }
        self.phase = Phase::Connecting;
        let mut effects = vec![Effect::Subscribe(self.subscriptions())];
        effects.extend(self.fetch(FetchOrigin::Screen));
        effects
    }

    fn on_subscribed(&mut self) -> Vec<Effect> {
        self.connectivity = Connectivity::Connected;
        self.reconnect_pending = false;
        self.backoff.reset();

        // inserts may have been missed while the channel was down
        if self.phase == Phase::Empty && !self.paused {
            return self.fetch(FetchOrigin::Screen);
        }
        Vec::new()
    }

    fn on_connection_lost(&mut self) -> Vec<Effect> {
        if self.reconnect_pending {
            return Vec::new();
        }
        self.connectivity = Connectivity::Reconnecting;
        self.reconnect_pending = true;
        vec![Effect::ScheduleReconnect(self.backoff.next_delay())]
    }

    fn on_reconnect_due(&mut self) -> Vec<Effect> {
        if !self.reconnect_pending {
            return Vec::new();
        }
        self.reconnect_pending = false;
        vec![Effect::Subscribe(self.subscriptions())]
    }

    fn on_advance(&mut self) -> Vec<Effect> {
        if self.paused {
            return Vec::new();
        }

        match self.phase {
            Phase::Displaying => {
                let mut effects = Vec::new();
                if let Some(head) = self.buffer.pop_front() {
                    effects.push(Effect::MarkDisplayed(head));
                }
                self.phase = Phase::Transitioning;
                if self.buffer.is_empty() {
                    effects.extend(self.fetch(FetchOrigin::Screen));
                } else {
                    effects.extend(self.show_head());
                }
                effects
            }
            // poll again while idle on the placeholder
            Phase::Empty => self.fetch(FetchOrigin::Screen),
            _ => Vec::new(),
        }
    }

    fn on_notification(&mut self) -> Vec<Effect> {
        if self.fetch_in_flight {
            self.refetch_requested = true;
            return Vec::new();
        }
        if self.phase == Phase::Empty && !self.paused {
            return self.fetch(FetchOrigin::Screen);
        }
        Vec::new()
    }

    fn on_fetch_completed(&mut self, entries: Vec<QueuedPhoto>, origin: FetchOrigin) -> Vec<Effect> {
        self.fetch_in_flight = false;

        let fresh: Vec<QueuedPhoto> = entries
            .into_iter()
            .filter(|e| !self.buffer.iter().any(|b| b.entry.id == e.entry.id))
            .collect();

        if fresh.is_empty() {
            if self.phase == Phase::Displaying {
                return Vec::new();
            }
            return match origin {
                FetchOrigin::Screen => self.fetch(FetchOrigin::GlobalPool),
                FetchOrigin::GlobalPool if self.refetch_requested => {
                    self.refetch_requested = false;
                    self.fetch(FetchOrigin::Screen)
                }
                FetchOrigin::GlobalPool => self.enter_empty(),
            };
        }

        self.refetch_requested = false;
        self.buffer.extend(fresh);

        if self.phase == Phase::Displaying {
            return self.prefetch_upcoming().into_iter().collect();
        }
        self.origin = Some(origin);
        self.show_head()
    }

    fn on_fetch_failed(&mut self) -> Vec<Effect> {
        self.fetch_in_flight = false;
        self.refetch_requested = false;
        if self.phase == Phase::Displaying {
            return Vec::new();
        }
        self.enter_empty()
    }

    fn on_pause_changed(&mut self, paused: bool) -> Vec<Effect> {
        if self.paused == paused {
            return Vec::new();
        }
        self.paused = paused;
        if paused {
            return Vec::new();
        }

        match self.phase {
            Phase::Displaying => vec![Effect::ArmDisplayTimer(self.config.display_time)],
            Phase::Empty => self.fetch(FetchOrigin::Screen),
            _ => Vec::new(),
        }
    }

    fn on_stop(&mut self) -> Vec<Effect> {
        self.phase = Phase::Stopped;
        self.buffer.clear();
        self.reconnect_pending = false;
        self.fetch_in_flight = false;
        vec![Effect::WriteOffline]
    }

    fn fetch(&mut self, origin: FetchOrigin) -> Vec<Effect> {
        if self.fetch_in_flight {
            return Vec::new();
        }
        self.fetch_in_flight = true;
        vec![Effect::Fetch(origin)]
    }

    fn show_head(&mut self) -> Vec<Effect> {
        let head = match self.buffer.front() {
            Some(head) => head.clone(),
            None => return self.enter_empty(),
        };
        self.phase = Phase::Displaying;

        let mut effects = vec![Effect::Render(head)];
        effects.extend(self.prefetch_upcoming());
        if !self.paused {
            effects.push(Effect::ArmDisplayTimer(self.config.display_time));
        }
        effects
    }

    fn prefetch_upcoming(&self) -> Option<Effect> {
        if self.buffer.len() <= 1 {
            return None;
        }
        Some(Effect::Prefetch(
            self.buffer
                .iter()
                .skip(1)
                .map(|q| q.image_url().to_string())
                .collect(),
        ))
    }

    fn enter_empty(&mut self) -> Vec<Effect> {
        self.phase = Phase::Empty;
        self.origin = None;
        vec![
            Effect::ShowPlaceholder,
            Effect::ArmDisplayTimer(self.config.display_time),
        ]
    }
}
