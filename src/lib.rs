//! Screenwall Library
//!
//! Screen queue distribution and display synchronization for event photo walls
//!
//! ## Architecture (7 Components)
//!
//! 1. QueueStore - Per-screen ordered queues and the global pool
//! 2. ScreenRegistry - Screen records, heartbeat, pause, derived liveness
//! 3. DisplayClient - Per-screen display state machine and runtime
//! 4. RatioMonitor - Photographer vs. user share of a queue
//! 5. SlaMonitor - Moderation latency and SLA violations
//! 6. RealtimeHub - Change feed distribution (in-process + WebSocket)
//! 7. ControlPanel / WebAPI - Administrative and device endpoints
//!
//! ## Design Principles
//!
//! - The QueueStore is the single source of truth; notifications are hints
//! - Every queue mutation is atomic and keeps positions contiguous
//! - Liveness is derived from the last heartbeat, never trusted as stored

pub mod control_panel;
mod db;
pub mod display_client;
pub mod error;
pub mod models;
pub mod queue_store;
pub mod ratio_monitor;
pub mod realtime_hub;
pub mod screen_registry;
pub mod sla_monitor;
pub mod state;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
