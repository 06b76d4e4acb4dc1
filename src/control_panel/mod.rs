//! ControlPanel - administrative surface for screen queues
//!
//! ## Responsibilities
//!
//! - add / remove / reorder / skip against the QueueStore
//! - Pause and resume screens
//! - Per-screen and fleet-wide statistics (ratio, SLA, liveness)
//!
//! Role checks are delegated to an [`Authorizer`]; this module never
//! authenticates anyone itself.

mod service;
mod types;

pub use service::{ControlPanel, RATIO_WINDOW};
pub use types::*;
