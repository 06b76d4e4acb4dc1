//! DisplayClient - autonomous playback for one screen
//!
//! ## Responsibilities
//!
//! - Show the head of the screen's queue, falling back to the global pool
//! - Advance on a fixed display timer, consuming each shown entry
//! - Prefetch upcoming images
//! - Keep a realtime subscription alive with exponential reconnect backoff
//! - Heartbeat the screen record; write offline on clean shutdown
//!
//! ## Design Principles
//!
//! - All state lives in [`DisplayMachine`], changed only through commands
//! - Fetch failures degrade to a placeholder, never to a crash
//! - Notifications mean "go re-check", never "here is the new state"

mod backoff;
mod machine;
mod prefetch;
mod runtime;
mod store;

pub use backoff::Backoff;
pub use machine::{
    Command, Connectivity, DisplayMachine, Effect, FetchOrigin, MachineConfig, Phase,
};
pub use prefetch::{HttpImagePrefetcher, ImagePrefetch, DEFAULT_CACHE_CAPACITY};
pub use runtime::{DisplayClient, DisplayClientConfig, DisplayHandle, DisplaySnapshot};
pub use store::{DisplayStore, LocalDisplayStore, RealtimeSource};
