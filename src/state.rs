//! Application state
//!
//! Holds all shared components and state

use crate::control_panel::{Authorizer, ControlPanel};
use crate::display_client::DisplayHandle;
use crate::error::{Error, Result};
use crate::queue_store::{MemoryQueueBackend, QueueBackend, QueueRepository, QueueStore};
use crate::realtime_hub::RealtimeHub;
use crate::screen_registry::{MemoryScreenRegistry, ScreenBackend, ScreenRegistry, ScreenRepository};
use crate::sla_monitor::{ModerationSource, SlaMonitor, SlaRepository};
use sqlx::MySqlPool;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Where queue, screen and moderation data live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Mysql,
    /// Single-process, non-persistent
    Memory,
}

impl FromStr for StoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" => Ok(StoreBackend::Mysql),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(Error::Config(format!("Unknown STORE_BACKEND: {}", other))),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Database URL
    pub database_url: String,
    /// Server port
    pub port: u16,
    /// Server host
    pub host: String,
    /// Max MySQL connections
    pub db_max_connections: u32,
    /// Public landing page the display's scannable code points to
    pub public_landing_url: String,
    /// Optional directory served at `/` (display / panel frontends)
    pub static_dir: Option<PathBuf>,
    pub store_backend: StoreBackend,
    /// Screens driven by in-process display clients
    pub local_display_screens: Vec<String>,
    /// Require admin/moderator roles on Control Panel calls
    pub require_roles: bool,
    pub policy: QueuePolicy,
}

/// `STORE_BACKEND` value; unset means MySQL, anything unrecognized is an error
fn parse_store_backend(raw: Option<String>) -> Result<StoreBackend> {
    match raw {
        Some(value) => value.trim().parse(),
        None => Ok(StoreBackend::Mysql),
    }
}

impl AppConfig {
    /// Read the configuration from the environment
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "mysql://root@localhost/screenwall".to_string()),
            port: env_or("PORT", 8080),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 10),
            public_landing_url: std::env::var("PUBLIC_LANDING_URL")
                .unwrap_or_else(|_| "http://localhost:8080/".to_string()),
            static_dir: std::env::var("STATIC_DIR").ok().map(PathBuf::from),
            store_backend: parse_store_backend(std::env::var("STORE_BACKEND").ok())?,
            local_display_screens: std::env::var("LOCAL_DISPLAY_SCREENS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            require_roles: env_or("REQUIRE_ROLES", true),
            policy: QueuePolicy::from_env(),
        })
    }
}

/// Queue engine timing and sizing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePolicy {
    pub display_time_ms: u64,
    pub prefetch_count: usize,
    pub heartbeat_interval_ms: u64,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    /// `last_ping` older than this reads as offline
    pub stale_after_ms: u64,
    /// Lease length for global-pool entries handed to a screen
    pub global_claim_ttl_ms: u64,
}

impl QueuePolicy {
    pub const DEFAULT_DISPLAY_TIME_MS: u64 = 5000;
    pub const DEFAULT_PREFETCH_COUNT: usize = 3;
    pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;
    pub const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 1000;
    pub const DEFAULT_RECONNECT_MAX_DELAY_MS: u64 = 30_000;
    pub const DEFAULT_STALE_AFTER_MS: u64 = 90_000;
    pub const DEFAULT_GLOBAL_CLAIM_TTL_MS: u64 = 30_000;

    /// Defaults overridden from the environment
    pub fn from_env() -> Self {
        Self {
            display_time_ms: env_or("DISPLAY_TIME_MS", Self::DEFAULT_DISPLAY_TIME_MS),
            prefetch_count: env_or("PREFETCH_COUNT", Self::DEFAULT_PREFETCH_COUNT),
            heartbeat_interval_ms: env_or(
                "HEARTBEAT_INTERVAL_MS",
                Self::DEFAULT_HEARTBEAT_INTERVAL_MS,
            ),
            reconnect_base_delay_ms: env_or(
                "RECONNECT_BASE_DELAY_MS",
                Self::DEFAULT_RECONNECT_BASE_DELAY_MS,
            ),
            reconnect_max_delay_ms: env_or(
                "RECONNECT_MAX_DELAY_MS",
                Self::DEFAULT_RECONNECT_MAX_DELAY_MS,
            ),
            stale_after_ms: env_or("STALE_AFTER_MS", Self::DEFAULT_STALE_AFTER_MS),
            global_claim_ttl_ms: env_or("GLOBAL_CLAIM_TTL_MS", Self::DEFAULT_GLOBAL_CLAIM_TTL_MS),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.display_time_ms == 0 || self.heartbeat_interval_ms == 0 {
            return Err(Error::Config(
                "display time and heartbeat interval must be positive".to_string(),
            ));
        }
        if self.prefetch_count == 0 {
            return Err(Error::Config("PREFETCH_COUNT must be at least 1".to_string()));
        }
        if self.reconnect_base_delay_ms == 0
            || self.reconnect_base_delay_ms > self.reconnect_max_delay_ms
        {
            return Err(Error::Config(
                "reconnect base delay must be positive and not exceed the max delay".to_string(),
            ));
        }
        if self.stale_after_ms <= self.heartbeat_interval_ms {
            return Err(Error::Config(
                "STALE_AFTER_MS must exceed HEARTBEAT_INTERVAL_MS".to_string(),
            ));
        }
        // a leased batch must outlive its last display period
        let min_claim_ttl_ms = self
            .display_time_ms
            .saturating_mul(self.prefetch_count as u64 + 1);
        if self.global_claim_ttl_ms < min_claim_ttl_ms {
            return Err(Error::Config(format!(
                "GLOBAL_CLAIM_TTL_MS ({}) must be at least DISPLAY_TIME_MS x (PREFETCH_COUNT + 1) = {}",
                self.global_claim_ttl_ms, min_claim_ttl_ms
            )));
        }
        Ok(())
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.stale_after_ms as i64)
    }

    pub fn global_claim_ttl(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.global_claim_ttl_ms as i64)
    }
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            display_time_ms: Self::DEFAULT_DISPLAY_TIME_MS,
            prefetch_count: Self::DEFAULT_PREFETCH_COUNT,
            heartbeat_interval_ms: Self::DEFAULT_HEARTBEAT_INTERVAL_MS,
            reconnect_base_delay_ms: Self::DEFAULT_RECONNECT_BASE_DELAY_MS,
            reconnect_max_delay_ms: Self::DEFAULT_RECONNECT_MAX_DELAY_MS,
            stale_after_ms: Self::DEFAULT_STALE_AFTER_MS,
            global_claim_ttl_ms: Self::DEFAULT_GLOBAL_CLAIM_TTL_MS,
        }
    }
}

/// Storage implementations wired into the components
#[derive(Clone)]
pub struct Backends {
    pub queue: Arc<dyn QueueBackend>,
    pub screens: Arc<dyn ScreenBackend>,
    pub moderation: Arc<dyn ModerationSource>,
}

impl Backends {
    pub fn mysql(pool: MySqlPool) -> Self {
        Self {
            queue: Arc::new(QueueRepository::new(pool.clone())),
            screens: Arc::new(ScreenRepository::new(pool.clone())),
            moderation: Arc::new(SlaRepository::new(pool)),
        }
    }

    pub fn memory(queue: Arc<MemoryQueueBackend>, screens: Arc<MemoryScreenRegistry>) -> Self {
        Self {
            queue: queue.clone(),
            screens,
            moderation: queue,
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database pool (None for the memory backend)
    pub pool: Option<MySqlPool>,
    /// Application config
    pub config: AppConfig,
    /// RealtimeHub (change feed + WebSocket)
    pub realtime: Arc<RealtimeHub>,
    /// QueueStore
    pub queue: Arc<QueueStore>,
    /// ScreenRegistry
    pub screens: Arc<ScreenRegistry>,
    /// SlaMonitor
    pub sla: Arc<SlaMonitor>,
    /// ControlPanel
    pub control_panel: Arc<ControlPanel>,
    /// In-process display clients by screen id
    pub displays: Arc<RwLock<HashMap<String, DisplayHandle>>>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        pool: Option<MySqlPool>,
        backends: Backends,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        let realtime = Arc::new(RealtimeHub::new());
        let queue = Arc::new(QueueStore::new(backends.queue, realtime.clone()));
        let screens = Arc::new(ScreenRegistry::new(
            backends.screens,
            realtime.clone(),
            config.policy.stale_after(),
        ));
        let sla = Arc::new(SlaMonitor::new(backends.moderation));
        let control_panel = Arc::new(ControlPanel::new(
            queue.clone(),
            screens.clone(),
            sla.clone(),
            authorizer,
        ));

        Self {
            pool,
            config,
            realtime,
            queue,
            screens,
            sla,
            control_panel,
            displays: Arc::new(RwLock::new(HashMap::new())),
            started_at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_valid() {
        let policy = QueuePolicy::default();
        assert!(policy.validate().is_ok());
        assert_eq!(policy.display_time_ms, 5000);
        assert_eq!(policy.prefetch_count, 3);
        assert_eq!(policy.stale_after(), chrono::Duration::seconds(90));
    }

    #[test]
    fn test_policy_rejects_inverted_backoff() {
        let policy = QueuePolicy {
            reconnect_base_delay_ms: 60_000,
            ..QueuePolicy::default()
        };
        assert!(matches!(policy.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_policy_rejects_claim_ttl_shorter_than_buffer() {
        let policy = QueuePolicy {
            display_time_ms: 20_000,
            ..QueuePolicy::default()
        };
        assert!(matches!(policy.validate(), Err(Error::Config(_))));

        let policy = QueuePolicy {
            display_time_ms: 20_000,
            global_claim_ttl_ms: 80_000,
            ..QueuePolicy::default()
        };
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_store_backend_from_env_value() {
        assert_eq!(parse_store_backend(None).unwrap(), StoreBackend::Mysql);
        assert_eq!(
            parse_store_backend(Some(" memory ".to_string())).unwrap(),
            StoreBackend::Memory
        );
        let err = parse_store_backend(Some("memroy".to_string())).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_store_backend_parse() {
        assert_eq!("MEMORY".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("sqlite".parse::<StoreBackend>().is_err());
    }
}
