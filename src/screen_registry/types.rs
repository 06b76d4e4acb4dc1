//! Screen Registry data types

use crate::db::mysql_text_enum;
use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

/// Stored screen status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenStatus {
    Online,
    Paused,
    Offline,
}

impl ScreenStatus {
    /// Status after a pause/resume toggle
    pub fn toggled(self) -> Self {
        match self {
            ScreenStatus::Paused => ScreenStatus::Online,
            ScreenStatus::Online | ScreenStatus::Offline => ScreenStatus::Paused,
        }
    }

    /// Status a heartbeat writes; a paused screen stays paused
    pub fn after_heartbeat(self) -> Self {
        match self {
            ScreenStatus::Paused => ScreenStatus::Paused,
            _ => ScreenStatus::Online,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScreenStatus::Online => "online",
            ScreenStatus::Paused => "paused",
            ScreenStatus::Offline => "offline",
        }
    }
}

impl FromStr for ScreenStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "online" => Ok(ScreenStatus::Online),
            "paused" => Ok(ScreenStatus::Paused),
            "offline" => Ok(ScreenStatus::Offline),
            other => Err(Error::Validation(format!("Unknown screen status: {}", other))),
        }
    }
}

mysql_text_enum!(ScreenStatus);

/// Screen record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Screen {
    pub id: String,
    pub name: String,
    pub status: ScreenStatus,
    pub last_ping: Option<DateTime<Utc>>,
}

impl Screen {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: ScreenStatus::Offline,
            last_ping: None,
        }
    }

    /// Stored status, downgraded to offline when the last heartbeat is stale
    /// (or missing). The client's own offline write is best-effort, so
    /// readers should not trust `status` alone.
    pub fn effective_status(&self, now: DateTime<Utc>, stale_after: Duration) -> ScreenStatus {
        if self.status == ScreenStatus::Offline {
            return ScreenStatus::Offline;
        }
        match self.last_ping {
            Some(ping) if now - ping <= stale_after => self.status,
            _ => ScreenStatus::Offline,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.status == ScreenStatus::Paused
    }
}

/// Screen plus the liveness readers should act on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenView {
    #[serde(flatten)]
    pub screen: Screen,
    pub effective_status: ScreenStatus,
}

impl ScreenView {
    pub fn new(screen: Screen, now: DateTime<Utc>, stale_after: Duration) -> Self {
        let effective_status = screen.effective_status(now, stale_after);
        Self {
            screen,
            effective_status,
        }
    }
}
