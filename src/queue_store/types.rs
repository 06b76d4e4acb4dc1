//! Queue Store data types
//!
//! Queue entries, the photo records they point at, and the scope
//! (screen-specific queue or global pool) every operation runs against.

use crate::db::mysql_text_enum;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// `screen_key` value used for the global pool (screen_id IS NULL)
pub const GLOBAL_SCREEN_KEY: &str = "__global__";

/// Queue a mutation or read applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "screen_id")]
pub enum QueueScope {
    /// Per-screen queue
    Screen(String),
    /// Shared pool consumable by any screen lacking its own content
    Global,
}

impl QueueScope {
    pub fn from_screen_id(screen_id: Option<&str>) -> Self {
        match screen_id {
            Some(id) => QueueScope::Screen(id.to_string()),
            None => QueueScope::Global,
        }
    }

    /// `screen_id` column value (None for the global pool)
    pub fn screen_id(&self) -> Option<&str> {
        match self {
            QueueScope::Screen(id) => Some(id.as_str()),
            QueueScope::Global => None,
        }
    }

    /// Grouping key; the global pool gets a sentinel so it can share unique indexes
    pub fn key(&self) -> &str {
        match self {
            QueueScope::Screen(id) => id.as_str(),
            QueueScope::Global => GLOBAL_SCREEN_KEY,
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, QueueScope::Global)
    }
}

impl fmt::Display for QueueScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueScope::Screen(id) => write!(f, "screen {}", id),
            QueueScope::Global => write!(f, "global pool"),
        }
    }
}

/// Who took the photo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoSource {
    Photographer,
    User,
}

impl PhotoSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoSource::Photographer => "photographer",
            PhotoSource::User => "user",
        }
    }
}

impl FromStr for PhotoSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "photographer" => Ok(PhotoSource::Photographer),
            "user" => Ok(PhotoSource::User),
            other => Err(Error::Validation(format!("Unknown photo source: {}", other))),
        }
    }
}

mysql_text_enum!(PhotoSource);

/// Moderation status (owned by the moderation workflow)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoStatus {
    Pending,
    Approved,
    Rejected,
}

impl PhotoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoStatus::Pending => "pending",
            PhotoStatus::Approved => "approved",
            PhotoStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for PhotoStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(PhotoStatus::Pending),
            "approved" => Ok(PhotoStatus::Approved),
            "rejected" => Ok(PhotoStatus::Rejected),
            other => Err(Error::Validation(format!("Unknown photo status: {}", other))),
        }
    }
}

mysql_text_enum!(PhotoStatus);

/// Photo record (Photo Store is external; only `displayed_count` is written here)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Photo {
    pub id: String,
    pub source: PhotoSource,
    pub status: PhotoStatus,
    pub file_url: String,
    pub thumbnail_url: Option<String>,
    pub displayed_count: i64,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl Photo {
    pub fn is_queueable(&self) -> bool {
        self.status == PhotoStatus::Approved
    }
}

/// One scheduled (photo, screen) pairing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct QueueEntry {
    pub id: String,
    /// None = global pool
    pub screen_id: Option<String>,
    pub photo_id: String,
    /// 0-based, contiguous per scope; 0 is "now displaying"
    pub position: i32,
    /// Set exactly once, right before the entry is consumed
    pub displayed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Screen currently holding a lease on a global-pool entry
    pub claimed_by: Option<String>,
    pub claim_expires_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    pub fn scope(&self) -> QueueScope {
        QueueScope::from_screen_id(self.screen_id.as_deref())
    }

    /// Claim is held by someone other than `screen_id` and not yet expired
    pub fn is_claimed_by_other(&self, screen_id: &str, now: DateTime<Utc>) -> bool {
        match (&self.claimed_by, self.claim_expires_at) {
            (Some(holder), Some(expires)) => holder != screen_id && expires > now,
            _ => false,
        }
    }
}

/// Queue entry joined with its photo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedPhoto {
    pub entry: QueueEntry,
    pub photo: Photo,
}

impl QueuedPhoto {
    pub fn image_url(&self) -> &str {
        &self.photo.file_url
    }
}

/// Result of a reorder: the entry as stored afterwards and where it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reordered {
    pub entry: QueueEntry,
    pub previous_position: i32,
}

impl Reordered {
    pub fn moved(&self) -> bool {
        self.entry.position != self.previous_position
    }
}

/// Add-to-queue request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddToQueueRequest {
    pub photo_id: String,
    #[serde(default)]
    pub position: Option<i32>,
}

/// Reorder request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderRequest {
    pub position: i32,
}
