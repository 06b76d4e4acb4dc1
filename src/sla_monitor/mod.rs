//! SLA Monitor - moderation latency tracking
//!
//! ## Responsibilities
//!
//! - Count pending photos that have waited at least the SLA window
//! - Average moderation latency over the most recent actions
//!
//! Both figures are recomputed on demand and are informational only; they
//! never influence queue behavior.

mod repository;

pub use repository::SlaRepository;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Pending photos older than this are violations
pub const SLA_WINDOW_SECS: i64 = 5 * 60;

/// Number of recent moderation actions averaged
pub const RECENT_ACTIONS_WINDOW: usize = 100;

/// Photo still awaiting a moderation decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PendingPhoto {
    pub photo_id: String,
    pub created_at: DateTime<Utc>,
}

/// One approve/reject decision with the photo's upload time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ModerationSample {
    pub photo_id: String,
    pub photo_created_at: DateTime<Utc>,
    pub moderated_at: DateTime<Utc>,
}

impl ModerationSample {
    pub fn latency(&self) -> Duration {
        self.moderated_at - self.photo_created_at
    }
}

/// Where pending photos and moderation history come from
#[async_trait]
pub trait ModerationSource: Send + Sync {
    async fn pending_photos(&self) -> Result<Vec<PendingPhoto>>;

    /// Most recent decisions first, at most `limit`
    async fn recent_moderation(&self, limit: usize) -> Result<Vec<ModerationSample>>;
}

/// `now - created_at >= 5 minutes`
pub fn is_violation(created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - created_at >= Duration::seconds(SLA_WINDOW_SECS)
}

pub fn count_violations(pending: &[PendingPhoto], now: DateTime<Utc>) -> usize {
    pending
        .iter()
        .filter(|p| is_violation(p.created_at, now))
        .count()
}

/// Mean latency in seconds; None when there is no history
pub fn average_moderation_seconds(samples: &[ModerationSample]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let total_ms: i64 = samples.iter().map(|s| s.latency().num_milliseconds()).sum();
    Some(total_ms as f64 / 1000.0 / samples.len() as f64)
}

/// SLA snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaReport {
    pub pending_count: usize,
    pub violation_count: usize,
    pub average_moderation_seconds: Option<f64>,
    /// Number of moderation actions the average is based on
    pub sample_size: usize,
    pub computed_at: DateTime<Utc>,
}

/// SlaMonitor instance
pub struct SlaMonitor {
    source: Arc<dyn ModerationSource>,
}

impl SlaMonitor {
    /// Create new SlaMonitor
    pub fn new(source: Arc<dyn ModerationSource>) -> Self {
        Self { source }
    }

    pub async fn violation_count(&self, now: DateTime<Utc>) -> Result<usize> {
        let pending = self.source.pending_photos().await?;
        Ok(count_violations(&pending, now))
    }

    pub async fn average_moderation_seconds(&self) -> Result<Option<f64>> {
        let samples = self.source.recent_moderation(RECENT_ACTIONS_WINDOW).await?;
        Ok(average_moderation_seconds(&samples))
    }

    /// Full report at `now`
    pub async fn report(&self, now: DateTime<Utc>) -> Result<SlaReport> {
        let pending = self.source.pending_photos().await?;
        let samples = self.source.recent_moderation(RECENT_ACTIONS_WINDOW).await?;

        let report = SlaReport {
            pending_count: pending.len(),
            violation_count: count_violations(&pending, now),
            average_moderation_seconds: average_moderation_seconds(&samples),
            sample_size: samples.len(),
            computed_at: now,
        };

        if report.violation_count > 0 {
            tracing::warn!(
                violations = report.violation_count,
                pending = report.pending_count,
                "Moderation SLA violated"
            );
        }
        Ok(report)
    }
}
