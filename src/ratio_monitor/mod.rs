//! Ratio Monitor - photographer / user content mix
//!
//! Pure derivation over a screen's queue against the 70/30 target.

use crate::queue_store::{PhotoSource, QueuedPhoto};
use serde::{Deserialize, Serialize};

/// Desired photographer share in percent
pub const TARGET_PHOTOGRAPHER_PERCENTAGE: i32 = 70;
/// Max deviation still considered on target
pub const ON_TARGET_TOLERANCE: i32 = 5;
/// Max deviation before the mix is off target
pub const WARNING_TOLERANCE: i32 = 15;

/// Which content the queue is short of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioHint {
    NeedMorePhotographer,
    NeedMoreUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "hint")]
pub enum RatioStatus {
    OnTarget,
    Warning(RatioHint),
    OffTarget(RatioHint),
}

impl RatioStatus {
    pub fn is_on_target(&self) -> bool {
        matches!(self, RatioStatus::OnTarget)
    }
}

/// Ratio report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatioReport {
    pub photographer_count: usize,
    pub user_count: usize,
    pub photographer_percentage: i32,
    pub user_percentage: i32,
    /// `|photographer_percentage - 70|`
    pub deviation: i32,
    pub status: RatioStatus,
}

impl RatioReport {
    pub fn total(&self) -> usize {
        self.photographer_count + self.user_count
    }
}

/// Classify a photographer percentage against the target
pub fn classify(photographer_percentage: i32) -> RatioStatus {
    let delta = photographer_percentage - TARGET_PHOTOGRAPHER_PERCENTAGE;
    let hint = if delta < 0 {
        RatioHint::NeedMorePhotographer
    } else {
        RatioHint::NeedMoreUser
    };

    match delta.abs() {
        d if d <= ON_TARGET_TOLERANCE => RatioStatus::OnTarget,
        d if d <= WARNING_TOLERANCE => RatioStatus::Warning(hint),
        _ => RatioStatus::OffTarget(hint),
    }
}

/// Build a report from raw counts; an empty queue yields 0 / 0
pub fn compute(photographer_count: usize, user_count: usize) -> RatioReport {
    let total = photographer_count + user_count;
    let (photographer_percentage, user_percentage) = if total == 0 {
        (0, 0)
    } else {
        let p = (photographer_count as f64 / total as f64 * 100.0).round() as i32;
        (p, 100 - p)
    };

    RatioReport {
        photographer_count,
        user_count,
        photographer_percentage,
        user_percentage,
        deviation: (photographer_percentage - TARGET_PHOTOGRAPHER_PERCENTAGE).abs(),
        status: classify(photographer_percentage),
    }
}

/// Report over a queue (or a window of it)
pub fn compute_for_queue(queue: &[QueuedPhoto]) -> RatioReport {
    let photographer = queue
        .iter()
        .filter(|q| q.photo.source == PhotoSource::Photographer)
        .count();
    compute(photographer, queue.len() - photographer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seven_three_is_on_target() {
        let report = compute(7, 3);
        assert_eq!(report.photographer_percentage, 70);
        assert_eq!(report.user_percentage, 30);
        assert_eq!(report.deviation, 0);
        assert_eq!(report.status, RatioStatus::OnTarget);
    }

    #[test]
    fn test_empty_queue() {
        let report = compute(0, 0);
        assert_eq!(report.photographer_percentage, 0);
        assert_eq!(report.user_percentage, 0);
        assert_eq!(report.total(), 0);
    }

    #[test]
    fn test_warning_hints() {
        // 60% photographer
        assert_eq!(
            compute(6, 4).status,
            RatioStatus::Warning(RatioHint::NeedMorePhotographer)
        );
        // 80% photographer
        assert_eq!(
            compute(8, 2).status,
            RatioStatus::Warning(RatioHint::NeedMoreUser)
        );
    }

    #[test]
    fn test_classification_boundaries() {
        assert_eq!(classify(75), RatioStatus::OnTarget);
        assert_eq!(classify(65), RatioStatus::OnTarget);
        assert_eq!(classify(85), RatioStatus::Warning(RatioHint::NeedMoreUser));
        assert_eq!(
            classify(54),
            RatioStatus::OffTarget(RatioHint::NeedMorePhotographer)
        );
        assert_eq!(classify(100), RatioStatus::OffTarget(RatioHint::NeedMoreUser));
    }

    #[test]
    fn test_rounding() {
        // 2/3 = 66.67 -> 67
        let report = compute(2, 1);
        assert_eq!(report.photographer_percentage, 67);
        assert_eq!(report.user_percentage, 33);
    }
}
