//! Position arithmetic for a single queue
//!
//! Every mutation is expressed as a plan: at most one contiguous range of
//! positions shifted by ±1, plus the position written for the touched entry.
//! The MySQL repository turns a plan into ranged UPDATEs inside one
//! transaction; the in-memory backend applies it to a vector. Both keep
//! positions equal to `0..len` after every operation.

use crate::error::{Error, Result};

/// Shift `delta` applied to every position in `start..=end` (`end = None` means unbounded)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionShift {
    pub start: i32,
    pub end: Option<i32>,
    pub delta: i32,
}

impl PositionShift {
    pub fn affects(&self, position: i32) -> bool {
        position >= self.start && self.end.map_or(true, |end| position <= end)
    }

    pub fn apply(&self, position: i32) -> i32 {
        if self.affects(position) {
            position + self.delta
        } else {
            position
        }
    }
}

/// Insert plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertPlan {
    pub position: i32,
    pub shift: Option<PositionShift>,
}

/// Remove plan (compaction after delete)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovePlan {
    pub shift: Option<PositionShift>,
}

/// Reorder plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReorderPlan {
    pub from: i32,
    pub to: i32,
    pub shift: PositionShift,
}

impl ReorderPlan {
    /// Number of other entries that move one slot
    pub fn shifted_count(&self) -> i32 {
        (self.from - self.to).abs()
    }
}

/// Plan an insert into a queue of `len` entries.
///
/// `None` appends. A requested position past the tail is clamped to `len`
/// so the queue stays gap-free.
pub fn plan_insert(len: usize, requested: Option<i32>) -> Result<InsertPlan> {
    let len = len as i32;
    let position = match requested {
        None => len,
        Some(p) if p < 0 => {
            return Err(Error::Validation(format!(
                "position must be non-negative, got {}",
                p
            )))
        }
        Some(p) => p.min(len),
    };

    let shift = (position < len).then_some(PositionShift {
        start: position,
        end: None,
        delta: 1,
    });

    Ok(InsertPlan { position, shift })
}

/// Plan the compaction after deleting the entry at `removed`
pub fn plan_remove(len: usize, removed: i32) -> RemovePlan {
    let last = len as i32 - 1;
    let shift = (removed < last).then_some(PositionShift {
        start: removed + 1,
        end: None,
        delta: -1,
    });
    RemovePlan { shift }
}

/// Plan moving the entry at `from` to `requested`.
///
/// Returns `Ok(None)` when the move is a no-op. Targets past the tail clamp
/// to the last slot.
pub fn plan_reorder(len: usize, from: i32, requested: i32) -> Result<Option<ReorderPlan>> {
    if requested < 0 {
        return Err(Error::Validation(format!(
            "position must be non-negative, got {}",
            requested
        )));
    }
    if len == 0 {
        return Ok(None);
    }

    let to = requested.min(len as i32 - 1);
    if to == from {
        return Ok(None);
    }

    let shift = if to < from {
        PositionShift {
            start: to,
            end: Some(from - 1),
            delta: 1,
        }
    } else {
        PositionShift {
            start: from + 1,
            end: Some(to),
            delta: -1,
        }
    };

    Ok(Some(ReorderPlan { from, to, shift }))
}

/// True when `positions` is exactly `{0, 1, ..., n-1}`
pub fn is_contiguous(positions: impl IntoIterator<Item = i32>) -> bool {
    let mut sorted: Vec<i32> = positions.into_iter().collect();
    sorted.sort_unstable();
    sorted.iter().enumerate().all(|(i, p)| *p == i as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_has_no_shift() {
        let plan = plan_insert(3, None).unwrap();
        assert_eq!(plan.position, 3);
        assert!(plan.shift.is_none());
    }

    #[test]
    fn test_insert_at_head_shifts_everything() {
        let plan = plan_insert(3, Some(0)).unwrap();
        assert_eq!(plan.position, 0);
        let shift = plan.shift.unwrap();
        assert!(shift.affects(0) && shift.affects(2));
        assert_eq!(shift.apply(2), 3);
    }

    #[test]
    fn test_insert_past_tail_clamps() {
        let plan = plan_insert(2, Some(10)).unwrap();
        assert_eq!(plan.position, 2);
        assert!(plan.shift.is_none());
    }

    #[test]
    fn test_insert_negative_rejected() {
        assert!(matches!(plan_insert(2, Some(-1)), Err(Error::Validation(_))));
    }

    #[test]
    fn test_remove_last_has_no_shift() {
        assert!(plan_remove(3, 2).shift.is_none());
        let shift = plan_remove(3, 0).shift.unwrap();
        assert_eq!(shift.apply(1), 0);
        assert_eq!(shift.apply(2), 1);
        assert!(!shift.affects(0));
    }

    #[test]
    fn test_reorder_earlier() {
        // [a b c d e], move d (3) -> 1: b, c shift up
        let plan = plan_reorder(5, 3, 1).unwrap().unwrap();
        assert_eq!(plan.shifted_count(), 2);
        assert_eq!(plan.shift.apply(1), 2);
        assert_eq!(plan.shift.apply(2), 3);
        assert_eq!(plan.shift.apply(0), 0);
        assert_eq!(plan.shift.apply(4), 4);
    }

    #[test]
    fn test_reorder_later() {
        let plan = plan_reorder(5, 0, 3).unwrap().unwrap();
        assert_eq!(plan.shifted_count(), 3);
        assert_eq!(plan.shift.apply(1), 0);
        assert_eq!(plan.shift.apply(3), 2);
        assert_eq!(plan.shift.apply(4), 4);
    }

    #[test]
    fn test_reorder_same_position_is_noop() {
        assert!(plan_reorder(5, 2, 2).unwrap().is_none());
        // clamped to tail, which is where it already is
        assert!(plan_reorder(5, 4, 9).unwrap().is_none());
    }

    #[test]
    fn test_is_contiguous() {
        assert!(is_contiguous(vec![]));
        assert!(is_contiguous(vec![2, 0, 1]));
        assert!(!is_contiguous(vec![0, 2]));
        assert!(!is_contiguous(vec![0, 1, 1]));
    }
}
