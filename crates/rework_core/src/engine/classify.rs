use serde::{Deserialize, Serialize};

use crate::engine::gaps::GapAnnotation;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Classification {
    pub is_rework: bool,
    pub is_correction: bool,
    pub is_first_correction: bool,
}

/// Threshold policy for one gap-annotated record.
///
/// A record with no measurable next gap is always a correction: nothing after it inside the
/// window can make it rework. Negative gaps compare as they are.
pub fn classify(gaps: GapAnnotation, min_days: u32) -> Classification {
    let threshold = i64::from(min_days);
    let is_rework = gaps.next_gap_days.is_some_and(|d| d <= threshold);
    let is_correction = !is_rework;
    let first_in_window = gaps.prev_gap_days.map_or(true, |d| d > threshold);
    Classification {
        is_rework,
        is_correction,
        is_first_correction: is_correction && first_in_window,
    }
}
