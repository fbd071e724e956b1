use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::ServiceRecord;

const NANOS_PER_DAY: i128 = 86_400 * 1_000_000_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GapAnnotation {
    pub prev_gap_days: Option<i64>,
    pub next_gap_days: Option<i64>,
}

/// Whole days from `a` to `b`, rounded toward negative infinity.
///
/// Signed: overlapping orders produce negative gaps, which are kept as is.
pub fn days_between(a: OffsetDateTime, b: OffsetDateTime) -> i64 {
    let nanos = (b - a).whole_nanoseconds();
    nanos.div_euclid(NANOS_PER_DAY) as i64
}

/// Annotate one ordered group with the gap to its neighbours.
///
/// `group` must already be sorted; gaps are only taken between adjacent entries of the slice,
/// so callers keep vehicles and service codes apart by passing one group at a time.
pub fn compute_gaps(group: &[ServiceRecord]) -> Vec<GapAnnotation> {
    let mut out = Vec::with_capacity(group.len());
    for (i, rec) in group.iter().enumerate() {
        let prev_gap_days = i
            .checked_sub(1)
            .and_then(|p| group[p].closed_at)
            .map(|prev_closed| days_between(prev_closed, rec.opened_at));
        let next_gap_days = match (rec.closed_at, group.get(i + 1)) {
            (Some(closed), Some(next)) => Some(days_between(closed, next.opened_at)),
            _ => None,
        };
        out.push(GapAnnotation {
            prev_gap_days,
            next_gap_days,
        });
    }
    out
}
