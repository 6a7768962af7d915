//! Min-max rescaling of raw node scores.

use nodescore_core::{NodeScore, ScoreRange};

/// Rescale `scores` in place onto `range`.
///
/// The lowest raw value maps to `range.min()` and the highest to
/// `range.max()`, linearly in between with truncating division. When all
/// values are equal (a single node included) every score becomes
/// `range.min()`. Empty input is left alone.
pub fn normalize(scores: &mut [NodeScore], range: ScoreRange) {
    if scores.is_empty() {
        return;
    }

    let mut lowest = i64::MAX;
    let mut highest = i64::MIN;
    for s in scores.iter() {
        lowest = lowest.min(s.score);
        highest = highest.max(s.score);
    }

    // Both spans are non-negative and below 2^64, so their product fits.
    let old_range = (i128::from(highest) - i128::from(lowest)) as u128;
    let new_range = (i128::from(range.max()) - i128::from(range.min())) as u128;

    if old_range == 0 {
        for s in scores.iter_mut() {
            s.score = range.min();
        }
        return;
    }

    for s in scores.iter_mut() {
        let offset = (i128::from(s.score) - i128::from(lowest)) as u128;
        let scaled = offset * new_range / old_range;
        // scaled <= new_range, so min + scaled <= max.
        s.score = (i128::from(range.min()) + scaled as i128) as i64;
    }
}
