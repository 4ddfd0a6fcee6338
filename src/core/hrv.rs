//! Heart-rate variability statistics.

/// Minimum number of beat intervals needed for RMSSD.
pub const MIN_INTERVALS: usize = 3;

/// Root mean square of successive differences between beat intervals, in ms.
///
/// Returns `None` for fewer than [`MIN_INTERVALS`] intervals.
pub fn rmssd(intervals_ms: &[u32]) -> Option<f64> {
    if intervals_ms.len() < MIN_INTERVALS {
        return None;
    }

    let sum_sq: f64 = intervals_ms
        .windows(2)
        .map(|pair| {
            let diff = f64::from(pair[1]) - f64::from(pair[0]);
            diff * diff
        })
        .sum();

    Some((sum_sq / (intervals_ms.len() - 1) as f64).sqrt())
}
