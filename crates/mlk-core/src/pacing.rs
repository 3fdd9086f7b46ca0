//! Randomized delays and cancellable suspension points.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::settings::Range;

/// Uniform random duration in `[min, max]` seconds (millisecond resolution).
pub fn random_secs(range: Range) -> Duration {
    let lo = range.min().saturating_mul(1000);
    let hi = range.max().saturating_mul(1000);
    if lo == hi {
        return Duration::from_millis(lo);
    }
    Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
}

/// Uniform random integer in the inclusive range.
pub fn random_count(range: Range) -> u64 {
    if range.min() == range.max() {
        return range.min();
    }
    rand::thread_rng().gen_range(range.min()..=range.max())
}

/// Sleep for `dur` unless `cancel` fires first.
///
/// Returns `true` if the full duration elapsed, `false` when cancelled.
pub async fn sleep_or_cancel(cancel: &CancellationToken, dur: Duration) -> bool {
    if dur.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(dur) => true,
    }
}
