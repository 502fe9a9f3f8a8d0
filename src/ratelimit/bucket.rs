//! Leaky bucket state for a single rate limit key.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// The duration every limit is expressed in terms of (calls per minute).
pub const WINDOW_DURATION: Duration = Duration::from_secs(60);

/// How much burst a bucket tolerates on top of the steady rate.
///
/// Buckets are sized to hold one second's worth of tokens. When that rounds
/// down to nothing the bucket still holds a single token.
pub const BURST_TOLERANCE: Duration = Duration::from_secs(1);

const WINDOW_NANOS: i64 = WINDOW_DURATION.as_nanos() as i64;
const BURST_NANOS: i64 = BURST_TOLERANCE.as_nanos() as i64;

/// The fill level of one key's bucket as of `updated_at`.
///
/// A `Bucket` is a plain value. Leakage is never applied in place; reads decay
/// the stored count to the requested instant and [`Bucket::plus`] returns a
/// fresh value anchored at the new instant.
///
/// The default bucket has no fill and a zero rate, so it leaks nothing and
/// behaves exactly like a key that has never been seen.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bucket {
    /// Instant at which `count` was accurate
    pub updated_at: DateTime<Utc>,
    /// Tokens per [`WINDOW_DURATION`] in effect when this value was written
    pub limit_per_window: i64,
    /// Fill level at `updated_at`
    pub count: f64,
}

impl Bucket {
    /// The reported count at `now`: the decayed fill rounded up.
    ///
    /// Any fractional fill still occupies a whole token.
    pub fn count_at(&self, now: DateTime<Utc>) -> i64 {
        self.fill_at(now).ceil() as i64
    }

    /// The exact decayed fill level at `now`, never below zero.
    pub fn fill_at(&self, now: DateTime<Utc>) -> f64 {
        let elapsed = as_nanos_f64(now.signed_duration_since(self.updated_at));
        let leakage = (self.limit_per_window as f64 * elapsed) / WINDOW_NANOS as f64;
        (self.count - leakage).max(0.0)
    }

    /// Return a new bucket holding the fill at `now` plus `add` tokens,
    /// recorded under `limit_per_window`.
    pub fn plus(&self, now: DateTime<Utc>, limit_per_window: i64, add: i64) -> Bucket {
        Bucket {
            updated_at: now,
            limit_per_window,
            count: self.fill_at(now) + add as f64,
        }
    }

    /// The instant at which the bucket will have leaked down to `count`.
    ///
    /// Works from the stored `count` and `updated_at` rather than a value
    /// decayed to `now`. Returns `now` for a negative target, when the stored
    /// count is already at or below the target, or when the computed instant
    /// has already passed.
    pub fn will_reach(&self, count: i64, now: DateTime<Utc>) -> DateTime<Utc> {
        if count < 0 {
            return now;
        }
        let need_to_leak = self.count - count as f64;
        if need_to_leak <= 0.0 || self.limit_per_window <= 0 {
            return now;
        }

        // Whole nanoseconds first, then an integer divide by the rate.
        let leak_nanos = (need_to_leak * WINDOW_NANOS as f64) as i64;
        let reset_at = self
            .updated_at
            .checked_add_signed(TimeDelta::nanoseconds(leak_nanos / self.limit_per_window))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        reset_at.max(now)
    }
}

/// The capacity of a bucket for the given limit per window.
///
/// One [`BURST_TOLERANCE`] worth of tokens at the steady rate, rounded up,
/// and never less than one.
pub fn bucket_size(limit_per_window: i64) -> i64 {
    let a = i128::from(limit_per_window) * i128::from(BURST_NANOS);
    let b = i128::from(WINDOW_NANOS);
    // positive integer ceiling division
    let size = (a + b - 1) / b;
    i64::try_from(size).unwrap_or(i64::MAX).max(1)
}

fn as_nanos_f64(delta: TimeDelta) -> f64 {
    match delta.num_nanoseconds() {
        Some(nanos) => nanos as f64,
        None => delta.num_milliseconds() as f64 * 1_000_000.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(updated_at: DateTime<Utc>, limit_per_window: i64, count: f64) -> Bucket {
        Bucket {
            updated_at,
            limit_per_window,
            count,
        }
    }

    #[test]
    fn test_count_at_without_leakage() {
        let now = Utc::now();
        assert_eq!(bucket(now, 100, 50.0).count_at(now), 50);
    }

    #[test]
    fn test_count_at_partial_leakage() {
        let now = Utc::now();
        // 60 per minute leaks one token per second
        let b = bucket(now, 60, 30.0);
        assert_eq!(b.count_at(now + TimeDelta::seconds(10)), 20);
    }

    #[test]
    fn test_count_at_complete_leakage() {
        let now = Utc::now();
        let b = bucket(now, 60, 30.0);
        assert_eq!(b.count_at(now + TimeDelta::minutes(1)), 0);
        assert_eq!(b.count_at(now + TimeDelta::hours(1)), 0);
    }

    #[test]
    fn test_count_at_rounds_up() {
        let now = Utc::now();
        assert_eq!(bucket(now, 60, 10.1).count_at(now), 11);
    }

    #[test]
    fn test_fill_is_non_increasing_over_time() {
        let start = Utc::now();
        let b = bucket(start, 90, 7.5);

        let mut previous = b.fill_at(start);
        for ms in (0..10_000).step_by(250) {
            let fill = b.fill_at(start + TimeDelta::milliseconds(ms));
            assert!(fill <= previous, "fill grew from {previous} to {fill}");
            assert!(fill >= 0.0);
            previous = fill;
        }
    }

    #[test]
    fn test_default_bucket_is_empty() {
        let now = Utc::now();
        let b = Bucket::default();
        assert_eq!(b.count_at(now), 0);
        assert_eq!(b.will_reach(0, now), now);
    }

    #[test]
    fn test_plus_applies_leakage_before_adding() {
        let now = Utc::now();
        let b = bucket(now - TimeDelta::seconds(10), 60, 20.0);

        let result = b.plus(now, 60, 5);

        assert_eq!(result.updated_at, now);
        assert_eq!(result.limit_per_window, 60);
        // 10 tokens leaked over 10 seconds: 20 - 10 + 5
        assert_eq!(result.count, 15.0);
    }

    #[test]
    fn test_plus_leaves_original_untouched() {
        let now = Utc::now();
        let b = bucket(now, 60, 1.0);

        let _ = b.plus(now, 120, 3);

        assert_eq!(b.count, 1.0);
        assert_eq!(b.limit_per_window, 60);
    }

    #[test]
    fn test_will_reach_negative_count_returns_now() {
        let now = Utc::now();
        assert_eq!(bucket(now, 60, 30.0).will_reach(-1, now), now);
    }

    #[test]
    fn test_will_reach_already_below_returns_now() {
        let now = Utc::now();
        assert_eq!(bucket(now, 60, 20.0).will_reach(30, now), now);
        assert_eq!(bucket(now, 60, 30.0).will_reach(30, now), now);
    }

    #[test]
    fn test_will_reach_future() {
        let now = Utc::now();
        let b = bucket(now, 60, 30.0);
        assert_eq!(b.will_reach(20, now), now + TimeDelta::seconds(10));
    }

    #[test]
    fn test_will_reach_in_past_returns_now() {
        let now = Utc::now();
        let b = bucket(now - TimeDelta::minutes(2), 60, 30.0);
        assert_eq!(b.will_reach(20, now), now);
    }

    #[test]
    fn test_will_reach_uses_stored_count() {
        let now = Utc::now();
        // Stored 10 tokens five seconds ago; the decayed fill is 5 but the
        // target is computed from the stored anchor.
        let b = bucket(now - TimeDelta::seconds(5), 60, 10.0);
        assert_eq!(b.will_reach(2, now), now + TimeDelta::seconds(3));
    }

    #[test]
    fn test_bucket_size() {
        assert_eq!(bucket_size(1), 1);
        assert_eq!(bucket_size(60), 1);
        assert_eq!(bucket_size(61), 2);
        assert_eq!(bucket_size(120), 2);
        assert_eq!(bucket_size(180), 3);
        assert_eq!(bucket_size(3600), 60);
    }

    #[test]
    fn test_bucket_size_has_floor_of_one() {
        assert_eq!(bucket_size(0), 1);
        assert_eq!(bucket_size(-5), 1);
    }

    #[test]
    fn test_bucket_size_does_not_overflow() {
        assert_eq!(bucket_size(i64::MAX), i64::MAX / 60 + 1);
    }

    #[test]
    fn test_bucket_lifecycle() {
        let now = Utc::now();
        let limit = 60;

        let b = bucket(now, limit, 0.0).plus(now, limit, 10);
        assert_eq!(b.count_at(now), 10);

        // 5 tokens leak in 5 seconds
        assert_eq!(b.count_at(now + TimeDelta::seconds(5)), 5);

        assert_eq!(b.will_reach(2, now), now + TimeDelta::seconds(8));
    }
}
