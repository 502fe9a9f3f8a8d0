//! Keyed registry of leaky buckets and the admission decision.

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::bucket::{bucket_size, Bucket};
use super::clock::{Clock, SystemClock};
use crate::error::{RatewellError, Result};

/// Rate limit information produced by a single [`Counter::add`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Info {
    /// The key that was checked
    pub bucket: String,
    /// When a call of the same size (or, after an admission, a single token)
    /// will next fit in the bucket
    pub reset_at: DateTime<Utc>,
    /// Capacity of the bucket, 0 when no limit applies
    pub bucket_size: i64,
    /// Tokens left after this call
    pub remaining: i64,
    /// Whether the call was admitted
    pub allowed: bool,
}

impl Info {
    fn unlimited(key: &str, now: DateTime<Utc>) -> Self {
        Self {
            bucket: key.to_string(),
            reset_at: now,
            bucket_size: 0,
            remaining: 0,
            allowed: true,
        }
    }
}

/// A leaky bucket counter limiting calls per minute for each key independently.
///
/// The counter owns its registry; create one per server (or per test) and share
/// it behind an `Arc`. Buckets are replaced wholesale on every admission and
/// never mutated in place.
#[derive(Debug)]
pub struct Counter<C: Clock = SystemClock> {
    /// Current bucket state indexed by key
    buckets: DashMap<String, Bucket>,
    /// Time source for leakage
    clock: C,
}

impl Counter {
    /// Create a counter driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> Counter<C> {
    /// Create a counter driven by the given clock.
    pub fn with_clock(clock: C) -> Self {
        Self {
            buckets: DashMap::new(),
            clock,
        }
    }

    /// Try to add `add` tokens to the bucket for `key` under `limit_per_window`
    /// calls per minute.
    ///
    /// A limit of zero disables limiting and always admits. A rejected call
    /// leaves the bucket untouched. Negative limits or amounts are refused
    /// with [`RatewellError::InvalidArgument`].
    pub fn add(&self, key: &str, limit_per_window: i64, add: i64) -> Result<Info> {
        if limit_per_window < 0 {
            return Err(RatewellError::InvalidArgument(format!(
                "limit per window must not be negative, got {limit_per_window}"
            )));
        }
        if add < 0 {
            return Err(RatewellError::InvalidArgument(format!(
                "token amount must not be negative, got {add}"
            )));
        }

        let now = self.clock.now();

        if limit_per_window == 0 {
            return Ok(Info::unlimited(key, now));
        }

        trace!(key = %key, limit_per_window, add, "Checking rate limit");

        // The entry guard holds the shard lock until the decision is written
        // back, so concurrent calls on the same key cannot both read the same
        // pre-update bucket.
        let entry = self.buckets.entry(key.to_string());
        let existing = match &entry {
            Entry::Occupied(occupied) => *occupied.get(),
            Entry::Vacant(_) => Bucket::default(),
        };

        let new_bucket = existing.plus(now, limit_per_window, add);
        let new_count = new_bucket.count_at(now);
        let bucket_size = bucket_size(limit_per_window);

        if new_count > bucket_size {
            debug!(
                key = %key,
                count = new_count,
                bucket_size,
                "Rate limit exceeded"
            );
            return Ok(Info {
                bucket: key.to_string(),
                reset_at: existing.will_reach(bucket_size - add, now),
                bucket_size,
                remaining: (bucket_size - existing.count_at(now)).max(0),
                allowed: false,
            });
        }

        match entry {
            Entry::Occupied(mut occupied) => {
                occupied.insert(new_bucket);
            }
            Entry::Vacant(vacant) => {
                debug!(key = %key, bucket_size, "Creating new rate limit bucket");
                vacant.insert(new_bucket);
            }
        }

        Ok(Info {
            bucket: key.to_string(),
            reset_at: new_bucket.will_reach(bucket_size - 1, now),
            bucket_size,
            remaining: bucket_size - new_count,
            allowed: true,
        })
    }

    /// Drop buckets that have fully drained and have not been written for at
    /// least `idle`. Returns the number of buckets removed.
    ///
    /// A drained bucket answers every query the same way an absent one does,
    /// so eviction never changes a decision. Nothing calls this on its own;
    /// see [`spawn_idle_sweeper`](super::spawn_idle_sweeper).
    pub fn evict_idle(&self, idle: TimeDelta) -> usize {
        let now = self.clock.now();
        let mut evicted = 0;

        self.buckets.retain(|_, bucket| {
            let keep = bucket.fill_at(now) > 0.0
                || now.signed_duration_since(bucket.updated_at) < idle;
            if !keep {
                evicted += 1;
            }
            keep
        });

        if evicted > 0 {
            debug!(evicted, remaining = self.buckets.len(), "Evicted idle buckets");
        }
        evicted
    }

    /// Get a copy of the stored bucket for `key`, if any.
    pub fn bucket(&self, key: &str) -> Option<Bucket> {
        self.buckets.get(key).map(|b| *b)
    }

    /// Get the number of tracked keys.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether no key is tracked.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Clear all buckets.
    pub fn clear(&self) {
        self.buckets.clear();
    }

    #[cfg(test)]
    fn insert_bucket(&self, key: &str, bucket: Bucket) {
        self.buckets.insert(key.to_string(), bucket);
    }
}
