//! Opt-in background eviction of idle buckets.
//!
//! Without a sweeper the registry keeps every key it has ever seen for the
//! life of the process. The binary only starts one when
//! `eviction.sweep_interval_secs` is non-zero.

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::clock::Clock;
use super::counter::Counter;

/// Periodically evict buckets that have drained and sat idle for `idle_timeout`.
///
/// The task runs until aborted or until the runtime shuts down.
pub fn spawn_idle_sweeper<C: Clock + 'static>(
    counter: Arc<Counter<C>>,
    sweep_interval: Duration,
    idle_timeout: Duration,
) -> JoinHandle<()> {
    let idle = TimeDelta::from_std(idle_timeout).unwrap_or(TimeDelta::MAX);

    info!(
        sweep_interval_secs = sweep_interval.as_secs_f64(),
        idle_timeout_secs = idle_timeout.as_secs(),
        "Starting idle bucket sweeper"
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let evicted = counter.evict_idle(idle);
            debug!(evicted, tracked = counter.len(), "Idle sweep finished");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;

    #[tokio::test]
    async fn test_sweeper_evicts_drained_buckets() {
        let clock = ManualClock::default();
        let counter = Arc::new(Counter::with_clock(clock.clone()));

        counter.add("idle", 60, 1).unwrap();
        clock.advance(TimeDelta::minutes(10));

        let handle = spawn_idle_sweeper(
            Arc::clone(&counter),
            Duration::from_millis(10),
            Duration::from_secs(60),
        );

        let drained = tokio::time::timeout(Duration::from_secs(5), async {
            while !counter.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;

        handle.abort();
        assert!(drained.is_ok(), "sweeper never evicted the idle bucket");
    }

    #[tokio::test]
    async fn test_sweeper_keeps_recent_buckets() {
        let clock = ManualClock::default();
        let counter = Arc::new(Counter::with_clock(clock.clone()));

        counter.add("recent", 60, 1).unwrap();

        let handle = spawn_idle_sweeper(
            Arc::clone(&counter),
            Duration::from_millis(10),
            Duration::from_secs(60),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert_eq!(counter.len(), 1);
    }
}
