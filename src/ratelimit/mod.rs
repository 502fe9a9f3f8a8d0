//! Leaky bucket rate limiting and per-key state management.

mod bucket;
mod clock;
mod counter;
mod eviction;

pub use bucket::{bucket_size, Bucket, BURST_TOLERANCE, WINDOW_DURATION};
pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::{Counter, Info};
pub use eviction::spawn_idle_sweeper;
