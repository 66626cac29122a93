use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, TimeZone};

/// `YYYY-mm-dd HH:MM:SS.mmm`, as written to the telemetry log.
pub fn format_datetime(time: &DateTime<Local>) -> String {
    time.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// Milliseconds since the Unix epoch -> local time. `None` for out-of-range input.
pub fn local_from_millis(timestamp_ms: i64) -> Option<DateTime<Local>> {
    Local.timestamp_millis_opt(timestamp_ms).single()
}

/// Current local time truncated to millisecond resolution.
pub fn now_millis() -> DateTime<Local> {
    let now = Local::now();
    local_from_millis(now.timestamp_millis()).unwrap_or(now)
}

pub fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

/// Join a worker thread, giving up after `timeout`.
///
/// Returns `true` when the thread finished in time. A thread that is still
/// running at the deadline is detached.
pub fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
    handle.join().is_ok()
}

/// Counts occurrences of a recurring failure and decides which ones get logged:
/// the first one, then every `every`-th.
#[derive(Debug, Clone)]
pub struct Throttle {
    every: u64,
    count: u64,
}

impl Throttle {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            count: 0,
        }
    }

    /// Record one occurrence. Returns the running total when it should be logged.
    pub fn hit(&mut self) -> Option<u64> {
        self.count += 1;
        if self.count == 1 || self.count % self.every == 0 {
            Some(self.count)
        } else {
            None
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}
