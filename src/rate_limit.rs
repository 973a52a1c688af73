//! Per-tracker rate-limited logging (spec §7, §9: "log at most once per
//! minute… lives with each tracker", not a process-wide throttle).

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

pub struct RateLimitedLogger {
    min_interval: Duration,
    last_log: Mutex<Option<Instant>>,
}

impl RateLimitedLogger {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_log: Mutex::new(None),
        }
    }

    pub fn per_minute() -> Self {
        Self::new(Duration::from_secs(60))
    }

    /// Runs `f` only if `min_interval` has elapsed since the last time
    /// this logger fired. Returns whether it fired.
    pub async fn log_if_due(&self, f: impl FnOnce()) -> bool {
        let mut last = self.last_log.lock().await;
        let now = Instant::now();
        let due = match *last {
            None => true,
            Some(t) => now.duration_since(t) >= self.min_interval,
        };
        if due {
            f();
            *last = Some(now);
        }
        due
    }
}
