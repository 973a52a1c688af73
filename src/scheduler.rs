//! `AdaptiveScheduler` — drives a periodic task with jittered sleep,
//! doubling its interval up to a cap when the caller reports "no
//! change", resetting to baseline on any reported change (spec §4.3).

use std::time::{Duration, Instant};

use rand::RngExt;

/// Per-loop adaptive interval state. Not `Clone` — each of the two
/// per-tracker loops (housekeeper, load probe) owns one instance.
#[derive(Debug)]
pub struct AdaptiveScheduler {
    baseline: Duration,
    ceiling: Duration,
    current: Duration,
    dynamic: bool,
    last_wake: Instant,
}

impl AdaptiveScheduler {
    pub fn new(baseline: Duration, ceiling: Duration, dynamic: bool) -> Self {
        Self {
            baseline,
            ceiling,
            current: baseline,
            dynamic,
            last_wake: Instant::now(),
        }
    }

    /// Current interval, for diagnostics/tests.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Record the caller's change signal and advance `current`
    /// accordingly. Call once per iteration, before sleeping.
    pub fn signal(&mut self, changed: bool) {
        if !self.dynamic {
            self.current = self.baseline;
            return;
        }
        self.current = if changed {
            self.baseline
        } else {
            std::cmp::min(self.current.saturating_mul(2), self.ceiling)
        };
    }

    /// Sleep until the next iteration. Next wake = `last_wake +
    /// uniform(current, 2*current)` — jitter factor 1.0. If real time
    /// has already overshot that window, wakes immediately (no
    /// catch-up burst).
    pub async fn sleep(&mut self) {
        let jittered = jittered_delay(self.current);
        let target = self.last_wake + jittered;
        let now = Instant::now();
        if target > now {
            tokio::time::sleep(target - now).await;
        }
        self.last_wake = Instant::now();
    }
}

fn jittered_delay(current: Duration) -> Duration {
    if current.is_zero() {
        return Duration::ZERO;
    }
    let low_ns = current.as_nanos();
    let high_ns = low_ns.saturating_mul(2);
    let extra_ns = rand::rng().random_range(0..=(high_ns - low_ns).max(1));
    Duration::from_nanos((low_ns + extra_ns).min(u64::MAX as u128) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_change_doubles_up_to_ceiling() {
        let mut s = AdaptiveScheduler::new(
            Duration::from_secs(1),
            Duration::from_secs(8),
            true,
        );
        let mut intervals = Vec::new();
        for _ in 0..5 {
            s.signal(false);
            intervals.push(s.current());
        }
        assert_eq!(
            intervals,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(8),
                Duration::from_secs(8),
            ]
        );
    }

    #[test]
    fn change_resets_to_baseline() {
        let mut s = AdaptiveScheduler::new(
            Duration::from_secs(1),
            Duration::from_secs(8),
            true,
        );
        for _ in 0..3 {
            s.signal(false);
        }
        assert_eq!(s.current(), Duration::from_secs(8));
        s.signal(true);
        assert_eq!(s.current(), Duration::from_secs(1));
    }

    #[test]
    fn seed_scenario_four_identical_then_one_different() {
        // spec §8 seed scenario 2: baseline 1s, ceiling 8s.
        let mut s = AdaptiveScheduler::new(
            Duration::from_secs(1),
            Duration::from_secs(8),
            true,
        );
        let mut seen = Vec::new();
        for _ in 0..4 {
            s.signal(false);
            seen.push(s.current());
        }
        assert_eq!(
            seen,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(8),
            ]
        );
        s.signal(true);
        assert_eq!(s.current(), Duration::from_secs(1));
    }

    #[test]
    fn pinned_to_baseline_when_dynamic_disabled() {
        let mut s = AdaptiveScheduler::new(
            Duration::from_secs(1),
            Duration::from_secs(8),
            false,
        );
        s.signal(false);
        assert_eq!(s.current(), Duration::from_secs(1));
        s.signal(false);
        assert_eq!(s.current(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_does_not_burst_catch_up_when_overshot() {
        let mut s = AdaptiveScheduler::new(
            Duration::from_millis(10),
            Duration::from_millis(80),
            true,
        );
        // Simulate real time already overshooting the next window.
        s.last_wake = Instant::now() - Duration::from_secs(10);
        let start = Instant::now();
        s.sleep().await;
        // Should return near-immediately, not sleep an extra window.
        assert!(Instant::now().duration_since(start) < Duration::from_millis(5));
    }

    proptest::proptest! {
        #[test]
        fn n_consecutive_no_change_signals_double_up_to_ceiling(n in 0u32..20) {
            let baseline = Duration::from_millis(1);
            let ceiling = Duration::from_millis(1 << 16);
            let mut s = AdaptiveScheduler::new(baseline, ceiling, true);
            for _ in 0..n {
                s.signal(false);
            }
            let expected = baseline.saturating_mul(1u32.checked_shl(n).unwrap_or(u32::MAX)).min(ceiling);
            prop_assert_eq!(s.current(), expected);
        }

        #[test]
        fn any_change_signal_resets_to_baseline(n in 0u32..20) {
            let baseline = Duration::from_millis(5);
            let ceiling = Duration::from_secs(1);
            let mut s = AdaptiveScheduler::new(baseline, ceiling, true);
            for _ in 0..n {
                s.signal(false);
            }
            s.signal(true);
            prop_assert_eq!(s.current(), baseline);
        }
    }
}
