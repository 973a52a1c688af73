//! `LoadSmoother` — exponentially decayed load average from
//! variable-interval task-stat samples (spec §4.2).

use std::time::Instant;

use tokio::sync::Mutex;

use crate::types::{LoadSample, TaskStats};

/// Time constant of the EMA, in seconds. Chosen so the smoother
/// converges to a new constant `raw` within ~10s regardless of sample
/// spacing, so adaptive back-off of the probe interval does not
/// distort the average.
const TIME_CONSTANT_SECS: f64 = 10.0;

struct SmootherState {
    /// -1.0 means "never observed".
    avg: f64,
    last_probe: Option<Instant>,
    cached_task_stats: TaskStats,
}

/// `load_lock` from spec §5: guards both the EMA state and the
/// `cached_task_stats` the housekeeper attaches into each sample.
/// Distinct from a tracker's `spec_lock` — never held alongside it.
///
/// The source read task stats under one mutex and then called the
/// smoother (which re-acquired the same mutex); this type instead
/// makes one acquisition span both updates (spec §9 open question),
/// via `observe_and_cache`.
pub struct LoadSmoother {
    state: Mutex<SmootherState>,
}

impl Default for LoadSmoother {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadSmoother {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SmootherState {
                avg: -1.0,
                last_probe: None,
                cached_task_stats: TaskStats::default(),
            }),
        }
    }

    /// Feed one load sample into the EMA. Exposed standalone for the
    /// exact §4.2 algorithm and its seed tests; `LoadProbe` uses
    /// `observe_and_cache` instead so the task-stats update shares the
    /// same lock acquisition.
    pub async fn observe(&self, sample: LoadSample) {
        let mut state = self.state.lock().await;
        self.apply(&mut state, sample);
    }

    /// Update the EMA and `cached_task_stats` under a single lock
    /// acquisition.
    pub async fn observe_and_cache(&self, sample: LoadSample) {
        let mut state = self.state.lock().await;
        state.cached_task_stats = sample.counts;
        self.apply(&mut state, sample);
    }

    fn apply(&self, state: &mut SmootherState, sample: LoadSample) {
        let raw = sample.raw();

        let last_probe = match state.last_probe {
            None => {
                state.avg = raw;
                state.last_probe = Some(sample.probe_time);
                return;
            }
            Some(t) => t,
        };

        let dt = sample
            .probe_time
            .saturating_duration_since(last_probe)
            .as_secs_f64();
        let decay = (-dt / TIME_CONSTANT_SECS).exp();
        state.avg = raw * (1.0 - decay) + state.avg * decay;
        state.last_probe = Some(sample.probe_time);
    }

    /// Snapshot read of the current average (-1.0 if never observed).
    pub async fn read(&self) -> f64 {
        self.state.lock().await.avg
    }

    /// Snapshot read of the last task-stat sample cached by
    /// `observe_and_cache`.
    pub async fn cached_task_stats(&self) -> TaskStats {
        self.state.lock().await.cached_task_stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn uninitialised_reads_negative_one() {
        let s = LoadSmoother::new();
        assert_eq!(s.read().await, -1.0);
    }

    #[tokio::test]
    async fn first_observe_bootstraps_average() {
        // spec §8 seed scenario 1
        let s = LoadSmoother::new();
        let t0 = Instant::now();
        s.observe(LoadSample::new(3, 0, 0, t0)).await;
        assert_eq!(s.read().await, 3.0);
    }

    #[tokio::test]
    async fn ten_second_gap_matches_expected_decay() {
        let s = LoadSmoother::new();
        let t0 = Instant::now();
        s.observe(LoadSample::new(3, 0, 0, t0)).await;
        let t1 = t0 + Duration::from_secs(10);
        s.observe(LoadSample::new(5, 0, 0, t1)).await;
        let avg = s.read().await;
        // 5*(1 - e^-1) + 3*e^-1 ~= 4.264
        assert!((avg - 4.264).abs() < 0.01, "avg = {avg}");
    }

    #[tokio::test]
    async fn converges_within_ten_seconds_of_constant_raw() {
        let s = LoadSmoother::new();
        let mut t = Instant::now();
        s.observe(LoadSample::new(10, 0, 0, t)).await;
        // Feed a constant raw value in 1s steps for 10s.
        for _ in 0..10 {
            t += Duration::from_secs(1);
            s.observe(LoadSample::new(10, 0, 0, t)).await;
        }
        let avg = s.read().await;
        assert!((avg - 10.0).abs() < 0.1, "avg = {avg}");
    }

    #[tokio::test]
    async fn observe_and_cache_updates_both_under_one_lock() {
        let s = LoadSmoother::new();
        let t0 = Instant::now();
        s.observe_and_cache(LoadSample::new(2, 1, 0, t0)).await;
        assert_eq!(s.read().await, 3.0);
        assert_eq!(
            s.cached_task_stats().await,
            crate::types::TaskStats {
                nr_running: 2,
                nr_uninterruptible: 1,
                nr_iowait: 0,
            }
        );
    }

    #[tokio::test]
    async fn distance_to_raw_shrinks_monotonically() {
        let s = LoadSmoother::new();
        let mut t = Instant::now();
        s.observe(LoadSample::new(0, 0, 0, t)).await;
        let mut prev_dist = f64::MAX;
        for _ in 0..20 {
            t += Duration::from_secs(1);
            s.observe(LoadSample::new(10, 0, 0, t)).await;
            let dist = (s.read().await - 10.0).abs();
            assert!(dist <= prev_dist + 1e-9);
            prev_dist = dist;
        }
    }

    proptest::proptest! {
        #[test]
        fn converges_to_any_constant_raw_within_ten_seconds(raw in 0u64..1000) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let s = LoadSmoother::new();
                let mut t = Instant::now();
                s.observe(LoadSample::new(raw, 0, 0, t)).await;
                for _ in 0..10 {
                    t += Duration::from_secs(1);
                    s.observe(LoadSample::new(raw, 0, 0, t)).await;
                }
                let avg = s.read().await;
                prop_assert!((avg - raw as f64).abs() < 0.1 * (raw as f64).max(1.0));
                Ok(())
            })?;
        }
    }
}
