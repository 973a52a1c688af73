//! `LoadProbe` — per-container loop: read task stats via the handler,
//! feed the `LoadSmoother` (spec §4.6). Only runs when a `CpuLoadReader`
//! is configured.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::CoreError;
use crate::handler::{ContainerHandler, CpuLoadReader};
use crate::rate_limit::RateLimitedLogger;
use crate::scheduler::AdaptiveScheduler;
use crate::smoother::LoadSmoother;
use crate::types::LoadSample;

pub struct LoadProbe {
    pub handler: Arc<dyn ContainerHandler>,
    pub reader: Arc<dyn CpuLoadReader>,
    pub smoother: Arc<LoadSmoother>,
    pub logger: RateLimitedLogger,
    pub name: String,
    pub allow_dynamic: bool,
}

impl LoadProbe {
    /// Runs one iteration. Returns `true` if the scheduler should be
    /// signalled "changed" (task counts differ from the last sample, or
    /// dynamic back-off is disabled).
    pub async fn run_iteration(&self, last: &mut Option<LoadSample>) -> Result<bool, CoreError> {
        // Step 1: resolve the cpu cgroup path; skip quietly on failure.
        let cpu_cgroup_path = match self.handler.cgroup_path("cpu").await {
            Ok(p) => p,
            Err(_) => return Ok(false),
        };

        // Step 2: read the sample, capturing probe_time right after.
        let sample = match self.reader.read(&self.name, &cpu_cgroup_path).await {
            Ok(s) => s,
            Err(e) => {
                return if self.handler.exists().await {
                    Err(CoreError::TransientHandler(e))
                } else {
                    Err(CoreError::ContainerGone)
                };
            }
        };

        // Step 3: no-change signal.
        let changed = match last {
            Some(prev) if self.allow_dynamic => !prev.counts_equal(&sample),
            _ => true,
        };

        // Step 4: cache and feed the smoother under one lock.
        *last = Some(sample);
        self.smoother.observe_and_cache(sample).await;

        Ok(changed)
    }

    pub async fn run_loop(
        self: Arc<Self>,
        mut scheduler: AdaptiveScheduler,
        panic_timeout: Duration,
        mut stop: tokio::sync::oneshot::Receiver<()>,
    ) {
        let mut last: Option<LoadSample> = None;
        loop {
            if stop.try_recv().is_ok() {
                break;
            }

            let result = {
                // TimeoutGuard requires a 'static future; `last` is Copy
                // so a snapshot moves in and the (possibly updated)
                // value moves back out via the returned tuple.
                let me = self.clone();
                let snapshot = last;
                crate::timeout_guard::run("load_probe", panic_timeout, async move {
                    let mut local = snapshot;
                    let changed = me.run_iteration(&mut local).await?;
                    Ok((changed, local))
                })
                .await
            };

            match result {
                Ok((changed, new_last)) => {
                    last = new_last;
                    scheduler.signal(changed);
                }
                Err(e) if e.is_container_gone() => scheduler.signal(false),
                Err(e) => {
                    self.logger
                        .log_if_due(|| warn!(error = %e, "load probe iteration failed"))
                        .await;
                    scheduler.signal(false);
                }
            }

            tokio::select! {
                _ = scheduler.sleep() => {}
                _ = &mut stop => break,
            }
        }
        self.reader.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCpuLoadReader, FakeHandler};
    use std::time::Instant as StdInstant;

    #[tokio::test]
    async fn first_sample_always_signals_change() {
        let probe = LoadProbe {
            handler: Arc::new(FakeHandler::alive("/c1")),
            reader: Arc::new(FakeCpuLoadReader::constant(3, 0, 0)),
            smoother: Arc::new(LoadSmoother::new()),
            logger: RateLimitedLogger::per_minute(),
            name: "/c1".into(),
            allow_dynamic: true,
        };
        let mut last = None;
        let changed = probe.run_iteration(&mut last).await.unwrap();
        assert!(changed);
        assert!(last.is_some());
    }

    #[tokio::test]
    async fn identical_samples_signal_no_change_when_dynamic() {
        let probe = LoadProbe {
            handler: Arc::new(FakeHandler::alive("/c1")),
            reader: Arc::new(FakeCpuLoadReader::constant(3, 0, 0)),
            smoother: Arc::new(LoadSmoother::new()),
            logger: RateLimitedLogger::per_minute(),
            name: "/c1".into(),
            allow_dynamic: true,
        };
        let mut last = None;
        probe.run_iteration(&mut last).await.unwrap();
        let changed = probe.run_iteration(&mut last).await.unwrap();
        assert!(!changed);
    }

    #[tokio::test]
    async fn dynamic_disabled_always_signals_change() {
        let probe = LoadProbe {
            handler: Arc::new(FakeHandler::alive("/c1")),
            reader: Arc::new(FakeCpuLoadReader::constant(3, 0, 0)),
            smoother: Arc::new(LoadSmoother::new()),
            logger: RateLimitedLogger::per_minute(),
            name: "/c1".into(),
            allow_dynamic: false,
        };
        let mut last = Some(LoadSample::new(3, 0, 0, StdInstant::now()));
        let changed = probe.run_iteration(&mut last).await.unwrap();
        assert!(changed);
    }

    #[tokio::test]
    async fn unresolved_cgroup_path_skips_quietly() {
        let probe = LoadProbe {
            handler: Arc::new(FakeHandler::without_cgroup_path("/c1")),
            reader: Arc::new(FakeCpuLoadReader::constant(3, 0, 0)),
            smoother: Arc::new(LoadSmoother::new()),
            logger: RateLimitedLogger::per_minute(),
            name: "/c1".into(),
            allow_dynamic: true,
        };
        let mut last = None;
        let changed = probe.run_iteration(&mut last).await.unwrap();
        assert!(!changed);
        assert!(last.is_none());
    }
}
