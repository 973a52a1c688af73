//! `StatsHousekeeper` — per-container loop: fetch stats, attach load and
//! custom metrics, push into the cache, forward to the sink (spec §4.5).

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::cache::{TimeSeriesCache, TimeSeriesCacheExt};
use crate::error::CoreError;
use crate::handler::{CollectorManager, ContainerHandler, SinkAdapter, SummaryReader};
use crate::rate_limit::RateLimitedLogger;
use crate::scheduler::AdaptiveScheduler;
use crate::smoother::LoadSmoother;
use crate::types::ContainerReference;

/// Everything one housekeeping iteration needs. Held by `ContainerTracker`
/// and passed by reference into `run_iteration` so the loop function
/// itself stays free of tracker-internal lock plumbing.
pub struct Housekeeper {
    pub handler: Arc<dyn ContainerHandler>,
    pub cache: Arc<dyn TimeSeriesCache>,
    pub sink: Option<Arc<dyn SinkAdapter>>,
    pub smoother: Arc<LoadSmoother>,
    pub collector: Option<Arc<dyn CollectorManager>>,
    pub summary: Option<Arc<dyn SummaryReader>>,
    pub logger: RateLimitedLogger,
    pub log_usage: bool,
    /// StatsHousekeeper scheduler's baseline, pinned at construction
    /// (spec §9 "Global tunables") — used only for the long-iteration
    /// warning threshold.
    pub baseline: Duration,
    /// `next_collection_time` from the collector's last result. `None`
    /// means "never collected" — step 6 treats that as due now.
    pub next_collection_time: Mutex<Option<Instant>>,
}

impl Housekeeper {
    /// Runs one iteration of the 9-step cycle (spec §4.5). Returns
    /// `true` if the scheduler should be signalled "changed" (a new
    /// sample differs from the cache's prior one, or no prior sample
    /// exists to compare against).
    pub async fn run_iteration(&self) -> Result<bool, CoreError> {
        let started = Instant::now();

        // Step 1-2: fetch stats, tolerating a dead container.
        let (stats, stats_err) = self.handler.get_stats_fallible().await;
        let Some(mut stats) = stats else {
            if !self.handler.exists().await {
                return Ok(false);
            }
            return Err(CoreError::TransientHandler(
                stats_err.unwrap_or_else(|| anyhow::anyhow!("get_stats returned no value")),
            ));
        };

        // Step 3: attach smoothed load average (milli-load).
        let load = self.smoother.read().await;
        if load >= 0.0 {
            stats.cpu.load_average = (load * 1000.0).round() as i64;
        }

        // Step 4: attach cached task stats.
        stats.task_stats = self.smoother.cached_task_stats().await;

        // Step 5: feed summary reader, discard its errors.
        if let Some(summary) = &self.summary {
            if let Err(e) = summary.add_sample(&stats).await {
                debug!(error = %e, "summary reader rejected sample");
            }
        }

        // Step 6: custom metrics, gated on next_collection_time and
        // tolerated the same way as stats.
        let mut custom_err = None;
        if let Some(collector) = &self.collector {
            let due = match *self.next_collection_time.lock().unwrap() {
                Some(t) => Instant::now() >= t,
                None => true,
            };
            if due && collector.has_collectors().await {
                match collector.collect().await {
                    Ok(result) => {
                        *self.next_collection_time.lock().unwrap() = Some(result.next_collection_time);
                        stats.custom_metrics = Some(result.values);
                    }
                    Err(e) => {
                        if self.handler.exists().await {
                            custom_err = Some(e);
                        }
                    }
                }
            }
        }

        // Step 7: resolve reference, same dead-container tolerance.
        let reference = match self.handler.container_reference().await {
            Ok(r) => r,
            Err(e) => {
                if !self.handler.exists().await {
                    return Ok(false);
                }
                return Err(CoreError::TransientHandler(e));
            }
        };

        // Step 8: push into cache, then forward to the remote sink.
        if let Some(sink) = &self.sink {
            sink.add_stats(&reference, &stats).await.map_err(CoreError::Sink)?;
        }
        self.cache
            .add(&reference, stats)
            .await
            .map_err(CoreError::Sink)?;

        // Adaptive-interval signal: now that this cycle's sample is in
        // the cache, compare the two most recent entries (spec §4.5
        // "after each cycle" / §8 scenario 2).
        let changed = self.changed_since_last(&reference).await;

        if self.log_usage {
            self.log_usage_window(&reference).await;
        }

        self.warn_if_slow(started);

        // Step 9: report the first non-nil error.
        if let Some(e) = stats_err {
            return Err(CoreError::PartialStats(e));
        }
        if let Some(e) = custom_err {
            return Err(CoreError::TransientHandler(e));
        }
        Ok(changed)
    }

    /// Compares the two most recent cached samples via the §3 equality
    /// rule. Called after this cycle's sample has been pushed, so
    /// `samples[0]` is the one just fetched.
    async fn changed_since_last(&self, reference: &ContainerReference) -> bool {
        match self.cache.last_n(&reference.name, 2).await {
            Ok(samples) if samples.len() == 2 => !samples[0].stats_equal(&samples[1]),
            _ => true,
        }
    }

    async fn log_usage_window(&self, reference: &ContainerReference) {
        let Ok(samples) = self.cache.last_n(&reference.name, 60).await else {
            return;
        };
        if samples.len() < 60 {
            return;
        }
        // newest-first: index 0 is tₙ, index 59 is t₀.
        let newest = &samples[0];
        let prev = &samples[1];
        let oldest = &samples[59];

        let dt_instant = (newest.timestamp - prev.timestamp).num_microseconds().unwrap_or(0) as f64 / 1_000_000.0;
        let instantaneous_cores = if dt_instant > 0.0 {
            (newest.cpu.total_ns.saturating_sub(prev.cpu.total_ns)) as f64 / 1e9 / dt_instant
        } else {
            0.0
        };

        let dt_window = (newest.timestamp - oldest.timestamp).num_microseconds().unwrap_or(0) as f64 / 1_000_000.0;
        let average_cores = if dt_window > 0.0 {
            (newest.cpu.total_ns.saturating_sub(oldest.cpu.total_ns)) as f64 / 1e9 / dt_window
        } else {
            0.0
        };

        tracing::info!(
            container = %reference.name,
            instantaneous_cores,
            average_cores,
            memory_bytes = newest.memory.usage_bytes,
            "usage"
        );
    }

    fn warn_if_slow(&self, started: Instant) {
        let threshold = std::cmp::max(Duration::from_millis(100), self.baseline / 2);
        let elapsed = started.elapsed();
        if elapsed >= threshold {
            warn!(elapsed_ms = elapsed.as_millis() as u64, "housekeeping iteration ran long");
        }
    }
}

impl Housekeeper {
    /// Runs the full adaptive loop until `stop` resolves. `scheduler` is
    /// owned exclusively by this call (each tracker loop gets its own).
    pub async fn run_loop(
        self: Arc<Self>,
        mut scheduler: AdaptiveScheduler,
        panic_timeout: Duration,
        mut stop: tokio::sync::oneshot::Receiver<()>,
    ) {
        loop {
            if stop.try_recv().is_ok() {
                break;
            }

            let me = self.clone();
            let label = "housekeeper";
            let result = crate::timeout_guard::run(label, panic_timeout, async move {
                me.run_iteration().await
            })
            .await;

            match result {
                Ok(changed) => scheduler.signal(changed),
                Err(e) if e.is_container_gone() => scheduler.signal(false),
                Err(e) => {
                    self.logger
                        .log_if_due(|| warn!(error = %e, "housekeeping iteration failed"))
                        .await;
                    scheduler.signal(false);
                }
            }

            tokio::select! {
                _ = scheduler.sleep() => {}
                _ = &mut stop => break,
            }
        }
        self.handler.cleanup().await.ok();
    }
}
