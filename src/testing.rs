//! In-memory fakes for the consumed external interfaces (spec §6),
//! used by this crate's own unit tests and by `demos/tracker_demo.rs`.
//! Not a substitute for the real cgroup/procfs handler, which is out of
//! scope (spec §1 Non-goals).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::handler::{
    CollectionResult, CollectorManager, ContainerHandler, CpuLoadReader, ListMode, SinkAdapter,
};
use crate::types::{
    ContainerReference, ContainerSpec, ContainerStats, CpuStats, LoadSample, MemoryStats,
    MetricValue, NetworkStats, TaskStats,
};

/// A handler whose `get_stats` returns either a fresh, monotonically
/// increasing sample each call, or the same sample every call, or one
/// that always reports itself as gone (spec §8 seed scenario 3).
pub struct FakeHandler {
    name: String,
    alive: bool,
    cgroup_resolvable: bool,
    growing: bool,
    counter: AtomicU64,
}

impl FakeHandler {
    pub fn alive(name: &str) -> Self {
        Self {
            name: name.to_string(),
            alive: true,
            cgroup_resolvable: true,
            growing: true,
            counter: AtomicU64::new(0),
        }
    }

    /// `get_stats` returns the identical sample every call, for
    /// exercising the "no change" adaptive-interval path (spec §8
    /// seed scenario 2).
    pub fn constant(name: &str) -> Self {
        Self {
            name: name.to_string(),
            alive: true,
            cgroup_resolvable: true,
            growing: false,
            counter: AtomicU64::new(0),
        }
    }

    pub fn dead() -> Self {
        Self {
            name: "/".to_string(),
            alive: false,
            cgroup_resolvable: true,
            growing: true,
            counter: AtomicU64::new(0),
        }
    }

    pub fn without_cgroup_path(name: &str) -> Self {
        Self {
            name: name.to_string(),
            alive: true,
            cgroup_resolvable: false,
            growing: true,
            counter: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl ContainerHandler for FakeHandler {
    async fn container_reference(&self) -> anyhow::Result<ContainerReference> {
        Ok(ContainerReference {
            name: self.name.clone(),
            aliases: Vec::new(),
            namespace: "fake".to_string(),
        })
    }

    async fn get_spec(&self) -> anyhow::Result<ContainerSpec> {
        Ok(ContainerSpec {
            has_cpu: true,
            has_memory: true,
            ..Default::default()
        })
    }

    async fn get_stats(&self) -> anyhow::Result<ContainerStats> {
        if !self.alive {
            return Err(anyhow::anyhow!("container gone"));
        }
        let n = if self.growing {
            self.counter.fetch_add(1, Ordering::SeqCst)
        } else {
            0
        };
        Ok(ContainerStats {
            timestamp: chrono::Utc::now(),
            cpu: CpuStats {
                total_ns: n * 1_000_000,
                system_ns: 0,
                user_ns: n * 1_000_000,
                throttled_ns: 0,
                load_average: -1,
            },
            memory: MemoryStats {
                usage_bytes: 1024 * 1024,
                rss_bytes: 512 * 1024,
                working_set_bytes: 768 * 1024,
            },
            filesystem: Vec::new(),
            diskio: Vec::new(),
            network: NetworkStats::default(),
            task_stats: TaskStats::default(),
            custom_metrics: None,
        })
    }

    async fn list_containers(&self, _mode: ListMode) -> anyhow::Result<Vec<ContainerReference>> {
        Ok(Vec::new())
    }

    async fn cgroup_path(&self, subsystem: &str) -> anyhow::Result<String> {
        if self.cgroup_resolvable {
            Ok(format!("/sys/fs/cgroup/{subsystem}{}", self.name))
        } else {
            Err(anyhow::anyhow!("cgroup path not resolvable"))
        }
    }

    async fn exists(&self) -> bool {
        self.alive
    }

    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn cleanup(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Always returns the same task-stat counts, tagged with the current
/// monotonic instant.
pub struct FakeCpuLoadReader {
    nr_running: u64,
    nr_uninterruptible: u64,
    nr_iowait: u64,
}

impl FakeCpuLoadReader {
    pub fn constant(nr_running: u64, nr_uninterruptible: u64, nr_iowait: u64) -> Self {
        Self {
            nr_running,
            nr_uninterruptible,
            nr_iowait,
        }
    }
}

#[async_trait]
impl CpuLoadReader for FakeCpuLoadReader {
    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self) {}

    async fn read(&self, _name: &str, _cpu_cgroup_path: &str) -> anyhow::Result<LoadSample> {
        Ok(LoadSample::new(
            self.nr_running,
            self.nr_uninterruptible,
            self.nr_iowait,
            std::time::Instant::now(),
        ))
    }
}

/// A collector manager with zero or one registered metric, always
/// ready to collect. Counts `collect()` calls so tests can assert on
/// how often the housekeeper actually invokes it.
pub struct FakeCollectorManager {
    metric_name: Option<String>,
    next_collection_delay: std::time::Duration,
    collect_calls: AtomicU64,
}

impl FakeCollectorManager {
    pub fn with_metric(name: &str) -> Self {
        Self {
            metric_name: Some(name.to_string()),
            next_collection_delay: std::time::Duration::ZERO,
            collect_calls: AtomicU64::new(0),
        }
    }

    /// Like `with_metric`, but `collect()` reports a `next_collection_time`
    /// `delay` in the future, so callers can exercise the housekeeper's
    /// "skip until due" gate.
    pub fn with_metric_and_delay(name: &str, delay: std::time::Duration) -> Self {
        Self {
            metric_name: Some(name.to_string()),
            next_collection_delay: delay,
            collect_calls: AtomicU64::new(0),
        }
    }

    pub fn empty() -> Self {
        Self {
            metric_name: None,
            next_collection_delay: std::time::Duration::ZERO,
            collect_calls: AtomicU64::new(0),
        }
    }

    pub fn collect_calls(&self) -> u64 {
        self.collect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CollectorManager for FakeCollectorManager {
    async fn get_spec(&self) -> anyhow::Result<Vec<crate::types::CustomMetricSpec>> {
        Ok(Vec::new())
    }

    async fn collect(&self) -> anyhow::Result<CollectionResult> {
        self.collect_calls.fetch_add(1, Ordering::SeqCst);
        let mut values = HashMap::new();
        if let Some(name) = &self.metric_name {
            values.insert(
                name.clone(),
                vec![MetricValue {
                    timestamp: chrono::Utc::now(),
                    value: 1.0,
                }],
            );
        }
        Ok(CollectionResult {
            next_collection_time: std::time::Instant::now() + self.next_collection_delay,
            values,
        })
    }

    async fn has_collectors(&self) -> bool {
        self.metric_name.is_some()
    }
}

/// Collects every pushed sample in memory, for assertions in tests and
/// the demo binary.
#[derive(Default)]
pub struct FakeSink {
    pub pushed: Mutex<Vec<(ContainerReference, ContainerStats)>>,
}

#[async_trait]
impl SinkAdapter for FakeSink {
    async fn add_stats(
        &self,
        reference: &ContainerReference,
        stats: &ContainerStats,
    ) -> anyhow::Result<()> {
        self.pushed
            .lock()
            .unwrap()
            .push((reference.clone(), stats.clone()));
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
