//! Data model shared across the telemetry core: container identity,
//! declared capabilities, and the per-sample stats bundle.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identity for a tracked container. Immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerReference {
    /// Canonical cgroup-like path, e.g. `"/"` for the root container.
    pub name: String,
    /// Human-facing aliases (container names, labels).
    pub aliases: Vec<String>,
    /// Namespace label (e.g. `"docker"`, `"containerd"`).
    pub namespace: String,
}

impl ContainerReference {
    pub fn root() -> Self {
        Self {
            name: "/".to_string(),
            aliases: Vec::new(),
            namespace: String::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.name == "/"
    }
}

/// A declared resource limit for one subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ResourceLimit {
    /// 0 means "unlimited" / not set.
    pub limit: u64,
}

/// A custom metric endpoint declared by the collector manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomMetricSpec {
    pub name: String,
    pub metric_type: String,
    pub units: String,
}

/// Declared capabilities and limits for a container. Refreshed at most
/// every 5 seconds from the handler (see `ContainerTracker::info`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ContainerSpec {
    pub has_cpu: bool,
    pub cpu_limit: ResourceLimit,
    pub has_memory: bool,
    pub memory_limit: ResourceLimit,
    pub has_network: bool,
    pub has_filesystem: bool,
    pub has_diskio: bool,
    pub has_custom_metrics: bool,
    pub custom_metrics: Vec<CustomMetricSpec>,
}

/// Snapshot bundle returned to callers: reference, spec, ordered
/// sub-container list. Always returned by value — mutating it never
/// affects tracker state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub reference: ContainerReference,
    pub spec: ContainerSpec,
    pub sub_containers: Vec<ContainerReference>,
}

/// Cumulative CPU time counters plus the smoothed load average.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct CpuStats {
    pub total_ns: u64,
    pub system_ns: u64,
    pub user_ns: u64,
    pub throttled_ns: u64,
    /// Milli-load: load average × 1000, truncated to an integer.
    pub load_average: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct MemoryStats {
    pub usage_bytes: u64,
    pub rss_bytes: u64,
    pub working_set_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FsStats {
    pub device: String,
    pub usage_bytes: u64,
    pub limit_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IoDirection {
    Read,
    Write,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskIoStats {
    pub device: String,
    pub direction: IoDirection,
    pub bytes: u64,
    pub ops: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct NetworkStats {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
}

/// Task-stat counts embedded in a `ContainerStats` sample, as opposed to
/// `LoadSample` which additionally carries the probe time for the
/// smoother.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TaskStats {
    pub nr_running: u64,
    pub nr_uninterruptible: u64,
    pub nr_iowait: u64,
}

/// A single reading of runnable/blocked task counts, timestamped with
/// the monotonic instant it was taken. Feeds `LoadSmoother::observe`.
#[derive(Debug, Clone, Copy)]
pub struct LoadSample {
    pub counts: TaskStats,
    pub probe_time: Instant,
}

impl LoadSample {
    pub fn new(nr_running: u64, nr_uninterruptible: u64, nr_iowait: u64, probe_time: Instant) -> Self {
        Self {
            counts: TaskStats {
                nr_running,
                nr_uninterruptible,
                nr_iowait,
            },
            probe_time,
        }
    }

    /// Sum fed into the smoother.
    pub fn raw(&self) -> f64 {
        (self.counts.nr_running + self.counts.nr_uninterruptible + self.counts.nr_iowait) as f64
    }

    /// Compares only the counts, ignoring `probe_time` — used by
    /// `LoadProbe` to detect "nothing changed" for back-off.
    pub fn counts_equal(&self, other: &LoadSample) -> bool {
        self.counts == other.counts
    }
}

/// A custom metric value sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// One sample at a monotonic-ordered wall-clock timestamp.
///
/// Invariant: cumulative counters are monotonically non-decreasing
/// within a container's lifetime; timestamps are strictly increasing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStats {
    pub timestamp: DateTime<Utc>,
    pub cpu: CpuStats,
    pub memory: MemoryStats,
    pub filesystem: Vec<FsStats>,
    pub diskio: Vec<DiskIoStats>,
    pub network: NetworkStats,
    pub task_stats: TaskStats,
    pub custom_metrics: Option<HashMap<String, Vec<MetricValue>>>,
}

impl ContainerStats {
    /// Two stats are "equal" iff every scalar field except `timestamp`
    /// matches. Used by the housekeeper to detect "nothing changed" and
    /// signal the adaptive scheduler to back off.
    ///
    /// Preserved verbatim from the source behaviour (§9 open question):
    /// this compares cumulative counters too, so it will rarely hold
    /// between two samples taken from a live container. That is
    /// intentional — the back-off therefore fires rarely in practice.
    pub fn stats_equal(&self, other: &ContainerStats) -> bool {
        self.cpu == other.cpu
            && self.memory == other.memory
            && self.filesystem == other.filesystem
            && self.diskio == other.diskio
            && self.network == other.network
            && self.task_stats == other.task_stats
            && self.custom_metrics == other.custom_metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(total_ns: u64) -> ContainerStats {
        ContainerStats {
            timestamp: Utc::now(),
            cpu: CpuStats {
                total_ns,
                ..Default::default()
            },
            memory: MemoryStats::default(),
            filesystem: Vec::new(),
            diskio: Vec::new(),
            network: NetworkStats::default(),
            task_stats: TaskStats::default(),
            custom_metrics: None,
        }
    }

    #[test]
    fn equality_ignores_timestamp() {
        let mut a = sample(100);
        let b = sample(100);
        assert!(a.stats_equal(&b));
        a.timestamp = a.timestamp + chrono::Duration::seconds(5);
        assert!(a.stats_equal(&b));
    }

    #[test]
    fn equality_detects_counter_change() {
        let a = sample(100);
        let b = sample(101);
        assert!(!a.stats_equal(&b));
    }

    #[test]
    fn load_sample_counts_equal_ignores_probe_time() {
        let t0 = Instant::now();
        let t1 = t0 + std::time::Duration::from_secs(5);
        let a = LoadSample::new(1, 2, 3, t0);
        let b = LoadSample::new(1, 2, 3, t1);
        assert!(a.counts_equal(&b));
        let c = LoadSample::new(1, 2, 4, t1);
        assert!(!a.counts_equal(&c));
    }
}
