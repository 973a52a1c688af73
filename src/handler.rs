//! External interfaces consumed by the core (spec §6). Implementations
//! live outside this crate's scope (the OS-specific cgroup/procfs
//! reader, the collector manager, the remote sink) — this module only
//! defines the trait boundary the core programs against.

use async_trait::async_trait;

use crate::types::{ContainerReference, ContainerSpec, ContainerStats, CustomMetricSpec, LoadSample, MetricValue};

/// How `ContainerHandler::list_containers` should enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
    ListSelf,
    ListRecursive,
}

/// Reads spec/stats/lifecycle for one container from the host. Owned
/// exclusively by one `ContainerTracker` — never outlives it.
#[async_trait]
pub trait ContainerHandler: Send + Sync {
    async fn container_reference(&self) -> anyhow::Result<ContainerReference>;
    async fn get_spec(&self) -> anyhow::Result<ContainerSpec>;

    /// May return `Ok(partial)` alongside a later-reported error via the
    /// caller's own bookkeeping — callers that need "partial stats with
    /// error" semantics use `get_stats_fallible` instead.
    async fn get_stats(&self) -> anyhow::Result<ContainerStats>;

    /// Returns `(stats, error)` where `stats` may be `Some` even when
    /// `error` is `Some` (spec §4.5 step 1: "annotate error and continue
    /// with any partial stats").
    async fn get_stats_fallible(&self) -> (Option<ContainerStats>, Option<anyhow::Error>) {
        match self.get_stats().await {
            Ok(s) => (Some(s), None),
            Err(e) => (None, Some(e)),
        }
    }

    async fn list_containers(&self, mode: ListMode) -> anyhow::Result<Vec<ContainerReference>>;
    async fn cgroup_path(&self, subsystem: &str) -> anyhow::Result<String>;

    /// Distinguishes "container was destroyed mid-probe" from a real
    /// error.
    async fn exists(&self) -> bool;

    async fn start(&self) -> anyhow::Result<()>;
    async fn cleanup(&self) -> anyhow::Result<()>;
}

/// Reads task-stat samples for one container's cpu cgroup.
#[async_trait]
pub trait CpuLoadReader: Send + Sync {
    async fn start(&self) -> anyhow::Result<()>;
    async fn stop(&self);
    async fn read(&self, name: &str, cpu_cgroup_path: &str) -> anyhow::Result<LoadSample>;
}

/// Result of one collection pass: when to collect next, and the
/// metric values gathered, keyed by metric name.
pub struct CollectionResult {
    pub next_collection_time: std::time::Instant,
    pub values: std::collections::HashMap<String, Vec<MetricValue>>,
}

/// Evaluates user-defined metric endpoints. Shared across trackers —
/// must tolerate concurrent `collect()` calls.
#[async_trait]
pub trait CollectorManager: Send + Sync {
    async fn get_spec(&self) -> anyhow::Result<Vec<CustomMetricSpec>>;
    async fn collect(&self) -> anyhow::Result<CollectionResult>;

    /// True when at least one collector is registered; the housekeeper
    /// only attempts `collect()` when this holds and
    /// `next_collection_time` is in the past.
    async fn has_collectors(&self) -> bool;
}

/// Downstream time-series consumer. Internally buffers until
/// `ready_to_flush()` and then emits a batch atomically.
#[async_trait]
pub trait SinkAdapter: Send + Sync {
    async fn add_stats(
        &self,
        reference: &ContainerReference,
        stats: &ContainerStats,
    ) -> anyhow::Result<()>;

    async fn close(&self) -> anyhow::Result<()>;
}

/// Derived statistics (e.g. percentile summaries) computed from the
/// stream of samples fed to a `SummaryReader`. Deliberately opaque
/// here — the summarization algorithm itself is out of scope; this is
/// only the shape `ContainerTracker::derived_stats` hands back.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct DerivedStats {
    pub sample_count: u64,
    pub fields: std::collections::HashMap<String, f64>,
}

/// Optional attachment that receives every pushed sample and can later
/// answer `derived_stats()` queries. Errors from `add_sample` are
/// logged at low verbosity and discarded (spec §4.5 step 5).
#[async_trait]
pub trait SummaryReader: Send + Sync {
    async fn add_sample(&self, stats: &ContainerStats) -> anyhow::Result<()>;
    async fn derived_stats(&self) -> anyhow::Result<DerivedStats>;
}
