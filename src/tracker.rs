//! `ContainerTracker` — composes the housekeeper and load-probe loops
//! for one container, exposes info/stats queries, owns lifecycle
//! (spec §4.7).

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};

use crate::cache::TimeSeriesCache;
use crate::config::Tunables;
use crate::handler::{
    CollectorManager, ContainerHandler, CpuLoadReader, ListMode, SinkAdapter, SummaryReader,
};
use crate::housekeeper::Housekeeper;
use crate::load_probe::LoadProbe;
use crate::process_list::{parse_ps_output, ProcessInfo};
use crate::rate_limit::RateLimitedLogger;
use crate::scheduler::AdaptiveScheduler;
use crate::smoother::LoadSmoother;
use crate::types::{ContainerInfo, ContainerReference, ContainerSpec, LoadSample};

const SPEC_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Guarded by `spec_lock` (spec §5): everything that changes less often
/// than once per housekeeping cycle.
struct SpecState {
    spec: ContainerSpec,
    sub_containers: Vec<ContainerReference>,
    last_spec_refresh: Option<Instant>,
}

/// Runs a process listing (ps -e ... | optionally chrooted) for the
/// given tracker and returns its raw stdout. Thin enough that it is not
/// independently tested — the parser in `process_list` is (spec §6).
#[async_trait::async_trait]
pub trait ProcessLister: Send + Sync {
    async fn list(&self, in_host_namespace: bool) -> anyhow::Result<String>;
}

/// Reads a file from inside a container's mount namespace by trying
/// each candidate pid's `/proc/{pid}/root/{path}`.
#[async_trait::async_trait]
pub trait FileReader: Send + Sync {
    async fn pids(&self) -> anyhow::Result<Vec<u32>>;
    async fn read_at(&self, rootfs: &str, pid: u32, relative_path: &str) -> anyhow::Result<Vec<u8>>;
    async fn rootfs(&self) -> anyhow::Result<String>;
}

/// Composes handler + loops + shared cache/sink references for one
/// container (spec §4.7). A tracker never outlives its handler.
pub struct ContainerTracker {
    reference: ContainerReference,
    handler: Arc<dyn ContainerHandler>,
    cache: Arc<dyn TimeSeriesCache>,
    collector: Option<Arc<dyn CollectorManager>>,
    load_reader: Option<Arc<dyn CpuLoadReader>>,
    summary: Option<Arc<dyn SummaryReader>>,
    sink: Option<Arc<dyn SinkAdapter>>,
    process_lister: Option<Arc<dyn ProcessLister>>,
    file_reader: Option<Arc<dyn FileReader>>,
    tunables: Tunables,

    smoother: Arc<LoadSmoother>,
    spec_state: RwLock<SpecState>,
    logger: RateLimitedLogger,

    stop_housekeeper: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
    stop_load_probe: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
    housekeeper_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
    load_probe_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ContainerTracker {
    pub fn new(
        reference: ContainerReference,
        handler: Arc<dyn ContainerHandler>,
        cache: Arc<dyn TimeSeriesCache>,
        tunables: Tunables,
    ) -> Self {
        Self {
            reference,
            handler,
            cache,
            collector: None,
            load_reader: None,
            summary: None,
            sink: None,
            process_lister: None,
            file_reader: None,
            tunables,
            smoother: Arc::new(LoadSmoother::new()),
            spec_state: RwLock::new(SpecState {
                spec: ContainerSpec::default(),
                sub_containers: Vec::new(),
                last_spec_refresh: None,
            }),
            logger: RateLimitedLogger::per_minute(),
            stop_housekeeper: Mutex::new(None),
            stop_load_probe: Mutex::new(None),
            housekeeper_handle: Mutex::new(None),
            load_probe_handle: Mutex::new(None),
        }
    }

    pub fn with_collector(mut self, collector: Arc<dyn CollectorManager>) -> Self {
        self.collector = Some(collector);
        self
    }

    pub fn with_load_reader(mut self, reader: Arc<dyn CpuLoadReader>) -> Self {
        self.load_reader = Some(reader);
        self
    }

    pub fn with_summary(mut self, summary: Arc<dyn SummaryReader>) -> Self {
        self.summary = Some(summary);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn SinkAdapter>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_process_lister(mut self, lister: Arc<dyn ProcessLister>) -> Self {
        self.process_lister = Some(lister);
        self
    }

    pub fn with_file_reader(mut self, reader: Arc<dyn FileReader>) -> Self {
        self.file_reader = Some(reader);
        self
    }

    /// Spawn the housekeeping and load-probe loops. Returns once both
    /// are scheduled.
    pub async fn start(self: &Arc<Self>) -> anyhow::Result<()> {
        self.handler.start().await?;

        let (hk_tx, hk_rx) = tokio::sync::oneshot::channel();
        let housekeeper = Arc::new(Housekeeper {
            handler: self.handler.clone(),
            cache: self.cache.clone(),
            sink: self.sink.clone(),
            smoother: self.smoother.clone(),
            collector: self.collector.clone(),
            summary: self.summary.clone(),
            logger: RateLimitedLogger::per_minute(),
            log_usage: false,
            baseline: self.tunables.housekeeping_interval,
            next_collection_time: std::sync::Mutex::new(None),
        });
        // Spec §6 names a housekeeping baseline but no separate ceiling
        // tunable; we mirror the load-probe's 60x baseline/ceiling ratio
        // (1s baseline / 60s max) rather than leave the back-off
        // unbounded (see DESIGN.md Open Question decisions).
        let hk_scheduler = AdaptiveScheduler::new(
            self.tunables.housekeeping_interval,
            self.tunables.housekeeping_interval * 60,
            self.tunables.allow_dynamic_housekeeping,
        );
        let panic_timeout = self.tunables.panic_timeout;
        let hk_handle = tokio::spawn(housekeeper.run_loop(hk_scheduler, panic_timeout, hk_rx));
        *self.stop_housekeeper.lock().await = Some(hk_tx);
        *self.housekeeper_handle.lock().await = Some(hk_handle);

        if self.tunables.enable_load_reader {
            if let Some(reader) = &self.load_reader {
                reader.start().await?;
                let (lp_tx, lp_rx) = tokio::sync::oneshot::channel();
                let probe = Arc::new(LoadProbe {
                    handler: self.handler.clone(),
                    reader: reader.clone(),
                    smoother: self.smoother.clone(),
                    logger: RateLimitedLogger::per_minute(),
                    name: self.reference.name.clone(),
                    allow_dynamic: self.tunables.allow_dynamic_housekeeping,
                });
                let lp_scheduler = AdaptiveScheduler::new(
                    self.tunables.load_reader_interval,
                    self.tunables.max_load_reader_interval,
                    self.tunables.allow_dynamic_housekeeping,
                );
                let lp_handle = tokio::spawn(probe.run_loop(lp_scheduler, panic_timeout, lp_rx));
                *self.stop_load_probe.lock().await = Some(lp_tx);
                *self.load_probe_handle.lock().await = Some(lp_handle);
            }
        }

        Ok(())
    }

    /// Remove this container from the cache, signal both loops, wait
    /// for them to finish their cleanup.
    pub async fn stop(&self) -> anyhow::Result<()> {
        self.cache.remove(&self.reference.name).await?;

        if let Some(tx) = self.stop_housekeeper.lock().await.take() {
            let _ = tx.send(());
        }
        if let Some(tx) = self.stop_load_probe.lock().await.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.housekeeper_handle.lock().await.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.load_probe_handle.lock().await.take() {
            let _ = handle.await;
        }
        if let Some(sink) = &self.sink {
            sink.close().await?;
        }
        Ok(())
    }

    /// Returns a value-copy snapshot; refreshes spec/sub-containers
    /// first if the 5s refresh window has elapsed.
    pub async fn info(&self) -> anyhow::Result<ContainerInfo> {
        let needs_refresh = {
            let state = self.spec_state.read().await;
            state
                .last_spec_refresh
                .map(|t| t.elapsed() > SPEC_REFRESH_INTERVAL)
                .unwrap_or(true)
        };
        if needs_refresh {
            self.refresh_spec().await?;
            self.refresh_subcontainers().await?;
        }
        let state = self.spec_state.read().await;
        Ok(ContainerInfo {
            reference: self.reference.clone(),
            spec: state.spec.clone(),
            sub_containers: state.sub_containers.clone(),
        })
    }

    async fn refresh_spec(&self) -> anyhow::Result<()> {
        let mut spec = match self.handler.get_spec().await {
            Ok(s) => s,
            Err(e) => {
                if !self.handler.exists().await {
                    return Ok(());
                }
                return Err(e);
            }
        };
        if let Some(collector) = &self.collector {
            if let Ok(specs) = collector.get_spec().await {
                if !specs.is_empty() {
                    spec.has_custom_metrics = true;
                    spec.custom_metrics.extend(specs);
                }
            }
        }
        let mut state = self.spec_state.write().await;
        state.spec = spec;
        state.last_spec_refresh = Some(Instant::now());
        Ok(())
    }

    async fn refresh_subcontainers(&self) -> anyhow::Result<()> {
        let mut subs = match self.handler.list_containers(ListMode::ListRecursive).await {
            Ok(s) => s,
            Err(e) => {
                if !self.handler.exists().await {
                    return Ok(());
                }
                return Err(e);
            }
        };
        subs.retain(|r| r.name != self.reference.name);
        subs.sort_by(|a, b| a.name.cmp(&b.name));
        self.spec_state.write().await.sub_containers = subs;
        Ok(())
    }

    /// Delegates to the attached summary reader; fails if none is
    /// configured.
    pub async fn derived_stats(&self) -> anyhow::Result<crate::handler::DerivedStats> {
        match &self.summary {
            Some(summary) => summary.derived_stats().await,
            None => Err(anyhow::anyhow!("derived stats not enabled for this tracker")),
        }
    }

    pub async fn load_average(&self) -> f64 {
        self.smoother.read().await
    }

    pub async fn task_stats(&self) -> LoadSample {
        LoadSample {
            counts: self.smoother.cached_task_stats().await,
            probe_time: Instant::now(),
        }
    }

    /// Enumerate PIDs inside the container and try each candidate
    /// `{rootfs}/proc/{pid}/root/{relative_path}` in order.
    pub async fn read_file(&self, relative_path: &str, _in_host_namespace: bool) -> anyhow::Result<Vec<u8>> {
        let reader = self
            .file_reader
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("file reading not enabled for this tracker"))?;
        let rootfs = reader.rootfs().await?;
        for pid in reader.pids().await? {
            if let Ok(bytes) = reader.read_at(&rootfs, pid, relative_path).await {
                return Ok(bytes);
            }
        }
        Err(anyhow::anyhow!("file does not exist"))
    }

    pub async fn process_list(&self, in_host_namespace: bool) -> anyhow::Result<Vec<ProcessInfo>> {
        let lister = self
            .process_lister
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("process listing not enabled for this tracker"))?;
        let output = lister.list(in_host_namespace).await?;
        Ok(parse_ps_output(&output, &self.reference.name, None))
    }

    pub fn reference(&self) -> &ContainerReference {
        &self.reference
    }
}
