//! `TimeSeriesCache` — the contract consumed by the core (spec §4.1),
//! plus a bounded in-memory ring implementation.
//!
//! The cache is shared across all trackers on a host and must be
//! internally thread-safe (spec §5 "Shared resources").

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::types::{ContainerReference, ContainerStats};

/// Consumed contract: `add`, `recent`, `remove`. Bounds and eviction
/// are the cache's concern, not the core's.
#[async_trait]
pub trait TimeSeriesCache: Send + Sync {
    async fn add(&self, reference: &ContainerReference, stats: ContainerStats)
        -> anyhow::Result<()>;

    /// Returns samples for `name`, newest-first, optionally bounded by
    /// `[start, end]` and always capped at `max_count`.
    async fn recent(
        &self,
        name: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        max_count: usize,
    ) -> anyhow::Result<Vec<ContainerStats>>;

    async fn remove(&self, name: &str) -> anyhow::Result<()>;
}

/// Convenience for the housekeeper's "last N" no-argument query.
#[async_trait]
pub trait TimeSeriesCacheExt: TimeSeriesCache {
    async fn last_n(&self, name: &str, n: usize) -> anyhow::Result<Vec<ContainerStats>> {
        self.recent(name, None, None, n).await
    }
}

impl<T: TimeSeriesCache + ?Sized> TimeSeriesCacheExt for T {}

/// Per-container bound on the ring buffer.
const DEFAULT_MAX_SAMPLES: usize = 1024;

struct Ring {
    samples: std::collections::VecDeque<ContainerStats>,
    max_samples: usize,
}

impl Ring {
    fn new(max_samples: usize) -> Self {
        Self {
            samples: std::collections::VecDeque::with_capacity(max_samples.min(64)),
            max_samples,
        }
    }

    fn push(&mut self, stats: ContainerStats) {
        if self.samples.len() == self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(stats);
    }
}

/// Bounded per-container ring of recent `ContainerStats`. Shared across
/// trackers via `Arc<InMemoryCache>`.
pub struct InMemoryCache {
    max_samples: usize,
    rings: RwLock<HashMap<String, Ring>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_SAMPLES)
    }

    pub fn with_capacity(max_samples: usize) -> Self {
        Self {
            max_samples,
            rings: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TimeSeriesCache for InMemoryCache {
    async fn add(
        &self,
        reference: &ContainerReference,
        stats: ContainerStats,
    ) -> anyhow::Result<()> {
        let mut rings = self.rings.write().await;
        let ring = rings
            .entry(reference.name.clone())
            .or_insert_with(|| Ring::new(self.max_samples));
        ring.push(stats);
        Ok(())
    }

    async fn recent(
        &self,
        name: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        max_count: usize,
    ) -> anyhow::Result<Vec<ContainerStats>> {
        let rings = self.rings.read().await;
        let Some(ring) = rings.get(name) else {
            return Ok(Vec::new());
        };
        let mut out: Vec<ContainerStats> = ring
            .samples
            .iter()
            .rev()
            .filter(|s| start.map(|s0| s.timestamp >= s0).unwrap_or(true))
            .filter(|s| end.map(|s1| s.timestamp <= s1).unwrap_or(true))
            .take(max_count)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(out)
    }

    async fn remove(&self, name: &str) -> anyhow::Result<()> {
        self.rings.write().await.remove(name);
        Ok(())
    }
}
