//! `BufferedSink` — buffers samples in front of a `SinkAdapter` and
//! flushes on a time-based policy (spec §6 "ready_to_flush", §9 "Sink
//! buffering").
//!
//! The sink driver serialises its own buffer under a separate lock
//! (spec §5) — this type owns that lock; it is never held alongside a
//! tracker's `spec_lock` or `load_lock`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::handler::SinkAdapter;
use crate::types::{ContainerReference, ContainerStats};

struct Buffered {
    reference: ContainerReference,
    stats: ContainerStats,
}

struct BufferState {
    pending: Vec<Buffered>,
    last_flush: Instant,
}

/// Wraps any `SinkAdapter`, batching `add_stats` calls and flushing
/// them once `buffer_duration` has elapsed since the last flush. Tests
/// can call `force_flush` to flush deterministically instead of
/// waiting on wall-clock time.
pub struct BufferedSink<S: SinkAdapter> {
    inner: S,
    buffer_duration: Duration,
    state: Mutex<BufferState>,
}

impl<S: SinkAdapter> BufferedSink<S> {
    pub fn new(inner: S, buffer_duration: Duration) -> Self {
        Self {
            inner,
            buffer_duration,
            state: Mutex::new(BufferState {
                pending: Vec::new(),
                last_flush: Instant::now(),
            }),
        }
    }

    /// Default flush predicate: `now - last_flush >= buffer_duration`.
    async fn ready_to_flush(&self) -> bool {
        let state = self.state.lock().await;
        state.last_flush.elapsed() >= self.buffer_duration
    }

    /// Test/override hook: flush the buffer now regardless of elapsed
    /// time.
    pub async fn force_flush(&self) -> anyhow::Result<usize> {
        self.flush_locked().await
    }

    async fn flush_locked(&self) -> anyhow::Result<usize> {
        let mut state = self.state.lock().await;
        let pending = std::mem::take(&mut state.pending);
        let n = pending.len();
        for item in pending {
            self.inner.add_stats(&item.reference, &item.stats).await?;
        }
        state.last_flush = Instant::now();
        Ok(n)
    }

    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }
}

#[async_trait]
impl<S: SinkAdapter> SinkAdapter for BufferedSink<S> {
    async fn add_stats(
        &self,
        reference: &ContainerReference,
        stats: &ContainerStats,
    ) -> anyhow::Result<()> {
        {
            let mut state = self.state.lock().await;
            state.pending.push(Buffered {
                reference: reference.clone(),
                stats: stats.clone(),
            });
        }
        if self.ready_to_flush().await {
            self.flush_locked().await?;
        }
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.flush_locked().await?;
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContainerStats, CpuStats, MemoryStats, NetworkStats, TaskStats};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSink {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SinkAdapter for CountingSink {
        async fn add_stats(
            &self,
            _reference: &ContainerReference,
            _stats: &ContainerStats,
        ) -> anyhow::Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn stats() -> ContainerStats {
        ContainerStats {
            timestamp: chrono::Utc::now(),
            cpu: CpuStats::default(),
            memory: MemoryStats::default(),
            filesystem: Vec::new(),
            diskio: Vec::new(),
            network: NetworkStats::default(),
            task_stats: TaskStats::default(),
            custom_metrics: None,
        }
    }

    #[tokio::test]
    async fn buffers_until_flush_duration_elapses() {
        let count = Arc::new(AtomicUsize::new(0));
        let sink = BufferedSink::new(
            CountingSink {
                count: count.clone(),
            },
            Duration::from_secs(3600),
        );
        let reference = ContainerReference::root();
        sink.add_stats(&reference, &stats()).await.unwrap();
        sink.add_stats(&reference, &stats()).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(sink.pending_len().await, 2);
    }

    #[tokio::test]
    async fn force_flush_drains_buffer() {
        let count = Arc::new(AtomicUsize::new(0));
        let sink = BufferedSink::new(
            CountingSink {
                count: count.clone(),
            },
            Duration::from_secs(3600),
        );
        let reference = ContainerReference::root();
        sink.add_stats(&reference, &stats()).await.unwrap();
        sink.add_stats(&reference, &stats()).await.unwrap();
        let flushed = sink.force_flush().await.unwrap();
        assert_eq!(flushed, 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(sink.pending_len().await, 0);
    }

    #[tokio::test]
    async fn close_flushes_remaining_then_closes_inner() {
        let count = Arc::new(AtomicUsize::new(0));
        let sink = BufferedSink::new(
            CountingSink {
                count: count.clone(),
            },
            Duration::from_secs(3600),
        );
        let reference = ContainerReference::root();
        sink.add_stats(&reference, &stats()).await.unwrap();
        sink.close().await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
