//! Demonstrates the full data flow `Handler -> StatsHousekeeper ->
//! TimeSeriesCache -> SinkAdapter` end to end against the in-memory
//! fakes, without a real container host.

use std::sync::Arc;
use std::time::Duration;

use container_telemetry_core::cache::{InMemoryCache, TimeSeriesCacheExt};
use container_telemetry_core::config::Tunables;
use container_telemetry_core::testing::{FakeCpuLoadReader, FakeHandler};
use container_telemetry_core::tracker::ContainerTracker;
use container_telemetry_core::types::ContainerReference;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    container_telemetry_core::init_tracing();

    let reference = ContainerReference {
        name: "/docker/demo".to_string(),
        aliases: vec!["demo".to_string()],
        namespace: "docker".to_string(),
    };
    let handler = Arc::new(FakeHandler::alive(&reference.name));
    let cache = Arc::new(InMemoryCache::new());

    let mut tunables = Tunables::default();
    tunables.housekeeping_interval = Duration::from_millis(200);
    tunables.load_reader_interval = Duration::from_millis(200);

    let tracker = Arc::new(
        ContainerTracker::new(reference.clone(), handler, cache.clone(), tunables)
            .with_load_reader(Arc::new(FakeCpuLoadReader::constant(2, 0, 0))),
    );

    tracker.start().await?;
    tokio::time::sleep(Duration::from_secs(2)).await;

    let samples = cache.last_n(&reference.name, 10).await?;
    println!("collected {} samples for {}", samples.len(), reference.name);
    if let Some(latest) = samples.first() {
        println!(
            "latest: cpu_total_ns={} load_average={} mem_usage_bytes={}",
            latest.cpu.total_ns, latest.cpu.load_average, latest.memory.usage_bytes
        );
    }

    println!("load_average = {:.3}", tracker.load_average().await);

    tracker.stop().await?;
    Ok(())
}
