//! Per-container telemetry collection core for a host-level container
//! monitoring agent: adaptive stats housekeeping, load-average
//! smoothing, and time-series buffering for one container at a time.
//!
//! Discovery, the real cgroup/procfs handler, the HTTP API, and CLI
//! wiring are out of scope — this crate exposes the trait boundaries
//! they plug into (`handler` module) and a `ContainerTracker` that
//! drives them.

pub mod cache;
pub mod config;
pub mod error;
pub mod handler;
pub mod housekeeper;
pub mod load_probe;
pub mod process_list;
pub mod rate_limit;
pub mod scheduler;
pub mod sink;
pub mod smoother;
pub mod timeout_guard;
pub mod tracker;
pub mod types;

#[cfg(any(test, feature = "demo"))]
pub mod testing;

/// Initializes `tracing` with an `EnvFilter`, defaulting to
/// `container_telemetry_core=info`. Binaries embedding this crate call
/// this once at startup; the library itself never initializes logging.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "container_telemetry_core=info".into()),
        )
        .init();
}
