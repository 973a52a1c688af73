//! Tunables, read once at tracker construction and then pinned into the
//! tracker (spec §9 "Global tunables" — avoid re-reading global state
//! inside the loops so tests can inject values).

use std::time::Duration;

/// Construction-time knobs for a `ContainerTracker`. CLI flag parsing
/// itself is out of scope (spec §1 Non-goals) — this only reads the
/// six environment variables named in spec §6.
#[derive(Debug, Clone, Copy)]
pub struct Tunables {
    /// Baseline for the StatsHousekeeper's `AdaptiveScheduler`.
    pub housekeeping_interval: Duration,
    /// Baseline for the LoadProbe's `AdaptiveScheduler`.
    pub load_reader_interval: Duration,
    /// Ceiling for the LoadProbe's `AdaptiveScheduler`.
    pub max_load_reader_interval: Duration,
    /// Deadline enforced by `TimeoutGuard` around every iteration.
    pub panic_timeout: Duration,
    /// Master switch for interval doubling. When false, `current` stays
    /// pinned to `baseline` in both schedulers.
    pub allow_dynamic_housekeeping: bool,
    /// If false, `LoadProbe` never starts and `load_average` stays at
    /// the uninitialised sentinel (-1.0).
    pub enable_load_reader: bool,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            housekeeping_interval: Duration::from_secs(1),
            load_reader_interval: Duration::from_secs(1),
            max_load_reader_interval: Duration::from_secs(60),
            panic_timeout: Duration::from_secs(60),
            allow_dynamic_housekeeping: true,
            enable_load_reader: true,
        }
    }
}

impl Tunables {
    /// Read tunables from the environment, falling back to defaults for
    /// anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            housekeeping_interval: env_secs("HOUSEKEEPING_INTERVAL_SECS")
                .unwrap_or(defaults.housekeeping_interval),
            load_reader_interval: env_secs("LOAD_READER_INTERVAL_SECS")
                .unwrap_or(defaults.load_reader_interval),
            max_load_reader_interval: env_secs("MAX_LOAD_READER_INTERVAL_SECS")
                .unwrap_or(defaults.max_load_reader_interval),
            panic_timeout: env_secs("PANIC_TIMEOUT_SECS").unwrap_or(defaults.panic_timeout),
            allow_dynamic_housekeeping: std::env::var("ALLOW_DYNAMIC_HOUSEKEEPING")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.allow_dynamic_housekeeping),
            enable_load_reader: std::env::var("ENABLE_LOAD_READER")
                .map(|v| !v.eq_ignore_ascii_case("false"))
                .unwrap_or(defaults.enable_load_reader),
        }
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let t = Tunables::default();
        assert_eq!(t.housekeeping_interval, Duration::from_secs(1));
        assert_eq!(t.load_reader_interval, Duration::from_secs(1));
        assert_eq!(t.max_load_reader_interval, Duration::from_secs(60));
        assert_eq!(t.panic_timeout, Duration::from_secs(60));
        assert!(t.allow_dynamic_housekeeping);
        assert!(t.enable_load_reader);
    }
}
