//! Error taxonomy surfaced by the telemetry core (spec §7).

use thiserror::Error;

/// Errors an iteration of the housekeeper or load probe can produce.
///
/// `ContainerGone` is swallowed silently by callers before it reaches a
/// logger — it is part of the enum only so internal plumbing can
/// distinguish it from a real failure; see `ContainerTracker`'s
/// "dead-container tolerant" handling.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Probe or spec fetch failed while the container still exists.
    /// Logged (rate-limited), iteration discarded, loop continues.
    #[error("transient handler error: {0}")]
    TransientHandler(#[source] anyhow::Error),

    /// The handler reports the container no longer exists. Swallowed
    /// silently — never logged, never pushed as a sample.
    #[error("container no longer exists")]
    ContainerGone,

    /// Stats came back with both a value and an error. The partial
    /// sample is pushed, then this is reported.
    #[error("partial stats: {0}")]
    PartialStats(#[source] anyhow::Error),

    /// The cache/sink `add` call failed. Reported up but does not stop
    /// the loop.
    #[error("sink error: {0}")]
    Sink(#[source] anyhow::Error),

    /// `TimeoutGuard`'s deadline was exceeded. Never constructed and
    /// returned to a caller in the ordinary control-flow sense — the
    /// guard aborts the process directly — but kept as a variant so
    /// diagnostic plumbing can describe the condition uniformly.
    #[error("iteration exceeded panic_timeout")]
    Fatal,
}

impl CoreError {
    /// True for the one variant that must never be logged or surfaced
    /// as an error to callers (spec §7: "error swallowed silently").
    pub fn is_container_gone(&self) -> bool {
        matches!(self, CoreError::ContainerGone)
    }
}

/// Generic call-site errors (handler/reader plumbing) arrive as
/// `anyhow::Error`; `TimeoutGuard::run` needs a uniform way to fold
/// them into the taxonomy without the caller pre-classifying them.
impl From<anyhow::Error> for CoreError {
    fn from(e: anyhow::Error) -> Self {
        CoreError::TransientHandler(e)
    }
}
