//! Public API types for the in-process `triage` engine.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Configuration for a running engine, fixed at [`Engine::start`].
///
/// [`Engine::start`]: crate::Engine::start
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base tick of the engine. The Fast tier drains its inbox once per tick;
    /// the Slow and Snail cadences are derived from it and the thresholds.
    /// Must be at least one millisecond; 50 ms or more is recommended.
    pub frequency: Duration,

    /// Items whose remaining time-to-deadline is at most this long are held
    /// (and fired) by the Fast tier. The bound is inclusive.
    pub fast_threshold: Duration,

    /// Items whose remaining time-to-deadline is at most this long (but more
    /// than `fast_threshold`) are held by the Slow tier; anything further out
    /// goes to Snail. Must be strictly greater than `fast_threshold`.
    pub slow_threshold: Duration,

    /// Upper bound on work items running concurrently within a batch.
    /// Zero means one slot per available core.
    pub dispatch_parallelism: usize,

    /// How long [`Engine::stop`] waits for each tier loop to exit on its own
    /// before aborting it. Zero means [`DEFAULT_STOP_GRACE`].
    ///
    /// [`Engine::stop`]: crate::Engine::stop
    /// [`DEFAULT_STOP_GRACE`]: Self::DEFAULT_STOP_GRACE
    pub stop_grace: Duration,
}

impl EngineConfig {
    /// Default bound on cooperative teardown during stop.
    pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(20);

    /// Minimum accepted [`frequency`](Self::frequency).
    pub const MIN_FREQUENCY: Duration = Duration::from_millis(1);

    /// Configuration with the given tick and thresholds and default
    /// parallelism and stop grace.
    pub fn new(frequency: Duration, fast_threshold: Duration, slow_threshold: Duration) -> Self {
        Self {
            frequency,
            fast_threshold,
            slow_threshold,
            dispatch_parallelism: 0,
            stop_grace: Self::DEFAULT_STOP_GRACE,
        }
    }
}

/// One of the three deadline tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TierKind {
    /// Deadline is imminent; this tier fires items.
    Fast,
    /// Deadline is moderate; promotes items to Fast as it draws in.
    Slow,
    /// Deadline is distant; promotes items to Slow or Fast as it draws in.
    Snail,
}

impl TierKind {
    /// Stable lowercase name, as used in statistics output.
    pub fn name(self) -> &'static str {
        match self {
            TierKind::Fast => "fast",
            TierKind::Slow => "slow",
            TierKind::Snail => "snail",
        }
    }
}

/// Where in the engine a fault was caught.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultStage {
    /// Raised by a single work item (or its reclassification) inside a batch.
    Item,
    /// Raised by a tier loop outside any per-item action.
    Loop,
    /// Raised while tearing a tier loop down during stop.
    Teardown,
}

/// Descriptor of an asynchronous failure, collected on the engine's sink and
/// returned by [`Engine::drain_faults`].
///
/// [`Engine::drain_faults`]: crate::Engine::drain_faults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fault {
    /// Tier the fault originated in.
    pub tier: TierKind,
    /// Stage the fault was caught at.
    pub stage: FaultStage,
    /// Human-readable description.
    pub message: String,
    /// Wall-clock time the fault was recorded.
    pub at: DateTime<Utc>,
}

/// Queue and execution counters for one tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierStats {
    /// Items currently waiting in the tier's inbox.
    pub queued: usize,
    /// Items executed by the tier since the engine started.
    pub executed: u64,
}

/// Point-in-time counters for all three tiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    /// Fast tier counters.
    pub fast: TierStats,
    /// Slow tier counters.
    pub slow: TierStats,
    /// Snail tier counters.
    pub snail: TierStats,
}

impl Statistics {
    /// Total items executed across all tiers.
    pub fn executed(&self) -> u64 {
        self.fast.executed + self.slow.executed + self.snail.executed
    }

    /// Total items currently queued across all tiers.
    pub fn queued(&self) -> usize {
        self.fast.queued + self.slow.queued + self.snail.queued
    }
}

/// Engine lifecycle event stream payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// Tier loops are up; the engine accepts submissions.
    Started,
    /// Graceful shutdown has been requested.
    StopRequested,
    /// All tier loops have terminated.
    Stopped,
}

/// Synchronous failure of an engine operation.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// `start` was called while the engine is running.
    #[error("engine is already running")]
    AlreadyRunning,

    /// The operation requires a running engine.
    #[error("engine is not running")]
    NotRunning,

    /// The configured frequency is below the supported minimum.
    #[error("frequency {0:?} is below the 1 ms minimum")]
    FrequencyTooLow(Duration),

    /// The fast threshold must be strictly below the slow threshold.
    #[error("fast threshold {fast:?} must be below slow threshold {slow:?}")]
    ThresholdsOutOfOrder {
        /// Configured fast threshold.
        fast: Duration,
        /// Configured slow threshold.
        slow: Duration,
    },
}
