//! Wall-clock source abstraction.

use chrono::{DateTime, Utc};

/// Source of "now" for deadline comparisons.
///
/// Production code uses [`SystemClock`]; tests substitute a clock they
/// control to make classification deterministic.
pub trait Clock: Send + Sync + 'static {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
