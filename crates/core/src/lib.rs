#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! Shared primitives for the `triage` scheduler: the work-item contract, the
//! pluggable wall-clock source, and the thread-safe containers the engine's
//! tiers are built on.

pub mod clock;
pub mod item;
pub mod queue;

pub use clock::{Clock, SystemClock};
pub use item::{Deferred, WorkItem};
pub use queue::{ConcurrentList, ConcurrentQueue};
