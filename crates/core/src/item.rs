//! The work-item contract consumed by the scheduler.

use chrono::{DateTime, Utc};

/// A deferred unit of work: an absolute wall-clock deadline plus a one-shot
/// effectful operation.
///
/// The scheduler treats the payload opaquely. It reads [`deadline`] to route
/// the item between tiers and consumes the box exactly once when the item
/// fires. `execute` runs on a blocking worker thread, so payloads are
/// responsible for their own internal thread safety.
///
/// [`deadline`]: WorkItem::deadline
pub trait WorkItem: Send + 'static {
    /// Absolute wall-clock instant at or after which the item may fire.
    fn deadline(&self) -> DateTime<Utc>;

    /// Perform the work. Consumes the item; invoked at most once.
    fn execute(self: Box<Self>);
}

/// A [`WorkItem`] built from a deadline and a closure.
pub struct Deferred<F: FnOnce() + Send + 'static> {
    deadline: DateTime<Utc>,
    action: F,
}

impl<F: FnOnce() + Send + 'static> Deferred<F> {
    /// Build a work item that runs `action` once `deadline` has passed.
    pub fn new(deadline: DateTime<Utc>, action: F) -> Self {
        Self { deadline, action }
    }

    /// Like [`new`](Self::new), boxed for submission.
    pub fn boxed(deadline: DateTime<Utc>, action: F) -> Box<Self> {
        Box::new(Self::new(deadline, action))
    }
}

impl<F: FnOnce() + Send + 'static> WorkItem for Deferred<F> {
    fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    fn execute(self: Box<Self>) {
        (self.action)()
    }
}
