use std::sync::Arc;

use triage_core::{Clock, ConcurrentQueue};

use crate::api::{Fault, FaultStage, TierKind};

// Many writers (dispatch workers, tier loops, teardown), one reader (the host
// calling drain). Cheap to clone; clones share the same queue.
#[derive(Clone)]
pub(crate) struct FaultSink {
    inner: Arc<SinkInner>,
}

struct SinkInner {
    clock: Arc<dyn Clock>,
    queue: ConcurrentQueue<Fault>,
}

impl FaultSink {
    pub(crate) fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(SinkInner {
                clock,
                queue: ConcurrentQueue::new(),
            }),
        }
    }

    pub(crate) fn record(&self, tier: TierKind, stage: FaultStage, message: impl Into<String>) {
        self.inner.queue.push(Fault {
            tier,
            stage,
            message: message.into(),
            at: self.inner.clock.now(),
        });
    }

    pub(crate) fn drain(&self) -> Vec<Fault> {
        self.inner.queue.drain_all()
    }
}
