use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::api::{FaultStage, TierKind};
use crate::sink::FaultSink;

/// Fans a batch out across blocking worker threads, bounded by a semaphore
/// sized at construction.
pub(crate) struct Dispatcher {
    slots: Arc<Semaphore>,
}

impl Dispatcher {
    pub(crate) fn new(parallelism: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(parallelism.max(1))),
        }
    }

    /// Run `action` once per batch element on the blocking pool and wait for
    /// the whole batch.
    ///
    /// Elements are independent; no ordering is guaranteed across them. A
    /// panicking action is recorded on the fault sink and never cancels its
    /// peers. Once `cancel` is observed set, remaining elements are dropped
    /// unprocessed.
    pub(crate) async fn run_batch<T, F>(
        &self,
        tier: TierKind,
        batch: Vec<T>,
        cancel: &AtomicBool,
        faults: &FaultSink,
        action: F,
    ) where
        T: Send + 'static,
        F: Fn(T) + Clone + Send + 'static,
    {
        let mut tasks = JoinSet::new();
        for item in batch {
            if cancel.load(Ordering::Acquire) {
                break;
            }
            let Ok(slot) = self.slots.clone().acquire_owned().await else {
                break;
            };
            let action = action.clone();
            tasks.spawn_blocking(move || {
                let _slot = slot;
                action(item);
            });
        }

        while let Some(res) = tasks.join_next().await {
            if let Err(err) = res {
                if err.is_panic() {
                    faults.record(tier, FaultStage::Item, panic_message(err.into_panic()));
                }
            }
        }
    }
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("work item panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("work item panicked: {msg}")
    } else {
        "work item panicked".to_string()
    }
}
