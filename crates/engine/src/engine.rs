use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;

use triage_core::{Clock, SystemClock, WorkItem};

use crate::api::{EngineConfig, EngineError, EngineEvent, Fault, FaultStage, Statistics, TierKind};
use crate::dispatch::{Dispatcher, panic_message};
use crate::sink::FaultSink;
use crate::tier::{self, TierSet};

// Shared state handed to the tier loops: thresholds, clock, peer inboxes,
// dispatcher, fault sink, and the shutdown flag. One instance per start.
pub(crate) struct RunningCore {
    pub(crate) fast_threshold_ms: i64,
    pub(crate) slow_threshold_ms: i64,
    pub(crate) stop_grace: Duration,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) tiers: TierSet,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) faults: FaultSink,
    pub(crate) shutdown_notify: Notify,
    shutting_down: AtomicBool,
}

impl RunningCore {
    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    pub(crate) fn exit_requested(&self, kind: TierKind) -> bool {
        self.is_shutting_down() || self.tiers.tier(kind).exiting()
    }

    fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        self.tiers.request_exit_all();
        self.shutdown_notify.notify_waiters();
    }
}

/// The tiered deadline scheduler.
///
/// Submitted work items are routed by remaining time-to-deadline into one of
/// three tiers (Fast, Slow, Snail), each drained by its own loop at its own
/// cadence. The Slow and Snail loops promote items toward Fast as their
/// deadlines approach; the Fast loop fires items on or after their deadline,
/// fanning each batch out across blocking worker threads.
///
/// All operations are callable from any thread. Asynchronous failures (a
/// panicking work item, a stuck teardown) never surface as `Result`s; they
/// are collected as [`Fault`] descriptors and returned by
/// [`drain_faults`](Self::drain_faults).
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    clock: Arc<dyn Clock>,
    faults: FaultSink,
    event_tx: broadcast::Sender<EngineEvent>,
    running: AtomicBool,
    state: Mutex<EngineState>,
}

#[derive(Default)]
struct EngineState {
    core: Option<Arc<RunningCore>>,
    workers: Vec<(TierKind, JoinHandle<()>)>,
}

impl Engine {
    /// An engine on the system wall clock, not yet running.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// An engine reading "now" from the given clock, not yet running.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let (event_tx, _) = broadcast::channel(16);
        Self {
            inner: Arc::new(EngineInner {
                faults: FaultSink::new(clock.clone()),
                clock,
                event_tx,
                running: AtomicBool::new(false),
                state: Mutex::new(EngineState::default()),
            }),
        }
    }

    /// Record the configuration and launch the three tier loops.
    ///
    /// Must be called from within a Tokio runtime. Fails without side effects
    /// if the engine is already running, if `frequency` is below one
    /// millisecond, or if the thresholds are not strictly ordered.
    pub fn start(&self, cfg: EngineConfig) -> Result<(), EngineError> {
        if cfg.frequency < EngineConfig::MIN_FREQUENCY {
            return Err(EngineError::FrequencyTooLow(cfg.frequency));
        }
        if cfg.fast_threshold >= cfg.slow_threshold {
            return Err(EngineError::ThresholdsOutOfOrder {
                fast: cfg.fast_threshold,
                slow: cfg.slow_threshold,
            });
        }

        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.inner.running.load(Ordering::Acquire) {
            return Err(EngineError::AlreadyRunning);
        }

        let parallelism = if cfg.dispatch_parallelism == 0 {
            default_dispatch_parallelism()
        } else {
            cfg.dispatch_parallelism
        };
        let stop_grace = if cfg.stop_grace.is_zero() {
            EngineConfig::DEFAULT_STOP_GRACE
        } else {
            cfg.stop_grace
        };

        let core = Arc::new(RunningCore {
            fast_threshold_ms: duration_ms(cfg.fast_threshold),
            slow_threshold_ms: duration_ms(cfg.slow_threshold),
            stop_grace,
            clock: self.inner.clock.clone(),
            tiers: TierSet::new(cfg.frequency, cfg.fast_threshold, cfg.slow_threshold),
            dispatcher: Dispatcher::new(parallelism),
            faults: self.inner.faults.clone(),
            shutdown_notify: Notify::new(),
            shutting_down: AtomicBool::new(false),
        });

        state.workers = [TierKind::Fast, TierKind::Slow, TierKind::Snail]
            .into_iter()
            .map(|kind| (kind, tokio::spawn(tier::run_tier(core.clone(), kind))))
            .collect();
        state.core = Some(core);
        self.inner.running.store(true, Ordering::Release);
        drop(state);

        let _ = self.inner.event_tx.send(EngineEvent::Started);
        Ok(())
    }

    /// Request shutdown and wait for the tier loops to terminate.
    ///
    /// Cooperative first: every tier's exit flag is set and each loop gets up
    /// to the configured stop grace to finish its current pass. Loops that
    /// overrun the grace are aborted and a teardown fault is recorded. Items
    /// still queued are dropped without firing. Idempotent on a stopped
    /// engine.
    pub async fn stop(&self) {
        let (core, workers) = {
            let mut state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !self.inner.running.swap(false, Ordering::AcqRel) {
                return;
            }
            let Some(core) = state.core.clone() else {
                return;
            };
            (core, std::mem::take(&mut state.workers))
        };

        core.begin_shutdown();
        let _ = self.inner.event_tx.send(EngineEvent::StopRequested);

        for (kind, mut worker) in workers {
            match tokio::time::timeout(core.stop_grace, &mut worker).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) if err.is_panic() => {
                    self.inner
                        .faults
                        .record(kind, FaultStage::Teardown, panic_message(err.into_panic()));
                }
                Ok(Err(err)) => {
                    self.inner.faults.record(
                        kind,
                        FaultStage::Teardown,
                        format!("{} tier worker join failed: {err}", kind.name()),
                    );
                }
                Err(_) => {
                    worker.abort();
                    self.inner.faults.record(
                        kind,
                        FaultStage::Teardown,
                        format!(
                            "{} tier loop did not exit within the stop grace; aborted",
                            kind.name()
                        ),
                    );
                }
            }
        }

        let _ = self.inner.event_tx.send(EngineEvent::Stopped);
    }

    /// Route a work item to the tier matching its remaining time-to-deadline.
    ///
    /// Items whose deadline is already in the past go to Fast and fire on its
    /// next pass. Fails only when the engine is not running (or is shutting
    /// down).
    pub fn submit(&self, item: Box<dyn WorkItem>) -> Result<(), EngineError> {
        let core = {
            let state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            state.core.clone()
        };
        let Some(core) = core else {
            return Err(EngineError::NotRunning);
        };
        if !self.inner.running.load(Ordering::Acquire) || core.is_shutting_down() {
            return Err(EngineError::NotRunning);
        }

        let remaining = tier::remaining_ms(item.deadline(), core.clock.now());
        let kind = tier::classify(remaining, core.fast_threshold_ms, core.slow_threshold_ms);
        core.tiers.tier(kind).inbox.push(item);
        Ok(())
    }

    /// Return and clear the collected fault descriptors.
    pub fn drain_faults(&self) -> Vec<Fault> {
        self.inner.faults.drain()
    }

    /// Whether the tier loops are live.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Per-tier queued/executed counters. Zeros on an engine that was never
    /// started; counters freeze at their final values after a stop and reset
    /// on the next start.
    pub fn statistics(&self) -> Statistics {
        let core = {
            let state = self
                .inner
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            state.core.clone()
        };
        core.map(|core| core.tiers.statistics()).unwrap_or_default()
    }

    /// Subscribe to the engine lifecycle event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.event_tx.subscribe()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

fn default_dispatch_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn duration_ms(d: Duration) -> i64 {
    d.as_millis().min(i64::MAX as u128) as i64
}
