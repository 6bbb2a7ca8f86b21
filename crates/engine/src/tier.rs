use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};

use triage_core::{ConcurrentList, ConcurrentQueue, WorkItem};

use crate::api::{FaultStage, Statistics, TierKind, TierStats};
use crate::dispatch::panic_message;
use crate::engine::RunningCore;

pub(crate) struct Tier {
    pub(crate) cadence: Duration,
    pub(crate) inbox: ConcurrentQueue<Box<dyn WorkItem>>,
    pub(crate) want_exit: AtomicBool,
    executed: AtomicU64,
}

impl Tier {
    fn new(cadence: Duration) -> Self {
        Self {
            cadence,
            inbox: ConcurrentQueue::new(),
            want_exit: AtomicBool::new(false),
            executed: AtomicU64::new(0),
        }
    }

    pub(crate) fn request_exit(&self) {
        self.want_exit.store(true, Ordering::Release);
    }

    pub(crate) fn exiting(&self) -> bool {
        self.want_exit.load(Ordering::Acquire)
    }

    fn note_executed(&self) {
        self.executed.fetch_add(1, Ordering::AcqRel);
    }

    fn stats(&self) -> TierStats {
        TierStats {
            queued: self.inbox.len(),
            executed: self.executed.load(Ordering::Acquire),
        }
    }
}

pub(crate) struct TierSet {
    pub(crate) fast: Tier,
    pub(crate) slow: Tier,
    pub(crate) snail: Tier,
}

impl TierSet {
    pub(crate) fn new(frequency: Duration, fast: Duration, slow: Duration) -> Self {
        Self {
            fast: Tier::new(frequency),
            slow: Tier::new(slow_cadence(frequency, fast, slow)),
            snail: Tier::new(snail_cadence(frequency, fast, slow)),
        }
    }

    pub(crate) fn tier(&self, kind: TierKind) -> &Tier {
        match kind {
            TierKind::Fast => &self.fast,
            TierKind::Slow => &self.slow,
            TierKind::Snail => &self.snail,
        }
    }

    pub(crate) fn request_exit_all(&self) {
        self.fast.request_exit();
        self.slow.request_exit();
        self.snail.request_exit();
    }

    pub(crate) fn statistics(&self) -> Statistics {
        Statistics {
            fast: self.fast.stats(),
            slow: self.slow.stats(),
            snail: self.snail.stats(),
        }
    }
}

/// Route by remaining time-to-deadline. Upper bounds are inclusive; a tie
/// goes to the faster tier. Negative remaining (deadline already past) is
/// Fast.
pub(crate) fn classify(remaining_ms: i64, fast_ms: i64, slow_ms: i64) -> TierKind {
    if remaining_ms <= fast_ms {
        TierKind::Fast
    } else if remaining_ms <= slow_ms {
        TierKind::Slow
    } else {
        TierKind::Snail
    }
}

pub(crate) fn remaining_ms(deadline: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    deadline.signed_duration_since(now).num_milliseconds()
}

/// Whole fast-threshold windows between the two thresholds.
fn threshold_gap_ticks(fast: Duration, slow: Duration) -> u32 {
    let fast_ms = fast.as_millis();
    if fast_ms == 0 {
        return 0;
    }
    let gap_ms = slow.as_millis().saturating_sub(fast_ms);
    (gap_ms / fast_ms).min(u32::MAX as u128) as u32
}

/// Slow wakes once per fast-threshold window of the gap and never less often
/// than the base tick, so a resident item cannot shrink past its
/// promotion-to-Fast window between two wakes.
fn slow_cadence(frequency: Duration, fast: Duration, slow: Duration) -> Duration {
    frequency.saturating_mul(threshold_gap_ticks(fast, slow).max(1))
}

/// Snail wakes a few beats less often than Slow; its items are far from
/// firing.
fn snail_cadence(frequency: Duration, fast: Duration, slow: Duration) -> Duration {
    frequency.saturating_mul(threshold_gap_ticks(fast, slow).saturating_add(3))
}

pub(crate) async fn run_tier(core: Arc<RunningCore>, kind: TierKind) {
    loop {
        if core.exit_requested(kind) {
            return;
        }

        // Each pass runs as its own task; a panicking pass must not take the
        // loop down with it.
        let pass = tokio::spawn(run_pass(core.clone(), kind));
        if let Err(err) = pass.await {
            if err.is_panic() {
                core.faults
                    .record(kind, FaultStage::Loop, panic_message(err.into_panic()));
            }
        }

        if core.exit_requested(kind) {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(core.tiers.tier(kind).cadence) => {}
            _ = core.shutdown_notify.notified() => {}
        }
    }
}

async fn run_pass(core: Arc<RunningCore>, kind: TierKind) {
    let batch = core.tiers.tier(kind).inbox.drain_all();
    if batch.is_empty() {
        return;
    }

    // One captured "now" for the whole batch.
    let now = core.clock.now();
    match kind {
        TierKind::Fast => fire_pass(&core, batch, now).await,
        TierKind::Slow | TierKind::Snail => reclassify_pass(&core, kind, batch, now).await,
    }
}

/// Fire everything due; the rest stays in Fast for the next tick.
async fn fire_pass(core: &Arc<RunningCore>, batch: Vec<Box<dyn WorkItem>>, now: DateTime<Utc>) {
    let tier = &core.tiers.fast;
    let stay = Arc::new(ConcurrentList::new());

    let action = {
        let stay = stay.clone();
        let core = core.clone();
        move |item: Box<dyn WorkItem>| {
            if item.deadline() > now {
                stay.push(item);
            } else {
                // Counted per attempt; a panicking item still registers.
                core.tiers.fast.note_executed();
                item.execute();
            }
        }
    };
    core.dispatcher
        .run_batch(TierKind::Fast, batch, &tier.want_exit, &core.faults, action)
        .await;

    let stay = stay.take();
    if stay.is_empty() || core.exit_requested(TierKind::Fast) {
        return;
    }
    tier.inbox.extend(stay);
}

/// Re-tier a Slow or Snail batch against the captured now. Items only move
/// toward faster tiers; one that classifies slower than its current tier
/// stays where it is.
async fn reclassify_pass(
    core: &Arc<RunningCore>,
    kind: TierKind,
    batch: Vec<Box<dyn WorkItem>>,
    now: DateTime<Utc>,
) {
    let tier = core.tiers.tier(kind);
    let to_fast = Arc::new(ConcurrentList::new());
    let to_slow = Arc::new(ConcurrentList::new());
    let stay = Arc::new(ConcurrentList::new());

    let action = {
        let to_fast = to_fast.clone();
        let to_slow = to_slow.clone();
        let stay = stay.clone();
        let fast_ms = core.fast_threshold_ms;
        let slow_ms = core.slow_threshold_ms;
        move |item: Box<dyn WorkItem>| {
            let remaining = remaining_ms(item.deadline(), now);
            match (classify(remaining, fast_ms, slow_ms), kind) {
                (TierKind::Fast, _) => to_fast.push(item),
                (TierKind::Slow, TierKind::Snail) => to_slow.push(item),
                _ => stay.push(item),
            }
        }
    };
    core.dispatcher
        .run_batch(kind, batch, &tier.want_exit, &core.faults, action)
        .await;

    if core.exit_requested(kind) {
        return;
    }

    let promoted = to_fast.take();
    if !promoted.is_empty() {
        core.tiers.fast.inbox.extend(promoted);
    }
    let to_slow = to_slow.take();
    if !to_slow.is_empty() {
        core.tiers.slow.inbox.extend(to_slow);
    }
    let stay = stay.take();
    if !stay.is_empty() {
        tier.inbox.extend(stay);
    }
}
