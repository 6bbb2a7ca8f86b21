use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};

use triage_core::{Deferred, WorkItem};
use triage_engine::{Engine, EngineConfig, EngineError, EngineEvent, FaultStage, TierKind};

type FireLog = Arc<Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>>;

fn quick_config() -> EngineConfig {
    EngineConfig::new(
        Duration::from_millis(20),
        Duration::from_millis(100),
        Duration::from_millis(400),
    )
}

/// An item that records (deadline, fired-at) into the shared log.
fn timed_item(delay_ms: i64, log: &FireLog) -> Box<dyn WorkItem> {
    let deadline = Utc::now() + TimeDelta::milliseconds(delay_ms);
    let log = log.clone();
    Deferred::boxed(deadline, move || {
        log.lock().unwrap().push((deadline, Utc::now()));
    })
}

async fn wait_until(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < limit {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

#[tokio::test(flavor = "multi_thread")]
async fn fires_a_single_item_on_or_after_its_deadline() {
    let engine = Engine::new();
    engine.start(quick_config()).unwrap();

    let log: FireLog = Arc::default();
    engine.submit(timed_item(60, &log)).unwrap();

    assert!(wait_until(Duration::from_secs(2), || log.lock().unwrap().len() == 1).await);
    let (deadline, fired_at) = log.lock().unwrap()[0];
    assert!(fired_at >= deadline, "fired {fired_at} before deadline {deadline}");

    let stats = engine.statistics();
    assert_eq!(stats.fast.executed, 1);
    assert_eq!(stats.executed(), 1);

    engine.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn past_deadline_fires_on_the_next_fast_pass() {
    let engine = Engine::new();
    engine.start(quick_config()).unwrap();

    let log: FireLog = Arc::default();
    engine.submit(timed_item(-500, &log)).unwrap();

    assert!(wait_until(Duration::from_secs(1), || log.lock().unwrap().len() == 1).await);
    assert_eq!(engine.statistics().fast.executed, 1);

    engine.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn routes_submissions_by_remaining_time() {
    // Cadences this long never drain within the test window, so inbox depths
    // reflect routing alone.
    let engine = Engine::new();
    engine
        .start(EngineConfig::new(
            Duration::from_secs(3_600),
            Duration::from_secs(10),
            Duration::from_secs(60),
        ))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let log: FireLog = Arc::default();
    engine.submit(timed_item(-5_000, &log)).unwrap();
    engine.submit(timed_item(9_000, &log)).unwrap();
    engine.submit(timed_item(30_000, &log)).unwrap();
    engine.submit(timed_item(59_000, &log)).unwrap();
    engine.submit(timed_item(120_000, &log)).unwrap();

    let stats = engine.statistics();
    assert_eq!(stats.fast.queued, 2);
    assert_eq!(stats.slow.queued, 2);
    assert_eq!(stats.snail.queued, 1);
    assert_eq!(stats.queued(), 5);

    engine.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn promotes_a_moderate_item_through_slow_to_fast() {
    let engine = Engine::new();
    engine.start(quick_config()).unwrap();

    let log: FireLog = Arc::default();
    engine.submit(timed_item(300, &log)).unwrap();

    assert!(wait_until(Duration::from_secs(3), || log.lock().unwrap().len() == 1).await);
    let (deadline, fired_at) = log.lock().unwrap()[0];
    assert!(fired_at >= deadline);

    // Only the Fast tier fires.
    let stats = engine.statistics();
    assert_eq!(stats.fast.executed, 1);
    assert_eq!(stats.slow.executed, 0);
    assert_eq!(stats.snail.executed, 0);

    engine.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn promotes_a_long_horizon_item_through_snail_and_slow() {
    let engine = Engine::new();
    engine
        .start(EngineConfig::new(
            Duration::from_millis(20),
            Duration::from_millis(150),
            Duration::from_millis(300),
        ))
        .unwrap();

    let log: FireLog = Arc::default();
    engine.submit(timed_item(700, &log)).unwrap();

    assert!(wait_until(Duration::from_secs(3), || log.lock().unwrap().len() == 1).await);
    let (deadline, fired_at) = log.lock().unwrap()[0];
    assert!(fired_at >= deadline);
    assert_eq!(engine.statistics().fast.executed, 1);

    engine.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn bulk_load_fires_every_item_exactly_once_and_never_early() {
    let engine = Engine::new();
    engine.start(quick_config()).unwrap();

    let log: FireLog = Arc::default();
    let total = 300;
    for i in 0..total {
        engine.submit(timed_item(30 + i * 2, &log)).unwrap();
    }

    assert!(
        wait_until(Duration::from_secs(10), || {
            log.lock().unwrap().len() == total as usize
        })
        .await
    );

    for (deadline, fired_at) in log.lock().unwrap().iter() {
        assert!(fired_at >= deadline, "fired {fired_at} before deadline {deadline}");
    }
    assert_eq!(engine.statistics().executed(), total as u64);

    engine.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_items_land_on_the_fault_sink_without_harming_the_engine() {
    let engine = Engine::new();
    engine.start(quick_config()).unwrap();

    let total = 25u64;
    for i in 0..total {
        let deadline = Utc::now();
        engine
            .submit(Deferred::boxed(deadline, move || {
                panic!("intentional failure {i}")
            }))
            .unwrap();
    }

    // Every attempt is counted even though each one panicked.
    assert!(
        wait_until(Duration::from_secs(5), || {
            engine.statistics().fast.executed == total
        })
        .await
    );

    // Draining consumes, so collect across polls.
    let mut collected = 0usize;
    assert!(
        wait_until(Duration::from_secs(5), || {
            collected += engine.drain_faults().len();
            collected == total as usize
        })
        .await
    );

    assert!(engine.is_running());

    // A healthy item still goes through.
    let log: FireLog = Arc::default();
    engine.submit(timed_item(30, &log)).unwrap();
    assert!(wait_until(Duration::from_secs(2), || log.lock().unwrap().len() == 1).await);

    engine.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn fault_descriptors_carry_tier_and_stage() {
    let engine = Engine::new();
    engine.start(quick_config()).unwrap();

    engine
        .submit(Deferred::boxed(Utc::now(), || panic!("boom")))
        .unwrap();

    let faults = Arc::new(Mutex::new(Vec::new()));
    assert!(
        wait_until(Duration::from_secs(5), || {
            faults.lock().unwrap().extend(engine.drain_faults());
            !faults.lock().unwrap().is_empty()
        })
        .await
    );

    let faults = faults.lock().unwrap();
    assert_eq!(faults[0].tier, TierKind::Fast);
    assert_eq!(faults[0].stage, FaultStage::Item);
    assert!(faults[0].message.contains("boom"), "{}", faults[0].message);

    engine.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_under_load_drops_pending_items_and_halts_executions() {
    let engine = Engine::new();
    engine.start(quick_config()).unwrap();

    let fired = Arc::new(AtomicU64::new(0));
    for _ in 0..200 {
        let fired = fired.clone();
        let deadline = Utc::now() + TimeDelta::seconds(60);
        engine
            .submit(Deferred::boxed(deadline, move || {
                fired.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
    }

    let stop_started = Instant::now();
    engine.stop().await;
    assert!(stop_started.elapsed() < Duration::from_secs(5));
    assert!(!engine.is_running());

    let executed_at_stop = engine.statistics().executed();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(engine.statistics().executed(), executed_at_stop);
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    // Idempotent.
    engine.stop().await;
    assert!(!engine.is_running());

    assert_eq!(
        engine
            .submit(Deferred::boxed(Utc::now(), || {}))
            .unwrap_err(),
        EngineError::NotRunning
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn start_validates_configuration_and_rejects_double_start() {
    let engine = Engine::new();

    assert_eq!(
        engine
            .start(EngineConfig::new(
                Duration::ZERO,
                Duration::from_millis(100),
                Duration::from_millis(400),
            ))
            .unwrap_err(),
        EngineError::FrequencyTooLow(Duration::ZERO)
    );

    assert_eq!(
        engine
            .start(EngineConfig::new(
                Duration::from_millis(50),
                Duration::from_millis(400),
                Duration::from_millis(400),
            ))
            .unwrap_err(),
        EngineError::ThresholdsOutOfOrder {
            fast: Duration::from_millis(400),
            slow: Duration::from_millis(400),
        }
    );

    engine.start(quick_config()).unwrap();
    assert!(engine.is_running());
    assert_eq!(
        engine.start(quick_config()).unwrap_err(),
        EngineError::AlreadyRunning
    );

    engine.stop().await;
    assert!(!engine.is_running());

    // A stopped engine can be started again.
    engine.start(quick_config()).unwrap();
    assert!(engine.is_running());
    engine.stop().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn submit_requires_a_running_engine() {
    let engine = Engine::new();
    assert_eq!(
        engine
            .submit(Deferred::boxed(Utc::now(), || {}))
            .unwrap_err(),
        EngineError::NotRunning
    );
    assert_eq!(engine.statistics(), Default::default());
}

#[tokio::test(flavor = "multi_thread")]
async fn lifecycle_events_are_broadcast_in_order() {
    let engine = Engine::new();
    let mut events = engine.subscribe();

    engine.start(quick_config()).unwrap();
    engine.stop().await;

    let mut seen = Vec::new();
    while let Ok(Ok(event)) =
        tokio::time::timeout(Duration::from_secs(1), events.recv()).await
    {
        seen.push(event);
        if event == EngineEvent::Stopped {
            break;
        }
    }
    assert_eq!(
        seen,
        vec![
            EngineEvent::Started,
            EngineEvent::StopRequested,
            EngineEvent::Stopped
        ]
    );
}
