mod cli;
mod shutdown;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{TimeDelta, Utc};
use clap::Parser;
use tokio::sync::mpsc;

use triage_core::Deferred;
use triage_engine::{Engine, EngineConfig};

use crate::cli::Cli;
use crate::shutdown::{ShutdownEvent, spawn_ctrl_c_handler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if cli.items == 0 {
        anyhow::bail!("--items must be >= 1");
    }

    let engine = Engine::new();
    let mut config = EngineConfig::new(
        Duration::from_millis(cli.frequency_ms),
        Duration::from_millis(cli.fast_ms),
        Duration::from_millis(cli.slow_ms),
    );
    config.dispatch_parallelism = cli.parallel;
    engine.start(config)?;

    println!(
        "triage {} items={} window={}ms+{}ms frequency={}ms thresholds={}ms/{}ms",
        env!("CARGO_PKG_VERSION"),
        cli.items,
        cli.min_delay_ms,
        cli.spread_ms,
        cli.frequency_ms,
        cli.fast_ms,
        cli.slow_ms
    );

    let fired = Arc::new(AtomicU64::new(0));
    let base = Utc::now();
    for i in 0..cli.items {
        let offset = cli.min_delay_ms + cli.spread_ms * i / cli.items;
        let deadline = base + TimeDelta::milliseconds(offset as i64);
        let fired = fired.clone();
        engine.submit(Deferred::boxed(deadline, move || {
            fired.fetch_add(1, Ordering::Relaxed);
        }))?;
    }

    let (shutdown_tx, mut shutdown_rx) = mpsc::unbounded_channel::<ShutdownEvent>();
    spawn_ctrl_c_handler(shutdown_tx);

    let started = Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first interval tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                report(&engine, fired.load(Ordering::Relaxed), cli.stats_json)?;
                for fault in engine.drain_faults() {
                    eprintln!(
                        "fault: [{}/{:?}] {}",
                        fault.tier.name(),
                        fault.stage,
                        fault.message
                    );
                }
                if fired.load(Ordering::Relaxed) >= cli.items {
                    break;
                }
            }
            event = shutdown_rx.recv() => {
                match event {
                    Some(ShutdownEvent::Graceful) | None => {
                        println!("shutting down; pending items will be dropped");
                        break;
                    }
                    Some(ShutdownEvent::Immediate) => std::process::exit(130),
                }
            }
        }
    }

    engine.stop().await;
    report(&engine, fired.load(Ordering::Relaxed), cli.stats_json)?;
    println!(
        "done: fired {}/{} in {:.1}s",
        fired.load(Ordering::Relaxed),
        cli.items,
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

fn report(engine: &Engine, fired: u64, as_json: bool) -> anyhow::Result<()> {
    let stats = engine.statistics();
    if as_json {
        println!("{}", serde_json::to_string(&stats)?);
    } else {
        println!(
            "fired={fired} executed={} queued: fast={} slow={} snail={}",
            stats.executed(),
            stats.fast.queued,
            stats.slow.queued,
            stats.snail.queued
        );
    }
    Ok(())
}
