//! tick-driver: drives a scheduler from a fixed-rate main loop.
//!
//! Submits a small demo workload (synchronous tick work, asynchronous tick
//! work, a real-time timer and a cross-thread call onto the main context),
//! runs the requested number of ticks, then logs metrics and shuts down.
//!
//! # Usage
//!
//! ```bash
//! tick-driver --ticks 100 --tick-millis 50
//! tick-driver --config config/scheduler.toml
//! TICKFORGE_MAX_ASYNC_WORKERS=64 RUST_LOG=debug tick-driver
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{error, info, warn};

use tickforge_core::{config, Owner, SyncContext};
use tickforge_scheduler::{CallError, Scheduler, SchedulerConfig, TaskBuilder};

/// Fixed-rate driver for the tick-clock and wall-clock schedulers.
#[derive(Parser, Debug)]
#[command(name = "tick-driver", version, about)]
struct Cli {
    /// Number of ticks to run.
    #[arg(long, env = "TICKFORGE_TICKS", default_value_t = 200)]
    ticks: i64,

    /// Target duration of one tick in milliseconds.
    #[arg(long, env = "TICKFORGE_TICK_MILLIS", default_value_t = 50)]
    tick_millis: u64,

    /// Optional scheduler.toml; defaults plus environment overrides otherwise.
    #[arg(long, env = "TICKFORGE_CONFIG")]
    config: Option<String>,
}

fn main() -> anyhow::Result<()> {
    config::load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!(?cli, "starting tick-driver");

    let scheduler_config = match &cli.config {
        Some(path) => SchedulerConfig::from_file(path)?,
        None => SchedulerConfig::from_env()?,
    };

    let main_context = Arc::new(SyncContext::new("main"));
    main_context.enter();
    let scheduler = Arc::new(Scheduler::new(scheduler_config, Arc::clone(&main_context))?);

    submit_workload(&scheduler)?;
    let caller = spawn_caller(Arc::clone(&scheduler));

    let tick_length = Duration::from_millis(cli.tick_millis);
    for tick in 0..cli.ticks {
        let started = Instant::now();
        main_context.enter();
        scheduler.tick(tick, true);

        let elapsed = started.elapsed();
        match tick_length.checked_sub(elapsed) {
            Some(rest) => thread::sleep(rest),
            None => warn!(tick, ?elapsed, "tick overran its budget"),
        }
    }

    if caller.join().is_err() {
        error!("caller thread panicked");
    }

    let metrics = scheduler.metrics();
    info!(metrics = %serde_json::to_string(&metrics)?, "final scheduler metrics");
    scheduler.shutdown();
    // One more pass applies the shutdown cancellation.
    scheduler.tick(cli.ticks, true);

    info!("tick-driver exited cleanly");
    Ok(())
}

fn submit_workload(scheduler: &Scheduler) -> anyhow::Result<()> {
    let world = Owner::new("world")?;
    let network = Owner::new("network")?;

    let entity_updates = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&entity_updates);
    scheduler.submit(
        TaskBuilder::new(world.clone(), move || {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .name("entity-update")
        .repeating(1),
        0,
    )?;

    let counter = Arc::clone(&entity_updates);
    scheduler.submit(
        TaskBuilder::new(world.clone(), move || {
            info!(updates = counter.load(Ordering::Relaxed), "world autosave");
            Ok(())
        })
        .name("autosave")
        .asynchronous()
        .repeating(100),
        20,
    )?;

    scheduler.run_task(
        TaskBuilder::new(network, || {
            info!("network heartbeat");
            Ok(())
        })
        .name("heartbeat")
        .asynchronous()
        .real_time()
        .repeating(1_000),
    )?;

    scheduler.run_task(
        TaskBuilder::new(world, || Err(anyhow::anyhow!("corrupt chunk")))
            .name("chunk-loader")
            .single(10),
    )?;
    Ok(())
}

/// A thread that needs a value computed on the main context.
fn spawn_caller(scheduler: Arc<Scheduler>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let owner = match Owner::new("console") {
            Ok(owner) => owner,
            Err(e) => {
                error!(error = %e, "invalid owner");
                return;
            }
        };
        let mut call = scheduler.call_on_main(owner, || {
            Ok(format!("on {:?}", thread::current().name()))
        });
        match call.wait_timeout(Duration::from_secs(5)) {
            Ok(answer) => info!(answer = %answer, "main-context call completed"),
            Err(CallError::Timeout(waited)) => warn!(?waited, "main-context call timed out"),
            Err(e) => error!(error = %e, "main-context call failed"),
        }
    })
}
