//! Integration tests for tickforge-scheduler.
//!
//! Drive the composite scheduler the way a runtime would: a main loop on the
//! test thread, submissions and calls from other threads.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tickforge_scheduler::*;

// Helper: a scheduler whose main context is driven by the calling thread.
fn scheduler() -> Scheduler {
    let main = Arc::new(SyncContext::new("main"));
    main.enter();
    let config = SchedulerConfig {
        timer_threads: 1,
        ..SchedulerConfig::default()
    };
    Scheduler::with_clock(config, main, Arc::new(ManualClock::new(0))).unwrap()
}

fn owner(name: &str) -> Owner {
    Owner::new(name).unwrap()
}

fn counting(owner_name: &str, counter: &Arc<AtomicUsize>) -> TaskBuilder {
    let counter = Arc::clone(counter);
    TaskBuilder::new(owner(owner_name), move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

fn recording(owner_name: &str, now: &Arc<AtomicI64>, log: &Arc<Mutex<Vec<i64>>>) -> TaskBuilder {
    let (now, log) = (Arc::clone(now), Arc::clone(log));
    TaskBuilder::new(owner(owner_name), move || {
        log.lock().unwrap().push(now.load(Ordering::SeqCst));
        Ok(())
    })
}

fn run_ticks(scheduler: &Scheduler, now: &AtomicI64, ticks: std::ops::Range<i64>) {
    for t in ticks {
        now.store(t, Ordering::SeqCst);
        scheduler.tick(t, true);
    }
}

fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

// ── Submission ──────────────────────────────────────────────────────

#[test]
fn test_ids_unique_across_domains() {
    let scheduler = scheduler();
    let counter = Arc::new(AtomicUsize::new(0));
    let mut ids = Vec::new();
    for i in 0..10 {
        let builder = counting("ids", &counter);
        let builder = if i % 2 == 0 { builder } else { builder.real_time() };
        ids.push(scheduler.run_task(builder).unwrap().id());
    }
    assert!(ids.iter().all(|&id| id > 0));
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_single_task_rejects_start_delay() {
    let scheduler = scheduler();
    let counter = Arc::new(AtomicUsize::new(0));
    let err = scheduler.submit(counting("game", &counter).single(5), 1).unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidArgument(_)));
    assert!(scheduler.pending_tasks().is_empty());
}

#[test]
fn test_submit_then_tick_timeline() {
    let scheduler = scheduler();
    let now = Arc::new(AtomicI64::new(100));
    scheduler.tick(100, true);

    let a_log = Arc::new(Mutex::new(Vec::new()));
    let b_log = Arc::new(Mutex::new(Vec::new()));
    let a = scheduler.run_task(recording("game", &now, &a_log)).unwrap();
    let b = scheduler.submit(recording("game", &now, &b_log).repeating(10), 5).unwrap();

    run_ticks(&scheduler, &now, 100..122);

    assert_eq!(*a_log.lock().unwrap(), vec![100]);
    assert_eq!(*b_log.lock().unwrap(), vec![105, 115]);
    assert!(!scheduler.is_queued(a.id()));
    assert!(scheduler.is_queued(b.id()));
    assert_eq!(b.next_run(), 125);
}

#[test]
fn test_periodic_runs_at_fixed_steps() {
    let scheduler = scheduler();
    let now = Arc::new(AtomicI64::new(0));
    scheduler.tick(0, true);
    let log = Arc::new(Mutex::new(Vec::new()));
    scheduler.submit(recording("game", &now, &log).repeating(4), 3).unwrap();

    run_ticks(&scheduler, &now, 0..20);
    assert_eq!(*log.lock().unwrap(), vec![3, 7, 11, 15, 19]);
}

#[test]
fn test_period_zero_runs_every_tick() {
    let scheduler = scheduler();
    let now = Arc::new(AtomicI64::new(0));
    scheduler.tick(0, true);
    let zero = Arc::new(Mutex::new(Vec::new()));
    let one = Arc::new(Mutex::new(Vec::new()));
    scheduler.submit(recording("game", &now, &zero).repeating(0), 0).unwrap();
    scheduler.submit(recording("game", &now, &one).repeating(1), 0).unwrap();

    run_ticks(&scheduler, &now, 0..6);
    assert_eq!(*zero.lock().unwrap(), *one.lock().unwrap());
    assert_eq!(zero.lock().unwrap().len(), 6);
}

#[test]
fn test_negative_period_is_one_shot() {
    let scheduler = scheduler();
    let counter = Arc::new(AtomicUsize::new(0));
    let task = scheduler.submit(counting("game", &counter).repeating(-7), 2).unwrap();
    assert!(!task.is_periodic());
    assert_eq!(task.period(), PERIOD_SINGLE);

    for t in 0..10 {
        scheduler.tick(t, true);
    }
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(task.state(), TaskState::Retired);
}

// ── Concurrency ─────────────────────────────────────────────────────

#[test]
fn test_concurrent_submissions_execute_once() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 250;

    let scheduler = Arc::new(scheduler());
    let runs = Arc::new(Mutex::new(Vec::new()));
    let barrier = Arc::new(Barrier::new(THREADS));

    let producers: Vec<_> = (0..THREADS)
        .map(|p| {
            let (scheduler, runs, barrier) = (Arc::clone(&scheduler), Arc::clone(&runs), Arc::clone(&barrier));
            thread::spawn(move || {
                barrier.wait();
                let mut ids = Vec::with_capacity(PER_THREAD);
                for i in 0..PER_THREAD {
                    let runs = Arc::clone(&runs);
                    let tag = p * PER_THREAD + i;
                    let builder = TaskBuilder::new(owner("load"), move || {
                        runs.lock().unwrap().push(tag);
                        Ok(())
                    });
                    // Half of the work goes to the worker pool.
                    let builder = if i % 2 == 0 { builder } else { builder.asynchronous() };
                    ids.push(scheduler.run_task(builder).unwrap().id());
                }
                ids
            })
        })
        .collect();

    let mut tick = 0;
    let mut ids = HashSet::new();
    for producer in producers {
        // Keep ticking while producers are still submitting.
        while !producer.is_finished() {
            scheduler.tick(tick, true);
            tick += 1;
        }
        ids.extend(producer.join().unwrap());
    }
    scheduler.tick(tick, true);

    assert_eq!(ids.len(), THREADS * PER_THREAD);
    assert!(wait_until(Duration::from_secs(5), || runs.lock().unwrap().len() == THREADS * PER_THREAD));
    let runs = runs.lock().unwrap();
    let distinct: HashSet<_> = runs.iter().collect();
    assert_eq!(distinct.len(), runs.len(), "a task ran twice");
    assert!(wait_until(Duration::from_secs(5), || scheduler.pending_tasks().is_empty()));
}

#[test]
fn test_call_on_main_from_other_thread() {
    let scheduler = Arc::new(scheduler());
    let main_thread = thread::current().id();

    let caller = Arc::clone(&scheduler);
    let waiter = thread::spawn(move || {
        let mut call = caller.call_on_main(owner("console"), move || Ok(thread::current().id()));
        let ran_on = call.wait_timeout(Duration::from_secs(5));
        (ran_on, call.is_done())
    });

    // Nothing completes until the main thread ticks.
    assert!(wait_until(Duration::from_secs(2), || scheduler.tick_clock().core().undrained() == 1));
    thread::sleep(Duration::from_millis(20));
    assert!(!waiter.is_finished());
    scheduler.tick(0, true);

    let (ran_on, done) = waiter.join().unwrap();
    assert_eq!(ran_on.unwrap(), main_thread);
    assert!(done);
}

#[test]
fn test_call_failure_is_delivered() {
    let scheduler = scheduler();
    let mut call = scheduler.call_on_main::<u32, _>(owner("console"), || {
        Err(anyhow::anyhow!("unknown command"))
    });
    scheduler.tick(0, true);
    match call.wait() {
        Err(CallError::Failed(e)) => assert_eq!(e.to_string(), "unknown command"),
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[test]
fn test_call_on_custom_context() {
    let scheduler = Arc::new(scheduler());
    let region = Arc::new(SyncContext::new("region-1"));

    let driver = {
        let (scheduler, region) = (Arc::clone(&scheduler), Arc::clone(&region));
        thread::Builder::new()
            .name("region-driver".into())
            .spawn(move || {
                for t in 0..200 {
                    region.enter();
                    scheduler.tick_clock().tick(t, true);
                    thread::sleep(Duration::from_millis(2));
                }
            })
            .unwrap()
    };

    let mut call = scheduler.call_on_context(
        owner("region"),
        || Ok(thread::current().name().unwrap_or_default().to_string()),
        Some(Arc::clone(&region)),
    );
    assert_eq!(call.wait_timeout(Duration::from_secs(5)).unwrap(), "region-driver");
    driver.join().unwrap();
}

// ── Cancellation ────────────────────────────────────────────────────

#[test]
fn test_cancel_by_owner_spares_later_tasks() {
    let scheduler = scheduler();
    let cancelled = Arc::new(AtomicUsize::new(0));
    let later = Arc::new(AtomicUsize::new(0));

    let tick_task = scheduler.submit(counting("plugin", &cancelled).repeating(2), 3).unwrap();
    let wall_task = scheduler
        .submit(counting("plugin", &cancelled).real_time().repeating(2), 3)
        .unwrap();
    scheduler.cancel_all_owned_by(&owner("plugin"));
    let fresh = scheduler.run_task(counting("plugin", &later)).unwrap();

    for t in 0..20 {
        scheduler.tick(t, true);
    }
    assert_eq!(cancelled.load(Ordering::SeqCst), 0);
    assert_eq!(later.load(Ordering::SeqCst), 1);
    assert!(tick_task.is_cancelled() && wall_task.is_cancelled());
    assert!(!scheduler.is_queued(tick_task.id()));
    assert!(!scheduler.is_queued(wall_task.id()));
    assert_eq!(fresh.state(), TaskState::Retired);
}

#[test]
fn test_cancel_unknown_id_is_noop() {
    let scheduler = scheduler();
    let counter = Arc::new(AtomicUsize::new(0));
    let task = scheduler.run_task(counting("game", &counter)).unwrap();
    scheduler.cancel(task.id() + 1_000);
    scheduler.cancel(-1);
    scheduler.tick(0, true);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_shutdown_cancels_everything() {
    let scheduler = scheduler();
    let counter = Arc::new(AtomicUsize::new(0));
    scheduler.submit(counting("a", &counter).repeating(1), 1).unwrap();
    scheduler.submit(counting("b", &counter).asynchronous().repeating(1), 1).unwrap();
    scheduler.submit(counting("c", &counter).asynchronous().real_time().repeating(5), 50).unwrap();

    scheduler.shutdown();
    for t in 0..10 {
        scheduler.tick(t, true);
    }
    thread::sleep(Duration::from_millis(80));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert!(scheduler.pending_tasks().is_empty());
    assert!(scheduler.active_workers().is_empty());
}

// ── Diagnostics ─────────────────────────────────────────────────────

#[test]
fn test_metrics_per_domain() {
    let scheduler = scheduler();
    let counter = Arc::new(AtomicUsize::new(0));
    scheduler.run_task(counting("game", &counter)).unwrap();
    scheduler.run_task(counting("save", &counter).real_time()).unwrap();
    scheduler
        .run_task(TaskBuilder::new(owner("game"), || Err(anyhow::anyhow!("boom"))))
        .unwrap();

    scheduler.tick(0, true);

    let metrics = scheduler.metrics();
    assert_eq!(metrics.tick_clock.tasks_executed["game"], 1);
    assert_eq!(metrics.tick_clock.tasks_failed["game"], 1);
    assert_eq!(metrics.wall_clock.tasks_executed["save"], 1);
    assert_eq!(metrics.tick_clock.last_tick, 0);
    assert_eq!(metrics.wall_clock.domain, TimeDomain::WallClock);

    let json = serde_json::to_value(&metrics).unwrap();
    assert!(json["tick_clock"]["tasks_executed"]["game"].is_number());
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_file_roundtrip_into_scheduler() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scheduler.toml");
    std::fs::write(
        &path,
        r#"
max_async_workers = 16
timer_threads = 1
worker_thread_prefix = "sim-worker"
"#,
    )
    .unwrap();

    let config = SchedulerConfig::from_file(&path).unwrap();
    assert_eq!(config.worker_thread_prefix, "sim-worker");

    let main = Arc::new(SyncContext::new("main"));
    main.enter();
    let scheduler = Scheduler::new(config, main).unwrap();
    let (tx, rx) = std::sync::mpsc::channel();
    let tx = Mutex::new(tx);
    scheduler
        .run_task(
            TaskBuilder::new(owner("io"), move || {
                let name = thread::current().name().unwrap_or_default().to_string();
                tx.lock().unwrap().send(name)?;
                Ok(())
            })
            .asynchronous(),
        )
        .unwrap();
    scheduler.tick(0, true);
    let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(name.starts_with("sim-worker-"), "ran on {}", name);
}
