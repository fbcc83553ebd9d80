//! End-to-end scheduler scenarios.
//!
//! Each test drives a full scheduler instance (workers, watcher, preloader)
//! through the collecting sink and mock shells, pinning the externally
//! observable contract: exactly-once reporting, dependency ordering with
//! fail-fast cascades, priority dispatch, slot overlay lifecycle, preload
//! triggering, and CPU fallback after overlay failure.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use hetsched::engine::cpu::CpuEngine;
use hetsched::engine::slot::{MockShell, ReconfigSlot, Shell};
use hetsched::scheduler::{CollectingSink, ResultSink};
use hetsched::{
    AppDescriptor, ApplicationRegistry, BackendMode, Engine, ResourceKind, Scheduler,
    SchedulerConfig, Task,
};

fn wait_for<F: Fn() -> bool>(cond: F, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

fn fft_desc() -> AppDescriptor {
    AppDescriptor {
        name: "fft".to_string(),
        overlay: "fft_p0.bin".to_string(),
        kernel: "fft_kernel".to_string(),
        kind: ResourceKind::Fft,
    }
}

fn fir_desc() -> AppDescriptor {
    AppDescriptor {
        name: "fir".to_string(),
        overlay: "fir_p0.bin".to_string(),
        kernel: "fir_kernel".to_string(),
        kind: ResourceKind::Fir,
    }
}

fn zip_desc() -> AppDescriptor {
    AppDescriptor {
        name: "zip".to_string(),
        overlay: "zip_p0.bin".to_string(),
        kernel: "zip_kernel".to_string(),
        kind: ResourceKind::Zip,
    }
}

/// Scenario 1: a single CPU task completes quickly on a cpu-named engine.
#[test]
fn single_cpu_task() {
    let registry = Arc::new(ApplicationRegistry::new());
    registry.register(AppDescriptor::cpu("echo"));
    let sink = Arc::new(CollectingSink::new());
    let sched = Scheduler::new(
        Arc::clone(&registry),
        SchedulerConfig::default()
            .with_mode(BackendMode::Cpu)
            .with_cpu_workers(2)
            .with_sink(sink.clone() as Arc<dyn ResultSink>),
    );
    sched.add_engine(Arc::new(CpuEngine::new(0)));
    sched.start();

    sched.submit(Task::new(1, "echo").with_est_runtime(Duration::from_millis(10)));

    assert!(wait_for(|| sink.len() == 1, Duration::from_millis(100)));
    let r = &sink.results()[0];
    assert_eq!(r.id, 1);
    assert!(r.ok);
    assert!(r.engine.starts_with("cpu-"), "engine: {}", r.engine);
    sched.stop();
    // Exactly once: nothing trailing after stop.
    assert_eq!(sink.len(), 1);
}

/// Scenario 2: a dependency chain completes in id order, all ok.
#[test]
fn dependency_chain_runs_in_order() {
    let registry = Arc::new(ApplicationRegistry::new());
    registry.register(AppDescriptor::cpu("echo"));
    let sink = Arc::new(CollectingSink::new());
    let sched = Scheduler::new(
        Arc::clone(&registry),
        SchedulerConfig::default()
            .with_mode(BackendMode::Cpu)
            .with_cpu_workers(4)
            .with_sink(sink.clone() as Arc<dyn ResultSink>),
    );
    sched.add_engine(Arc::new(CpuEngine::new(0)));
    sched.add_engine(Arc::new(CpuEngine::new(1)));
    sched.start();

    let est = Duration::from_millis(2);
    sched.submit(Task::new(1, "echo").with_est_runtime(est));
    sched.submit(Task::new(2, "echo").with_depends_on(vec![1]).with_est_runtime(est));
    sched.submit(Task::new(3, "echo").with_depends_on(vec![2]).with_est_runtime(est));

    assert!(wait_for(|| sink.len() == 3, Duration::from_secs(2)));
    let results = sink.results();
    assert!(results.iter().all(|r| r.ok));
    let ids: Vec<u64> = results.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    sched.stop();
}

/// Scenario 3: with one worker, queued tasks are served highest priority
/// first once the running task finishes.
#[test]
fn priority_order_with_single_worker() {
    let registry = Arc::new(ApplicationRegistry::new());
    registry.register(AppDescriptor::cpu("echo"));
    let sink = Arc::new(CollectingSink::new());
    let sched = Scheduler::new(
        Arc::clone(&registry),
        SchedulerConfig::default()
            .with_mode(BackendMode::Cpu)
            .with_cpu_workers(1)
            .with_sink(sink.clone() as Arc<dyn ResultSink>),
    );
    sched.add_engine(Arc::new(CpuEngine::new(0)));
    sched.start();

    sched.submit(
        Task::new(10, "echo")
            .with_priority(0)
            .with_est_runtime(Duration::from_millis(200)),
    );
    // Let task 10 reach the worker before the contenders arrive.
    thread::sleep(Duration::from_millis(50));
    sched.submit(Task::new(11, "echo").with_priority(5).with_est_runtime(Duration::from_millis(5)));
    sched.submit(Task::new(12, "echo").with_priority(1).with_est_runtime(Duration::from_millis(5)));

    assert!(wait_for(|| sink.len() == 3, Duration::from_secs(2)));
    let ids: Vec<u64> = sink.results().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![10, 11, 12]);
    sched.stop();
}

/// Scenario 4: consecutive apps on one slot reconfigure exactly once each
/// and leave the last overlay loaded.
#[test]
fn hardware_overlay_switch() {
    let registry = Arc::new(ApplicationRegistry::new());
    registry.register(fft_desc());
    registry.register(fir_desc());
    let sink = Arc::new(CollectingSink::new());
    let sched = Scheduler::new(
        Arc::clone(&registry),
        SchedulerConfig::default()
            .with_mode(BackendMode::Fpga)
            .with_cpu_workers(1)
            .with_sink(sink.clone() as Arc<dyn ResultSink>),
    );
    let shell = MockShell::new();
    let slot = Arc::new(ReconfigSlot::new(0, shell.clone() as Arc<dyn Shell>));
    sched.add_engine(slot.clone());
    sched.start();

    sched.submit(
        Task::new(1, "fft")
            .with_required(ResourceKind::Fft)
            .with_est_runtime(Duration::from_millis(2)),
    );
    assert!(wait_for(|| sink.len() == 1, Duration::from_secs(2)));
    sched.submit(
        Task::new(2, "fir")
            .with_required(ResourceKind::Fir)
            .with_est_runtime(Duration::from_millis(2)),
    );
    assert!(wait_for(|| sink.len() == 2, Duration::from_secs(2)));

    let results = sink.results();
    assert!(results.iter().all(|r| r.ok));
    assert_eq!(shell.loads(), vec!["fft_p0.bin", "fir_p0.bin"]);
    assert_eq!(slot.current_app().as_deref(), Some("fir"));
    sched.stop();
}

/// Scenario 5: demand for a blocked app preloads its overlay without
/// running any task early.
#[test]
fn overlay_preload_on_waiting_demand() {
    let registry = Arc::new(ApplicationRegistry::new());
    registry.register(fft_desc());
    registry.register(zip_desc());
    let sink = Arc::new(CollectingSink::new());
    let sched = Scheduler::new(
        Arc::clone(&registry),
        SchedulerConfig::default()
            .with_mode(BackendMode::Fpga)
            .with_cpu_workers(1)
            .with_preload_threshold(2)
            .with_sink(sink.clone() as Arc<dyn ResultSink>),
    );
    let shell = MockShell::new();
    let slot = Arc::new(ReconfigSlot::new(0, shell.clone() as Arc<dyn Shell>));
    // Slot starts out holding "zip".
    slot.ensure_app_loaded(&zip_desc()).unwrap();
    sched.add_engine(slot.clone());
    sched.start();

    // Dependency 99 never reports; all three stay in Waiting.
    for id in [1u64, 2, 3] {
        sched.submit(
            Task::new(id, "fft")
                .with_required(ResourceKind::Fft)
                .with_depends_on(vec![99]),
        );
    }

    assert!(wait_for(|| shell.load_count() == 2, Duration::from_secs(2)));
    assert_eq!(shell.loads(), vec!["zip_p0.bin", "fft_p0.bin"]);
    assert_eq!(slot.current_app().as_deref(), Some("fft"));
    // Nothing ran: dependencies never cleared.
    assert!(sink.is_empty());
    sched.stop();
    assert!(sink.is_empty());
}

/// Scenario 6: when the slot cannot load the overlay, the task lands on a
/// CPU engine and the message carries the fallback marker.
#[test]
fn cpu_fallback_after_overlay_failure() {
    let registry = Arc::new(ApplicationRegistry::new());
    registry.register(fft_desc());
    let sink = Arc::new(CollectingSink::new());
    let sched = Scheduler::new(
        Arc::clone(&registry),
        SchedulerConfig::default()
            .with_mode(BackendMode::Fpga)
            .with_cpu_workers(1)
            .with_sink(sink.clone() as Arc<dyn ResultSink>),
    );
    let shell = MockShell::new();
    shell.set_fail(true);
    sched.add_engine(Arc::new(ReconfigSlot::new(0, shell as Arc<dyn Shell>)));
    sched.add_engine(Arc::new(CpuEngine::new(0)));
    sched.start();

    sched.submit(
        Task::new(1, "fft")
            .with_required(ResourceKind::Fft)
            .with_est_runtime(Duration::from_millis(2)),
    );

    assert!(wait_for(|| sink.len() == 1, Duration::from_secs(2)));
    let r = &sink.results()[0];
    assert!(r.ok);
    assert!(r.engine.starts_with("cpu-"), "engine: {}", r.engine);
    assert!(r.message.contains("(cpu fallback)"), "message: {}", r.message);
    sched.stop();
}

/// Fail-fast cascade: a dependent of a failed task is reported failed
/// without running (the behavior this crate pins for the ambiguous case).
#[test]
fn failed_dependency_cascades() {
    let registry = Arc::new(ApplicationRegistry::new());
    registry.register(AppDescriptor::cpu("echo"));
    let sink = Arc::new(CollectingSink::new());
    let sched = Scheduler::new(
        Arc::clone(&registry),
        SchedulerConfig::default()
            .with_mode(BackendMode::Cpu)
            .with_cpu_workers(2)
            .with_sink(sink.clone() as Arc<dyn ResultSink>),
    );
    sched.add_engine(Arc::new(CpuEngine::new(0)));
    sched.start();

    // Task 1 fails (unknown app), tasks 2 and 3 depend on the chain.
    sched.submit(Task::new(1, "missing"));
    sched.submit(Task::new(2, "echo").with_depends_on(vec![1]));
    sched.submit(Task::new(3, "echo").with_depends_on(vec![2]));

    assert!(wait_for(|| sink.len() == 3, Duration::from_secs(2)));
    let results = sink.results();
    assert!(results.iter().all(|r| !r.ok));
    let r2 = results.iter().find(|r| r.id == 2).unwrap();
    assert_eq!(r2.message, "dependency 1 failed");
    let r3 = results.iter().find(|r| r.id == 3).unwrap();
    assert_eq!(r3.message, "dependency 2 failed");
    sched.stop();
}

/// Every submitted task is reported exactly once between submit and stop.
#[test]
fn exactly_once_reporting_under_load() {
    let registry = Arc::new(ApplicationRegistry::new());
    registry.register(AppDescriptor::cpu("echo"));
    let sink = Arc::new(CollectingSink::new());
    let sched = Scheduler::new(
        Arc::clone(&registry),
        SchedulerConfig::default()
            .with_mode(BackendMode::Cpu)
            .with_cpu_workers(4)
            .with_sink(sink.clone() as Arc<dyn ResultSink>),
    );
    for id in 0..4 {
        sched.add_engine(Arc::new(CpuEngine::new(id)));
    }
    sched.start();

    let total = 100u64;
    for id in 1..=total {
        sched.submit(
            Task::new(id, "echo")
                .with_priority((id % 5) as i32)
                .with_est_runtime(Duration::from_micros(200)),
        );
    }

    assert!(wait_for(|| sink.len() == total as usize, Duration::from_secs(10)));
    sched.stop();

    let mut ids: Vec<u64> = sink.results().iter().map(|r| r.id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), total as usize, "duplicate or missing reports");
}
