//! Scheduler runner.
//!
//! Loads a JSON app bundle (apps, providers, and a task workload), wires the
//! engines, and runs the workload to completion. Hand-rolled flag parsing
//! (no clap dependency) to keep binary size small and boot fast.
//!
//! ```text
//! hetsched --app-bundle=PATH [--backend=auto|cpu|fpga] [--cpu-workers=N]
//!          [--preload-threshold=N] [--slots=N] [--csv-report]
//!          [--static-shell=REF] [--fpga-manager=PATH] [--fpga-real]
//!          [--fpga-debug] [-- passthrough args...]
//! ```
//!
//! Exit codes: 0 on success, 1 on configuration error.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;

use hetsched::dash::CompletionBus;
use hetsched::engine::cpu::CpuEngine;
use hetsched::engine::slot::{FsShell, MockShell, ReconfigSlot, Shell};
use hetsched::scheduler::{ResultSink, TextSink};
use hetsched::{
    AppDescriptor, ApplicationRegistry, BackendMode, Provider, ProviderRegistry, ResourceKind,
    Scheduler, SchedulerConfig, Task,
};

const DEFAULT_FPGA_MANAGER: &str = "/sys/class/fpga_manager/fpga0/firmware";
const DEFAULT_STATIC_SHELL: &str = "static_wrapper.bin";

// ============================================================================
// App bundle
// ============================================================================

/// Declarative client workload: what the original runtime loaded as a
/// plug-in library, expressed as data.
#[derive(Debug, Deserialize)]
struct AppBundle {
    #[serde(default)]
    apps: Vec<AppDescriptor>,
    #[serde(default)]
    providers: Vec<Provider>,
    #[serde(default)]
    tasks: Vec<TaskSpec>,
}

#[derive(Debug, Deserialize)]
struct TaskSpec {
    id: u64,
    app: String,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    depends_on: Vec<u64>,
    #[serde(default)]
    est_runtime_ms: u64,
    #[serde(default)]
    release_after_ms: u64,
}

fn load_bundle(path: &PathBuf) -> Result<AppBundle, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("cannot read app bundle {}: {}", path.display(), e))?;
    serde_json::from_str(&text)
        .map_err(|e| format!("malformed app bundle {}: {}", path.display(), e))
}

// ============================================================================
// CLI
// ============================================================================

struct RunnerConfig {
    bundle_path: PathBuf,
    backend: BackendMode,
    cpu_workers: usize,
    preload_threshold: u32,
    slots: u32,
    csv_report: bool,
    static_shell: String,
    fpga_manager: PathBuf,
    fpga_real: bool,
    fpga_debug: bool,
    passthrough: Vec<String>,
}

fn print_usage(exe: &str) {
    eprintln!(
        "Usage: {} --app-bundle=PATH [--backend=auto|cpu|fpga] [--cpu-workers=N] \
         [--preload-threshold=N] [--slots=N] [--csv-report] [--static-shell=REF] \
         [--fpga-manager=PATH] [--fpga-real] [--fpga-debug] [-- args...]",
        exe
    );
    eprintln!("  --csv-report   emit task lines as CSV (id,ok,msg,time_ns,engine)");
    eprintln!("  --fpga-real    drive a firmware-file shell instead of the mock");
    eprintln!("  --fpga-debug   verbose slot logging");
}

fn config_error(exe: &str, msg: &str) -> ! {
    eprintln!("error: {}", msg);
    print_usage(exe);
    process::exit(1);
}

fn parse_args() -> RunnerConfig {
    let mut args = env::args();
    let exe = args.next().unwrap_or_else(|| "hetsched".to_string());

    let mut bundle_path: Option<PathBuf> = None;
    let mut backend = BackendMode::Auto;
    let mut cpu_workers = 0usize;
    let mut preload_threshold = 3u32;
    let mut slots = 1u32;
    let mut csv_report = false;
    let mut static_shell = DEFAULT_STATIC_SHELL.to_string();
    let mut fpga_manager = PathBuf::from(DEFAULT_FPGA_MANAGER);
    let mut fpga_real = false;
    let mut fpga_debug = false;
    let mut passthrough = Vec::new();

    let mut rest = false;
    for arg in args {
        if rest {
            passthrough.push(arg);
            continue;
        }
        if arg == "--" {
            rest = true;
            continue;
        }
        if arg == "--help" || arg == "-h" {
            print_usage(&exe);
            process::exit(0);
        }
        if let Some(v) = arg.strip_prefix("--app-bundle=") {
            bundle_path = Some(PathBuf::from(v));
            continue;
        }
        // Older name for the same flag.
        if let Some(v) = arg.strip_prefix("--app-lib=") {
            bundle_path = Some(PathBuf::from(v));
            continue;
        }
        if let Some(v) = arg.strip_prefix("--backend=") {
            backend = BackendMode::parse(v)
                .unwrap_or_else(|| config_error(&exe, &format!("unknown backend '{}'", v)));
            continue;
        }
        if let Some(v) = arg.strip_prefix("--cpu-workers=") {
            cpu_workers = parse_number(&exe, v, "--cpu-workers");
            continue;
        }
        if let Some(v) = arg.strip_prefix("--preload-threshold=") {
            preload_threshold = parse_number(&exe, v, "--preload-threshold") as u32;
            continue;
        }
        if let Some(v) = arg.strip_prefix("--slots=") {
            slots = parse_number(&exe, v, "--slots") as u32;
            continue;
        }
        if let Some(v) = arg.strip_prefix("--static-shell=") {
            static_shell = v.to_string();
            continue;
        }
        if let Some(v) = arg.strip_prefix("--fpga-manager=") {
            fpga_manager = PathBuf::from(v);
            continue;
        }
        match arg.as_str() {
            "--csv-report" => csv_report = true,
            "--fpga-real" => fpga_real = true,
            "--fpga-mock" => fpga_real = false,
            "--fpga-debug" => fpga_debug = true,
            other => config_error(&exe, &format!("unknown option '{}'", other)),
        }
    }

    let Some(bundle_path) = bundle_path else {
        config_error(&exe, "--app-bundle is required");
    };

    RunnerConfig {
        bundle_path,
        backend,
        cpu_workers,
        preload_threshold,
        slots,
        csv_report,
        static_shell,
        fpga_manager,
        fpga_real,
        fpga_debug,
        passthrough,
    }
}

fn parse_number(exe: &str, value: &str, flag: &str) -> usize {
    match value.parse::<usize>() {
        Ok(n) => n,
        Err(_) => config_error(exe, &format!("{} expects a number, got '{}'", flag, value)),
    }
}

// ============================================================================
// Workload
// ============================================================================

fn build_task(spec: &TaskSpec, registry: &ApplicationRegistry, started: Instant) -> Task {
    let required = registry
        .lookup(&spec.app)
        .map(|d| d.kind)
        .unwrap_or(ResourceKind::Cpu);
    let mut task = Task::new(spec.id, spec.app.clone())
        .with_required(required)
        .with_priority(spec.priority)
        .with_depends_on(spec.depends_on.clone())
        .with_est_runtime(Duration::from_millis(spec.est_runtime_ms));
    if spec.release_after_ms > 0 {
        task = task.with_release_time(started + Duration::from_millis(spec.release_after_ms));
    }
    task
}

fn run_workload(
    scheduler: &Scheduler,
    bus: &CompletionBus,
    registry: &ApplicationRegistry,
    specs: &[TaskSpec],
) -> (usize, usize) {
    let started = Instant::now();
    let mut completions = Vec::with_capacity(specs.len());
    for spec in specs {
        let task = build_task(spec, registry, started);
        completions.push((spec.id, bus.subscribe(spec.id)));
        scheduler.submit(task);
    }

    let mut ok_count = 0usize;
    let mut failed = 0usize;
    for (id, completion) in completions {
        match completion.wait_timeout(Duration::from_secs(60)) {
            Some(true) => ok_count += 1,
            Some(false) => failed += 1,
            None => {
                eprintln!("[runner] task {} timed out", id);
                failed += 1;
            }
        }
    }
    (ok_count, failed)
}

fn main() {
    let config = parse_args();

    let bundle = match load_bundle(&config.bundle_path) {
        Ok(bundle) => bundle,
        Err(msg) => {
            eprintln!("error: {}", msg);
            process::exit(1);
        }
    };
    if !config.passthrough.is_empty() {
        eprintln!("[runner] passthrough args: {:?}", config.passthrough);
    }

    let mut ids = std::collections::HashSet::new();
    for spec in &bundle.tasks {
        if !ids.insert(spec.id) {
            eprintln!("error: duplicate task id {} in app bundle", spec.id);
            process::exit(1);
        }
    }

    let registry = Arc::new(ApplicationRegistry::new());
    for app in &bundle.apps {
        registry.register(app.clone());
    }
    let providers = Arc::new(ProviderRegistry::new());
    for provider in &bundle.providers {
        providers.register(provider.clone());
    }

    let sink = Arc::new(TextSink::stdout());
    sink.set_csv(config.csv_report);

    let scheduler = Scheduler::new(
        Arc::clone(&registry),
        SchedulerConfig::default()
            .with_mode(config.backend)
            .with_cpu_workers(config.cpu_workers)
            .with_preload_threshold(config.preload_threshold)
            .with_sink(sink as Arc<dyn ResultSink>),
    );

    for id in 0..scheduler.cpu_workers() as u32 {
        scheduler.add_engine(Arc::new(CpuEngine::new(id)));
    }
    if config.backend != BackendMode::Cpu {
        for slot_id in 0..config.slots {
            let shell: Arc<dyn Shell> = if config.fpga_real {
                Arc::new(FsShell::new(&config.fpga_manager))
            } else {
                MockShell::new()
            };
            scheduler.add_engine(Arc::new(
                ReconfigSlot::new(slot_id, shell)
                    .with_static_shell(config.static_shell.clone())
                    .with_debug_logging(config.fpga_debug),
            ));
        }
    }

    let bus = scheduler.completion_bus();
    scheduler.start();
    let (ok_count, failed) = run_workload(&scheduler, &bus, &registry, &bundle.tasks);
    scheduler.stop();

    eprintln!(
        "[runner] workload finished: {} ok, {} failed of {}",
        ok_count,
        failed,
        bundle.tasks.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_parses_with_defaults() {
        let json = r#"{
            "apps": [
                {"name": "fft", "overlay": "fft_p0.bin", "kind": "fft"},
                {"name": "echo", "kind": "cpu"}
            ],
            "providers": [
                {"op": "fft", "kind": "fft"},
                {"op": "fft", "kind": "cpu", "priority": 10}
            ],
            "tasks": [
                {"id": 1, "app": "echo", "est_runtime_ms": 5},
                {"id": 2, "app": "fft", "depends_on": [1], "priority": 2}
            ]
        }"#;
        let bundle: AppBundle = serde_json::from_str(json).unwrap();
        assert_eq!(bundle.apps.len(), 2);
        assert_eq!(bundle.apps[0].kind, ResourceKind::Fft);
        assert_eq!(bundle.apps[1].overlay, "");
        assert_eq!(bundle.providers[0].priority, 0);
        assert_eq!(bundle.tasks[1].depends_on, vec![1]);
        assert_eq!(bundle.tasks[0].release_after_ms, 0);
    }

    #[test]
    fn task_spec_builds_with_registry_kind() {
        let registry = ApplicationRegistry::new();
        registry.register(AppDescriptor {
            name: "fft".to_string(),
            overlay: "fft_p0.bin".to_string(),
            kernel: String::new(),
            kind: ResourceKind::Fft,
        });
        let spec = TaskSpec {
            id: 9,
            app: "fft".to_string(),
            priority: 1,
            depends_on: vec![],
            est_runtime_ms: 7,
            release_after_ms: 0,
        };
        let task = build_task(&spec, &registry, Instant::now());
        assert_eq!(task.required, ResourceKind::Fft);
        assert_eq!(task.priority, 1);
        assert_eq!(task.est_runtime, Duration::from_millis(7));
    }
}
