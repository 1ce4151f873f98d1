//! End-to-end tests for the run coordinator: single-use invariant, watchdog
//! abandonment, fault conversion, and log/marker ordering.
//!
//! Stream redirection is process-wide, so every test that executes a run
//! holds `RUN_GUARD` to keep the captures from colliding across the test
//! threads.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use testwatch_core::{
    exit, Degradation, HarnessConfig, ProcessRunState, RunCoordinator, Suite, SuiteConfig,
};

static RUN_GUARD: Mutex<()> = Mutex::new(());

fn test_config() -> HarnessConfig {
    HarnessConfig {
        suite_name: "probe".to_string(),
        timeout_secs: 5,
        flush_interval_ms: 20,
        ..HarnessConfig::default()
    }
}

fn log_path(dir: &tempfile::TempDir, cfg: &HarnessConfig) -> PathBuf {
    dir.path().join(cfg.log_file_name())
}

enum Behavior {
    /// Write the lines to stdout, then return the code.
    Lines(&'static [&'static str], i32),
    PanicWithMessage(&'static str),
    PanicOpaque,
    Hang,
    RecordFilter(Arc<Mutex<String>>),
}

struct FakeSuite {
    calls: Arc<AtomicUsize>,
    behavior: Behavior,
}

impl Suite for FakeSuite {
    fn run(&self, cfg: &SuiteConfig) -> i32 {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Lines(lines, code) => {
                // Through the real descriptor, like a third-party suite would.
                let mut out = std::io::stdout();
                for line in *lines {
                    let _ = writeln!(out, "{line}");
                }
                let _ = out.flush();
                *code
            }
            Behavior::PanicWithMessage(msg) => panic!("{}", msg),
            Behavior::PanicOpaque => std::panic::panic_any(42usize),
            Behavior::Hang => {
                std::thread::sleep(Duration::from_secs(30));
                0
            }
            Behavior::RecordFilter(slot) => {
                *slot.lock().unwrap() = cfg.filter_expression.clone();
                0
            }
        }
    }
}

fn harness(behavior: Behavior, cfg: HarnessConfig) -> (RunCoordinator, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let suite = FakeSuite {
        calls: calls.clone(),
        behavior,
    };
    let coordinator = RunCoordinator::new(Arc::new(ProcessRunState::new()), cfg, Arc::new(suite));
    (coordinator, calls)
}

#[tokio::test]
async fn run_once_logs_output_and_replays_outcome() {
    let _guard = RUN_GUARD.lock().unwrap_or_else(PoisonError::into_inner);
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config();
    let (coordinator, calls) = harness(
        Behavior::Lines(&["alpha passed", "beta passed"], 0),
        cfg.clone(),
    );

    let outcome = coordinator.execute(dir.path()).await;
    assert_eq!(outcome.code, exit::SUCCESS);
    assert!(!outcome.timed_out);
    assert!(outcome.degradations.is_empty(), "{:?}", outcome.degradations);

    let log = std::fs::read_to_string(log_path(&dir, &cfg)).unwrap();
    let start = log.find("probe suite starting").expect("starting marker");
    let alpha = log.find("alpha passed").expect("first suite line");
    let beta = log.find("beta passed").expect("second suite line");
    let end = log
        .find("probe suite finished: exit code 0")
        .expect("completion marker");
    assert!(start < alpha && alpha < beta && beta < end, "{log}");

    // A second call replays the memoized outcome without re-running.
    let replay = coordinator.execute(dir.path()).await;
    assert_eq!(replay, outcome);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn suite_failure_code_passes_through() {
    let _guard = RUN_GUARD.lock().unwrap_or_else(PoisonError::into_inner);
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config();
    let (coordinator, _calls) = harness(Behavior::Lines(&["gamma failed"], 2), cfg);

    let outcome = coordinator.execute(dir.path()).await;
    assert_eq!(outcome.code, 2);
    assert!(!outcome.timed_out);
}

#[tokio::test]
async fn concurrent_execute_runs_the_suite_once() {
    let _guard = RUN_GUARD.lock().unwrap_or_else(PoisonError::into_inner);
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config();
    let (coordinator, calls) = harness(Behavior::Lines(&["solo run"], 0), cfg);
    let coordinator = Arc::new(coordinator);

    let first = {
        let coordinator = coordinator.clone();
        let workdir = dir.path().to_path_buf();
        tokio::spawn(async move { coordinator.execute(&workdir).await })
    };
    let second = {
        let coordinator = coordinator.clone();
        let workdir = dir.path().to_path_buf();
        tokio::spawn(async move { coordinator.execute(&workdir).await })
    };

    let first = first.await.unwrap();
    let second = second.await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.code, exit::SUCCESS);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn watchdog_abandons_a_hung_suite() {
    let _guard = RUN_GUARD.lock().unwrap_or_else(PoisonError::into_inner);
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config();
    cfg.timeout_secs = 1;
    let (coordinator, calls) = harness(Behavior::Hang, cfg.clone());

    let started = Instant::now();
    let outcome = coordinator.execute(dir.path()).await;
    let elapsed = started.elapsed();

    assert_eq!(outcome.code, exit::TIMEOUT);
    assert!(outcome.timed_out);
    // The caller comes back at timeout + epsilon, not when the worker does.
    assert!(elapsed < Duration::from_secs(4), "caller blocked: {elapsed:?}");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let log = std::fs::read_to_string(log_path(&dir, &cfg)).unwrap();
    assert!(log.contains("abandoning worker"), "{log}");
    assert!(log.contains("exit code 124 (timed out)"), "{log}");
}

#[tokio::test]
async fn panicking_suite_maps_to_code_3() {
    let _guard = RUN_GUARD.lock().unwrap_or_else(PoisonError::into_inner);
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config();
    let (coordinator, _calls) = harness(Behavior::PanicWithMessage("boom"), cfg.clone());

    let outcome = coordinator.execute(dir.path()).await;
    assert_eq!(outcome.code, exit::SUITE_PANIC);
    assert!(!outcome.timed_out);

    let log = std::fs::read_to_string(log_path(&dir, &cfg)).unwrap();
    assert!(log.contains("Caught exception: boom"), "{log}");
}

#[tokio::test]
async fn opaque_fault_maps_to_code_4() {
    let _guard = RUN_GUARD.lock().unwrap_or_else(PoisonError::into_inner);
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config();
    let (coordinator, _calls) = harness(Behavior::PanicOpaque, cfg.clone());

    let outcome = coordinator.execute(dir.path()).await;
    assert_eq!(outcome.code, exit::UNKNOWN_FAULT);
    assert!(!outcome.timed_out);

    let log = std::fs::read_to_string(log_path(&dir, &cfg)).unwrap();
    let fault = log.find("Unknown exception").expect("fault line");
    let end = log.find("suite finished: exit code 4").expect("marker");
    assert!(fault < end, "{log}");
}

#[tokio::test]
async fn configured_exclusions_reach_the_suite() {
    let _guard = RUN_GUARD.lock().unwrap_or_else(PoisonError::into_inner);
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config();
    cfg.exclude_tags = vec!["slow".to_string(), "network".to_string()];

    let slot = Arc::new(Mutex::new(String::new()));
    let (coordinator, _calls) = harness(Behavior::RecordFilter(slot.clone()), cfg);

    let outcome = coordinator.execute(dir.path()).await;
    assert_eq!(outcome.code, exit::SUCCESS);
    assert_eq!(*slot.lock().unwrap(), "~[slow]~[network]");
}

#[tokio::test]
async fn unwritable_log_degrades_but_still_runs() {
    let _guard = RUN_GUARD.lock().unwrap_or_else(PoisonError::into_inner);
    let dir = tempfile::tempdir().unwrap();
    let missing_workdir = dir.path().join("not-there");
    let cfg = test_config();
    let (coordinator, calls) = harness(Behavior::Lines(&["ran anyway"], 0), cfg);

    let outcome = coordinator.execute(&missing_workdir).await;
    assert_eq!(outcome.code, exit::SUCCESS);
    assert!(outcome.degradations.contains(&Degradation::LogUnavailable));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
