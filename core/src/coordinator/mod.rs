//! Run coordination: the single-use invariant, the watchdog, and the
//! deterministic teardown of capture, flusher and sink.

pub mod exit;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::capture::{Channel, StreamCapture};
use crate::config::HarnessConfig;
use crate::flusher::LiveFlusher;
use crate::sink::OutputSink;
use crate::suite::Suite;

/// Harness-side failures that degraded a run without aborting it.
///
/// Kept separate from the exit code on purpose: callers that care can tell
/// "the suite failed" apart from "the harness lost its log or capture",
/// while the code keeps the suite's own semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Degradation {
    LogUnavailable,
    CaptureUnavailable { channel: &'static str },
}

/// Terminal value of a run. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub code: i32,
    pub timed_out: bool,
    pub degradations: Vec<Degradation>,
}

/// Process-scoped run state. Created once by the host and shared into the
/// coordinator; the suite executes at most once per process lifetime.
#[derive(Default)]
pub struct ProcessRunState {
    used_once: AtomicBool,
    run_lock: tokio::sync::Mutex<Option<RunOutcome>>,
}

impl ProcessRunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_run(&self) -> bool {
        self.used_once.load(Ordering::Acquire)
    }

    fn replay_outcome(memo: &Option<RunOutcome>) -> RunOutcome {
        memo.clone().unwrap_or(RunOutcome {
            code: exit::REPLAY_UNKNOWN,
            timed_out: false,
            degradations: Vec::new(),
        })
    }
}

pub struct RunCoordinator {
    state: Arc<ProcessRunState>,
    config: HarnessConfig,
    suite: Arc<dyn Suite>,
    sink: Arc<OutputSink>,
}

impl RunCoordinator {
    pub fn new(state: Arc<ProcessRunState>, config: HarnessConfig, suite: Arc<dyn Suite>) -> Self {
        Self {
            state,
            config,
            suite,
            sink: Arc::new(OutputSink::new()),
        }
    }

    /// The sink handle, so the host can register a UI target before the run.
    pub fn sink(&self) -> Arc<OutputSink> {
        self.sink.clone()
    }

    /// Runs the suite once, guarded by the watchdog, and returns its
    /// outcome. Every later call replays the memoized outcome without
    /// touching the log or the captures; a concurrent call blocks until
    /// the first run finishes and then replays.
    ///
    /// This function always returns an outcome; suite faults, I/O failures
    /// and the timeout are all absorbed into it.
    pub async fn execute(&self, working_dir: &Path) -> RunOutcome {
        if self.state.has_run() {
            let memo = self.state.run_lock.lock().await;
            return ProcessRunState::replay_outcome(&memo);
        }

        let mut memo = self.state.run_lock.lock().await;
        // Re-check after acquiring: a concurrent caller may have won the
        // race and completed the run while we waited.
        if self.state.has_run() {
            return ProcessRunState::replay_outcome(&memo);
        }

        let outcome = self.run_locked(working_dir).await;
        *memo = Some(outcome.clone());
        self.state.used_once.store(true, Ordering::Release);
        outcome
    }

    async fn run_locked(&self, working_dir: &Path) -> RunOutcome {
        let run_id = Uuid::new_v4();
        let mut degradations = Vec::new();

        #[cfg(unix)]
        ignore_sigpipe();

        // Failures from here to launch degrade the run; the suite still
        // executes and a status code is still returned.
        let log_path = working_dir.join(self.config.log_file_name());
        if let Err(err) = self.sink.open(&log_path) {
            tracing::warn!(
                target: "testwatch.run",
                error = %err,
                "log file unavailable, continuing without it"
            );
            degradations.push(Degradation::LogUnavailable);
        }

        let mut flusher = LiveFlusher::new(self.sink.clone());
        let mut captures: Vec<Arc<StreamCapture>> = Vec::new();
        for channel in [Channel::Stdout, Channel::Stderr] {
            match StreamCapture::acquire(channel) {
                Ok(capture) => {
                    flusher.register(capture.clone());
                    captures.push(capture);
                }
                Err(err) => {
                    tracing::warn!(
                        target: "testwatch.run",
                        channel = channel.name(),
                        error = %err,
                        "channel capture unavailable, its output will be lost"
                    );
                    degradations.push(Degradation::CaptureUnavailable {
                        channel: channel.name(),
                    });
                }
            }
        }
        flusher.start(Duration::from_millis(self.config.flush_interval_ms));

        let suite_cfg = self.config.suite_config();
        self.sink.write(&format!(
            "===== {} suite starting at {} (run {run_id}, filter \"{}\") =====",
            self.config.suite_name,
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            suite_cfg.filter_expression,
        ));

        let (code, timed_out) = self.launch_and_wait(suite_cfg).await;

        flusher.stop().await;
        for capture in &captures {
            capture.release();
        }
        self.sink.write(&format!(
            "===== {} suite finished: exit code {code}{} =====",
            self.config.suite_name,
            if timed_out { " (timed out)" } else { "" },
        ));
        self.sink.close();

        RunOutcome {
            code,
            timed_out,
            degradations,
        }
    }

    /// Launches the suite on a detached worker thread and races its result
    /// against the watchdog.
    ///
    /// The suite offers no cooperative cancellation, so on timeout the
    /// worker is abandoned, not joined: the thread keeps running until the
    /// process exits. The harness accepts that leak to guarantee the
    /// caller is never blocked past the deadline.
    async fn launch_and_wait(&self, suite_cfg: crate::suite::SuiteConfig) -> (i32, bool) {
        let (result_tx, result_rx) = oneshot::channel::<i32>();
        let suite = self.suite.clone();
        let sink = self.sink.clone();

        let spawned = std::thread::Builder::new()
            .name(format!("{}-suite", self.config.suite_name))
            .spawn(move || {
                let code = match catch_unwind(AssertUnwindSafe(|| suite.run(&suite_cfg))) {
                    Ok(code) => code,
                    Err(payload) => {
                        if let Some(msg) = panic_message(payload.as_ref()) {
                            sink.write(&format!("Caught exception: {msg}"));
                            exit::SUITE_PANIC
                        } else {
                            sink.write("Unknown exception in suite worker");
                            exit::UNKNOWN_FAULT
                        }
                    }
                };
                let _ = result_tx.send(code);
            });

        if let Err(err) = spawned {
            tracing::error!(
                target: "testwatch.run",
                error = %err,
                "could not launch suite worker"
            );
            self.sink.write("failed to launch suite worker");
            return (exit::UNKNOWN_FAULT, false);
        }

        let deadline = Duration::from_secs(self.config.timeout_secs);
        match tokio::time::timeout(deadline, result_rx).await {
            Ok(Ok(code)) => (code, false),
            Ok(Err(_)) => {
                self.sink
                    .write("suite worker vanished without reporting a status");
                (exit::UNKNOWN_FAULT, false)
            }
            Err(_) => {
                self.sink.write(&format!(
                    "suite still running after {}s, abandoning worker",
                    deadline.as_secs()
                ));
                (exit::TIMEOUT, true)
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> Option<&str> {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        Some(msg)
    } else {
        payload.downcast_ref::<String>().map(String::as_str)
    }
}

#[cfg(unix)]
fn ignore_sigpipe() {
    use nix::sys::signal::{signal, SigHandler, Signal};

    // SAFETY: SIG_IGN is not a handler function, so no re-entrancy or
    // async-signal-safety concerns arise from installing it.
    if let Err(err) = unsafe { signal(Signal::SIGPIPE, SigHandler::SigIgn) } {
        tracing::warn!(
            target: "testwatch.run",
            error = %err,
            "could not ignore SIGPIPE"
        );
    }
}
