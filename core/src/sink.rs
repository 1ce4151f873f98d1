//! Fan-out writer delivering captured lines to the log file and the UI.
//!
//! The sink stays UI-agnostic: the frontend registers a plain line callback
//! and the core never depends on any UI code. One mutex serializes every
//! write, so lines from the flusher task and the suite worker never
//! interleave mid-write.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, Weak};

use crate::error::HarnessError;

pub type LineCallback = dyn Fn(&str) + Send + Sync;

/// A UI bridge the sink never owns: a weak callback plus an availability
/// flag, checked on every use. A vanished or panicking UI silently drops
/// out of the fan-out; the log keeps receiving lines.
pub struct SinkTarget {
    callback: Weak<LineCallback>,
    available: AtomicBool,
}

impl SinkTarget {
    pub fn new(callback: Weak<LineCallback>) -> Self {
        Self {
            callback,
            available: AtomicBool::new(true),
        }
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }
}

#[derive(Default)]
struct SinkState {
    file: Option<File>,
    file_path: String,
    file_healthy: bool,
    target: Option<SinkTarget>,
}

/// Thread-safe fan-out of lines to a log file and a registered UI target.
#[derive(Default)]
pub struct OutputSink {
    inner: Mutex<SinkState>,
}

impl OutputSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates/truncates the log file at `path`. A prior open file is
    /// closed first.
    pub fn open(&self, path: &Path) -> Result<(), HarnessError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(|source| HarnessError::Io {
                path: path.display().to_string(),
                source,
            })?;

        let mut state = self.lock_state();
        state.file = Some(file);
        state.file_path = path.display().to_string();
        state.file_healthy = true;
        Ok(())
    }

    /// Appends `line + '\n'` to the log (flushed immediately, so a later
    /// hang still leaves forensic output on disk), then hands `line` to the
    /// UI target if one is registered and available. Never fails from the
    /// caller's perspective.
    pub fn write(&self, line: &str) {
        let mut state = self.lock_state();
        state.write_to_file(line);

        let callback = match state.target.as_ref() {
            None => return,
            Some(target) if !target.is_available() => return,
            Some(target) => match target.callback.upgrade() {
                Some(callback) => callback,
                None => {
                    target.available.store(false, Ordering::Release);
                    tracing::debug!(
                        target: "testwatch.sink",
                        "ui target dropped, lines now reach the log only"
                    );
                    return;
                }
            },
        };

        if catch_unwind(AssertUnwindSafe(|| callback(line))).is_err() {
            if let Some(target) = state.target.as_ref() {
                target.available.store(false, Ordering::Release);
            }
            state.write_to_file("ui callback panicked; disabling ui forwarding");
            tracing::warn!(
                target: "testwatch.sink",
                "ui callback panicked, target disabled"
            );
        }
    }

    /// Flushes and closes the log file. Idempotent.
    pub fn close(&self) {
        let mut state = self.lock_state();
        if let Some(mut file) = state.file.take() {
            let _ = file.flush();
        }
        state.file_healthy = false;
    }

    /// Stores the single active UI target, discarding (not closing) any
    /// previous one; the UI handle is not owned by the sink.
    pub fn register_target(&self, target: SinkTarget) {
        self.lock_state().target = Some(target);
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SinkState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SinkState {
    fn write_to_file(&mut self, line: &str) {
        if !self.file_healthy {
            return;
        }
        let Some(file) = self.file.as_mut() else {
            return;
        };
        let result = writeln!(file, "{line}").and_then(|()| file.flush());
        if let Err(err) = result {
            // First failure disables the file; later writes degrade to the
            // UI target only.
            self.file_healthy = false;
            tracing::warn!(
                target: "testwatch.sink",
                path = %self.file_path,
                error = %err,
                "log write failed, disabling file output"
            );
        }
    }
}
