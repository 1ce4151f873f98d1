//! Periodic drain of captures into the sink.
//!
//! Keeps the display live while the suite is still executing: a background
//! task ticks, pumps every registered capture, and forwards the complete
//! lines to the sink. `stop` waits for the task and then runs one final
//! unconditional drain, so no buffered line is lost between the last tick
//! and suite completion.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::capture::StreamCapture;
use crate::sink::OutputSink;

pub struct LiveFlusher {
    sink: Arc<OutputSink>,
    captures: Vec<Arc<StreamCapture>>,
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl LiveFlusher {
    pub fn new(sink: Arc<OutputSink>) -> Self {
        Self {
            sink,
            captures: Vec::new(),
            stop_tx: None,
            task: None,
        }
    }

    /// Registers a capture to be drained on every tick. Captures must be
    /// registered before `start`.
    pub fn register(&mut self, capture: Arc<StreamCapture>) {
        self.captures.push(capture);
    }

    /// Begins the periodic drain task. Idempotent if already running.
    pub fn start(&mut self, interval: Duration) {
        if self.task.is_some() {
            return;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let sink = self.sink.clone();
        let captures = self.captures.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => drain_all(&captures, &sink),
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        self.stop_tx = Some(stop_tx);
        self.task = Some(task);
    }

    /// Signals the periodic task to end, waits for it, then performs one
    /// final drain pass.
    pub async fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        if let Some(task) = self.task.take() {
            if task.await.is_err() {
                tracing::warn!(target: "testwatch.flusher", "drain task aborted");
            }
        }
        drain_all(&self.captures, &self.sink);
    }
}

/// Per-capture line order is preserved; no order is defined between
/// captures drained in the same pass.
fn drain_all(captures: &[Arc<StreamCapture>], sink: &OutputSink) {
    for capture in captures {
        capture.pump();
        for line in capture.drain_lines() {
            sink.write(&line);
        }
    }
}
