//! Watchdog-guarded, in-process test suite harness.
//!
//! Runs an opaque suite exactly once per process lifetime, captures the
//! process's standard streams live, fans every line out to a log file and
//! an optional UI callback, and abandons a hung run when the wall-clock
//! watchdog elapses instead of blocking the caller forever.

pub mod capture;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod flusher;
pub mod sink;
pub mod suite;

pub use capture::{Channel, StreamCapture};
pub use config::HarnessConfig;
pub use coordinator::{exit, Degradation, ProcessRunState, RunCoordinator, RunOutcome};
pub use error::HarnessError;
pub use flusher::LiveFlusher;
pub use sink::{LineCallback, OutputSink, SinkTarget};
pub use suite::{Suite, SuiteConfig};
