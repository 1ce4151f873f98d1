//! Status codes produced by a run.

/// All selected tests passed.
pub const SUCCESS: i32 = 0;

/// A replayed invocation found no recorded outcome to return.
pub const REPLAY_UNKNOWN: i32 = 1;

/// The suite raised a fault the worker boundary could describe.
pub const SUITE_PANIC: i32 = 3;

/// The suite raised a fault with no usable description, or the worker
/// vanished without reporting.
pub const UNKNOWN_FAULT: i32 = 4;

/// The watchdog elapsed and the run was abandoned.
pub const TIMEOUT: i32 = 124;
