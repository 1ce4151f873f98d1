use thiserror::Error;

/// Failures the harness surfaces to its own components.
///
/// Suite faults and the watchdog timeout are not represented here: both are
/// absorbed at the worker boundary and converted to outcome codes, because
/// `execute` must always return a status instead of unwinding.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("channel {channel} is already redirected by another capture")]
    AlreadyRedirected { channel: &'static str },

    #[error("failed to redirect channel {channel}")]
    Redirect {
        channel: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("log io error: {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
